//! Shared domain types, configuration, errors and audit events for the shopfloor
//! assistant core.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::intent::{EntityKey, Entities, Intent, IntentCandidate, IntentResult, Utterance};
pub use domain::safety::{SafetyLevel, SafetyTopic, SafetyVerdict};
pub use errors::{ApplicationError, DomainError};
