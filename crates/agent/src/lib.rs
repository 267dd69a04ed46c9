//! Query routing for the shopfloor voice assistant.
//!
//! A worker's utterance flows through three deterministic stages:
//! 1. **Classification** (`intent`, `extraction`) - weighted trigger phrases plus
//!    entity evidence pick one of the manufacturing intents, or ask a question back.
//! 2. **Drafting** (`agents`) - the answering agent registered for the intent drafts
//!    a reply.
//! 3. **Guardrails** (`guardrails`, `rules`) - every draft is checked against the
//!    safety rule table and is refused, prefixed for confirmation or cited before
//!    delivery.
//!
//! `runtime::AgentRuntime` wires the stages together.
//!
//! # Safety Principle
//!
//! Answering agents never decide what is safe to say. A FORBIDDEN verdict always
//! replaces the draft with a refusal.

pub mod agents;
pub mod extraction;
pub mod guardrails;
pub mod intent;
pub mod rules;
pub mod runtime;
pub mod text;
