use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::safety::{SafetyLevel, SafetyVerdict};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Safety,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Escalated,
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

impl Default for AuditContext {
    fn default() -> Self {
        Self::new("unassigned", "safety-guardrails")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Event for a non-ALLOWED verdict. Returns `None` for ALLOWED.
    pub fn safety_verdict(
        context: &AuditContext,
        query: &str,
        verdict: &SafetyVerdict,
    ) -> Option<Self> {
        let outcome = match verdict.level {
            SafetyLevel::Allowed => return None,
            SafetyLevel::RequiresConfirmation => AuditOutcome::Escalated,
            SafetyLevel::Forbidden => AuditOutcome::Blocked,
        };

        let event = Self::new(
            context.correlation_id.clone(),
            "safety.verdict",
            AuditCategory::Safety,
            context.actor.clone(),
            outcome,
        )
        .with_metadata("query", query)
        .with_metadata("level", verdict.level.as_str())
        .with_metadata("reason", verdict.reason.clone())
        .with_metadata("rule_id", verdict.matched_rule_id.as_deref().unwrap_or("none"));

        Some(event)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Receives safety events; storage is the collaborator's concern.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes each event to the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = "audit.safety_verdict",
            event_id = %event.event_id,
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            outcome = ?event.outcome,
            level = event.metadata.get("level").map(String::as_str).unwrap_or("unknown"),
            rule_id = event.metadata.get("rule_id").map(String::as_str).unwrap_or("none"),
            "safety verdict recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{
            AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
        },
        domain::safety::SafetyVerdict,
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                "req-123",
                "safety.verdict",
                AuditCategory::Safety,
                "line-2-tablet",
                AuditOutcome::Escalated,
            )
            .with_metadata("rule_id", "hot_work"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert!(events[0].metadata.contains_key("rule_id"));
    }

    #[test]
    fn allowed_verdict_produces_no_event() {
        let event = AuditEvent::safety_verdict(
            &AuditContext::default(),
            "what's my shift OEE",
            &SafetyVerdict::allowed(),
        );
        assert!(event.is_none());
    }

    #[test]
    fn forbidden_verdict_event_carries_query_and_rule() {
        let verdict = SafetyVerdict::forbidden("interlock_bypass", "interlock bypass requested");
        let event = AuditEvent::safety_verdict(
            &AuditContext::new("req-9", "line-2-tablet"),
            "bypass the light curtain",
            &verdict,
        );

        let Some(event) = event else {
            panic!("forbidden verdict must be audited");
        };
        assert_eq!(event.outcome, AuditOutcome::Blocked);
        assert_eq!(event.category, AuditCategory::Safety);
        assert_eq!(event.actor, "line-2-tablet");
        assert_eq!(event.metadata.get("rule_id").map(String::as_str), Some("interlock_bypass"));
        assert_eq!(event.metadata.get("level").map(String::as_str), Some("FORBIDDEN"));
        assert_eq!(
            event.metadata.get("query").map(String::as_str),
            Some("bypass the light curtain")
        );
    }
}
