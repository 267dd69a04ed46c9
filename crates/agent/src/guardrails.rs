//! Safety guardrails applied to every answer before it reaches a worker.
//!
//! `check_safety` is the single decision point: forbidden rules over the query and
//! the draft response first, then malformed input, then confirmation rules, and
//! ALLOWED only when nothing matched. Sanitizing appends the governing standard for
//! the topic and, for confirmation verdicts, a sign-off instruction ahead of the body.

use std::sync::Arc;

use shopfloor_core::audit::{AuditContext, AuditEvent, AuditSink};
use shopfloor_core::config::SafetyConfig;
use shopfloor_core::domain::safety::{SafetyLevel, SafetyVerdict};
use shopfloor_core::errors::{ApplicationError, DomainError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::rules::{RuleLoadError, RuleSet, RuleStore};
use crate::text::{has_control_characters, normalize};

pub const CONFIRMATION_PREFIX: &str = "Confirmation required: get sign-off from your supervisor \
or a qualified person before acting on these instructions.";

pub const MALFORMED_INPUT_RULE: &str = "malformed_input";
const MALFORMED_INPUT_REASON: &str =
    "the request or draft answer could not be read reliably; confirm before acting";

pub const DEFAULT_AUDIT_ACTOR: &str = "safety-guardrails";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardrailError {
    #[error("response blocked by safety rule `{rule_id}` cannot be delivered")]
    ForbiddenVerdict { rule_id: String },
}

impl From<GuardrailError> for ApplicationError {
    fn from(value: GuardrailError) -> Self {
        match value {
            GuardrailError::ForbiddenVerdict { .. } => {
                ApplicationError::Domain(DomainError::ForbiddenDelivery)
            }
        }
    }
}

/// Verdict for one query/response pair against a fixed rule snapshot.
pub fn evaluate(rules: &RuleSet, query: &str, response: &str) -> SafetyVerdict {
    let normalized_query = normalize(query);
    let normalized_response = normalize(response);
    let texts = [normalized_query.as_str(), normalized_response.as_str()];

    if let Some(rule) = rules.first_forbidden(&texts) {
        let mut verdict = SafetyVerdict::forbidden(rule.id.clone(), rule.reason.clone());
        verdict.topic = rule.topic.clone();
        return verdict;
    }

    let malformed = normalized_response.is_empty()
        || has_control_characters(query)
        || has_control_characters(response);
    if malformed {
        return SafetyVerdict::requires_confirmation(
            MALFORMED_INPUT_RULE,
            MALFORMED_INPUT_REASON,
            None,
        );
    }

    if let Some(rule) = rules.first_confirmation(&texts) {
        return SafetyVerdict::requires_confirmation(
            rule.id.clone(),
            rule.reason.clone(),
            rule.topic.clone(),
        );
    }

    SafetyVerdict::allowed()
}

#[derive(Clone)]
pub struct SafetyGuardrails {
    rules: Arc<RuleStore>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    actor: String,
}

impl SafetyGuardrails {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules, audit_sink: None, actor: DEFAULT_AUDIT_ACTOR.to_string() }
    }

    pub fn builtin() -> Result<Self, RuleLoadError> {
        Ok(Self::new(Arc::new(RuleStore::builtin()?)))
    }

    pub fn from_config(config: &SafetyConfig) -> Result<Self, RuleLoadError> {
        let rules = RuleSet::from_config(config)?;
        info!(
            event_name = "rules.loaded",
            origin = %rules.origin(),
            forbidden = rules.forbidden_rules().len(),
            confirmation = rules.confirmation_rules().len(),
            topics = rules.topics().len(),
            "safety rule table loaded"
        );
        Ok(Self::new(Arc::new(RuleStore::new(rules))).with_actor(config.audit_actor.clone()))
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn check_safety(&self, query: &str, response: &str) -> SafetyVerdict {
        let context = AuditContext::new("unassigned", self.actor.clone());
        self.check_safety_in(&context, query, response)
    }

    pub fn check_safety_in(
        &self,
        context: &AuditContext,
        query: &str,
        response: &str,
    ) -> SafetyVerdict {
        let rules = self.rules.snapshot();
        let verdict = evaluate(&rules, query, response);
        self.record(context, query, &verdict, rules.version());
        verdict
    }

    /// Forbidden verdict for the query on its own, before any draft exists.
    pub fn screen_query(&self, context: &AuditContext, query: &str) -> Option<SafetyVerdict> {
        let rules = self.rules.snapshot();
        let normalized_query = normalize(query);
        let rule = rules.first_forbidden(&[normalized_query.as_str()])?;

        let mut verdict = SafetyVerdict::forbidden(rule.id.clone(), rule.reason.clone());
        verdict.topic = rule.topic.clone();
        self.record(context, query, &verdict, rules.version());
        Some(verdict)
    }

    /// Appends the disclaimer and citation for `topic`. Unknown topics pass through.
    pub fn sanitize_response(&self, response: &str, topic: &str) -> String {
        let rules = self.rules.snapshot();
        let Some(safety_topic) = rules.topic(topic) else {
            debug!(event_name = "safety.unknown_topic", topic, "no disclaimer for topic");
            return response.to_string();
        };

        let citation = safety_topic.citation();
        if response.contains(&citation) {
            return response.to_string();
        }

        format!("{response}\n\nSafety note: {} Reference: {citation}.", safety_topic.disclaimer)
    }

    /// Delivery form of a response for its verdict. FORBIDDEN is never deliverable.
    pub fn sanitize_for_verdict(
        &self,
        response: &str,
        topic: Option<&str>,
        verdict: &SafetyVerdict,
    ) -> Result<String, GuardrailError> {
        let topic = topic.or(verdict.topic.as_deref());

        let body = match verdict.level {
            SafetyLevel::Forbidden => {
                let rule_id = verdict.matched_rule_id.clone().unwrap_or_else(|| "unknown".into());
                return Err(GuardrailError::ForbiddenVerdict { rule_id });
            }
            SafetyLevel::Allowed => response.to_string(),
            SafetyLevel::RequiresConfirmation if response.starts_with(CONFIRMATION_PREFIX) => {
                response.to_string()
            }
            SafetyLevel::RequiresConfirmation => format!("{CONFIRMATION_PREFIX}\n\n{response}"),
        };

        Ok(match topic {
            Some(topic) => self.sanitize_response(&body, topic),
            None => body,
        })
    }

    /// Topic to cite: the verdict's own topic, else the first topic named in the texts.
    pub fn detect_topic(
        &self,
        verdict: &SafetyVerdict,
        query: &str,
        response: &str,
    ) -> Option<String> {
        if let Some(topic) = verdict.topic.as_ref() {
            return Some(topic.clone());
        }

        let normalized_query = normalize(query);
        let normalized_response = normalize(response);
        self.rules
            .snapshot()
            .detect_topic(&[normalized_query.as_str(), normalized_response.as_str()])
            .map(|topic| topic.name.clone())
    }

    fn record(&self, context: &AuditContext, query: &str, verdict: &SafetyVerdict, version: u64) {
        let rule_id = verdict.matched_rule_id.as_deref().unwrap_or("none");
        match verdict.level {
            SafetyLevel::Allowed => debug!(
                event_name = "safety.checked",
                correlation_id = %context.correlation_id,
                rules_version = version,
                "no safety concerns"
            ),
            SafetyLevel::RequiresConfirmation => info!(
                event_name = "safety.confirmation_required",
                correlation_id = %context.correlation_id,
                rule_id,
                rules_version = version,
                reason = %verdict.reason,
                "response requires confirmation"
            ),
            SafetyLevel::Forbidden => warn!(
                event_name = "safety.forbidden",
                correlation_id = %context.correlation_id,
                rule_id,
                rules_version = version,
                reason = %verdict.reason,
                "response blocked"
            ),
        }

        let Some(sink) = self.audit_sink.as_ref() else {
            return;
        };
        if let Some(event) = AuditEvent::safety_verdict(context, query, verdict) {
            sink.emit(event.with_metadata("rules_version", version.to_string()));
        }
    }
}
