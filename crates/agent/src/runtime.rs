use std::sync::Arc;

use serde::Serialize;
use shopfloor_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use shopfloor_core::config::AppConfig;
use shopfloor_core::domain::intent::{Intent, Utterance};
use shopfloor_core::domain::safety::{SafetyLevel, SafetyVerdict};
use shopfloor_core::errors::{ApplicationError, DomainError};
use tracing::{info, warn};

use crate::agents::AgentRegistry;
use crate::guardrails::SafetyGuardrails;
use crate::intent::{IntentClassifier, GENERIC_CLARIFICATION};

/// What the worker hears back for one query.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouterReply {
    Clarification { question: String },
    Answer { intent: Intent, text: String, verdict: SafetyVerdict },
    Refused { message: String, verdict: SafetyVerdict },
}

impl RouterReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Clarification { question } => question,
            Self::Answer { text, .. } => text,
            Self::Refused { message, .. } => message,
        }
    }
}

/// Refusal spoken in place of a blocked answer.
pub fn refusal_message(verdict: &SafetyVerdict) -> String {
    format!(
        "I can't help with that: {}. Talk to your supervisor or safety lead before going further.",
        verdict.reason.trim_end_matches('.')
    )
}

pub struct AgentRuntime {
    classifier: IntentClassifier,
    guardrails: SafetyGuardrails,
    agents: AgentRegistry,
}

impl AgentRuntime {
    pub fn new(
        classifier: IntentClassifier,
        guardrails: SafetyGuardrails,
        agents: AgentRegistry,
    ) -> Self {
        Self { classifier, guardrails, agents }
    }

    /// Builds the runtime from configuration. A rule table that fails to load is fatal.
    pub fn from_config(
        config: &AppConfig,
        agents: AgentRegistry,
    ) -> Result<Self, ApplicationError> {
        let sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let guardrails = SafetyGuardrails::from_config(&config.safety)?.with_audit_sink(sink);
        Ok(Self::new(IntentClassifier::new(&config.classifier), guardrails, agents))
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn guardrails(&self) -> &SafetyGuardrails {
        &self.guardrails
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub async fn handle_query(&self, text: &str) -> Result<RouterReply, ApplicationError> {
        let context = AuditContext::new("unassigned", self.guardrails.actor());
        self.handle_utterance(&Utterance::new(text), &context).await
    }

    pub async fn handle_utterance(
        &self,
        utterance: &Utterance,
        context: &AuditContext,
    ) -> Result<RouterReply, ApplicationError> {
        let query = utterance.text();

        if let Some(verdict) = self.guardrails.screen_query(context, query) {
            return Ok(RouterReply::Refused { message: refusal_message(&verdict), verdict });
        }

        let classification = self.classifier.classify_utterance(utterance);
        if !classification.is_routable() {
            let question = classification
                .clarification_question
                .clone()
                .unwrap_or_else(|| GENERIC_CLARIFICATION.to_string());
            return Ok(self.clarify(context, query, question));
        }

        let intent = classification.intent;
        let Some(agent) = self.agents.get(intent) else {
            warn!(
                event_name = "router.no_agent",
                correlation_id = %context.correlation_id,
                intent = %intent,
                registered = ?self.agents.intents(),
                "no answering agent registered"
            );
            return Err(ApplicationError::Integration(
                DomainError::NoAgentForIntent(intent).to_string(),
            ));
        };

        let draft = agent.draft(query, &classification).await.map_err(|error| {
            ApplicationError::Integration(format!("{intent} agent failed: {error:#}"))
        })?;

        let reply = self.finalize_in(context, query, intent, &draft)?;
        info!(
            event_name = "router.replied",
            correlation_id = %context.correlation_id,
            intent = %intent,
            confidence = classification.confidence,
            reply = reply_kind(&reply),
            "query routed"
        );
        Ok(reply)
    }

    /// Applies the guardrail contract to a draft produced outside the registry.
    pub fn finalize(
        &self,
        query: &str,
        intent: Intent,
        draft: &str,
    ) -> Result<RouterReply, ApplicationError> {
        let context = AuditContext::new("unassigned", self.guardrails.actor());
        self.finalize_in(&context, query, intent, draft)
    }

    /// Vets a draft written outside the registry against the query it answers. A
    /// FORBIDDEN exchange is refused; a query the classifier cannot route gets its
    /// clarification question instead of the draft.
    pub fn review_draft(&self, query: &str, draft: &str) -> Result<RouterReply, ApplicationError> {
        let context = AuditContext::new("unassigned", self.guardrails.actor());
        let classification = self.classifier.classify(query);

        let reply = self.finalize_in(&context, query, classification.intent, draft)?;
        if matches!(reply, RouterReply::Refused { .. }) || classification.is_routable() {
            return Ok(reply);
        }

        let question = classification
            .clarification_question
            .unwrap_or_else(|| GENERIC_CLARIFICATION.to_string());
        Ok(self.clarify(&context, query, question))
    }

    pub fn finalize_in(
        &self,
        context: &AuditContext,
        query: &str,
        intent: Intent,
        draft: &str,
    ) -> Result<RouterReply, ApplicationError> {
        let verdict = self.guardrails.check_safety_in(context, query, draft);
        if verdict.level == SafetyLevel::Forbidden {
            return Ok(RouterReply::Refused { message: refusal_message(&verdict), verdict });
        }

        let topic = self.guardrails.detect_topic(&verdict, query, draft);
        let text = self.guardrails.sanitize_for_verdict(draft, topic.as_deref(), &verdict)?;
        Ok(RouterReply::Answer { intent, text, verdict })
    }

    fn clarify(&self, context: &AuditContext, query: &str, question: String) -> RouterReply {
        // Spoken questions pass the same check as answers.
        let verdict = self.guardrails.check_safety_in(context, query, &question);
        if verdict.level == SafetyLevel::Forbidden {
            return RouterReply::Refused { message: refusal_message(&verdict), verdict };
        }

        info!(
            event_name = "router.clarification",
            correlation_id = %context.correlation_id,
            "asking the worker to clarify"
        );
        RouterReply::Clarification { question }
    }
}

fn reply_kind(reply: &RouterReply) -> &'static str {
    match reply {
        RouterReply::Clarification { .. } => "clarification",
        RouterReply::Answer { .. } => "answer",
        RouterReply::Refused { .. } => "refused",
    }
}
