use serde::Serialize;
use shopfloor_agent::guardrails::SafetyGuardrails;
use shopfloor_core::config::LoadOptions;
use shopfloor_core::domain::safety::{SafetyLevel, SafetyVerdict};

use crate::commands::{load_config, CommandResult, EXIT_CONTRACT};

#[derive(Debug, Clone, Default)]
pub struct SanitizeArgs {
    pub response: String,
    pub topic: Option<String>,
    /// Evaluate this query with the response and sanitize for the resulting verdict.
    pub query: Option<String>,
    /// Treat the response as requiring confirmation.
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
struct SanitizeOutput<'a> {
    level: SafetyLevel,
    topic: Option<&'a str>,
    text: String,
}

pub fn run(options: &LoadOptions, args: &SanitizeArgs) -> CommandResult {
    let config = match load_config("sanitize", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let guardrails = match SafetyGuardrails::from_config(&config.safety) {
        Ok(guardrails) => guardrails,
        Err(error) => return CommandResult::rule_table_failure("sanitize", &error),
    };

    let verdict = match (args.query.as_deref(), args.confirm) {
        (Some(query), _) => guardrails.check_safety(query, &args.response),
        (None, true) => SafetyVerdict::requires_confirmation(
            "operator_confirmation",
            "confirmation requested by operator",
            None,
        ),
        (None, false) => SafetyVerdict::allowed(),
    };

    let topic = args.topic.as_deref().or(verdict.topic.as_deref());
    match guardrails.sanitize_for_verdict(&args.response, topic, &verdict) {
        Ok(text) => {
            let output = SanitizeOutput { level: verdict.level, topic, text };
            CommandResult::success_with("sanitize", "response sanitized", &output)
        }
        Err(error) => CommandResult::failure(
            "sanitize",
            "contract_violation",
            format!("{error}: {}", verdict.reason),
            EXIT_CONTRACT,
        ),
    }
}
