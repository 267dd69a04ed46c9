use std::sync::Arc;

use shopfloor_agent::guardrails::SafetyGuardrails;
use shopfloor_core::audit::{AuditContext, TracingAuditSink};
use shopfloor_core::config::LoadOptions;

use crate::commands::{load_config, CommandResult};

pub fn run(options: &LoadOptions, query: &str, response: &str) -> CommandResult {
    let config = match load_config("check", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let guardrails = match SafetyGuardrails::from_config(&config.safety) {
        Ok(guardrails) => guardrails.with_audit_sink(Arc::new(TracingAuditSink)),
        Err(error) => return CommandResult::rule_table_failure("check", &error),
    };

    let context = AuditContext::new("cli", config.safety.audit_actor.as_str());
    let verdict = guardrails.check_safety_in(&context, query, response);
    let message = format!("{}: {}", verdict.level, verdict.reason);
    CommandResult::success_with("check", message, &verdict)
}
