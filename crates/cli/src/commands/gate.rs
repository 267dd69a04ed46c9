use shopfloor_agent::agents::AgentRegistry;
use shopfloor_agent::runtime::{AgentRuntime, RouterReply};
use shopfloor_core::config::LoadOptions;
use shopfloor_core::errors::ApplicationError;

use crate::commands::{load_config, CommandResult, EXIT_CONTRACT, EXIT_RULE_TABLE};

/// Runs a draft produced elsewhere through the same delivery contract the router uses.
pub fn run(options: &LoadOptions, query: &str, draft: &str) -> CommandResult {
    let config = match load_config("gate", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match AgentRuntime::from_config(&config, AgentRegistry::default()) {
        Ok(runtime) => runtime,
        Err(error) => return application_failure(error),
    };

    match runtime.review_draft(query, draft) {
        Ok(reply) => {
            let message = match &reply {
                RouterReply::Refused { .. } => "draft refused",
                RouterReply::Answer { .. } => "draft delivered",
                RouterReply::Clarification { .. } => "query needs clarification",
            };
            CommandResult::success_with("gate", message, &reply)
        }
        Err(error) => application_failure(error),
    }
}

fn application_failure(error: ApplicationError) -> CommandResult {
    let exit_code = match error {
        ApplicationError::RuleTable(_) => EXIT_RULE_TABLE,
        ApplicationError::Domain(_) | ApplicationError::Integration(_) => EXIT_CONTRACT,
    };
    CommandResult::failure("gate", error.error_class(), error.to_string(), exit_code)
}
