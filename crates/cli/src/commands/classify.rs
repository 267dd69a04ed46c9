use shopfloor_agent::intent::IntentClassifier;
use shopfloor_core::config::LoadOptions;
use shopfloor_core::domain::intent::Utterance;

use crate::commands::{load_config, CommandResult};

pub fn run(options: &LoadOptions, text: &str, language: Option<&str>) -> CommandResult {
    let config = match load_config("classify", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let utterance = match language {
        Some(language) => Utterance::with_language(text, language),
        None => Utterance::new(text),
    };
    let result = IntentClassifier::new(&config.classifier).classify_utterance(&utterance);

    let message = match result.clarification_question.as_deref() {
        Some(question) => format!("clarification needed: {question}"),
        None => format!("{} (confidence {:.2})", result.intent, result.confidence),
    };
    CommandResult::success_with("classify", message, &result)
}
