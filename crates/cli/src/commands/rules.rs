use serde::Serialize;
use shopfloor_agent::rules::{PatternRule, RuleSet};
use shopfloor_core::config::LoadOptions;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct RuleSummary {
    id: String,
    patterns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

#[derive(Debug, Serialize)]
struct TopicSummary {
    name: String,
    citation: String,
    keywords: usize,
}

#[derive(Debug, Serialize)]
struct RuleTableSummary {
    origin: String,
    version: u64,
    forbidden: Vec<RuleSummary>,
    confirmation: Vec<RuleSummary>,
    topics: Vec<TopicSummary>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("rules", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let rules = match RuleSet::from_config(&config.safety) {
        Ok(rules) => rules,
        Err(error) => return CommandResult::rule_table_failure("rules", &error),
    };

    let summarize = |class: &[PatternRule]| {
        class
            .iter()
            .map(|rule| RuleSummary {
                id: rule.id.clone(),
                patterns: rule.pattern_count(),
                topic: rule.topic.clone(),
            })
            .collect::<Vec<_>>()
    };

    let summary = RuleTableSummary {
        origin: rules.origin().to_string(),
        version: rules.version(),
        forbidden: summarize(rules.forbidden_rules()),
        confirmation: summarize(rules.confirmation_rules()),
        topics: rules
            .topics()
            .iter()
            .map(|topic| TopicSummary {
                name: topic.name.clone(),
                citation: topic.citation(),
                keywords: topic.keywords.len(),
            })
            .collect(),
    };

    let message = format!(
        "{} forbidden, {} confirmation rules and {} topics from {}",
        summary.forbidden.len(),
        summary.confirmation.len(),
        summary.topics.len(),
        summary.origin
    );
    CommandResult::success_with("rules", message, &summary)
}
