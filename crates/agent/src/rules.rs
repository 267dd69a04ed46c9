//! Safety rule table and the snapshot store the guardrails read from.
//!
//! A `RuleSet` is compiled once from a TOML document and never mutated afterwards.
//! Reloading builds a fresh set and publishes it through `RuleStore`; evaluations
//! already holding the previous `Arc` finish against the table they started with.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::Deserialize;
use shopfloor_core::config::SafetyConfig;
use shopfloor_core::domain::safety::SafetyTopic;
use shopfloor_core::errors::ApplicationError;
use thiserror::Error;
use tracing::info;

use crate::text::{contains_phrase, normalize, pad};

pub const BUILTIN_RULES: &str = include_str!("../rules/safety_rules.toml");
pub const BUILTIN_ORIGIN: &str = "builtin";

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("could not read safety rule file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse safety rules from {origin}: {source}")]
    Parse { origin: String, source: toml::de::Error },
    #[error("rule `{rule_id}` has an invalid pattern `{pattern}`: {source}")]
    InvalidPattern { rule_id: String, pattern: String, source: regex::Error },
    #[error("rule `{0}` declares no patterns")]
    EmptyPatterns(String),
    #[error("rule table from {origin} has no {class} rules")]
    EmptyClass { origin: String, class: &'static str },
    #[error("rule id `{0}` is declared more than once")]
    DuplicateRuleId(String),
    #[error("safety topic `{0}` is declared more than once")]
    DuplicateTopic(String),
    #[error("rule `{rule_id}` references unknown topic `{topic}`")]
    UnknownTopic { rule_id: String, topic: String },
    #[error("safety topic `{topic}` is missing `{field}`")]
    IncompleteTopic { topic: String, field: &'static str },
}

impl From<RuleLoadError> for ApplicationError {
    fn from(value: RuleLoadError) -> Self {
        ApplicationError::RuleTable(value.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    #[serde(default)]
    forbidden: Vec<RuleEntry>,
    #[serde(default)]
    confirmation: Vec<RuleEntry>,
    #[serde(default)]
    topics: Vec<SafetyTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    id: String,
    reason: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    patterns: Vec<String>,
}

/// One compiled rule. Matches when any pattern matches normalized text.
#[derive(Clone, Debug)]
pub struct PatternRule {
    pub id: String,
    pub reason: String,
    pub topic: Option<String>,
    patterns: Vec<Regex>,
}

impl PatternRule {
    pub fn is_match(&self, normalized: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(normalized))
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[derive(Clone, Debug)]
pub struct RuleSet {
    version: u64,
    origin: String,
    forbidden: Vec<PatternRule>,
    confirmation: Vec<PatternRule>,
    topics: Vec<SafetyTopic>,
}

impl RuleSet {
    pub fn builtin() -> Result<Self, RuleLoadError> {
        Self::from_toml_str(BUILTIN_RULES, BUILTIN_ORIGIN)
    }

    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RuleLoadError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw, &path.display().to_string())
    }

    /// Operator table when `rules_path` is set, the built-in table otherwise.
    pub fn from_config(config: &SafetyConfig) -> Result<Self, RuleLoadError> {
        match config.rules_path.as_deref() {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, RuleLoadError> {
        let document = toml::from_str::<RuleDocument>(raw)
            .map_err(|source| RuleLoadError::Parse { origin: origin.to_string(), source })?;

        if document.forbidden.is_empty() {
            return Err(RuleLoadError::EmptyClass {
                origin: origin.to_string(),
                class: "forbidden",
            });
        }

        let topics = validate_topics(document.topics)?;
        let topic_names = topics.iter().map(|topic| topic.name.as_str()).collect::<HashSet<_>>();

        let mut seen_ids = HashSet::new();
        let mut compile_class = |entries: Vec<RuleEntry>| {
            entries
                .into_iter()
                .map(|entry| {
                    if !seen_ids.insert(entry.id.clone()) {
                        return Err(RuleLoadError::DuplicateRuleId(entry.id));
                    }
                    compile_rule(entry, &topic_names)
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let forbidden = compile_class(document.forbidden)?;
        let confirmation = compile_class(document.confirmation)?;

        Ok(Self { version: 1, origin: origin.to_string(), forbidden, confirmation, topics })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn forbidden_rules(&self) -> &[PatternRule] {
        &self.forbidden
    }

    pub fn confirmation_rules(&self) -> &[PatternRule] {
        &self.confirmation
    }

    pub fn topics(&self) -> &[SafetyTopic] {
        &self.topics
    }

    pub fn topic(&self, name: &str) -> Option<&SafetyTopic> {
        self.topics.iter().find(|topic| topic.name == name)
    }

    /// First forbidden rule, in table order, matching any of the normalized texts.
    pub fn first_forbidden(&self, normalized: &[&str]) -> Option<&PatternRule> {
        first_match(&self.forbidden, normalized)
    }

    pub fn first_confirmation(&self, normalized: &[&str]) -> Option<&PatternRule> {
        first_match(&self.confirmation, normalized)
    }

    /// First topic, in table order, with a keyword present in any of the texts.
    pub fn detect_topic(&self, normalized: &[&str]) -> Option<&SafetyTopic> {
        let padded = normalized.iter().map(|text| pad(text)).collect::<Vec<_>>();
        self.topics.iter().find(|topic| {
            topic.keywords.iter().any(|keyword| {
                padded.iter().any(|text| contains_phrase(text, keyword))
            })
        })
    }
}

fn first_match<'a>(rules: &'a [PatternRule], normalized: &[&str]) -> Option<&'a PatternRule> {
    rules.iter().find(|rule| normalized.iter().any(|text| rule.is_match(text)))
}

fn compile_rule(entry: RuleEntry, topics: &HashSet<&str>) -> Result<PatternRule, RuleLoadError> {
    if entry.patterns.is_empty() {
        return Err(RuleLoadError::EmptyPatterns(entry.id));
    }

    if let Some(topic) = entry.topic.as_deref() {
        if !topics.contains(topic) {
            return Err(RuleLoadError::UnknownTopic {
                rule_id: entry.id,
                topic: topic.to_string(),
            });
        }
    }

    let patterns = entry
        .patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| RuleLoadError::InvalidPattern {
                rule_id: entry.id.clone(),
                pattern: pattern.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PatternRule { id: entry.id, reason: entry.reason, topic: entry.topic, patterns })
}

fn validate_topics(topics: Vec<SafetyTopic>) -> Result<Vec<SafetyTopic>, RuleLoadError> {
    let mut names = HashSet::new();
    let mut validated = Vec::with_capacity(topics.len());

    for mut topic in topics {
        let required = [
            ("name", topic.name.as_str()),
            ("standard_id", topic.standard_id.as_str()),
            ("section", topic.section.as_str()),
            ("disclaimer", topic.disclaimer.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            let topic = topic.name.clone();
            return Err(RuleLoadError::IncompleteTopic { topic, field: *field });
        }

        // Keywords are matched against normalized text, so store them that way.
        topic.keywords = topic
            .keywords
            .iter()
            .map(|keyword| normalize(keyword))
            .filter(|keyword| !keyword.is_empty())
            .collect();
        if topic.keywords.is_empty() {
            return Err(RuleLoadError::IncompleteTopic { topic: topic.name, field: "keywords" });
        }

        if !names.insert(topic.name.clone()) {
            return Err(RuleLoadError::DuplicateTopic(topic.name));
        }
        validated.push(topic);
    }

    Ok(validated)
}

/// Holds the current rule snapshot.
#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    pub fn new(rules: RuleSet) -> Self {
        Self { current: RwLock::new(Arc::new(rules)) }
    }

    pub fn builtin() -> Result<Self, RuleLoadError> {
        RuleSet::builtin().map(Self::new)
    }

    pub fn snapshot(&self) -> Arc<RuleSet> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in `rules` as the next version and returns that version number.
    pub fn publish(&self, mut rules: RuleSet) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.version = guard.version + 1;
        let version = rules.version;

        info!(
            event_name = "rules.published",
            version,
            origin = %rules.origin,
            forbidden = rules.forbidden.len(),
            confirmation = rules.confirmation.len(),
            topics = rules.topics.len(),
            "published safety rule snapshot"
        );

        *guard = Arc::new(rules);
        version
    }
}
