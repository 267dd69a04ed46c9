use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Manufacturing intents an utterance can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    SopLookup,
    ProductionStatus,
    MaintenanceRequest,
    QualityDefect,
    SafetyQuery,
    Unknown,
}

impl Intent {
    /// Routable intents in tie-break order, highest stakes first.
    pub const PRIORITY: [Intent; 5] = [
        Intent::SafetyQuery,
        Intent::MaintenanceRequest,
        Intent::QualityDefect,
        Intent::SopLookup,
        Intent::ProductionStatus,
    ];

    /// Position in the tie-break order. Lower wins; `Unknown` never wins a tie.
    pub fn priority_rank(self) -> u8 {
        match self {
            Self::SafetyQuery => 0,
            Self::MaintenanceRequest => 1,
            Self::QualityDefect => 2,
            Self::SopLookup => 3,
            Self::ProductionStatus => 4,
            Self::Unknown => u8::MAX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SopLookup => "SOP_LOOKUP",
            Self::ProductionStatus => "PRODUCTION_STATUS",
            Self::MaintenanceRequest => "MAINTENANCE_REQUEST",
            Self::QualityDefect => "QUALITY_DEFECT",
            Self::SafetyQuery => "SAFETY_QUERY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Phrase used when asking the worker to pick between candidates.
    pub fn spoken_label(self) -> &'static str {
        match self {
            Self::SopLookup => "a SOP lookup",
            Self::ProductionStatus => "a production status check",
            Self::MaintenanceRequest => "a maintenance request",
            Self::QualityDefect => "a quality defect report",
            Self::SafetyQuery => "a safety question",
            Self::Unknown => "something else",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    MachineId,
    PartNumber,
    Shift,
    EmployeeId,
    LotId,
}

impl EntityKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MachineId => "machine_id",
            Self::PartNumber => "part_number",
            Self::Shift => "shift",
            Self::EmployeeId => "employee_id",
            Self::LotId => "lot_id",
        }
    }
}

pub type Entities = BTreeMap<EntityKey, String>;

/// One transcribed request. Upstream either translates non-English speech or tags it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    text: String,
    language: Option<String>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), language: None }
    }

    pub fn with_language(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self { text: text.into(), language: Some(language.into()) }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// True when no tag is present or the primary subtag is `en`.
    pub fn is_english(&self) -> bool {
        match self.language.as_deref() {
            None => true,
            Some(tag) => {
                let primary = tag.split(['-', '_']).next().unwrap_or_default();
                primary.trim().eq_ignore_ascii_case("en")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: Intent,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub entities: Entities,
    pub clarification_needed: bool,
    pub clarification_question: Option<String>,
    /// Intents with non-zero score, best first.
    pub candidates: Vec<IntentCandidate>,
}

impl IntentResult {
    pub fn entity(&self, key: EntityKey) -> Option<&str> {
        self.entities.get(&key).map(String::as_str)
    }

    pub fn is_routable(&self) -> bool {
        !self.clarification_needed && self.intent != Intent::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityKey, Intent, Utterance};

    #[test]
    fn priority_table_covers_every_routable_intent_once() {
        for (position, intent) in Intent::PRIORITY.iter().enumerate() {
            assert_eq!(usize::from(intent.priority_rank()), position);
        }
        assert!(!Intent::PRIORITY.contains(&Intent::Unknown));
    }

    #[test]
    fn safety_outranks_every_other_intent() {
        for intent in Intent::PRIORITY.iter().skip(1) {
            assert!(Intent::SafetyQuery.priority_rank() < intent.priority_rank());
        }
        assert!(Intent::ProductionStatus.priority_rank() < Intent::Unknown.priority_rank());
    }

    #[test]
    fn serializes_closed_taxonomy_in_wire_casing() {
        let encoded = serde_json::to_string(&Intent::MaintenanceRequest).unwrap_or_default();
        assert_eq!(encoded, "\"MAINTENANCE_REQUEST\"");
        let key = serde_json::to_string(&EntityKey::MachineId).unwrap_or_default();
        assert_eq!(key, "\"machine_id\"");
    }

    #[test]
    fn language_tag_primary_subtag_decides_english() {
        assert!(Utterance::new("press 03 status").is_english());
        assert!(Utterance::with_language("press 03 status", "en-US").is_english());
        assert!(!Utterance::with_language("estado de la prensa", "es").is_english());
    }
}
