use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    Allowed,
    RequiresConfirmation,
    Forbidden,
}

impl SafetyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::RequiresConfirmation => "REQUIRES_CONFIRMATION",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one guardrail evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub level: SafetyLevel,
    pub reason: String,
    pub matched_rule_id: Option<String>,
    /// Citable topic attached to the triggering rule, if any.
    pub topic: Option<String>,
}

impl SafetyVerdict {
    pub const NO_CONCERNS: &'static str = "no safety concerns";

    pub fn allowed() -> Self {
        Self {
            level: SafetyLevel::Allowed,
            reason: Self::NO_CONCERNS.to_string(),
            matched_rule_id: None,
            topic: None,
        }
    }

    pub fn forbidden(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::Forbidden,
            reason: reason.into(),
            matched_rule_id: Some(rule_id.into()),
            topic: None,
        }
    }

    pub fn requires_confirmation(
        rule_id: impl Into<String>,
        reason: impl Into<String>,
        topic: Option<String>,
    ) -> Self {
        Self {
            level: SafetyLevel::RequiresConfirmation,
            reason: reason.into(),
            matched_rule_id: Some(rule_id.into()),
            topic,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.level == SafetyLevel::Allowed
    }
}

/// Safety category mapped to its mandatory disclaimer and governing standard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyTopic {
    pub name: String,
    pub keywords: Vec<String>,
    pub standard_id: String,
    pub section: String,
    pub disclaimer: String,
}

impl SafetyTopic {
    pub fn citation(&self) -> String {
        format!("{} {}", self.standard_id, self.section)
    }
}

#[cfg(test)]
mod tests {
    use super::{SafetyLevel, SafetyTopic, SafetyVerdict};

    #[test]
    fn allowed_verdict_carries_fixed_reason() {
        let verdict = SafetyVerdict::allowed();
        assert_eq!(verdict.level, SafetyLevel::Allowed);
        assert_eq!(verdict.reason, "no safety concerns");
        assert!(verdict.matched_rule_id.is_none());
    }

    #[test]
    fn citation_joins_standard_and_section() {
        let topic = SafetyTopic {
            name: "lockout_tagout".to_string(),
            keywords: vec!["lockout".to_string()],
            standard_id: "OSHA 29 CFR".to_string(),
            section: "1910.147".to_string(),
            disclaimer: "Apply your lock before servicing.".to_string(),
        };
        assert_eq!(topic.citation(), "OSHA 29 CFR 1910.147");
    }
}
