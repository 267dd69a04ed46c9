use thiserror::Error;

use crate::domain::intent::Intent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("no answering agent registered for intent {0}")]
    NoAgentForIntent(Intent),
    #[error("forbidden response cannot be sanitized for delivery")]
    ForbiddenDelivery,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("safety rule table failure: {0}")]
    RuleTable(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl ApplicationError {
    /// Stable snake_case class used in structured command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::RuleTable(_) => "rule_table",
            Self::Integration(_) => "integration",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::intent::Intent;
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_errors_keep_their_message_through_the_application_layer() {
        let error = ApplicationError::from(DomainError::NoAgentForIntent(Intent::QualityDefect));

        assert_eq!(error.error_class(), "domain");
        assert_eq!(error.to_string(), "no answering agent registered for intent QUALITY_DEFECT");
    }

    #[test]
    fn each_layer_reports_a_stable_error_class() {
        let cases = [
            (ApplicationError::RuleTable("invalid pattern".to_owned()), "rule_table"),
            (ApplicationError::Integration("backend timed out".to_owned()), "integration"),
            (ApplicationError::Domain(DomainError::ForbiddenDelivery), "domain"),
        ];

        for (error, class) in cases {
            assert_eq!(error.error_class(), class, "unexpected class for {error}");
        }
    }
}
