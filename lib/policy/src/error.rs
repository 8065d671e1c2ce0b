//! Error types for the policy crate.
//!
//! `Display` carries operational detail for logs. Anything shown to an end
//! user goes through [`PolicyError::user_message`] instead.

use std::fmt;

/// Errors from resolving data sources and filtering their contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The authorization backend failed while filtering. No partial result
    /// is returned.
    BackendUnavailable {
        source_name: String,
        details: String,
    },
    /// No data source is registered under this name.
    UnknownSource { name: String },
    /// A data source refers to an authorization store that is not configured.
    UnknownStore { name: String },
    /// A configured posture is not one of the supported values.
    InvalidPosture { value: String },
    /// A data source is configured inconsistently or used with the wrong filter.
    InvalidBinding {
        source_name: String,
        details: String,
    },
    /// A document candidate has no usable authorization identifier.
    MalformedCandidate { path: String },
    /// The row store failed to execute the filtered read.
    RowStoreFailed { details: String },
    /// The document corpus could not be enumerated.
    CorpusUnreadable { details: String },
}

impl PolicyError {
    /// Returns a message safe to show to end users.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BackendUnavailable { .. }
            | Self::RowStoreFailed { .. }
            | Self::CorpusUnreadable { .. }
            | Self::MalformedCandidate { .. } => "unable to retrieve data",
            Self::UnknownSource { .. } => "unknown data source",
            Self::UnknownStore { .. } | Self::InvalidPosture { .. } | Self::InvalidBinding { .. } => {
                "data source is misconfigured"
            }
        }
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendUnavailable {
                source_name,
                details,
            } => {
                write!(
                    f,
                    "authorization backend unavailable while filtering '{source_name}': {details}"
                )
            }
            Self::UnknownSource { name } => write!(f, "unknown data source: {name}"),
            Self::UnknownStore { name } => write!(f, "unknown authorization store: {name}"),
            Self::InvalidPosture { value } => {
                write!(
                    f,
                    "invalid posture '{value}', expected DEFAULT_DENY or DEFAULT_ALLOW_WITH_EXPLICIT_DENY"
                )
            }
            Self::InvalidBinding {
                source_name,
                details,
            } => {
                write!(f, "invalid binding for data source '{source_name}': {details}")
            }
            Self::MalformedCandidate { path } => {
                write!(f, "cannot derive an identifier for candidate '{path}'")
            }
            Self::RowStoreFailed { details } => write!(f, "row store query failed: {details}"),
            Self::CorpusUnreadable { details } => {
                write!(f, "document corpus unreadable: {details}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_detail_is_hidden_from_users() {
        let err = PolicyError::BackendUnavailable {
            source_name: "documents".to_string(),
            details: "connect error: 10.0.0.3:8080".to_string(),
        };
        assert!(err.to_string().contains("10.0.0.3"));
        assert_eq!(err.user_message(), "unable to retrieve data");
    }

    #[test]
    fn unknown_source_display() {
        let err = PolicyError::UnknownSource {
            name: "payroll".to_string(),
        };
        assert!(err.to_string().contains("payroll"));
        assert_eq!(err.user_message(), "unknown data source");
    }

    #[test]
    fn invalid_posture_names_the_value() {
        let err = PolicyError::InvalidPosture {
            value: "DEFAULT_MAYBE".to_string(),
        };
        assert!(err.to_string().contains("DEFAULT_MAYBE"));
    }
}
