//! Authorization error types.

use std::fmt;

/// Authorization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// The backend could not answer: transport failure, server-side error,
    /// malformed response or an expired deadline.
    BackendUnavailable {
        /// Error details.
        details: String,
    },
    /// Failed to construct a client for the backend.
    ConnectionFailed {
        /// Error details.
        details: String,
    },
    /// The backend refused the request as invalid.
    Rejected {
        /// HTTP status returned by the backend.
        status: u16,
        /// Error details.
        details: String,
    },
    /// Invalid subject, object or relationship.
    InvalidInput {
        /// Error details.
        details: String,
    },
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendUnavailable { details } => {
                write!(f, "authorization backend unavailable: {}", details)
            }
            Self::ConnectionFailed { details } => {
                write!(f, "failed to connect to authorization service: {}", details)
            }
            Self::Rejected { status, details } => {
                write!(
                    f,
                    "authorization request rejected with status {}: {}",
                    status, details
                )
            }
            Self::InvalidInput { details } => {
                write!(f, "invalid authorization input: {}", details)
            }
        }
    }
}

impl std::error::Error for AuthzError {}
