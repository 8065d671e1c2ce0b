//! Strongly-typed identifiers.
//!
//! Identifiers are plain strings, but they travel inside colon-delimited
//! typed references (`user:anne`) and configuration keys, so each one is
//! validated on construction: non-empty, no whitespace, no `:`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

fn validate(id_type: &'static str, s: &str) -> Result<(), ParseIdError> {
    if s.is_empty() {
        return Err(ParseIdError {
            id_type,
            reason: "must not be empty".to_string(),
        });
    }
    if let Some(c) = s.chars().find(|c| c.is_whitespace() || *c == ':') {
        return Err(ParseIdError {
            id_type,
            reason: format!("contains forbidden character {c:?}"),
        });
    }
    Ok(())
}

/// Macro to generate a validated string identifier wrapper.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates an ID after validating it.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is empty or contains whitespace or `:`.
            pub fn new(value: impl Into<String>) -> Result<Self, ParseIdError> {
                let value = value.into();
                validate(stringify!($name), &value)?;
                Ok(Self(value))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of the end user on whose behalf data is filtered.
    UserId
);

define_id!(
    /// Logical name of a data source (e.g. "documents", "hr-table").
    SourceName
);

define_id!(
    /// Name of a configured authorization store.
    StoreName
);
