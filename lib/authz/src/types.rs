//! Typed identifiers for the relationship-authorization backend.
//!
//! The backend addresses subjects and objects as colon-delimited typed
//! identifiers (`user:anne`, `item:readme.txt`). These types keep the
//! two halves apart and render them in exactly that form.

use crate::error::AuthzError;
use rebac_gate_core::UserId;
use rootcause::prelude::Report;
use std::fmt;
use std::str::FromStr;

/// Object type under which protected resources are registered.
pub const ITEM_TYPE: &str = "item";

/// Subject type for end users.
pub const USER_TYPE: &str = "user";

fn split_typed(kind: &str, s: &str) -> Result<(String, String), Report<AuthzError>> {
    match s.split_once(':') {
        Some((object_type, id)) if !object_type.is_empty() && !id.is_empty() => {
            Ok((object_type.to_string(), id.to_string()))
        }
        _ => Err(AuthzError::InvalidInput {
            details: format!("{kind} '{s}' is not of the form 'type:id'"),
        }
        .into()),
    }
}

/// A subject (actor) in the authorization model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    /// Subject type ("user" for end users).
    pub subject_type: String,
    /// Subject ID.
    pub id: String,
}

impl Subject {
    /// Creates a new user subject.
    #[must_use]
    pub fn user(id: &UserId) -> Self {
        Self {
            subject_type: USER_TYPE.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.id)
    }
}

impl FromStr for Subject {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (subject_type, id) = split_typed("subject", s)?;
        Ok(Self { subject_type, id })
    }
}

/// A reference to a protected object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// The object type.
    pub object_type: String,
    /// The object ID.
    pub id: String,
}

impl ObjectRef {
    /// Creates a new object reference.
    #[must_use]
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
        }
    }

    /// Creates a reference to an `item` object.
    #[must_use]
    pub fn item(id: impl Into<String>) -> Self {
        Self::new(ITEM_TYPE, id)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.id)
    }
}

impl FromStr for ObjectRef {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (object_type, id) = split_typed("object", s)?;
        Ok(Self { object_type, id })
    }
}

/// A relationship tuple between a subject and an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// The subject.
    pub subject: Subject,
    /// The relation name (e.g., "can_read", "excluded").
    pub relation: String,
    /// The object.
    pub object: ObjectRef,
}

impl Relationship {
    /// Creates a new relationship.
    #[must_use]
    pub fn new(subject: Subject, relation: impl Into<String>, object: ObjectRef) -> Self {
        Self {
            subject,
            relation: relation.into(),
            object,
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

/// Parses `"<subject> <relation> <object>"`, e.g. `"user:anne can_read item:readme.txt"`.
impl FromStr for Relationship {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [subject, relation, object] = parts.as_slice() else {
            return Err(AuthzError::InvalidInput {
                details: format!(
                    "relationship '{s}' must have exactly three parts, found {}",
                    parts.len()
                ),
            }
            .into());
        };
        Ok(Self::new(subject.parse()?, *relation, object.parse()?))
    }
}
