//! Tuple documents: relationships to seed into named stores.
//!
//! ```json
//! { "store_to_tuples": { "documents": [
//!     { "friendly_name": "anne reads readme",
//!       "relation_body": "user:anne can_read item:readme.txt" } ] } }
//! ```

use crate::error::AuthzError;
use crate::types::Relationship;
use rebac_gate_core::StoreName;
use rootcause::prelude::Report;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A single tuple entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TupleEntry {
    /// Name used when logging the write.
    pub friendly_name: String,
    /// `"<subject> <relation> <object>"`.
    pub relation_body: String,
}

impl TupleEntry {
    /// Parses the relation body into a relationship.
    pub fn relationship(&self) -> Result<Relationship, Report<AuthzError>> {
        self.relation_body.trim().parse()
    }
}

/// Tuples grouped by the store they belong to.
#[derive(Debug, Clone, Deserialize)]
pub struct TupleDocument {
    /// Store name to tuples.
    pub store_to_tuples: BTreeMap<StoreName, Vec<TupleEntry>>,
}

impl TupleDocument {
    /// Parses a tuple document from JSON.
    pub fn from_json(json: &str) -> Result<Self, Report<AuthzError>> {
        serde_json::from_str(json).map_err(|e| {
            AuthzError::InvalidInput {
                details: format!("invalid tuple document: {e}"),
            }
            .into()
        })
    }
}
