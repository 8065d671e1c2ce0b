//! Posture-driven filtering for rebac-gate.
//!
//! This crate decides which documents and table rows a user may see:
//!
//! - **Posture**: the keep/drop rule combining a data source's default
//!   stance with whether a relationship holds
//! - **Store registry**: data source name to store, relation and posture
//! - **Document filter**: one check per document, bounded fan-out, order kept
//! - **Tabular filter**: one listing, translated into a single filtered read
//!
//! Every authorization failure fails the whole filter call; no partially
//! filtered result is ever returned.

pub mod document;
pub mod error;
pub mod posture;
pub mod registry;
pub mod row_store;
pub mod tabular;

#[cfg(test)]
mod test_support;

pub use document::{CandidateDocument, DEFAULT_MAX_IN_FLIGHT, DocumentFilter, load_corpus};
pub use error::PolicyError;
pub use posture::{Posture, Verdict};
pub use registry::{
    DataSourceBinding, ResourceKind, SourceConfig, SourceKindConfig, StoreRegistry,
};
pub use row_store::{MemoryRowStore, PgRowStore, Row, RowStore, row_identifier};
pub use tabular::{MembershipMode, MembershipPredicate, MembershipSet, TabularFilter};
