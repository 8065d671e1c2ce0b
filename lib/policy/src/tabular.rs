//! The tabular filter: one listing, one filtered read.
//!
//! Instead of checking rows one by one, the filter fetches every object
//! the user relates to via the source's relation and hands the row store a
//! membership predicate derived from the posture.

use crate::error::PolicyError;
use crate::posture::{Posture, Verdict};
use crate::registry::{DataSourceBinding, ResourceKind};
use crate::row_store::{Row, RowStore};
use rebac_gate_authz::{ITEM_TYPE, Subject};
use rebac_gate_core::UserId;
use rootcause::prelude::Report;
use std::collections::BTreeSet;
use tracing::{error, info, instrument};

/// Deduplicated object IDs returned by a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSet(BTreeSet<String>);

impl MembershipSet {
    /// Returns true if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns the number of distinct members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates members in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Whether the predicate keeps members or non-members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipMode {
    Include,
    Exclude,
}

/// Identifier-column membership test derived from a posture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipPredicate {
    /// Column holding the row identifier.
    pub column: String,
    /// Objects the user relates to.
    pub members: MembershipSet,
    /// Posture deciding what membership means.
    pub posture: Posture,
}

impl MembershipPredicate {
    /// Returns whether the predicate keeps members or non-members.
    #[must_use]
    pub fn mode(&self) -> MembershipMode {
        match self.posture.decide(true) {
            Verdict::Keep => MembershipMode::Include,
            Verdict::Drop => MembershipMode::Exclude,
        }
    }

    /// Decides one row by its identifier. Rows without one are dropped.
    #[must_use]
    pub fn keeps(&self, id: Option<&str>) -> bool {
        id.is_some_and(|id| self.posture.decide(self.members.contains(id)) == Verdict::Keep)
    }
}

/// Filters table rows with a single listing per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularFilter;

impl TabularFilter {
    /// Creates a tabular filter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the rows `user` may see under the binding's posture.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::BackendUnavailable`] if the listing fails,
    /// [`PolicyError::RowStoreFailed`] if the read fails, and
    /// [`PolicyError::InvalidBinding`] if the binding is not tabular.
    #[instrument(skip(self, binding, rows), fields(source = %binding.source, user = %user))]
    pub async fn filter<S>(
        &self,
        user: &UserId,
        binding: &DataSourceBinding,
        rows: &S,
    ) -> Result<Vec<Row>, Report<PolicyError>>
    where
        S: RowStore + ?Sized,
    {
        let ResourceKind::Tabular { identifier_column } = &binding.kind else {
            return Err(PolicyError::InvalidBinding {
                source_name: binding.source.to_string(),
                details: "tabular filter used on a document source".to_string(),
            }
            .into());
        };

        let listed = binding
            .gateway()
            .list_objects(&Subject::user(user), &binding.relation, ITEM_TYPE)
            .await
            .map_err(|e| {
                error!(error = %e, "list objects failed");
                PolicyError::BackendUnavailable {
                    source_name: binding.source.to_string(),
                    details: e.to_string(),
                }
            })?;

        let predicate = MembershipPredicate {
            column: identifier_column.clone(),
            members: listed.into_iter().collect(),
            posture: binding.posture,
        };

        let kept = rows.select(&predicate).await?;
        info!(
            members = predicate.members.len(),
            mode = ?predicate.mode(),
            kept = kept.len(),
            "rows filtered"
        );
        Ok(kept)
    }
}
