//! Document candidates and the per-document filter.
//!
//! Each document is authorized as `item:<file name>`. Only the file name
//! takes part, so two documents with the same name in different
//! directories share one authorization identity.

use crate::error::PolicyError;
use crate::posture::Verdict;
use crate::registry::{DataSourceBinding, ResourceKind};
use futures::{StreamExt, TryStreamExt, stream};
use rebac_gate_authz::{ObjectRef, Subject};
use rebac_gate_core::UserId;
use rootcause::prelude::Report;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// Default cap on concurrent checks per filter call.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// A document considered for inclusion in a filtered result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateDocument {
    /// Where the document was loaded from.
    pub path: PathBuf,
    /// Document text.
    pub content: String,
}

impl CandidateDocument {
    /// Creates a candidate.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Returns the authorization object ID: the file name, if it is valid UTF-8.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }
}

/// Loads every file with `extension` directly under `dir`, sorted by path.
///
/// Files that are not valid UTF-8 are skipped with a warning.
///
/// # Errors
///
/// Returns [`PolicyError::CorpusUnreadable`] if the directory cannot be listed.
#[instrument(skip(dir), fields(dir = %dir.display()))]
pub async fn load_corpus(
    dir: &Path,
    extension: &str,
) -> Result<Vec<CandidateDocument>, Report<PolicyError>> {
    let unreadable = |e: std::io::Error| PolicyError::CorpusUnreadable {
        details: format!("{}: {e}", dir.display()),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let path = entry.path();
        let is_file = entry.file_type().await.map_err(unreadable)?.is_file();
        if is_file && path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(path = %path.display(), length = content.len(), "loaded document");
                documents.push(CandidateDocument::new(path, content));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
            }
        }
    }

    info!(count = documents.len(), "document corpus loaded");
    Ok(documents)
}

/// Filters documents with one check per candidate.
///
/// Checks run concurrently, at most `max_in_flight` at a time, and the
/// output keeps the input order. The first failed check fails the whole
/// call and drops the checks still in flight.
#[derive(Debug, Clone, Copy)]
pub struct DocumentFilter {
    max_in_flight: NonZeroUsize,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl DocumentFilter {
    /// Creates a filter; a limit of zero is treated as one.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: NonZeroUsize::new(max_in_flight).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Returns the documents `user` may see under the binding's posture.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::BackendUnavailable`] if any check fails and
    /// [`PolicyError::InvalidBinding`] if the binding is not a document set.
    #[instrument(skip(self, candidates, binding), fields(source = %binding.source, user = %user))]
    pub async fn filter(
        &self,
        user: &UserId,
        candidates: Vec<CandidateDocument>,
        binding: &DataSourceBinding,
    ) -> Result<Vec<CandidateDocument>, Report<PolicyError>> {
        if binding.kind != ResourceKind::DocumentSet {
            return Err(PolicyError::InvalidBinding {
                source_name: binding.source.to_string(),
                details: "document filter used on a tabular source".to_string(),
            }
            .into());
        }

        let subject = Subject::user(user);
        let total = candidates.len();

        let screened: Vec<Option<CandidateDocument>> = stream::iter(candidates)
            .map(|candidate| screen(&subject, candidate, binding))
            .buffered(self.max_in_flight.get())
            .try_collect()
            .await?;
        let kept: Vec<CandidateDocument> = screened.into_iter().flatten().collect();

        info!(total, kept = kept.len(), posture = %binding.posture, "documents filtered");
        Ok(kept)
    }
}

async fn screen(
    subject: &Subject,
    candidate: CandidateDocument,
    binding: &DataSourceBinding,
) -> Result<Option<CandidateDocument>, Report<PolicyError>> {
    let Some(id) = candidate
        .object_id()
        .filter(|id| binding.gateway().is_valid_object_id(id))
    else {
        let malformed = PolicyError::MalformedCandidate {
            path: candidate.path.display().to_string(),
        };
        warn!(error = %malformed, "skipping document candidate");
        return Ok(None);
    };
    let object = ObjectRef::item(id);

    let present = binding
        .gateway()
        .check(subject, &binding.relation, &object)
        .await
        .map_err(|e| {
            error!(object = %object, error = %e, "check failed");
            PolicyError::BackendUnavailable {
                source_name: binding.source.to_string(),
                details: e.to_string(),
            }
        })?;

    let verdict = binding.posture.decide(present);
    debug!(object = %object, present, ?verdict, "document screened");
    Ok((verdict == Verdict::Keep).then_some(candidate))
}
