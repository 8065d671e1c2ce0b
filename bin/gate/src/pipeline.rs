//! Explicit stage records for a gate query.
//!
//! A query runs `resolve`, `retrieve` and `filter` in sequence. Each stage
//! leaves a [`StageOutcome`]; the first failed stage ends the run and later
//! stages are not attempted.

use rebac_gate_policy::{CandidateDocument, PolicyError, Row};
use rootcause::prelude::Report;
use serde::Serialize;
use tracing::{debug, error};

/// Stages of a gate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resolve the data source to its binding.
    Resolve,
    /// Enumerate candidate documents or locate the row store.
    Retrieve,
    /// Apply the posture through the authorization backend.
    Filter,
}

/// Completion record of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    /// The stage.
    pub stage: Stage,
    /// Whether the stage completed.
    pub success: bool,
    /// User-safe error message if the stage failed.
    pub error: Option<String>,
}

/// Context produced by a successful query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilteredContext {
    /// Documents the user may see.
    Documents { documents: Vec<CandidateDocument> },
    /// Rows the user may see.
    Rows { rows: Vec<Row> },
}

/// Result of a gate query, suitable for handing to the next consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// The user the query ran for.
    pub user: String,
    /// The requested data source.
    pub source: String,
    /// One record per attempted stage, in order.
    pub outcomes: Vec<StageOutcome>,
    /// The filtered context, present only when every stage succeeded.
    pub context: Option<FilteredContext>,
}

impl PipelineReport {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.context.is_some() && self.outcomes.iter().all(|outcome| outcome.success)
    }
}

/// Collects stage outcomes while a query runs.
#[derive(Debug, Default)]
pub(crate) struct StageRun {
    outcomes: Vec<StageOutcome>,
}

impl StageRun {
    /// Records the outcome of `stage`, returning its value on success.
    ///
    /// Error detail goes to the log; the outcome carries only the
    /// user-safe message.
    pub(crate) fn record<T>(
        &mut self,
        stage: Stage,
        result: Result<T, Report<PolicyError>>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                debug!(?stage, "stage completed");
                self.outcomes.push(StageOutcome {
                    stage,
                    success: true,
                    error: None,
                });
                Some(value)
            }
            Err(report) => {
                error!(?stage, error = %report, "stage failed");
                self.outcomes.push(StageOutcome {
                    stage,
                    success: false,
                    error: Some(report.current_context().user_message().to_string()),
                });
                None
            }
        }
    }

    pub(crate) fn finish(
        self,
        user: &str,
        source: &str,
        context: Option<FilteredContext>,
    ) -> PipelineReport {
        PipelineReport {
            user: user.to_string(),
            source: source.to_string(),
            outcomes: self.outcomes,
            context,
        }
    }
}
