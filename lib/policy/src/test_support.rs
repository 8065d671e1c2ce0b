//! In-memory gateway fake shared by the filter tests.

use async_trait::async_trait;
use rebac_gate_authz::{AuthorizationGateway, AuthzError, ObjectRef, Subject};
use rootcause::prelude::Report;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Answers checks from a fixed set of related objects and records every call.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGateway {
    /// Object IDs (`item:` stripped) for which `check` returns true.
    related: HashSet<String>,
    /// Object IDs for which `check` fails.
    failing: HashSet<String>,
    /// Answer to `list_objects`; `None` makes it fail.
    listed: Option<Vec<String>>,
    /// Delay applied to every check.
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub(crate) fn related(ids: &[&str]) -> Self {
        Self {
            related: ids.iter().map(|id| id.to_string()).collect(),
            listed: Some(ids.iter().map(|id| id.to_string()).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn unavailable_listing() -> Self {
        Self::default()
    }

    pub(crate) fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn unavailable() -> Report<AuthzError> {
        AuthzError::BackendUnavailable {
            details: "scripted outage".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl AuthorizationGateway for ScriptedGateway {
    async fn check(
        &self,
        subject: &Subject,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, Report<AuthzError>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("check {subject} {relation} {object}"));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&object.id) {
            return Err(Self::unavailable());
        }
        Ok(self.related.contains(&object.id))
    }

    async fn list_objects(
        &self,
        subject: &Subject,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, Report<AuthzError>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("list {subject} {relation} {object_type}"));
        self.listed.clone().ok_or_else(Self::unavailable)
    }
}

/// Rows keyed by identifier for tabular tests.
pub(crate) fn rows(ids: &[&str]) -> Vec<crate::row_store::Row> {
    ids.iter()
        .map(|id| {
            let mut row = serde_json::Map::new();
            row.insert("id".to_string(), serde_json::Value::from(*id));
            row.insert(
                "label".to_string(),
                serde_json::Value::from(format!("row {id}")),
            );
            row
        })
        .collect()
}

