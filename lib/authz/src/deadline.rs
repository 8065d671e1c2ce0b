//! Per-call deadlines for gateway requests.

use crate::error::AuthzError;
use crate::gateway::AuthorizationGateway;
use crate::types::{ObjectRef, Subject};
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

/// An optional time limit for one backend call.
///
/// An expired call fails with [`AuthzError::BackendUnavailable`]; its future
/// is dropped, which cancels the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Deadline(Option<Duration>);

impl Deadline {
    pub(crate) fn after(limit: Duration) -> Self {
        Self(Some(limit))
    }

    pub(crate) async fn run<T>(
        self,
        operation: &'static str,
        call: impl Future<Output = Result<T, Report<AuthzError>>> + Send,
    ) -> Result<T, Report<AuthzError>> {
        let Some(limit) = self.0 else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    deadline_ms = limit.as_millis() as u64,
                    "backend deadline exceeded"
                );
                Err(AuthzError::BackendUnavailable {
                    details: format!("{operation} exceeded deadline of {limit:?}"),
                }
                .into())
            }
        }
    }
}

/// A client used by one call at a time.
///
/// The deadline is handed out with the lock, so time spent queueing for the
/// client does not count against it.
#[derive(Debug)]
pub(crate) struct Serialized<C> {
    client: Arc<Mutex<C>>,
    deadline: Deadline,
}

impl<C> Clone for Serialized<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            deadline: self.deadline,
        }
    }
}

impl<C> Serialized<C> {
    pub(crate) fn new(client: C) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            deadline: Deadline::default(),
        }
    }

    pub(crate) fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Deadline::after(limit);
        self
    }

    /// Waits for the client, then returns it with the deadline for the call.
    pub(crate) async fn lock(&self) -> (MutexGuard<'_, C>, Deadline) {
        (self.client.lock().await, self.deadline)
    }
}

/// Wraps a gateway so that every call fails with
/// [`AuthzError::BackendUnavailable`] once `deadline` elapses.
#[derive(Debug, Clone)]
pub struct TimeoutGateway<G> {
    inner: G,
    deadline: Deadline,
}

impl<G> TimeoutGateway<G> {
    /// Wraps `inner` with the given per-call deadline.
    #[must_use]
    pub fn new(inner: G, deadline: Duration) -> Self {
        Self {
            inner,
            deadline: Deadline::after(deadline),
        }
    }
}

#[async_trait]
impl<G: AuthorizationGateway> AuthorizationGateway for TimeoutGateway<G> {
    async fn check(
        &self,
        subject: &Subject,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, Report<AuthzError>> {
        self.deadline
            .run("check", self.inner.check(subject, relation, object))
            .await
    }

    async fn list_objects(
        &self,
        subject: &Subject,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, Report<AuthzError>> {
        self.deadline
            .run(
                "list_objects",
                self.inner.list_objects(subject, relation, object_type),
            )
            .await
    }

    fn is_valid_object_id(&self, id: &str) -> bool {
        self.inner.is_valid_object_id(id)
    }
}
