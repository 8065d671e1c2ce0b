//! SpiceDB gateway.
//!
//! Relations are passed to SpiceDB as permission names, so a schema that
//! defines `can_read` as a relation or a permission both work.
//!
//! SpiceDB object IDs are limited to `[a-zA-Z0-9/_|\-=+]`, so file names
//! with an extension are not valid document IDs on this backend.

use crate::error::AuthzError;
use crate::deadline::Serialized;
use crate::gateway::{AuthorizationGateway, ModelWriter, RelationshipWriter};
use crate::types::{ObjectRef, Relationship, Subject};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::Deserialize;
use spicedb_client::SpicedbClient;
use spicedb_grpc::authzed::api::v1::{
    CheckPermissionRequest, Consistency, LookupResourcesRequest, ObjectReference,
    RelationshipUpdate, SubjectReference, WriteRelationshipsRequest,
    check_permission_response::Permissionship, relationship_update,
};
use std::time::Duration;
use tracing::{debug, instrument};

/// Connection settings for a SpiceDB store.
#[derive(Debug, Clone, Deserialize)]
pub struct SpicedbConfig {
    /// The SpiceDB gRPC endpoint (e.g., "http://localhost:50051").
    pub endpoint: String,
    /// The preshared key for authentication.
    pub preshared_key: String,
}

/// Longest object ID SpiceDB accepts.
const MAX_OBJECT_ID_LEN: usize = 1024;

/// SpiceDB gateway.
///
/// The underlying client needs `&mut` access per call, so concurrent
/// calls against one store are serialized. A deadline set with
/// [`SpicedbGateway::with_deadline`] starts once a call holds the client.
#[derive(Clone)]
pub struct SpicedbGateway {
    inner: Serialized<SpicedbClient>,
}

impl SpicedbGateway {
    /// Connects to SpiceDB.
    ///
    /// Note: The endpoint and preshared_key are leaked to satisfy the 'static
    /// lifetime requirements of the underlying gRPC client. Gateways are
    /// built once at startup and live for the duration of the process.
    pub async fn connect(config: SpicedbConfig) -> Result<Self, Report<AuthzError>> {
        let endpoint: &'static str = Box::leak(config.endpoint.into_boxed_str());
        let preshared_key: &'static str = Box::leak(config.preshared_key.into_boxed_str());

        let client = SpicedbClient::from_url_and_preshared_key(endpoint, preshared_key)
            .await
            .map_err(|e| AuthzError::ConnectionFailed {
                details: e.to_string(),
            })?;

        Ok(Self {
            inner: Serialized::new(client),
        })
    }

    /// Bounds every call, not counting time spent waiting for the client.
    #[must_use]
    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self {
            inner: self.inner.with_deadline(deadline),
        }
    }
}

fn is_spicedb_object_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_OBJECT_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '|' | '-' | '=' | '+'))
}

fn unavailable(e: impl std::fmt::Display) -> AuthzError {
    AuthzError::BackendUnavailable {
        details: e.to_string(),
    }
}

fn object_reference(object_type: &str, id: &str) -> ObjectReference {
    ObjectReference {
        object_type: object_type.to_string(),
        object_id: id.to_string(),
    }
}

fn subject_reference(subject: &Subject) -> SubjectReference {
    SubjectReference {
        object: Some(object_reference(&subject.subject_type, &subject.id)),
        optional_relation: String::new(),
    }
}

fn fully_consistent() -> Consistency {
    Consistency {
        requirement: Some(
            spicedb_grpc::authzed::api::v1::consistency::Requirement::FullyConsistent(true),
        ),
    }
}

#[async_trait]
impl AuthorizationGateway for SpicedbGateway {
    #[instrument(skip(self), fields(subject = %subject, object = %object))]
    async fn check(
        &self,
        subject: &Subject,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, Report<AuthzError>> {
        let request = CheckPermissionRequest {
            resource: Some(object_reference(&object.object_type, &object.id)),
            permission: relation.to_string(),
            subject: Some(subject_reference(subject)),
            consistency: Some(fully_consistent()),
            ..Default::default()
        };

        let (mut client, deadline) = self.inner.lock().await;
        let response = deadline
            .run("check", async {
                let response = client.check_permission(request).await.map_err(unavailable)?;
                Ok(response)
            })
            .await?;

        let allowed = response.permissionship() == Permissionship::HasPermission;
        debug!(allowed, "check result");
        Ok(allowed)
    }

    #[instrument(skip(self), fields(subject = %subject))]
    async fn list_objects(
        &self,
        subject: &Subject,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, Report<AuthzError>> {
        use tokio_stream::StreamExt;

        let request = LookupResourcesRequest {
            resource_object_type: object_type.to_string(),
            permission: relation.to_string(),
            subject: Some(subject_reference(subject)),
            consistency: Some(fully_consistent()),
            ..Default::default()
        };

        let (mut client, deadline) = self.inner.lock().await;
        let ids = deadline
            .run("list_objects", async {
                let mut response = client.lookup_resources(request).await.map_err(unavailable)?;

                // A stream error mid-way invalidates the whole listing.
                let mut ids = Vec::new();
                while let Some(result) = response.next().await {
                    ids.push(result.map_err(unavailable)?.resource_object_id);
                }
                Ok(ids)
            })
            .await?;

        debug!(count = ids.len(), "list objects result");
        Ok(ids)
    }

    fn is_valid_object_id(&self, id: &str) -> bool {
        is_spicedb_object_id(id)
    }
}

#[async_trait]
impl RelationshipWriter for SpicedbGateway {
    #[instrument(skip(self), fields(relationship = %relationship))]
    async fn write_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), Report<AuthzError>> {
        let update = RelationshipUpdate {
            operation: relationship_update::Operation::Touch as i32,
            relationship: Some(spicedb_grpc::authzed::api::v1::Relationship {
                resource: Some(object_reference(
                    &relationship.object.object_type,
                    &relationship.object.id,
                )),
                relation: relationship.relation.clone(),
                subject: Some(subject_reference(&relationship.subject)),
                optional_caveat: None,
            }),
        };

        let request = WriteRelationshipsRequest {
            updates: vec![update],
            ..Default::default()
        };

        let (mut client, deadline) = self.inner.lock().await;
        deadline
            .run("write_relationship", async {
                client.write_relationships(request).await.map_err(unavailable)?;
                Ok(())
            })
            .await?;

        debug!("relationship written");
        Ok(())
    }
}

#[async_trait]
impl ModelWriter for SpicedbGateway {
    /// Writes a schema. SpiceDB does not version schemas, so no ID is returned.
    #[instrument(skip(self, model))]
    async fn write_model(&self, model: &str) -> Result<Option<String>, Report<AuthzError>> {
        let (mut client, deadline) = self.inner.lock().await;
        deadline
            .run("write_schema", async {
                client.write_schema(model).await.map_err(unavailable)?;
                Ok(())
            })
            .await?;

        debug!("schema written");
        Ok(None)
    }
}
