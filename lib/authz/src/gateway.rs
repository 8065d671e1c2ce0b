//! Call contract to the relationship-authorization backend.
//!
//! Gateways answer two questions and nothing more: does a relation hold
//! between a subject and one object, and which objects of a type does a
//! subject relate to. They do not cache, retry or deduplicate; a failed
//! call surfaces as [`AuthzError::BackendUnavailable`] and never as a
//! negative answer.

use crate::error::AuthzError;
use crate::types::{ObjectRef, Relationship, Subject};
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::sync::Arc;

/// Read access to the relationship-authorization backend.
#[async_trait]
pub trait AuthorizationGateway: Send + Sync {
    /// Checks whether `relation` holds between `subject` and `object`.
    async fn check(
        &self,
        subject: &Subject,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, Report<AuthzError>>;

    /// Lists the IDs of every object of `object_type` that `subject`
    /// relates to via `relation`.
    ///
    /// The result is unordered and may contain duplicates.
    async fn list_objects(
        &self,
        subject: &Subject,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, Report<AuthzError>>;

    /// Returns whether the backend accepts `id` as an object ID.
    ///
    /// The default rule is the conservative one shared by the supported
    /// backends: 1 to 256 bytes with no whitespace, `:`, `#` or `@`.
    fn is_valid_object_id(&self, id: &str) -> bool {
        !id.is_empty()
            && id.len() <= 256
            && !id.contains(|c: char| c.is_whitespace() || matches!(c, ':' | '#' | '@'))
    }
}

/// Write access to the relationship-authorization backend.
#[async_trait]
pub trait RelationshipWriter: Send + Sync {
    /// Writes a relationship tuple. Writing an existing tuple is not an error.
    async fn write_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), Report<AuthzError>>;
}

/// Replaces the authorization model of a store.
#[async_trait]
pub trait ModelWriter: Send + Sync {
    /// Writes `model` in the backend's own format, returning the identifier
    /// the backend assigned to it, if it assigns one.
    async fn write_model(&self, model: &str) -> Result<Option<String>, Report<AuthzError>>;
}

/// Everything the seeding commands write to a store.
pub trait StoreWriter: RelationshipWriter + ModelWriter {}

impl<W: RelationshipWriter + ModelWriter + ?Sized> StoreWriter for W {}

#[async_trait]
impl<G: AuthorizationGateway + ?Sized> AuthorizationGateway for Arc<G> {
    async fn check(
        &self,
        subject: &Subject,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, Report<AuthzError>> {
        (**self).check(subject, relation, object).await
    }

    async fn list_objects(
        &self,
        subject: &Subject,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, Report<AuthzError>> {
        (**self).list_objects(subject, relation, object_type).await
    }

    fn is_valid_object_id(&self, id: &str) -> bool {
        (**self).is_valid_object_id(id)
    }
}

#[async_trait]
impl<W: RelationshipWriter + ?Sized> RelationshipWriter for Arc<W> {
    async fn write_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), Report<AuthzError>> {
        (**self).write_relationship(relationship).await
    }
}

#[async_trait]
impl<W: ModelWriter + ?Sized> ModelWriter for Arc<W> {
    async fn write_model(&self, model: &str) -> Result<Option<String>, Report<AuthzError>> {
        (**self).write_model(model).await
    }
}
