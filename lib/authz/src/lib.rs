//! Relationship-authorization gateway for rebac-gate.
//!
//! This crate is the only place that talks to the authorization backend.
//! It provides the [`AuthorizationGateway`] call contract (point checks and
//! object listing), typed `type:id` identifiers, OpenFGA and SpiceDB
//! implementations, a per-call deadline decorator, and tuple documents for
//! seeding relationships.

mod deadline;
mod error;
mod gateway;
mod openfga;
mod spicedb;
mod tuples;
mod types;

pub use deadline::TimeoutGateway;
pub use error::AuthzError;
pub use gateway::{AuthorizationGateway, ModelWriter, RelationshipWriter, StoreWriter};
pub use openfga::{OpenFgaAdmin, OpenFgaConfig, OpenFgaGateway, OpenFgaServerConfig, OpenFgaStore};
pub use spicedb::{SpicedbConfig, SpicedbGateway};
pub use tuples::{TupleDocument, TupleEntry};
pub use types::{ITEM_TYPE, ObjectRef, Relationship, Subject, USER_TYPE};
