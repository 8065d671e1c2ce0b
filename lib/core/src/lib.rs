//! Core domain types and utilities for rebac-gate.
//!
//! This crate provides the validated identifier types shared by the
//! authorization gateway, the policy filters, and the gate binary.

pub mod id;

pub use id::{ParseIdError, SourceName, StoreName, UserId};
