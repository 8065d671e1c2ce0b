//! rebac-gate command line.
//!
//! This crate wires configuration, authorization stores, row stores and the
//! policy filters into a [`Gate`], and exposes these commands:
//!
//! - `query <user> <source>`: print what `user` may see from `source`
//! - `write-tuples <file>`: seed relationships from a tuple document
//! - `create-store <name>`: find or create an OpenFGA store
//! - `write-auth-model <store> <file>`: write an authorization model or schema

pub mod config;
pub mod error;
pub mod gate;
pub mod pipeline;

pub use config::GateConfig;
pub use error::GateError;
pub use gate::{Gate, create_store};
pub use pipeline::{FilteredContext, PipelineReport, Stage, StageOutcome};

use rebac_gate_core::{StoreName, UserId};
use rootcause::prelude::Report;
use std::path::PathBuf;

const USAGE: &str = "usage: rebac-gate query <user> <source>
       rebac-gate write-tuples <file>
       rebac-gate create-store <name>
       rebac-gate write-auth-model <store> <file>";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Filter a data source for a user.
    Query { user: UserId, source: String },
    /// Write the tuples in a tuple document.
    WriteTuples { path: PathBuf },
    /// Find or create an OpenFGA store by name.
    CreateStore { name: String },
    /// Write the model in `path` to a configured store.
    WriteAuthModel { store: StoreName, path: PathBuf },
}

impl Command {
    /// Parses the arguments following the program name.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Usage`] for unknown commands, wrong arity or an
    /// invalid user or store name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, Report<GateError>> {
        let usage = |details: String| GateError::Usage { details };
        let args: Vec<String> = args.into_iter().collect();

        match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["query", user, source] => {
                let user = UserId::new(*user).map_err(|e| usage(format!("invalid user: {e}")))?;
                Ok(Self::Query {
                    user,
                    source: (*source).to_string(),
                })
            }
            ["write-tuples", path] => Ok(Self::WriteTuples {
                path: PathBuf::from(*path),
            }),
            ["create-store", name] if !name.trim().is_empty() => Ok(Self::CreateStore {
                name: (*name).to_string(),
            }),
            ["write-auth-model", store, path] => {
                let store =
                    StoreName::new(*store).map_err(|e| usage(format!("invalid store: {e}")))?;
                Ok(Self::WriteAuthModel {
                    store,
                    path: PathBuf::from(*path),
                })
            }
            _ => Err(usage(USAGE.to_string()).into()),
        }
    }
}
