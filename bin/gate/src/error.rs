//! Startup and command errors for the gate binary.

use std::fmt;

/// Errors raised while assembling the gate or running its commands.
#[derive(Debug)]
pub enum GateError {
    /// Configuration could not be loaded or is inconsistent.
    Config { details: String },
    /// An authorization store could not be set up.
    StoreSetup { store: String, details: String },
    /// A row store for a tabular source could not be set up.
    TableSetup { source_name: String, details: String },
    /// A tuple document names a store that is not configured.
    UnknownStore { name: String },
    /// Writing a tuple failed.
    TupleWrite { tuple: String, details: String },
    /// Writing an authorization model failed.
    ModelWrite { store: String, details: String },
    /// An OpenFGA store could not be looked up or created.
    StoreCreate { name: String, details: String },
    /// The command line could not be parsed.
    Usage { details: String },
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {}", details),
            Self::StoreSetup { store, details } => {
                write!(f, "failed to set up store '{}': {}", store, details)
            }
            Self::TableSetup {
                source_name,
                details,
            } => {
                write!(
                    f,
                    "failed to set up rows for source '{}': {}",
                    source_name, details
                )
            }
            Self::UnknownStore { name } => write!(f, "unknown store '{}'", name),
            Self::TupleWrite { tuple, details } => {
                write!(f, "failed to write tuple '{}': {}", tuple, details)
            }
            Self::ModelWrite { store, details } => {
                write!(f, "failed to write model to store '{}': {}", store, details)
            }
            Self::StoreCreate { name, details } => {
                write!(f, "failed to create store '{}': {}", name, details)
            }
            Self::Usage { details } => write!(f, "{}", details),
        }
    }
}

impl std::error::Error for GateError {}
