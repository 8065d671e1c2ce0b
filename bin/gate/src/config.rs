//! Gate configuration.
//!
//! Loaded via the `config` crate from an optional file named by
//! `GATE_CONFIG`, overridden by `GATE_`-prefixed environment variables
//! using `__` as the nesting separator (e.g. `GATE_LIMITS__BACKEND_TIMEOUT_MS`).

use crate::error::GateError;
use rebac_gate_authz::{OpenFgaConfig, OpenFgaServerConfig, SpicedbConfig};
use rebac_gate_core::{SourceName, StoreName};
use rebac_gate_policy::{DEFAULT_MAX_IN_FLIGHT, SourceConfig, SourceKindConfig};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct GateConfig {
    /// Authorization stores by name.
    #[serde(default)]
    pub stores: BTreeMap<StoreName, StoreConfig>,
    /// Data sources by name.
    #[serde(default)]
    pub sources: BTreeMap<SourceName, SourceConfig>,
    /// Row stores for tabular sources, keyed by source name.
    #[serde(default)]
    pub tables: BTreeMap<SourceName, TableConfig>,
    /// Where documents are read from.
    #[serde(default)]
    pub documents: DocumentsConfig,
    /// Backend protection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// OpenFGA server used by `create-store`.
    #[serde(default)]
    pub openfga_server: Option<OpenFgaServerConfig>,
}

/// Backend of one authorization store.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Openfga(OpenFgaConfig),
    Spicedb(SpicedbConfig),
}

/// Row store backing a tabular source.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableConfig {
    /// A JSON array of row objects, loaded into memory at startup.
    Json { path: PathBuf },
    /// A PostgreSQL table.
    Postgres {
        database_url: String,
        table: String,
        #[serde(default)]
        order_by: Option<String>,
    },
}

/// Document corpus location.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    /// Directory scanned for documents (not recursive).
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    /// Extension of the files to load.
    #[serde(default = "default_document_extension")]
    pub extension: String,
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data/documents")
}

fn default_document_extension() -> String {
    "txt".to_string()
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            extension: default_document_extension(),
        }
    }
}

/// Limits protecting the authorization backend.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent checks per document filter call.
    #[serde(default = "default_max_in_flight_checks")]
    pub max_in_flight_checks: usize,
    /// Deadline for every backend call, in milliseconds.
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
}

fn default_max_in_flight_checks() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_in_flight_checks: default_max_in_flight_checks(),
            backend_timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl LimitsConfig {
    /// Returns the per-call backend deadline.
    #[must_use]
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl GateConfig {
    /// Loads configuration from the optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is missing, malformed or inconsistent.
    pub fn load() -> Result<Self, Report<GateError>> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("GATE_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("GATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| GateError::Config {
                details: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self, Report<GateError>> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| GateError::Config {
                details: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-references that serde cannot: limits are usable and
    /// every tabular source has exactly one row store.
    pub fn validate(&self) -> Result<(), Report<GateError>> {
        let invalid = |details: String| GateError::Config { details };

        if self.limits.max_in_flight_checks == 0 {
            return Err(
                invalid("limits.max_in_flight_checks must be at least 1".to_string()).into(),
            );
        }
        if self.limits.backend_timeout_ms == 0 {
            return Err(
                invalid("limits.backend_timeout_ms must be at least 1".to_string()).into(),
            );
        }

        for (name, source) in &self.sources {
            if source.kind == SourceKindConfig::Tabular && !self.tables.contains_key(name) {
                return Err(
                    invalid(format!("tabular source '{name}' has no table configured")).into(),
                );
            }
        }
        for name in self.tables.keys() {
            match self.sources.get(name) {
                Some(source) if source.kind == SourceKindConfig::Tabular => {}
                _ => {
                    return Err(invalid(format!(
                        "table '{name}' does not belong to a tabular source"
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}
