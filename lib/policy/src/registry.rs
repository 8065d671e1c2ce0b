//! Data source bindings.
//!
//! The registry is built once at startup from configuration and is
//! read-only afterwards. Every configuration problem (unknown posture,
//! dangling store reference, missing identifier column) fails the build,
//! never an individual request.

use crate::error::PolicyError;
use crate::posture::Posture;
use rebac_gate_authz::AuthorizationGateway;
use rebac_gate_core::{SourceName, StoreName};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// How a data source's items are enumerated and filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// Named text documents, checked one by one.
    DocumentSet,
    /// Table rows, filtered by one membership query on `identifier_column`.
    Tabular { identifier_column: String },
}

/// Configured kind of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKindConfig {
    Documents,
    Tabular,
}

/// Configuration entry for one data source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Authorization store holding the source's relationships.
    pub store: StoreName,
    /// Relation queried for every item (e.g. "can_read", "excluded").
    pub relation: String,
    /// Posture name, validated when the registry is built.
    pub posture: String,
    /// Kind of resource served by the source.
    pub kind: SourceKindConfig,
    /// Column holding the row identifier. Required for tabular sources.
    #[serde(default)]
    pub identifier_column: Option<String>,
}

/// A data source resolved to its authorization store, relation and posture.
#[derive(Clone)]
pub struct DataSourceBinding {
    /// The logical source name.
    pub source: SourceName,
    /// The authorization store.
    pub store: StoreName,
    /// The relation queried for every item.
    pub relation: String,
    /// The source's posture.
    pub posture: Posture,
    /// The kind of resource.
    pub kind: ResourceKind,
    gateway: Arc<dyn AuthorizationGateway>,
}

impl DataSourceBinding {
    /// Creates a binding directly.
    #[must_use]
    pub fn new(
        source: SourceName,
        store: StoreName,
        relation: impl Into<String>,
        posture: Posture,
        kind: ResourceKind,
        gateway: Arc<dyn AuthorizationGateway>,
    ) -> Self {
        Self {
            source,
            store,
            relation: relation.into(),
            posture,
            kind,
            gateway,
        }
    }

    /// Returns the gateway for the binding's store.
    #[must_use]
    pub fn gateway(&self) -> &dyn AuthorizationGateway {
        self.gateway.as_ref()
    }

    fn from_config(
        source: SourceName,
        config: &SourceConfig,
        gateways: &HashMap<StoreName, Arc<dyn AuthorizationGateway>>,
    ) -> Result<Self, Report<PolicyError>> {
        let invalid = |details: String| PolicyError::InvalidBinding {
            source_name: source.to_string(),
            details,
        };

        let posture: Posture = config.posture.parse()?;

        let gateway = gateways
            .get(&config.store)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownStore {
                name: config.store.to_string(),
            })?;

        let relation = config.relation.trim();
        if relation.is_empty() || relation.contains(|c: char| c.is_whitespace() || c == ':') {
            return Err(invalid(format!(
                "relation '{}' is not a plain name",
                config.relation
            ))
            .into());
        }

        let kind = match (config.kind, &config.identifier_column) {
            (SourceKindConfig::Documents, None) => ResourceKind::DocumentSet,
            (SourceKindConfig::Documents, Some(_)) => {
                return Err(invalid(
                    "identifier_column is only valid for tabular sources".to_string(),
                )
                .into());
            }
            (SourceKindConfig::Tabular, Some(column)) if !column.trim().is_empty() => {
                ResourceKind::Tabular {
                    identifier_column: column.trim().to_string(),
                }
            }
            (SourceKindConfig::Tabular, _) => {
                return Err(
                    invalid("tabular sources require an identifier_column".to_string()).into(),
                );
            }
        };

        Ok(Self::new(
            source,
            config.store.clone(),
            relation,
            posture,
            kind,
            gateway,
        ))
    }
}

impl fmt::Debug for DataSourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceBinding")
            .field("source", &self.source)
            .field("store", &self.store)
            .field("relation", &self.relation)
            .field("posture", &self.posture)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Read-only mapping from source name to binding.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    bindings: HashMap<SourceName, DataSourceBinding>,
}

impl StoreRegistry {
    /// Builds the registry from configured sources and the gateways of the
    /// configured stores.
    ///
    /// # Errors
    ///
    /// Fails on the first source with an invalid posture, an unknown store
    /// or an inconsistent kind.
    pub fn from_config(
        sources: &BTreeMap<SourceName, SourceConfig>,
        gateways: &HashMap<StoreName, Arc<dyn AuthorizationGateway>>,
    ) -> Result<Self, Report<PolicyError>> {
        let mut bindings = HashMap::with_capacity(sources.len());
        for (name, config) in sources {
            let binding = DataSourceBinding::from_config(name.clone(), config, gateways)?;
            info!(
                source = %binding.source,
                store = %binding.store,
                relation = %binding.relation,
                posture = %binding.posture,
                "registered data source"
            );
            bindings.insert(name.clone(), binding);
        }
        Ok(Self { bindings })
    }

    /// Builds a registry from ready-made bindings.
    #[must_use]
    pub fn from_bindings(bindings: impl IntoIterator<Item = DataSourceBinding>) -> Self {
        Self {
            bindings: bindings
                .into_iter()
                .map(|binding| (binding.source.clone(), binding))
                .collect(),
        }
    }

    /// Resolves a source name to its binding.
    pub fn resolve(&self, name: &str) -> Result<&DataSourceBinding, Report<PolicyError>> {
        self.bindings.get(name).ok_or_else(|| {
            PolicyError::UnknownSource {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Returns the registered source names in sorted order.
    #[must_use]
    pub fn sources(&self) -> Vec<&SourceName> {
        let mut names: Vec<_> = self.bindings.keys().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGateway;

    fn gateways() -> HashMap<StoreName, Arc<dyn AuthorizationGateway>> {
        let mut gateways: HashMap<StoreName, Arc<dyn AuthorizationGateway>> = HashMap::new();
        gateways.insert(
            StoreName::new("docs").unwrap(),
            Arc::new(ScriptedGateway::default()),
        );
        gateways.insert(
            StoreName::new("tables").unwrap(),
            Arc::new(ScriptedGateway::default()),
        );
        gateways
    }

    fn source(
        store: &str,
        posture: &str,
        kind: SourceKindConfig,
        column: Option<&str>,
    ) -> SourceConfig {
        SourceConfig {
            store: StoreName::new(store).unwrap(),
            relation: "can_read".to_string(),
            posture: posture.to_string(),
            kind,
            identifier_column: column.map(str::to_string),
        }
    }

    fn sources(entries: Vec<(&str, SourceConfig)>) -> BTreeMap<SourceName, SourceConfig> {
        entries
            .into_iter()
            .map(|(name, config)| (SourceName::new(name).unwrap(), config))
            .collect()
    }

    #[test]
    fn resolves_configured_sources() {
        let registry = StoreRegistry::from_config(
            &sources(vec![
                (
                    "documents",
                    source("docs", "DEFAULT_DENY", SourceKindConfig::Documents, None),
                ),
                (
                    "financial-table",
                    source(
                        "tables",
                        "DEFAULT_ALLOW_WITH_EXPLICIT_DENY",
                        SourceKindConfig::Tabular,
                        Some("id"),
                    ),
                ),
            ]),
            &gateways(),
        )
        .unwrap();

        let documents = registry.resolve("documents").unwrap();
        assert_eq!(documents.posture, Posture::DefaultDeny);
        assert_eq!(documents.kind, ResourceKind::DocumentSet);
        assert_eq!(documents.relation, "can_read");

        let financial = registry.resolve("financial-table").unwrap();
        assert_eq!(financial.posture, Posture::DefaultAllowWithExplicitDeny);
        assert_eq!(
            financial.kind,
            ResourceKind::Tabular {
                identifier_column: "id".to_string()
            }
        );
        assert_eq!(financial.store.as_str(), "tables");

        let names: Vec<&str> = registry
            .sources()
            .into_iter()
            .map(SourceName::as_str)
            .collect();
        assert_eq!(names, ["documents", "financial-table"]);
    }

    #[test]
    fn unknown_source_fails() {
        let registry = StoreRegistry::from_config(
            &sources(vec![(
                "documents",
                source("docs", "DEFAULT_DENY", SourceKindConfig::Documents, None),
            )]),
            &gateways(),
        )
        .unwrap();

        let err = registry.resolve("hr-table").unwrap_err();
        assert_eq!(
            err.current_context(),
            &PolicyError::UnknownSource {
                name: "hr-table".to_string()
            }
        );
    }

    #[test]
    fn invalid_posture_fails_at_load() {
        let err = StoreRegistry::from_config(
            &sources(vec![(
                "documents",
                source("docs", "ALLOW_ALL", SourceKindConfig::Documents, None),
            )]),
            &gateways(),
        )
        .unwrap_err();
        assert!(matches!(
            err.current_context(),
            PolicyError::InvalidPosture { .. }
        ));
    }

    #[test]
    fn dangling_store_fails_at_load() {
        let err = StoreRegistry::from_config(
            &sources(vec![(
                "documents",
                source("missing", "DEFAULT_DENY", SourceKindConfig::Documents, None),
            )]),
            &gateways(),
        )
        .unwrap_err();
        assert_eq!(
            err.current_context(),
            &PolicyError::UnknownStore {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn tabular_without_identifier_column_fails() {
        let err = StoreRegistry::from_config(
            &sources(vec![(
                "hr-table",
                source("tables", "DEFAULT_DENY", SourceKindConfig::Tabular, None),
            )]),
            &gateways(),
        )
        .unwrap_err();
        assert!(matches!(
            err.current_context(),
            PolicyError::InvalidBinding { .. }
        ));
    }

    #[test]
    fn relation_with_colon_fails() {
        let mut config = source("docs", "DEFAULT_DENY", SourceKindConfig::Documents, None);
        config.relation = "item:can_read".to_string();
        let err = StoreRegistry::from_config(&sources(vec![("documents", config)]), &gateways())
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            PolicyError::InvalidBinding { .. }
        ));
    }

    #[test]
    fn source_config_deserializes() {
        let config: SourceConfig = serde_json::from_str(
            r#"{"store": "tables", "relation": "excluded",
                "posture": "DEFAULT_ALLOW_WITH_EXPLICIT_DENY",
                "kind": "tabular", "identifier_column": "id"}"#,
        )
        .unwrap();
        assert_eq!(config.kind, SourceKindConfig::Tabular);
        assert_eq!(config.identifier_column.as_deref(), Some("id"));
    }
}
