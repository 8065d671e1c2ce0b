//! The assembled gate: registry, filters, row stores and store writers.

use crate::config::{DocumentsConfig, GateConfig, StoreConfig, TableConfig};
use crate::error::GateError;
use crate::pipeline::{FilteredContext, PipelineReport, Stage, StageRun};
use rebac_gate_authz::{
    AuthorizationGateway, AuthzError, ModelWriter, OpenFgaAdmin, OpenFgaGateway, OpenFgaStore,
    RelationshipWriter, SpicedbGateway, StoreWriter, TimeoutGateway, TupleDocument,
};
use rebac_gate_core::{SourceName, StoreName, UserId};
use rebac_gate_policy::{
    CandidateDocument, DataSourceBinding, DocumentFilter, MemoryRowStore, PgRowStore,
    PolicyError, ResourceKind, RowStore, StoreRegistry, TabularFilter, load_corpus,
};
use rootcause::prelude::Report;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Items enumerated for a source before filtering.
enum Retrieved {
    Documents(Vec<CandidateDocument>),
    Rows(Arc<dyn RowStore>),
}

/// The composition root.
pub struct Gate {
    registry: StoreRegistry,
    tables: HashMap<SourceName, Arc<dyn RowStore>>,
    writers: HashMap<StoreName, Arc<dyn StoreWriter>>,
    documents: DocumentsConfig,
    document_filter: DocumentFilter,
    tabular_filter: TabularFilter,
}

impl Gate {
    /// Assembles a gate from ready-made parts.
    #[must_use]
    pub fn new(
        registry: StoreRegistry,
        tables: HashMap<SourceName, Arc<dyn RowStore>>,
        writers: HashMap<StoreName, Arc<dyn StoreWriter>>,
        documents: DocumentsConfig,
        max_in_flight_checks: usize,
    ) -> Self {
        Self {
            registry,
            tables,
            writers,
            documents,
            document_filter: DocumentFilter::new(max_in_flight_checks),
            tabular_filter: TabularFilter::new(),
        }
    }

    /// Connects every configured store and row store.
    ///
    /// Reads go through a per-call deadline; writes use the raw client. A
    /// SpiceDB read's deadline starts once it holds the shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be reached, a source is invalid or
    /// a row store cannot be opened.
    pub async fn build(config: GateConfig) -> Result<Self, Report<GateError>> {
        let deadline = config.limits.backend_timeout();
        let mut gateways: HashMap<StoreName, Arc<dyn AuthorizationGateway>> = HashMap::new();
        let mut writers: HashMap<StoreName, Arc<dyn StoreWriter>> = HashMap::new();

        for (name, store) in &config.stores {
            let setup_failed = |e: Report<AuthzError>| GateError::StoreSetup {
                store: name.to_string(),
                details: e.to_string(),
            };
            match store {
                StoreConfig::Openfga(openfga) => {
                    let gateway = OpenFgaGateway::new(openfga.clone()).map_err(setup_failed)?;
                    gateways.insert(
                        name.clone(),
                        Arc::new(TimeoutGateway::new(gateway.clone(), deadline)),
                    );
                    writers.insert(name.clone(), Arc::new(gateway));
                }
                StoreConfig::Spicedb(spicedb) => {
                    let gateway = SpicedbGateway::connect(spicedb.clone())
                        .await
                        .map_err(setup_failed)?;
                    writers.insert(name.clone(), Arc::new(gateway.clone()));
                    gateways.insert(name.clone(), Arc::new(gateway.with_deadline(deadline)));
                }
            }
            info!(store = %name, "authorization store ready");
        }

        let registry =
            StoreRegistry::from_config(&config.sources, &gateways).map_err(|e| {
                GateError::Config {
                    details: e.to_string(),
                }
            })?;

        let mut tables = HashMap::with_capacity(config.tables.len());
        for (source, table) in &config.tables {
            tables.insert(source.clone(), open_table(source, table).await?);
        }

        Ok(Self::new(
            registry,
            tables,
            writers,
            config.documents,
            config.limits.max_in_flight_checks,
        ))
    }

    /// Runs resolve, retrieve and filter for `user` against `source`.
    ///
    /// Never fails: a failed stage is recorded in the report and no context
    /// is returned.
    #[instrument(skip(self, user), fields(user = %user))]
    pub async fn query(&self, user: &UserId, source: &str) -> PipelineReport {
        let mut run = StageRun::default();

        let Some(binding) = run.record(Stage::Resolve, self.registry.resolve(source)) else {
            return run.finish(user.as_str(), source, None);
        };
        let Some(retrieved) = run.record(Stage::Retrieve, self.retrieve(binding).await) else {
            return run.finish(user.as_str(), source, None);
        };
        let context = run.record(Stage::Filter, self.filter(user, binding, retrieved).await);

        run.finish(user.as_str(), source, context)
    }

    async fn retrieve(
        &self,
        binding: &DataSourceBinding,
    ) -> Result<Retrieved, Report<PolicyError>> {
        match binding.kind {
            ResourceKind::DocumentSet => {
                let documents = load_corpus(&self.documents.dir, &self.documents.extension).await?;
                Ok(Retrieved::Documents(documents))
            }
            ResourceKind::Tabular { .. } => {
                let rows = self.tables.get(&binding.source).cloned().ok_or_else(|| {
                    PolicyError::InvalidBinding {
                        source_name: binding.source.to_string(),
                        details: "no row store configured".to_string(),
                    }
                })?;
                Ok(Retrieved::Rows(rows))
            }
        }
    }

    async fn filter(
        &self,
        user: &UserId,
        binding: &DataSourceBinding,
        retrieved: Retrieved,
    ) -> Result<FilteredContext, Report<PolicyError>> {
        match retrieved {
            Retrieved::Documents(candidates) => {
                let documents = self
                    .document_filter
                    .filter(user, candidates, binding)
                    .await?;
                Ok(FilteredContext::Documents { documents })
            }
            Retrieved::Rows(store) => {
                let rows = self
                    .tabular_filter
                    .filter(user, binding, store.as_ref())
                    .await?;
                Ok(FilteredContext::Rows { rows })
            }
        }
    }

    /// Writes an authorization model to `store`.
    ///
    /// Returns the new model ID on backends that version models.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not configured or the write fails.
    #[instrument(skip(self, model))]
    pub async fn write_model(
        &self,
        store: &str,
        model: &str,
    ) -> Result<Option<String>, Report<GateError>> {
        let writer = self
            .writers
            .get(store)
            .ok_or_else(|| GateError::UnknownStore {
                name: store.to_string(),
            })?;
        let model_id = writer
            .write_model(model)
            .await
            .map_err(|e| GateError::ModelWrite {
                store: store.to_string(),
                details: e.to_string(),
            })?;
        info!(model_id = model_id.as_deref(), "authorization model written");
        Ok(model_id)
    }

    /// Writes every tuple in `document` to its store, returning the count.
    ///
    /// # Errors
    ///
    /// Stops at the first unknown store, malformed tuple or failed write.
    pub async fn write_tuples(&self, document: &TupleDocument) -> Result<usize, Report<GateError>> {
        let mut written = 0;
        for (store, entries) in &document.store_to_tuples {
            let writer = self
                .writers
                .get(store)
                .ok_or_else(|| GateError::UnknownStore {
                    name: store.to_string(),
                })?;
            info!(store = %store, count = entries.len(), "writing tuples");

            for entry in entries {
                let failed = |e: Report<AuthzError>| GateError::TupleWrite {
                    tuple: entry.friendly_name.clone(),
                    details: e.to_string(),
                };
                let relationship = entry.relationship().map_err(failed)?;
                info!(tuple = %entry.friendly_name, %relationship, "writing tuple");
                writer
                    .write_relationship(&relationship)
                    .await
                    .map_err(failed)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Finds or creates the OpenFGA store called `name` on the configured server.
///
/// # Errors
///
/// Returns an error if no `openfga_server` is configured or the server
/// cannot be reached.
pub async fn create_store(
    config: &GateConfig,
    name: &str,
) -> Result<OpenFgaStore, Report<GateError>> {
    let server = config
        .openfga_server
        .clone()
        .ok_or_else(|| GateError::Config {
            details: "create-store needs an [openfga_server] section".to_string(),
        })?;
    let failed = |e: Report<AuthzError>| GateError::StoreCreate {
        name: name.to_string(),
        details: e.to_string(),
    };
    let admin = OpenFgaAdmin::new(server).map_err(failed)?;
    let store = admin.get_or_create_store(name).await.map_err(failed)?;
    Ok(store)
}

async fn open_table(
    source: &SourceName,
    table: &TableConfig,
) -> Result<Arc<dyn RowStore>, Report<GateError>> {
    let failed = |details: String| GateError::TableSetup {
        source_name: source.to_string(),
        details,
    };

    match table {
        TableConfig::Json { path } => {
            let json = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| failed(format!("{}: {e}", path.display())))?;
            let store = MemoryRowStore::from_json(&json).map_err(|e| failed(e.to_string()))?;
            info!(source = %source, rows = store.len(), "loaded rows");
            Ok(Arc::new(store))
        }
        TableConfig::Postgres {
            database_url,
            table,
            order_by,
        } => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .map_err(|e| failed(e.to_string()))?;
            let store = PgRowStore::new(pool, table.clone(), order_by.clone())
                .map_err(|e| failed(e.to_string()))?;
            info!(source = %source, table = %table, "connected row store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rebac_gate_authz::{ObjectRef, Relationship, Subject};
    use rebac_gate_policy::{Posture, Row};
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Answers from a fixed set of related item IDs, or fails every call.
    #[derive(Default)]
    struct FixedGateway {
        related: BTreeSet<String>,
        down: bool,
    }

    impl FixedGateway {
        fn related(ids: &[&str]) -> Self {
            Self {
                related: ids.iter().map(|id| id.to_string()).collect(),
                down: false,
            }
        }

        fn down() -> Self {
            Self {
                down: true,
                ..Self::default()
            }
        }

        fn unavailable(&self) -> Result<(), Report<AuthzError>> {
            if self.down {
                return Err(AuthzError::BackendUnavailable {
                    details: "connection refused".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AuthorizationGateway for FixedGateway {
        async fn check(
            &self,
            _subject: &Subject,
            _relation: &str,
            object: &ObjectRef,
        ) -> Result<bool, Report<AuthzError>> {
            self.unavailable()?;
            Ok(self.related.contains(&object.id))
        }

        async fn list_objects(
            &self,
            _subject: &Subject,
            _relation: &str,
            _object_type: &str,
        ) -> Result<Vec<String>, Report<AuthzError>> {
            self.unavailable()?;
            Ok(self.related.iter().cloned().collect())
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Vec<String>>,
        models: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelationshipWriter for RecordingWriter {
        async fn write_relationship(
            &self,
            relationship: &Relationship,
        ) -> Result<(), Report<AuthzError>> {
            self.written.lock().unwrap().push(relationship.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl ModelWriter for RecordingWriter {
        async fn write_model(&self, model: &str) -> Result<Option<String>, Report<AuthzError>> {
            if model.is_empty() {
                return Err(AuthzError::Rejected {
                    status: 400,
                    details: "empty model".to_string(),
                }
                .into());
            }
            let mut models = self.models.lock().unwrap();
            models.push(model.to_string());
            Ok(Some(format!("model-{}", models.len())))
        }
    }

    fn writing_gate(writer: Arc<RecordingWriter>) -> Gate {
        let mut writers: HashMap<StoreName, Arc<dyn StoreWriter>> = HashMap::new();
        writers.insert(StoreName::new("documents").unwrap(), writer);
        Gate::new(
            StoreRegistry::default(),
            HashMap::new(),
            writers,
            DocumentsConfig::default(),
            1,
        )
    }

    fn binding(
        source: &str,
        posture: Posture,
        kind: ResourceKind,
        gateway: FixedGateway,
    ) -> DataSourceBinding {
        DataSourceBinding::new(
            SourceName::new(source).unwrap(),
            StoreName::new("store").unwrap(),
            "can_read",
            posture,
            kind,
            Arc::new(gateway),
        )
    }

    fn financial_rows() -> Arc<dyn RowStore> {
        let rows: Vec<Row> = ["r1", "r2", "r3"]
            .iter()
            .map(|id| match json!({"id": id, "amount": 10}) {
                serde_json::Value::Object(row) => row,
                _ => unreachable!(),
            })
            .collect();
        Arc::new(MemoryRowStore::new(rows))
    }

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "classified").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        dir
    }

    fn gate(bindings: Vec<DataSourceBinding>, documents_dir: &std::path::Path) -> Gate {
        let mut tables = HashMap::new();
        tables.insert(SourceName::new("financial-table").unwrap(), financial_rows());
        Gate::new(
            StoreRegistry::from_bindings(bindings),
            tables,
            HashMap::new(),
            DocumentsConfig {
                dir: documents_dir.to_path_buf(),
                extension: "txt".to_string(),
            },
            4,
        )
    }

    fn anne() -> UserId {
        UserId::new("anne").unwrap()
    }

    #[tokio::test]
    async fn documents_are_filtered_by_relationship() {
        let dir = corpus();
        let gate = gate(
            vec![binding(
                "documents",
                Posture::DefaultDeny,
                ResourceKind::DocumentSet,
                FixedGateway::related(&["readme.txt"]),
            )],
            dir.path(),
        );

        let report = gate.query(&anne(), "documents").await;

        assert!(report.succeeded());
        assert_eq!(report.outcomes.len(), 3);
        let Some(FilteredContext::Documents { documents }) = report.context else {
            panic!("expected documents");
        };
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].object_id(), Some("readme.txt"));
        assert_eq!(documents[0].content, "hello");
    }

    #[tokio::test]
    async fn rows_with_explicit_deny_are_excluded() {
        let dir = corpus();
        let gate = gate(
            vec![binding(
                "financial-table",
                Posture::DefaultAllowWithExplicitDeny,
                ResourceKind::Tabular {
                    identifier_column: "id".to_string(),
                },
                FixedGateway::related(&["r2"]),
            )],
            dir.path(),
        );

        let report = gate.query(&anne(), "financial-table").await;

        let Some(FilteredContext::Rows { rows }) = report.context else {
            panic!("expected rows");
        };
        let ids: Vec<&str> = rows.iter().filter_map(|row| row["id"].as_str()).collect();
        assert_eq!(ids, ["r1", "r3"]);
    }

    #[tokio::test]
    async fn unknown_source_stops_at_resolve() {
        let dir = corpus();
        let gate = gate(vec![], dir.path());

        let report = gate.query(&anne(), "hr-table").await;

        assert!(!report.succeeded());
        assert!(report.context.is_none());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].stage, Stage::Resolve);
        assert_eq!(
            report.outcomes[0].error.as_deref(),
            Some("unknown data source")
        );
    }

    #[tokio::test]
    async fn backend_failure_returns_no_context() {
        let dir = corpus();
        let gate = gate(
            vec![binding(
                "documents",
                Posture::DefaultAllowWithExplicitDeny,
                ResourceKind::DocumentSet,
                FixedGateway::down(),
            )],
            dir.path(),
        );

        let report = gate.query(&anne(), "documents").await;

        assert!(report.context.is_none());
        let last = report.outcomes.last().unwrap();
        assert_eq!(last.stage, Stage::Filter);
        assert!(!last.success);
        assert_eq!(last.error.as_deref(), Some("unable to retrieve data"));
    }

    #[tokio::test]
    async fn missing_corpus_fails_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(
            vec![binding(
                "documents",
                Posture::DefaultDeny,
                ResourceKind::DocumentSet,
                FixedGateway::related(&[]),
            )],
            &dir.path().join("missing"),
        );

        let report = gate.query(&anne(), "documents").await;

        assert_eq!(report.outcomes.last().unwrap().stage, Stage::Retrieve);
        assert!(report.context.is_none());
    }

    #[tokio::test]
    async fn tuples_are_written_to_their_store() {
        let writer = Arc::new(RecordingWriter::default());
        let gate = writing_gate(writer.clone());

        let document = TupleDocument::from_json(
            r#"{"store_to_tuples": {"documents": [
                {"friendly_name": "anne readme", "relation_body": "user:anne can_read item:readme.txt"},
                {"friendly_name": "bob readme", "relation_body": "user:bob can_read item:readme.txt"}
            ]}}"#,
        )
        .unwrap();

        assert_eq!(gate.write_tuples(&document).await.unwrap(), 2);
        assert_eq!(
            *writer.written.lock().unwrap(),
            [
                "user:anne can_read item:readme.txt",
                "user:bob can_read item:readme.txt"
            ]
        );
    }

    #[tokio::test]
    async fn tuples_for_unknown_store_are_rejected() {
        let gate = Gate::new(
            StoreRegistry::default(),
            HashMap::new(),
            HashMap::new(),
            DocumentsConfig::default(),
            1,
        );
        let document = TupleDocument::from_json(
            r#"{"store_to_tuples": {"hr": [
                {"friendly_name": "x", "relation_body": "user:anne can_read item:x"}
            ]}}"#,
        )
        .unwrap();

        let err = gate.write_tuples(&document).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            GateError::UnknownStore { .. }
        ));
    }

    #[tokio::test]
    async fn model_is_written_to_its_store() {
        let writer = Arc::new(RecordingWriter::default());
        let gate = writing_gate(writer.clone());

        let model_id = gate
            .write_model("documents", r#"{"schema_version": "1.1"}"#)
            .await
            .unwrap();

        assert_eq!(model_id.as_deref(), Some("model-1"));
        assert_eq!(
            *writer.models.lock().unwrap(),
            [r#"{"schema_version": "1.1"}"#]
        );
    }

    #[tokio::test]
    async fn model_write_failures_are_reported() {
        let gate = writing_gate(Arc::new(RecordingWriter::default()));

        let err = gate.write_model("hr", "definition user {}").await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            GateError::UnknownStore { name } if name == "hr"
        ));

        let err = gate.write_model("documents", "").await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            GateError::ModelWrite { store, .. } if store == "documents"
        ));
    }

    #[tokio::test]
    async fn create_store_needs_a_server() {
        let config = GateConfig::from_toml("").unwrap();

        let err = create_store(&config, "rebac-demo").await.unwrap_err();
        assert!(matches!(err.current_context(), GateError::Config { .. }));
    }

    #[tokio::test]
    async fn json_table_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("financial_data.json");
        std::fs::write(&path, r#"[{"id": "r1"}, {"id": "r2"}]"#).unwrap();

        let source = SourceName::new("financial-table").unwrap();
        let store = open_table(&source, &TableConfig::Json { path }).await;
        assert!(store.is_ok());

        let missing = TableConfig::Json {
            path: dir.path().join("missing.json"),
        };
        let err = open_table(&source, &missing).await.err().unwrap();
        assert!(matches!(
            err.current_context(),
            GateError::TableSetup { .. }
        ));
    }
}
