use rebac_gate::{Command, Gate, GateConfig, create_store};
use rebac_gate_authz::TupleDocument;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let config = GateConfig::load().expect("failed to load configuration");
    tracing::info!(
        stores = config.stores.len(),
        sources = config.sources.len(),
        "Loaded configuration"
    );

    // Store creation runs before any store is configured.
    if let Command::CreateStore { name } = &command {
        return match create_store(&config, name).await {
            Ok(store) => {
                let json = serde_json::to_string_pretty(&store).expect("store serializes to JSON");
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to create store");
                ExitCode::FAILURE
            }
        };
    }

    let gate = Gate::build(config).await.expect("failed to build gate");

    match command {
        Command::Query { user, source } => {
            let report = gate.query(&user, &source).await;
            let json =
                serde_json::to_string_pretty(&report).expect("report serializes to JSON");
            println!("{json}");
            if report.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::WriteTuples { path } => {
            let json = match tokio::fs::read_to_string(&path).await {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "failed to read tuple document"
                    );
                    return ExitCode::FAILURE;
                }
            };
            let result = match TupleDocument::from_json(&json) {
                Ok(document) => gate.write_tuples(&document).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match result {
                Ok(written) => {
                    tracing::info!(written, "tuples written");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to write tuples");
                    ExitCode::FAILURE
                }
            }
        }
        Command::WriteAuthModel { store, path } => {
            let model = match tokio::fs::read_to_string(&path).await {
                Ok(model) => model,
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "failed to read authorization model"
                    );
                    return ExitCode::FAILURE;
                }
            };
            match gate.write_model(store.as_str(), &model).await {
                Ok(model_id) => {
                    if let Some(model_id) = model_id {
                        println!("{model_id}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to write authorization model");
                    ExitCode::FAILURE
                }
            }
        }
        Command::CreateStore { .. } => unreachable!("handled before the gate is built"),
    }
}
