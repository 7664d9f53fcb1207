use std::env;

use omopfhir_mapping::IngestionScheduler;
use omopfhir_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use omopfhir_server::{AppState, ServerBuilder};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From OMOPFHIR_CONFIG environment variable
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (OMOPFHIR_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    omopfhir_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    omopfhir_server::observability::apply_logging_level(&cfg.logging.level);

    let state = match AppState::from_config(&cfg).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Storage initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    let ingestion = match state.pipeline.clone() {
        Some(pipeline) => {
            let settings = pipeline.settings();
            tracing::info!(
                directory = %settings.directory.display(),
                processed = ?settings.processed,
                rejected = ?settings.rejected,
                "Local mapping ingestion enabled"
            );
            Some(IngestionScheduler::new(pipeline, cfg.ingestion.interval()).spawn())
        }
        None => {
            tracing::info!("Local mapping ingestion disabled");
            None
        }
    };

    let server = match ServerBuilder::new()
        .with_config(cfg)
        .with_state(state)
        .build()
        .await
    {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
    }

    if let Some(handle) = ingestion {
        handle.shutdown().await;
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: OMOPFHIR_CONFIG
/// 3. Default: omopfhir.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("OMOPFHIR_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
