//! Bazaar application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the SQLite store
//! 3. `serve`: build the text generator and chat pipeline, then run the API
//!    server until Ctrl+C
//! 4. `seed`: load store records from a JSON file or a CSV directory

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use bazaar_api::state::AppState;
use bazaar_chat::ChatOrchestrator;
use bazaar_core::config::BazaarConfig;
use bazaar_llm::{ChatCompletionsClient, TextGenerator};
use bazaar_storage::{seed_from_csv_dir, seed_from_file, Database, DocumentStore, SeedReport};

use cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = BazaarConfig::load_or_default(&config_file);
    config.server.port = args.resolve_port(config.server.port);
    let log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing: RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Bazaar v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");
    config.validate()?;

    // Storage.
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("bazaar.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    match args.command() {
        Command::Serve => serve(config, Arc::clone(&db)).await?,
        Command::Seed { file, csv } => seed(&db, file.as_deref(), csv.as_deref())?,
    }

    match Arc::try_unwrap(db) {
        Ok(db) => db.close()?,
        Err(_) => tracing::warn!("Database still referenced at shutdown; skipping close"),
    }
    Ok(())
}

async fn serve(config: BazaarConfig, db: Arc<Database>) -> Result<(), Box<dyn std::error::Error>> {
    let client = ChatCompletionsClient::from_config(&config.llm)?;
    let model = client.model().to_string();
    tracing::info!(model = %model, base_url = %config.llm.base_url, "Text generator ready");

    let orchestrator =
        ChatOrchestrator::with_database(Arc::clone(&db), Arc::new(client), config.chat.clone());
    let state = AppState::new(config.clone(), db, orchestrator, &model);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    };

    if let Err(e) = bazaar_api::start_server(&config, state, shutdown).await {
        tracing::error!(
            addr = %format!("{}:{}", config.server.host, config.server.port),
            error = %e,
            "API server failed - is another instance running?"
        );
        return Err(e.into());
    }
    Ok(())
}

fn seed(
    db: &Arc<Database>,
    file: Option<&Path>,
    csv_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = DocumentStore::new(Arc::clone(db));
    let (report, source): (SeedReport, &Path) = match (csv_dir, file) {
        (Some(dir), _) => (seed_from_csv_dir(&store, dir)?, dir),
        (None, Some(file)) => (seed_from_file(&store, file)?, file),
        (None, None) => return Err("seed needs a JSON file or --csv <dir>".into()),
    };
    for (collection, count) in &report.inserted {
        println!("  {:<22} {}", collection, count);
    }
    println!(
        "Seeded {} records from {}",
        report.total(),
        source.display()
    );
    Ok(())
}
