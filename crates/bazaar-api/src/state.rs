//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use bazaar_chat::ChatOrchestrator;
use bazaar_core::config::BazaarConfig;
use bazaar_storage::Database;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<BazaarConfig>,
    /// SQLite database for persistent storage.
    pub database: Arc<Database>,
    /// Turn pipeline.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Model identifier reported by the health check.
    pub model: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: BazaarConfig,
        database: Arc<Database>,
        orchestrator: ChatOrchestrator,
        model: &str,
    ) -> Self {
        Self {
            config: Arc::new(config),
            database,
            orchestrator: Arc::new(orchestrator),
            model: model.to_string(),
            start_time: Instant::now(),
        }
    }
}
