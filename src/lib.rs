pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

use crate::application::use_cases::oracle::Oracle;
use crate::application::SqlChatPipeline;
use crate::domain::error::Result;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db;
use crate::infrastructure::llm_clients::RouterClient;
use crate::infrastructure::logging::{init_tracing, LogBuffer};
use crate::interfaces::http::{start_server, HttpState};
use std::sync::Arc;
use tracing::info;

/// Load configuration, connect the store and serve the chat API until the
/// server stops.
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::load()?;
    init_tracing(&config.logging.filter);

    let store = db::connect(&config.database).await?;
    info!(
        store = store.dialect(),
        comments = store.supports_comments(),
        "Relational store ready"
    );

    let oracle = Oracle::new(Arc::new(RouterClient::new()), config.llm.clone());
    let pipeline = Arc::new(SqlChatPipeline::new(oracle, store, &config.pipeline));
    let logs = Arc::new(LogBuffer::new(config.logging.buffer_size));

    info!(
        host = %config.server.host,
        port = config.server.port,
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "Starting HTTP server"
    );
    start_server(HttpState { pipeline, logs }, &config.server)?.await?;
    Ok(())
}
