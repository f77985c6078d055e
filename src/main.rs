use anyhow::{Context, Result};
use chat2sql::agent::SqlAgent;
use chat2sql::config::Config;
use chat2sql::db::SqlToolkit;
use chat2sql::ingest::ingest_csv;
use chat2sql::llm::LlmClient;
use chat2sql::server;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Starting chat2sql");

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    // Load the dataset before serving anything. Ingestion errors are fatal.
    let mut conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let rows = ingest_csv(&mut conn, &config.table_name, &config.csv_path)
        .with_context(|| format!("Failed to ingest {}", config.csv_path.display()))?;
    info!(
        "Table '{}' ready with {} rows",
        config.table_name, rows
    );

    let toolkit = Arc::new(SqlToolkit::new(conn, config.top_k));
    let model = Arc::new(LlmClient::new(
        config.api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
    ));
    let agent = Arc::new(SqlAgent::new(
        model,
        toolkit,
        config.top_k,
        config.max_steps,
    ));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    server::serve(listener, agent).await?;
    Ok(())
}
