//! HTTP server for the SQL assistant

use anyhow::{Context, Result};
use clap::Parser;
use sql_assistant::catalog::PgCatalog;
use sql_assistant::config::AppConfig;
use sql_assistant::conversation::ConversationStore;
use sql_assistant::db::{ConnectionFactory, PgExecutor};
use sql_assistant::{http, llm, Assistant};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-assistant")]
#[command(about = "Natural-language SQL assistant over PostgreSQL")]
#[command(version)]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection string (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Generator model name (overrides GENERATOR_MODEL)
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.database.url = Some(url);
    }
    if let Some(model) = args.model {
        config.generator.model = model;
    }

    let connections = ConnectionFactory::from_config(&config.database)?;
    let generator = llm::from_config(&config.generator)?;
    let assistant = Arc::new(Assistant::new(
        Arc::new(PgCatalog::new(connections.clone())),
        Arc::new(PgExecutor::new(connections)),
        generator,
        ConversationStore::new(Some(config.conversation_ttl)),
    )?);
    info!(
        "Generator: {:?} model {} (timeout {:?})",
        config.generator.backend, config.generator.model, config.generator.timeout
    );

    spawn_eviction(Arc::clone(&assistant), config.conversation_ttl);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server listening on {}", config.bind_addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from: {}", addr);
                tokio::spawn(http::handle_connection(Arc::clone(&assistant), stream));
            }
            Err(e) => warn!("Failed to accept connection: {}", e),
        }
    }
}

/// Sweep abandoned conversations a few times per time-to-live.
fn spawn_eviction(assistant: Arc<Assistant>, ttl: Duration) {
    let period = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            assistant.conversations().evict_expired();
        }
    });
}
