//! `saltern-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::Result;

use saltern_api::config::Config;
use saltern_api::server::Server;
use saltern_core::observability::{init_logging, LogFormat};
use saltern_core::{DeviceStore, MemoryStore, SqliteStore};

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    init_logging(choose_log_format(&config));

    let store: Arc<dyn DeviceStore> = if let Some(path) = config.store.path.as_deref() {
        tracing::info!(path = %path, "Using SQLite device store");
        Arc::new(SqliteStore::open(path)?)
    } else {
        if !config.debug {
            anyhow::bail!("SALTERN_STORE_PATH is required when SALTERN_DEBUG=false");
        }
        tracing::warn!("SALTERN_STORE_PATH not set; using in-memory device store (debug only)");
        Arc::new(MemoryStore::new())
    };

    let server = Server::with_store(config, store);
    server.serve().await?;
    Ok(())
}
