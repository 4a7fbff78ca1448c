//! offgrid-host entry point.
//!
//! Boots the worker registration from configuration and serves it as an MCP
//! server on stdio. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offgrid_core::{AppConfig, CacheDb, Manifest};
use offgrid_worker::{FetchConfig, HttpNetwork};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod host;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "starting offgrid-host on stdio transport");

    let cache = CacheDb::open(&config.db_path).await?;
    let manifest = Manifest::load(&config.manifest_path)?;
    let network = Arc::new(HttpNetwork::new(&FetchConfig::from_app_config(&config))?);

    let state = host::HostState::boot(&config, manifest, cache, network).await?;
    let handler = handler::OffgridHost::new(state);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
