//! Topolens server - topology and diagnostic reasoning daemon
//!
//! Wires a resource provider into the reasoning engine and exposes the
//! results over HTTP. By default it serves a recorded cluster fixture; a
//! live cluster provider plugs in through the same trait.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use topolens_engine::provider::ResourceProvider;
use topolens_engine::{
    BufferConfig, ContextBuffer, DiagnosticRunner, LoopConfig, ReasoningLoop, TopologyBuilder,
};

mod api;
mod config;
mod fixture;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = SERVER_VERSION, "Starting topolens-server");

    let config = config::ServerConfig::load()?;
    info!(
        api_port = config.api_port,
        tick_interval_secs = config.tick_interval_secs,
        fixture_path = %config.fixture_path,
        "Server configured"
    );

    let provider: Arc<dyn ResourceProvider> =
        match fixture::FileProvider::from_path(&config.fixture_path) {
            Ok(provider) => {
                info!(path = %config.fixture_path, "Serving recorded cluster fixture");
                Arc::new(provider)
            }
            Err(e) => {
                info!(error = %e, "No cluster fixture found, using built-in single-node fixture");
                Arc::new(fixture::FileProvider::new(fixture::default_fixture()))
            }
        };

    let buffer = Arc::new(Mutex::new(ContextBuffer::new(BufferConfig {
        retention: chrono::Duration::hours(config.retention_hours),
        max_snapshots: config.max_snapshots,
    })));

    let reasoning_loop = Arc::new(ReasoningLoop::new(
        TopologyBuilder::new(Arc::clone(&provider)),
        DiagnosticRunner::new(),
        Arc::clone(&buffer),
        LoopConfig {
            interval: Duration::from_secs(config.tick_interval_secs),
            restart_lookback_hours: config.restart_lookback_hours,
        },
    ));
    reasoning_loop.start().await;

    let app_state = Arc::new(api::AppState {
        builder: Arc::new(TopologyBuilder::new(provider)),
        runner: DiagnosticRunner::new(),
        buffer,
        reasoning_loop: Arc::clone(&reasoning_loop),
        restart_lookback_hours: config.restart_lookback_hours,
    });

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    reasoning_loop.stop().await;
    api_handle.abort();

    Ok(())
}
