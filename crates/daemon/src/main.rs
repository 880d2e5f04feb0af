//! AudienceSync Worker - Main Entry Point
//! Sandbox worker serving `jobs.invoke.v1` against an in-memory remarketing account

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use audiencesync_api_rpc::{RpcServer, RpcServerConfig};
use audiencesync_core::application::{JobExecutor, SyncConfig};
use audiencesync_core::port::remarketing_api::mocks::InMemoryRemarketingApi;
use audiencesync_core::port::time_provider::SystemTimeProvider;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format =
        std::env::var("AUDIENCESYNC_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("audiencesync=info"))?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("AudienceSync worker v{} starting...", VERSION);

    // 2. Load configuration
    let config = SyncConfig::from_env()?;
    let rpc_config = RpcServerConfig::from_env();
    info!(
        max_retries = config.max_retries,
        retry_base_delay_ms = config.retry_base_delay_ms,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let api = Arc::new(InMemoryRemarketingApi::new());
    let executor = Arc::new(JobExecutor::from_config(api, &config, time_provider));

    // 4. Start JSON-RPC server
    let (addr, rpc_handle) = RpcServer::new(rpc_config, executor)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "Worker ready. Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;

    info!("Shutdown complete.");
    Ok(())
}
