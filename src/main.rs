#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use syringe::config::ServerConfig;
use syringe::identity::{IdentityStore, MemoryIdentityStore};
use syringe::middleware::Pipeline;
use syringe::server::Server;
use syringe::tenant::{MemoryTenantRouter, TenantRouter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    let config = ServerConfig::from_env();

    let (store, router): (Arc<dyn IdentityStore>, Arc<dyn TenantRouter>) = match &config.data_dir {
        Some(dir) => {
            info!("Persisting identities and tenants under {}", dir.display());
            (
                Arc::new(MemoryIdentityStore::open(dir).await?),
                Arc::new(MemoryTenantRouter::with_data_dir(dir)),
            )
        }
        None => {
            warn!("SYRINGE_DATA_DIR is not set, all data is kept in memory only");
            (
                Arc::new(MemoryIdentityStore::new()),
                Arc::new(MemoryTenantRouter::new()),
            )
        }
    };

    let pipeline = Pipeline::standard(&config, store, router);
    info!("Session pipeline: {}", pipeline.names().join(" -> "));

    let server = Server::bind(&config, pipeline).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    server.run(shutdown).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
