//! SSH server shell.
//!
//! Owns the listen socket and the russh configuration, runs one task per
//! inbound connection, and performs a bounded graceful shutdown:
//!
//! 1. stop accepting once the shutdown token is cancelled
//! 2. ask every live connection to disconnect
//! 3. wait up to the grace period, then abort what remains

mod handler;
pub mod host_key;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::server::{Config as SshConfig, run_stream};
use russh::{Disconnect, MethodKind, MethodSet};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::middleware::Pipeline;

pub use handler::{ConnectionHandler, Shared};

/// A bound, not yet serving, SSH server.
pub struct Server {
    listener: TcpListener,
    ssh_config: Arc<SshConfig>,
    shared: Arc<Shared>,
    shutdown_grace: Duration,
}

impl Server {
    /// Load the host key and bind the listen address.
    pub async fn bind(config: &ServerConfig, pipeline: Pipeline) -> Result<Self, ServerError> {
        let key = host_key::load_or_generate(&config.host_key_path).await?;

        let ssh_config = Arc::new(SshConfig {
            methods: MethodSet::from(&[MethodKind::PublicKey][..]),
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            inactivity_timeout: Some(config.idle_timeout),
            keys: vec![key],
            ..Default::default()
        });

        let address = config.listen_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::Address(format!("{}: {}", address, e)))?;

        Ok(Self {
            listener,
            ssh_config,
            shared: Arc::new(Shared {
                pipeline,
                key_algorithms: config.key_algorithms.clone(),
            }),
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!("SSH server listening on {}", self.local_addr()?);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Connection task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);

                    let handler = ConnectionHandler::new(self.shared.clone(), Some(peer));
                    let ssh_config = self.ssh_config.clone();
                    let token = shutdown.child_token();
                    connections.spawn(serve_connection(ssh_config, stream, handler, peer, token));
                }
            }
        }

        drop(self.listener);
        info!(
            "Shutting down, waiting up to {:?} for {} connection(s)",
            self.shutdown_grace,
            connections.len()
        );

        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "Grace period elapsed, aborting {} connection(s)",
                connections.len()
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }

        info!("SSH server stopped");
        Ok(())
    }
}

async fn serve_connection(
    ssh_config: Arc<SshConfig>,
    stream: tokio::net::TcpStream,
    handler: ConnectionHandler,
    peer: SocketAddr,
    shutdown: CancellationToken,
) {
    let running = match run_stream(ssh_config, stream, handler).await {
        Ok(running) => running,
        Err(e) => {
            warn!("SSH handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let handle = running.handle();
    tokio::pin!(running);

    let result = tokio::select! {
        result = &mut running => result,
        _ = shutdown.cancelled() => {
            let _ = handle
                .disconnect(
                    Disconnect::ByApplication,
                    "server shutting down".to_string(),
                    "en".to_string(),
                )
                .await;
            running.await
        }
    };

    if let Err(e) = result {
        debug!("SSH session with {} ended: {}", peer, e);
    }
}
