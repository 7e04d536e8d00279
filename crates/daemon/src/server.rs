// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use turnstile_core::ResourceRegistry;

use crate::connection::{CloseReason, ConnectionHandler};
use crate::lifecycle::Coordinator;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

impl Coordinator {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared registry, for inspection
    pub fn registry(&self) -> Arc<ResourceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Each connection runs on its own task. On shutdown every live
    /// connection is told to stop and releases its queue slot before this
    /// returns.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks: JoinSet<Result<CloseReason, ServerError>> = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Accepting connections on {}", self.local_addr);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let id = self.ids.next();
                        debug!(conn = %id, %peer, "accepted");
                        let handler = ConnectionHandler::new(
                            id,
                            peer.ip().to_string(),
                            Arc::clone(&self.registry),
                            self.config.idle_timeout,
                        );
                        tasks.spawn(handler.run(stream, stop_rx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(joined);
                }
            }
        }

        info!(
            "Shutting down, closing {} open connections (up {})",
            tasks.len(),
            humantime::format_duration(Duration::from_secs(self.start_time.elapsed().as_secs()))
        );
        let _ = stop_tx.send(true);
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        info!("Coordinator stopped");
    }
}

fn reap(joined: Result<Result<CloseReason, ServerError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!("Connection ended with error: {}", e),
        Err(e) => warn!("Connection task failed: {}", e),
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
