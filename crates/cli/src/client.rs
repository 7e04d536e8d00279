// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator client: run work under a lock, query status

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use turnstile_core::protocol::{self, ProtocolError};
use turnstile_core::{Command, Reply, ResourceStatus, DEFAULT_HOST, DEFAULT_PORT};

/// Default allowance for work run under a lock
pub const DEFAULT_WORK_TIMEOUT: Duration = Duration::from_secs(20);

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid resource name {0:?}: must be a single word")]
    InvalidResource(String),

    #[error("Coordinator closed the connection before granting {0}")]
    ConnectionClosed(String),

    #[error("Coordinator rejected the request: {0}")]
    Rejected(String),

    #[error("Work under lock {resource} exceeded {timeout:?}")]
    WorkTimeout { resource: String, timeout: Duration },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for one coordinator
#[derive(Debug, Clone)]
pub struct LockClient {
    host: String,
    port: u16,
}

impl LockClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Coordinator address from `TURNSTILE_HOST` / `TURNSTILE_PORT`
    pub fn from_env() -> Result<Self, ClientError> {
        let host = std::env::var("TURNSTILE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match std::env::var("TURNSTILE_PORT") {
            Ok(value) => value.trim().parse().map_err(|_| ClientError::InvalidEnv {
                var: "TURNSTILE_PORT",
                value,
            })?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn connect(&self) -> Result<Connection, ClientError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Run `work` while holding `resource`.
    ///
    /// Waits for the grant, runs the work with a wall-clock `timeout`, then
    /// unlocks whatever happened. An empty resource name skips locking and
    /// runs the work directly, without the timeout.
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource: &str,
        timeout: Duration,
        work: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if resource.is_empty() {
            return Ok(work().await);
        }
        if resource.contains(char::is_whitespace) {
            return Err(ClientError::InvalidResource(resource.to_string()));
        }

        let mut conn = self.connect().await?;

        let result = match conn.acquire(resource).await {
            Ok(()) => run_with_timeout(resource, timeout, work()).await,
            Err(e) => Err(e),
        };

        if let Err(e) = conn.unlock(resource).await {
            warn!(resource, error = %e, "failed to send unlock");
        }

        result
    }

    /// Fetch the coordinator's view of every non-empty queue
    pub async fn status(&self) -> Result<Vec<ResourceStatus>, ClientError> {
        let mut conn = self.connect().await?;
        conn.send(&Command::Status).await?;

        let mut listing = Vec::new();
        while let Some(line) = conn.lines.next_line().await? {
            listing.push(line);
        }
        if let Some(Reply::Error(message)) = listing.first().and_then(|l| protocol::parse_reply(l)) {
            return Err(ClientError::Rejected(message));
        }

        Ok(protocol::parse_listing(&listing)?)
    }
}

async fn run_with_timeout<Fut, T>(
    resource: &str,
    timeout: Duration,
    work: Fut,
) -> Result<T, ClientError>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| ClientError::WorkTimeout {
            resource: resource.to_string(),
            timeout,
        })
}

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        let line = format!("{}\n", command);
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Request the lock and wait on inbound lines until it is granted
    async fn acquire(&mut self, resource: &str) -> Result<(), ClientError> {
        self.send(&Command::Lock {
            resource: resource.to_string(),
        })
        .await?;

        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(ClientError::ConnectionClosed(resource.to_string()));
            };
            match protocol::parse_reply(&line) {
                Some(Reply::Granted(granted)) if granted == resource => {
                    debug!(resource, "lock granted");
                    return Ok(());
                }
                Some(Reply::Error(message)) => return Err(ClientError::Rejected(message)),
                Some(Reply::Queued(_)) => debug!(resource, "waiting for lock"),
                _ => debug!(line = %line.trim(), "ignoring unexpected line"),
            }
        }
    }

    async fn unlock(&mut self, resource: &str) -> Result<(), ClientError> {
        self.send(&Command::Unlock {
            resource: Some(resource.to_string()),
        })
        .await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
