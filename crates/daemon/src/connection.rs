// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection handler.
//!
//! Reads request lines, feeds them to the connection's [`Session`], writes
//! replies and pushed grants, and enforces the inactivity timeout. However the
//! connection ends, the session's release hook runs exactly once before the
//! handler is gone.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, Instrument};
use turnstile_core::{Action, ConnectionId, Reply, ResourceRegistry, Session};

use crate::server::ServerError;

/// Bound on a single reply write, so a stalled client cannot pin its handler
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest request line accepted, newline excluded
pub const MAX_LINE: usize = 4096;

/// Why a connection ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// `unlock`, `status`, or a rejected request
    Requested,
    /// Client closed its end
    PeerClosed,
    /// Nothing received within the idle timeout
    IdleTimeout,
    /// Coordinator is shutting down
    Shutdown,
}

pub struct ConnectionHandler {
    session: Session,
    registry: Arc<ResourceRegistry>,
    idle_timeout: Duration,
    grants: mpsc::UnboundedReceiver<Reply>,
}

impl ConnectionHandler {
    pub fn new(
        id: ConnectionId,
        peer: impl Into<String>,
        registry: Arc<ResourceRegistry>,
        idle_timeout: Duration,
    ) -> Self {
        let (grant_tx, grants) = mpsc::unbounded_channel();
        Self {
            session: Session::new(id, peer, grant_tx, std::time::Instant::now()),
            registry,
            idle_timeout,
            grants,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve the connection until it closes, then release its queue slot
    pub async fn run<S>(
        mut self,
        stream: S,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CloseReason, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let span = tracing::info_span!(
            "conn",
            id = %self.session.id(),
            peer = %self.session.peer()
        );

        let result = self.serve(stream, shutdown).instrument(span.clone()).await;

        span.in_scope(|| {
            match &result {
                Ok(reason) => debug!(?reason, "connection closed"),
                Err(e) => debug!(error = %e, "connection failed"),
            }
            if let Some(resource) = self.session.resource() {
                info!(%resource, "releasing");
            }
            self.release();
        });

        result
    }

    async fn serve<S>(
        &mut self,
        stream: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<CloseReason, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buffer = LineBuffer::default();
        let mut deadline = Instant::now() + self.idle_timeout;

        loop {
            tokio::select! {
                read = reader.read_buf(&mut buffer.pending) => {
                    if read? == 0 {
                        // A trailing line without newline still counts
                        if let Some(line) = buffer.take_rest() {
                            if self.dispatch(&mut writer, line).await? {
                                return Ok(CloseReason::Requested);
                            }
                        }
                        return Ok(CloseReason::PeerClosed);
                    }

                    deadline = Instant::now() + self.idle_timeout;
                    self.session.touch(std::time::Instant::now());

                    while let Some(line) = buffer.next_line() {
                        if self.dispatch(&mut writer, line).await? {
                            return Ok(CloseReason::Requested);
                        }
                    }
                }

                Some(grant) = self.grants.recv() => {
                    if self.session.on_grant(&grant) {
                        debug!(%grant, "promoted");
                        write_line(&mut writer, &grant).await?;
                    }
                }

                _ = tokio::time::sleep_until(deadline) => {
                    info!(
                        idle = %humantime::format_duration(self.idle_timeout),
                        "closing idle connection"
                    );
                    return Ok(CloseReason::IdleTimeout);
                }

                Ok(()) = shutdown.changed() => return Ok(CloseReason::Shutdown),
            }
        }
    }

    /// Handle one request line. Returns true once the connection is closed.
    async fn dispatch<W>(
        &mut self,
        writer: &mut W,
        line: Result<String, LineError>,
    ) -> Result<bool, ServerError>
    where
        W: AsyncWrite + Unpin,
    {
        let actions = match line {
            Ok(line) => {
                debug!(request = %line.trim(), "received");
                self.session.handle_line(&line, &self.registry)
            }
            Err(e) => {
                debug!(error = %e, "rejecting request");
                vec![Action::Send(Reply::unknown_message()), Action::Close]
            }
        };
        perform(writer, actions).await
    }

    /// Leave any queue this connection occupies. Idempotent.
    fn release(&mut self) {
        self.session.release(&self.registry);
    }
}

impl Drop for ConnectionHandler {
    // Covers tasks cancelled before `run` could release
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum LineError {
    #[error("request is not valid UTF-8")]
    NotUtf8,
    #[error("request longer than {MAX_LINE} bytes")]
    TooLong,
}

/// Raw bytes read from the peer, split into request lines
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Next complete line, or an error once the pending line is too long
    fn next_line(&mut self) -> Option<Result<String, LineError>> {
        let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
            return (self.pending.len() > MAX_LINE).then_some(Err(LineError::TooLong));
        };
        if end > MAX_LINE {
            return Some(Err(LineError::TooLong));
        }

        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(String::from_utf8(line).map_err(|_| LineError::NotUtf8))
    }

    /// Whatever is left once the peer stops sending
    fn take_rest(&mut self) -> Option<Result<String, LineError>> {
        if self.pending.is_empty() {
            return None;
        }
        if self.pending.len() > MAX_LINE {
            return Some(Err(LineError::TooLong));
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8(rest).map_err(|_| LineError::NotUtf8))
    }
}

/// Carry out session actions. Returns true once the connection is closed.
async fn perform<W>(writer: &mut W, actions: Vec<Action>) -> Result<bool, ServerError>
where
    W: AsyncWrite + Unpin,
{
    for action in actions {
        match action {
            Action::Send(reply) => write_line(writer, &reply).await?,
            Action::Close => {
                tokio::time::timeout(WRITE_TIMEOUT, writer.shutdown())
                    .await
                    .map_err(|_| ServerError::Timeout)??;
                return Ok(true);
            }
        }
    }
    Ok(false)
}

async fn write_line<W>(writer: &mut W, reply: &Reply) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{}\n", reply);
    tokio::time::timeout(WRITE_TIMEOUT, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ServerError::Timeout)??;
    Ok(())
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
