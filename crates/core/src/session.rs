// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection protocol state machine
//!
//! A [`Session`] turns request lines into queue transitions and the replies
//! the transport should write. It never blocks and never performs I/O; the
//! daemon feeds it lines and grants and carries out the returned [`Action`]s.
//!
//! States: `Idle` -> `Waiting` -> `Holding` -> `Closed`, with `Idle -> Holding`
//! when the queue was empty and any state -> `Closed` on unlock, status,
//! protocol error, or teardown.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::id::ConnectionId;
use crate::protocol::{Command, Reply};
use crate::queue::{Enqueue, GrantSender, Removal, Waiter};
use crate::registry::ResourceRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing requested yet
    Idle,
    /// Queued behind another holder
    Waiting,
    /// Head of the queue
    Holding,
    /// Terminal; the transport is closing
    Closed,
}

/// What the transport must do after a line was handled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Send(Reply),
    /// Flush pending replies and close the connection
    Close,
}

#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer: String,
    created_at: Instant,
    last_activity: Instant,
    resource: Option<String>,
    state: SessionState,
    released: bool,
    grants: GrantSender,
}

impl Session {
    pub fn new(id: ConnectionId, peer: impl Into<String>, grants: GrantSender, now: Instant) -> Self {
        Self {
            id,
            peer: peer.into(),
            created_at: now,
            last_activity: now,
            resource: None,
            state: SessionState::Idle,
            released: false,
            grants,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Resource this connection asked for, if any
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Record inbound data
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Handle one raw request line. Blank lines produce no actions.
    pub fn handle_line(&mut self, line: &str, registry: &ResourceRegistry) -> Vec<Action> {
        match Command::parse(line) {
            None => Vec::new(),
            Some(Ok(command)) => self.handle(command, registry),
            Some(Err(e)) => {
                debug!(conn = %self.id, error = %e, "rejecting request");
                self.close_with(vec![Reply::unknown_message()])
            }
        }
    }

    pub fn handle(&mut self, command: Command, registry: &ResourceRegistry) -> Vec<Action> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }

        match command {
            Command::Lock { resource } => self.lock(resource, registry),
            Command::Unlock { .. } => {
                self.close_with(vec![Reply::Released(self.resource.clone())])
            }
            Command::Status => {
                let listing = registry.snapshot().into_iter().map(Reply::Status).collect();
                self.close_with(listing)
            }
        }
    }

    fn lock(&mut self, resource: String, registry: &ResourceRegistry) -> Vec<Action> {
        match &self.resource {
            Some(current) if *current == resource => return Vec::new(),
            Some(current) => {
                debug!(conn = %self.id, %current, requested = %resource, "second lock on one connection");
                let message = format!("already queued for {}", current);
                return self.close_with(vec![Reply::Error(message)]);
            }
            None => {}
        }

        let waiter = Waiter::new(self.id, self.peer.clone(), self.grants.clone());
        let result = registry.acquire(&resource, waiter);
        self.resource = Some(resource.clone());

        match result {
            Enqueue::Granted => {
                self.state = SessionState::Holding;
                vec![Action::Send(Reply::Granted(resource))]
            }
            Enqueue::Queued { .. } => {
                self.state = SessionState::Waiting;
                vec![Action::Send(Reply::Queued(resource))]
            }
            Enqueue::AlreadyQueued => Vec::new(),
        }
    }

    fn close_with(&mut self, replies: Vec<Reply>) -> Vec<Action> {
        self.state = SessionState::Closed;
        replies
            .into_iter()
            .map(Action::Send)
            .chain(std::iter::once(Action::Close))
            .collect()
    }

    /// Apply a grant pushed by the registry.
    ///
    /// Returns true if the grant should be forwarded to the client. Grants
    /// arriving after the session stopped waiting are stale and dropped.
    pub fn on_grant(&mut self, reply: &Reply) -> bool {
        let Reply::Granted(resource) = reply else {
            return false;
        };
        if self.state != SessionState::Waiting || self.resource() != Some(resource.as_str()) {
            return false;
        }
        self.state = SessionState::Holding;
        true
    }

    /// Leave whatever queue this connection occupies.
    ///
    /// Called by the transport when the connection closes, whatever the
    /// cause. Only the first call does anything; later calls return `None`.
    pub fn release(&mut self, registry: &ResourceRegistry) -> Option<Removal> {
        if self.released {
            return None;
        }
        self.released = true;
        self.state = SessionState::Closed;

        let removal = match &self.resource {
            Some(resource) => registry.release(resource, self.id),
            None => Removal::Absent,
        };
        Some(removal)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
