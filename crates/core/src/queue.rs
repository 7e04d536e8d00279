// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO wait queue for a single resource
//!
//! The head of the queue holds the lock. Everyone behind it is waiting, in
//! arrival order. An empty queue means the resource is free.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::id::ConnectionId;
use crate::protocol::Reply;

/// Channel used to push unsolicited grants to a waiting connection
pub type GrantSender = mpsc::UnboundedSender<Reply>;

/// A connection's place in a queue.
///
/// Holds only what the queue needs to identify, report, and notify the
/// connection. The connection itself is owned by the transport.
#[derive(Clone, Debug)]
pub struct Waiter {
    pub conn: ConnectionId,
    pub peer: String,
    grants: GrantSender,
}

impl Waiter {
    pub fn new(conn: ConnectionId, peer: impl Into<String>, grants: GrantSender) -> Self {
        Self {
            conn,
            peer: peer.into(),
            grants,
        }
    }

    /// Tell the connection it now holds `resource`.
    ///
    /// Returns false if the connection has already gone away.
    pub fn grant(&self, resource: &str) -> bool {
        self.grants
            .send(Reply::Granted(resource.to_string()))
            .is_ok()
    }
}

/// Result of adding a connection to a queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    /// Queue was empty; the connection holds the lock now
    Granted,
    /// Appended behind others; `position` is 1-based, 1 being the holder
    Queued { position: usize },
    /// The connection was already in this queue; nothing changed
    AlreadyQueued,
}

/// Result of removing a connection from a queue
#[derive(Clone, Debug)]
pub enum Removal {
    /// The holder left. `promoted` is the new head, if any, which must be
    /// granted the lock.
    Released { promoted: Option<Waiter> },
    /// A waiter behind the head left; nobody else is affected
    Withdrawn,
    /// The connection was not in this queue
    Absent,
}

#[derive(Debug, Default)]
pub struct WaitQueue {
    entries: VecDeque<Waiter>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.entries.iter().any(|w| w.conn == conn)
    }

    /// 1-based position of a connection, 1 being the holder
    pub fn position(&self, conn: ConnectionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|w| w.conn == conn)
            .map(|i| i + 1)
    }

    pub fn holder(&self) -> Option<&Waiter> {
        self.entries.front()
    }

    pub fn is_held_by(&self, conn: ConnectionId) -> bool {
        self.holder().is_some_and(|w| w.conn == conn)
    }

    /// Peer addresses in queue order
    pub fn peers(&self) -> Vec<String> {
        self.entries.iter().map(|w| w.peer.clone()).collect()
    }

    /// Append a connection unless it is already queued
    pub fn enqueue(&mut self, waiter: Waiter) -> Enqueue {
        if self.contains(waiter.conn) {
            return Enqueue::AlreadyQueued;
        }

        self.entries.push_back(waiter);
        match self.entries.len() {
            1 => Enqueue::Granted,
            position => Enqueue::Queued { position },
        }
    }

    /// Take a connection out of the queue wherever it sits
    pub fn remove(&mut self, conn: ConnectionId) -> Removal {
        match self.entries.iter().position(|w| w.conn == conn) {
            Some(0) => {
                self.entries.pop_front();
                Removal::Released {
                    promoted: self.entries.front().cloned(),
                }
            }
            Some(index) => {
                self.entries.remove(index);
                Removal::Withdrawn
            }
            None => Removal::Absent,
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
