// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of resource queues
//!
//! Two levels of locking:
//! - one coarse registry lock, held only for lookup-or-insert of an entry
//! - one guard per resource, held for queue mutation and the grant decision
//!
//! The two are never held at the same time. Entries are created on first
//! reference and live as long as the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::id::ConnectionId;
use crate::protocol::ResourceStatus;
use crate::queue::{Enqueue, Removal, WaitQueue, Waiter};

/// One resource's wait queue together with the guard protecting it
#[derive(Debug)]
pub struct ResourceQueue {
    name: String,
    queue: Mutex<WaitQueue>,
}

impl ResourceQueue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(WaitQueue::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the resource's guard. Every queue access goes through here.
    pub fn guard(&self) -> MutexGuard<'_, WaitQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Default)]
struct Entries {
    by_name: HashMap<String, Arc<ResourceQueue>>,
    // Creation order, used for status listings
    order: Vec<Arc<ResourceQueue>>,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: Mutex<Entries>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue for `name`, created on first reference.
    ///
    /// Concurrent first-time callers always get the same queue.
    pub fn queue_for(&self, name: &str) -> Arc<ResourceQueue> {
        let mut entries = self.entries();
        if let Some(queue) = entries.by_name.get(name) {
            return Arc::clone(queue);
        }

        let queue = Arc::new(ResourceQueue::new(name));
        entries.by_name.insert(name.to_string(), Arc::clone(&queue));
        entries.order.push(Arc::clone(&queue));
        debug!(resource = name, "created resource queue");
        queue
    }

    /// Queue for `name` if it was ever referenced
    pub fn get(&self, name: &str) -> Option<Arc<ResourceQueue>> {
        self.entries().by_name.get(name).cloned()
    }

    /// Number of resources ever referenced
    pub fn len(&self) -> usize {
        self.entries().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a connection for `name`
    pub fn acquire(&self, name: &str, waiter: Waiter) -> Enqueue {
        let queue = self.queue_for(name);
        let conn = waiter.conn;
        let result = queue.guard().enqueue(waiter);
        debug!(resource = name, %conn, ?result, "acquire");
        result
    }

    /// Remove a connection from `name`'s queue.
    ///
    /// When the holder leaves, the new head is granted the lock after the
    /// guard has been dropped.
    pub fn release(&self, name: &str, conn: ConnectionId) -> Removal {
        let Some(queue) = self.get(name) else {
            return Removal::Absent;
        };

        let removal = queue.guard().remove(conn);

        match &removal {
            Removal::Released {
                promoted: Some(next),
            } => {
                debug!(resource = name, %conn, next = %next.conn, "released, promoting next");
                if !next.grant(name) {
                    debug!(resource = name, next = %next.conn, "promoted connection already gone");
                }
            }
            Removal::Released { promoted: None } => {
                debug!(resource = name, %conn, "released, queue empty");
            }
            Removal::Withdrawn => debug!(resource = name, %conn, "withdrawn from queue"),
            Removal::Absent => {}
        }

        removal
    }

    /// Status of every non-empty queue, in resource creation order
    pub fn snapshot(&self) -> Vec<ResourceStatus> {
        let queues: Vec<Arc<ResourceQueue>> = self.entries().order.clone();

        queues
            .iter()
            .filter_map(|queue| {
                let waiters = queue.guard().peers();
                (!waiters.is_empty()).then(|| ResourceStatus {
                    name: queue.name().to_string(),
                    waiters,
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
