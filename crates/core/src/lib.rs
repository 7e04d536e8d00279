// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! turnstile-core: lock coordination state for the turnstile daemon
//!
//! This crate provides:
//! - The line protocol spoken between clients and the coordinator
//! - Per-resource FIFO wait queues
//! - The process-wide resource registry with per-resource guards
//! - The per-connection session state machine
//!
//! Nothing here touches sockets. The daemon drives a [`Session`] per
//! connection and delivers [`Reply`] lines over its own transport.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod id;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod session;

pub use id::{ConnectionId, ConnectionIds};
pub use protocol::{
    parse_listing, parse_reply, Command, ProtocolError, Reply, ResourceStatus, DEFAULT_HOST,
    DEFAULT_PORT, UNKNOWN_MESSAGE,
};
pub use queue::{Enqueue, GrantSender, Removal, WaitQueue, Waiter};
pub use registry::{ResourceQueue, ResourceRegistry};
pub use session::{Action, Session, SessionState};
