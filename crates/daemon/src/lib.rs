// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! turnstile-daemon: TCP front end for the lock coordinator
//!
//! [`lifecycle`] resolves configuration and binds the listener,
//! [`server`] runs the accept loop, and [`connection`] drives one client
//! session per accepted socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod connection;
pub mod lifecycle;
pub mod server;

pub use connection::{CloseReason, ConnectionHandler};
pub use lifecycle::{startup, Config, ConfigFile, Coordinator, LifecycleError, Overrides};
pub use server::ServerError;
