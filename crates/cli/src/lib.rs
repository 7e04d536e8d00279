// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! turnstile: client for the turnstile lock coordinator
//!
//! [`LockClient::with_lock`] runs a future while holding a named lock and
//! always unlocks afterwards. [`LockClient::status`] reports every queue.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod output;

pub use client::{ClientError, LockClient, DEFAULT_WORK_TIMEOUT};
pub use output::OutputFormat;
