// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line protocol between lock clients and the coordinator
//!
//! Every message is one newline-terminated line of plain text. Requests are
//! `command [resource]`, split on whitespace. Replies are `ok R`, `wait R`,
//! `released R`, `err: <message>`, or the two-line status listing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listener host
pub const DEFAULT_HOST: &str = "localhost";

/// Default listener port
pub const DEFAULT_PORT: u16 = 12312;

/// Message sent for any request the coordinator does not understand
pub const UNKNOWN_MESSAGE: &str = "unknown message";

/// Requests a client can send
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Enqueue for a resource
    Lock { resource: String },
    /// Release whatever this connection requested and close.
    /// Clients may name the resource; the coordinator ignores it.
    Unlock { resource: Option<String> },
    /// List every non-empty queue and close
    Status,
}

impl Command {
    /// Parse one request line.
    ///
    /// Returns `None` for blank lines, which carry no command.
    pub fn parse(line: &str) -> Option<Result<Command, ProtocolError>> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let arg = words.next().map(str::to_string);

        let command = match verb {
            "lock" => match arg {
                Some(resource) => Ok(Command::Lock { resource }),
                None => Err(ProtocolError::MissingResource),
            },
            "unlock" => Ok(Command::Unlock { resource: arg }),
            "status" => Ok(Command::Status),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Some(command)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Lock { resource } => write!(f, "lock {}", resource),
            Command::Unlock {
                resource: Some(resource),
            } => write!(f, "unlock {}", resource),
            Command::Unlock { resource: None } => write!(f, "unlock"),
            Command::Status => write!(f, "status"),
        }
    }
}

/// Lines the coordinator sends back
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// `ok R`: the connection now holds R
    Granted(String),
    /// `wait R`: queued behind the current holder
    Queued(String),
    /// `released R`: acknowledgement of `unlock`. Bare `released` when
    /// nothing was requested.
    Released(Option<String>),
    /// Two-line status entry for one non-empty queue
    Status(ResourceStatus),
    /// `err: <message>`
    Error(String),
}

impl Reply {
    pub fn unknown_message() -> Self {
        Reply::Error(UNKNOWN_MESSAGE.to_string())
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Granted(resource) => write!(f, "ok {}", resource),
            Reply::Queued(resource) => write!(f, "wait {}", resource),
            Reply::Released(Some(resource)) => write!(f, "released {}", resource),
            Reply::Released(None) => write!(f, "released"),
            Reply::Status(status) => write!(f, "{}", status),
            Reply::Error(message) => write!(f, "err: {}", message),
        }
    }
}

/// Parse a single reply line, as seen by a client.
///
/// Status listings span two lines and go through [`parse_listing`] instead.
pub fn parse_reply(line: &str) -> Option<Reply> {
    let line = line.trim();
    if let Some(message) = line.strip_prefix("err:") {
        return Some(Reply::Error(message.trim().to_string()));
    }

    let mut words = line.split_whitespace();
    let verb = words.next()?;
    let resource = words.next().map(str::to_string);
    match (verb, resource) {
        ("ok", Some(resource)) => Some(Reply::Granted(resource)),
        ("wait", Some(resource)) => Some(Reply::Queued(resource)),
        ("released", resource) => Some(Reply::Released(resource)),
        _ => None,
    }
}

/// Snapshot of one resource's queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub name: String,
    /// Peer addresses in queue order; the first one holds the lock
    pub waiters: Vec<String>,
}

impl ResourceStatus {
    pub fn holder(&self) -> Option<&str> {
        self.waiters.first().map(String::as_str)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Resource: {} ({} connections waiting)",
            self.name,
            self.waiters.len()
        )?;
        write!(f, "{}", self.waiters.join(", "))
    }
}

/// Parse the full output of a `status` request
pub fn parse_listing<S: AsRef<str>>(lines: &[S]) -> Result<Vec<ResourceStatus>, ProtocolError> {
    let mut entries = Vec::new();
    let mut lines = lines.iter().map(AsRef::as_ref);

    while let Some(header) = lines.next() {
        if header.trim().is_empty() {
            continue;
        }
        let (name, count) = parse_status_header(header)?;
        let waiters: Vec<String> = lines
            .next()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        if waiters.len() != count {
            return Err(ProtocolError::MalformedListing(header.to_string()));
        }
        entries.push(ResourceStatus { name, waiters });
    }

    Ok(entries)
}

fn parse_status_header(line: &str) -> Result<(String, usize), ProtocolError> {
    let malformed = || ProtocolError::MalformedListing(line.to_string());

    let rest = line.trim().strip_prefix("Resource: ").ok_or_else(malformed)?;
    let (name, tail) = rest.rsplit_once(" (").ok_or_else(malformed)?;
    let count = tail
        .strip_suffix(" connections waiting)")
        .and_then(|n| n.parse().ok())
        .ok_or_else(malformed)?;

    Ok((name.to_string(), count))
}

/// Protocol errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("lock requires a resource name")]
    MissingResource,

    #[error("malformed status line: {0}")]
    MalformedListing(String),
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
