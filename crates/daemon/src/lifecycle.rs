// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator lifecycle: configuration and startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use turnstile_core::{ConnectionIds, ResourceRegistry, DEFAULT_HOST, DEFAULT_PORT};

/// Inactivity window after which a silent connection is closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,
    /// Close connections that have sent nothing for this long
    pub idle_timeout: Duration,
    /// Log file; logs go to stderr when unset
    pub log_path: Option<PathBuf>,
    /// Config file the values were read from, if any
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            log_path: None,
            config_file: None,
        }
    }
}

/// On-disk configuration (`turnstiled.toml`)
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    pub log_file: Option<PathBuf>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, LifecycleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::ConfigRead(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| LifecycleError::ConfigParse(path.to_path_buf(), e))
    }
}

/// Values given on the command line; they win over everything else
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub idle_timeout: Option<Duration>,
    pub log_path: Option<PathBuf>,
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// Precedence: defaults < config file < environment < overrides.
    pub fn load(overrides: &Overrides) -> Result<Self, LifecycleError> {
        Self::resolve(overrides, |var| std::env::var(var).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup
    pub fn resolve(
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LifecycleError> {
        let mut config = Config::default();

        if let Some(path) = config_file_path(overrides, &env) {
            config.apply_file(ConfigFile::read(&path)?);
            config.config_file = Some(path);
        }

        config.apply_env(&env)?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(idle_timeout) = file.idle_timeout {
            self.idle_timeout = idle_timeout;
        }
        if let Some(log_file) = file.log_file {
            self.log_path = Some(log_file);
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), LifecycleError> {
        if let Some(host) = env("TURNSTILE_HOST") {
            self.host = host;
        }
        if let Some(port) = env("TURNSTILE_PORT") {
            self.port = port.trim().parse().map_err(|_| LifecycleError::InvalidEnv {
                var: "TURNSTILE_PORT",
                value: port,
            })?;
        }
        if let Some(secs) = env("TURNSTILE_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| LifecycleError::InvalidEnv {
                var: "TURNSTILE_IDLE_TIMEOUT_SECS",
                value: secs,
            })?;
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(log_file) = env("TURNSTILE_LOG_FILE") {
            self.log_path = Some(PathBuf::from(log_file));
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(idle_timeout) = overrides.idle_timeout {
            self.idle_timeout = idle_timeout;
        }
        if let Some(log_path) = &overrides.log_path {
            self.log_path = Some(log_path.clone());
        }
    }

    /// `host:port` as configured, before resolution
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Explicit paths must exist; the per-user default is optional
fn config_file_path(
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = &overrides.config_path {
        return Some(path.clone());
    }
    if let Some(path) = env("TURNSTILE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("turnstile").join("turnstiled.toml"))
        .filter(|path| path.exists())
}

/// A bound, not yet serving, coordinator
pub struct Coordinator {
    /// Configuration
    pub config: Config,
    /// TCP listener
    pub listener: TcpListener,
    /// Address actually bound
    pub local_addr: SocketAddr,
    /// Resource queues shared by every connection
    pub registry: Arc<ResourceRegistry>,
    /// Connection id allocator
    pub ids: ConnectionIds,
    /// When the coordinator started
    pub start_time: Instant,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to read config file {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("Invalid config file {0}: {1}")]
    ConfigParse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, #[source] std::io::Error),

    #[error("Log file {0} has no parent directory")]
    NoLogDir(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind the listener and set up shared state
pub async fn startup(config: &Config) -> Result<Coordinator, LifecycleError> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen_addr(), e))?;
    let local_addr = listener.local_addr()?;

    info!(
        "Coordinator bound to {} (idle timeout {})",
        local_addr,
        humantime::format_duration(config.idle_timeout)
    );

    Ok(Coordinator {
        config: config.clone(),
        listener,
        local_addr,
        registry: Arc::new(ResourceRegistry::new()),
        ids: ConnectionIds::new(),
        start_time: Instant::now(),
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
