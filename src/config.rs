//! Configuration for QRLink
//!
//! Centralized configuration with sensible defaults. A `Config` is built once
//! at startup and shared read-only by every session worker.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{QrLinkError, Result};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 2012;

/// Main configuration for a QRLink server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host or interface to bind
    pub bind_host: String,

    /// TCP listen port (0 picks an ephemeral port)
    pub port: u16,

    /// How long the acceptor sleeps when no connection is pending
    pub accept_poll_interval: Duration,

    // -------------------------------------------------------------------------
    // Admission Configuration
    // -------------------------------------------------------------------------
    /// Max admitted connections per peer IP within the window
    pub rate_limit: RateLimit,

    /// Max concurrent sessions
    pub max_users: usize,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// How long a session may wait for its next command
    pub idle_timeout: Duration,

    /// Per read/write bound while a frame is in flight (None = block forever)
    pub transfer_timeout: Option<Duration>,

    /// Largest frame body the server will accept (bytes)
    pub max_frame_size: u64,

    /// What a SHUTDOWN command stops
    pub shutdown_scope: ShutdownScope,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Append-only audit log
    pub log_path: PathBuf,

    /// Directory for per-upload temporary artifacts
    pub artifact_dir: PathBuf,
}

/// Connection rate limit: `max_connections` per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_connections: usize,
    pub window: Duration,
}

/// Scope of the SHUTDOWN command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownScope {
    /// End only the session that sent it
    #[default]
    Session,

    /// Stop accepting, drain live sessions, and return from `Server::run`
    Server,
}

impl std::str::FromStr for ShutdownScope {
    type Err = QrLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(ShutdownScope::Session),
            "server" => Ok(ShutdownScope::Server),
            other => Err(QrLinkError::Config(format!(
                "unknown shutdown scope '{}' (expected 'session' or 'server')",
                other
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            accept_poll_interval: Duration::from_millis(50),
            rate_limit: RateLimit {
                max_connections: 3,
                window: Duration::from_secs(60),
            },
            max_users: 3,
            idle_timeout: Duration::from_secs(80),
            transfer_timeout: Some(Duration::from_secs(30)),
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            shutdown_scope: ShutdownScope::Session,
            log_path: PathBuf::from("log.txt"),
            artifact_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// `host:port` string for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Apply the keyword options `PORT <port>`, `RATE <count> <seconds>`,
    /// `MAX_USERS <n>` and `TIME_OUT <seconds>`.
    ///
    /// Unknown tokens are rejected. Every value must be present and numeric,
    /// and every limit must be non-zero.
    pub fn apply_keyword_args<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut iter = args.iter();

        while let Some(keyword) = iter.next() {
            match keyword.to_ascii_uppercase().as_str() {
                "PORT" => {
                    self.port = parse_value(keyword, iter.next())?;
                }
                "RATE" => {
                    let count: usize = parse_value(keyword, iter.next())?;
                    let secs: u64 = parse_value(keyword, iter.next())?;
                    if count == 0 || secs == 0 {
                        return Err(QrLinkError::Config(
                            "RATE count and window must be greater than zero".to_string(),
                        ));
                    }
                    self.rate_limit = RateLimit {
                        max_connections: count,
                        window: Duration::from_secs(secs),
                    };
                }
                "MAX_USERS" => {
                    let n: usize = parse_value(keyword, iter.next())?;
                    if n == 0 {
                        return Err(QrLinkError::Config(
                            "MAX_USERS must be greater than zero".to_string(),
                        ));
                    }
                    self.max_users = n;
                }
                "TIME_OUT" => {
                    let secs: u64 = parse_value(keyword, iter.next())?;
                    if secs == 0 {
                        return Err(QrLinkError::Config(
                            "TIME_OUT must be greater than zero".to_string(),
                        ));
                    }
                    self.idle_timeout = Duration::from_secs(secs);
                }
                _ => {
                    return Err(QrLinkError::Config(format!(
                        "unknown option '{}'",
                        keyword
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check invariants the session and admission code rely on
    pub fn validate(&self) -> Result<()> {
        if self.max_users == 0 {
            return Err(QrLinkError::Config("max_users must be non-zero".into()));
        }
        if self.rate_limit.max_connections == 0 || self.rate_limit.window.is_zero() {
            return Err(QrLinkError::Config("rate limit must be non-zero".into()));
        }
        if self.idle_timeout.is_zero() {
            return Err(QrLinkError::Config("idle timeout must be non-zero".into()));
        }
        if matches!(self.transfer_timeout, Some(t) if t.is_zero()) {
            return Err(QrLinkError::Config(
                "transfer timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Convert a frame limit given in megabytes to bytes
pub fn frame_size_from_mb(mb: u64) -> Result<u64> {
    mb.checked_mul(1024 * 1024)
        .ok_or_else(|| QrLinkError::Config(format!("max frame size of {} MB is too large", mb)))
}

fn parse_value<T: std::str::FromStr>(keyword: &str, value: Option<&String>) -> Result<T> {
    let raw = value.ok_or_else(|| {
        QrLinkError::Config(format!("{} is missing a value", keyword))
    })?;
    raw.parse().map_err(|_| {
        QrLinkError::Config(format!("{} expects a number, got '{}'", keyword, raw))
    })
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the host to bind
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    /// Set the TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the acceptor poll interval
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.config.accept_poll_interval = interval;
        self
    }

    /// Set the per-peer connection rate limit
    pub fn rate_limit(mut self, max_connections: usize, window: Duration) -> Self {
        self.config.rate_limit = RateLimit {
            max_connections,
            window,
        };
        self
    }

    /// Set the maximum number of concurrent sessions
    pub fn max_users(mut self, count: usize) -> Self {
        self.config.max_users = count;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the per-operation transfer timeout
    pub fn transfer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.transfer_timeout = timeout;
        self
    }

    /// Set the maximum frame body size (in bytes)
    pub fn max_frame_size(mut self, size: u64) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the SHUTDOWN scope
    pub fn shutdown_scope(mut self, scope: ShutdownScope) -> Self {
        self.config.shutdown_scope = scope;
        self
    }

    /// Set the audit log path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Set the directory for temporary artifacts
    pub fn artifact_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = path.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
