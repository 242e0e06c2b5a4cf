//! Error types for pool diagnostics and reclamation

use std::time::Duration;
use thiserror::Error;

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors produced while resolving connection settings.
///
/// All variants are fatal for the invocation: no retry can succeed until
/// the configuration changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Connection URI does not use a postgres scheme
    #[error("unsupported connection URI scheme: {0}")]
    UnsupportedScheme(String),

    /// Host resolved to an empty value
    #[error("database host is empty after resolution")]
    MissingHost,

    /// Database name resolved to an empty value
    #[error("database name is empty after resolution")]
    MissingDatabase,

    /// URI or discrete field failed to parse
    #[error("invalid connection settings: {0}")]
    Invalid(String),
}

/// Errors that can occur during registry, probe, and reap operations
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Connection settings could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Network or transport failure; the caller may retry with backoff
    #[error("connection failed: {reason}")]
    Connect { reason: String },

    /// Credentials rejected. Distinguished from [`MonitorError::Connect`]
    /// so callers never blindly retry bad credentials.
    #[error("authentication rejected for user {user}")]
    Auth { user: String },

    /// The server refused a new session because no slots are free
    #[error("server refused new session: {reason}")]
    ServerFull { reason: String },

    /// Per-session detail could not be read from the registry view
    #[error("session registry unavailable: {reason}")]
    Registry { reason: String },

    /// An operation exceeded its timeout bound
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl MonitorError {
    /// Exit code under the CLI convention: transient failures exit 1,
    /// failures that need reconfiguration exit 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::Config(_) | MonitorError::Auth { .. } => 2,
            MonitorError::Connect { .. }
            | MonitorError::ServerFull { .. }
            | MonitorError::Registry { .. }
            | MonitorError::Timeout { .. } => 1,
        }
    }

    /// Whether a retry could ever succeed without operator intervention
    pub fn is_transient(&self) -> bool {
        !matches!(self, MonitorError::Config(_) | MonitorError::Auth { .. })
    }
}
