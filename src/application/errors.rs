//! Application layer errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Manifest parsing and validation errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Addon at {0} declares neither addonfile nor commandfile")]
    MissingEntry(PathBuf),
}

/// Errors raised while importing or running an addon
#[derive(Error, Debug)]
pub enum AddonError {
    #[error("Addon entry not found: {0}")]
    NotFound(String),

    #[error("Load failed: {0}")]
    Load(String),

    #[error("Hook failed: {0}")]
    Hook(String),

    #[error("Schema error: {0}")]
    Schema(#[from] StorageError),
}

/// Failure reported by an interaction handler or bus listener
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

/// Interaction router errors
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
}

/// Event bus errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Invalid event key '{0}', expected <namespace>:<eventName>")]
    InvalidKey(String),
}

/// Errors surfaced to callers of the protection layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtectionError {
    #[error("Request already in progress for {actor} ({action})")]
    DuplicateRequest { actor: String, action: String },

    #[error("Rate limited on {action}, retry after {}s", retry_after_secs(.retry_after))]
    RateLimited { action: String, retry_after: Duration },
}

impl ProtectionError {
    /// Whole seconds until another call is permitted, if rate limited
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProtectionError::RateLimited { retry_after, .. } => Some(retry_after_secs(retry_after)),
            ProtectionError::DuplicateRequest { .. } => None,
        }
    }
}

fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Host connection errors
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Command registration failed: {0}")]
    Commands(String),

    #[error("Connection closed")]
    Closed,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock poisoned")]
    Poisoned,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
