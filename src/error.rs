//! Public error type for the ThreatGuard core.
//!
//! Internal composition uses `anyhow::Result` throughout; at the boundary of
//! a component's public API, errors are converted into one of the kinds
//! below so callers (the CLI wrapper, a plugin host) can make policy
//! decisions without downcasting.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreatGuardError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("discovery probe failed: {0}")]
    Probe(String),

    #[error("rule error: {0}")]
    Rule(String),

    #[error("filter error: {0}")]
    Filter(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("resource error: {0}")]
    Resource(String),
}

impl ThreatGuardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThreatGuardError::Config(_) => ErrorKind::Config,
            ThreatGuardError::Probe(_) => ErrorKind::Probe,
            ThreatGuardError::Rule(_) => ErrorKind::Rule,
            ThreatGuardError::Filter(_) => ErrorKind::Filter,
            ThreatGuardError::Transport(_) => ErrorKind::Transport,
            ThreatGuardError::Serialization(_) => ErrorKind::Serialization,
            ThreatGuardError::Resource(_) => ErrorKind::Resource,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Config,
    Probe,
    Rule,
    Filter,
    Transport,
    Serialization,
    Resource,
}

/// Last-error record surfaced in a health snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LastError {
    pub fn from_error(err: &ThreatGuardError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ThreatGuardError>;
