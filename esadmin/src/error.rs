//! Error types for cluster operations

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Failures talking to the control-plane API.
///
/// The three kinds are kept distinct so callers can tell "nobody answered"
/// apart from "the cluster said no" and "the cluster said something we
/// could not read".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("{method} {path} returned HTTP {status}: {body}")]
    Http {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl TransportError {
    /// Whether a GET failing this way is worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connection { .. } => true,
            TransportError::Http { status, .. } => matches!(status, 502..=504),
            TransportError::Decode { .. } => false,
        }
    }

    /// HTTP status, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            TransportError::Connection { .. } => "connection",
            TransportError::Http { .. } => "http",
            TransportError::Decode { .. } => "decode",
        }
    }
}

/// Failures mapping a human-supplied name onto a cluster object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} name '{name}' is ambiguous, matches: {}", .candidates.join(", "))]
    Ambiguous {
        kind: &'static str,
        name: String,
        candidates: Vec<String>,
    },
}

impl ResolutionError {
    pub fn node_not_found(name: impl Into<String>) -> Self {
        ResolutionError::NotFound {
            kind: "Node",
            name: name.into(),
        }
    }

    pub fn index_not_found(name: impl Into<String>) -> Self {
        ResolutionError::NotFound {
            kind: "Index",
            name: name.into(),
        }
    }

    pub fn shard_not_found(name: impl Into<String>) -> Self {
        ResolutionError::NotFound {
            kind: "Shard",
            name: name.into(),
        }
    }
}

/// Outcome of a bulk per-index operation where some indices failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeMap<String, String>,
}

impl PartialFailure {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line summary naming every failed index
    pub fn summary(&self) -> String {
        let failed: Vec<String> = self
            .failed
            .iter()
            .map(|(index, reason)| format!("{}: {}", index, reason))
            .collect();
        format!(
            "{} of {} indices failed ({})",
            self.failed.len(),
            self.failed.len() + self.succeeded.len(),
            failed.join("; ")
        )
    }
}

/// Everything the engine can surface to a caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Refused by safety check: {reason}")]
    SafetyDenied { reason: String },

    #[error("Partial failure: {}", .0.summary())]
    PartialFailure(PartialFailure),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::Transport(e) => e.error_type(),
            EngineError::Resolution(ResolutionError::NotFound { .. }) => "not_found",
            EngineError::Resolution(ResolutionError::Ambiguous { .. }) => "ambiguous",
            EngineError::SafetyDenied { .. } => "safety_denied",
            EngineError::PartialFailure(_) => "partial_failure",
            EngineError::Timeout(_) => "timeout",
            EngineError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
