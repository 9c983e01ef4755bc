//! Harness error types
//!
//! Case-scoped failures (`MockResolutionError`, `BoundaryError::Invocation`)
//! settle one case as `Errored`; `BoundaryError::Unavailable` is an
//! infrastructure error and aborts the run.

use crate::state::CaseState;
use std::path::PathBuf;

/// A mocked input could not be resolved to a table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockResolutionError {
    /// No sample file and stubs are disabled
    #[error("no sample for table '{table}' at {path}")]
    Missing {
        /// Table name
        table: String,
        /// Expected sample path
        path: PathBuf,
    },

    /// The case reads a table with no mocked input
    #[error("table '{0}' has no mocked input")]
    Unbound(String),

    /// Sample file exists but cannot be decoded
    #[error("cannot read sample {path}: {message}")]
    Unreadable {
        /// Sample path
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// Unknown sample extension
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(PathBuf),
}

impl MockResolutionError {
    /// Create unreadable error
    pub fn unreadable(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Unreadable {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Failures at an execution boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
    /// Runtime or container cannot be used at all
    #[error("execution boundary unavailable: {0}")]
    Unavailable(String),

    /// The function raised or could not be bound
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// The boundary answered with something unparsable
    #[error("malformed result: {0}")]
    Protocol(String),

    /// Staging files for the boundary failed
    #[error("io error on {path}: {message}")]
    Io {
        /// File path
        path: PathBuf,
        /// Error text
        message: String,
    },
}

impl BoundaryError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Whether the whole run must stop
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Illegal case state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct StateError {
    /// Current state
    pub from: CaseState,
    /// Requested state
    pub to: CaseState,
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("invalid config {path}: {source}")]
    Toml {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },
}

/// The run stopped because the boundary became unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("infrastructure error: {0}")]
pub struct InfrastructureError(pub String);
