//! Synthesis error types

use dscc_analysis::AnalysisError;
use dscc_notebook::{ParseError, SerializeError};
use std::path::PathBuf;

/// Sample fetch failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The execution platform cannot be reached
    #[error("sample source unavailable: {0}")]
    Unavailable(String),

    /// The platform answered but the fetch failed
    #[error("failed to fetch sample for '{table}': {message}")]
    Failed {
        /// Table being sampled
        table: String,
        /// Failure detail
        message: String,
    },
}

/// Errors during test synthesis
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Notebook could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Metadata could not be written
    #[error("serialize error: {0}")]
    Serialize(#[from] SerializeError),

    /// Static analysis failed
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Responder returned an answer that does not fit the prompt
    #[error("answer {answer} does not fit prompt {prompt}")]
    UnexpectedAnswer {
        /// Prompt kind
        prompt: String,
        /// Answer kind
        answer: String,
    },

    /// Responder failed to exchange with the operator
    #[error("prompt exchange failed: {0}")]
    Prompt(#[source] std::io::Error),

    /// IO error on a sample or stub file
    #[error("io error on {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl SynthError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for synthesis operations
pub type SynthResult<T> = Result<T, SynthError>;
