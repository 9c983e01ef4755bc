//! Error types for the notebook model
//!
//! Provides error handling for:
//! - Parse operations (source text → `NotebookDocument`)
//! - Serialize operations (`MetadataBlock` → YAML region → source text)
//! - Store operations (file system + cache)

use std::path::PathBuf;

/// Errors while parsing notebook source or its embedded metadata
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A line looks like a cell delimiter but is not the exact marker
    #[error("malformed cell delimiter at line {line}: '{text}'")]
    MalformedDelimiter { line: usize, text: String },

    /// Interchange (JSON) notebook could not be decoded
    #[error("invalid interchange notebook: {0}")]
    InvalidInterchange(String),

    /// A fenced YAML block never closes
    #[error("unterminated yaml fence in cell {cell} at line {line}")]
    UnterminatedFence { cell: usize, line: usize },

    /// YAML block content does not parse
    #[error("invalid yaml in cell {cell} at line {line}: {message}")]
    InvalidYaml {
        cell: usize,
        line: usize,
        message: String,
    },

    /// `dscc-tests` entry does not match the test case shape
    #[error("invalid test case in cell {cell}: {message}")]
    InvalidTestCase { cell: usize, message: String },

    /// IO error during file read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create yaml error located in a cell
    pub fn invalid_yaml(cell: usize, line: usize, err: &serde_yaml::Error) -> Self {
        // serde_yaml reports 1-based lines relative to the block
        let offset = err.location().map_or(0, |loc| loc.line());
        Self::InvalidYaml {
            cell,
            line: line + offset,
            message: err.to_string(),
        }
    }

    /// Location context as `(cell, line)` when known
    #[must_use]
    pub fn location(&self) -> Option<(Option<usize>, usize)> {
        match self {
            Self::MalformedDelimiter { line, .. } => Some((None, *line)),
            Self::UnterminatedFence { cell, line } | Self::InvalidYaml { cell, line, .. } => {
                Some((Some(*cell), *line))
            }
            _ => None,
        }
    }
}

/// Errors while writing metadata back into a document
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// YAML rendering failed
    #[error("yaml serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON rendering failed
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Edited document no longer parses
    #[error("edited document is invalid: {0}")]
    Reparse(#[from] ParseError),

    /// IO error during file write
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SerializeError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Combined notebook error
#[derive(Debug, thiserror::Error)]
pub enum NotebookError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("serialize error: {0}")]
    Serialize(#[from] SerializeError),
}

/// Result type alias for notebook operations
pub type NotebookResult<T> = Result<T, NotebookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_delimiter_display() {
        let err = ParseError::MalformedDelimiter {
            line: 4,
            text: "# COMMAND ---".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed cell delimiter at line 4: '# COMMAND ---'"
        );
        assert_eq!(err.location(), Some((None, 4)));
    }

    #[test]
    fn yaml_error_carries_cell() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err = ParseError::invalid_yaml(2, 10, &yaml_err);
        assert!(matches!(err, ParseError::InvalidYaml { cell: 2, .. }));
        assert!(err.to_string().contains("cell 2"));
    }

    #[test]
    fn error_conversions() {
        let parse_err = ParseError::InvalidInterchange("x".to_string());
        let err: NotebookError = parse_err.into();
        assert!(matches!(err, NotebookError::Parse(_)));
    }
}
