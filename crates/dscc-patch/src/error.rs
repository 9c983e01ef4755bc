//! Patch error types

use dscc_analysis::AnalysisError;
use dscc_notebook::ParseError;
use std::path::PathBuf;

/// Errors while patching a notebook into a standalone module
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A notebook in the include graph does not parse
    #[error("cannot parse {notebook}: {source}")]
    Parse {
        /// Notebook path
        notebook: PathBuf,
        /// Underlying error
        #[source]
        source: ParseError,
    },

    /// `%run` target does not resolve to a notebook
    #[error("unresolved include '{target}' in {notebook}")]
    UnresolvedInclude {
        /// Including notebook
        notebook: PathBuf,
        /// Directive argument as written
        target: String,
    },

    /// Include directives form a cycle
    #[error("include cycle: {}", display_cycle(.cycle))]
    IncludeCycle {
        /// Every notebook on the cycle, first repeated at the end
        cycle: Vec<PathBuf>,
    },

    /// Syntax tree could not be built
    #[error("syntax error: {0}")]
    Syntax(#[from] AnalysisError),

    /// Patched module is not valid python
    #[error("syntax error in {notebook} at line {line}:{column}")]
    InvalidSyntax {
        /// Notebook holding the offending code
        notebook: PathBuf,
        /// 1-based line within that notebook
        line: usize,
        /// 1-based column
        column: usize,
    },

    /// IO error writing the patched module
    #[error("io error on {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create parse error for a notebook
    pub fn parse_error(notebook: impl Into<PathBuf>, source: ParseError) -> Self {
        Self::Parse {
            notebook: notebook.into(),
            source,
        }
    }
}

fn display_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result alias for patch operations
pub type PatchResult<T> = Result<T, PatchError>;
