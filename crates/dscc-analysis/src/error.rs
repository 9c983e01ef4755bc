//! Analysis errors and warnings
//!
//! Warnings are data: they are collected into the report and never stop
//! analysis of other functions.

use crate::model::SourceLocation;
use serde::Serialize;

/// Fatal analysis errors
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Grammar could not be loaded into the parser
    #[error("failed to initialise python parser: {0}")]
    ParserInit(String),

    /// Parser returned no tree
    #[error("parser produced no syntax tree for cell {cell}")]
    ParseFailed {
        /// Cell index
        cell: usize,
    },
}

/// Non-fatal findings recorded during analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisWarning {
    /// A parameter default is not a literal
    #[error("{location}: default of '{function}.{parameter}' is not a literal: {expression}")]
    NonLiteralDefault {
        /// Function name
        function: String,
        /// Parameter name
        parameter: String,
        /// Default expression text
        expression: String,
        /// Where the default appears
        location: SourceLocation,
    },

    /// Table access whose argument is not a string literal
    #[error("{location}: table access in '{function}' is not a literal: {expression}")]
    UnresolvedTable {
        /// Function name
        function: String,
        /// Argument text
        expression: String,
        /// Where the call appears
        location: SourceLocation,
    },

    /// Column reference with no preceding table access in the same function
    #[error("{location}: column '{column}' in '{function}' has no preceding table access")]
    UnattachedColumn {
        /// Function name
        function: String,
        /// Column name
        column: String,
        /// Where the call appears
        location: SourceLocation,
    },

    /// Code cell contains syntax errors; the recovered tree is still analysed
    #[error("{location}: syntax error")]
    SyntaxError {
        /// First error position
        location: SourceLocation,
    },
}

impl AnalysisWarning {
    /// Location of the finding
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::NonLiteralDefault { location, .. }
            | Self::UnresolvedTable { location, .. }
            | Self::UnattachedColumn { location, .. }
            | Self::SyntaxError { location } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_display_includes_location() {
        let warning = AnalysisWarning::UnattachedColumn {
            function: "f".to_string(),
            column: "user".to_string(),
            location: SourceLocation::new(2, 14, 8),
        };
        assert_eq!(
            warning.to_string(),
            "cell 2, line 14:8: column 'user' in 'f' has no preceding table access"
        );
        assert_eq!(warning.location().line, 14);
    }
}
