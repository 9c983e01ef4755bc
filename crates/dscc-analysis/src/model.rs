//! Analysis output model
//!
//! Derived from a document on every analysis; never persisted.

use crate::error::AnalysisWarning;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Position of a syntax node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceLocation {
    /// Cell index in the document
    pub cell: usize,
    /// Line in the encoded file (1-based; interchange cells count from 1)
    pub line: usize,
    /// Column (1-based, bytes)
    pub column: usize,
}

impl SourceLocation {
    /// Create new location
    #[inline]
    #[must_use]
    pub fn new(cell: usize, line: usize, column: usize) -> Self {
        Self { cell, line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell {}, line {}:{}", self.cell, self.line, self.column)
    }
}

/// Parameter default value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// No default
    Absent,
    /// Literal string/number/bool/None
    Literal(serde_json::Value),
    /// Present but not a literal; holds the expression text
    NonLiteral(String),
}

impl DefaultValue {
    /// Literal value, if any
    #[must_use]
    pub fn literal(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }
}

/// How a parameter binds arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Positional or keyword
    Regular,
    /// `*args`
    VarPositional,
    /// `**kwargs`
    VarKeyword,
}

/// One function parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    /// Parameter name (without `*`)
    pub name: String,
    /// Binding kind
    pub kind: ParameterKind,
    /// Annotation text, if any
    pub annotation: Option<String>,
    /// Default value
    pub default: DefaultValue,
}

/// A table accessed by a function, with column hints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReference {
    /// Table name
    pub table: String,
    /// Column names referenced after the access (ordered, unique)
    pub columns: Vec<String>,
    /// First access
    pub location: SourceLocation,
}

impl TableReference {
    pub(crate) fn new(table: String, location: SourceLocation) -> Self {
        Self {
            table,
            columns: Vec::new(),
            location,
        }
    }

    pub(crate) fn add_column(&mut self, column: String) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }
}

/// A literal-keyword invocation of a detection function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSite {
    /// Keyword arguments with literal values, in call order
    pub arguments: IndexMap<String, serde_json::Value>,
    /// Where the call appears
    pub location: SourceLocation,
}

/// A test-eligible function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionFunction {
    /// Function name
    pub name: String,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterSpec>,
    /// Tables accessed, in first-access order
    pub tables: Vec<TableReference>,
    /// Literal call sites anywhere in the document, in source order
    pub call_sites: Vec<CallSite>,
    /// Definition position
    pub location: SourceLocation,
}

impl DetectionFunction {
    /// Find parameter by name
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Union of column hints across all tables, sorted
    #[must_use]
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .tables
            .iter()
            .flat_map(|t| t.columns.iter().cloned())
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }

    /// Distinct literal candidates for a parameter: declared default first,
    /// then call-site values in source order
    #[must_use]
    pub fn candidates(&self, parameter: &str) -> Vec<serde_json::Value> {
        let mut out: Vec<serde_json::Value> = Vec::new();
        if let Some(value) = self.parameter(parameter).and_then(|p| p.default.literal()) {
            out.push(value.clone());
        }
        for site in &self.call_sites {
            if let Some(value) = site.arguments.get(parameter) {
                if !out.contains(value) {
                    out.push(value.clone());
                }
            }
        }
        out
    }
}

/// Result of analysing one document
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisReport {
    /// Detection functions in source order
    pub functions: Vec<DetectionFunction>,
    /// Non-fatal findings in source order
    pub warnings: Vec<AnalysisWarning>,
}

impl AnalysisReport {
    /// Find function by name
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&DetectionFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}
