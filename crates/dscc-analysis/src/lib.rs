//! DSCC Static Analysis
//!
//! Walks the syntax trees of notebook code cells and reports test-eligible
//! detection functions with their parameters, literal defaults, table
//! references and column hints.
//!
//! Only a bounded set of call idioms is recognised; anything else is skipped.
//!
//! # Example
//!
//! ```rust,ignore
//! use dscc_analysis::StaticAnalyzer;
//! use dscc_notebook::NotebookDocument;
//!
//! let doc = NotebookDocument::parse(source)?;
//! let report = StaticAnalyzer::default().analyze(&doc)?;
//! for function in &report.functions {
//!     println!("{} reads {:?}", function.name, function.tables);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod analyzer;
pub mod error;
pub mod idiom;
mod literal;
pub mod model;
pub mod syntax;

pub use analyzer::{AnalyzerConfig, StaticAnalyzer};
pub use error::{AnalysisError, AnalysisWarning};
pub use idiom::{CallRole, Idiom, SyntaxVisitor};
pub use model::{
    AnalysisReport, CallSite, DefaultValue, DetectionFunction, ParameterKind, ParameterSpec,
    SourceLocation, TableReference,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
