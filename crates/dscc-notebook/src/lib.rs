//! DSCC Notebook Model
//!
//! Parses notebook sources into a canonical document shape and extracts
//! the embedded YAML metadata that carries test specifications.
//!
//! # Encodings
//!
//! - **Source**: single `.py` file, cells split by `# COMMAND ----------`,
//!   magic lines prefixed `# MAGIC `
//! - **Interchange**: nbformat v4 JSON (`.ipynb`)
//!
//! # Architecture
//!
//! ```text
//! File System → Parser → NotebookDocument → with_metadata → render → File System
//!                  ↑___________↓
//!                 NotebookStore (path, mtime)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dscc_notebook::{NotebookDocument, TestCase};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = NotebookDocument::read("detections/login.py").await?;
//! let mut block = doc.metadata().clone();
//! block.tests.push(TestCase::new("detect_login"));
//! doc.with_metadata(&block)?.write("detections/login.py").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod discovery;
pub mod document;
pub mod error;
pub mod metadata;
pub mod parsers;
pub mod store;

pub use discovery::{discover_notebooks, normalized_file_name};
pub use document::{Cell, CellKind, NotebookDocument};
pub use error::{NotebookError, NotebookResult, ParseError, SerializeError};
pub use metadata::{
    default_case_name, Expectation, MetadataBlock, MetadataRegion, MockedInput, SchemaEntry,
    TestCase,
};
pub use parsers::{Encoding, NotebookParser};
pub use store::{NotebookStore, StoreStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with notebooks
    pub use crate::document::{Cell, CellKind, NotebookDocument};
    pub use crate::error::{ParseError, SerializeError};
    pub use crate::metadata::{Expectation, MetadataBlock, MockedInput, SchemaEntry, TestCase};
    pub use crate::store::NotebookStore;
}
