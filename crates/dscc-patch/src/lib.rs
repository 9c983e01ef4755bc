//! DSCC Notebook Patcher
//!
//! Rewrites a notebook into a standalone Python module that runs without the
//! hosting platform:
//!
//! - markdown cells and non-include magics are dropped
//! - `%run` includes are inlined once each, in dependency order
//! - the platform session (`spark`) becomes a fixture bound by the harness
//! - `display(x)` becomes `(x).show()`
//!
//! # Architecture
//!
//! ```text
//! NotebookSource ──► IncludeGraph (worklist + cycle check) ──► inline
//!                                                            │
//!                         PatchedModule ◄── rewrite (tree-sitter)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dscc_notebook::NotebookStore;
//! use dscc_patch::NotebookPatcher;
//! use std::sync::Arc;
//!
//! let patcher = NotebookPatcher::new(Arc::new(NotebookStore::default()));
//! let module = patcher.patch(Path::new("detections/login.py")).await?;
//! module.write_to(Path::new("build")).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod graph;
pub mod patcher;
pub mod rewrite;
pub mod source;

pub use error::{PatchError, PatchResult};
pub use graph::IncludeGraph;
pub use patcher::{module_name, NotebookPatcher, PatchedModule, PatcherConfig};
pub use rewrite::{BIND_FUNCTION, FIXTURE_NAME};
pub use source::{MemorySource, NotebookSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
