//! DSCC Test Harness
//!
//! Executes the test cases embedded in notebooks against mocked tables and
//! judges the results.
//!
//! # Architecture
//!
//! ```text
//! NotebookSource ──► NotebookPatcher ──► PatchedModule ─┐
//!        │                                              ▼
//!        └──► MetadataBlock ──► HarnessGenerator ──► HarnessUnit
//!                                    ▲                  │
//!                         MockDataProvider              ▼
//!                                              ExecutionBoundary
//!                                                       │
//!                     RunReport ◄── Comparator ◄── result Table
//! ```
//!
//! Each case moves through `Pending → Patching → Mocking → Invoking →
//! Comparing` and settles as `Passed`, `Failed` or `Errored`.
//!
//! # Example
//!
//! ```rust,ignore
//! use dscc_harness::{HarnessConfig, HarnessExecutor, ProcessBoundary, ProcessTarget};
//! use dscc_notebook::NotebookStore;
//! use std::sync::Arc;
//!
//! let config = HarnessConfig::load(Path::new(".")).await?;
//! let boundary = ProcessBoundary::new(
//!     ProcessTarget::Local { interpreter: "python3".into() },
//!     ".dscc",
//! );
//! let executor = HarnessExecutor::new(&config, Arc::new(NotebookStore::default()), Arc::new(boundary));
//! let report = executor.run(&[PathBuf::from("detections/login.py")]).await;
//! println!("{}", report.summary());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod boundary;
pub mod compare;
pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod mock;
pub mod requirements;
pub mod result;
pub mod state;
pub mod table;

pub use boundary::{
    bind_inputs, DetectionImpl, ExecutionBoundary, InProcessBoundary, ProcessBoundary,
    ProcessTarget,
};
pub use compare::{check_count, check_data, check_schema, normalize_type, Comparator, Verdict};
pub use config::{BoundaryKind, HarnessConfig, RunConfig, CONFIG_FILE};
pub use error::{BoundaryError, ConfigError, InfrastructureError, MockResolutionError, StateError};
pub use executor::HarnessExecutor;
pub use generator::{render_driver, HarnessGenerator, HarnessUnit, RESULT_MARKER};
pub use mock::{MockConfig, MockDataProvider, MockSession, TableAccess};
pub use requirements::Requirements;
pub use result::{NotebookError, RunReport, RunSummary, TestResult};
pub use state::{allowed_transitions, validate_transition, CaseState, CaseTracker};
pub use table::{infer_type, Column, Row, Table};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
