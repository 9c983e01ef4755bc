//! DSCC Test Specification Synthesis
//!
//! Turns analysis output into `TestCase` specifications, either through a
//! typed prompt/answer exchange or a fixed noninteractive policy, and
//! persists them into the notebook's YAML metadata region.
//!
//! # Noninteractive policy
//!
//! - inputs from literal defaults (declared default first, else first call site)
//! - `"<required>"` where no literal is known
//! - one mocked input per table at `tests/<table>_sample.<fmt>`
//! - `count: "> 0"`

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod fetcher;
pub mod options;
pub mod prompt;
pub mod synthesizer;

pub use error::{FetchError, SynthError, SynthResult};
pub use fetcher::{SampleFetcher, SampleFormat, SampleRequest, UnavailableFetcher};
pub use options::SynthesisOptions;
pub use prompt::{Answer, DefaultPolicy, Prompt, Responder, ScriptedResponder, TerminalResponder};
pub use synthesizer::{
    default_sample_path, merge_cases, sanitize_table_name, InferOutcome, InferenceAmbiguity,
    MergeOutcome, PersistOutcome, Resolution, SampleOutcome, SampleStatus, Synthesis,
    TestSpecSynthesizer,
};

/// Placeholder for parameters without a known literal
pub const PLACEHOLDER: &str = "<required>";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
