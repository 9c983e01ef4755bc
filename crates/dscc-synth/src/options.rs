//! Synthesis options (`[synthesis]` in `dscc.toml`)

use crate::fetcher::SampleFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options controlling test synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Render the YAML without writing anything
    pub dry_run: bool,
    /// Replace existing cases with the same name
    pub overwrite: bool,
    /// Use the default policy instead of the responder
    pub noninteractive: bool,
    /// Skip sample fetching
    pub no_sample: bool,
    /// Write an empty stub when a sample cannot be fetched
    pub fallback_empty: bool,
    /// Format of default sample paths
    pub sample_format: SampleFormat,
    /// Maximum rows per fetched sample
    pub sample_limit: usize,
    /// Directory sample paths are relative to (the app root)
    pub sample_root: PathBuf,
    /// Count expectation proposed for every case
    pub default_count: String,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            overwrite: false,
            noninteractive: false,
            no_sample: false,
            fallback_empty: false,
            sample_format: SampleFormat::Json,
            sample_limit: 10,
            sample_root: PathBuf::from("."),
            default_count: "> 0".to_string(),
        }
    }
}

impl SynthesisOptions {
    /// Set dry run
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set overwrite
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set noninteractive
    #[must_use]
    pub fn with_noninteractive(mut self, noninteractive: bool) -> Self {
        self.noninteractive = noninteractive;
        self
    }

    /// Set no-sample
    #[must_use]
    pub fn with_no_sample(mut self, no_sample: bool) -> Self {
        self.no_sample = no_sample;
        self
    }

    /// Set empty-stub fallback
    #[must_use]
    pub fn with_fallback_empty(mut self, fallback_empty: bool) -> Self {
        self.fallback_empty = fallback_empty;
        self
    }

    /// Set sample format
    #[must_use]
    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    /// Set sample root
    #[must_use]
    pub fn with_sample_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sample_root = root.into();
        self
    }
}
