//! Harness configuration loaded from `dscc.toml` at the app root
//!
//! ```toml
//! [analysis]
//! markers = ["detect"]
//!
//! [synthesis]
//! noninteractive = true
//!
//! [mock]
//! fallback_empty = true
//!
//! [patch]
//! session_names = ["spark", "session"]
//!
//! [run]
//! workers = 4
//! timeout_secs = 300
//! boundary = "container"
//! container = "dscc-spark-api"
//! ```

use crate::error::ConfigError;
use crate::mock::MockConfig;
use dscc_analysis::AnalyzerConfig;
use dscc_patch::PatcherConfig;
use dscc_synth::SynthesisOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up at the app root
pub const CONFIG_FILE: &str = "dscc.toml";

/// Where cases execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryKind {
    /// Registered native implementations
    InProcess,
    /// Local interpreter subprocess
    #[default]
    Local,
    /// `docker exec` into a running container
    Container,
}

/// `[run]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Concurrent cases
    pub workers: usize,
    /// Run-level deadline; `None` waits forever
    pub timeout_secs: Option<u64>,
    /// Execution boundary
    pub boundary: BoundaryKind,
    /// Interpreter used by process boundaries
    pub interpreter: String,
    /// Container runtime binary
    pub runtime: String,
    /// Container name for the container boundary
    pub container: String,
    /// Install collected requirements before running
    pub install_requirements: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout_secs: None,
            boundary: BoundaryKind::Local,
            interpreter: "python3".to_string(),
            runtime: "docker".to_string(),
            container: "dscc-spark-api".to_string(),
            install_requirements: false,
        }
    }
}

impl RunConfig {
    /// Deadline as a duration
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Set workers
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set run deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|d| d.as_secs().max(1));
        self
    }

    /// Set boundary
    #[must_use]
    pub fn with_boundary(mut self, boundary: BoundaryKind) -> Self {
        self.boundary = boundary;
        self
    }
}

/// Full harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Analyzer idioms
    pub analysis: AnalyzerConfig,
    /// Synthesis options
    pub synthesis: SynthesisOptions,
    /// Mock provider
    pub mock: MockConfig,
    /// Patcher rewrites
    pub patch: PatcherConfig,
    /// Execution
    pub run: RunConfig,
}

impl HarnessConfig {
    /// Parse TOML text
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load `dscc.toml` from `app_root`, defaults when absent.
    ///
    /// Relative sample directories are anchored at `app_root`.
    pub async fn load(app_root: &Path) -> Result<Self, ConfigError> {
        let path = app_root.join(CONFIG_FILE);
        let mut config = match tokio::fs::read_to_string(&path).await {
            Ok(text) => Self::from_toml(&text, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        config.mock.base_dir = anchor(app_root, &config.mock.base_dir);
        config.synthesis.sample_root = anchor(app_root, &config.synthesis.sample_root);
        Ok(config)
    }
}

fn anchor(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
