//! Where the patcher loads notebooks from

use dscc_notebook::{NotebookDocument, NotebookStore, ParseError};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Read access to notebooks by path
#[async_trait::async_trait]
pub trait NotebookSource: Send + Sync {
    /// Load and parse a notebook
    async fn load(&self, path: &Path) -> Result<Arc<NotebookDocument>, ParseError>;

    /// Whether a notebook exists at `path`
    async fn exists(&self, path: &Path) -> bool;
}

#[async_trait::async_trait]
impl NotebookSource for NotebookStore {
    async fn load(&self, path: &Path) -> Result<Arc<NotebookDocument>, ParseError> {
        NotebookStore::load(self, path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_file())
    }
}

/// In-memory notebooks keyed by normalized path
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    notebooks: HashMap<PathBuf, Arc<NotebookDocument>>,
}

impl MemorySource {
    /// Create empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notebook parsed from `content`
    pub fn with_notebook(
        mut self,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Result<Self, ParseError> {
        let path = normalize(path.as_ref());
        let doc = NotebookDocument::parse_with_path(&path, content)?;
        self.notebooks.insert(path, Arc::new(doc));
        Ok(self)
    }

    /// Number of notebooks held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.notebooks.len()
    }

    /// Whether no notebooks are held
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
    }
}

#[async_trait::async_trait]
impl NotebookSource for MemorySource {
    async fn load(&self, path: &Path) -> Result<Arc<NotebookDocument>, ParseError> {
        self.notebooks.get(&normalize(path)).cloned().ok_or_else(|| {
            ParseError::io_error(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "notebook not in memory"),
            )
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        self.notebooks.contains_key(&normalize(path))
    }
}

/// Lexically resolve `.` and `..` components
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
