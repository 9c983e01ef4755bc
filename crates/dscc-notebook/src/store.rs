//! Parsed-document store using moka
//!
//! Read-mostly cache of `NotebookDocument`s keyed by (path, modification
//! time). A changed timestamp misses and triggers a fresh parse; stale
//! entries age out by capacity.

use crate::document::NotebookDocument;
use crate::error::{ParseError, SerializeError};
use moka::future::Cache;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Statistics for store monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Number of cached documents
    pub entry_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    path: PathBuf,
    modified: SystemTime,
}

/// Cache of parsed notebooks
#[derive(Debug, Clone)]
pub struct NotebookStore {
    inner: Cache<StoreKey, Arc<NotebookDocument>>,
}

impl NotebookStore {
    /// Create new store with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Load a notebook, parsing only when the file changed
    #[tracing::instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<NotebookDocument>, ParseError> {
        let path = path.as_ref();
        let key = Self::key_for(path).await?;

        if let Some(doc) = self.inner.get(&key).await {
            tracing::trace!("store hit");
            return Ok(doc);
        }

        let doc = Arc::new(NotebookDocument::read(path).await?);
        self.inner.insert(key, Arc::clone(&doc)).await;
        tracing::debug!(cells = doc.cells().len(), "notebook parsed");
        Ok(doc)
    }

    /// Write a document and cache it under its new timestamp
    pub async fn save(
        &self,
        path: impl AsRef<Path>,
        doc: NotebookDocument,
    ) -> Result<Arc<NotebookDocument>, SerializeError> {
        let path = path.as_ref();
        doc.write(path).await?;
        let doc = Arc::new(doc);
        let key = Self::key_for(path).await?;
        self.inner.insert(key, Arc::clone(&doc)).await;
        Ok(doc)
    }

    /// Drop every cached document
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get store statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entry_count: self.inner.entry_count(),
        }
    }

    async fn key_for(path: &Path) -> Result<StoreKey, ParseError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ParseError::io_error(path, e))?;
        let modified = meta.modified().map_err(|e| ParseError::io_error(path, e))?;
        Ok(StoreKey {
            path: path.to_path_buf(),
            modified,
        })
    }
}

impl Default for NotebookStore {
    /// Create store with default capacity (1,000 documents)
    fn default() -> Self {
        Self::new(1_000)
    }
}
