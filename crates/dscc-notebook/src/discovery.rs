//! Notebook discovery under an app root

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognised as notebooks
pub const NOTEBOOK_EXTENSIONS: &[&str] = &["py", "ipynb"];

/// Recursively list notebook files under `root`, sorted.
///
/// Hidden directories are skipped.
#[must_use]
pub fn discover_notebooks(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| NOTEBOOK_EXTENSIONS.contains(&x))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    found
}

/// File name with spaces replaced by `_` and lowercased
#[must_use]
pub fn normalized_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().replace(' ', "_").to_lowercase())
        .unwrap_or_default()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}
