//! Notebook → standalone module
//!
//! Drops markdown, setup and other-language cells, inlines `%run` includes
//! once each in dependency order, then redirects the session object to the
//! harness fixture. The result must parse; an error is reported against the
//! notebook line it came from. The generated header is recognised and
//! replaced on re-patch so patching is idempotent.

use crate::error::{PatchError, PatchResult};
use crate::graph::{cell_role, CellRole, IncludeGraph, NotebookId};
use crate::rewrite::{rewrite_display, rewrite_session, BIND_FUNCTION, FIXTURE_NAME};
use crate::source::NotebookSource;
use dscc_analysis::syntax::{first_error, parse_python};
use dscc_notebook::{normalized_file_name, NotebookDocument};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// First line of every patched module
pub const HEADER_START: &str = "# dscc patched module:";

/// Last line of the generated header
pub const HEADER_END: &str = "# dscc end of harness header";

/// Separator between inlined cells
const CELL_SEPARATOR: &str = "\n\n\n";

/// Patcher configuration (`[patch]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
    /// Identifiers treated as the platform session object
    pub session_names: Vec<String>,
    /// Rewrite `display(x)` into `(x).show()`
    pub rewrite_display: bool,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            session_names: vec!["spark".to_string()],
            rewrite_display: true,
        }
    }
}

impl PatcherConfig {
    /// Add a session identifier
    #[must_use]
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_names.push(name.into());
        self
    }

    /// Toggle the display rewrite
    #[must_use]
    pub fn with_display_rewrite(mut self, enabled: bool) -> Self {
        self.rewrite_display = enabled;
        self
    }
}

/// A notebook rewritten into one executable module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchedModule {
    /// Python module name
    pub name: String,
    /// Module text
    pub source: String,
    /// Inlined notebooks in inline order
    pub includes: Vec<PathBuf>,
    /// blake3 of `source`, hex encoded
    pub hash: String,
}

impl PatchedModule {
    /// File name the module is written under
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.py", self.name)
    }

    /// Write the module into `dir`; nothing is left behind on failure
    pub async fn write_to(&self, dir: &Path) -> PatchResult<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PatchError::io_error(dir, e))?;
        let target = dir.join(self.file_name());
        let staging = dir.join(format!(".{}.tmp", self.file_name()));
        if let Err(e) = tokio::fs::write(&staging, &self.source).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(PatchError::io_error(&staging, e));
        }
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| PatchError::io_error(&target, e))?;
        tracing::debug!(path = %target.display(), "patched module written");
        Ok(target)
    }
}

/// Python module name for a notebook path
#[must_use]
pub fn module_name(path: &Path) -> String {
    let file = normalized_file_name(path);
    let stem = Path::new(&file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Rewrites notebooks into standalone modules
#[derive(Clone)]
pub struct NotebookPatcher {
    source: Arc<dyn NotebookSource>,
    config: PatcherConfig,
}

impl std::fmt::Debug for NotebookPatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookPatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NotebookPatcher {
    /// Create patcher reading notebooks from `source`
    #[must_use]
    pub fn new(source: Arc<dyn NotebookSource>) -> Self {
        Self {
            source,
            config: PatcherConfig::default(),
        }
    }

    /// Use a custom configuration
    #[must_use]
    pub fn with_config(mut self, config: PatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PatcherConfig {
        &self.config
    }

    /// Load and patch the notebook at `path`
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn patch(&self, path: &Path) -> PatchResult<PatchedModule> {
        let doc = self
            .source
            .load(path)
            .await
            .map_err(|e| PatchError::parse_error(path, e))?;
        self.patch_document(path, doc).await
    }

    /// Patch an already parsed notebook located at `path`
    pub async fn patch_document(
        &self,
        path: &Path,
        doc: Arc<NotebookDocument>,
    ) -> PatchResult<PatchedModule> {
        let graph = IncludeGraph::build(self.source.as_ref(), path, doc).await?;
        let (pieces, includes) = inline(&graph);

        let mut body = pieces
            .iter()
            .map(|p| p.code.as_str())
            .collect::<Vec<_>>()
            .join(CELL_SEPARATOR);
        body = rewrite_session(&body, &self.config.session_names)?;
        if self.config.rewrite_display {
            body = rewrite_display(&body)?;
        }
        check_syntax(&graph, &pieces, &body)?;

        let name = module_name(path);
        let mut source = header(&name);
        if !body.is_empty() {
            source.push('\n');
            source.push_str(&body);
            source.push('\n');
        }
        let hash = hex::encode(blake3::hash(source.as_bytes()).as_bytes());

        tracing::info!(module = %name, includes = includes.len(), %hash, "notebook patched");
        Ok(PatchedModule {
            name,
            source,
            includes,
            hash,
        })
    }

    /// Patch independent notebooks concurrently, results sorted by path
    pub async fn patch_all(
        &self,
        paths: Vec<PathBuf>,
        workers: usize,
    ) -> Vec<(PathBuf, PatchResult<PatchedModule>)> {
        let mut results: Vec<_> = stream::iter(paths)
            .map(|path| async move {
                let result = self.patch(&path).await;
                if let Err(err) = &result {
                    tracing::warn!(path = %path.display(), error = %err, "patch failed");
                }
                (path, result)
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

fn header(name: &str) -> String {
    format!(
        "{HEADER_START} {name}\n\
         {FIXTURE_NAME} = globals().get(\"{FIXTURE_NAME}\")\n\
         \n\
         \n\
         def {BIND_FUNCTION}(session):\n\
         \x20   global {FIXTURE_NAME}\n\
         \x20   {FIXTURE_NAME} = session\n\
         {HEADER_END}\n"
    )
}

/// Remove a previously generated header
fn strip_header(code: &str) -> &str {
    let trimmed = code.trim_start_matches(['\n', '\r']);
    if !trimmed.starts_with(HEADER_START) {
        return code;
    }
    match trimmed.find(HEADER_END) {
        Some(pos) => &trimmed[pos + HEADER_END.len()..],
        None => code,
    }
}

/// Drop leading blank lines and trailing whitespace
fn trim_blank_lines(code: &str) -> &str {
    let code = code.trim_end();
    let mut start = 0;
    for line in code.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &code[start..]
}

/// Inlined code of one cell
struct Piece {
    notebook: NotebookId,
    /// Line of `code`'s first line within its notebook
    first_line: usize,
    code: String,
}

impl Piece {
    fn line_count(&self) -> usize {
        self.code.lines().count().max(1)
    }
}

/// Reject a module body that does not parse, locating the error in the
/// notebook it came from. Rewrites keep line structure, so body rows map
/// straight back onto pieces.
fn check_syntax(graph: &IncludeGraph, pieces: &[Piece], body: &str) -> PatchResult<()> {
    let tree = parse_python(body, 0)?;
    let Some(error) = first_error(tree.root_node()) else {
        return Ok(());
    };
    let point = error.start_position();
    let separator_lines = CELL_SEPARATOR.matches('\n').count() - 1;

    let mut start = 0;
    for piece in pieces {
        let lines = piece.line_count();
        if point.row < start + lines {
            return Err(PatchError::InvalidSyntax {
                notebook: graph.path(piece.notebook).to_path_buf(),
                line: piece.first_line + point.row.saturating_sub(start),
                column: point.column + 1,
            });
        }
        start += lines + separator_lines;
    }
    let last = pieces.last();
    Err(PatchError::InvalidSyntax {
        notebook: graph
            .path(last.map_or(IncludeGraph::ROOT, |p| p.notebook))
            .to_path_buf(),
        line: last.map_or(1, |p| p.first_line + p.line_count() - 1),
        column: point.column + 1,
    })
}

/// Expand includes depth-first with an explicit stack, each notebook once
fn inline(graph: &IncludeGraph) -> (Vec<Piece>, Vec<PathBuf>) {
    struct Frame {
        notebook: NotebookId,
        cell: usize,
    }

    let mut pieces = Vec::new();
    let mut includes = Vec::new();
    let mut emitted: HashSet<NotebookId> = HashSet::from([IncludeGraph::ROOT]);
    let mut stack = vec![Frame {
        notebook: IncludeGraph::ROOT,
        cell: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let notebook = frame.notebook;
        let idx = frame.cell;
        let Some(cell) = graph.document(notebook).cells().get(idx) else {
            stack.pop();
            continue;
        };
        frame.cell += 1;

        match cell_role(cell) {
            CellRole::Code(code) => {
                let stripped = strip_header(&code);
                let kept = trim_blank_lines(stripped);
                if !kept.is_empty() {
                    let skipped = code.len() - stripped.len() + stripped.trim_end().len() - kept.len();
                    pieces.push(Piece {
                        notebook,
                        first_line: cell.start_line() + code[..skipped].matches('\n').count(),
                        code: kept.to_string(),
                    });
                }
            }
            CellRole::Include(_) => {
                if let Some(target) = graph.target(notebook, idx) {
                    if emitted.insert(target) {
                        includes.push(graph.path(target).to_path_buf());
                        stack.push(Frame {
                            notebook: target,
                            cell: 0,
                        });
                    }
                }
            }
            CellRole::Dropped => {}
        }
    }
    (pieces, includes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn module_names() {
        assert_eq!(module_name(Path::new("dir/My Detection.py")), "my_detection");
        assert_eq!(module_name(Path::new("1-x.ipynb")), "_1_x");
    }

    #[test]
    fn header_round_trip() {
        let h = header("m");
        assert!(h.contains("def __dscc_bind_session__(session):\n    global __dscc_session__\n"));
        assert_eq!(strip_header(&format!("{h}\nx = 1\n")), "\n\nx = 1\n");
        assert_eq!(strip_header("x = 1\n"), "x = 1\n");
    }

    #[test]
    fn trims_surrounding_blank_lines() {
        assert_eq!(trim_blank_lines("\n  \n    x = 1\n\n"), "    x = 1");
    }
}
