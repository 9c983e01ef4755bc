//! Include graph of `%run` directives
//!
//! Built breadth-first with an explicit worklist and visited set; cycles are
//! rejected before anything is inlined.

use crate::error::{PatchError, PatchResult};
use crate::source::{normalize, NotebookSource};
use dscc_notebook::{Cell, NotebookDocument};
use petgraph::algo::kosaraju_scc;
use petgraph::graphmap::DiGraphMap;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Candidate suffixes tried when resolving an include
const INCLUDE_SUFFIXES: &[&str] = &["", ".py", ".ipynb"];

/// Index of a notebook in the graph
pub type NotebookId = usize;

/// What a cell contributes to the patched module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRole<'a> {
    /// Code kept as-is (magic lines already blanked)
    Code(String),
    /// `%run` directive with its target
    Include(&'a str),
    /// Markdown, setup-only or other-language cell
    Dropped,
}

/// Classify one cell for patching
#[must_use]
pub fn cell_role(cell: &Cell) -> CellRole<'_> {
    if cell.is_markdown() {
        return CellRole::Dropped;
    }
    if let Some(target) = cell.run_target() {
        let target = target.split_whitespace().next().unwrap_or(target);
        return CellRole::Include(target.trim_matches(|c| c == '"' || c == '\''));
    }
    if cell.is_python() {
        CellRole::Code(dscc_analysis::syntax::blank_magics(cell.source()))
    } else {
        CellRole::Dropped
    }
}

/// Directed graph of notebooks; an edge means "includes"
#[derive(Debug, Clone)]
pub struct IncludeGraph {
    paths: Vec<PathBuf>,
    documents: Vec<Arc<NotebookDocument>>,
    graph: DiGraphMap<NotebookId, ()>,
    targets: HashMap<(NotebookId, usize), NotebookId>,
}

impl IncludeGraph {
    /// Root notebook id
    pub const ROOT: NotebookId = 0;

    /// Resolve every include reachable from `root`
    pub async fn build(
        source: &dyn NotebookSource,
        root: &Path,
        root_doc: Arc<NotebookDocument>,
    ) -> PatchResult<Self> {
        let mut this = Self {
            paths: vec![normalize(root)],
            documents: vec![root_doc],
            graph: DiGraphMap::new(),
            targets: HashMap::new(),
        };
        this.graph.add_node(Self::ROOT);

        let mut visited: HashMap<PathBuf, NotebookId> = HashMap::new();
        visited.insert(this.paths[Self::ROOT].clone(), Self::ROOT);
        let mut worklist = VecDeque::from([Self::ROOT]);

        while let Some(id) = worklist.pop_front() {
            let doc = Arc::clone(&this.documents[id]);
            let from = this.paths[id].clone();

            for (idx, cell) in doc.cells().iter().enumerate() {
                let CellRole::Include(target) = cell_role(cell) else {
                    continue;
                };
                let resolved = resolve_include(source, &from, target).await.ok_or_else(|| {
                    PatchError::UnresolvedInclude {
                        notebook: from.clone(),
                        target: target.to_string(),
                    }
                })?;

                let included = match visited.get(&resolved) {
                    Some(&existing) => existing,
                    None => {
                        let included_doc = source
                            .load(&resolved)
                            .await
                            .map_err(|e| PatchError::parse_error(&resolved, e))?;
                        let next = this.paths.len();
                        tracing::debug!(from = %from.display(), to = %resolved.display(), "include resolved");
                        this.paths.push(resolved.clone());
                        this.documents.push(included_doc);
                        visited.insert(resolved, next);
                        worklist.push_back(next);
                        next
                    }
                };
                this.graph.add_edge(id, included, ());
                this.targets.insert((id, idx), included);
            }
        }

        this.check_acyclic()?;
        Ok(this)
    }

    fn check_acyclic(&self) -> PatchResult<()> {
        for component in kosaraju_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.contains_edge(n, n));
            if cyclic {
                let cycle = self
                    .cycle_within(&component)
                    .into_iter()
                    .map(|n| self.paths[n].clone())
                    .collect();
                return Err(PatchError::IncludeCycle { cycle });
            }
        }
        Ok(())
    }

    /// Shortest include cycle through the earliest discovered member of a
    /// strongly connected component, first node repeated at the end
    fn cycle_within(&self, component: &[NotebookId]) -> Vec<NotebookId> {
        let members: HashSet<NotebookId> = component.iter().copied().collect();
        let Some(&start) = component.iter().min() else {
            return Vec::new();
        };
        let mut parent: HashMap<NotebookId, NotebookId> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            let mut next: Vec<NotebookId> = self
                .graph
                .neighbors(node)
                .filter(|n| members.contains(n))
                .collect();
            next.sort_unstable();
            for n in next {
                if n == start {
                    let mut cycle = vec![node];
                    let mut at = node;
                    while let Some(&prev) = parent.get(&at) {
                        cycle.push(prev);
                        at = prev;
                    }
                    cycle.reverse();
                    cycle.push(start);
                    return cycle;
                }
                if let Entry::Vacant(slot) = parent.entry(n) {
                    slot.insert(node);
                    queue.push_back(n);
                }
            }
        }
        vec![start, start]
    }

    /// Number of notebooks, root included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always false; the root is present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Path of a notebook
    #[inline]
    #[must_use]
    pub fn path(&self, id: NotebookId) -> &Path {
        &self.paths[id]
    }

    /// Parsed notebook
    #[inline]
    #[must_use]
    pub fn document(&self, id: NotebookId) -> &NotebookDocument {
        &self.documents[id]
    }

    /// Notebook included by cell `cell` of notebook `id`
    #[inline]
    #[must_use]
    pub fn target(&self, id: NotebookId, cell: usize) -> Option<NotebookId> {
        self.targets.get(&(id, cell)).copied()
    }

    /// Number of include edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Resolve `target` relative to the including notebook's directory
async fn resolve_include(
    source: &dyn NotebookSource,
    from: &Path,
    target: &str,
) -> Option<PathBuf> {
    let base = from.parent().unwrap_or_else(|| Path::new(""));
    for suffix in INCLUDE_SUFFIXES {
        let candidate = normalize(&base.join(format!("{target}{suffix}")));
        if source.exists(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    async fn graph_for(source: &MemorySource, root: &str) -> PatchResult<IncludeGraph> {
        let doc = source.load(Path::new(root)).await.map_err(|e| PatchError::parse_error(root, e))?;
        IncludeGraph::build(source, Path::new(root), doc).await
    }

    #[tokio::test]
    async fn resolves_with_suffixes() {
        let source = MemorySource::new()
            .with_notebook("app/main.py", "%run ./lib/common\n")
            .unwrap()
            .with_notebook("app/lib/common.py", "%run ../shared.ipynb\n")
            .unwrap()
            .with_notebook("app/shared.ipynb", r#"{"cells": [{"cell_type": "code", "source": "y = 2"}]}"#)
            .unwrap();

        let graph = graph_for(&source, "app/main.py").await.unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.path(1), Path::new("app/lib/common.py"));
        assert_eq!(graph.path(2), Path::new("app/shared.ipynb"));
        assert_eq!(graph.target(0, 0), Some(1));
        assert_eq!(graph.edge_count(), 2);
    }

    #[tokio::test]
    async fn self_include_is_cycle() {
        let source = MemorySource::new().with_notebook("a.py", "%run ./a\n").unwrap();
        let err = graph_for(&source, "a.py").await.unwrap_err();
        assert!(matches!(err, PatchError::IncludeCycle { ref cycle } if cycle.len() == 2));
    }

    #[tokio::test]
    async fn cycle_report_follows_real_edges() {
        let source = MemorySource::new()
            .with_notebook("a.py", "%run ./b\n# COMMAND ----------\n%run ./c\n")
            .unwrap()
            .with_notebook("b.py", "%run ./a\n")
            .unwrap()
            .with_notebook("c.py", "%run ./a\n")
            .unwrap();
        let err = graph_for(&source, "a.py").await.unwrap_err();
        let PatchError::IncludeCycle { cycle } = &err else {
            panic!("expected cycle, got {err}");
        };
        assert_eq!(
            cycle,
            &vec![PathBuf::from("a.py"), PathBuf::from("b.py"), PathBuf::from("a.py")]
        );
    }

    #[tokio::test]
    async fn three_notebook_ring_is_walked_in_order() {
        let source = MemorySource::new()
            .with_notebook("a.py", "%run ./c\n")
            .unwrap()
            .with_notebook("c.py", "%run ./b\n")
            .unwrap()
            .with_notebook("b.py", "%run ./a\n")
            .unwrap();
        let err = graph_for(&source, "a.py").await.unwrap_err();
        assert_eq!(err.to_string(), "include cycle: a.py -> c.py -> b.py -> a.py");
    }

    #[test]
    fn roles() {
        let doc = NotebookDocument::parse(
            "# Databricks notebook source\n# MAGIC %md\n# MAGIC # Title\n\n# COMMAND ----------\n\n# MAGIC %pip install x\n\n# COMMAND ----------\n\n# MAGIC %run \"./lib\" $env=1\n\n# COMMAND ----------\n\nx = 1\n",
        )
        .unwrap();
        let roles: Vec<_> = doc.cells().iter().map(cell_role).collect();
        assert_eq!(roles[0], CellRole::Dropped);
        assert_eq!(roles[1], CellRole::Dropped);
        assert_eq!(roles[2], CellRole::Include("./lib"));
        assert!(matches!(&roles[3], CellRole::Code(code) if code.contains("x = 1")));
    }
}
