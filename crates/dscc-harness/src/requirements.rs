//! Python package requirements of the notebooks under test
//!
//! Collected from `%pip install` magics plus packages implied by code:
//! `pandas_udf` needs `pyarrow`, `DeltaTable` needs `delta-spark`.

use dscc_notebook::NotebookDocument;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static PIP_INSTALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*%pip\s+install\s+(.+?)\s*(?:#.*)?$").expect("static regex")
});

static DELTA_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"from\s+delta\.tables\s+import\s+.*DeltaTable").expect("static regex")
});

/// Sorted, deduplicated package list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Requirements {
    packages: BTreeSet<String>,
}

impl Requirements {
    /// Collect from every code cell of `docs`
    #[must_use]
    pub fn collect<'a>(docs: impl IntoIterator<Item = &'a NotebookDocument>) -> Self {
        let mut packages = BTreeSet::new();
        for doc in docs {
            for cell in doc.code_cells() {
                scan(cell.source(), &mut packages);
            }
        }
        Self { packages }
    }

    /// Packages in sorted order
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    /// Whether nothing is required
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// `requirements.txt` content
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.packages.iter().cloned().collect::<Vec<_>>().join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Content hash used to skip unchanged installs
    #[must_use]
    pub fn hash(&self) -> String {
        hex::encode(blake3::hash(self.render().as_bytes()).as_bytes())
    }
}

fn scan(source: &str, packages: &mut BTreeSet<String>) {
    for line in source.lines() {
        if let Some(caps) = PIP_INSTALL.captures(line) {
            packages.extend(
                caps[1]
                    .split_whitespace()
                    .filter(|p| !p.starts_with('-'))
                    .map(str::to_string),
            );
        }
    }
    if source.contains("pandas_udf") {
        packages.insert("pyarrow".to_string());
    }
    if DELTA_IMPORT.is_match(source) {
        packages.insert("delta-spark".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_pip_and_implied_packages() {
        let doc = NotebookDocument::parse(
            "# Databricks notebook source\n\
             # MAGIC %pip install requests -q pyyaml==6.0  # for config\n\
             \n\
             # COMMAND ----------\n\
             \n\
             from pyspark.sql.functions import pandas_udf\n\
             from delta.tables import DeltaTable\n",
        )
        .unwrap();
        let reqs = Requirements::collect([&doc]);
        assert_eq!(
            reqs.packages().collect::<Vec<_>>(),
            vec!["delta-spark", "pyarrow", "pyyaml==6.0", "requests"]
        );
        assert_eq!(reqs.render(), "delta-spark\npyarrow\npyyaml==6.0\nrequests\n");
    }

    #[test]
    fn empty_requirements() {
        let doc = NotebookDocument::parse("x = 1\n").unwrap();
        let reqs = Requirements::collect([&doc]);
        assert!(reqs.is_empty());
        assert_eq!(reqs.render(), "");
        assert_eq!(reqs.hash(), Requirements::default().hash());
    }
}
