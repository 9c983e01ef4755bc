//! Testing utilities for DSCC workspace
//!
//! Shared notebook fixtures and temporary app directories.

#![allow(missing_docs)]

use dscc_notebook::parsers::{CELL_DELIMITER, NOTEBOOK_HEADER};
use dscc_notebook::NotebookDocument;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One detection function `f(x: str = "a")` reading table `t`, called with `x="b"`
pub const DETECTION_NOTEBOOK: &str = "# Databricks notebook source\n\
# MAGIC %pip install requests\n\
\n\
# COMMAND ----------\n\
\n\
from pyspark.sql.functions import col\n\
\n\
# COMMAND ----------\n\
\n\
@detect\n\
def f(x: str = \"a\"):\n\
    events = spark.table(\"t\")\n\
    return events.filter(col(\"user\") == x).select(col(\"user\"), col(\"ts\"))\n\
\n\
# COMMAND ----------\n\
\n\
display(f(x=\"b\"))\n";

/// Detection function reading two tables with no parameters
pub const TWO_TABLE_NOTEBOOK: &str = "# Databricks notebook source\n\
@detect\n\
def joined():\n\
    logins = spark.table(\"db.logins\")\n\
    users = spark.read.table(\"db.users\")\n\
    return logins.join(users, col(\"user_id\"))\n";

/// Build a source-encoded notebook from cell bodies
pub fn source_notebook(cells: &[&str]) -> String {
    let mut out = format!("{NOTEBOOK_HEADER}\n");
    for (idx, cell) in cells.iter().enumerate() {
        if idx > 0 {
            out.push_str(&format!("\n{CELL_DELIMITER}\n\n"));
        }
        out.push_str(cell.trim_end_matches('\n'));
        out.push('\n');
    }
    out
}

pub fn parse_fixture(content: &str) -> NotebookDocument {
    NotebookDocument::parse(content).unwrap()
}

/// Temporary application directory holding notebooks and samples
#[derive(Debug)]
pub struct AppDir {
    dir: TempDir,
}

impl AppDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.dir.path().join(relative).exists()
    }
}

impl Default for AppDir {
    fn default() -> Self {
        Self::new()
    }
}
