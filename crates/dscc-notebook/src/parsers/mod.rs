//! Notebook parsers for the supported encodings
//!
//! - Single-file source with `# COMMAND ----------` delimiters
//! - nbformat v4 interchange JSON (`.ipynb`)
//!
//! Both produce the same `NotebookDocument` shape.

use crate::document::NotebookDocument;
use crate::error::ParseError;
use std::path::Path;

pub(crate) mod ipynb;
mod source;

pub use ipynb::IpynbParser;
pub use source::SourceParser;

/// Header line of single-file notebooks
pub const NOTEBOOK_HEADER: &str = "# Databricks notebook source";

/// Cell delimiter line of single-file notebooks
pub const CELL_DELIMITER: &str = "# COMMAND ----------";

/// Prefix of magic-command lines in single-file notebooks
pub const MAGIC_PREFIX: &str = "# MAGIC";

/// Source encoding of a notebook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Single file with inline delimiters
    Source,
    /// nbformat JSON
    Interchange,
}

impl Encoding {
    /// Detect encoding from the path extension, falling back to content sniffing
    #[must_use]
    pub fn detect(path: Option<&Path>, content: &str) -> Self {
        let by_ext = path
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .and_then(|ext| {
                if IpynbParser.extensions().contains(&ext) {
                    Some(Self::Interchange)
                } else if SourceParser.extensions().contains(&ext) {
                    Some(Self::Source)
                } else {
                    None
                }
            });

        by_ext.unwrap_or_else(|| {
            if IpynbParser.sniff(content) {
                Self::Interchange
            } else {
                Self::Source
            }
        })
    }
}

/// Parser trait for turning encoded text into a document
pub trait NotebookParser: Send + Sync {
    /// Parse content into a document
    fn parse(&self, content: &str) -> Result<NotebookDocument, ParseError>;

    /// Supported file extensions (without dot)
    fn extensions(&self) -> &[&str];

    /// Check whether the content looks like this encoding
    fn sniff(&self, content: &str) -> bool;

    /// Check if this parser can handle the given path
    fn can_parse(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().contains(&ext))
    }
}

/// Parse with encoding detection
pub fn parse_notebook(path: Option<&Path>, content: &str) -> Result<NotebookDocument, ParseError> {
    let encoding = Encoding::detect(path, content);
    tracing::trace!(?encoding, path = ?path, "parsing notebook");
    parse_encoded(encoding, content)
}

/// Parse with a known encoding
pub fn parse_encoded(encoding: Encoding, content: &str) -> Result<NotebookDocument, ParseError> {
    match encoding {
        Encoding::Source => SourceParser.parse(content),
        Encoding::Interchange => IpynbParser.parse(content),
    }
}

/// Encode one logical line as a magic line
#[must_use]
pub fn magic_line(line: &str) -> String {
    if line.is_empty() {
        MAGIC_PREFIX.to_string()
    } else {
        format!("{MAGIC_PREFIX} {line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_by_extension() {
        assert_eq!(
            Encoding::detect(Some(Path::new("a/nb.ipynb")), "print(1)"),
            Encoding::Interchange
        );
        assert_eq!(
            Encoding::detect(Some(Path::new("a/nb.py")), "{}"),
            Encoding::Source
        );
    }

    #[test]
    fn detect_by_content() {
        assert_eq!(Encoding::detect(None, "  {\"cells\": []}"), Encoding::Interchange);
        assert_eq!(Encoding::detect(None, "x = 1\n"), Encoding::Source);
        assert_eq!(
            Encoding::detect(Some(Path::new("README")), "{\"cells\": []}"),
            Encoding::Interchange
        );
    }

    #[test]
    fn magic_line_prefix() {
        assert_eq!(magic_line("%md"), "# MAGIC %md");
        assert_eq!(magic_line(""), "# MAGIC");
    }

    #[test]
    fn can_parse_by_extension() {
        assert!(SourceParser.can_parse(Path::new("x.py")));
        assert!(!SourceParser.can_parse(Path::new("x.ipynb")));
        assert!(IpynbParser.can_parse(Path::new("x.ipynb")));
    }
}
