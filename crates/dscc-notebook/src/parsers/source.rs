//! Single-file source parser
//!
//! Cells are separated by lines equal to `# COMMAND ----------`. Lines of
//! magic cells carry a `# MAGIC ` prefix which is stripped from the logical
//! source.

use super::{NotebookParser, CELL_DELIMITER, MAGIC_PREFIX, NOTEBOOK_HEADER};
use crate::document::{Cell, Layout, NotebookDocument};
use crate::error::ParseError;

/// Parser for delimiter-separated source notebooks
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceParser;

impl SourceParser {
    /// Create new source parser
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl NotebookParser for SourceParser {
    fn parse(&self, content: &str) -> Result<NotebookDocument, ParseError> {
        let mut header = None;
        let mut delimiters = Vec::new();
        let mut raws = vec![String::new()];
        let mut starts = vec![1usize];

        for (idx, line) in content.split_inclusive('\n').enumerate() {
            let text = line.trim_end_matches(['\n', '\r']);
            let line_no = idx + 1;

            if idx == 0 && text.trim_end() == NOTEBOOK_HEADER {
                header = Some(line.to_string());
                starts[0] = line_no + 1;
                continue;
            }
            if text.trim_end() == CELL_DELIMITER {
                delimiters.push(line.to_string());
                raws.push(String::new());
                starts.push(line_no + 1);
                continue;
            }
            if looks_like_delimiter(text) {
                return Err(ParseError::MalformedDelimiter {
                    line: line_no,
                    text: text.to_string(),
                });
            }
            if let Some(raw) = raws.last_mut() {
                raw.push_str(line);
            }
        }

        let cells = raws
            .into_iter()
            .zip(starts)
            .map(|(raw, start)| {
                let body = strip_markup(&raw);
                Cell::classify(raw, body, false, start)
            })
            .collect();

        NotebookDocument::from_parts(
            cells,
            Layout::Source {
                header,
                delimiters,
            },
        )
    }

    fn extensions(&self) -> &[&str] {
        &["py"]
    }

    fn sniff(&self, content: &str) -> bool {
        content.starts_with(NOTEBOOK_HEADER) || content.contains(CELL_DELIMITER)
    }
}

/// `# COMMAND` followed by nothing, whitespace or dashes
fn looks_like_delimiter(text: &str) -> bool {
    text.strip_prefix("# COMMAND")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '-', '\t']))
}

/// Remove `# MAGIC` prefixes line by line, keeping line count
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];
        let stripped = match body.strip_prefix(MAGIC_PREFIX) {
            Some("") => "",
            Some(rest) if rest.starts_with(' ') => &rest[1..],
            _ => body,
        };
        out.push_str(stripped);
        out.push_str(ending);
    }
    out
}
