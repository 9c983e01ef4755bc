//! nbformat v4 interchange parser
//!
//! Uses `serde_json` to read `cells[*].cell_type` and `cells[*].source`.
//! Edits are spliced into the original text through borrowed `RawValue`
//! spans, so bytes outside the edited cell keep their formatting.

use super::NotebookParser;
use crate::document::{Cell, Layout, NotebookDocument};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use serde_json::value::RawValue;
use serde_json::Value;
use std::io;
use std::ops::Range;

/// Parser for `.ipynb` notebooks
#[derive(Debug, Clone, Copy, Default)]
pub struct IpynbParser;

impl IpynbParser {
    /// Create new interchange parser
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl NotebookParser for IpynbParser {
    fn parse(&self, content: &str) -> Result<NotebookDocument, ParseError> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| ParseError::InvalidInterchange(e.to_string()))?;

        let entries = root
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::InvalidInterchange("missing 'cells' array".to_string()))?;

        let mut cells = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let cell_type = entry
                .get("cell_type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ParseError::InvalidInterchange(format!("cell {idx} has no 'cell_type'"))
                })?;
            let raw = join_source(entry.get("source"))
                .ok_or_else(|| ParseError::InvalidInterchange(format!("cell {idx} has invalid 'source'")))?;

            // raw cells are not executable; treat them like documentation
            let markdown = cell_type != "code";
            cells.push(Cell::classify(raw.clone(), raw, markdown, 1));
        }

        NotebookDocument::from_parts(
            cells,
            Layout::Interchange {
                text: content.to_string(),
            },
        )
    }

    fn extensions(&self) -> &[&str] {
        &["ipynb"]
    }

    fn sniff(&self, content: &str) -> bool {
        content.trim_start().starts_with('{')
    }
}

/// `source` is either a string or a list of strings
fn join_source(source: Option<&Value>) -> Option<String> {
    match source {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|p| p.as_str())
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.concat()),
        Some(_) => None,
    }
}

#[derive(Deserialize)]
struct RawNotebook<'a> {
    #[serde(borrow)]
    cells: &'a RawValue,
}

#[derive(Deserialize)]
struct RawCell<'a> {
    #[serde(borrow, default)]
    source: Option<&'a RawValue>,
}

/// Single-line JSON with `", "` and `": "` separators
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn invalid(err: &serde_json::Error) -> ParseError {
    ParseError::InvalidInterchange(err.to_string())
}

/// Byte range of `part` inside `text`; `part` must borrow from `text`
fn span_in(text: &str, part: &str) -> Range<usize> {
    let start = part.as_ptr() as usize - text.as_ptr() as usize;
    start..start + part.len()
}

fn cell_values(text: &str) -> Result<(&str, Vec<&RawValue>), ParseError> {
    let notebook: RawNotebook<'_> = serde_json::from_str(text).map_err(|e| invalid(&e))?;
    let array = notebook.cells.get();
    let cells: Vec<&RawValue> = serde_json::from_str(array).map_err(|e| invalid(&e))?;
    Ok((array, cells))
}

fn newline(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn leading_ws(text: &str) -> &str {
    &text[..text.len() - text.trim_start_matches([' ', '\t']).len()]
}

fn to_string_with<F: Formatter>(value: &impl Serialize, formatter: F) -> Result<String, ParseError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(|e| invalid(&e))?;
    String::from_utf8(buf).map_err(|e| ParseError::InvalidInterchange(e.to_string()))
}

/// Render cell source text the way `original` was laid out
fn render_source(original: &str, text: &str, nl: &str) -> Result<String, ParseError> {
    if original.trim_start().starts_with('"') {
        return serde_json::to_string(text).map_err(|e| invalid(&e));
    }
    let lines = text
        .split_inclusive('\n')
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(&e))?;
    if lines.is_empty() {
        return Ok("[]".to_string());
    }
    let Some((_, rest)) = original.split_once('\n') else {
        let separator = if original.contains("\",\"") { "," } else { ", " };
        return Ok(format!("[{}]", lines.join(separator)));
    };
    let item = leading_ws(rest);
    let close = original.rsplit_once('\n').map_or("", |(_, tail)| leading_ws(tail));
    Ok(format!(
        "[{nl}{item}{}{nl}{close}]",
        lines.join(&format!(",{nl}{item}"))
    ))
}

/// Replace the `source` of cell `index`, leaving every other byte untouched
pub(crate) fn splice_source(text: &str, index: usize, source: &str) -> Result<String, ParseError> {
    let (_, cells) = cell_values(text)?;
    let cell = cells
        .get(index)
        .ok_or_else(|| ParseError::InvalidInterchange(format!("no cell {index}")))?;
    let raw: RawCell<'_> = serde_json::from_str(cell.get()).map_err(|e| invalid(&e))?;
    let original = raw
        .source
        .ok_or_else(|| ParseError::InvalidInterchange(format!("cell {index} has no 'source'")))?
        .get();

    let span = span_in(text, original);
    let rendered = render_source(original, source, newline(text))?;
    Ok(format!("{}{rendered}{}", &text[..span.start], &text[span.end..]))
}

/// Insert `cell` before position `index` (or append), formatted like its
/// neighbours
pub(crate) fn insert_cell(text: &str, index: usize, cell: &Value) -> Result<String, ParseError> {
    let (array, cells) = cell_values(text)?;
    let nl = newline(text);

    let Some(anchor) = cells.get(index).or_else(|| cells.last()) else {
        let span = span_in(text, array);
        let rendered = to_string_with(cell, PrettyFormatter::with_indent(b" "))?;
        let rendered = rendered.replace('\n', &format!("{nl}  "));
        return Ok(format!(
            "{}[{nl}  {rendered}{nl} ]{}",
            &text[..span.start],
            &text[span.end..]
        ));
    };

    let anchor_text = anchor.get();
    let anchor_span = span_in(text, anchor_text);
    let before = &text[..anchor_span.start];
    let gap = &before[before.trim_end().len()..];
    let indent = gap.rsplit('\n').next().unwrap_or_default();

    let rendered = match anchor_text.split('\n').nth(1) {
        Some(line) => {
            let unit = leading_ws(line).strip_prefix(indent).unwrap_or(" ");
            let unit = if unit.is_empty() { " " } else { unit };
            to_string_with(cell, PrettyFormatter::with_indent(unit.as_bytes()))?
                .replace('\n', &format!("{nl}{indent}"))
        }
        None if anchor_text.contains("\": ") => to_string_with(cell, SpacedFormatter)?,
        None => to_string_with(cell, CompactFormatter)?,
    };
    let separator = if gap.is_empty() && anchor_text.contains("\": ") { " " } else { gap };

    Ok(if index < cells.len() {
        format!(
            "{before}{rendered},{separator}{}",
            &text[anchor_span.start..]
        )
    } else {
        format!(
            "{},{separator}{rendered}{}",
            &text[..anchor_span.end],
            &text[anchor_span.end..]
        )
    })
}
