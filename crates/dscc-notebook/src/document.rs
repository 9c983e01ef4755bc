//! Canonical notebook document
//!
//! A `NotebookDocument` is an immutable snapshot of one parse. Callers see an
//! ordered list of typed cells plus the merged metadata block; the encoding
//! that produced it stays private and is only used to render bytes back out.

use crate::error::{ParseError, SerializeError};
use crate::metadata::{self, MetadataBlock, MetadataRegion};
use crate::parsers::{self, ipynb, Encoding, CELL_DELIMITER};
use serde::Serialize;
use std::path::Path;

/// Magics that may precede the metadata cell
const SETUP_MAGICS: &[&str] = &["run", "pip", "conda", "load_ext"];

/// Magics that switch the whole cell away from python
const LANGUAGE_MAGICS: &[&str] = &[
    "sql", "scala", "r", "sh", "fs", "md", "md-sandbox", "html", "bash", "script",
];

/// Cell type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// Executable source
    Code,
    /// Documentation (carries the YAML metadata fences)
    Markdown,
}

/// One unit of notebook source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    kind: CellKind,
    source: String,
    magic: Option<String>,
    magic_args: Option<String>,
    start_line: usize,
    raw: String,
}

impl Cell {
    /// Build a cell from its logical body.
    ///
    /// `raw` is the exact encoded text; `body` has the same number of lines
    /// with encoding markup removed.
    pub(crate) fn classify(raw: String, body: String, markdown: bool, start_line: usize) -> Self {
        if markdown {
            return Self {
                kind: CellKind::Markdown,
                source: body,
                magic: None,
                magic_args: None,
                start_line,
                raw,
            };
        }

        let mut kind = CellKind::Code;
        let mut magic = None;
        let mut magic_args = None;
        let mut source = String::with_capacity(body.len());
        let mut seen_content = false;

        for line in body.split_inclusive('\n') {
            if seen_content {
                source.push_str(line);
                continue;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                source.push_str(line);
                continue;
            }
            seen_content = true;

            let Some(directive) = trimmed.strip_prefix('%') else {
                source.push_str(line);
                continue;
            };
            let (token, rest) = directive
                .split_once(char::is_whitespace)
                .unwrap_or((directive, ""));

            if token == "md" || token == "md-sandbox" {
                // Markdown body starts after the directive; the line itself stays
                // so line numbers line up with the raw text.
                kind = CellKind::Markdown;
                source.push_str(rest.trim_start());
                source.push_str(line_ending(line));
            } else {
                source.push_str(line);
            }
            magic = Some(token.to_string());
            magic_args = Some(rest.trim().to_string());
        }

        Self {
            kind,
            source,
            magic,
            magic_args,
            start_line,
            raw,
        }
    }

    /// Get cell kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Get logical source (markup stripped)
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get magic command name (`md`, `run`, `pip`, `sql`, ...)
    #[inline]
    #[must_use]
    pub fn magic(&self) -> Option<&str> {
        self.magic.as_deref()
    }

    /// Get the arguments following the magic command on its first line
    #[inline]
    #[must_use]
    pub fn magic_args(&self) -> Option<&str> {
        self.magic_args.as_deref()
    }

    /// First line of this cell within the encoded file (1-based).
    ///
    /// Interchange cells count from 1 within the cell.
    #[inline]
    #[must_use]
    pub fn start_line(&self) -> usize {
        self.start_line
    }

    /// Check if this is a code cell
    #[inline]
    #[must_use]
    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }

    /// Check if this is a markdown cell
    #[inline]
    #[must_use]
    pub fn is_markdown(&self) -> bool {
        self.kind == CellKind::Markdown
    }

    /// Target of a `%run` include directive
    #[must_use]
    pub fn run_target(&self) -> Option<&str> {
        match (self.magic(), self.magic_args()) {
            (Some("run"), Some(args)) if !args.is_empty() => Some(strip_quotes(args)),
            _ => None,
        }
    }

    /// Code cell consisting only of setup magics (`%run`, `%pip`, ...)
    #[must_use]
    pub fn is_setup_magic(&self) -> bool {
        if !self.is_code() {
            return false;
        }
        let mut lines = self.source.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
        lines.peek().is_some()
            && lines.all(|line| {
                line.strip_prefix('%').is_some_and(|rest| {
                    let token = rest.split_whitespace().next().unwrap_or_default();
                    SETUP_MAGICS.contains(&token)
                })
            })
    }

    /// Code cell whose body is python once its line magics are blanked.
    ///
    /// Language magics (`%sql`, `%%bash`, ...) and setup-only cells are not.
    #[must_use]
    pub fn is_python(&self) -> bool {
        if !self.is_code() || self.is_setup_magic() {
            return false;
        }
        match self.magic() {
            None | Some("python") => true,
            Some(token) => !token.starts_with('%') && !LANGUAGE_MAGICS.contains(&token),
        }
    }

    pub(crate) fn raw(&self) -> &str {
        &self.raw
    }
}

/// How the document was encoded on disk
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Layout {
    /// Single-file source with inline delimiters
    Source {
        header: Option<String>,
        delimiters: Vec<String>,
    },
    /// nbformat JSON; `text` is the exact input
    Interchange { text: String },
}

/// Immutable snapshot of one notebook parse
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookDocument {
    cells: Vec<Cell>,
    metadata: MetadataBlock,
    region: Option<MetadataRegion>,
    layout: Layout,
}

impl NotebookDocument {
    /// Assemble a document and extract its metadata
    pub(crate) fn from_parts(cells: Vec<Cell>, layout: Layout) -> Result<Self, ParseError> {
        let (metadata, region) = metadata::extract(&cells)?;
        Ok(Self {
            cells,
            metadata,
            region,
            layout,
        })
    }

    /// Parse text, detecting the encoding from its content
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        parsers::parse_notebook(None, content)
    }

    /// Parse text, detecting the encoding from the path first
    pub fn parse_with_path(path: &Path, content: &str) -> Result<Self, ParseError> {
        parsers::parse_notebook(Some(path), content)
    }

    /// Read and parse a notebook file
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ParseError::io_error(path, e))?;
        Self::parse_with_path(path, &content)
    }

    /// Write the rendered document to a file
    pub async fn write(&self, path: impl AsRef<Path>) -> Result<(), SerializeError> {
        let path = path.as_ref();
        tokio::fs::write(path, self.render())
            .await
            .map_err(|e| SerializeError::io_error(path, e))
    }

    /// Get cells in document order
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Iterate code cells
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.is_code())
    }

    /// Get merged metadata
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &MetadataBlock {
        &self.metadata
    }

    /// Get the YAML region that owns the metadata, if any
    #[inline]
    #[must_use]
    pub fn metadata_region(&self) -> Option<&MetadataRegion> {
        self.region.as_ref()
    }

    pub(crate) fn encoding(&self) -> Encoding {
        match self.layout {
            Layout::Source { .. } => Encoding::Source,
            Layout::Interchange { .. } => Encoding::Interchange,
        }
    }

    /// Render the document back to its encoded text
    #[must_use]
    pub fn render(&self) -> String {
        match &self.layout {
            Layout::Source { header, delimiters } => {
                let raws: Vec<&str> = self.cells.iter().map(Cell::raw).collect();
                join_source(header.as_deref(), &raws, delimiters)
            }
            Layout::Interchange { text, .. } => text.clone(),
        }
    }

    /// Produce a new snapshot carrying `block` as its metadata.
    ///
    /// Only the owning YAML region changes; when there is none a markdown
    /// cell is inserted after the leading setup-magic cells.
    pub fn with_metadata(&self, block: &MetadataBlock) -> Result<Self, SerializeError> {
        let yaml = block.render_yaml()?;
        let text = match &self.layout {
            Layout::Source { header, delimiters } => {
                self.source_with_yaml(header.as_deref(), delimiters, &yaml)
            }
            Layout::Interchange { text } => self.interchange_with_yaml(text, &yaml)?,
        };
        let doc = parsers::parse_encoded(self.encoding(), &text)?;
        tracing::debug!(cells = doc.cells.len(), "metadata written");
        Ok(doc)
    }

    fn insertion_index(&self) -> usize {
        self.cells.iter().take_while(|c| c.is_setup_magic()).count()
    }

    fn source_with_yaml(&self, header: Option<&str>, delimiters: &[String], yaml: &str) -> String {
        let mut raws: Vec<String> = self.cells.iter().map(|c| c.raw.clone()).collect();
        let mut delims = delimiters.to_vec();

        if let Some(region) = &self.region {
            let raw = &mut raws[region.cell];
            *raw = splice_region(raw, region, yaml, true);
        } else {
            let pos = self.insertion_index();
            let delimiter = format!("{CELL_DELIMITER}\n");
            if pos < raws.len() {
                raws.insert(pos, source_markdown_cell(yaml, pos > 0, false));
                delims.insert(pos, delimiter);
            } else {
                if let Some(last) = raws.last_mut() {
                    if !last.is_empty() && !last.ends_with('\n') {
                        last.push('\n');
                    }
                }
                delims.push(delimiter);
                raws.push(source_markdown_cell(yaml, true, true));
            }
        }

        let raws: Vec<&str> = raws.iter().map(String::as_str).collect();
        join_source(header, &raws, &delims)
    }

    fn interchange_with_yaml(&self, text: &str, yaml: &str) -> Result<String, SerializeError> {
        if let Some(region) = &self.region {
            let spliced = splice_region(self.cells[region.cell].raw(), region, yaml, false);
            return Ok(ipynb::splice_source(text, region.cell, &spliced)?);
        }

        let mut body = String::from("```yaml\n");
        body.push_str(yaml);
        if !yaml.ends_with('\n') {
            body.push('\n');
        }
        body.push_str("```");
        let cell = serde_json::json!({
            "cell_type": "markdown",
            "metadata": {},
            "source": source_lines(&body),
        });
        Ok(ipynb::insert_cell(text, self.insertion_index(), &cell)?)
    }
}

fn join_source(header: Option<&str>, raws: &[&str], delimiters: &[String]) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        out.push_str(header);
    }
    for (idx, raw) in raws.iter().enumerate() {
        if idx > 0 {
            if let Some(delim) = delimiters.get(idx - 1) {
                out.push_str(delim);
            }
        }
        out.push_str(raw);
    }
    out
}

/// Replace the lines strictly between the region fences with `yaml`
fn splice_region(raw: &str, region: &MetadataRegion, yaml: &str, source_markup: bool) -> String {
    let lines: Vec<&str> = raw.split_inclusive('\n').collect();
    let open = region.fence_open.min(lines.len().saturating_sub(1));
    let close = region.fence_close.clamp(open + 1, lines.len());
    let fence = lines.get(open).copied().unwrap_or_default();
    let newline = if fence.ends_with("\r\n") { "\r\n" } else { "\n" };
    let prefixed = source_markup && fence.starts_with(parsers::MAGIC_PREFIX);

    let mut out = String::with_capacity(raw.len() + yaml.len());
    for line in &lines[..=open] {
        out.push_str(line);
    }
    for line in yaml.lines() {
        if prefixed {
            out.push_str(&parsers::magic_line(line));
        } else {
            out.push_str(line);
        }
        out.push_str(newline);
    }
    for line in &lines[close..] {
        out.push_str(line);
    }
    out
}

fn source_markdown_cell(yaml: &str, leading_blank: bool, last: bool) -> String {
    let mut out = String::new();
    if leading_blank {
        out.push('\n');
    }
    out.push_str(&parsers::magic_line("%md"));
    out.push('\n');
    out.push_str(&parsers::magic_line("```yaml"));
    out.push('\n');
    for line in yaml.lines() {
        out.push_str(&parsers::magic_line(line));
        out.push('\n');
    }
    out.push_str(&parsers::magic_line("```"));
    out.push('\n');
    if !last {
        out.push('\n');
    }
    out
}

fn source_lines(text: &str) -> serde_json::Value {
    serde_json::Value::Array(
        text.split_inclusive('\n')
            .map(|l| serde_json::Value::String(l.to_string()))
            .collect(),
    )
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}
