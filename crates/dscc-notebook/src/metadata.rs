//! Embedded YAML metadata
//!
//! Markdown cells may carry fenced ` ```yaml ` blocks. Blocks with a `dscc:`,
//! `dscc-tests:` or legacy top-level `tests:` key are merged into a single
//! `MetadataBlock`; the first such block owns the write-back region.

use crate::document::Cell;
use crate::error::ParseError;
use indexmap::IndexMap;
use pulldown_cmark::{CodeBlockKind, Event, Parser as MdParser, Tag, TagEnd};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value as YamlValue};

/// Key of the opaque descriptive section
pub const DSCC_KEY: &str = "dscc";

/// Key of the test suite section
pub const TESTS_SECTION_KEY: &str = "dscc-tests";

/// Key of the test list (inside `dscc-tests`, or legacy top level)
pub const TESTS_KEY: &str = "tests";

/// Key of the notebook identity inside `dscc`
pub const UUID_KEY: &str = "uuid";

/// A substitute data source bound to a table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MockedInput {
    /// Table name as referenced by the function
    pub table: String,
    /// Sample file path, relative to the app root
    pub path: String,
}

impl MockedInput {
    /// Create new mocked input
    pub fn new(table: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            path: path.into(),
        }
    }
}

/// One declared schema column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaEntry {
    /// Column name
    pub name: String,
    /// Declared type, if any
    pub data_type: Option<String>,
}

impl SchemaEntry {
    /// Untyped column
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }

    /// Typed column
    pub fn typed(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaEntryRepr {
    Name(String),
    Named(NamedColumn),
    Pair(IndexMap<String, String>),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamedColumn {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    data_type: Option<String>,
}

impl<'de> Deserialize<'de> for SchemaEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SchemaEntryRepr::deserialize(deserializer)? {
            SchemaEntryRepr::Name(name) => Ok(Self::untyped(name)),
            SchemaEntryRepr::Named(col) => Ok(Self {
                name: col.name,
                data_type: col.data_type,
            }),
            SchemaEntryRepr::Pair(map) => {
                if map.len() != 1 {
                    return Err(D::Error::custom(
                        "schema entry must be a name, {name, type} or {name: type}",
                    ));
                }
                let (name, data_type) = map.into_iter().next().ok_or_else(|| {
                    D::Error::custom("empty schema entry")
                })?;
                Ok(Self::typed(name, data_type))
            }
        }
    }
}

impl Serialize for SchemaEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.data_type {
            None => serializer.serialize_str(&self.name),
            Some(data_type) => NamedColumn {
                name: self.name.clone(),
                data_type: Some(data_type.clone()),
            }
            .serialize(serializer),
        }
    }
}

/// Expected properties of a function result
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Expectation {
    /// Row count comparison, e.g. `"> 0"`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "count_from_text_or_int"
    )]
    pub count: Option<String>,
    /// Declared columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<SchemaEntry>>,
    /// Path to expected rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Expectation {
    /// Expect a row count comparison
    pub fn count(comparison: impl Into<String>) -> Self {
        Self {
            count: Some(comparison.into()),
            ..Self::default()
        }
    }

    /// At least one expectation kind is present
    #[inline]
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        self.count.is_some() || self.schema.is_some() || self.data.is_some()
    }
}

fn count_from_text_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CountRepr {
        Text(String),
        Int(i64),
    }

    Ok(Option::<CountRepr>::deserialize(d)?.map(|c| match c {
        CountRepr::Text(s) => s,
        CountRepr::Int(n) => n.to_string(),
    }))
}

/// A persisted test case specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Case name (defaults to `test_<function>`)
    #[serde(default)]
    pub name: String,
    /// Target detection function
    pub function: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter values in declaration order
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "input_from_map_or_list"
    )]
    pub input: IndexMap<String, serde_json::Value>,
    /// Mocked tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mocked_inputs: Vec<MockedInput>,
    /// Expected result properties
    #[serde(default)]
    pub expect: Expectation,
    /// Column hints gathered by analysis (sorted)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_columns: Vec<String>,
}

impl TestCase {
    /// Create empty case for a function, named `test_<function>`
    pub fn new(function: impl Into<String>) -> Self {
        let function = function.into();
        Self {
            name: default_case_name(&function),
            function,
            description: None,
            input: IndexMap::new(),
            mocked_inputs: Vec::new(),
            expect: Expectation::default(),
            required_columns: Vec::new(),
        }
    }

    /// Set expectation
    #[must_use]
    pub fn with_expect(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    /// Add an input value
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(name.into(), value);
        self
    }

    /// Add a mocked input
    #[must_use]
    pub fn with_mocked_input(mut self, input: MockedInput) -> Self {
        self.mocked_inputs.push(input);
        self
    }
}

/// Default case name for a function
#[must_use]
pub fn default_case_name(function: &str) -> String {
    format!("test_{function}")
}

fn input_from_map_or_list<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<IndexMap<String, serde_json::Value>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum InputRepr {
        Map(IndexMap<String, serde_json::Value>),
        List(Vec<IndexMap<String, serde_json::Value>>),
        Empty(()),
    }

    Ok(match InputRepr::deserialize(d)? {
        InputRepr::Map(map) => map,
        InputRepr::List(items) => items.into_iter().flatten().collect(),
        InputRepr::Empty(()) => IndexMap::new(),
    })
}

/// Merged metadata of one notebook
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataBlock {
    /// Opaque descriptive section (`dscc:`)
    pub dscc: Option<Mapping>,
    /// Test cases (`dscc-tests.tests`)
    pub tests: Vec<TestCase>,
    /// Other keys inside `dscc-tests`
    pub suite_extra: Mapping,
    /// Other top-level keys of the owning block
    pub extra: Mapping,
}

impl MetadataBlock {
    /// Check if no metadata was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dscc.is_none()
            && self.tests.is_empty()
            && self.suite_extra.is_empty()
            && self.extra.is_empty()
    }

    /// Identity of the (app, notebook) pair
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.dscc.as_ref()?.get(UUID_KEY)?.as_str()
    }

    /// Return the uuid, assigning a fresh v4 uuid when absent
    pub fn ensure_uuid(&mut self) -> String {
        if let Some(existing) = self.uuid() {
            return existing.to_string();
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.dscc
            .get_or_insert_with(Mapping::new)
            .insert(YamlValue::from(UUID_KEY), YamlValue::from(id.clone()));
        id
    }

    /// Find case by name
    #[must_use]
    pub fn case(&self, name: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Render as the YAML document stored inside the fence
    pub fn render_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut root = Mapping::new();
        if let Some(dscc) = &self.dscc {
            root.insert(YamlValue::from(DSCC_KEY), YamlValue::Mapping(dscc.clone()));
        }

        let mut suite = Mapping::new();
        suite.insert(YamlValue::from(TESTS_KEY), serde_yaml::to_value(&self.tests)?);
        for (k, v) in &self.suite_extra {
            suite.insert(k.clone(), v.clone());
        }
        root.insert(YamlValue::from(TESTS_SECTION_KEY), YamlValue::Mapping(suite));

        for (k, v) in &self.extra {
            root.insert(k.clone(), v.clone());
        }
        serde_yaml::to_string(&root)
    }
}

/// Location of the owning YAML fence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataRegion {
    /// Cell index
    pub cell: usize,
    /// Line of the opening fence within the cell (0-based)
    pub fence_open: usize,
    /// Line of the closing fence within the cell (0-based)
    pub fence_close: usize,
}

/// A fenced YAML block inside one markdown cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct YamlFence {
    pub(crate) fence_open: usize,
    pub(crate) fence_close: usize,
    pub(crate) body: String,
}

/// Find ` ```yaml ` fences in markdown text
pub(crate) fn yaml_fences(cell: usize, text: &str) -> Result<Vec<YamlFence>, ParseError> {
    let mut fences = Vec::new();
    let mut current: Option<(usize, usize, String)> = None;

    for (event, range) in MdParser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let lang = info.split_whitespace().next().unwrap_or_default();
                if lang == "yaml" || lang == "yml" {
                    let open = line_of(text, range.start);
                    let block = &text[range.clone()];
                    let trimmed = block.trim_end_matches(['\n', '\r']);
                    let last = trimmed.rsplit('\n').next().unwrap_or_default();
                    if trimmed.lines().count() < 2 || !is_closing_fence(last) {
                        return Err(ParseError::UnterminatedFence {
                            cell,
                            line: open + 1,
                        });
                    }
                    let close = open + trimmed.matches('\n').count();
                    current = Some((open, close, String::new()));
                }
            }
            Event::Text(t) => {
                if let Some((_, _, body)) = current.as_mut() {
                    body.push_str(&t);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((fence_open, fence_close, body)) = current.take() {
                    fences.push(YamlFence {
                        fence_open,
                        fence_close,
                        body,
                    });
                }
            }
            _ => {}
        }
    }
    Ok(fences)
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count()
}

fn is_closing_fence(line: &str) -> bool {
    let t = line.trim();
    (t.len() >= 3 && t.chars().all(|c| c == '`')) || (t.len() >= 3 && t.chars().all(|c| c == '~'))
}

/// Extract and merge metadata from all markdown cells
pub(crate) fn extract(cells: &[Cell]) -> Result<(MetadataBlock, Option<MetadataRegion>), ParseError> {
    let mut block = MetadataBlock::default();
    let mut region = None;

    for (idx, cell) in cells.iter().enumerate().filter(|(_, c)| c.is_markdown()) {
        for fence in yaml_fences(idx, cell.source())? {
            let value: YamlValue = serde_yaml::from_str(&fence.body)
                .map_err(|e| ParseError::invalid_yaml(idx, fence.fence_open + 1, &e))?;
            let YamlValue::Mapping(mut map) = value else {
                continue;
            };

            let has_dscc = map.contains_key(DSCC_KEY);
            let has_suite = map.contains_key(TESTS_SECTION_KEY);
            let has_legacy = map.get(TESTS_KEY).is_some_and(is_legacy_test_list);
            if !(has_dscc || has_suite || has_legacy) {
                continue;
            }

            let owning = region.is_none();
            if owning {
                region = Some(MetadataRegion {
                    cell: idx,
                    fence_open: fence.fence_open,
                    fence_close: fence.fence_close,
                });
            }

            if let Some(dscc) = map.remove(DSCC_KEY) {
                merge_dscc(&mut block, dscc, idx, fence.fence_open + 1)?;
            }
            if let Some(suite) = map.remove(TESTS_SECTION_KEY) {
                merge_suite(&mut block, suite, idx)?;
            }
            if has_legacy {
                if let Some(legacy) = map.remove(TESTS_KEY) {
                    tracing::debug!(cell = idx, "reading legacy top-level tests key");
                    merge_cases(&mut block, legacy, idx)?;
                }
            }
            if owning {
                block.extra = map;
            }
        }
    }

    Ok((block, region))
}

fn is_legacy_test_list(value: &YamlValue) -> bool {
    value.as_sequence().is_some_and(|items| {
        !items.is_empty()
            && items
                .iter()
                .all(|item| item.as_mapping().is_some_and(|m| m.contains_key("function")))
    })
}

fn merge_dscc(
    block: &mut MetadataBlock,
    value: YamlValue,
    cell: usize,
    line: usize,
) -> Result<(), ParseError> {
    let map = match value {
        YamlValue::Mapping(map) => map,
        YamlValue::Null => Mapping::new(),
        _ => {
            return Err(ParseError::InvalidYaml {
                cell,
                line,
                message: "'dscc' must be a mapping".to_string(),
            })
        }
    };
    let target = block.dscc.get_or_insert_with(Mapping::new);
    for (k, v) in map {
        if !target.contains_key(&k) {
            target.insert(k, v);
        }
    }
    Ok(())
}

fn merge_suite(block: &mut MetadataBlock, value: YamlValue, cell: usize) -> Result<(), ParseError> {
    let mut suite = match value {
        YamlValue::Mapping(map) => map,
        YamlValue::Null => return Ok(()),
        _ => {
            return Err(ParseError::InvalidTestCase {
                cell,
                message: "'dscc-tests' must be a mapping".to_string(),
            })
        }
    };
    if let Some(tests) = suite.remove(TESTS_KEY) {
        merge_cases(block, tests, cell)?;
    }
    for (k, v) in suite {
        if !block.suite_extra.contains_key(&k) {
            block.suite_extra.insert(k, v);
        }
    }
    Ok(())
}

fn merge_cases(block: &mut MetadataBlock, value: YamlValue, cell: usize) -> Result<(), ParseError> {
    if value.is_null() {
        return Ok(());
    }
    let cases: Vec<TestCase> = serde_yaml::from_value(value).map_err(|e| ParseError::InvalidTestCase {
        cell,
        message: e.to_string(),
    })?;
    for mut case in cases {
        if case.name.is_empty() {
            case.name = default_case_name(&case.function);
        }
        if block.case(&case.name).is_none() {
            block.tests.push(case);
        }
    }
    Ok(())
}
