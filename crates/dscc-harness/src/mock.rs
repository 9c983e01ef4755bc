//! Mock data provider
//!
//! Resolves a mocked input to a `Table`: read the sample file when present,
//! otherwise fall back to a zero-row stub when `fallback_empty` is set.
//! Resolutions are memoised so repeated lookups return the same table.

use crate::error::MockResolutionError;
use crate::table::{Column, Row, Table};
use dscc_notebook::MockedInput;
use moka::future::Cache;
use parquet::basic::{ConvertedType, LogicalType, Type as PhysicalType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::schema::types::Type as SchemaType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mock provider configuration (`[mock]` in `dscc.toml`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Directory sample paths are relative to
    pub base_dir: PathBuf,
    /// Use zero-row stubs for missing samples
    pub fallback_empty: bool,
    /// Declared schemas for stubs, by table
    pub schemas: HashMap<String, Vec<Column>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            fallback_empty: false,
            schemas: HashMap::new(),
        }
    }
}

impl MockConfig {
    /// Set base directory
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Set empty-stub fallback
    #[must_use]
    pub fn with_fallback_empty(mut self, fallback_empty: bool) -> Self {
        self.fallback_empty = fallback_empty;
        self
    }

    /// Declare a stub schema for `table`
    #[must_use]
    pub fn with_schema(mut self, table: impl Into<String>, columns: Vec<Column>) -> Self {
        self.schemas.insert(table.into(), columns);
        self
    }
}

/// Read access to mocked tables by name
pub trait TableAccess: Send + Sync {
    /// Table bound to `name`
    fn table(&self, name: &str) -> Result<Table, MockResolutionError>;
}

/// Tables resolved for one case
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    tables: HashMap<String, Arc<Table>>,
}

impl MockSession {
    /// Create session over resolved tables
    #[must_use]
    pub fn new(tables: HashMap<String, Arc<Table>>) -> Self {
        Self { tables }
    }
}

impl TableAccess for MockSession {
    fn table(&self, name: &str) -> Result<Table, MockResolutionError> {
        self.tables
            .get(name)
            .map(|t| (**t).clone())
            .ok_or_else(|| MockResolutionError::Unbound(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MockKey {
    table: String,
    path: PathBuf,
}

/// Resolves mocked inputs, memoising per key
#[derive(Debug, Clone)]
pub struct MockDataProvider {
    config: Arc<MockConfig>,
    cache: Cache<MockKey, Arc<Table>>,
}

impl MockDataProvider {
    /// Create provider
    #[must_use]
    pub fn new(config: MockConfig) -> Self {
        Self {
            config: Arc::new(config),
            cache: Cache::new(10_000),
        }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Resolve one mocked input; `hints` are column names used for stubs
    pub async fn resolve(
        &self,
        input: &MockedInput,
        hints: &[String],
    ) -> Result<Arc<Table>, MockResolutionError> {
        let key = MockKey {
            table: input.table.clone(),
            path: self.config.base_dir.join(&input.path),
        };
        let config = Arc::clone(&self.config);
        let hints = hints.to_vec();
        let load_key = key.clone();

        self.cache
            .try_get_with(key, async move {
                load(&config, &load_key.table, &load_key.path, &hints)
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Forget memoised tables (start of a new run)
    pub fn reset(&self) {
        self.cache.invalidate_all();
    }
}

async fn load(
    config: &MockConfig,
    table: &str,
    path: &Path,
    hints: &[String],
) -> Result<Table, MockResolutionError> {
    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
        let owned = path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || read_table(&owned))
            .await
            .map_err(|e| MockResolutionError::unreadable(path, e))??;
        tracing::debug!(table, path = %path.display(), rows = loaded.len(), "mock sample loaded");
        return Ok(loaded);
    }

    if !config.fallback_empty {
        return Err(MockResolutionError::Missing {
            table: table.to_string(),
            path: path.to_path_buf(),
        });
    }

    let columns = config.schemas.get(table).cloned().unwrap_or_else(|| {
        hints
            .iter()
            .map(|h| Column::typed(h.clone(), "string"))
            .collect()
    });
    tracing::warn!(table, path = %path.display(), "sample missing, using empty stub");
    Ok(Table::empty(columns))
}

/// Read a sample file by extension
pub fn read_table(path: &Path) -> Result<Table, MockResolutionError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json" | "jsonl") => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| MockResolutionError::unreadable(path, e))?;
            read_json(&text).map_err(|m| MockResolutionError::unreadable(path, m))
        }
        Some("csv") => read_csv(path),
        Some("parquet") => read_parquet(path),
        _ => Err(MockResolutionError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Parse a JSON array of objects or JSON lines
pub fn read_json(text: &str) -> Result<Table, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Table::default());
    }
    let rows: Vec<Row> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| e.to_string())?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<Row>(line).map_err(|e| format!("line {}: {e}", idx + 1))
            })
            .collect::<Result<_, _>>()?
    };
    Ok(Table::from_rows(rows))
}

fn read_csv(path: &Path) -> Result<Table, MockResolutionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| MockResolutionError::unreadable(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| MockResolutionError::unreadable(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| MockResolutionError::unreadable(path, e))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), serde_json::Value::String(v.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(Table {
        columns: headers.into_iter().map(Column::untyped).collect(),
        rows,
    })
}

fn read_parquet(path: &Path) -> Result<Table, MockResolutionError> {
    let file = std::fs::File::open(path).map_err(|e| MockResolutionError::unreadable(path, e))?;
    let reader =
        SerializedFileReader::new(file).map_err(|e| MockResolutionError::unreadable(path, e))?;

    let columns: Vec<Column> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| Column::typed(field.name(), parquet_type_name(field)))
        .collect();

    let mut rows = Vec::new();
    let iter = reader
        .get_row_iter(None)
        .map_err(|e| MockResolutionError::unreadable(path, e))?;
    for row in iter {
        let row = row.map_err(|e| MockResolutionError::unreadable(path, e))?;
        match row.to_json_value() {
            serde_json::Value::Object(map) => rows.push(map),
            other => {
                return Err(MockResolutionError::unreadable(
                    path,
                    format!("row is not a record: {other}"),
                ))
            }
        }
    }
    Ok(Table { columns, rows })
}

fn parquet_type_name(field: &SchemaType) -> &'static str {
    if !field.is_primitive() {
        return "struct";
    }
    let info = field.get_basic_info();
    match field.get_physical_type() {
        PhysicalType::BOOLEAN => "boolean",
        PhysicalType::INT32 => "int",
        PhysicalType::INT64 => "long",
        PhysicalType::INT96 => "timestamp",
        PhysicalType::FLOAT => "float",
        PhysicalType::DOUBLE => "double",
        PhysicalType::BYTE_ARRAY | PhysicalType::FIXED_LEN_BYTE_ARRAY => {
            if matches!(info.logical_type(), Some(LogicalType::String))
                || info.converted_type() == ConvertedType::UTF8
            {
                "string"
            } else {
                "binary"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn provider(dir: &Path, fallback: bool) -> MockDataProvider {
        MockDataProvider::new(
            MockConfig::default()
                .with_base_dir(dir)
                .with_fallback_empty(fallback),
        )
    }

    #[test]
    fn json_array_and_lines() {
        let array = read_json(r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        let lines = read_json("{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        assert_eq!(array, lines);
        assert_eq!(array.len(), 2);
        assert!(read_json("").unwrap().columns.is_empty());
        assert!(read_json("{\"a\": 1}\nnope\n").unwrap_err().starts_with("line 2"));
    }

    #[tokio::test]
    async fn reads_csv_sample() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/t_sample.csv"), "user,ts\nu1,1\nu2,2\n").unwrap();

        let table = provider(dir.path(), false)
            .resolve(&MockedInput::new("t", "tests/t_sample.csv"), &[])
            .await
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns[0].name, "user");
        assert_eq!(table.rows[1]["ts"], json!("2"));
    }

    #[tokio::test]
    async fn missing_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path(), false)
            .resolve(&MockedInput::new("t", "tests/t_sample.json"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MockResolutionError::Missing { ref table, .. } if table == "t"));
    }

    #[tokio::test]
    async fn stub_uses_hints_or_declared_schema() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path(), true);
        let stub = p
            .resolve(&MockedInput::new("t", "tests/t_sample.json"), &["user".to_string()])
            .await
            .unwrap();
        assert!(stub.is_empty());
        assert_eq!(stub.columns, vec![Column::typed("user", "string")]);

        let declared = MockDataProvider::new(
            MockConfig::default()
                .with_base_dir(dir.path())
                .with_fallback_empty(true)
                .with_schema("u", vec![Column::typed("id", "long")]),
        );
        let stub = declared
            .resolve(&MockedInput::new("u", "tests/u_sample.json"), &["ignored".to_string()])
            .await
            .unwrap();
        assert_eq!(stub.columns, vec![Column::typed("id", "long")]);
    }

    #[tokio::test]
    async fn memoised_within_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, "{\"a\": 1}\n").unwrap();
        let p = provider(dir.path(), false);
        let input = MockedInput::new("t", "s.json");

        let first = p.resolve(&input, &[]).await.unwrap();
        std::fs::write(&path, "{\"a\": 2}\n").unwrap();
        let second = p.resolve(&input, &[]).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        p.reset();
        let third = p.resolve(&input, &[]).await.unwrap();
        assert_eq!(third.rows[0]["a"], json!(2));
    }

    #[test]
    fn session_reports_unbound_tables() {
        let session = MockSession::new(HashMap::from([(
            "t".to_string(),
            Arc::new(Table::default()),
        )]));
        assert!(session.table("t").is_ok());
        assert_eq!(
            session.table("other").unwrap_err(),
            MockResolutionError::Unbound("other".into())
        );
    }
}
