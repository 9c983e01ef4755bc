//! In-memory tabular values
//!
//! Rows are column→value maps; `columns` fixes a stable order for display
//! and schema checks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Row type: column name → value
pub type Row = Map<String, Value>;

/// One column with an optional declared type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Type name (`string`, `long`, ...); `None` when unknown
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl Column {
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

/// A table of rows with a fixed column order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Columns in stable order
    pub columns: Vec<Column>,
    /// Rows
    pub rows: Vec<Row>,
}

impl Table {
    /// Zero-row table with the given columns
    #[must_use]
    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from rows, columns in first-seen key order
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<Column> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| &c.name == key) {
                    columns.push(Column::untyped(key.clone()));
                }
            }
        }
        Self { columns, rows }
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Type of a column: the declared one, else inferred from its values.
    ///
    /// `None` for unknown columns and for untyped columns holding only nulls
    /// or nested values.
    #[must_use]
    pub fn observed_type(&self, name: &str) -> Option<String> {
        let column = self.column(name)?;
        match &column.data_type {
            Some(declared) => Some(declared.clone()),
            None => infer_type(self.rows.iter().filter_map(|r| r.get(name))).map(str::to_string),
        }
    }

    /// Rows matching `predicate`, same columns
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Row) -> bool) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Project onto `names`; unknown names become untyped null columns
    #[must_use]
    pub fn select(&self, names: &[&str]) -> Self {
        let columns = names
            .iter()
            .map(|n| self.column(n).cloned().unwrap_or_else(|| Column::untyped(*n)))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .map(|n| ((*n).to_string(), row.get(*n).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }
}

/// Type implied by JSON values: `bigint`, `double`, `boolean` or `string`.
///
/// Nulls are skipped; integers mixed with floats widen to `double`, any other
/// mix is `string`. `None` when nothing but nulls or nested values remain.
#[must_use]
pub fn infer_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<&'static str> {
    let mut inferred: Option<&'static str> = None;
    for value in values {
        let kind = match value {
            Value::Null => continue,
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "bigint",
            Value::Number(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => return None,
        };
        inferred = match (inferred, kind) {
            (None, k) => Some(k),
            (Some(a), b) if a == b => Some(a),
            (Some("bigint" | "double"), "bigint" | "double") => Some("double"),
            _ => Some("string"),
        };
    }
    inferred
}
