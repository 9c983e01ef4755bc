//! Expectation comparison
//!
//! Each expectation kind is checked independently in the order count,
//! schema, data; the first failure decides the verdict.

use crate::error::MockResolutionError;
use crate::mock::read_table;
use crate::table::{Row, Table};
use dscc_notebook::{Expectation, SchemaEntry};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Outcome of evaluating expectations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// Every present expectation held
    Pass,
    /// First failing expectation
    Fail(String),
}

impl Verdict {
    /// Whether the verdict is a pass
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Comparison operator of a count expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==` (or a bare integer)
    Eq,
    /// `!=`
    Ne,
}

impl fmt::Display for CountOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        })
    }
}

/// Parsed `count` expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountCheck {
    /// Operator
    pub op: CountOp,
    /// Right-hand side
    pub value: i64,
}

impl CountCheck {
    /// Parse `<op><int>`, whitespace tolerant
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        // two-char operators first
        let (op, rest) = [
            (">=", CountOp::Ge),
            ("<=", CountOp::Le),
            ("==", CountOp::Eq),
            ("!=", CountOp::Ne),
            (">", CountOp::Gt),
            ("<", CountOp::Lt),
        ]
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((CountOp::Eq, text));

        let value = rest
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid count expectation '{text}'"))?;
        Ok(Self { op, value })
    }

    /// Whether `count` satisfies the comparison
    #[must_use]
    pub fn holds(&self, count: usize) -> bool {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        match self.op {
            CountOp::Gt => count > self.value,
            CountOp::Ge => count >= self.value,
            CountOp::Lt => count < self.value,
            CountOp::Le => count <= self.value,
            CountOp::Eq => count == self.value,
            CountOp::Ne => count != self.value,
        }
    }
}

/// Check a `count` expectation against a row count
#[must_use]
pub fn check_count(expr: &str, rows: usize) -> Verdict {
    match CountCheck::parse(expr) {
        Ok(check) if check.holds(rows) => Verdict::Pass,
        Ok(check) => Verdict::Fail(format!(
            "expected count {} {}, got {rows}",
            check.op, check.value
        )),
        Err(message) => Verdict::Fail(message),
    }
}

/// Canonical type family for schema comparison
#[must_use]
pub fn normalize_type(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();
    let family = match base {
        "int" | "integer" | "long" | "bigint" | "smallint" | "tinyint" | "short" | "byte"
        | "int32" | "int64" => "integer",
        "double" | "float" | "real" | "float32" | "float64" => "floating",
        "decimal" | "numeric" => "decimal",
        "string" | "varchar" | "char" | "text" | "str" => "string",
        "bool" | "boolean" => "boolean",
        "timestamp" | "datetime" | "timestamp_ntz" => "timestamp",
        other => other,
    };
    family.to_string()
}

/// Check declared columns against the observed result
#[must_use]
pub fn check_schema(declared: &[SchemaEntry], table: &Table) -> Verdict {
    for entry in declared {
        let Some(column) = table.column(&entry.name) else {
            return Verdict::Fail(format!("missing column '{}'", entry.name));
        };
        let observed = table.observed_type(&column.name);
        let (Some(expected), Some(observed)) = (&entry.data_type, observed) else {
            continue;
        };
        if normalize_type(expected) != normalize_type(&observed) {
            return Verdict::Fail(format!(
                "column '{}' has type {observed}, expected {expected}",
                entry.name
            ));
        }
    }
    Verdict::Pass
}

/// Compare rows as multisets (order-insensitive, exact field equality)
#[must_use]
pub fn check_data(expected: &[Row], actual: &[Row]) -> Verdict {
    if expected.len() != actual.len() {
        return Verdict::Fail(format!(
            "expected {} rows, got {}",
            expected.len(),
            actual.len()
        ));
    }
    let mut remaining: Vec<&Row> = actual.iter().collect();
    for row in expected {
        match remaining.iter().position(|candidate| *candidate == row) {
            Some(idx) => {
                remaining.swap_remove(idx);
            }
            None => {
                return Verdict::Fail(format!(
                    "expected row not found: {}",
                    serde_json::Value::Object(row.clone())
                ))
            }
        }
    }
    Verdict::Pass
}

/// Evaluates a case's expectations against a captured result
#[derive(Debug, Clone)]
pub struct Comparator {
    base_dir: PathBuf,
}

impl Comparator {
    /// Create comparator resolving `data` paths against `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Evaluate every present expectation, first failure wins
    pub async fn evaluate(
        &self,
        expect: &Expectation,
        result: &Table,
    ) -> Result<Verdict, MockResolutionError> {
        if let Some(count) = &expect.count {
            let verdict = check_count(count, result.len());
            if !verdict.is_pass() {
                return Ok(verdict);
            }
        }
        if let Some(schema) = &expect.schema {
            let verdict = check_schema(schema, result);
            if !verdict.is_pass() {
                return Ok(verdict);
            }
        }
        if let Some(data) = &expect.data {
            let path = self.base_dir.join(data);
            let owned = path.clone();
            let expected = tokio::task::spawn_blocking(move || read_table(&owned))
                .await
                .map_err(|e| MockResolutionError::unreadable(&path, e))??;
            return Ok(check_data(&expected.rows, &result.rows));
        }
        Ok(Verdict::Pass)
    }
}
