//! Harness generation
//!
//! One `HarnessUnit` per test case: the patched module, the bound function,
//! the case inputs, every mocked table resolved, and the driver script that
//! out-of-process boundaries execute.

use crate::compare::normalize_type;
use crate::error::{BoundaryError, MockResolutionError};
use crate::mock::MockDataProvider;
use crate::table::{infer_type, Table};
use dscc_analysis::DetectionFunction;
use dscc_notebook::TestCase;
use dscc_patch::{PatchedModule, BIND_FUNCTION, FIXTURE_NAME};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix of the driver's result line on stdout
pub const RESULT_MARKER: &str = "__DSCC_RESULT__";

/// Driver file name inside a staging directory
pub const DRIVER_FILE: &str = "dscc_driver.py";

/// Case payload file name inside a staging directory
pub const CASE_FILE: &str = "dscc_case.json";

const DRIVER_TEMPLATE: &str = r#"# dscc harness driver for module @MODULE@
import importlib.util
import json
import sys
import traceback

RESULT_MARKER = "@MARKER@"


def _emit(payload):
    sys.stdout.write(RESULT_MARKER + json.dumps(payload, default=str) + "\n")
    sys.stdout.flush()


def _passthrough(*args, **kwargs):
    if len(args) == 1 and callable(args[0]) and not kwargs:
        return args[0]
    return lambda fn: fn


class _Reader:
    def __init__(self, session):
        self._session = session

    def table(self, name):
        return self._session.table(name)


class _MockSession:
    def __init__(self, spark, frames):
        self._spark = spark
        self._frames = frames
        self.read = _Reader(self)

    def table(self, name):
        if name not in self._frames:
            raise KeyError("table '%s' has no mocked input" % name)
        return self._frames[name]

    def __getattr__(self, attr):
        return getattr(self._spark, attr)


def _frame(spark, table):
    from pyspark.sql.types import StructType

    columns = table.get("columns") or []
    if not columns:
        return spark.createDataFrame([], StructType([]))
    ddl = ", ".join("`%s` %s" % (c["name"], c["type"]) for c in columns)
    rows = [[row.get(c["name"]) for c in columns] for row in table.get("rows") or []]
    return spark.createDataFrame(rows, ddl)


def main(case_path, module_path):
    with open(case_path) as fh:
        case = json.load(fh)

    from pyspark.sql import SparkSession

    spark = SparkSession.builder.master("local[1]").appName("dscc").getOrCreate()
    frames = {name: _frame(spark, table) for name, table in case["tables"].items()}
    session = _MockSession(spark, frames)

    spec = importlib.util.spec_from_file_location("@MODULE@", module_path)
    module = importlib.util.module_from_spec(spec)
    for marker in case["markers"]:
        setattr(module, marker, _passthrough)
    setattr(module, "@FIXTURE@", session)
    spec.loader.exec_module(module)
    module.@BIND@(session)

    fn = getattr(module, case["function"], None)
    if fn is None:
        _emit({"error": "function '%s' is not defined" % case["function"]})
        return 1

    result = fn(**case["inputs"])
    columns = [
        {"name": f.name, "type": f.dataType.simpleString()} for f in result.schema.fields
    ]
    rows = [r.asDict(recursive=True) for r in result.collect()]
    _emit({"columns": columns, "rows": rows})
    return 0


if __name__ == "__main__":
    try:
        sys.exit(main(sys.argv[1], sys.argv[2]))
    except Exception:
        _emit({"error": traceback.format_exc()})
        sys.exit(1)
"#;

/// Render the driver script for a module
#[must_use]
pub fn render_driver(module: &str) -> String {
    DRIVER_TEMPLATE
        .replace("@MODULE@", module)
        .replace("@MARKER@", RESULT_MARKER)
        .replace("@FIXTURE@", FIXTURE_NAME)
        .replace("@BIND@", BIND_FUNCTION)
}

/// Spark DDL type for a column, inferred from values when undeclared
fn ddl_type<'a>(declared: Option<&str>, values: impl Iterator<Item = &'a Value>) -> String {
    if let Some(declared) = declared {
        let lower = declared.trim().to_ascii_lowercase();
        return match normalize_type(&lower).as_str() {
            "integer" => "bigint".to_string(),
            "floating" => "double".to_string(),
            "decimal" if lower.contains('(') => lower,
            "decimal" => "decimal(38,18)".to_string(),
            "boolean" => "boolean".to_string(),
            "timestamp" => "timestamp".to_string(),
            "date" => "date".to_string(),
            _ => "string".to_string(),
        };
    }

    infer_type(values).unwrap_or("string").to_string()
}

#[derive(Serialize)]
struct DriverColumn<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    data_type: String,
}

#[derive(Serialize)]
struct DriverTable<'a> {
    columns: Vec<DriverColumn<'a>>,
    rows: &'a [crate::table::Row],
}

impl<'a> DriverTable<'a> {
    fn new(table: &'a Table) -> Self {
        let columns = table
            .columns
            .iter()
            .map(|c| DriverColumn {
                name: &c.name,
                data_type: ddl_type(
                    c.data_type.as_deref(),
                    table.rows.iter().filter_map(|r| r.get(&c.name)),
                ),
            })
            .collect();
        Self {
            columns,
            rows: &table.rows,
        }
    }
}

#[derive(Serialize)]
struct DriverCase<'a> {
    function: &'a str,
    inputs: &'a IndexMap<String, Value>,
    markers: &'a [String],
    tables: IndexMap<&'a str, DriverTable<'a>>,
}

/// Everything needed to invoke one case at a boundary
#[derive(Debug, Clone)]
pub struct HarnessUnit {
    /// Owning notebook
    pub notebook: PathBuf,
    /// The case being run
    pub case: TestCase,
    /// Patched module of the notebook
    pub module: Arc<PatchedModule>,
    /// Decorator names pre-seeded in the module namespace
    pub markers: Vec<String>,
    /// Mocked tables by name
    pub tables: HashMap<String, Arc<Table>>,
    /// Driver script text
    pub driver: String,
}

impl HarnessUnit {
    /// Function under test
    #[inline]
    #[must_use]
    pub fn function(&self) -> &str {
        &self.case.function
    }

    /// Case inputs in declaration order
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &IndexMap<String, Value> {
        &self.case.input
    }

    /// JSON payload read by the driver
    pub fn case_json(&self) -> Result<String, BoundaryError> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        let tables = names
            .into_iter()
            .filter_map(|name| self.tables.get(name).map(|t| (name, DriverTable::new(t))))
            .collect();
        let payload = DriverCase {
            function: &self.case.function,
            inputs: &self.case.input,
            markers: &self.markers,
            tables,
        };
        serde_json::to_string_pretty(&payload).map_err(|e| BoundaryError::Protocol(e.to_string()))
    }
}

/// Parse the driver's stdout into a result table
pub fn parse_driver_output(stdout: &str) -> Result<Table, BoundaryError> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|l| l.strip_prefix(RESULT_MARKER))
        .ok_or_else(|| BoundaryError::Protocol("driver produced no result line".to_string()))?;
    let value: Value =
        serde_json::from_str(line).map_err(|e| BoundaryError::Protocol(e.to_string()))?;
    if let Some(error) = value.get("error") {
        let message = error.as_str().map_or_else(|| error.to_string(), str::to_string);
        return Err(BoundaryError::Invocation(message.trim_end().to_string()));
    }
    serde_json::from_value(value).map_err(|e| BoundaryError::Protocol(e.to_string()))
}

/// Builds harness units from cases
#[derive(Debug, Clone)]
pub struct HarnessGenerator {
    provider: MockDataProvider,
    markers: Vec<String>,
}

impl HarnessGenerator {
    /// Create generator resolving mocks through `provider`
    #[must_use]
    pub fn new(provider: MockDataProvider, markers: Vec<String>) -> Self {
        Self { provider, markers }
    }

    /// Get mock provider
    #[inline]
    #[must_use]
    pub fn provider(&self) -> &MockDataProvider {
        &self.provider
    }

    /// Resolve every mocked input of `case` and assemble the unit.
    ///
    /// Column hints for stubs come from the function's table references,
    /// else from the case's `required_columns`.
    pub async fn generate(
        &self,
        notebook: &Path,
        module: Arc<PatchedModule>,
        case: &TestCase,
        function: &DetectionFunction,
    ) -> Result<HarnessUnit, MockResolutionError> {
        let mut tables = HashMap::with_capacity(case.mocked_inputs.len());
        for input in &case.mocked_inputs {
            let hints = function
                .tables
                .iter()
                .find(|t| t.table == input.table)
                .map_or(&case.required_columns, |t| &t.columns);
            let table = self.provider.resolve(input, hints).await?;
            tables.insert(input.table.clone(), table);
        }

        let driver = render_driver(&module.name);
        tracing::debug!(
            case = %case.name,
            function = %case.function,
            tables = tables.len(),
            "harness unit generated"
        );
        Ok(HarnessUnit {
            notebook: notebook.to_path_buf(),
            case: case.clone(),
            module,
            markers: self.markers.clone(),
            tables,
            driver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use serde_json::json;

    #[test]
    fn driver_mentions_fixture_and_marker() {
        let driver = render_driver("login");
        assert!(driver.starts_with("# dscc harness driver for module login\n"));
        assert!(driver.contains("setattr(module, \"__dscc_session__\", session)"));
        assert!(driver.contains("module.__dscc_bind_session__(session)"));
        assert!(driver.contains("RESULT_MARKER = \"__DSCC_RESULT__\""));
        assert!(!driver.contains('@'));
    }

    #[test]
    fn ddl_types() {
        assert_eq!(ddl_type(Some("long"), std::iter::empty()), "bigint");
        assert_eq!(ddl_type(Some("Decimal(10,2)"), std::iter::empty()), "decimal(10,2)");
        assert_eq!(ddl_type(Some("map<string,int>"), std::iter::empty()), "string");
        assert_eq!(ddl_type(None, [json!(1), Value::Null, json!(2)].iter()), "bigint");
        assert_eq!(ddl_type(None, [json!(1), json!(2.5)].iter()), "double");
        assert_eq!(ddl_type(None, [json!(true), json!("x")].iter()), "string");
        assert_eq!(ddl_type(None, std::iter::empty()), "string");
    }

    #[test]
    fn parse_result_line_among_noise() {
        let stdout = format!(
            "+---+\n|id |\n+---+\n{RESULT_MARKER}{}\n",
            json!({"columns": [{"name": "id", "type": "bigint"}], "rows": [{"id": 1}]})
        );
        let table = parse_driver_output(&stdout).unwrap();
        assert_eq!(table.columns, vec![Column::typed("id", "bigint")]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn parse_error_payload() {
        let stdout = format!("{RESULT_MARKER}{}\n", json!({"error": "Traceback\nKeyError\n"}));
        assert_eq!(
            parse_driver_output(&stdout).unwrap_err(),
            BoundaryError::Invocation("Traceback\nKeyError".into())
        );
        assert!(matches!(
            parse_driver_output("no marker here").unwrap_err(),
            BoundaryError::Protocol(_)
        ));
    }
}
