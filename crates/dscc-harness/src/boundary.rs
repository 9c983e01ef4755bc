//! Execution boundaries
//!
//! A boundary runs one `HarnessUnit` and hands back the captured result
//! table. Both hosts share case semantics: the function is bound by name
//! from the patched module and called with the case inputs while the mocked
//! tables stand in for the platform session.
//!
//! - `InProcessBoundary` dispatches to registered native implementations.
//! - `ProcessBoundary` stages files and runs the generated driver with a
//!   local interpreter or inside a container.

use crate::error::BoundaryError;
use crate::generator::{parse_driver_output, HarnessUnit, CASE_FILE, DRIVER_FILE};
use crate::mock::{MockSession, TableAccess};
use crate::requirements::Requirements;
use crate::table::Table;
use dscc_analysis::{AnalysisReport, DefaultValue, DetectionFunction, ParameterKind, StaticAnalyzer};
use indexmap::IndexMap;
use moka::future::Cache;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use tokio::process::Command;

/// File holding the hash of the last installed requirements
const REQUIREMENTS_HASH_FILE: &str = "requirements.hash";

/// Requirements file name
const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Runs harness units
#[async_trait::async_trait]
pub trait ExecutionBoundary: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Make the boundary ready for a run; errors here abort the run
    async fn prepare(&self, requirements: &Requirements) -> Result<(), BoundaryError> {
        let _ = requirements;
        Ok(())
    }

    /// Invoke the unit's function and capture its result
    async fn invoke(&self, unit: &HarnessUnit) -> Result<Table, BoundaryError>;
}

/// Check that the case inputs bind to the function's parameters
pub fn bind_inputs(
    function: &DetectionFunction,
    inputs: &IndexMap<String, Value>,
) -> Result<(), BoundaryError> {
    let accepts_any = function
        .parameters
        .iter()
        .any(|p| p.kind == ParameterKind::VarKeyword);

    for name in inputs.keys() {
        let known = function
            .parameters
            .iter()
            .any(|p| p.kind == ParameterKind::Regular && &p.name == name);
        if !known && !accepts_any {
            return Err(BoundaryError::Invocation(format!(
                "{}() got an unexpected argument '{name}'",
                function.name
            )));
        }
    }

    let missing: Vec<&str> = function
        .parameters
        .iter()
        .filter(|p| p.kind == ParameterKind::Regular)
        .filter(|p| p.default == DefaultValue::Absent && !inputs.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(BoundaryError::Invocation(format!(
            "{}() missing required argument(s): {}",
            function.name,
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Native stand-in for a detection function
pub trait DetectionImpl: Send + Sync {
    /// Run against the mocked session
    fn call(
        &self,
        session: &dyn TableAccess,
        inputs: &IndexMap<String, Value>,
    ) -> Result<Table, String>;
}

impl<F> DetectionImpl for F
where
    F: Fn(&dyn TableAccess, &IndexMap<String, Value>) -> Result<Table, String> + Send + Sync,
{
    fn call(
        &self,
        session: &dyn TableAccess,
        inputs: &IndexMap<String, Value>,
    ) -> Result<Table, String> {
        self(session, inputs)
    }
}

/// Runs cases in the harness process against registered implementations
#[derive(Clone)]
pub struct InProcessBoundary {
    analyzer: StaticAnalyzer,
    functions: HashMap<String, Arc<dyn DetectionImpl>>,
    modules: Cache<String, Arc<AnalysisReport>>,
}

impl std::fmt::Debug for InProcessBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("InProcessBoundary")
            .field("functions", &names)
            .finish_non_exhaustive()
    }
}

impl Default for InProcessBoundary {
    fn default() -> Self {
        Self::new(StaticAnalyzer::default())
    }
}

impl InProcessBoundary {
    /// Create boundary binding functions with `analyzer`
    #[must_use]
    pub fn new(analyzer: StaticAnalyzer) -> Self {
        Self {
            analyzer,
            functions: HashMap::new(),
            modules: Cache::new(1_000),
        }
    }

    /// Register the implementation of `name`
    #[must_use]
    pub fn with_function(mut self, name: impl Into<String>, imp: impl DetectionImpl + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(imp));
        self
    }

    /// Analysis of a patched module, memoised by content hash
    async fn module_report(&self, unit: &HarnessUnit) -> Result<Arc<AnalysisReport>, BoundaryError> {
        let analyzer = self.analyzer.clone();
        let source = unit.module.source.clone();
        self.modules
            .try_get_with(unit.module.hash.clone(), async move {
                analyzer.analyze_module(&source).map(Arc::new)
            })
            .await
            .map_err(|e| BoundaryError::Invocation(format!("cannot bind module: {e}")))
    }
}

#[async_trait::async_trait]
impl ExecutionBoundary for InProcessBoundary {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn invoke(&self, unit: &HarnessUnit) -> Result<Table, BoundaryError> {
        let report = self.module_report(unit).await?;
        let function = report.function(unit.function()).ok_or_else(|| {
            BoundaryError::Invocation(format!(
                "function '{}' is not defined in module {}",
                unit.function(),
                unit.module.name
            ))
        })?;
        bind_inputs(function, unit.inputs())?;

        let imp = self.functions.get(unit.function()).cloned().ok_or_else(|| {
            BoundaryError::Invocation(format!(
                "no implementation registered for '{}'",
                unit.function()
            ))
        })?;
        let session = MockSession::new(unit.tables.clone());
        let inputs = unit.inputs().clone();

        tokio::task::spawn_blocking(move || imp.call(&session, &inputs))
            .await
            .map_err(|e| BoundaryError::Invocation(format!("implementation panicked: {e}")))?
            .map_err(BoundaryError::Invocation)
    }
}

/// Where a process boundary runs the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
    /// Interpreter on this host
    Local {
        /// Interpreter binary
        interpreter: String,
    },
    /// Interpreter inside a running container
    Container {
        /// Container runtime binary (`docker`)
        runtime: String,
        /// Container name
        container: String,
        /// Interpreter inside the container
        interpreter: String,
    },
}

/// Runs the generated driver in a subprocess
#[derive(Debug, Clone)]
pub struct ProcessBoundary {
    target: ProcessTarget,
    state_dir: PathBuf,
    install_requirements: bool,
}

impl ProcessBoundary {
    /// Create boundary keeping install state in `state_dir`
    #[must_use]
    pub fn new(target: ProcessTarget, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            target,
            state_dir: state_dir.into(),
            install_requirements: false,
        }
    }

    /// Install collected requirements during `prepare`
    #[must_use]
    pub fn with_install_requirements(mut self, install: bool) -> Self {
        self.install_requirements = install;
        self
    }

    /// Get target
    #[inline]
    #[must_use]
    pub fn target(&self) -> &ProcessTarget {
        &self.target
    }

    async fn check_runtime(&self) -> Result<(), BoundaryError> {
        match &self.target {
            ProcessTarget::Local { interpreter } => {
                let output = run(Command::new(interpreter).arg("--version"), interpreter).await?;
                let version = String::from_utf8_lossy(&output.stdout);
                tracing::info!(interpreter = %interpreter, version = %version.trim(), "local interpreter");
                require_success(&output, interpreter)
            }
            ProcessTarget::Container {
                runtime, container, ..
            } => {
                let output = run(
                    Command::new(runtime).args(["inspect", "-f", "{{.State.Running}}", container.as_str()]),
                    runtime,
                )
                .await?;
                if String::from_utf8_lossy(&output.stdout).trim() == "true" {
                    tracing::info!(container = %container, "container is running");
                    Ok(())
                } else {
                    Err(BoundaryError::Unavailable(format!(
                        "container '{container}' is not running"
                    )))
                }
            }
        }
    }

    async fn install(&self, requirements: &Requirements) -> Result<(), BoundaryError> {
        let hash = requirements.hash();
        let hash_path = self.state_dir.join(REQUIREMENTS_HASH_FILE);
        if tokio::fs::read_to_string(&hash_path)
            .await
            .is_ok_and(|previous| previous.trim() == hash)
        {
            tracing::debug!("requirements unchanged, skipping install");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| BoundaryError::io_error(&self.state_dir, &e))?;
        let req_path = self.state_dir.join(REQUIREMENTS_FILE);
        tokio::fs::write(&req_path, requirements.render())
            .await
            .map_err(|e| BoundaryError::io_error(&req_path, &e))?;

        let output = match &self.target {
            ProcessTarget::Local { interpreter } => {
                let mut cmd = Command::new(interpreter);
                cmd.args(["-m", "pip", "install", "-r"]).arg(&req_path);
                run(&mut cmd, interpreter).await?
            }
            ProcessTarget::Container {
                runtime,
                container,
                interpreter,
            } => {
                let remote = format!("/tmp/dscc-{REQUIREMENTS_FILE}");
                let copied = run(
                    Command::new(runtime)
                        .arg("cp")
                        .arg(&req_path)
                        .arg(format!("{container}:{remote}")),
                    runtime,
                )
                .await?;
                require_success(&copied, runtime)?;
                run(
                    Command::new(runtime)
                        .args(["exec", container.as_str(), interpreter.as_str()])
                        .args(["-m", "pip", "install", "-r", remote.as_str()]),
                    runtime,
                )
                .await?
            }
        };
        if !output.status.success() {
            return Err(BoundaryError::Unavailable(format!(
                "requirements install failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tokio::fs::write(&hash_path, &hash)
            .await
            .map_err(|e| BoundaryError::io_error(&hash_path, &e))?;
        tracing::info!(packages = requirements.packages().count(), "requirements installed");
        Ok(())
    }

    async fn stage(unit: &HarnessUnit, dir: &Path) -> Result<(), BoundaryError> {
        unit.module.write_to(dir).await.map_err(|e| BoundaryError::Io {
            path: dir.join(unit.module.file_name()),
            message: e.to_string(),
        })?;
        let driver = dir.join(DRIVER_FILE);
        tokio::fs::write(&driver, &unit.driver)
            .await
            .map_err(|e| BoundaryError::io_error(&driver, &e))?;
        let case = dir.join(CASE_FILE);
        tokio::fs::write(&case, unit.case_json()?)
            .await
            .map_err(|e| BoundaryError::io_error(&case, &e))?;
        Ok(())
    }

    async fn execute(&self, unit: &HarnessUnit, dir: &Path) -> Result<Output, BoundaryError> {
        let module_file = unit.module.file_name();
        match &self.target {
            ProcessTarget::Local { interpreter } => {
                run(
                    Command::new(interpreter)
                        .arg(dir.join(DRIVER_FILE))
                        .arg(dir.join(CASE_FILE))
                        .arg(dir.join(&module_file))
                        .current_dir(dir),
                    interpreter,
                )
                .await
            }
            ProcessTarget::Container {
                runtime,
                container,
                interpreter,
            } => {
                let remote = format!("/tmp/dscc-{}", uuid::Uuid::new_v4());
                let copied = run(
                    Command::new(runtime)
                        .arg("cp")
                        .arg(dir)
                        .arg(format!("{container}:{remote}")),
                    runtime,
                )
                .await?;
                require_success(&copied, runtime)?;

                let output = run(
                    Command::new(runtime)
                        .args(["exec", "-w", remote.as_str(), container.as_str()])
                        .arg(interpreter)
                        .arg(format!("{remote}/{DRIVER_FILE}"))
                        .arg(format!("{remote}/{CASE_FILE}"))
                        .arg(format!("{remote}/{module_file}")),
                    runtime,
                )
                .await;

                if let Err(e) = run(
                    Command::new(runtime).args(["exec", container.as_str(), "rm", "-rf", remote.as_str()]),
                    runtime,
                )
                .await
                {
                    tracing::warn!(error = %e, remote = %remote, "container cleanup failed");
                }
                output
            }
        }
    }
}

async fn run(cmd: &mut Command, program: &str) -> Result<Output, BoundaryError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| BoundaryError::Unavailable(format!("failed to run {program}: {e}")))
}

fn require_success(output: &Output, program: &str) -> Result<(), BoundaryError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(BoundaryError::Unavailable(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[async_trait::async_trait]
impl ExecutionBoundary for ProcessBoundary {
    fn name(&self) -> &'static str {
        match self.target {
            ProcessTarget::Local { .. } => "local",
            ProcessTarget::Container { .. } => "container",
        }
    }

    async fn prepare(&self, requirements: &Requirements) -> Result<(), BoundaryError> {
        self.check_runtime().await?;
        if self.install_requirements && !requirements.is_empty() {
            self.install(requirements).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, unit), fields(case = %unit.case.name, boundary = self.name()))]
    async fn invoke(&self, unit: &HarnessUnit) -> Result<Table, BoundaryError> {
        let staging = tempfile::Builder::new()
            .prefix("dscc-")
            .tempdir()
            .map_err(|e| BoundaryError::io_error(std::env::temp_dir(), &e))?;
        Self::stage(unit, staging.path()).await?;

        let output = self.execute(unit, staging.path()).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_driver_output(&stdout) {
            Err(BoundaryError::Protocol(message)) if !output.status.success() => {
                Err(BoundaryError::Invocation(format!(
                    "driver exited with {} ({message}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use dscc_notebook::{MockedInput, TestCase};
    use dscc_patch::{MemorySource, NotebookPatcher};
    use serde_json::json;

    const NOTEBOOK: &str = "# Databricks notebook source\n\
        @detect\n\
        def f(x, limit=10):\n\
        \x20   return spark.table(\"t\")\n";

    async fn unit(case: TestCase) -> HarnessUnit {
        let source = MemorySource::new().with_notebook("nb.py", NOTEBOOK).unwrap();
        let module = NotebookPatcher::new(Arc::new(source))
            .patch(Path::new("nb.py"))
            .await
            .unwrap();
        let mut tables = HashMap::new();
        tables.insert(
            "t".to_string(),
            Arc::new(Table::from_rows(vec![
                serde_json::from_value(json!({"user": "a"})).unwrap(),
                serde_json::from_value(json!({"user": "b"})).unwrap(),
            ])),
        );
        HarnessUnit {
            notebook: "nb.py".into(),
            case,
            module: Arc::new(module),
            markers: vec!["detect".into()],
            tables,
            driver: String::new(),
        }
    }

    fn filter_user(session: &dyn TableAccess, inputs: &IndexMap<String, Value>) -> Result<Table, String> {
        let table = session.table("t").map_err(|e| e.to_string())?;
        let user = inputs.get("x").cloned().unwrap_or(Value::Null);
        Ok(table.filter(|row| row.get("user") == Some(&user)))
    }

    fn read_other(session: &dyn TableAccess, _: &IndexMap<String, Value>) -> Result<Table, String> {
        session.table("other").map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn in_process_dispatches_with_mock_session() {
        let boundary = InProcessBoundary::default().with_function("f", filter_user);
        let case = TestCase::new("f")
            .with_input("x", json!("b"))
            .with_mocked_input(MockedInput::new("t", "tests/t_sample.json"));
        let table = boundary.invoke(&unit(case).await).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns, vec![Column::untyped("user")]);
    }

    #[tokio::test]
    async fn in_process_rejects_bad_binding() {
        let boundary = InProcessBoundary::default().with_function("f", filter_user);

        let missing = boundary.invoke(&unit(TestCase::new("f")).await).await.unwrap_err();
        assert_eq!(
            missing,
            BoundaryError::Invocation("f() missing required argument(s): x".into())
        );

        let extra = TestCase::new("f").with_input("x", json!(1)).with_input("y", json!(2));
        let err = boundary.invoke(&unit(extra).await).await.unwrap_err();
        assert!(matches!(err, BoundaryError::Invocation(m) if m.contains("'y'")));

        let unknown = boundary.invoke(&unit(TestCase::new("g")).await).await.unwrap_err();
        assert!(matches!(unknown, BoundaryError::Invocation(m) if m.contains("not defined")));
    }

    #[tokio::test]
    async fn in_process_without_implementation() {
        let boundary = InProcessBoundary::default();
        let case = TestCase::new("f").with_input("x", json!("a"));
        let err = boundary.invoke(&unit(case).await).await.unwrap_err();
        assert!(matches!(err, BoundaryError::Invocation(m) if m.contains("no implementation")));
    }

    #[tokio::test]
    async fn in_process_unbound_table_is_invocation_error() {
        let boundary = InProcessBoundary::default().with_function("f", read_other);
        let case = TestCase::new("f").with_input("x", json!("a"));
        let err = boundary.invoke(&unit(case).await).await.unwrap_err();
        assert_eq!(
            err,
            BoundaryError::Invocation("table 'other' has no mocked input".into())
        );
    }

    #[tokio::test]
    async fn missing_interpreter_is_unavailable() {
        let boundary = ProcessBoundary::new(
            ProcessTarget::Local {
                interpreter: "dscc-no-such-interpreter".into(),
            },
            std::env::temp_dir(),
        );
        let err = boundary.prepare(&Requirements::default()).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(boundary.name(), "local");
    }
}
