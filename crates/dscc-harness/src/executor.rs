//! Run orchestration
//!
//! # Flow
//!
//! 1. load every notebook and collect its requirements
//! 2. `prepare` the boundary; failure aborts before any case runs
//! 3. patch and analyse each notebook once, concurrently
//! 4. drive every case through its state machine with
//!    `buffer_unordered(workers)`
//!
//! The run deadline cuts off cases still invoking (`Errored("timed out")`).
//! An infrastructure error stops the run; cases already settled stay in the
//! report.

use crate::boundary::ExecutionBoundary;
use crate::compare::{Comparator, Verdict};
use crate::config::{HarnessConfig, RunConfig};
use crate::error::{InfrastructureError, StateError};
use crate::generator::HarnessGenerator;
use crate::mock::MockDataProvider;
use crate::requirements::Requirements;
use crate::result::{NotebookError, RunReport, TestResult};
use crate::state::{CaseState, CaseTracker};
use dscc_analysis::{AnalysisReport, StaticAnalyzer};
use dscc_notebook::{NotebookDocument, TestCase};
use dscc_patch::{NotebookPatcher, NotebookSource, PatchedModule};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;

/// Why a case stopped before comparison
enum Interrupt {
    Errored(String),
    Infrastructure(String),
}

impl From<StateError> for Interrupt {
    fn from(err: StateError) -> Self {
        Self::Errored(err.to_string())
    }
}

/// Per-notebook preparation shared by its cases
struct Prepared {
    notebook: PathBuf,
    module: Result<Arc<PatchedModule>, String>,
    report: Result<Arc<AnalysisReport>, String>,
}

struct Job {
    prepared: Arc<Prepared>,
    case: TestCase,
}

/// Executes test cases of notebooks
#[derive(Clone)]
pub struct HarnessExecutor {
    source: Arc<dyn NotebookSource>,
    patcher: NotebookPatcher,
    analyzer: StaticAnalyzer,
    generator: HarnessGenerator,
    comparator: Comparator,
    boundary: Arc<dyn ExecutionBoundary>,
    run: RunConfig,
}

impl std::fmt::Debug for HarnessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessExecutor")
            .field("boundary", &self.boundary.name())
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

impl HarnessExecutor {
    /// Create executor from configuration
    #[must_use]
    pub fn new(
        config: &HarnessConfig,
        source: Arc<dyn NotebookSource>,
        boundary: Arc<dyn ExecutionBoundary>,
    ) -> Self {
        let provider = MockDataProvider::new(config.mock.clone());
        Self {
            patcher: NotebookPatcher::new(Arc::clone(&source)).with_config(config.patch.clone()),
            source,
            analyzer: StaticAnalyzer::new(config.analysis.clone()),
            generator: HarnessGenerator::new(provider, config.analysis.markers.clone()),
            comparator: Comparator::new(config.mock.base_dir.clone()),
            boundary,
            run: config.run.clone(),
        }
    }

    /// Get run configuration
    #[inline]
    #[must_use]
    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    /// Run every case of `notebooks`
    #[tracing::instrument(skip(self, notebooks), fields(notebooks = notebooks.len(), boundary = self.boundary.name()))]
    pub async fn run(&self, notebooks: &[PathBuf]) -> RunReport {
        let mut report = RunReport::default();
        self.generator.provider().reset();
        let started = Instant::now();

        let mut loaded: Vec<(PathBuf, Arc<NotebookDocument>)> = Vec::new();
        for path in notebooks {
            match self.source.load(path).await {
                Ok(doc) => loaded.push((path.clone(), doc)),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "notebook skipped");
                    report.notebook_errors.push(NotebookError {
                        notebook: path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let requirements = Requirements::collect(loaded.iter().map(|(_, doc)| doc.as_ref()));
        if let Err(err) = self.boundary.prepare(&requirements).await {
            let err = InfrastructureError(err.to_string());
            tracing::error!(error = %err, "boundary not ready, run aborted");
            report.aborted = Some(err.to_string());
            return report;
        }

        let workers = self.run.workers.max(1);
        let prepared: Vec<(Arc<Prepared>, Vec<TestCase>)> = stream::iter(loaded)
            .map(|(path, doc)| async move {
                let cases = doc.metadata().tests.clone();
                (Arc::new(self.prepare_notebook(path, doc).await), cases)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let jobs: Vec<Job> = prepared
            .into_iter()
            .flat_map(|(prepared, cases)| {
                cases.into_iter().map(move |case| Job {
                    prepared: Arc::clone(&prepared),
                    case,
                })
            })
            .collect();

        let deadline = self.run.timeout().map(|t| started + t);
        let mut settled = stream::iter(jobs)
            .map(|job| self.run_case(job, deadline))
            .buffer_unordered(workers);

        while let Some(outcome) = settled.next().await {
            match outcome {
                Ok(result) => {
                    tracing::info!(
                        case = %result.case,
                        notebook = %result.notebook.display(),
                        state = %result.state,
                        reason = result.reason.as_deref().unwrap_or(""),
                        "case settled"
                    );
                    report.results.push(result);
                }
                Err(err) => {
                    tracing::error!(error = %err, "run aborted");
                    report.aborted = Some(err.to_string());
                    break;
                }
            }
        }
        drop(settled);

        report
            .results
            .sort_by(|a, b| (&a.notebook, &a.case).cmp(&(&b.notebook, &b.case)));
        tracing::info!(summary = %report.summary(), "run finished");
        report
    }

    async fn prepare_notebook(&self, notebook: PathBuf, doc: Arc<NotebookDocument>) -> Prepared {
        let report = self
            .analyzer
            .analyze(&doc)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        let module = self
            .patcher
            .patch_document(&notebook, doc)
            .await
            .map(Arc::new)
            .map_err(|e| e.to_string());
        if let Err(err) = &module {
            tracing::warn!(notebook = %notebook.display(), error = %err, "patch failed");
        }
        Prepared {
            notebook,
            module,
            report,
        }
    }

    async fn run_case(
        &self,
        job: Job,
        deadline: Option<Instant>,
    ) -> Result<TestResult, InfrastructureError> {
        let started = Instant::now();
        let mut tracker = CaseTracker::new();
        let outcome = self.drive(&job, &mut tracker, deadline).await;

        let (state, reason) = match outcome {
            Ok(Verdict::Pass) => (CaseState::Passed, None),
            Ok(Verdict::Fail(reason)) => (CaseState::Failed, Some(reason)),
            Err(Interrupt::Errored(reason)) => (CaseState::Errored, Some(reason)),
            Err(Interrupt::Infrastructure(message)) => {
                return Err(InfrastructureError(message));
            }
        };
        let state = tracker.settle(state);

        Ok(TestResult::new(
            job.case.name.clone(),
            job.prepared.notebook.clone(),
            state,
            reason,
            started.elapsed(),
        ))
    }

    async fn drive(
        &self,
        job: &Job,
        tracker: &mut CaseTracker,
        deadline: Option<Instant>,
    ) -> Result<Verdict, Interrupt> {
        let case = &job.case;
        let prepared = &job.prepared;

        tracker.advance(CaseState::Patching)?;
        let module = prepared.module.clone().map_err(Interrupt::Errored)?;
        let report = prepared.report.clone().map_err(Interrupt::Errored)?;
        let function = report.function(&case.function).ok_or_else(|| {
            Interrupt::Errored(format!(
                "'{}' is not a detection function of {}",
                case.function,
                prepared.notebook.display()
            ))
        })?;
        if !case.expect.is_meaningful() {
            return Err(Interrupt::Errored("case declares no expectation".to_string()));
        }

        tracker.advance(CaseState::Mocking)?;
        let unit = self
            .generator
            .generate(&prepared.notebook, module, case, function)
            .await
            .map_err(|e| Interrupt::Errored(e.to_string()))?;

        tracker.advance(CaseState::Invoking)?;
        let invocation = self.boundary.invoke(&unit);
        let invoked = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, invocation)
                .await
                .map_err(|_| Interrupt::Errored("timed out".to_string()))?,
            None => invocation.await,
        };
        let table = invoked.map_err(|e| {
            if e.is_infrastructure() {
                Interrupt::Infrastructure(e.to_string())
            } else {
                Interrupt::Errored(e.to_string())
            }
        })?;

        tracker.advance(CaseState::Comparing)?;
        self.comparator
            .evaluate(&case.expect, &table)
            .await
            .map_err(|e| Interrupt::Errored(e.to_string()))
    }

    /// Run cases of a single notebook
    pub async fn run_notebook(&self, notebook: &Path) -> RunReport {
        self.run(&[notebook.to_path_buf()]).await
    }
}
