//! Case results and run reports

use crate::state::CaseState;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// Case name
    pub case: String,
    /// Notebook the case belongs to
    pub notebook: PathBuf,
    /// Terminal state
    pub state: CaseState,
    /// Failure or error reason
    pub reason: Option<String>,
    /// Wall time spent on the case
    pub elapsed: Duration,
}

impl TestResult {
    /// Create result
    pub fn new(
        case: impl Into<String>,
        notebook: impl Into<PathBuf>,
        state: CaseState,
        reason: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            case: case.into(),
            notebook: notebook.into(),
            state,
            reason,
            elapsed,
        }
    }

    /// Whether the case passed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.state == CaseState::Passed
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{} ({} ms)",
            self.state.to_string().to_uppercase(),
            self.notebook.display(),
            self.case,
            self.elapsed.as_millis()
        )?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// A notebook that produced no case results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotebookError {
    /// Notebook path
    pub notebook: PathBuf,
    /// Why it was skipped
    pub message: String,
}

/// Totals by terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    /// Passed cases
    pub passed: usize,
    /// Failed cases
    pub failed: usize,
    /// Errored cases
    pub errored: usize,
    /// All cases
    pub total: usize,
}

impl RunSummary {
    /// Whether every case passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} errored, {} total",
            self.passed, self.failed, self.errored, self.total
        )
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Settled cases
    pub results: Vec<TestResult>,
    /// Notebooks that could not be loaded or patched
    pub notebook_errors: Vec<NotebookError>,
    /// Infrastructure error that stopped the run
    pub aborted: Option<String>,
}

impl RunReport {
    /// Count results by state
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.results.len(),
            ..RunSummary::default()
        };
        for result in &self.results {
            match result.state {
                CaseState::Passed => summary.passed += 1,
                CaseState::Failed => summary.failed += 1,
                _ => summary.errored += 1,
            }
        }
        summary
    }

    /// Whether the run is clean: no aborts, no notebook errors, all passed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.notebook_errors.is_empty() && self.summary().all_passed()
    }

    /// Result for a case name
    #[must_use]
    pub fn result(&self, case: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.case == case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(case: &str, state: CaseState) -> TestResult {
        TestResult::new(case, "nb.py", state, None, Duration::from_millis(5))
    }

    #[test]
    fn summary_counts() {
        let report = RunReport {
            results: vec![
                result("a", CaseState::Passed),
                result("b", CaseState::Failed),
                result("c", CaseState::Errored),
                result("d", CaseState::Passed),
            ],
            ..RunReport::default()
        };
        let summary = report.summary();
        assert_eq!(
            summary,
            RunSummary {
                passed: 2,
                failed: 1,
                errored: 1,
                total: 4
            }
        );
        assert_eq!(summary.to_string(), "2 passed, 1 failed, 1 errored, 4 total");
        assert!(!report.is_success());
    }

    #[test]
    fn empty_report_is_success() {
        assert!(RunReport::default().is_success());
    }

    #[test]
    fn display_includes_reason() {
        let mut r = result("a", CaseState::Failed);
        r.reason = Some("expected count > 0, got 0".into());
        assert_eq!(r.to_string(), "FAILED nb.py::a (5 ms): expected count > 0, got 0");
    }
}
