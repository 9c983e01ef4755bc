//! Per-case state machine
//!
//! `Pending → Patching → Mocking → Invoking → Comparing → {Passed, Failed}`;
//! any non-terminal state may go to `Errored`.

use crate::error::StateError;
use serde::Serialize;

/// Lifecycle state of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    /// Not started
    Pending,
    /// Notebook being patched
    Patching,
    /// Mocked inputs being resolved
    Mocking,
    /// Function running at the boundary
    Invoking,
    /// Expectations being evaluated
    Comparing,
    /// All expectations held
    Passed,
    /// An expectation did not hold
    Failed,
    /// The case could not be evaluated
    Errored,
}

impl CaseState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Errored)
    }
}

impl std::fmt::Display for CaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Patching => "patching",
            Self::Mocking => "mocking",
            Self::Invoking => "invoking",
            Self::Comparing => "comparing",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: CaseState) -> Vec<CaseState> {
    use CaseState::*;
    match from {
        Pending => vec![Patching, Errored],
        Patching => vec![Mocking, Errored],
        Mocking => vec![Invoking, Errored],
        Invoking => vec![Comparing, Errored],
        Comparing => vec![Passed, Failed, Errored],
        Passed | Failed | Errored => vec![],
    }
}

/// Validate one transition
pub fn validate_transition(from: CaseState, to: CaseState) -> Result<(), StateError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateError { from, to })
    }
}

/// Tracks one case through its states
#[derive(Debug, Clone)]
pub struct CaseTracker {
    state: CaseState,
    history: Vec<CaseState>,
}

impl Default for CaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseTracker {
    /// Start in `Pending`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CaseState::Pending,
            history: vec![CaseState::Pending],
        }
    }

    /// Get current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> CaseState {
        self.state
    }

    /// Every state visited, in order
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[CaseState] {
        &self.history
    }

    /// Move to `to` if the transition is legal
    pub fn advance(&mut self, to: CaseState) -> Result<(), StateError> {
        validate_transition(self.state, to)?;
        tracing::trace!(from = %self.state, %to, "case transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Settle on `outcome`, falling back to `Errored` when that move is
    /// illegal. Returns the state the tracker ends in.
    pub fn settle(&mut self, outcome: CaseState) -> CaseState {
        if let Err(err) = self.advance(outcome) {
            tracing::error!(error = %err, "case state machine violated");
            if let Err(err) = self.advance(CaseState::Errored) {
                tracing::warn!(error = %err, state = %self.state, "case not settled as errored");
            }
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn happy_path() {
        let mut tracker = CaseTracker::new();
        for state in [
            CaseState::Patching,
            CaseState::Mocking,
            CaseState::Invoking,
            CaseState::Comparing,
            CaseState::Passed,
        ] {
            tracker.advance(state).unwrap();
        }
        assert!(tracker.state().is_terminal());
        assert_eq!(tracker.history().len(), 6);
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(validate_transition(CaseState::Passed, CaseState::Errored).is_err());
        assert!(validate_transition(CaseState::Errored, CaseState::Pending).is_err());
    }

    #[test]
    fn settle_falls_back_to_errored() {
        let mut tracker = CaseTracker::new();
        tracker.advance(CaseState::Patching).unwrap();
        assert_eq!(tracker.settle(CaseState::Passed), CaseState::Errored);
        assert_eq!(
            tracker.history(),
            &[CaseState::Pending, CaseState::Patching, CaseState::Errored]
        );

        // Nothing leaves a terminal state
        assert_eq!(tracker.settle(CaseState::Failed), CaseState::Errored);
        assert_eq!(tracker.history().len(), 3);
    }

    #[test]
    fn skipping_is_rejected() {
        let err = validate_transition(CaseState::Pending, CaseState::Invoking).unwrap_err();
        assert_eq!(err.to_string(), "illegal transition Pending -> Invoking");
    }

    fn any_state() -> impl Strategy<Value = CaseState> {
        prop_oneof![
            Just(CaseState::Pending),
            Just(CaseState::Patching),
            Just(CaseState::Mocking),
            Just(CaseState::Invoking),
            Just(CaseState::Comparing),
            Just(CaseState::Passed),
            Just(CaseState::Failed),
            Just(CaseState::Errored),
        ]
    }

    proptest! {
        #[test]
        fn non_terminal_can_always_error(from in any_state()) {
            let res = validate_transition(from, CaseState::Errored);
            prop_assert_eq!(res.is_ok(), !from.is_terminal());
        }

        #[test]
        fn validation_matches_table(from in any_state(), to in any_state()) {
            let res = validate_transition(from, to);
            prop_assert_eq!(res.is_ok(), allowed_transitions(from).contains(&to));
        }
    }
}
