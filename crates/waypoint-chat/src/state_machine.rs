//! Per-turn state machine with validated transitions.
//!
//! Received -> ResolvingReferences -> Classifying -> RoutingLocation | RoutingGeneral
//! -> Executing -> Recording -> Complete, with Error reachable from every
//! non-terminal state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TurnFailure;

/// Stage of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Received,
    ResolvingReferences,
    Classifying,
    RoutingLocation,
    RoutingGeneral,
    Executing,
    Recording,
    Complete,
    Error,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Complete | TurnState::Error)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Received => "RECEIVED",
            TurnState::ResolvingReferences => "RESOLVING_REFERENCES",
            TurnState::Classifying => "CLASSIFYING",
            TurnState::RoutingLocation => "ROUTING_LOCATION",
            TurnState::RoutingGeneral => "ROUTING_GENERAL",
            TurnState::Executing => "EXECUTING",
            TurnState::Recording => "RECORDING",
            TurnState::Complete => "COMPLETE",
            TurnState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Validate that a turn state transition is allowed.
pub fn validate_transition(from: TurnState, to: TurnState) -> Result<(), TurnFailure> {
    let valid = matches!(
        (from, to),
        (TurnState::Received, TurnState::ResolvingReferences)
            | (TurnState::ResolvingReferences, TurnState::Classifying)
            | (TurnState::Classifying, TurnState::RoutingLocation)
            | (TurnState::Classifying, TurnState::RoutingGeneral)
            | (TurnState::RoutingLocation, TurnState::Executing)
            | (TurnState::RoutingGeneral, TurnState::Executing)
            | (TurnState::Executing, TurnState::Recording)
            | (TurnState::Recording, TurnState::Complete)
    ) || (to == TurnState::Error && !from.is_terminal());

    if valid {
        Ok(())
    } else {
        Err(TurnFailure::InvalidTransition { from, to })
    }
}

/// Tracks the states one turn has passed through.
#[derive(Debug, Clone)]
pub struct TurnTracker {
    history: Vec<TurnState>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self {
            history: vec![TurnState::Received],
        }
    }

    pub fn current(&self) -> TurnState {
        self.history
            .last()
            .copied()
            .unwrap_or(TurnState::Received)
    }

    pub fn advance(&mut self, next: TurnState) -> Result<(), TurnFailure> {
        let current = self.current();
        validate_transition(current, next)?;
        debug!(from = %current, to = %next, "Turn transition");
        self.history.push(next);
        Ok(())
    }

    /// Move to `Error` unless already terminal.
    pub fn fail(&mut self) {
        let current = self.current();
        if !current.is_terminal() {
            debug!(from = %current, "Turn failed");
            self.history.push(TurnState::Error);
        }
    }

    pub fn into_history(self) -> Vec<TurnState> {
        self.history
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_location_path() {
        let path = [
            TurnState::Received,
            TurnState::ResolvingReferences,
            TurnState::Classifying,
            TurnState::RoutingLocation,
            TurnState::Executing,
            TurnState::Recording,
            TurnState::Complete,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{:?}", pair);
        }
    }

    #[test]
    fn test_general_path() {
        assert!(validate_transition(TurnState::Classifying, TurnState::RoutingGeneral).is_ok());
        assert!(validate_transition(TurnState::RoutingGeneral, TurnState::Executing).is_ok());
    }

    #[test]
    fn test_error_from_every_non_terminal_state() {
        for state in [
            TurnState::Received,
            TurnState::ResolvingReferences,
            TurnState::Classifying,
            TurnState::RoutingLocation,
            TurnState::RoutingGeneral,
            TurnState::Executing,
            TurnState::Recording,
        ] {
            assert!(validate_transition(state, TurnState::Error).is_ok(), "{}", state);
        }
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_terminal_states_are_final() {
        assert!(validate_transition(TurnState::Complete, TurnState::Error).is_err());
        assert!(validate_transition(TurnState::Error, TurnState::Received).is_err());
        assert!(validate_transition(TurnState::Complete, TurnState::Received).is_err());
    }

    #[test]
    fn test_cannot_skip_classification() {
        let err = validate_transition(TurnState::ResolvingReferences, TurnState::Executing)
            .unwrap_err();
        assert_eq!(
            err,
            TurnFailure::InvalidTransition {
                from: TurnState::ResolvingReferences,
                to: TurnState::Executing
            }
        );
    }

    #[test]
    fn test_cannot_record_before_executing() {
        assert!(validate_transition(TurnState::RoutingLocation, TurnState::Recording).is_err());
    }

    // =====================================================================
    // Tracker
    // =====================================================================

    #[test]
    fn test_tracker_records_history() {
        let mut tracker = TurnTracker::new();
        tracker.advance(TurnState::ResolvingReferences).unwrap();
        tracker.advance(TurnState::Classifying).unwrap();
        assert!(tracker.advance(TurnState::Complete).is_err());
        assert_eq!(tracker.current(), TurnState::Classifying);

        tracker.fail();
        tracker.fail();
        assert_eq!(
            tracker.into_history(),
            vec![
                TurnState::Received,
                TurnState::ResolvingReferences,
                TurnState::Classifying,
                TurnState::Error
            ]
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(TurnState::RoutingLocation.to_string(), "ROUTING_LOCATION");
        assert_eq!(TurnState::Error.to_string(), "ERROR");
    }
}
