use serde::Serialize;
use thiserror::Error;
use waypoint_core::error::WaypointError;
use waypoint_core::types::SearchType;
use waypoint_geo::GeoError;

use crate::state_machine::TurnState;

/// Failure kinds surfaced inside a turn result.
///
/// `ResolutionFailure`, `GeoBiasUnresolved` and `ClassificationLowConfidence`
/// are non-fatal and normally appear as diagnostics. `UpstreamToolFailure`
/// fails the turn and leaves the context untouched.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnFailure {
    #[error("no recent antecedent for: {}", markers.join(", "))]
    ResolutionFailure { markers: Vec<String> },

    #[error("place not found in bias table: {token}")]
    GeoBiasUnresolved { token: String },

    #[error("no confident intent (best confidence {confidence:.2})")]
    ClassificationLowConfidence { confidence: f32 },

    #[error("tool {tool} failed: {reason}")]
    UpstreamToolFailure { tool: String, reason: String },

    #[error("{search_type} query is missing {missing}")]
    IncompleteQuery {
        search_type: SearchType,
        missing: String,
    },

    #[error("invalid utterance: {reason}")]
    InvalidUtterance { reason: String },

    #[error("invalid turn transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TurnState, to: TurnState },
}

impl TurnFailure {
    /// Failures the user can fix by rephrasing or adding detail.
    pub fn needs_clarification(&self) -> bool {
        matches!(
            self,
            TurnFailure::ResolutionFailure { .. } | TurnFailure::IncompleteQuery { .. }
        )
    }
}

/// Errors returned by the tool execution collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("tool call failed: {0}")]
    Failed(String),

    #[error("tool call timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid tool response: {0}")]
    InvalidResponse(String),

    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the advisory classifier collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisoryError {
    #[error("advisory classifier unavailable: {0}")]
    Unavailable(String),

    #[error("advisory classifier timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid advisory response: {0}")]
    InvalidResponse(String),
}

/// Errors from engine construction and administrative operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("invalid context patch: {0}")]
    InvalidPatch(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<WaypointError> for ChatError {
    fn from(err: WaypointError) -> Self {
        ChatError::Config(err.to_string())
    }
}

impl From<GeoError> for ChatError {
    fn from(err: GeoError) -> Self {
        ChatError::Config(err.to_string())
    }
}
