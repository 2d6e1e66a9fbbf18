//! Error types for action-dispatch.

use thiserror::Error;

use crate::action::{Action, EntityType, StateType};

/// Main error type for dispatcher wiring and infrastructure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// JSON serialization/deserialization error (positional arguments).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Two groups declared the same action and the registry rejects duplicates.
    #[error("action {action} is declared by both '{existing}' and '{incoming}'")]
    DuplicateAction {
        action: Action,
        existing: &'static str,
        incoming: &'static str,
    },

    /// The entity-state lookup has no partition for the requested scope.
    #[error("no entity state for {entity_type:?}/{state_type:?}")]
    StateUnavailable {
        entity_type: EntityType,
        state_type: Option<StateType>,
    },

    /// Actions channel receiver was dropped.
    #[error("Actions channel closed")]
    ChannelClosed,

    /// Work queue task is gone.
    #[error("Work queue closed")]
    QueueClosed,

    /// Backpressure timeout - work queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Routing or definition error.
    #[error(transparent)]
    Definition(#[from] ActionDefinitionError),
}

/// Routing/definition errors surfaced as error responses.
///
/// The display text is the human-readable message returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionDefinitionError {
    /// No handler group claims the action.
    #[error("{action} not found")]
    NotFound { action: String },

    /// The owning group's routing table has no entry for the action.
    #[error("No state types defined for {action}")]
    MissingRouting { action: Action },

    /// Positional arguments do not fit the action's scoping rule.
    #[error("invalid arguments for {action}: {message}")]
    InvalidArguments { action: Action, message: String },

    /// The owning group was never attached to a dispatcher.
    #[error("group '{group}' is not attached to a dispatcher")]
    Detached { group: &'static str },
}

impl ActionDefinitionError {
    /// Creates a not-found error for a raw action name.
    pub fn not_found(action: impl Into<String>) -> Self {
        Self::NotFound {
            action: action.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(action: Action, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            action,
            message: message.into(),
        }
    }
}

/// Result type alias using DispatchError.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = ActionDefinitionError::not_found("doTheImpossible");
        assert_eq!(err.to_string(), "doTheImpossible not found");
    }

    #[test]
    fn test_missing_routing_message() {
        let err = ActionDefinitionError::MissingRouting {
            action: Action::AddNewMeasure,
        };
        assert_eq!(err.to_string(), "No state types defined for addNewMeasure");
    }

    #[test]
    fn test_definition_is_transparent() {
        let err: DispatchError = ActionDefinitionError::not_found("x").into();
        assert_eq!(err.to_string(), "x not found");
    }
}
