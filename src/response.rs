//! Uniform success/error value returned by every dispatch.
//!
//! Serialized as
//!
//! ```json
//! {"status":"success","payload":{"id":"m1"}}
//! {"status":"error","cause":"doTheImpossible not found"}
//! ```
//!
//! `payload` is omitted for bare successes.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ActionDefinitionError, DispatchError};

/// Why a dispatch failed.
#[derive(Debug, Error)]
pub enum ActionFailure {
    /// Routing/definition error (not found, missing routing, bad scope args).
    #[error(transparent)]
    Definition(#[from] ActionDefinitionError),

    /// Infrastructure error raised while scoping or decoding.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Error returned by the handler, unmodified.
    #[error(transparent)]
    Handler(anyhow::Error),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl ActionFailure {
    /// Definition error, if this is one.
    pub fn as_definition(&self) -> Option<&ActionDefinitionError> {
        match self {
            Self::Definition(err) => Some(err),
            Self::Dispatch(DispatchError::Definition(err)) => Some(err),
            _ => None,
        }
    }

    /// Handler error, if this is one.
    pub fn as_handler(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Handler(err) => Some(err),
            _ => None,
        }
    }
}

/// Outcome of a dispatch.
#[derive(Debug)]
pub enum ActionResponse {
    /// Handler completed; carries its return value, if any.
    Success(Option<Value>),
    /// Dispatch or handler failed.
    Error(ActionFailure),
}

impl ActionResponse {
    /// Bare success.
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success carrying a payload.
    pub fn success_with(payload: Value) -> Self {
        Self::Success(Some(payload))
    }

    /// Error response from any failure cause.
    pub fn error(cause: impl Into<ActionFailure>) -> Self {
        Self::Error(cause.into())
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success(payload) => payload.as_ref(),
            Self::Error(_) => None,
        }
    }

    pub fn cause(&self) -> Option<&ActionFailure> {
        match self {
            Self::Success(_) => None,
            Self::Error(cause) => Some(cause),
        }
    }

    /// Convert into a `Result` for `?`-style callers.
    pub fn into_result(self) -> Result<Option<Value>, ActionFailure> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Error(cause) => Err(cause),
        }
    }
}

impl From<ActionFailure> for ActionResponse {
    fn from(cause: ActionFailure) -> Self {
        Self::Error(cause)
    }
}

impl Serialize for ActionResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(payload) => {
                let len = if payload.is_some() { 2 } else { 1 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("status", "success")?;
                if let Some(payload) = payload {
                    map.serialize_entry("payload", payload)?;
                }
                map.end()
            }
            Self::Error(cause) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("cause", &cause.to_string())?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use serde_json::json;

    #[derive(Debug, Error, PartialEq)]
    #[error("column not found: {0}")]
    struct ColumnMissing(String);

    #[test]
    fn test_bare_success_serialization() {
        let json = serde_json::to_value(ActionResponse::success()).unwrap();
        assert_eq!(json, json!({"status": "success"}));
    }

    #[test]
    fn test_payload_success_serialization() {
        let response = ActionResponse::success_with(json!({"id": "m1"}));
        assert_eq!(response.payload(), Some(&json!({"id": "m1"})));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, json!({"status": "success", "payload": {"id": "m1"}}));
    }

    #[test]
    fn test_not_found_serialization() {
        let response = ActionResponse::error(ActionDefinitionError::not_found("doTheImpossible"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({"status": "error", "cause": "doTheImpossible not found"})
        );
    }

    #[test]
    fn test_handler_error_keeps_original_value() {
        let original = ColumnMissing("revenue".into());
        let response = ActionResponse::error(ActionFailure::Handler(original.into()));

        let cause = response.cause().and_then(ActionFailure::as_handler).unwrap();
        assert_eq!(
            cause.downcast_ref::<ColumnMissing>(),
            Some(&ColumnMissing("revenue".into()))
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap()["cause"],
            json!("column not found: revenue")
        );
    }

    #[test]
    fn test_definition_accessor() {
        let response = ActionResponse::error(ActionDefinitionError::MissingRouting {
            action: Action::DeleteMeasure,
        });
        assert!(matches!(
            response.cause().and_then(ActionFailure::as_definition),
            Some(ActionDefinitionError::MissingRouting { .. })
        ));

        let wrapped = ActionFailure::Dispatch(ActionDefinitionError::not_found("x").into());
        assert!(wrapped.as_definition().is_some());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ActionResponse::success().into_result().unwrap(), None);
        assert!(ActionResponse::error(ActionFailure::Panicked("boom".into()))
            .into_result()
            .is_err());
    }
}
