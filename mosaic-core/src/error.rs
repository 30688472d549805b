//! Error types for unit definition, reduction and store protocol violations.

use std::sync::Arc;

use thiserror::Error;

use crate::graph::UnitId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors raised synchronously by unit constructors and store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    // === Configuration Errors ===
    /// A unit constructor was called with arguments that cannot form a valid unit.
    #[error("invalid {branch} definition: {reason}")]
    InvalidDefinition { branch: &'static str, reason: String },

    /// An enhancer did not call through to the store creator it wraps.
    #[error("the unit store layer was not created; every enhancer must call the store creator it wraps")]
    MissingUnitLayer,

    // === Graph Integrity Errors ===
    /// An action targeted a unit that is not part of the store's unit map.
    #[error("unit with id {id} not found; is this unit included in the store?")]
    UnknownUnit { id: UnitId },

    // === Protocol Errors ===
    /// `dispatch` was called while a reducer was executing.
    #[error("reducers may not dispatch actions")]
    DispatchDuringReduce,

    /// The store state was read while a reducer was executing.
    #[error("the state may not be read while the reducer is executing; the reducer has already received it as an argument")]
    ReadDuringReduce,

    /// A listener was added while a reducer was executing.
    #[error("listeners may not subscribe while the reducer is executing")]
    SubscribeDuringReduce,

    /// A listener was removed while a reducer was executing.
    #[error("listeners may not unsubscribe while the reducer is executing")]
    UnsubscribeDuringReduce,

    /// A dynamic action value was not a map.
    #[error("actions must be plain objects; received {kind}")]
    NonPlainAction { kind: &'static str },

    /// An action had an empty or missing type.
    #[error("actions may not have an undefined \"type\" property; you may have misspelled an action type")]
    MissingActionType,

    /// A keyed reducer produced no state.
    #[error("when called with an action of type \"{action_type}\", the reducer for key \"{key}\" returned undefined; return the previous state to ignore an action")]
    UndefinedReducerState { key: String, action_type: String },

    /// The external root reducer produced something other than a map.
    #[error("the external reducer must produce a map of state keys; received {kind} for action \"{action_type}\"")]
    NonMapState { kind: &'static str, action_type: String },

    // === Conversion Errors ===
    /// A state value could not be converted to or from a typed representation.
    #[error("failed to convert state value: {0}")]
    Conversion(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn invalid(branch: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            branch,
            reason: reason.into(),
        }
    }
}

/// Rejection of an asynchronous derivation.
///
/// Cloneable so that every reader of a shared pending value observes the same
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AsyncError {
    message: Arc<str>,
}

impl AsyncError {
    /// Create a rejection with the given message.
    pub fn new(message: impl AsRef<str>) -> Self {
        Self {
            message: Arc::from(message.as_ref()),
        }
    }

    /// The rejection message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<StoreError> for AsyncError {
    fn from(error: StoreError) -> Self {
        Self::new(error.to_string())
    }
}
