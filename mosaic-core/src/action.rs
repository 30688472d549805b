//! Actions and action creators.
//!
//! An action is a plain record with a string `type`. Actions produced by
//! stateful units also carry the target `unit_id` and the new `value`.
//!
//! The wire shape is:
//!
//! ```text
//! { "type": "user/UPDATE_NAME", "unitId": 12, "value": "ada", "meta": {...} }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::graph::UnitId;
use crate::store::EnhancedStore;
use crate::value::Value;

/// Type of the action dispatched once when a store is created.
pub const INIT: &str = "@@mosaic/INIT";

/// Type of the action dispatched after the root reducer is replaced.
pub const REPLACE: &str = "@@mosaic/REPLACE";

/// A dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "unitId", default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Action {
    /// An action with the given type and no payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            unit_id: None,
            value: Value::Null,
            meta: None,
        }
    }

    pub(crate) fn for_unit(id: UnitId, kind: String, value: Value) -> Self {
        Self {
            kind,
            unit_id: Some(id),
            value,
            meta: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Whether this action targets a stateful unit.
    pub fn is_unit_action(&self) -> bool {
        self.unit_id.is_some()
    }

    /// Check the action can be dispatched.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.kind.is_empty() {
            return Err(StoreError::MissingActionType);
        }
        Ok(())
    }

    /// Parse an action from its wire shape.
    pub fn from_value(value: &Value) -> Result<Self, StoreError> {
        let map = value.as_map().ok_or(StoreError::NonPlainAction {
            kind: value.kind(),
        })?;

        let kind = match map.get("type") {
            None | Some(Value::Null) => return Err(StoreError::MissingActionType),
            Some(Value::String(kind)) => kind.to_string(),
            Some(other) => other.to_string(),
        };
        let unit_id = map
            .get("unitId")
            .and_then(Value::as_i64)
            .and_then(|id| u64::try_from(id).ok())
            .map(UnitId::from);

        let action = Self {
            kind,
            unit_id,
            value: map.get("value").cloned().unwrap_or_default(),
            meta: map.get("meta").cloned(),
        };
        action.validate()?;
        Ok(action)
    }

    /// Render the wire shape.
    pub fn to_value(&self) -> Value {
        let mut map = IndexMap::new();
        map.insert("type".to_owned(), Value::from(self.kind.as_str()));
        if let Some(id) = self.unit_id {
            map.insert("unitId".to_owned(), Value::Int(id.raw() as i64));
        }
        if !self.value.is_null() {
            map.insert("value".to_owned(), self.value.clone());
        }
        if let Some(meta) = &self.meta {
            map.insert("meta".to_owned(), meta.clone());
        }
        Value::from(map)
    }
}

/// Builds an action from a payload.
pub type ActionCreator = Arc<dyn Fn(Value) -> Action + Send + Sync>;

/// Dispatches the action built from a payload.
pub type BoundActionCreator = Arc<dyn Fn(Value) -> Result<Action, StoreError> + Send + Sync>;

/// Bind an action creator to `store`, so calling it dispatches.
pub fn bind_action_creator(creator: ActionCreator, store: &EnhancedStore) -> BoundActionCreator {
    let store = store.clone();
    Arc::new(move |payload| store.dispatch(creator(payload)))
}

/// Bind every action creator in `creators` to `store`.
pub fn bind_action_creators<K>(
    creators: IndexMap<K, ActionCreator>,
    store: &EnhancedStore,
) -> IndexMap<K, BoundActionCreator>
where
    K: std::hash::Hash + Eq,
{
    creators
        .into_iter()
        .map(|(key, creator)| (key, bind_action_creator(creator, store)))
        .collect()
}
