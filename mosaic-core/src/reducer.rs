//! Reducer Composition
//!
//! Builds the single root reducer a store runs from its stateful units and an
//! optional external reducer.
//!
//! # Routing
//!
//! - A unit action (one carrying a unit id) is applied to the target unit's
//!   owner key only. Every other top-level key keeps its identity, and an
//!   action that changes nothing returns the very same state.
//! - Any other action goes to the external reducer, if there is one. Keys it
//!   changed are merged over the state.
//!
//! On startup (no state yet) the external reducer's initial state and the
//! units' initial state are merged, the units winning on conflicting keys.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::action::Action;
use crate::error::StoreError;
use crate::graph::UnitMap;
use crate::unit::StatefulNode;
use crate::value::{Map, Value, NULL};

/// A root reducer: `(state, action) -> state`.
///
/// `None` state means the store has no state yet.
pub type Reducer = Arc<dyn Fn(Option<&Value>, &Action) -> Result<Value, StoreError> + Send + Sync>;

/// Reducer for one key of a keyed external reducer.
///
/// Returning `None` for any action is an error; return the previous state to
/// ignore an action.
pub type KeyReducer = Arc<dyn Fn(Option<&Value>, &Action) -> Option<Value> + Send + Sync>;

/// Reducer handling the non-unit part of the state.
#[derive(Clone)]
pub enum ExternalReducer {
    /// A reducer over the whole state. It must produce a map.
    Root(Reducer),
    /// One reducer per top-level key, combined with [`combine_reducers`].
    Keyed(IndexMap<String, KeyReducer>),
}

impl ExternalReducer {
    pub fn root<F>(reduce: F) -> Self
    where
        F: Fn(Option<&Value>, &Action) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        Self::Root(Arc::new(reduce))
    }

    pub fn keyed() -> Self {
        Self::Keyed(IndexMap::new())
    }

    /// Add a key reducer. Turns a root reducer into an empty keyed one first.
    pub fn with_key<F>(self, key: impl Into<String>, reduce: F) -> Self
    where
        F: Fn(Option<&Value>, &Action) -> Option<Value> + Send + Sync + 'static,
    {
        let mut reducers = match self {
            Self::Keyed(reducers) => reducers,
            Self::Root(_) => {
                tracing::warn!("replacing a root external reducer with a keyed one");
                IndexMap::new()
            }
        };
        reducers.insert(key.into(), Arc::new(reduce));
        Self::Keyed(reducers)
    }

    fn into_reducer(self) -> Reducer {
        match self {
            Self::Root(reduce) => reduce,
            Self::Keyed(reducers) => combine_reducers(reducers),
        }
    }
}

impl std::fmt::Debug for ExternalReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root(_) => f.write_str("ExternalReducer::Root"),
            Self::Keyed(reducers) => f
                .debug_tuple("ExternalReducer::Keyed")
                .field(&reducers.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Combine key reducers into one reducer over a map.
///
/// The result holds exactly the combined keys. When no key reducer changed
/// its slice, the input state itself is returned.
pub fn combine_reducers(reducers: IndexMap<String, KeyReducer>) -> Reducer {
    Arc::new(move |state: Option<&Value>, action: &Action| -> Result<Value, StoreError> {
        let previous = state.and_then(Value::as_map);
        let mut next = Map::with_capacity(reducers.len());
        let mut changed = false;

        for (key, reduce) in &reducers {
            let before = previous.and_then(|map| map.get(key));
            let after = reduce(before, action).ok_or_else(|| StoreError::UndefinedReducerState {
                key: key.clone(),
                action_type: action.kind.clone(),
            })?;
            changed |= before.map_or(true, |before| !before.is(&after));
            next.insert(key.clone(), after);
        }

        match state {
            Some(state) if !changed => Ok(state.clone()),
            _ => Ok(Value::from(next)),
        }
    })
}

/// Build the root reducer for `units` and an optional external reducer.
pub(crate) fn compose_reducer(units: Arc<UnitMap>, external: Option<ExternalReducer>) -> Reducer {
    let external = external.map(ExternalReducer::into_reducer);
    let initial = units.initial_state();

    Arc::new(move |state: Option<&Value>, action: &Action| -> Result<Value, StoreError> {
        let state = match state {
            Some(state) => fill_missing(state, &initial, action)?,
            None => {
                let state = match &external {
                    Some(reduce) => {
                        let external_initial = reduce(None, action)?;
                        ensure_map(&external_initial, action)?;
                        external_initial.merge(&initial)
                    }
                    None => initial.clone(),
                };
                if !action.is_unit_action() {
                    return Ok(state);
                }
                state
            }
        };

        if let Some(id) = action.unit_id {
            let unit = units.get(id).ok_or(StoreError::UnknownUnit { id })?;
            return Ok(reduce_unit(&state, unit, action));
        }

        match &external {
            Some(reduce) => {
                let next = reduce(Some(&state), action)?;
                merge_changed(&state, &next, action)
            }
            None => Ok(state),
        }
    })
}

fn reduce_unit(state: &Value, unit: &StatefulNode, action: &Action) -> Value {
    let owner = unit.owner();
    let before = state.get(&owner).unwrap_or(&NULL);
    let after = unit.reduce_in_owner(before, action);
    if after.is(before) {
        state.clone()
    } else {
        state.with_key(&owner, after)
    }
}

fn ensure_map(state: &Value, action: &Action) -> Result<(), StoreError> {
    if state.as_map().is_none() {
        return Err(StoreError::NonMapState {
            kind: state.kind(),
            action_type: action.kind.clone(),
        });
    }
    Ok(())
}

/// Fill top-level unit keys missing from a preloaded state.
fn fill_missing(state: &Value, initial: &Value, action: &Action) -> Result<Value, StoreError> {
    ensure_map(state, action)?;
    let Some(initial) = initial.as_map() else {
        return Ok(state.clone());
    };

    let mut filled = state.clone();
    for (key, value) in initial {
        if filled.get(key).is_none() {
            filled = filled.with_key(key, value.clone());
        }
    }
    Ok(filled)
}

/// Merge the keys of `next` that differ from `state`.
fn merge_changed(state: &Value, next: &Value, action: &Action) -> Result<Value, StoreError> {
    if next.is(state) {
        return Ok(state.clone());
    }
    ensure_map(next, action)?;

    let mut merged = state.clone();
    if let Some(next) = next.as_map() {
        for (key, value) in next {
            let unchanged = merged.get(key).is_some_and(|current| current.is(value));
            if !unchanged {
                merged = merged.with_key(key, value.clone());
            }
        }
    }
    Ok(merged)
}
