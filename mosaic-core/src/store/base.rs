//! The bundled single-writer store at the bottom of every stack.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::listeners::{Listener, ListenerList, Subscription};
use super::{Store, StoreCreator};
use crate::action::{Action, INIT};
use crate::context::ReduceContext;
use crate::error::StoreError;
use crate::reducer::Reducer;
use crate::value::Value;

/// Holds the state and runs the reducer.
///
/// Listeners are called after every dispatch, whether or not the state
/// changed.
pub struct BaseStore {
    reducer: RwLock<Reducer>,
    state: RwLock<Option<Value>>,
    reducing: ReduceContext,
    listeners: ListenerList,
    this: Weak<BaseStore>,
}

impl BaseStore {
    /// Create a store and dispatch [`INIT`] to produce the initial state.
    pub fn create(reducer: Reducer, preloaded: Option<Value>) -> Result<Arc<Self>, StoreError> {
        let store = Arc::new_cyclic(|this| Self {
            reducer: RwLock::new(reducer),
            state: RwLock::new(preloaded),
            reducing: ReduceContext::default(),
            listeners: ListenerList::default(),
            this: this.clone(),
        });
        store.dispatch(Action::new(INIT))?;
        Ok(store)
    }

    /// A [`StoreCreator`] producing base stores.
    pub fn creator() -> StoreCreator {
        Box::new(
            |reducer: Reducer, preloaded: Option<Value>| -> Result<Arc<dyn Store>, StoreError> {
                let store = BaseStore::create(reducer, preloaded)?;
                Ok(store)
            },
        )
    }
}

impl Store for BaseStore {
    fn dispatch(&self, action: Action) -> Result<Action, StoreError> {
        action.validate()?;

        let next = {
            let _guard = self.reducing.enter()?;
            let reducer = Arc::clone(&*self.reducer.read());
            let current = self.state.read().clone();
            reducer(current.as_ref(), &action)?
        };
        *self.state.write() = Some(next);

        let listeners = self.listeners.notify();
        tracing::trace!(action = %action.kind, listeners, "dispatched");
        Ok(action)
    }

    fn get_state(&self) -> Result<Value, StoreError> {
        self.reducing.ensure_idle(StoreError::ReadDuringReduce)?;
        Ok(self.state.read().clone().unwrap_or_default())
    }

    fn subscribe(&self, listener: Listener) -> Result<Subscription, StoreError> {
        self.reducing.ensure_idle(StoreError::SubscribeDuringReduce)?;
        let id = self.listeners.add(listener);

        let this = self.this.clone();
        Ok(Subscription::new(id, move || {
            if let Some(store) = this.upgrade() {
                store.reducing.ensure_idle(StoreError::UnsubscribeDuringReduce)?;
                store.listeners.remove(id);
            }
            Ok(())
        }))
    }

    fn is_reducing(&self) -> bool {
        self.reducing.is_active()
    }

    fn replace_reducer(&self, reducer: Reducer) -> Result<(), StoreError> {
        self.reducing.ensure_idle(StoreError::DispatchDuringReduce)?;
        *self.reducer.write() = reducer;
        tracing::debug!("reducer replaced");
        Ok(())
    }
}

impl fmt::Debug for BaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseStore")
            .field("reducing", &self.reducing.is_active())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    use super::*;

    fn counter_reducer() -> Reducer {
        Arc::new(|state: Option<&Value>, action: &Action| {
            let current = state.and_then(Value::as_i64).unwrap_or(0);
            Ok::<_, StoreError>(match action.kind.as_str() {
                "INCREMENT" => Value::from(current + 1),
                _ => Value::from(current),
            })
        })
    }

    #[test]
    fn init_produces_initial_state() {
        let store = BaseStore::create(counter_reducer(), None).unwrap();
        assert_eq!(store.get_state().unwrap(), Value::from(0));

        let preloaded = BaseStore::create(counter_reducer(), Some(Value::from(4))).unwrap();
        assert_eq!(preloaded.get_state().unwrap(), Value::from(4));
    }

    #[test]
    fn listeners_fire_on_every_dispatch() {
        let store = BaseStore::create(counter_reducer(), None).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let _subscription = store
            .subscribe(Arc::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        store.dispatch(Action::new("INCREMENT")).unwrap();
        store.dispatch(Action::new("NOTHING")).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get_state().unwrap(), Value::from(1));
    }

    #[test]
    fn missing_type_is_rejected_before_reducing() {
        let store = BaseStore::create(counter_reducer(), None).unwrap();
        assert!(matches!(
            store.dispatch(Action::new("")),
            Err(StoreError::MissingActionType)
        ));
    }

    #[test]
    fn reducer_cannot_reenter_the_store() {
        let slot: Arc<OnceLock<Arc<BaseStore>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let inner = Arc::clone(&slot);
        let record = Arc::clone(&seen);
        let reducer: Reducer = Arc::new(move |state: Option<&Value>, action: &Action| {
            if action.kind == "PROBE" {
                if let Some(store) = inner.get() {
                    let mut seen = record.lock();
                    seen.push(store.get_state().err().map(|e| e.to_string()));
                    seen.push(store.dispatch(Action::new("NESTED")).err().map(|e| e.to_string()));
                    seen.push(store.subscribe(Arc::new(|| {})).err().map(|e| e.to_string()));
                }
            }
            Ok::<_, StoreError>(state.cloned().unwrap_or_default())
        });

        let store = BaseStore::create(reducer, None).unwrap();
        assert!(slot.set(Arc::clone(&store)).is_ok());
        store.dispatch(Action::new("PROBE")).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(Option::is_some));
        assert!(!store.is_reducing());
    }

    #[test]
    fn replaced_reducer_runs_from_the_next_dispatch() {
        let store = BaseStore::create(counter_reducer(), None).unwrap();
        store.dispatch(Action::new("INCREMENT")).unwrap();

        let doubling: Reducer = Arc::new(|state: Option<&Value>, action: &Action| {
            let current = state.and_then(Value::as_i64).unwrap_or(0);
            Ok::<_, StoreError>(match action.kind.as_str() {
                "INCREMENT" => Value::from(current * 2),
                _ => Value::from(current),
            })
        });
        store.replace_reducer(doubling).unwrap();
        store.dispatch(Action::new("INCREMENT")).unwrap();
        store.dispatch(Action::new("INCREMENT")).unwrap();

        assert_eq!(store.get_state().unwrap(), Value::from(4));
    }

    #[test]
    fn failed_reduce_releases_the_guard() {
        let reducer: Reducer = Arc::new(|state: Option<&Value>, action: &Action| {
            if action.kind == "FAIL" {
                return Err(StoreError::MissingActionType);
            }
            Ok(state.cloned().unwrap_or_default())
        });
        let store = BaseStore::create(reducer, None).unwrap();

        assert!(store.dispatch(Action::new("FAIL")).is_err());
        assert!(!store.is_reducing());
        assert!(store.dispatch(Action::new("OK")).is_ok());
    }
}
