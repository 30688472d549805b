//! Unit Layer
//!
//! The store layer that knows about units. It wraps the store below it and
//! adds a state version, per-unit subscriptions and minimal notification.
//!
//! # Dispatch
//!
//! 1. Read the state, dispatch to the wrapped store, read the state again.
//! 2. Same state reference: nothing changed, nobody is notified.
//! 3. Otherwise record the written unit (for unit actions), bump the version
//!    once and hand one flush to the notifier.
//!
//! # Flush
//!
//! Global listeners run first. Then every unit in the notification order of
//! the units written since the last flush has its listeners called. Units
//! written between scheduling and flushing are part of the same flush, so a
//! notifier that coalesces flushes never drops a notification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::listeners::{Listener, ListenerList, Subscription, UnitListeners};
use super::{Store, StoreCreator, StoreEnhancer};
use crate::action::Action;
use crate::error::StoreError;
use crate::graph::{notification_order, UnitMap};
use crate::pending::Selection;
use crate::reducer::Reducer;
use crate::unit::{Selectable, StateReader, StatefulNode};
use crate::value::Value;

/// A scheduled flush.
pub type Notify = Box<dyn FnOnce() + Send>;

/// Decides when a scheduled flush runs.
///
/// Called exactly once per state-changing dispatch. It may run the flush
/// immediately, later, or drop all but the last of several flushes.
pub type Notifier = Arc<dyn Fn(Notify) + Send + Sync>;

/// A notifier that flushes synchronously, inside `dispatch`.
pub fn immediate_notifier() -> Notifier {
    Arc::new(|notify: Notify| notify())
}

pub(crate) struct UnitStore {
    next: Arc<dyn Store>,
    units: Arc<UnitMap>,
    notifier: Notifier,
    version: AtomicU64,
    written: Mutex<Vec<Arc<StatefulNode>>>,
    listeners: ListenerList,
    unit_listeners: UnitListeners,
    this: Weak<UnitStore>,
}

impl UnitStore {
    fn new(next: Arc<dyn Store>, units: Arc<UnitMap>, notifier: Notifier) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            next,
            units,
            notifier,
            version: AtomicU64::new(0),
            written: Mutex::new(Vec::new()),
            listeners: ListenerList::default(),
            unit_listeners: UnitListeners::default(),
            this: this.clone(),
        })
    }

    pub(crate) fn units(&self) -> &Arc<UnitMap> {
        &self.units
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Read a unit against the current state and version.
    pub(crate) fn select(&self, unit: &Selectable) -> Result<Selection, StoreError> {
        let state = self.next.get_state()?;
        let reader = StateReader::new(&state, Some(self.version()));
        Ok(unit.read(&reader))
    }

    /// Listen to changes of one unit.
    ///
    /// Units that track the whole state are notified on every state change.
    pub(crate) fn subscribe_to_unit(
        &self,
        unit: &Selectable,
        listener: Listener,
    ) -> Result<Subscription, StoreError> {
        if unit.tracks_whole_state() {
            return self.subscribe(listener);
        }
        self.ensure_idle(StoreError::SubscribeDuringReduce)?;

        let unit_id = unit.id();
        let id = self.unit_listeners.add(unit_id, listener);
        let this = self.this.clone();
        Ok(Subscription::new(id, move || {
            if let Some(store) = this.upgrade() {
                store.ensure_idle(StoreError::UnsubscribeDuringReduce)?;
                store.unit_listeners.remove(unit_id, id);
            }
            Ok(())
        }))
    }

    /// Listen to every dispatch, whether or not the state changed.
    pub(crate) fn subscribe_to_dispatch(&self, listener: Listener) -> Result<Subscription, StoreError> {
        self.next.subscribe(listener)
    }

    fn ensure_idle(&self, error: StoreError) -> Result<(), StoreError> {
        if self.next.is_reducing() {
            return Err(error);
        }
        Ok(())
    }

    fn record_write(&self, action: &Action) -> Result<(), StoreError> {
        let Some(id) = action.unit_id else {
            return Ok(());
        };
        let unit = self.units.get(id).ok_or(StoreError::UnknownUnit { id })?;

        let mut written = self.written.lock();
        if !written.iter().any(|entry| entry.id == id) {
            written.push(Arc::clone(unit));
        }
        Ok(())
    }

    fn schedule_flush(&self) {
        let this = self.this.clone();
        (self.notifier)(Box::new(move || {
            if let Some(store) = this.upgrade() {
                store.flush();
            }
        }));
    }

    fn flush(&self) {
        let written = std::mem::take(&mut *self.written.lock());
        let global = self.listeners.notify();
        if written.is_empty() {
            tracing::trace!(global, "flushed global listeners");
            return;
        }

        let order = notification_order(&written);
        let mut notified = 0;
        for unit in &order {
            notified += self.unit_listeners.notify(*unit);
        }
        tracing::trace!(global, units = order.len(), notified, "flushed");
    }
}

impl Store for UnitStore {
    fn dispatch(&self, action: Action) -> Result<Action, StoreError> {
        self.ensure_idle(StoreError::DispatchDuringReduce)?;

        let previous = self.next.get_state()?;
        let action = self.next.dispatch(action)?;
        let current = self.next.get_state()?;

        if previous.is(&current) {
            return Ok(action);
        }

        self.record_write(&action)?;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(version, action = %action.kind, "state changed");

        self.schedule_flush();
        Ok(action)
    }

    fn get_state(&self) -> Result<Value, StoreError> {
        self.next.get_state()
    }

    fn subscribe(&self, listener: Listener) -> Result<Subscription, StoreError> {
        self.ensure_idle(StoreError::SubscribeDuringReduce)?;

        let id = self.listeners.add(listener);
        let this = self.this.clone();
        Ok(Subscription::new(id, move || {
            if let Some(store) = this.upgrade() {
                store.ensure_idle(StoreError::UnsubscribeDuringReduce)?;
                store.listeners.remove(id);
            }
            Ok(())
        }))
    }

    fn is_reducing(&self) -> bool {
        self.next.is_reducing()
    }

    fn replace_reducer(&self, reducer: Reducer) -> Result<(), StoreError> {
        self.next.replace_reducer(reducer)
    }
}

impl fmt::Debug for UnitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitStore")
            .field("version", &self.version())
            .field("units", &self.units.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// The enhancer installing the unit layer.
///
/// The created layer is published through `slot` so the store facade can
/// reach it under any enhancers wrapped around it.
pub(crate) fn enhancer(
    units: Arc<UnitMap>,
    notifier: Notifier,
    slot: Arc<OnceLock<Arc<UnitStore>>>,
) -> StoreEnhancer {
    Box::new(move |create: StoreCreator| -> StoreCreator {
        Box::new(
            move |reducer: Reducer, preloaded: Option<Value>| -> Result<Arc<dyn Store>, StoreError> {
                let next = create(reducer, preloaded)?;
                let store = UnitStore::new(next, units, notifier);
                if slot.set(Arc::clone(&store)).is_err() {
                    tracing::warn!("unit layer created twice; keeping the first one");
                }
                Ok(store)
            },
        )
    })
}
