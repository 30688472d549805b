//! Listener registries.
//!
//! Listener lists are copy-on-write: a flush takes a snapshot (`Arc` clone)
//! of the list and iterates it without holding any lock. Subscribing or
//! unsubscribing while a snapshot is alive copies the list first, so changes
//! made during a flush apply from the next flush on.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::graph::UnitId;

/// A change listener.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

type Entries = Arc<Vec<(ListenerId, Listener)>>;

fn call_all(entries: &Entries) {
    for (_, listener) in entries.iter() {
        listener();
    }
}

/// A single copy-on-write listener list.
#[derive(Default)]
pub(crate) struct ListenerList {
    entries: Mutex<Entries>,
}

impl ListenerList {
    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        Arc::make_mut(&mut *self.entries.lock()).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|(entry, _)| *entry == id) {
            Some(index) => {
                Arc::make_mut(&mut *entries).remove(index);
                true
            }
            None => false,
        }
    }

    /// Call every listener registered at the time of the call.
    pub(crate) fn notify(&self) -> usize {
        let snapshot = Arc::clone(&*self.entries.lock());
        call_all(&snapshot);
        snapshot.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Per-unit listener lists. A unit's entry is removed with its last listener.
#[derive(Default)]
pub(crate) struct UnitListeners {
    units: Mutex<HashMap<UnitId, Entries>>,
}

impl UnitListeners {
    pub(crate) fn add(&self, unit: UnitId, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        let mut units = self.units.lock();
        Arc::make_mut(units.entry(unit).or_default()).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, unit: UnitId, id: ListenerId) -> bool {
        let mut units = self.units.lock();
        let Some(entries) = units.get_mut(&unit) else {
            return false;
        };
        let Some(index) = entries.iter().position(|(entry, _)| *entry == id) else {
            return false;
        };
        Arc::make_mut(entries).remove(index);
        if entries.is_empty() {
            units.remove(&unit);
        }
        true
    }

    /// Call the listeners of `unit` registered at the time of the call.
    pub(crate) fn notify(&self, unit: UnitId) -> usize {
        let snapshot = self.units.lock().get(&unit).cloned();
        match snapshot {
            Some(entries) => {
                call_all(&entries);
                entries.len()
            }
            None => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_watched(&self, unit: UnitId) -> bool {
        self.units.lock().contains_key(&unit)
    }
}

/// Handle returned by every `subscribe` call.
#[must_use = "dropping a Subscription keeps the listener registered; call `unsubscribe` to remove it"]
pub struct Subscription {
    id: ListenerId,
    active: bool,
    remove: Box<dyn Fn() -> Result<(), StoreError> + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new<F>(id: ListenerId, remove: F) -> Self
    where
        F: Fn() -> Result<(), StoreError> + Send + Sync + 'static,
    {
        Self {
            id,
            active: true,
            remove: Box::new(remove),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the listener. Calling this again is a no-op.
    ///
    /// Fails while a reducer is running; the subscription stays active.
    pub fn unsubscribe(&mut self) -> Result<(), StoreError> {
        if !self.active {
            return Ok(());
        }
        (self.remove)()?;
        self.active = false;
        Ok(())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
