//! Graph Nodes
//!
//! Identity, classification and dependent edges for the units that live in
//! the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Unique identifier for a unit in the dependency graph.
///
/// Ids are allocated from a process-wide counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(u64);

impl UnitId {
    /// Generate a new unique unit ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for UnitId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of unit in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A named leaf holding a value. Roots of the data, sources of change.
    Primitive,

    /// A named unit whose value is a map of its children's values.
    Composed,

    /// A memoized selector over other units or over the whole state.
    Derived,

    /// A derived unit that also carries a writer.
    Proxy,

    /// A write-only unit.
    Update,
}

impl UnitKind {
    /// Owns a slice of the state tree.
    pub fn is_stateful(self) -> bool {
        matches!(self, UnitKind::Primitive | UnitKind::Composed)
    }

    /// Can be read, subscribed to and used as a derived input.
    pub fn is_selectable(self) -> bool {
        !matches!(self, UnitKind::Update)
    }

    /// Has a writer.
    pub fn is_updateable(self) -> bool {
        !matches!(self, UnitKind::Derived)
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitKind::Primitive => "primitive",
            UnitKind::Composed => "composed",
            UnitKind::Derived => "derived",
            UnitKind::Proxy => "proxy",
            UnitKind::Update => "update",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Units that read from a node.
///
/// Insertion-ordered and duplicate-free. Entries are held weakly so a
/// dependent that is no longer referenced anywhere drops out of the graph.
pub(crate) struct Dependents<T> {
    entries: RwLock<IndexMap<UnitId, Weak<T>>>,
}

impl<T> Dependents<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Register a dependent. Returns false if it was already present.
    ///
    /// Entries whose dependent has been dropped are pruned first.
    pub(crate) fn insert(&self, id: UnitId, dependent: Weak<T>) -> bool {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.strong_count() > 0);
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, dependent);
        true
    }

    /// Live dependents in registration order.
    pub(crate) fn live(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn ids(&self) -> Vec<UnitId> {
        self.entries.read().keys().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: UnitId) -> bool {
        self.entries.read().contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl<T> Default for Dependents<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Dependents<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
