//! Units
//!
//! A unit is a descriptor for one piece of state or one computation over
//! state. Units are defined before a store exists and are shared between
//! threads as cheap `Clone` handles.
//!
//! # Kinds
//!
//! | Kind        | Handle        | Reads | Writes | Owns state |
//! |-------------|---------------|-------|--------|------------|
//! | primitive   | [`Primitive`] | yes   | yes    | yes        |
//! | composed    | [`Composed`]  | yes   | yes    | yes        |
//! | derived     | [`Derived`]   | yes   | no     | no         |
//! | proxy       | [`Proxy`]     | yes   | yes    | no         |
//! | update      | [`Update`]    | no    | yes    | no         |
//!
//! Capabilities are expressed as traits: [`Readable`] units can be read,
//! subscribed to and used as derived inputs, [`Writable`] units carry a
//! writer, and [`Composable`] units own a slice of the state tree and can be
//! nested under a [`Composed`] unit.
//!
//! # Paths
//!
//! A stateful unit's path is computed from its parent chain when needed, so
//! nesting a unit after it was defined (or after other units started
//! depending on it) takes effect everywhere at once: reads, action types and
//! reducer targeting all follow the current path.

mod naming;
mod select;
mod stateful;
mod update;

use std::fmt;
use std::sync::Arc;

pub use select::{Derived, IsEqual, Proxy};
pub use stateful::{Composed, Primitive};
pub use update::Update;

pub(crate) use naming::prefixed_type;
pub(crate) use select::SelectNode;
#[doc(hidden)]
pub use stateful::StatefulNode;

use crate::action::{Action, ActionCreator};
use crate::error::StoreError;
use crate::graph::{Dependents, UnitId, UnitKind};
use crate::pending::Selection;
use crate::store::EnhancedStore;
use crate::value::Value;

mod sealed {
    pub trait Sealed {}
}

/// Writer signature shared by proxy and update units.
pub(crate) type Writer =
    Arc<dyn Fn(&EnhancedStore, Value) -> Result<Value, StoreError> + Send + Sync>;

/// Common surface of every unit.
pub trait Unit: sealed::Sealed + Send + Sync {
    fn id(&self) -> UnitId;
    fn kind(&self) -> UnitKind;
}

/// A unit that can be read, subscribed to and used as a derived input.
pub trait Readable: Unit {
    /// Type-erased handle used for inputs and reads.
    fn selectable(&self) -> Selectable;

    /// Whether this unit depends on the whole state rather than on specific
    /// units. Subscribing to such a unit subscribes to every state change.
    fn tracks_whole_state(&self) -> bool {
        self.selectable().tracks_whole_state()
    }
}

/// A unit that carries a writer.
pub trait Writable: Unit {
    /// Run the writer against `store`.
    fn write(&self, store: &EnhancedStore, args: Value) -> Result<Value, StoreError>;
}

/// A unit that owns a slice of the state tree.
pub trait Composable: Readable {
    #[doc(hidden)]
    fn stateful_node(&self) -> &Arc<StatefulNode>;

    fn name(&self) -> &str {
        self.stateful_node().name()
    }

    fn initial_value(&self) -> &Value {
        self.stateful_node().initial()
    }

    /// Keys from the top of the state tree down to this unit.
    fn path(&self) -> Vec<String> {
        self.stateful_node()
            .path()
            .iter()
            .map(|segment| segment.to_string())
            .collect()
    }

    /// Top-level state key under which this unit's value lives.
    fn owner(&self) -> String {
        self.stateful_node().owner().to_string()
    }

    /// Current action type of this unit's own update action.
    fn action_type(&self) -> String {
        self.stateful_node().action_type()
    }

    /// Build the action that sets this unit's value.
    fn action(&self, value: impl Into<Value>) -> Action
    where
        Self: Sized,
    {
        self.stateful_node().action(value.into())
    }

    /// This unit as a reusable action creator.
    fn action_creator(&self) -> ActionCreator
    where
        Self: Sized,
    {
        let node = Arc::clone(self.stateful_node());
        Arc::new(move |value| node.action(value))
    }

    /// Read this unit's value out of a state snapshot.
    fn read_from(&self, state: &Value) -> Value {
        self.stateful_node().read(state)
    }

    /// An update unit dispatching this unit's action under a custom type.
    ///
    /// `get_value` receives the writer arguments and the unit's current value
    /// and returns the next value. The type is `<prefix>/<base_type>`, with
    /// the prefix taken from the unit's path at write time.
    fn updater<F>(&self, base_type: impl Into<String>, get_value: F) -> Update
    where
        Self: Sized,
        F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        update::stateful_updater(Arc::clone(self.stateful_node()), base_type.into(), get_value)
    }
}

/// Type-erased handle to a readable unit.
#[derive(Clone)]
pub struct Selectable {
    source: Source,
}

#[derive(Clone)]
pub(crate) enum Source {
    Stateful(Arc<StatefulNode>),
    Select(Arc<SelectNode>),
}

impl Selectable {
    pub(crate) fn stateful(node: Arc<StatefulNode>) -> Self {
        Self {
            source: Source::Stateful(node),
        }
    }

    pub(crate) fn select(node: Arc<SelectNode>) -> Self {
        Self {
            source: Source::Select(node),
        }
    }

    pub fn id(&self) -> UnitId {
        match &self.source {
            Source::Stateful(node) => node.id,
            Source::Select(node) => node.id,
        }
    }

    pub fn kind(&self) -> UnitKind {
        match &self.source {
            Source::Stateful(node) => node.kind,
            Source::Select(node) => node.kind,
        }
    }

    pub(crate) fn tracks_whole_state(&self) -> bool {
        match &self.source {
            Source::Stateful(_) => false,
            Source::Select(node) => node.tracks_whole_state(),
        }
    }

    pub(crate) fn dependents(&self) -> &Dependents<SelectNode> {
        match &self.source {
            Source::Stateful(node) => &node.dependents,
            Source::Select(node) => &node.dependents,
        }
    }

    pub(crate) fn read(&self, reader: &StateReader<'_>) -> Selection {
        match &self.source {
            Source::Stateful(node) => Selection::Ready(node.read(reader.state())),
            Source::Select(node) => node.select(reader),
        }
    }
}

impl<T: Readable + ?Sized> From<&T> for Selectable {
    fn from(unit: &T) -> Self {
        unit.selectable()
    }
}

impl fmt::Debug for Selectable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selectable")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Read access to one state snapshot, handed to unbound selectors.
pub struct StateReader<'a> {
    state: &'a Value,
    version: Option<u64>,
}

impl<'a> StateReader<'a> {
    pub(crate) fn new(state: &'a Value, version: Option<u64>) -> Self {
        Self { state, version }
    }

    /// The whole state.
    pub fn state(&self) -> &Value {
        self.state
    }

    /// The store version this snapshot belongs to, if read through a store.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Read any readable unit from this snapshot.
    pub fn select(&self, unit: &dyn Readable) -> Selection {
        unit.selectable().read(self)
    }

    /// Read a stateful unit's value from this snapshot.
    pub fn value(&self, unit: &dyn Composable) -> Value {
        unit.stateful_node().read(self.state)
    }
}

impl fmt::Debug for StateReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateReader")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
