//! Update units: write-only handles around a writer function.

use std::fmt;
use std::sync::Arc;

use super::{prefixed_type, sealed, StatefulNode, Unit, Writable, Writer};
use crate::error::StoreError;
use crate::graph::{UnitId, UnitKind};
use crate::store::EnhancedStore;
use crate::value::Value;

/// A write-only unit.
///
/// The writer receives the store and the call arguments. It can read any
/// unit and dispatch any number of actions.
#[derive(Clone)]
pub struct Update {
    id: UnitId,
    writer: Writer,
}

impl Update {
    pub fn new<W>(write: W) -> Self
    where
        W: Fn(&EnhancedStore, Value) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        Self {
            id: UnitId::next(),
            writer: Arc::new(write),
        }
    }
}

impl sealed::Sealed for Update {}

impl Unit for Update {
    fn id(&self) -> UnitId {
        self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Update
    }
}

impl Writable for Update {
    fn write(&self, store: &EnhancedStore, args: Value) -> Result<Value, StoreError> {
        (self.writer)(store, args)
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update").field("id", &self.id).finish()
    }
}

pub(super) fn stateful_updater<F>(node: Arc<StatefulNode>, base_type: String, get_value: F) -> Update
where
    F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
{
    Update::new(move |store, args| {
        let current = node.read(&store.get_state()?);
        let next = get_value(args, &current);
        let mut action = node.action(next);
        action.kind = prefixed_type(&node.path(), &base_type);
        store.dispatch(action).map(|action| action.value)
    })
}
