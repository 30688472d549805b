//! Stateful units: primitives and composed units.
//!
//! Both own a slice of the state tree. A primitive holds a single value; a
//! composed unit's value is a map keyed by its children's names, and writes
//! to a child rebuild only the maps along the child's path.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::naming::{base_type, prefixed_type};
use super::{sealed, Composable, Readable, Selectable, Unit, Writable};
use crate::action::Action;
use crate::error::StoreError;
use crate::graph::{self, Dependents, UnitId, UnitKind};
use crate::store::EnhancedStore;
use crate::value::{Map, Value, NULL};

/// Keys from the top of the state tree to a unit.
pub(crate) type Path = SmallVec<[Arc<str>; 4]>;

/// Shared descriptor behind [`Primitive`] and [`Composed`] handles.
pub struct StatefulNode {
    pub(crate) id: UnitId,
    pub(crate) kind: UnitKind,
    name: Arc<str>,
    initial: Value,
    children: Vec<Arc<StatefulNode>>,
    parent: RwLock<Weak<StatefulNode>>,
    pub(crate) dependents: Dependents<super::SelectNode>,
}

impl StatefulNode {
    fn new(kind: UnitKind, name: Arc<str>, initial: Value, children: Vec<Arc<StatefulNode>>) -> Arc<Self> {
        Arc::new(Self {
            id: UnitId::next(),
            kind,
            name,
            initial,
            children,
            parent: RwLock::new(Weak::new()),
            dependents: Dependents::new(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn initial(&self) -> &Value {
        &self.initial
    }

    pub(crate) fn children(&self) -> &[Arc<StatefulNode>] {
        &self.children
    }

    pub(crate) fn parent(&self) -> Option<Arc<StatefulNode>> {
        self.parent.read().upgrade()
    }

    /// Point this unit at a new parent, returning the previous live one.
    pub(crate) fn set_parent(&self, parent: &Arc<StatefulNode>) -> Option<Arc<StatefulNode>> {
        let mut slot = self.parent.write();
        let previous = slot.upgrade();
        *slot = Arc::downgrade(parent);
        previous
    }

    /// Ancestors, nearest first.
    pub(crate) fn ancestors(&self) -> Vec<Arc<StatefulNode>> {
        let mut ancestors = Vec::new();
        let mut next = self.parent();
        while let Some(node) = next {
            next = node.parent();
            ancestors.push(node);
        }
        ancestors
    }

    /// Descendants in post-order: every child after its own children.
    pub(crate) fn descendants(&self) -> Vec<Arc<StatefulNode>> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants(&self, out: &mut Vec<Arc<StatefulNode>>) {
        for child in &self.children {
            child.collect_descendants(out);
            out.push(Arc::clone(child));
        }
    }

    pub(crate) fn path(&self) -> Path {
        let mut path: Path = self
            .ancestors()
            .iter()
            .rev()
            .map(|node| Arc::clone(&node.name))
            .collect();
        path.push(Arc::clone(&self.name));
        path
    }

    pub(crate) fn owner(&self) -> Arc<str> {
        self.ancestors()
            .last()
            .map_or_else(|| Arc::clone(&self.name), |root| Arc::clone(&root.name))
    }

    pub(crate) fn action_type(&self) -> String {
        prefixed_type(&self.path(), &base_type(&self.name))
    }

    pub(crate) fn action(&self, value: Value) -> Action {
        Action::for_unit(self.id, self.action_type(), value)
    }

    /// This unit's value inside a whole-state snapshot.
    pub(crate) fn read(&self, state: &Value) -> Value {
        state.get_path(&self.path()[..]).cloned().unwrap_or_default()
    }

    /// Apply an action targeting this unit to its own slice.
    ///
    /// Returns `state` itself when the action does not target this unit or
    /// carries an identical value.
    pub(crate) fn reduce(&self, state: &Value, action: &Action) -> Value {
        if action.unit_id == Some(self.id) && !state.is(&action.value) {
            action.value.clone()
        } else {
            state.clone()
        }
    }

    /// Apply an action targeting this unit to its owner's slice.
    pub(crate) fn reduce_in_owner(&self, owner_state: &Value, action: &Action) -> Value {
        let path = self.path();
        write_at(owner_state, &path[1..], &|slice| self.reduce(slice, action))
    }
}

fn write_at(state: &Value, path: &[Arc<str>], reduce: &dyn Fn(&Value) -> Value) -> Value {
    match path.split_first() {
        None => reduce(state),
        Some((key, rest)) => {
            let child = state.get(key).unwrap_or(&NULL);
            let next = write_at(child, rest, reduce);
            if next.is(child) {
                state.clone()
            } else {
                state.with_key(key, next)
            }
        }
    }
}

impl fmt::Debug for StatefulNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("children", &self.children.len())
            .finish()
    }
}

fn validate_name(branch: &'static str, name: &str) -> Result<Arc<str>, StoreError> {
    if name.is_empty() {
        return Err(StoreError::invalid(branch, "a unit name must not be empty"));
    }
    Ok(Arc::from(name))
}

/// A named leaf of state.
///
/// # Example
///
/// ```rust,ignore
/// let count = Primitive::new("count", 0)?;
/// store.set(&count, 5)?;
/// assert_eq!(store.value(&count)?, Value::from(5));
/// ```
#[derive(Clone)]
pub struct Primitive {
    node: Arc<StatefulNode>,
}

impl Primitive {
    pub fn new(name: impl AsRef<str>, initial: impl Into<Value>) -> Result<Self, StoreError> {
        let name = validate_name("primitive", name.as_ref())?;
        Ok(Self {
            node: StatefulNode::new(UnitKind::Primitive, name, initial.into(), Vec::new()),
        })
    }
}

/// A named unit whose value is a map of its children's values.
///
/// Children are nested at construction: their paths, action types and
/// reducer targeting move under this unit, including for anything that
/// already depends on them.
#[derive(Clone)]
pub struct Composed {
    node: Arc<StatefulNode>,
}

impl Composed {
    pub fn new(name: impl AsRef<str>, children: &[&dyn Composable]) -> Result<Self, StoreError> {
        let name = validate_name("composed", name.as_ref())?;

        let mut seen = IndexSet::new();
        for child in children {
            if !seen.insert(child.name()) {
                return Err(StoreError::invalid(
                    "composed",
                    format!("child name `{}` appears more than once in `{name}`", child.name()),
                ));
            }
        }

        let initial: Map = children
            .iter()
            .map(|child| (child.name().to_owned(), child.initial_value().clone()))
            .collect();
        let nodes = children
            .iter()
            .map(|child| Arc::clone(child.stateful_node()))
            .collect();

        let node = StatefulNode::new(UnitKind::Composed, name, Value::from(initial), nodes);
        graph::adopt_children(&node);
        Ok(Self { node })
    }

    /// Names of the direct children, in declaration order.
    pub fn child_names(&self) -> Vec<&str> {
        self.node.children().iter().map(|child| child.name()).collect()
    }
}

macro_rules! stateful_handle {
    ($handle:ident) => {
        impl sealed::Sealed for $handle {}

        impl Unit for $handle {
            fn id(&self) -> UnitId {
                self.node.id
            }

            fn kind(&self) -> UnitKind {
                self.node.kind
            }
        }

        impl Readable for $handle {
            fn selectable(&self) -> Selectable {
                Selectable::stateful(Arc::clone(&self.node))
            }
        }

        impl Composable for $handle {
            fn stateful_node(&self) -> &Arc<StatefulNode> {
                &self.node
            }
        }

        impl Writable for $handle {
            fn write(&self, store: &EnhancedStore, args: Value) -> Result<Value, StoreError> {
                store.dispatch(self.node.action(args)).map(|action| action.value)
            }
        }

        impl fmt::Debug for $handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.node.id)
                    .field("path", &self.node.path())
                    .finish()
            }
        }
    };
}

stateful_handle!(Primitive);
stateful_handle!(Composed);
