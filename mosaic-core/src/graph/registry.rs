//! Unit Registry
//!
//! The set of stateful units a store was created with, indexed by id.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::UnitId;
use crate::error::StoreError;
use crate::unit::StatefulNode;
use crate::value::{Map, Value};

/// Every stateful unit reachable from a store's root units.
///
/// Captured when the store is created. Units nested afterwards are not
/// known to the store.
#[derive(Debug)]
pub(crate) struct UnitMap {
    roots: Vec<Arc<StatefulNode>>,
    units: IndexMap<UnitId, Arc<StatefulNode>>,
}

impl UnitMap {
    /// Index `roots` and all of their descendants.
    ///
    /// Roots must have distinct names and must not be nested inside another
    /// composed unit.
    pub(crate) fn build(roots: Vec<Arc<StatefulNode>>) -> Result<Self, StoreError> {
        let mut names = IndexSet::new();
        let mut units = IndexMap::new();

        for root in &roots {
            if root.parent().is_some() {
                return Err(StoreError::invalid(
                    "store",
                    format!(
                        "unit `{}` is nested inside `{}`; register the outermost unit instead",
                        root.name(),
                        root.owner()
                    ),
                ));
            }
            if !names.insert(root.name().to_owned()) {
                return Err(StoreError::invalid(
                    "store",
                    format!("two root units are named `{}`", root.name()),
                ));
            }
            units.insert(root.id, Arc::clone(root));
            for descendant in root.descendants() {
                units.insert(descendant.id, descendant);
            }
        }

        Ok(Self { roots, units })
    }

    pub(crate) fn get(&self, id: UnitId) -> Option<&Arc<StatefulNode>> {
        self.units.get(&id)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.units.len()
    }

    pub(crate) fn roots(&self) -> &[Arc<StatefulNode>] {
        &self.roots
    }

    /// Top-level state built from every root's initial value.
    pub(crate) fn initial_state(&self) -> Value {
        let map: Map = self
            .roots
            .iter()
            .map(|root| (root.name().to_owned(), root.initial().clone()))
            .collect();
        Value::from(map)
    }
}
