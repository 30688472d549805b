//! Graph Builder
//!
//! Wires edges when units are defined. Two kinds of edges exist:
//!
//! - Dependent edges: a derived or proxy unit registers itself with each of
//!   its inputs.
//! - Structural edges: a composed unit owns its children and each child
//!   points back at its parent.
//!
//! Dependents of ancestors and descendants are not copied onto each unit;
//! the scheduler walks the structural edges instead, so a unit nested after
//! others started depending on it needs no re-wiring.

use std::sync::Arc;

use crate::unit::{Selectable, SelectNode, StatefulNode};

/// Register `dependent` with every input, once.
pub(crate) fn register_dependent(inputs: &[Selectable], dependent: &Arc<SelectNode>) {
    for input in inputs {
        input
            .dependents()
            .insert(dependent.id, Arc::downgrade(dependent));
    }
}

/// Point every child of `parent` at it.
///
/// A unit has a single owner. Nesting a unit that already has a live parent
/// moves it; the previous parent keeps a stale child entry.
pub(crate) fn adopt_children(parent: &Arc<StatefulNode>) {
    for child in parent.children() {
        if let Some(previous) = child.set_parent(parent) {
            tracing::warn!(
                unit = child.name(),
                previous = previous.name(),
                next = parent.name(),
                "unit re-nested under a second parent; only the latest parent owns it"
            );
        }
    }
}
