//! Notification Scheduler
//!
//! Decides which units must be told about a batch of writes, and in what
//! order.
//!
//! # Algorithm
//!
//! For every stateful unit written since the last flush:
//!
//! 1. Visit its descendants, children before their parents (a composed
//!    value replaced wholesale may change every leaf under it)
//! 2. Visit the unit itself
//! 3. Visit its ancestors, nearest first (their values were rebuilt)
//!
//! Visiting a unit enqueues it and then, recursively, every derived or proxy
//! unit registered as its dependent.
//!
//! The queue is duplicate-free and enqueueing an id that is already present
//! moves it to the back. A dependent is therefore always flushed after every
//! unit it reads that is part of the same batch.
//!
//! Units outside the written unit's line (siblings, cousins) are never
//! visited, so a derived unit reading only a sibling is not notified.

use std::sync::Arc;

use indexmap::IndexSet;

use super::UnitId;
use crate::unit::{SelectNode, StatefulNode};

/// Ordered, duplicate-free queue where re-enqueueing moves an id to the back.
#[derive(Debug, Default)]
pub(crate) struct NotifyQueue {
    order: IndexSet<UnitId>,
}

impl NotifyQueue {
    pub(crate) fn push(&mut self, id: UnitId) {
        self.order.shift_remove(&id);
        self.order.insert(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn into_vec(self) -> Vec<UnitId> {
        self.order.into_iter().collect()
    }
}

/// Ids to notify for a batch of written units, in flush order.
pub(crate) fn notification_order(written: &[Arc<StatefulNode>]) -> Vec<UnitId> {
    let mut queue = NotifyQueue::default();

    for unit in written {
        for descendant in unit.descendants() {
            visit_stateful(&mut queue, &descendant);
        }
        visit_stateful(&mut queue, unit);
        for ancestor in unit.ancestors() {
            visit_stateful(&mut queue, &ancestor);
        }
    }

    tracing::trace!(written = written.len(), units = queue.len(), "notification order computed");
    queue.into_vec()
}

fn visit_stateful(queue: &mut NotifyQueue, unit: &StatefulNode) {
    queue.push(unit.id);
    for dependent in unit.dependents.live() {
        visit_select(queue, &dependent);
    }
}

fn visit_select(queue: &mut NotifyQueue, unit: &SelectNode) {
    queue.push(unit.id);
    for dependent in unit.dependents.live() {
        visit_select(queue, &dependent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Composable, Composed, Derived, Primitive, Readable, Unit};

    fn position(order: &[UnitId], id: UnitId) -> usize {
        order.iter().position(|&entry| entry == id).unwrap()
    }

    #[test]
    fn queue_moves_repeated_ids_to_the_back() {
        let (a, b, c) = (UnitId::from(1), UnitId::from(2), UnitId::from(3));
        let mut queue = NotifyQueue::default();

        queue.push(a);
        queue.push(b);
        queue.push(c);
        queue.push(a);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.into_vec(), vec![b, c, a]);
    }

    #[test]
    fn chain_is_flushed_in_dependency_order() {
        let source = Primitive::new("source", 0).unwrap();
        let first = Derived::bound([&source], |v| v[0].clone()).unwrap();
        let second = Derived::bound([&first], |v| v[0].clone()).unwrap();

        let order = notification_order(&[Arc::clone(source.stateful_node())]);

        assert_eq!(order, vec![source.id(), first.id(), second.id()]);
    }

    #[test]
    fn diamond_flushes_join_last() {
        let source = Primitive::new("source", 0).unwrap();
        let left = Derived::bound([&source], |v| v[0].clone()).unwrap();
        let right = Derived::bound([&source], |v| v[0].clone()).unwrap();
        let join = Derived::bound([left.selectable(), right.selectable()], |v| v[0].clone()).unwrap();

        let order = notification_order(&[Arc::clone(source.stateful_node())]);

        assert_eq!(order.len(), 4);
        assert!(position(&order, join.id()) > position(&order, left.id()));
        assert!(position(&order, join.id()) > position(&order, right.id()));
    }

    #[test]
    fn leaf_write_reaches_ancestors_but_not_siblings() {
        let name = Primitive::new("name", "").unwrap();
        let age = Primitive::new("age", 0).unwrap();
        let user = Composed::new("user", &[&name, &age]).unwrap();
        let greeting = Derived::bound([&name], |v| v[0].clone()).unwrap();
        let summary = Derived::bound([&user], |v| v[0].clone()).unwrap();

        let order = notification_order(&[Arc::clone(age.stateful_node())]);

        assert_eq!(order, vec![age.id(), user.id(), summary.id()]);
        assert!(!order.contains(&greeting.id()));
        assert!(!order.contains(&name.id()));
    }

    #[test]
    fn composed_write_reaches_descendants_first() {
        let name = Primitive::new("name", "").unwrap();
        let user = Composed::new("user", &[&name]).unwrap();
        let greeting = Derived::bound([&name], |v| v[0].clone()).unwrap();

        let order = notification_order(&[Arc::clone(user.stateful_node())]);

        assert_eq!(order, vec![name.id(), greeting.id(), user.id()]);
    }

    #[test]
    fn batch_is_the_union_of_written_units() {
        let a = Primitive::new("a", 0).unwrap();
        let b = Primitive::new("b", 0).unwrap();
        let both = Derived::bound([&a, &b], |v| v[0].clone()).unwrap();

        let order = notification_order(&[
            Arc::clone(a.stateful_node()),
            Arc::clone(b.stateful_node()),
        ]);

        assert_eq!(order, vec![a.id(), b.id(), both.id()]);
    }
}
