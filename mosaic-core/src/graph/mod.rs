//! Dependency Graph
//!
//! Tracks which units read which, and which units contain which.
//!
//! # Overview
//!
//! The graph is a DAG with two kinds of edges:
//!
//! - Dependent edges, from an input to each derived or proxy unit reading it
//! - Structural edges, between a composed unit and its children
//!
//! Cycles cannot be built: a unit's inputs and children must exist before
//! the unit itself is defined.
//!
//! # Design Decisions
//!
//! 1. The graph is distributed over the unit descriptors rather than held in
//!    a central table. Units exist before any store does, and one unit can
//!    be read through any number of stores.
//!
//! 2. Dependent edges are weak. A derived unit that is dropped everywhere
//!    stops being notified without explicit removal.
//!
//! 3. Transitive dependents are computed at flush time by the scheduler,
//!    walking structural edges up and down from each written unit.

mod builder;
mod node;
mod registry;
mod scheduler;

pub use node::{UnitId, UnitKind};

pub(crate) use builder::{adopt_children, register_dependent};
pub(crate) use node::Dependents;
pub(crate) use registry::UnitMap;
pub(crate) use scheduler::notification_order;
