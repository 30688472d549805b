//! Mosaic Core
//!
//! This crate provides a dependency-aware state container built from
//! independently defined units of state. It implements:
//!
//! - Stateful units (primitives and composed units) that own slices of one
//!   state tree
//! - Derived and proxy units: memoized selectors, optionally asynchronous
//! - A dependency graph used to notify exactly the units a write can affect
//! - A layered store with middleware, enhancers and pluggable notification
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `unit`: Unit descriptors and their capability traits
//! - `graph`: Dependency edges, the unit registry and notification order
//! - `reducer`: Root reducer composition
//! - `store`: Store layers, listeners and the [`EnhancedStore`] facade
//! - `pending`: Cancelable asynchronous values produced by derived units
//!
//! # Example
//!
//! ```rust,ignore
//! use mosaic_core::{create_store, Composed, Derived, Primitive, StoreOptions, Value};
//!
//! let name = Primitive::new("name", "ada")?;
//! let age = Primitive::new("age", 36)?;
//! let user = Composed::new("user", &[&name, &age])?;
//! let greeting = Derived::bound([&name], |values| {
//!     Value::from(format!("Hello, {}", values[0].as_str().unwrap_or("")))
//! })?;
//!
//! let store = create_store(StoreOptions::new().unit(&user))?;
//! let _subscription = store.subscribe_to_unit(&greeting, || println!("greeting changed"))?;
//!
//! store.set(&name, "grace")?; // prints "greeting changed"
//! store.set(&age, 37)?;       // prints nothing
//! ```

pub mod action;
mod context;
pub mod error;
pub mod graph;
pub mod pending;
pub mod reducer;
pub mod store;
pub mod unit;
pub mod value;

pub use action::{bind_action_creator, bind_action_creators, Action, ActionCreator, BoundActionCreator, INIT, REPLACE};
pub use error::{AsyncError, Result, StoreError};
pub use graph::{UnitId, UnitKind};
pub use pending::{AsyncStatus, AsyncValue, Selection, Settled};
pub use reducer::{combine_reducers, ExternalReducer, KeyReducer, Reducer};
pub use store::{
    apply_middleware, compose_enhancers, create_store, immediate_notifier, middleware_fn, BaseStore,
    EnhancedStore, Listener, Middleware, MiddlewareApi, Notifier, Notify, Store, StoreCreator,
    StoreEnhancer, StoreOptions, Subscription, TraceMiddleware,
};
pub use unit::{
    Composable, Composed, Derived, IsEqual, Primitive, Proxy, Readable, Selectable, StateReader, Unit,
    Update, Writable,
};
pub use value::{Map, Value};
