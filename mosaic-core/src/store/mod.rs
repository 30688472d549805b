//! Stores
//!
//! A store is built as a stack of layers, each wrapping the one below it and
//! exposing the same [`Store`] contract:
//!
//! ```text
//! middleware  ─►  user enhancers  ─►  unit layer  ─►  base store
//! (outermost)                                          (reducer)
//! ```
//!
//! - The base store owns the state, runs the reducer and notifies dispatch
//!   listeners after every dispatch.
//! - The unit layer versions the state, tracks which units were written and
//!   notifies global and per-unit listeners when the state actually changed.
//! - Enhancers and middleware wrap dispatch without knowing about units.
//!
//! [`create_store`] assembles the stack and returns an [`EnhancedStore`].

mod base;
mod configure;
mod enhancer;
mod listeners;
mod middleware;

use std::sync::Arc;

pub use base::BaseStore;
pub use configure::{create_store, EnhancedStore, StoreOptions};
pub use enhancer::{immediate_notifier, Notifier, Notify};
pub use listeners::{Listener, ListenerId, Subscription};
pub use middleware::{apply_middleware, middleware_fn, Middleware, MiddlewareApi, Next, TraceMiddleware};

use crate::action::Action;
use crate::error::StoreError;
use crate::reducer::Reducer;
use crate::value::Value;

/// The contract every store layer satisfies.
pub trait Store: Send + Sync {
    /// Run `action` through the reducer.
    fn dispatch(&self, action: Action) -> Result<Action, StoreError>;

    /// The whole state. Fails while the reducer runs.
    fn get_state(&self) -> Result<Value, StoreError>;

    /// Register a change listener. Fails while the reducer runs.
    fn subscribe(&self, listener: Listener) -> Result<Subscription, StoreError>;

    /// Whether the reducer is running right now.
    fn is_reducing(&self) -> bool;

    /// Swap the root reducer. The state is left as it is; dispatch
    /// [`REPLACE`](crate::action::REPLACE) to run the new reducer over it.
    fn replace_reducer(&self, reducer: Reducer) -> Result<(), StoreError>;
}

/// Creates a store from a root reducer and an optional preloaded state.
pub type StoreCreator =
    Box<dyn FnOnce(Reducer, Option<Value>) -> Result<Arc<dyn Store>, StoreError> + Send>;

/// Wraps a store creator, typically to wrap the store it creates.
pub type StoreEnhancer = Box<dyn FnOnce(StoreCreator) -> StoreCreator + Send>;

/// Compose enhancers right to left: the first one wraps all the others.
pub fn compose_enhancers(enhancers: Vec<StoreEnhancer>) -> StoreEnhancer {
    Box::new(move |create| {
        enhancers
            .into_iter()
            .rev()
            .fold(create, |create, enhance| enhance(create))
    })
}
