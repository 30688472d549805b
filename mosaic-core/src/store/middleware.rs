//! Dispatch middleware.
//!
//! Middleware wraps `dispatch`. Each middleware receives the action and a
//! `next` continuation for the rest of the chain, and can inspect, replace,
//! swallow or multiply actions:
//!
//! ```rust,ignore
//! let stamp = middleware_fn(|_api, action, next| {
//!     next(action.with_meta(Value::map([("stamped", true)])))
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use super::listeners::{Listener, Subscription};
use super::{Store, StoreCreator, StoreEnhancer};
use crate::action::Action;
use crate::error::StoreError;
use crate::reducer::Reducer;
use crate::value::Value;

/// Continuation running the rest of a middleware chain.
pub type Next<'a> = &'a dyn Fn(Action) -> Result<Action, StoreError>;

/// One link in a dispatch chain.
pub trait Middleware: Send + Sync {
    /// Handle `action`, calling `next` to pass it on.
    fn dispatch(&self, api: &MiddlewareApi<'_>, action: Action, next: Next<'_>) -> Result<Action, StoreError>;
}

impl<T: Middleware + ?Sized> Middleware for Arc<T> {
    fn dispatch(&self, api: &MiddlewareApi<'_>, action: Action, next: Next<'_>) -> Result<Action, StoreError> {
        (**self).dispatch(api, action, next)
    }
}

/// Store access handed to middleware.
pub struct MiddlewareApi<'a> {
    store: &'a MiddlewareStore,
}

impl MiddlewareApi<'_> {
    /// Dispatch through the whole chain, starting at the first middleware.
    pub fn dispatch(&self, action: Action) -> Result<Action, StoreError> {
        self.store.dispatch(action)
    }

    pub fn get_state(&self) -> Result<Value, StoreError> {
        self.store.get_state()
    }
}

impl fmt::Debug for MiddlewareApi<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareApi")
            .field("chain", &self.store.chain.len())
            .finish()
    }
}

struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&MiddlewareApi<'_>, Action, Next<'_>) -> Result<Action, StoreError> + Send + Sync,
{
    fn dispatch(&self, api: &MiddlewareApi<'_>, action: Action, next: Next<'_>) -> Result<Action, StoreError> {
        (self.0)(api, action, next)
    }
}

/// Middleware from a closure.
pub fn middleware_fn<F>(dispatch: F) -> Arc<dyn Middleware>
where
    F: Fn(&MiddlewareApi<'_>, Action, Next<'_>) -> Result<Action, StoreError> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware(dispatch))
}

/// Logs every action passing through the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMiddleware;

impl Middleware for TraceMiddleware {
    fn dispatch(&self, _api: &MiddlewareApi<'_>, action: Action, next: Next<'_>) -> Result<Action, StoreError> {
        let kind = action.kind.clone();
        let unit = action.unit_id;
        match next(action) {
            Ok(action) => {
                tracing::debug!(action = %kind, unit = ?unit, "action dispatched");
                Ok(action)
            }
            Err(error) => {
                tracing::debug!(action = %kind, unit = ?unit, %error, "action failed");
                Err(error)
            }
        }
    }
}

struct MiddlewareStore {
    next: Arc<dyn Store>,
    chain: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStore {
    fn run(&self, index: usize, action: Action) -> Result<Action, StoreError> {
        match self.chain.get(index) {
            Some(middleware) => {
                let api = MiddlewareApi { store: self };
                middleware.dispatch(&api, action, &|action| self.run(index + 1, action))
            }
            None => self.next.dispatch(action),
        }
    }
}

impl Store for MiddlewareStore {
    fn dispatch(&self, action: Action) -> Result<Action, StoreError> {
        self.run(0, action)
    }

    fn get_state(&self) -> Result<Value, StoreError> {
        self.next.get_state()
    }

    fn subscribe(&self, listener: Listener) -> Result<Subscription, StoreError> {
        self.next.subscribe(listener)
    }

    fn is_reducing(&self) -> bool {
        self.next.is_reducing()
    }

    fn replace_reducer(&self, reducer: Reducer) -> Result<(), StoreError> {
        self.next.replace_reducer(reducer)
    }
}

/// An enhancer running `chain` in front of the store's dispatch.
///
/// The first middleware sees each action first.
pub fn apply_middleware(chain: Vec<Arc<dyn Middleware>>) -> StoreEnhancer {
    Box::new(move |create: StoreCreator| -> StoreCreator {
        Box::new(
            move |reducer: Reducer, preloaded: Option<Value>| -> Result<Arc<dyn Store>, StoreError> {
                let next = create(reducer, preloaded)?;
                Ok(Arc::new(MiddlewareStore { next, chain }))
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::store::BaseStore;

    fn echo_reducer() -> Reducer {
        Arc::new(|state: Option<&Value>, action: &Action| {
            let mut seen = state.and_then(Value::as_list).map(<[Value]>::to_vec).unwrap_or_default();
            seen.push(Value::from(action.kind.as_str()));
            Ok::<_, StoreError>(Value::list(seen))
        })
    }

    fn store_with(chain: Vec<Arc<dyn Middleware>>) -> Arc<dyn Store> {
        apply_middleware(chain)(BaseStore::creator())(echo_reducer(), None).unwrap()
    }

    #[test]
    fn chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first_log = Arc::clone(&log);
        let second_log = Arc::clone(&log);

        let store = store_with(vec![
            middleware_fn(move |_, action: Action, next: Next<'_>| {
                first_log.lock().push("first");
                next(action)
            }),
            middleware_fn(move |_, action: Action, next: Next<'_>| {
                second_log.lock().push("second");
                next(action)
            }),
        ]);

        store.dispatch(Action::new("PING")).unwrap();

        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn middleware_can_rewrite_and_swallow() {
        let store = store_with(vec![middleware_fn(
            |_, action: Action, next: Next<'_>| match action.kind.as_str() {
                "IGNORED" => Ok(action),
                "RENAMED" => next(Action::new("REWRITTEN")),
                _ => next(action),
            },
        )]);

        store.dispatch(Action::new("IGNORED")).unwrap();
        store.dispatch(Action::new("RENAMED")).unwrap();

        let state = store.get_state().unwrap();
        let kinds: Vec<&str> = state.as_list().unwrap().iter().filter_map(Value::as_str).collect();
        assert_eq!(kinds.last(), Some(&"REWRITTEN"));
        assert!(!kinds.contains(&"IGNORED"));
    }

    #[test]
    fn api_dispatch_reenters_the_chain() {
        let store = store_with(vec![
            middleware_fn(|api, action: Action, next: Next<'_>| {
                if action.kind == "DOUBLE" {
                    api.dispatch(Action::new("ONCE"))?;
                    return api.dispatch(Action::new("ONCE"));
                }
                next(action)
            }),
            Arc::new(TraceMiddleware),
        ]);

        store.dispatch(Action::new("DOUBLE")).unwrap();

        let state = store.get_state().unwrap();
        let onces = state
            .as_list()
            .unwrap()
            .iter()
            .filter(|kind| kind.as_str() == Some("ONCE"))
            .count();
        assert_eq!(onces, 2);
    }
}
