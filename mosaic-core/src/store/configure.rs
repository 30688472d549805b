//! Store configuration and the store facade.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;

use super::base::BaseStore;
use super::enhancer::{self, immediate_notifier, Notifier, Notify, UnitStore};
use super::listeners::Subscription;
use super::middleware::{apply_middleware, Middleware};
use super::{compose_enhancers, Store, StoreEnhancer};
use crate::action::{Action, REPLACE};
use crate::error::StoreError;
use crate::graph::UnitMap;
use crate::pending::Selection;
use crate::reducer::{compose_reducer, ExternalReducer};
use crate::unit::{Composable, Readable, StatefulNode, Writable};
use crate::value::Value;

/// Everything [`create_store`] needs.
///
/// # Example
///
/// ```rust,ignore
/// let store = create_store(
///     StoreOptions::new()
///         .units(&[&user, &count])
///         .middleware(TraceMiddleware)
///         .preloaded_state(Value::map([("count", 3)])),
/// )?;
/// ```
#[derive(Default)]
pub struct StoreOptions {
    units: Vec<Arc<StatefulNode>>,
    reducer: Option<ExternalReducer>,
    preloaded_state: Option<Value>,
    middleware: Vec<Arc<dyn Middleware>>,
    enhancers: Vec<StoreEnhancer>,
    notifier: Option<Notifier>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root unit. Its descendants are included automatically.
    pub fn unit(mut self, unit: &dyn Composable) -> Self {
        self.units.push(Arc::clone(unit.stateful_node()));
        self
    }

    /// Add several root units.
    pub fn units(mut self, units: &[&dyn Composable]) -> Self {
        self.units
            .extend(units.iter().map(|unit| Arc::clone(unit.stateful_node())));
        self
    }

    /// Reducer for the part of the state not owned by units.
    pub fn reducer(mut self, reducer: ExternalReducer) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn preloaded_state(mut self, state: impl Into<Value>) -> Self {
        self.preloaded_state = Some(state.into());
        self
    }

    /// Append a middleware. Middleware run in the order they were added.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append an enhancer. Enhancers wrap the unit layer; the first one
    /// added is the outermost.
    pub fn enhancer(mut self, enhancer: StoreEnhancer) -> Self {
        self.enhancers.push(enhancer);
        self
    }

    /// Control when notifications are flushed. Defaults to
    /// [`immediate_notifier`].
    pub fn notifier<F>(mut self, notifier: F) -> Self
    where
        F: Fn(Notify) + Send + Sync + 'static,
    {
        self.notifier = Some(Arc::new(notifier));
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("units", &self.units.len())
            .field("reducer", &self.reducer)
            .field("preloaded_state", &self.preloaded_state)
            .field("middleware", &self.middleware.len())
            .field("enhancers", &self.enhancers.len())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// Create a store from `options`.
///
/// Fails if two root units share a name, if a root unit is nested inside
/// another unit, if the initial reduce fails, or if an enhancer does not
/// build on the store creator it wraps.
pub fn create_store(options: StoreOptions) -> Result<EnhancedStore, StoreError> {
    let StoreOptions {
        units,
        reducer,
        preloaded_state,
        middleware,
        enhancers: extra,
        notifier,
    } = options;

    let units = Arc::new(UnitMap::build(units)?);
    let reducer = compose_reducer(Arc::clone(&units), reducer);
    let notifier = notifier.unwrap_or_else(immediate_notifier);
    let slot = Arc::new(OnceLock::new());

    let mut enhancers = Vec::with_capacity(extra.len() + 2);
    if !middleware.is_empty() {
        enhancers.push(apply_middleware(middleware));
    }
    enhancers.extend(extra);
    enhancers.push(enhancer::enhancer(Arc::clone(&units), notifier, Arc::clone(&slot)));

    let create = compose_enhancers(enhancers)(BaseStore::creator());
    let outer = create(reducer, preloaded_state)?;
    let layer = slot.get().cloned().ok_or(StoreError::MissingUnitLayer)?;

    tracing::debug!(roots = units.roots().len(), units = units.len(), "store created");
    Ok(EnhancedStore { outer, units: layer })
}

/// Handle to a configured store.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct EnhancedStore {
    outer: Arc<dyn Store>,
    units: Arc<UnitStore>,
}

impl EnhancedStore {
    /// Dispatch through middleware and enhancers.
    pub fn dispatch(&self, action: Action) -> Result<Action, StoreError> {
        self.outer.dispatch(action)
    }

    /// The whole state.
    pub fn get_state(&self) -> Result<Value, StoreError> {
        self.outer.get_state()
    }

    /// Read any readable unit, memoized against the current version.
    pub fn select(&self, unit: &dyn Readable) -> Result<Selection, StoreError> {
        self.units.select(&unit.selectable())
    }

    /// Read a stateful unit's value.
    pub fn value(&self, unit: &dyn Composable) -> Result<Value, StoreError> {
        Ok(unit.read_from(&self.get_state()?))
    }

    /// Read a stateful unit's value into a typed representation.
    pub fn get_as<T: DeserializeOwned>(&self, unit: &dyn Composable) -> Result<T, StoreError> {
        Ok(self.value(unit)?.deserialize_into()?)
    }

    /// Number of state changes so far.
    pub fn get_version(&self) -> u64 {
        self.units.version()
    }

    /// Listen to every state change.
    pub fn subscribe<F>(&self, listener: F) -> Result<Subscription, StoreError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.outer.subscribe(Arc::new(listener))
    }

    /// Listen to every dispatch, including ones that changed nothing.
    pub fn subscribe_to_dispatch<F>(&self, listener: F) -> Result<Subscription, StoreError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.units.subscribe_to_dispatch(Arc::new(listener))
    }

    /// Listen to changes that can affect `unit`.
    pub fn subscribe_to_unit<F>(&self, unit: &dyn Readable, listener: F) -> Result<Subscription, StoreError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.units.subscribe_to_unit(&unit.selectable(), Arc::new(listener))
    }

    /// Set a stateful unit's value.
    pub fn set(&self, unit: &dyn Composable, value: impl Into<Value>) -> Result<Action, StoreError> {
        self.dispatch(unit.stateful_node().action(value.into()))
    }

    /// Set a stateful unit's value from its current one.
    pub fn update<F>(&self, unit: &dyn Composable, next: F) -> Result<Action, StoreError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let current = self.value(unit)?;
        self.set(unit, next(&current))
    }

    /// Run a writable unit's writer.
    pub fn write(&self, unit: &dyn Writable, args: impl Into<Value>) -> Result<Value, StoreError> {
        unit.write(self, args.into())
    }

    /// Whether the reducer is running right now.
    pub fn is_reducing(&self) -> bool {
        self.outer.is_reducing()
    }

    /// Replace the external reducer, keeping the units.
    ///
    /// Dispatches [`REPLACE`] through the whole stack afterwards, so keys the
    /// new reducer introduces are initialized and listeners see the change.
    pub fn replace_reducer(&self, reducer: Option<ExternalReducer>) -> Result<Action, StoreError> {
        let root = compose_reducer(Arc::clone(self.units.units()), reducer);
        self.outer.replace_reducer(root)?;
        self.dispatch(Action::new(REPLACE))
    }
}

impl fmt::Debug for EnhancedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnhancedStore")
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::{StoreCreator, TraceMiddleware};
    use crate::unit::{Composed, Primitive};

    #[test]
    fn creates_store_with_initial_state() {
        let name = Primitive::new("name", "ada").unwrap();
        let user = Composed::new("user", &[&name]).unwrap();
        let count = Primitive::new("count", 0).unwrap();

        let store = create_store(StoreOptions::new().units(&[&user, &count])).unwrap();

        assert_eq!(
            store.get_state().unwrap(),
            Value::map([("user", Value::map([("name", "ada")])), ("count", Value::from(0))])
        );
        assert_eq!(store.get_version(), 0);
    }

    #[test]
    fn set_update_and_typed_reads() {
        let count = Primitive::new("count", 1).unwrap();
        let store = create_store(StoreOptions::new().unit(&count).middleware(TraceMiddleware)).unwrap();

        store.set(&count, 4).unwrap();
        store
            .update(&count, |current| Value::from(current.as_i64().unwrap_or(0) + 1))
            .unwrap();

        assert_eq!(store.get_as::<i64>(&count).unwrap(), 5);
        assert_eq!(store.get_version(), 2);
    }

    #[test]
    fn nested_roots_are_rejected() {
        let name = Primitive::new("name", "").unwrap();
        let _user = Composed::new("user", &[&name]).unwrap();

        let error = create_store(StoreOptions::new().unit(&name)).unwrap_err();
        assert!(matches!(error, StoreError::InvalidDefinition { branch: "store", .. }));
    }

    #[test]
    fn enhancer_that_skips_the_chain_is_detected() {
        let count = Primitive::new("count", 0).unwrap();
        let detached: StoreEnhancer = Box::new(|_create: StoreCreator| BaseStore::creator());

        let error = create_store(StoreOptions::new().unit(&count).enhancer(detached)).unwrap_err();
        assert!(matches!(error, StoreError::MissingUnitLayer));
    }

    #[test]
    fn custom_notifier_receives_one_flush_per_change() {
        let count = Primitive::new("count", 0).unwrap();
        let scheduled = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&scheduled);
        let store = create_store(StoreOptions::new().unit(&count).notifier(move |notify: Notify| {
            counted.fetch_add(1, Ordering::SeqCst);
            notify();
        }))
        .unwrap();

        store.set(&count, 1).unwrap();
        store.set(&count, 1).unwrap();
        store.set(&count, 2).unwrap();

        assert_eq!(scheduled.load(Ordering::SeqCst), 2);
    }
}
