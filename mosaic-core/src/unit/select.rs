//! Derived and Proxy Units
//!
//! A derived unit is a memoized selector. A bound derived unit reads an
//! explicit list of input units; an unbound one reads the whole state.
//! A proxy unit is a derived unit that also carries a writer.
//!
//! # Memoization
//!
//! Each select node keeps the store version and root state it last computed
//! for, the input values it last saw and its last result:
//!
//! 1. A read at the same version and root state returns the cached result
//!    without touching the inputs.
//! 2. Otherwise the inputs are read. If every input is identical to the last
//!    read (SameValue, or the same pending entry) the cached result is
//!    returned and the selector is not called.
//! 3. If any input is pending, the result is a new pending value that waits
//!    for all inputs and then applies the selector.
//! 4. Otherwise the selector runs. A result equal to the cached one (by the
//!    unit's equality function) keeps the cached result, so downstream
//!    readers see a stable reference.
//!
//! A cached result that gets replaced while still pending is canceled.
//!
//! # Invariants
//!
//! - The memo lock is never held while user code (selectors, inputs) runs.
//! - The selector is called at most once per distinct set of input values.

use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use parking_lot::{Mutex, RwLock};

use super::{sealed, Readable, Selectable, StateReader, Unit, Writable, Writer};
use crate::error::StoreError;
use crate::graph::{self, Dependents, UnitId, UnitKind};
use crate::pending::{AsyncValue, Selection};
use crate::store::EnhancedStore;
use crate::value::Value;

/// Equality used to decide whether a recomputed result replaces the cache.
pub type IsEqual = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

type BoundSelector = Arc<dyn Fn(&[Value]) -> Selection + Send + Sync>;
type UnboundSelector = Arc<dyn Fn(&StateReader<'_>) -> Selection + Send + Sync>;

enum Source {
    Bound {
        inputs: Vec<Selectable>,
        select: BoundSelector,
    },
    Unbound {
        select: UnboundSelector,
    },
}

#[derive(Default)]
struct Memo {
    version: Option<u64>,
    state: Option<Value>,
    values: Option<Vec<Selection>>,
    result: Option<Selection>,
}

/// Shared descriptor behind [`Derived`] and [`Proxy`] handles.
pub(crate) struct SelectNode {
    pub(crate) id: UnitId,
    pub(crate) kind: UnitKind,
    source: Source,
    is_equal: RwLock<IsEqual>,
    memo: Mutex<Memo>,
    writer: Option<Writer>,
    whole_state: bool,
    pub(crate) dependents: Dependents<SelectNode>,
}

impl SelectNode {
    fn new(kind: UnitKind, source: Source, writer: Option<Writer>) -> Arc<Self> {
        let whole_state = match &source {
            Source::Bound { inputs, .. } => inputs.iter().any(Selectable::tracks_whole_state),
            Source::Unbound { .. } => true,
        };
        let node = Arc::new(Self {
            id: UnitId::next(),
            kind,
            source,
            is_equal: RwLock::new(Arc::new(Value::is) as IsEqual),
            memo: Mutex::new(Memo::default()),
            writer,
            whole_state,
            dependents: Dependents::new(),
        });
        if let Source::Bound { inputs, .. } = &node.source {
            graph::register_dependent(inputs, &node);
        }
        node
    }

    pub(crate) fn tracks_whole_state(&self) -> bool {
        self.whole_state
    }

    pub(crate) fn is_bound(&self) -> bool {
        matches!(self.source, Source::Bound { .. })
    }

    fn set_equality(&self, is_equal: IsEqual) {
        *self.is_equal.write() = is_equal;
    }

    fn equal(&self, previous: &Selection, next: &Selection) -> bool {
        match (previous, next) {
            (Selection::Ready(a), Selection::Ready(b)) => {
                let is_equal = Arc::clone(&self.is_equal.read());
                is_equal(a, b)
            }
            _ => previous.same(next),
        }
    }

    /// Read this unit against `reader`, memoized.
    pub(crate) fn select(&self, reader: &StateReader<'_>) -> Selection {
        {
            let mut memo = self.memo.lock();
            match reader.version() {
                Some(version) => {
                    let fresh = memo.version == Some(version)
                        && memo.state.as_ref().is_some_and(|state| state.is(reader.state()));
                    if fresh {
                        if let Some(result) = &memo.result {
                            return result.clone();
                        }
                    }
                    memo.version = Some(version);
                    memo.state = Some(reader.state().clone());
                }
                None => {
                    memo.version = None;
                    memo.state = None;
                }
            }
        }

        match &self.source {
            Source::Bound { inputs, select } => self.select_bound(inputs, select, reader),
            Source::Unbound { select } => self.select_unbound(select, reader),
        }
    }

    fn select_bound(
        &self,
        inputs: &[Selectable],
        select: &BoundSelector,
        reader: &StateReader<'_>,
    ) -> Selection {
        let values: Vec<Selection> = inputs.iter().map(|input| input.read(reader)).collect();

        let previous = {
            let mut memo = self.memo.lock();
            let changed = match &memo.values {
                None => true,
                Some(last) => {
                    last.len() != values.len()
                        || last.iter().zip(&values).any(|(a, b)| !a.same(b))
                }
            };
            memo.values = Some(values.clone());
            match (&memo.result, changed) {
                (Some(result), false) => return result.clone(),
                (result, _) => result.clone(),
            }
        };

        let next = if values.iter().any(Selection::is_async) {
            Selection::Pending(derive_async(values, Arc::clone(select)))
        } else {
            let ready: Vec<Value> = values.into_iter().filter_map(Selection::into_ready).collect();
            select(&ready)
        };

        self.replace_result(previous, next)
    }

    fn select_unbound(&self, select: &UnboundSelector, reader: &StateReader<'_>) -> Selection {
        let next = select(reader);
        let previous = self.memo.lock().result.clone();
        self.replace_result(previous, next)
    }

    fn replace_result(&self, previous: Option<Selection>, next: Selection) -> Selection {
        if let Some(previous) = previous {
            if self.equal(&previous, &next) {
                return previous;
            }
            if let Selection::Pending(stale) = &previous {
                stale.cancel();
            }
        }
        self.memo.lock().result = Some(next.clone());
        next
    }

    fn write(&self, store: &EnhancedStore, args: Value) -> Result<Value, StoreError> {
        match &self.writer {
            Some(writer) => writer(store, args),
            None => Err(StoreError::invalid(
                "derived",
                format!("unit {} has no writer", self.id),
            )),
        }
    }
}

/// Wait for every input, then apply the selector, flattening a pending
/// selector result.
///
/// If any input was canceled the selector is not called and the derived
/// entry settles like a canceled one.
fn derive_async(values: Vec<Selection>, select: BoundSelector) -> AsyncValue {
    AsyncValue::settling(async move {
        let resolved = match try_join_all(values.into_iter().map(Selection::resolve)).await {
            Ok(resolved) => resolved,
            Err(error) => return Err(error),
        };
        let Some(resolved) = resolved.into_iter().collect::<Option<Vec<Value>>>() else {
            tracing::debug!("input canceled; skipping selector");
            return Ok(None);
        };
        match select(&resolved) {
            Selection::Ready(value) => Ok(Some(value)),
            Selection::Pending(inner) => inner.await,
        }
    })
}

fn bound_source<I, F, R>(branch: &'static str, inputs: I, select: F) -> Result<Source, StoreError>
where
    I: IntoIterator,
    I::Item: Into<Selectable>,
    F: Fn(&[Value]) -> R + Send + Sync + 'static,
    R: Into<Selection>,
{
    let inputs: Vec<Selectable> = inputs.into_iter().map(Into::into).collect();
    if inputs.is_empty() {
        return Err(StoreError::invalid(
            branch,
            "a bound unit needs at least one input; use the unbound constructor to read the whole state",
        ));
    }
    Ok(Source::Bound {
        inputs,
        select: Arc::new(move |values| select(values).into()),
    })
}

fn unbound_source<F, R>(select: F) -> Source
where
    F: Fn(&StateReader<'_>) -> R + Send + Sync + 'static,
    R: Into<Selection>,
{
    Source::Unbound {
        select: Arc::new(move |reader| select(reader).into()),
    }
}

/// A memoized selector over other units or over the whole state.
///
/// # Example
///
/// ```rust,ignore
/// let greeting = Derived::bound([&name], |values| {
///     Value::from(format!("Hello, {}", values[0].as_str().unwrap_or("")))
/// })?;
/// ```
#[derive(Clone)]
pub struct Derived {
    node: Arc<SelectNode>,
}

impl Derived {
    /// Select over `inputs`; the selector receives their values in order.
    pub fn bound<I, F, R>(inputs: I, select: F) -> Result<Self, StoreError>
    where
        I: IntoIterator,
        I::Item: Into<Selectable>,
        F: Fn(&[Value]) -> R + Send + Sync + 'static,
        R: Into<Selection>,
    {
        let source = bound_source("bound derived", inputs, select)?;
        Ok(Self {
            node: SelectNode::new(UnitKind::Derived, source, None),
        })
    }

    /// Select over the whole state.
    pub fn unbound<F, R>(select: F) -> Self
    where
        F: Fn(&StateReader<'_>) -> R + Send + Sync + 'static,
        R: Into<Selection>,
    {
        Self {
            node: SelectNode::new(UnitKind::Derived, unbound_source(select), None),
        }
    }

    /// Replace the default SameValue equality.
    pub fn with_equality<E>(self, is_equal: E) -> Self
    where
        E: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.node.set_equality(Arc::new(is_equal));
        self
    }

    pub fn is_bound(&self) -> bool {
        self.node.is_bound()
    }

    /// Read from an arbitrary state snapshot, outside of any store.
    pub fn select_from(&self, state: &Value) -> Selection {
        self.node.select(&StateReader::new(state, None))
    }
}

/// A derived unit that also carries a writer.
///
/// The writer receives the store and the call arguments and may dispatch
/// any actions it likes.
#[derive(Clone)]
pub struct Proxy {
    node: Arc<SelectNode>,
}

impl Proxy {
    pub fn bound<I, F, R, W>(inputs: I, select: F, write: W) -> Result<Self, StoreError>
    where
        I: IntoIterator,
        I::Item: Into<Selectable>,
        F: Fn(&[Value]) -> R + Send + Sync + 'static,
        R: Into<Selection>,
        W: Fn(&EnhancedStore, Value) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        let source = bound_source("bound proxy", inputs, select)?;
        Ok(Self {
            node: SelectNode::new(UnitKind::Proxy, source, Some(Arc::new(write))),
        })
    }

    pub fn unbound<F, R, W>(select: F, write: W) -> Self
    where
        F: Fn(&StateReader<'_>) -> R + Send + Sync + 'static,
        R: Into<Selection>,
        W: Fn(&EnhancedStore, Value) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        Self {
            node: SelectNode::new(UnitKind::Proxy, unbound_source(select), Some(Arc::new(write))),
        }
    }

    pub fn with_equality<E>(self, is_equal: E) -> Self
    where
        E: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.node.set_equality(Arc::new(is_equal));
        self
    }

    pub fn is_bound(&self) -> bool {
        self.node.is_bound()
    }

    pub fn select_from(&self, state: &Value) -> Selection {
        self.node.select(&StateReader::new(state, None))
    }
}

macro_rules! select_handle {
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
                Selectable::select(Arc::clone(&self.node))
            }
        }

        impl fmt::Debug for $handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.node.id)
                    .field("bound", &self.node.is_bound())
                    .field("dependents", &self.node.dependents)
                    .finish()
            }
        }
    };
}

select_handle!(Derived);
select_handle!(Proxy);

impl Writable for Proxy {
    fn write(&self, store: &EnhancedStore, args: Value) -> Result<Value, StoreError> {
        self.node.write(store, args)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::AsyncError;
    use crate::unit::{Composable, Composed, Primitive};

    fn counted(calls: &Arc<AtomicUsize>) -> impl Fn(&[Value]) -> Value + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |values: &[Value]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Value::from(values[0].as_i64().unwrap_or(0) * 2)
        }
    }

    #[test]
    fn bound_requires_inputs() {
        let error = Derived::bound(Vec::<Selectable>::new(), |_| Value::Null).unwrap_err();
        assert!(error.to_string().contains("bound derived"));
    }

    #[test]
    fn registers_on_inputs() {
        let count = Primitive::new("count", 1).unwrap();
        let doubled = Derived::bound([&count], |v| v[0].clone()).unwrap();

        assert!(count.stateful_node().dependents.contains(doubled.id()));
    }

    #[test]
    fn caches_by_version() {
        let calls = Arc::new(AtomicUsize::new(0));
        let count = Primitive::new("count", 2).unwrap();
        let doubled = Derived::bound([&count], counted(&calls)).unwrap();
        let state = Value::map([("count", 2)]);

        let reader = StateReader::new(&state, Some(1));
        let first = doubled.node.select(&reader);
        let second = doubled.node.select(&reader);

        assert!(first.same(&second));
        assert_eq!(first.ready(), Some(&Value::from(4)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unchanged_inputs_skip_the_selector() {
        let calls = Arc::new(AtomicUsize::new(0));
        let count = Primitive::new("count", 2).unwrap();
        let other = Primitive::new("other", 0).unwrap();
        let _root = Composed::new("root", &[&count, &other]).unwrap();
        let doubled = Derived::bound([&count], counted(&calls)).unwrap();

        let before = Value::map([("root", Value::map([("count", 2), ("other", 0)]))]);
        let after = Value::map([("root", Value::map([("count", 2), ("other", 9)]))]);

        doubled.node.select(&StateReader::new(&before, Some(1)));
        doubled.node.select(&StateReader::new(&after, Some(2)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_equality_keeps_cached_reference() {
        let list = Primitive::new("list", Value::list([1, 2])).unwrap();
        let copy = Derived::bound([&list], |v| Value::list(v[0].as_list().unwrap_or(&[]).to_vec()))
            .unwrap()
            .with_equality(|a, b| a == b);

        let first = copy.select_from(&Value::map([("list", Value::list([1, 2]))]));
        let second = copy.select_from(&Value::map([("list", Value::list([1, 2]))]));

        assert!(first.same(&second));
    }

    #[test]
    fn default_equality_replaces_rebuilt_values() {
        let list = Primitive::new("list", Value::list([1])).unwrap();
        let copy = Derived::bound([&list], |v| Value::list(v[0].as_list().unwrap_or(&[]).to_vec())).unwrap();

        let first = copy.select_from(&Value::map([("list", Value::list([1]))]));
        let second = copy.select_from(&Value::map([("list", Value::list([1]))]));

        assert!(!first.same(&second));
    }

    #[test]
    fn unbound_reads_whole_state() {
        let keys = Derived::unbound(|reader: &StateReader<'_>| {
            Value::from(reader.state().as_map().map_or(0, |m| m.len() as i64))
        });

        assert!(!keys.is_bound());
        assert!(keys.tracks_whole_state());
        assert_eq!(keys.select_from(&Value::map([("a", 1), ("b", 2)])).ready(), Some(&Value::from(2)));
    }

    #[test]
    fn whole_state_tracking_is_inherited() {
        let everything = Derived::unbound(|reader: &StateReader<'_>| reader.state().clone());
        let downstream = Derived::bound([&everything], |v| v[0].clone()).unwrap();

        assert!(downstream.tracks_whole_state());
    }

    #[tokio::test]
    async fn pending_inputs_produce_pending_result() {
        let source = Primitive::new("source", 3).unwrap();
        let slow = Derived::bound([&source], |v| {
            let value = v[0].clone();
            AsyncValue::new(async move { Ok::<_, AsyncError>(value) })
        })
        .unwrap();
        let doubled = Derived::bound([&slow], |v| Value::from(v[0].as_i64().unwrap_or(0) * 2)).unwrap();

        let result = doubled.select_from(&Value::map([("source", 3)]));

        assert!(result.is_async());
        assert_eq!(result.resolve().await, Ok(Some(Value::from(6))));
    }
}
