//! Pending Values
//!
//! Derived units may produce values asynchronously. A pending result is an
//! [`AsyncValue`]: a shared, cancelable cache entry wrapping a future.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──resolve──► Resolved
//!    │    ──reject───► Rejected
//!    └────cancel─────► Canceled
//! ```
//!
//! Cancellation marks the entry and nothing else: the wrapped future still
//! runs to completion when polled, but its outcome is discarded and every
//! reader observes `Ok(None)`.
//!
//! Entries are lazy. The wrapped future makes progress only while someone
//! awaits the entry (or a derived entry built on top of it).

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::AsyncError;
use crate::value::Value;

/// Outcome shared by every reader of an [`AsyncValue`].
pub type Settled = Result<Option<Value>, AsyncError>;

/// Status of an [`AsyncValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    Pending,
    Resolved,
    Rejected,
    Canceled,
}

#[derive(Debug)]
struct Entry {
    status: AsyncStatus,
    value: Option<Value>,
    error: Option<AsyncError>,
}

impl Entry {
    fn pending() -> Self {
        Self {
            status: AsyncStatus::Pending,
            value: None,
            error: None,
        }
    }
}

/// A cancelable, shared asynchronous result.
///
/// Clones refer to the same entry; identity is checked with
/// [`AsyncValue::ptr_eq`].
#[derive(Clone)]
pub struct AsyncValue {
    entry: Arc<Mutex<Entry>>,
    settled: Shared<BoxFuture<'static, Settled>>,
}

impl AsyncValue {
    /// Wrap a future in a cache entry.
    pub fn new<F>(source: F) -> Self
    where
        F: Future<Output = Result<Value, AsyncError>> + Send + 'static,
    {
        Self::settling(async move { source.await.map(Some) })
    }

    /// Wrap a future that may itself settle as canceled.
    ///
    /// An `Ok(None)` outcome cancels the entry.
    pub(crate) fn settling<F>(source: F) -> Self
    where
        F: Future<Output = Settled> + Send + 'static,
    {
        let entry = Arc::new(Mutex::new(Entry::pending()));
        let tracked = Arc::clone(&entry);

        let settled = async move {
            let outcome = source.await;
            let mut entry = tracked.lock();
            if entry.status == AsyncStatus::Canceled {
                return Ok(None);
            }
            match outcome {
                Ok(Some(value)) => {
                    entry.status = AsyncStatus::Resolved;
                    entry.value = Some(value.clone());
                    Ok(Some(value))
                }
                Ok(None) => {
                    entry.status = AsyncStatus::Canceled;
                    Ok(None)
                }
                Err(error) => {
                    entry.status = AsyncStatus::Rejected;
                    entry.error = Some(error.clone());
                    Err(error)
                }
            }
        }
        .boxed()
        .shared();

        Self { entry, settled }
    }

    /// An entry that is already resolved.
    pub fn resolved(value: Value) -> Self {
        let entry = Entry {
            status: AsyncStatus::Resolved,
            value: Some(value.clone()),
            error: None,
        };
        Self {
            entry: Arc::new(Mutex::new(entry)),
            settled: future::ready(Ok(Some(value))).boxed().shared(),
        }
    }

    /// An entry that is already rejected.
    pub fn rejected(error: AsyncError) -> Self {
        let entry = Entry {
            status: AsyncStatus::Rejected,
            value: None,
            error: Some(error.clone()),
        };
        Self {
            entry: Arc::new(Mutex::new(entry)),
            settled: future::ready(Err(error)).boxed().shared(),
        }
    }

    pub fn status(&self) -> AsyncStatus {
        self.entry.lock().status
    }

    pub fn is_pending(&self) -> bool {
        self.status() == AsyncStatus::Pending
    }

    /// Mark a pending entry as canceled.
    ///
    /// Returns false if the entry had already settled.
    pub fn cancel(&self) -> bool {
        let mut entry = self.entry.lock();
        if entry.status != AsyncStatus::Pending {
            return false;
        }
        entry.status = AsyncStatus::Canceled;
        tracing::debug!("canceled stale pending value");
        true
    }

    /// The settled outcome, without waiting.
    ///
    /// `None` while pending and after cancellation.
    pub fn peek(&self) -> Option<Result<Value, AsyncError>> {
        let entry = self.entry.lock();
        match entry.status {
            AsyncStatus::Resolved => entry.value.clone().map(Ok),
            AsyncStatus::Rejected => entry.error.clone().map(Err),
            AsyncStatus::Pending | AsyncStatus::Canceled => None,
        }
    }

    /// Wait for the entry to settle.
    pub async fn wait(&self) -> Settled {
        self.settled.clone().await
    }

    /// Whether two handles refer to the same entry.
    pub fn ptr_eq(&self, other: &AsyncValue) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl IntoFuture for AsyncValue {
    type Output = Settled;
    type IntoFuture = Shared<BoxFuture<'static, Settled>>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled
    }
}

impl fmt::Debug for AsyncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValue")
            .field("status", &self.status())
            .finish()
    }
}

/// Result of reading a readable unit.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A value available now.
    Ready(Value),
    /// A value that will be available once the entry settles.
    Pending(AsyncValue),
}

impl Selection {
    /// Identity check: SameValue for ready values, entry identity for
    /// pending ones.
    pub fn same(&self, other: &Selection) -> bool {
        match (self, other) {
            (Selection::Ready(a), Selection::Ready(b)) => a.is(b),
            (Selection::Pending(a), Selection::Pending(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn ready(&self) -> Option<&Value> {
        match self {
            Selection::Ready(value) => Some(value),
            Selection::Pending(_) => None,
        }
    }

    pub fn into_ready(self) -> Option<Value> {
        match self {
            Selection::Ready(value) => Some(value),
            Selection::Pending(_) => None,
        }
    }

    pub fn as_async(&self) -> Option<&AsyncValue> {
        match self {
            Selection::Pending(pending) => Some(pending),
            Selection::Ready(_) => None,
        }
    }

    /// True for a pending selection, regardless of the entry's status.
    pub fn is_async(&self) -> bool {
        matches!(self, Selection::Pending(_))
    }

    /// Resolve to a value, waiting if needed.
    ///
    /// A canceled entry resolves to `Ok(None)`.
    pub async fn resolve(self) -> Settled {
        match self {
            Selection::Ready(value) => Ok(Some(value)),
            Selection::Pending(pending) => pending.await,
        }
    }
}

impl From<Value> for Selection {
    fn from(value: Value) -> Self {
        Selection::Ready(value)
    }
}

impl From<AsyncValue> for Selection {
    fn from(pending: AsyncValue) -> Self {
        Selection::Pending(pending)
    }
}
