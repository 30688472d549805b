//! Reduce Context
//!
//! Tracks whether a store's reducer is currently running. While it is, the
//! store refuses to dispatch, to hand out its state, and to add or remove
//! listeners.
//!
//! # Implementation
//!
//! Each store owns one [`ReduceContext`]. Entering it returns a guard that
//! clears the flag when dropped, so the store is usable again even if the
//! reducer returned early with an error or panicked.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;

/// Per-store "reducer is running" flag.
#[derive(Debug, Default)]
pub(crate) struct ReduceContext {
    active: AtomicBool,
}

impl ReduceContext {
    /// Mark the reducer as running.
    ///
    /// Fails with [`StoreError::DispatchDuringReduce`] if it already is.
    pub(crate) fn enter(&self) -> Result<ReduceGuard<'_>, StoreError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(StoreError::DispatchDuringReduce);
        }
        Ok(ReduceGuard { context: self })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fail with `error` while the reducer is running.
    pub(crate) fn ensure_idle(&self, error: StoreError) -> Result<(), StoreError> {
        if self.is_active() {
            return Err(error);
        }
        Ok(())
    }
}

/// Guard that clears the reduce flag when dropped.
pub(crate) struct ReduceGuard<'a> {
    context: &'a ReduceContext,
}

impl Drop for ReduceGuard<'_> {
    fn drop(&mut self) {
        self.context.active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_clears_flag_on_drop() {
        let context = ReduceContext::default();
        assert!(!context.is_active());

        {
            let _guard = context.enter().unwrap();
            assert!(context.is_active());
        }

        assert!(!context.is_active());
    }

    #[test]
    fn nested_enter_is_rejected() {
        let context = ReduceContext::default();
        let _guard = context.enter().unwrap();

        assert!(matches!(context.enter(), Err(StoreError::DispatchDuringReduce)));
        // The failed attempt must not clear the outer guard's flag.
        assert!(context.is_active());
    }

    #[test]
    fn ensure_idle_reports_given_error() {
        let context = ReduceContext::default();
        assert!(context.ensure_idle(StoreError::ReadDuringReduce).is_ok());

        let _guard = context.enter().unwrap();
        assert!(matches!(
            context.ensure_idle(StoreError::ReadDuringReduce),
            Err(StoreError::ReadDuringReduce)
        ));
    }
}
