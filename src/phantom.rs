//! Lazy placeholders standing in for a not-yet-materialized dependency.
//!
//! A transparent property-intercepting proxy has no safe equivalent in Rust
//! without unsafe tricks or a macro. `Phantom<T>` is the idiomatic
//! substitute: a `Deref`/`DerefMut` cell that runs its resolver exactly
//! once, on first access, and is inert if never touched. `get`/`get_mut`
//! surface a real resolution failure as `Result`; `Deref`/`DerefMut`, which
//! cannot return `Result`, panic with that same error if called on a
//! phantom whose resolver failed. Callers who need to handle the failure
//! rather than unwind should call `get`/`get_mut` before dereferencing.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{DiError, Result};

enum State<T> {
    Ready(Arc<T>),
    Lazy(Box<dyn FnOnce() -> Result<Arc<T>> + Send>),
    Failed(DiError),
}

/// A placeholder for `T` that resolves on first dereference.
///
/// If the target was already materialized when the phantom was requested,
/// it holds the real instance from the start, there is no deferred step
/// left to perform.
pub struct Phantom<T: ?Sized> {
    cell: OnceCell<Arc<T>>,
    state: std::sync::Mutex<Option<State<T>>>,
}

impl<T: Send + Sync + 'static> Phantom<T> {
    pub(crate) fn ready(value: Arc<T>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Arc::clone(&value));
        Self {
            cell,
            state: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn lazy(resolve: impl FnOnce() -> Result<Arc<T>> + Send + 'static) -> Self {
        Self {
            cell: OnceCell::new(),
            state: std::sync::Mutex::new(Some(State::Lazy(Box::new(resolve)))),
        }
    }

    /// True if the underlying value has already been materialized, either
    /// because it was ready at construction or because a prior access
    /// already ran the resolver.
    pub fn is_materialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Materialize (if needed) and return the underlying value. A resolver
    /// that fails leaves the phantom unmaterialized but remembers the
    /// error, so every later call returns that same failure rather than
    /// re-running the (already consumed) resolver.
    pub fn get(&self) -> Result<&Arc<T>> {
        self.cell.get_or_try_init(|| {
            let mut guard = self.state.lock().unwrap();
            match guard.take() {
                Some(State::Ready(v)) => Ok(v),
                Some(State::Lazy(f)) => match f() {
                    Ok(v) => Ok(v),
                    Err(e) => {
                        *guard = Some(State::Failed(e.clone()));
                        Err(e)
                    }
                },
                Some(State::Failed(e)) => {
                    *guard = Some(State::Failed(e.clone()));
                    Err(e)
                }
                None => unreachable!("phantom state cleared without a ready value or cached failure"),
            }
        })
    }

    /// Materialize (if needed) and return mutable access. Fails the same
    /// way `get` does, and also fails rather than panics if the underlying
    /// value is shared with another live reference, since `T` is not
    /// required to be `Clone`.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        self.get()?;
        let arc = self.cell.get_mut().expect("materialized by get() above");
        Arc::get_mut(arc).ok_or_else(|| {
            DiError::creation_failed(
                std::any::type_name::<T>(),
                "phantom value is shared; cannot mutate through a live Arc",
            )
        })
    }
}

impl<T: Send + Sync + 'static> Deref for Phantom<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Ok(v) => v.as_ref(),
            Err(e) => panic!("phantom dependency failed to materialize: {e}"),
        }
    }
}

impl<T: Send + Sync + 'static> DerefMut for Phantom<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Ok(v) => v,
            Err(e) => panic!("phantom dependency failed to materialize: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn ready_phantom_never_calls_a_resolver() {
        let phantom = Phantom::ready(Arc::new(42u32));
        assert!(phantom.is_materialized());
        assert_eq!(*phantom, 42);
    }

    #[test]
    fn lazy_phantom_resolves_once_on_first_access() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        let phantom: Phantom<u32> = Phantom::lazy(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(7))
        });
        assert!(!phantom.is_materialized());
        assert_eq!(*phantom, 7);
        assert_eq!(*phantom, 7);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_resolution_is_returned_not_panicked() {
        let phantom: Phantom<u32> = Phantom::lazy(|| Err(crate::DiError::unknown_type("u32")));
        assert!(matches!(phantom.get(), Err(crate::DiError::UnknownType { .. })));
    }

    #[test]
    fn failed_resolution_returns_the_same_error_on_retry() {
        let phantom: Phantom<u32> = Phantom::lazy(|| Err(crate::DiError::unknown_type("u32")));
        let first = phantom.get().unwrap_err().to_string();
        let second = phantom.get().unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "phantom dependency failed to materialize")]
    fn deref_panics_with_the_real_error_on_failure() {
        let phantom: Phantom<u32> = Phantom::lazy(|| Err(crate::DiError::unknown_type("u32")));
        let _ = *phantom;
    }

    #[test]
    fn get_mut_fails_instead_of_panicking_when_shared() {
        let value = Arc::new(42u32);
        let shared = Arc::clone(&value);
        let mut phantom = Phantom::ready(value);
        assert!(phantom.get_mut().is_err());
        drop(shared);
    }

    #[test]
    fn get_mut_succeeds_when_sole_owner() {
        let mut phantom = Phantom::ready(Arc::new(42u32));
        *phantom.get_mut().unwrap() = 7;
        assert_eq!(*phantom, 7);
    }
}
