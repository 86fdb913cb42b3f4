//! Deferred, repeatable resolution: `Provider<T>` is a nullary function over
//! a fixed `(scope, key)` pair, re-run on every `get()` call.

use std::sync::Arc;

use crate::Result;
use crate::entry::{Injectable, Key};
use crate::scope::Scope;

/// A provider checks that `T` is bound at construction time, then resolves
/// it fresh (subject to `T`'s own lifecycle memoization) on every `get()`.
pub struct Provider<T: Injectable> {
    scope: Scope,
    key: Key,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Injectable> Provider<T> {
    pub(crate) fn new(scope: Scope, key: Key) -> Self {
        Self {
            scope,
            key,
            _marker: std::marker::PhantomData,
        }
    }

    /// Resolve `T` through the scope this provider was created from.
    pub fn get(&self) -> Result<Arc<T>> {
        let entry = self
            .scope
            .registrar()
            .find(&self.key)
            .ok_or_else(|| crate::DiError::unknown_type(self.key.id()))?;
        let value = self.scope.resolve_one(&entry)?;
        crate::scope::downcast::<T>(value)
    }
}

impl<T: Injectable> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            key: self.key.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}
