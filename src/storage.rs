//! Per-scope instance memoization.
//!
//! A single scope's own memo table; the ancestor walk needed for
//! scope-lifetime reuse lives in `Scope`'s resolution algorithm instead,
//! since that needs to consult sibling/ancestor scopes, not just one
//! storage's parent pointer.

use std::any::Any;
use std::sync::{Arc, Mutex};

use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use crate::Result;
use crate::entry::Key;

type AnyArc = Arc<dyn Any + Send + Sync>;

/// Memoized instances owned by one scope (or the root, for singleton/lazy).
pub(crate) struct InstanceStore {
    values: DashMap<Key, AnyArc, RandomState>,
    order: Mutex<Vec<Key>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self {
            values: DashMap::with_hasher(RandomState::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, key: &Key) -> Option<AnyArc> {
        self.values.get(key).map(|v| Arc::clone(&v))
    }

    /// Return the memoized value for `key`, computing and storing it with
    /// `f` on first access. `f` runs at most once per key: a second caller
    /// racing the same shard sees the already-inserted value instead of
    /// re-running the factory, which is how singleton/lazy/scope idempotence
    /// is actually enforced.
    pub fn get_or_try_insert_with(
        &self,
        key: &Key,
        f: impl FnOnce() -> Result<AnyArc>,
    ) -> Result<AnyArc> {
        match self.values.entry(key.clone()) {
            MapEntry::Occupied(o) => Ok(Arc::clone(o.get())),
            MapEntry::Vacant(v) => {
                let value = f()?;
                v.insert(Arc::clone(&value));
                self.order.lock().unwrap().push(key.clone());
                Ok(value)
            }
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove every stored instance, returning them in insertion order.
    pub fn drain_in_order(&self) -> Vec<(Key, AnyArc)> {
        let order = std::mem::take(&mut *self.order.lock().unwrap());
        order
            .into_iter()
            .filter_map(|key| self.values.remove(&key).map(|(k, v)| (k, v)))
            .collect()
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct A;

    #[test]
    fn get_or_insert_runs_factory_once() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        let store = InstanceStore::new();
        let key = Key::of::<A>();

        let make = || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(A) as AnyArc)
        };

        let first = store.get_or_try_insert_with(&key, make).unwrap();
        let second = store.get_or_try_insert_with(&key, make).unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn drain_preserves_insertion_order() {
        struct B;
        struct C;
        let store = InstanceStore::new();
        let ka = Key::of::<A>();
        let kb = Key::of::<B>();
        let kc = Key::of::<C>();

        store.get_or_try_insert_with(&ka, || Ok(Arc::new(A) as AnyArc)).unwrap();
        store.get_or_try_insert_with(&kb, || Ok(Arc::new(B) as AnyArc)).unwrap();
        store.get_or_try_insert_with(&kc, || Ok(Arc::new(C) as AnyArc)).unwrap();

        let drained = store.drain_in_order();
        let keys: Vec<_> = drained.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![ka, kb, kc]);
        assert!(store.is_empty());
    }
}
