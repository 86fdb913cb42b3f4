//! The binding table: a mutable, builder-owned `Registrar` that accumulates
//! bindings under a conflict policy, and the `FrozenRegistrar` read-only view
//! produced once `build()` seals it.
//!
//! A `DashMap` + `ahash` backed table, keyed by `Key` rather than bare
//! `TypeId` so named bindings coexist with unnamed ones, that also tracks
//! registration order (for `get_all`/singleton-materialization ordering)
//! and an alias redirection table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ahash::RandomState;
use dashmap::DashMap;

use crate::entry::{ConflictPolicy, Entry, Key};
use crate::{DiError, Result};

/// A bucket at one binding id: either a single entry, or, once an `append`
/// conflict has promoted it, an insertion-ordered multi-binding.
#[derive(Clone)]
enum EntryBucket {
    Single(Arc<Entry>),
    Multi(Vec<Arc<Entry>>),
}

impl EntryBucket {
    fn first(&self) -> Arc<Entry> {
        match self {
            EntryBucket::Single(e) => Arc::clone(e),
            EntryBucket::Multi(v) => Arc::clone(&v[0]),
        }
    }

    fn all(&self) -> Vec<Arc<Entry>> {
        match self {
            EntryBucket::Single(e) => vec![Arc::clone(e)],
            EntryBucket::Multi(v) => v.clone(),
        }
    }

    fn push(&mut self, entry: Arc<Entry>) {
        match self {
            EntryBucket::Single(existing) => {
                *self = EntryBucket::Multi(vec![Arc::clone(existing), entry]);
            }
            EntryBucket::Multi(v) => v.push(entry),
        }
    }
}

/// Mutable, builder-time binding table.
pub(crate) struct Registrar {
    entries: DashMap<Key, (ConflictPolicy, EntryBucket), RandomState>,
    aliases: DashMap<Key, Key, RandomState>,
    key_order: Mutex<Vec<Key>>,
}

impl Registrar {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            aliases: DashMap::with_hasher(RandomState::new()),
            key_order: Mutex::new(Vec::new()),
        }
    }

    /// Register `entry` under `policy` (see DESIGN.md for the resolved
    /// edge case: once an id holds an `append` bucket, every later
    /// registration at that id must itself be `append`).
    pub fn register(&self, entry: Entry, policy: ConflictPolicy) -> Result<()> {
        let key = entry.key().clone();
        let entry = Arc::new(entry);

        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(key.clone(), (policy, EntryBucket::Single(entry)));
                self.key_order.lock().unwrap().push(key);
                Ok(())
            }
            Some(mut existing) => {
                let (existing_policy, bucket) = existing.value_mut();
                if *existing_policy == ConflictPolicy::Append {
                    if policy != ConflictPolicy::Append {
                        return Err(DiError::binding_conflict(
                            key.id(),
                            "id already holds an appended multi-binding; later registrations must also use 'append'",
                        ));
                    }
                    bucket.push(entry);
                    return Ok(());
                }

                match policy {
                    ConflictPolicy::Throw => Err(DiError::binding_conflict(
                        key.id(),
                        "duplicate binding under the default 'throw' policy",
                    )),
                    ConflictPolicy::Keep => Ok(()),
                    ConflictPolicy::Replace => {
                        *existing_policy = policy;
                        *bucket = EntryBucket::Single(entry);
                        Ok(())
                    }
                    ConflictPolicy::Append => {
                        *existing_policy = policy;
                        bucket.push(entry);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Register an alias redirecting `from` to `to`. Rejects the
    /// registration if it would close a cycle in the alias chain.
    pub fn register_alias(&self, from: Key, to: Key, policy: ConflictPolicy) -> Result<()> {
        if self.would_cycle(&from, &to) {
            return Err(DiError::binding_conflict(
                from.id(),
                format!("alias to '{}' would form a cycle", to.id()),
            ));
        }

        if self.aliases.contains_key(&from) {
            match policy {
                ConflictPolicy::Throw => {
                    return Err(DiError::binding_conflict(
                        from.id(),
                        "duplicate alias under the default 'throw' policy",
                    ));
                }
                ConflictPolicy::Keep => return Ok(()),
                ConflictPolicy::Replace | ConflictPolicy::Append => {}
            }
        }
        self.aliases.insert(from, to);
        Ok(())
    }

    fn would_cycle(&self, from: &Key, to: &Key) -> bool {
        let mut current = to.clone();
        let mut steps = 0usize;
        loop {
            if &current == from {
                return true;
            }
            match self.aliases.get(&current) {
                Some(next) => {
                    current = next.clone();
                    steps += 1;
                    if steps > self.aliases.len() + 1 {
                        // Defensive bound; a well-formed table can't reach this.
                        return true;
                    }
                }
                None => return false,
            }
        }
    }

    /// Whether `key` is already bound, for `Builder::has` guards during
    /// conditional registration.
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// First entry (in registration order) satisfying `predicate`, for
    /// `Builder::find`.
    pub fn find_matching(&self, predicate: &dyn Fn(&Entry) -> bool) -> Option<Arc<Entry>> {
        let order = self.key_order.lock().unwrap();
        for key in order.iter() {
            if let Some(bucket) = self.entries.get(key) {
                for entry in bucket.all() {
                    if predicate(&entry) {
                        return Some(entry);
                    }
                }
            }
        }
        None
    }

    /// Seal the table. Consumes `self`: no further mutation is possible
    /// afterwards, satisfying "after build(), the entry set is frozen."
    pub fn freeze(self) -> Result<FrozenRegistrar> {
        let order = self.key_order.into_inner().unwrap();
        let mut entries = HashMap::with_hasher(RandomState::new());
        for pair in self.entries.into_iter() {
            entries.insert(pair.0, pair.1 .1);
        }
        let mut aliases = HashMap::with_hasher(RandomState::new());
        for (k, v) in self.aliases.into_iter() {
            aliases.insert(k, v);
        }

        let frozen = FrozenRegistrar {
            entries,
            aliases,
            order,
        };
        frozen.validate_aliases()?;
        Ok(frozen)
    }
}

/// The read-only binding table a `Scope` resolves against. Separate type
/// from `Registrar` so the builder's mutable view cannot leak past `build()`.
pub(crate) struct FrozenRegistrar {
    entries: HashMap<Key, EntryBucket, RandomState>,
    aliases: HashMap<Key, Key, RandomState>,
    order: Vec<Key>,
}

impl FrozenRegistrar {
    fn validate_aliases(&self) -> Result<()> {
        for (from, _) in &self.aliases {
            let target = self.resolve_alias(from);
            if !self.entries.contains_key(&target) {
                return Err(DiError::unknown_type(format!(
                    "alias '{}' -> '{}'",
                    from.id(),
                    target.id()
                )));
            }
        }
        Ok(())
    }

    /// Resolve `key` through the alias table to its ultimate target. A
    /// single hop suffices in practice since alias insertion rejects cycles,
    /// but this walks the full chain defensively.
    fn resolve_alias(&self, key: &Key) -> Key {
        let mut current = key.clone();
        let mut steps = 0usize;
        while let Some(next) = self.aliases.get(&current) {
            current = next.clone();
            steps += 1;
            if steps > self.aliases.len() + 1 {
                break;
            }
        }
        current
    }

    pub fn has_type(&self, key: &Key) -> bool {
        self.entries.contains_key(&self.resolve_alias(key))
    }

    pub fn find(&self, key: &Key) -> Option<Arc<Entry>> {
        self.entries.get(&self.resolve_alias(key)).map(EntryBucket::first)
    }

    pub fn find_all(&self, key: &Key) -> Vec<Arc<Entry>> {
        self.entries
            .get(&self.resolve_alias(key))
            .map(EntryBucket::all)
            .unwrap_or_default()
    }

    /// Enumerate every entry in registration order (bucket-internal order
    /// preserved for multi-bindings).
    pub fn for_each(&self, mut cb: impl FnMut(&Entry)) {
        for key in &self.order {
            if let Some(bucket) = self.entries.get(key) {
                for entry in bucket.all() {
                    cb(&entry);
                }
            }
        }
    }

    /// Enumerate every entry in registration order as `Arc<Entry>`, the form
    /// `Scope::resolve_one` and eager singleton materialization need.
    pub fn for_each_arc(&self, mut cb: impl FnMut(&Arc<Entry>)) {
        for key in &self.order {
            if let Some(bucket) = self.entries.get(key) {
                match bucket {
                    EntryBucket::Single(e) => cb(e),
                    EntryBucket::Multi(v) => v.iter().for_each(|e| cb(e)),
                }
            }
        }
    }

    /// All distinct bound keys, in first-registration order. Backs
    /// `Container::types()`.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.order.iter()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}
