//! Entry model: the immutable binding record and the values that describe it.
//!
//! An `Entry` is either a pre-built instance or a factory closure together
//! with the lifecycle that governs when the factory runs and how long its
//! result lives. Everything here is builder-time data; `Activator` and
//! `Scope` are what turn an `Entry` into a live value.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::scope::Scope;
use crate::{DiError, Result};

/// Marker trait for anything the container can store and hand back out.
///
/// Blanket-implemented for every `Send + Sync + 'static` type: you never
/// implement this by hand.
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Identity of a binding: a Rust type plus an optional name discriminator.
///
/// The composed id is `type` or `type$name`, but `TypeId` stays the primary
/// hash key; the string form is only used for error messages and
/// `Container::types`.
#[derive(Clone, Eq)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<Box<str>>,
}

impl Key {
    /// Build the key for type `T` with no name.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
        }
    }

    /// Build the key for type `T` discriminated by `name`.
    ///
    /// `name` is trimmed; an empty name after trimming is rejected with
    /// `DiError::InvalidName` rather than silently becoming the unnamed key.
    pub fn named<T: 'static>(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DiError::InvalidName {
                reason: "name must be a non-empty, non-whitespace string".into(),
            });
        }
        Ok(Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: Some(trimmed.into()),
        })
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The composed identifier, `type` or `type$name`, used in error text.
    pub fn id(&self) -> String {
        match &self.name {
            Some(n) => format!("{}${n}", self.type_name),
            None => self.type_name.to_string(),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.id())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Lifecycle ordering, strict-to-loose: `Singleton < Lazy < Scope < Transient`.
///
/// A factory of lifecycle `L` may only depend on entries of lifecycle `<= L`
/// (using this ordering); a longer-lived instance capturing a shorter-lived
/// one would leak the shorter lifetime once the owning scope disposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Lifecycle {
    /// Materialized eagerly at `build()`, owned by the root scope.
    #[default]
    Singleton,
    /// Materialized at most once per root, on first request.
    Lazy,
    /// Materialized at most once per owning scope instance.
    Scope,
    /// A fresh value on every resolution.
    Transient,
}

impl Lifecycle {
    /// Whether a factory with lifecycle `self` may depend on one with
    /// lifecycle `callee`: the callee must live at least as long, i.e. be
    /// no looser than the caller on the strict-to-loose ordering.
    #[inline]
    pub fn may_depend_on(self, callee: Lifecycle) -> bool {
        callee <= self
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Singleton => "singleton",
            Lifecycle::Lazy => "lazy",
            Lifecycle::Scope => "scope",
            Lifecycle::Transient => "transient",
        };
        write!(f, "{s}")
    }
}

/// Conflict resolution policy applied when a `(type, name)` id is registered
/// more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Duplicate registration is a build error. Default.
    #[default]
    Throw,
    /// Silently discard the new registration, keep the existing one(s).
    Keep,
    /// Remove the existing entry/entries and install the new one.
    Replace,
    /// Promote the bucket to an ordered multi-binding and append.
    Append,
}

/// Restricts where an entry may be resolved from: a set of scope ids that
/// must equal the requesting scope's id, or appear in its ancestor path.
#[derive(Debug, Clone, Default)]
pub struct ScopeRestriction(Arc<[Box<str>]>);

impl ScopeRestriction {
    pub fn new(ids: impl IntoIterator<Item = impl Into<Box<str>>>) -> Self {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn allows(&self, scope_id: &str, path: &[Box<str>]) -> bool {
        if self.0.is_empty() {
            return true;
        }
        self.0.iter().any(|allowed| {
            allowed.as_ref() == scope_id || path.iter().any(|p| p.as_ref() == allowed.as_ref())
        })
    }
}

/// A type-erased factory closure: given the requesting scope (used both as
/// a resolver for dependencies and for its ancestor path) produce a boxed
/// value.
pub type FactoryFn =
    Arc<dyn Fn(&Scope, &[Box<str>]) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync>;

/// One binding: a pre-built instance, or a factory plus the lifecycle that
/// governs it.
#[derive(Clone)]
pub enum Entry {
    Instance {
        key: Key,
        value: Arc<dyn Any + Send + Sync>,
        module: Option<Arc<str>>,
        scope: ScopeRestriction,
    },
    Factory {
        key: Key,
        factory: FactoryFn,
        lifecycle: Lifecycle,
        module: Option<Arc<str>>,
        scope: ScopeRestriction,
    },
}

impl Entry {
    pub fn key(&self) -> &Key {
        match self {
            Entry::Instance { key, .. } | Entry::Factory { key, .. } => key,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Entry::Instance { .. } => Lifecycle::Singleton,
            Entry::Factory { lifecycle, .. } => *lifecycle,
        }
    }

    pub fn module(&self) -> Option<&str> {
        match self {
            Entry::Instance { module, .. } | Entry::Factory { module, .. } => module.as_deref(),
        }
    }

    pub fn scope_restriction(&self) -> &ScopeRestriction {
        match self {
            Entry::Instance { scope, .. } | Entry::Factory { scope, .. } => scope,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, Entry::Instance { .. })
    }

    pub fn build_instance<T: Injectable>(key: Key, value: T) -> Self {
        Entry::Instance {
            key,
            value: Arc::new(value),
            module: None,
            scope: ScopeRestriction::default(),
        }
    }

    pub fn build_factory<T: Injectable>(
        key: Key,
        lifecycle: Lifecycle,
        factory: impl Fn(&Scope, &[Box<str>]) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        let factory: FactoryFn = Arc::new(move |resolver, path| {
            factory(resolver, path).map(|v| Arc::new(v) as Arc<dyn Any + Send + Sync>)
        });
        Entry::Factory {
            key,
            factory,
            lifecycle,
            module: None,
            scope: ScopeRestriction::default(),
        }
    }

    /// Build a factory entry from an already type-erased `FactoryFn`,
    /// skipping the usual `T -> Arc<dyn Any>` wrap. Used where the factory
    /// delegates to another already-erased resolution (dynamic modules).
    pub fn build_factory_raw(key: Key, lifecycle: Lifecycle, factory: FactoryFn) -> Self {
        Entry::Factory {
            key,
            factory,
            lifecycle,
            module: None,
            scope: ScopeRestriction::default(),
        }
    }

    pub fn with_module(mut self, module: Option<Arc<str>>) -> Self {
        match &mut self {
            Entry::Instance { module: m, .. } | Entry::Factory { module: m, .. } => *m = module,
        }
        self
    }

    pub fn with_scope_restriction(mut self, scope: ScopeRestriction) -> Self {
        match &mut self {
            Entry::Instance { scope: s, .. } | Entry::Factory { scope: s, .. } => *s = scope,
        }
        self
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Instance { key, .. } => f.debug_struct("Instance").field("key", key).finish(),
            Entry::Factory { key, lifecycle, .. } => f
                .debug_struct("Factory")
                .field("key", key)
                .field("lifecycle", lifecycle)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn key_identity_by_type_and_name() {
        let a1 = Key::of::<A>();
        let a2 = Key::of::<A>();
        let b = Key::of::<B>();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn named_key_rejects_blank_name() {
        assert!(Key::named::<A>("   ").is_err());
        assert!(Key::named::<A>("").is_err());
    }

    #[test]
    fn named_key_trims_whitespace() {
        let k = Key::named::<A>("  primary  ").unwrap();
        assert_eq!(k.name(), Some("primary"));
    }

    #[test]
    fn id_format_is_type_name_or_type_dollar_name() {
        let unnamed = Key::of::<A>();
        assert_eq!(unnamed.id(), unnamed.type_name().to_string());

        let named = Key::named::<A>("x").unwrap();
        assert!(named.id().ends_with("$x"));
    }

    #[test]
    fn lifecycle_ordering() {
        use Lifecycle::*;
        assert!(Singleton < Lazy);
        assert!(Lazy < Scope);
        assert!(Scope < Transient);
    }

    #[test]
    fn lifecycle_compatibility_table() {
        use Lifecycle::*;
        assert!(Singleton.may_depend_on(Singleton));
        assert!(!Singleton.may_depend_on(Lazy));
        assert!(Lazy.may_depend_on(Lazy));
        assert!(!Lazy.may_depend_on(Scope));
        assert!(Scope.may_depend_on(Lazy));
        assert!(!Scope.may_depend_on(Transient));
        assert!(Transient.may_depend_on(Transient));
    }

    #[test]
    fn scope_restriction_matches_id_or_path() {
        let restriction = ScopeRestriction::new(["admin"]);
        assert!(restriction.allows("admin", &[]));
        assert!(!restriction.allows("other", &[]));
        let path = vec![Box::from("admin")];
        assert!(restriction.allows("leaf", &path));
    }

    #[test]
    fn empty_scope_restriction_allows_everything() {
        let restriction = ScopeRestriction::default();
        assert!(restriction.allows("anything", &[]));
    }
}
