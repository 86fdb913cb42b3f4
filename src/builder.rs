//! Accumulates bindings and produces the root `Scope`.
//!
//! Fluent `&mut self` binding calls collect into one `Builder`, committed
//! once via a seven-step `build()`: pre-build hooks, freeze, required-type
//! validation, root construction, eager singleton materialization in
//! registration order, then build hooks.

use std::sync::Arc;

use crate::container::Container;
use crate::entry::{ConflictPolicy, Entry, Injectable, Key, Lifecycle, ScopeRestriction};
use crate::middleware::Middleware;
use crate::module::{Module, ModuleBinder};
#[cfg(feature = "async")]
use crate::module::DynamicModuleHandle;
use crate::registrar::Registrar;
use crate::scope::Scope;
use crate::{DiError, Result};

/// Per-binding knobs for `Builder::bind_factory` / `bind_dynamic`.
#[derive(Clone, Default)]
pub struct FactoryOptions {
    lifecycle: Lifecycle,
    policy: ConflictPolicy,
    scope_restriction: ScopeRestriction,
    name: Option<String>,
}

impl FactoryOptions {
    pub fn singleton() -> Self {
        Self::default()
    }

    pub fn lazy() -> Self {
        Self {
            lifecycle: Lifecycle::Lazy,
            ..Default::default()
        }
    }

    pub fn scope() -> Self {
        Self {
            lifecycle: Lifecycle::Scope,
            ..Default::default()
        }
    }

    pub fn transient() -> Self {
        Self {
            lifecycle: Lifecycle::Transient,
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn restricted_to(mut self, ids: impl IntoIterator<Item = impl Into<Box<str>>>) -> Self {
        self.scope_restriction = ScopeRestriction::new(ids);
        self
    }
}

/// Accumulates bindings before a single, one-shot `build()`.
pub struct Builder {
    registrar: Registrar,
    middleware: Vec<Arc<dyn Middleware>>,
    required: Vec<Key>,
    root_id: Box<str>,
    built: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            registrar: Registrar::new(),
            middleware: Vec::new(),
            required: Vec::new(),
            root_id: "root".into(),
            built: false,
        }
    }

    /// Override the root scope's id (defaults to `"root"`).
    pub fn with_root_id(mut self, id: impl Into<Box<str>>) -> Self {
        self.root_id = id.into();
        self
    }

    /// Every mutating operation runs this first: once `build()` has
    /// consumed the registrar, further registration would silently land in
    /// a fresh, disconnected table instead of raising.
    fn check_not_built(&self) -> Result<()> {
        if self.built {
            return Err(DiError::already_built(
                "build() already ran; no further registration is possible",
            ));
        }
        Ok(())
    }

    fn register_entry(&mut self, entry: Entry, policy: ConflictPolicy) -> Result<()> {
        self.check_not_built()?;
        for mw in &self.middleware {
            mw.on_bind(&entry);
        }
        self.registrar.register(entry, policy)
    }

    pub fn bind_instance<T: Injectable>(&mut self, value: T) -> Result<&mut Self> {
        self.register_entry(Entry::build_instance(Key::of::<T>(), value), ConflictPolicy::default())?;
        Ok(self)
    }

    pub fn bind_named_instance<T: Injectable>(&mut self, name: &str, value: T) -> Result<&mut Self> {
        self.register_entry(Entry::build_instance(Key::named::<T>(name)?, value), ConflictPolicy::default())?;
        Ok(self)
    }

    pub fn bind_factory<T: Injectable>(
        &mut self,
        factory: impl Fn(&Scope, &[Box<str>]) -> Result<T> + Send + Sync + 'static,
        opts: FactoryOptions,
    ) -> Result<&mut Self> {
        self.check_not_built()?;
        let key = match &opts.name {
            Some(n) => Key::named::<T>(n)?,
            None => Key::of::<T>(),
        };
        let entry =
            Entry::build_factory(key, opts.lifecycle, factory).with_scope_restriction(opts.scope_restriction);
        self.register_entry(entry, opts.policy)?;
        Ok(self)
    }

    pub fn bind_alias<From: Injectable, To: Injectable>(&mut self, policy: ConflictPolicy) -> Result<&mut Self> {
        self.bind_named_alias::<From, To>(None, None, policy)
    }

    /// As `bind_alias`, but either side of the redirection may carry a name
    /// discriminator, matching the `(type, name?)` shape every other binding
    /// operation accepts.
    pub fn bind_named_alias<From: Injectable, To: Injectable>(
        &mut self,
        from_name: Option<&str>,
        to_name: Option<&str>,
        policy: ConflictPolicy,
    ) -> Result<&mut Self> {
        self.check_not_built()?;
        let from = match from_name {
            Some(n) => Key::named::<From>(n)?,
            None => Key::of::<From>(),
        };
        let to = match to_name {
            Some(n) => Key::named::<To>(n)?,
            None => Key::of::<To>(),
        };
        self.registrar.register_alias(from, to, policy)?;
        Ok(self)
    }

    /// Declare a dynamic module's contribution at `T`. The binding is
    /// visible immediately; resolving it fails with
    /// `DiError::DynamicModuleNotLoaded` until `handle.load()` completes.
    #[cfg(feature = "async")]
    pub fn bind_dynamic<T: Injectable>(
        &mut self,
        handle: Arc<DynamicModuleHandle>,
        opts: FactoryOptions,
    ) -> Result<&mut Self> {
        self.check_not_built()?;
        crate::module::bind_dynamic_entry::<T>(self, handle, opts.lifecycle)?;
        Ok(self)
    }

    pub(crate) fn register_raw(&mut self, entry: Entry, policy: ConflictPolicy) -> Result<()> {
        self.register_entry(entry, policy)
    }

    /// Compose a static module's bindings in, tagged with its name.
    pub fn include(&mut self, module: &dyn Module) -> Result<&mut Self> {
        self.check_not_built()?;
        let name: Arc<str> = module.name().into();
        let mut binder = ModuleBinder::new(&self.registrar, name, &self.middleware);
        module.build(&mut binder);
        Ok(self)
    }

    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> Result<&mut Self> {
        self.check_not_built()?;
        self.middleware.push(Arc::new(middleware));
        Ok(self)
    }

    /// `build()` fails with `UnmetRequiredType` if `T` ends up unbound.
    pub fn require_type<T: Injectable>(&mut self) -> Result<&mut Self> {
        self.check_not_built()?;
        self.required.push(Key::of::<T>());
        Ok(self)
    }

    pub fn has<T: Injectable>(&self) -> Result<bool> {
        self.check_not_built()?;
        Ok(self.registrar.contains(&Key::of::<T>()))
    }

    pub fn has_named<T: Injectable>(&self, name: &str) -> Result<bool> {
        self.check_not_built()?;
        Ok(self.registrar.contains(&Key::named::<T>(name)?))
    }

    /// First bound entry satisfying `predicate`, in registration order.
    /// `None` if nothing matches.
    pub fn find(&self, predicate: impl Fn(&Entry) -> bool) -> Result<Option<Arc<Entry>>> {
        self.check_not_built()?;
        Ok(self.registrar.find_matching(&predicate))
    }

    /// Run `f` over this builder only if `cond` holds; lets call sites chain
    /// conditional bindings without breaking the fluent style.
    pub fn when(&mut self, cond: bool, f: impl FnOnce(&mut Self)) -> Result<&mut Self> {
        self.check_not_built()?;
        if cond {
            f(self);
        }
        Ok(self)
    }

    /// Seal the registrar and produce the root scope:
    /// pre-build hooks -> freeze -> validate required types -> construct
    /// root -> eagerly materialize singletons in registration order ->
    /// build hooks. A second call, or any mutating call after the first,
    /// raises `DiError::BuilderAlreadyBuilt`.
    pub fn build(&mut self) -> Result<Container> {
        self.check_not_built()?;

        let middleware_snapshot = self.middleware.clone();
        for mw in &middleware_snapshot {
            mw.on_pre_build(self);
        }

        self.built = true;

        let registrar = std::mem::replace(&mut self.registrar, Registrar::new());
        let frozen = registrar.freeze()?;

        for key in &self.required {
            if !frozen.has_type(key) {
                return Err(DiError::unmet_required_type(key.id()));
            }
        }

        let middleware = Arc::new(std::mem::take(&mut self.middleware));
        let root = Scope::new_root(Arc::new(frozen), middleware, self.root_id.clone());

        let mut build_err = None;
        root.registrar().for_each_arc(|entry| {
            if build_err.is_some() {
                return;
            }
            if !entry.is_instance() && entry.lifecycle() == Lifecycle::Singleton {
                if let Err(e) = root.resolve_one(entry) {
                    build_err = Some(e);
                }
            }
        });
        if let Some(e) = build_err {
            return Err(e);
        }

        for mw in root.middleware() {
            mw.on_build(&root);
        }

        Ok(Container::new(root))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(&'static str);

    #[test]
    fn singletons_materialize_eagerly_at_build() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let container = Builder::new()
            .bind_factory::<Greeting, _>(
                |_, _| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                    Ok(Greeting("hi"))
                },
                FactoryOptions::singleton(),
            )
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        let _ = container.get::<Greeting>().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_does_not_materialize_until_requested() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let container = Builder::new()
            .bind_factory::<Greeting, _>(
                |_, _| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                    Ok(Greeting("hi"))
                },
                FactoryOptions::lazy(),
            )
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        let _ = container.get::<Greeting>().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmet_required_type_fails_build() {
        let result = Builder::new().require_type::<u32>().unwrap().build();
        assert!(matches!(result, Err(DiError::UnmetRequiredType { .. })));
    }

    #[test]
    fn cyclic_singleton_fails_at_build_not_at_first_get() {
        struct A;
        struct B;
        let result = Builder::new()
            .bind_factory::<A, _>(|scope, _| scope.get::<B>().map(|_| A), FactoryOptions::singleton())
            .unwrap()
            .bind_factory::<B, _>(|scope, _| scope.get::<A>().map(|_| B), FactoryOptions::singleton())
            .unwrap()
            .build();
        assert!(matches!(result, Err(DiError::CyclicDependency { .. })));
    }

    #[test]
    fn build_twice_fails() {
        let mut builder = Builder::new();
        builder.build().unwrap();
        assert!(matches!(builder.build(), Err(DiError::BuilderAlreadyBuilt { .. })));
    }

    #[test]
    fn mutating_call_after_build_fails() {
        let mut builder = Builder::new();
        builder.build().unwrap();
        assert!(matches!(
            builder.bind_instance(1u32),
            Err(DiError::BuilderAlreadyBuilt { .. })
        ));
    }

    #[test]
    fn named_alias_redirects_to_named_target() {
        struct Interface;
        let container = Builder::new()
            .bind_named_instance("primary", Greeting("hi"))
            .unwrap()
            .bind_named_alias::<Interface, Greeting>(None, Some("primary"), ConflictPolicy::default())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(container.get::<Interface>().unwrap().0, "hi");
    }

    #[test]
    fn find_locates_first_matching_entry() {
        let mut builder = Builder::new();
        builder.bind_instance(1u32).unwrap();
        builder.bind_instance(Greeting("hi")).unwrap();
        let found = builder.find(|e| e.key().type_name().contains("Greeting")).unwrap();
        assert!(found.is_some());
        assert!(builder.find(|e| e.key().type_name().contains("NoSuchType")).unwrap().is_none());
    }

    #[test]
    fn pre_build_middleware_can_add_bindings() {
        struct Synthesize;
        impl Middleware for Synthesize {
            fn on_pre_build(&self, builder: &mut Builder) {
                builder.bind_instance(99u32).unwrap();
            }
        }

        let container = Builder::new().use_middleware(Synthesize).unwrap().build().unwrap();
        assert_eq!(*container.get::<u32>().unwrap(), 99);
    }

    #[test]
    fn on_bind_fires_for_every_registration() {
        use std::sync::atomic::{AtomicU32, Ordering};
        struct CountBindings(Arc<AtomicU32>);
        impl Middleware for CountBindings {
            fn on_bind(&self, _entry: &Entry) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(AtomicU32::new(0));
        Builder::new()
            .use_middleware(CountBindings(Arc::clone(&counter)))
            .unwrap()
            .bind_instance(1u32)
            .unwrap()
            .bind_instance(Greeting("hi"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
