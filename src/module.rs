//! Static and dynamic composition units.
//!
//! A `Module` groups related bindings behind a name, recorded on every entry
//! it contributes (`Entry::module`) for diagnostics. A `DynamicModule` is the
//! same idea loaded asynchronously and behind a gate: resolving one of its
//! types before `DynamicModuleHandle::load` completes fails with
//! `DiError::DynamicModuleNotLoaded` rather than blocking.

use std::sync::Arc;

use crate::Result;
use crate::builder::Builder;
use crate::entry::{ConflictPolicy, Entry, Injectable, Key};
use crate::middleware::Middleware;
use crate::registrar::Registrar;

#[cfg(feature = "async")]
use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;

#[cfg(feature = "async")]
use crate::registrar::FrozenRegistrar;

/// A named group of bindings, composed into a `Builder` with `Builder::include`.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, binder: &mut ModuleBinder<'_>);
}

/// The binding surface handed to `Module::build`. A thin facade over
/// `Builder` that stamps every contributed entry with this module's name
/// and notifies the owning builder's middleware before committing it.
pub struct ModuleBinder<'a> {
    registrar: &'a Registrar,
    module: Arc<str>,
    middleware: &'a [Arc<dyn Middleware>],
}

impl<'a> ModuleBinder<'a> {
    pub(crate) fn new(registrar: &'a Registrar, module: Arc<str>, middleware: &'a [Arc<dyn Middleware>]) -> Self {
        Self { registrar, module, middleware }
    }

    pub fn bind_instance<T: Injectable>(&mut self, value: T) -> Result<&mut Self> {
        self.register(Entry::build_instance(Key::of::<T>(), value), ConflictPolicy::default())
    }

    pub fn bind_named_instance<T: Injectable>(&mut self, name: &str, value: T) -> Result<&mut Self> {
        self.register(Entry::build_instance(Key::named::<T>(name)?, value), ConflictPolicy::default())
    }

    pub fn bind_factory<T: Injectable>(
        &mut self,
        lifecycle: crate::entry::Lifecycle,
        factory: impl Fn(&crate::scope::Scope, &[Box<str>]) -> Result<T> + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(
            Entry::build_factory(Key::of::<T>(), lifecycle, factory),
            ConflictPolicy::default(),
        )
    }

    fn register(&mut self, entry: Entry, policy: ConflictPolicy) -> Result<&mut Self> {
        let entry = entry.with_module(Some(Arc::clone(&self.module)));
        for mw in self.middleware {
            mw.on_bind(&entry);
        }
        self.registrar.register(entry, policy)?;
        Ok(self)
    }

    /// Compose a nested module under `this::that` naming.
    pub fn include(&mut self, module: &dyn Module) {
        let nested_name: Arc<str> = format!("{}::{}", self.module, module.name()).into();
        let mut nested = ModuleBinder::new(self.registrar, nested_name, self.middleware);
        module.build(&mut nested);
    }
}

#[cfg(feature = "async")]
type LoadFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Module>>> + Send>>;

/// A lazily-loaded module. Its types are registered up front (so `get_all`
/// and scope restrictions know about them), but resolving one before
/// `load()` completes fails fast instead of blocking the caller.
#[cfg(feature = "async")]
pub struct DynamicModuleHandle {
    name: Arc<str>,
    cell: tokio::sync::OnceCell<Arc<FrozenRegistrar>>,
    loader: Box<dyn Fn() -> LoadFuture + Send + Sync>,
}

#[cfg(feature = "async")]
impl DynamicModuleHandle {
    pub fn new(
        name: impl Into<Arc<str>>,
        loader: impl Fn() -> LoadFuture + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            cell: tokio::sync::OnceCell::new(),
            loader: Box::new(loader),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Load the module, idempotently: concurrent callers await the same
    /// in-flight load rather than running the loader twice.
    pub async fn load(&self) -> Result<()> {
        self.cell
            .get_or_try_init(|| async {
                let module = (self.loader)().await?;
                let registrar = Registrar::new();
                let mut binder = ModuleBinder::new(&registrar, Arc::clone(&self.name), &[]);
                module.build(&mut binder);
                registrar.freeze().map(Arc::new)
            })
            .await?;
        Ok(())
    }

    pub(crate) fn peek(&self) -> Option<Arc<FrozenRegistrar>> {
        self.cell.get().cloned()
    }
}

/// Register every key `handle` will eventually provide, gated on its load
/// state. Declares the id now so visibility checks and `get_all` see it
/// immediately; resolution delegates to the handle's inner registrar once
/// loaded, or fails with `DynamicModuleNotLoaded` until then.
#[cfg(feature = "async")]
pub(crate) fn bind_dynamic_entry<T: Injectable>(
    builder: &mut Builder,
    handle: Arc<DynamicModuleHandle>,
    lifecycle: crate::entry::Lifecycle,
) -> Result<()> {
    let key = Key::of::<T>();
    let module_name: Arc<str> = handle.name().into();
    let captured_key = key.clone();
    let factory: crate::entry::FactoryFn = Arc::new(move |scope, _path| match handle.peek() {
        None => Err(crate::DiError::dynamic_module_not_loaded(handle.name())),
        Some(registrar) => {
            let inner = registrar
                .find(&captured_key)
                .ok_or_else(|| crate::DiError::unknown_type(captured_key.id()))?;
            scope.resolve_one(&inner)
        }
    });
    let entry = Entry::build_factory_raw(key, lifecycle, factory).with_module(Some(module_name));
    builder.register_raw(entry, ConflictPolicy::default())
}
