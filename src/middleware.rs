//! Build and lifecycle hooks observing (and, for activation, able to
//! transform) the container's behavior.
//!
//! A small observer trait with all-default methods, modeled after the hook
//! tables other build pipelines expose, so a middleware only implements
//! what it needs.

use std::any::Any;
use std::sync::Arc;

use crate::Result;
use crate::builder::Builder;
use crate::entry::Entry;
use crate::scope::Scope;

type AnyArc = Arc<dyn Any + Send + Sync>;

/// Observes (and, for activation, can transform) container lifecycle events.
///
/// Every method is a no-op by default; implement only the hooks you need.
/// A middleware that returns `Err` from `on_activated` aborts the
/// resolution that triggered it; the other hooks are infallible.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str {
        "middleware"
    }

    /// Runs once, right before the registrar is frozen. May add further
    /// bindings or aliases through `builder`, including synthesized ones.
    fn on_pre_build(&self, builder: &mut Builder) {
        let _ = builder;
    }

    /// Runs once, after singletons are eagerly materialized and the root
    /// scope is ready to hand back to the caller.
    fn on_build(&self, root: &Scope) {
        let _ = root;
    }

    /// Runs whenever a new child scope is opened (not for the root).
    fn on_scope_open(&self, scope: &Scope) {
        let _ = scope;
    }

    /// Runs whenever a scope is disposed, including the root.
    fn on_scope_dispose(&self, scope: &Scope) {
        let _ = scope;
    }

    /// Runs after an entry is activated, before it is returned to the
    /// caller; may replace the value entirely. Applied in registration
    /// order as a chain, each middleware seeing the previous one's output.
    fn on_activated(&self, entry: &Entry, value: AnyArc, scope: &Scope) -> Result<AnyArc> {
        let _ = (entry, scope);
        Ok(value)
    }

    /// Runs whenever a binding is registered, before conflict resolution.
    fn on_bind(&self, entry: &Entry) {
        let _ = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingMiddleware(Arc<AtomicU32>);

    impl Middleware for CountingMiddleware {
        fn on_activated(&self, _entry: &Entry, value: AnyArc, _scope: &Scope) -> Result<AnyArc> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[test]
    fn middleware_observes_activation() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = Builder::new()
            .use_middleware(CountingMiddleware(Arc::clone(&counter)))
            .unwrap()
            .bind_factory::<u32, _>(|_, _| Ok(1u32), Default::default())
            .unwrap()
            .build()
            .unwrap();

        let _ = container.get::<u32>().unwrap();
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    struct RejectingMiddleware;
    impl Middleware for RejectingMiddleware {
        fn on_activated(&self, entry: &Entry, _value: AnyArc, _scope: &Scope) -> Result<AnyArc> {
            Err(crate::DiError::creation_failed(entry.key().id(), "rejected by middleware"))
        }
    }

    #[test]
    fn middleware_error_aborts_resolution() {
        let result = Builder::new()
            .use_middleware(RejectingMiddleware)
            .unwrap()
            .bind_factory::<u32, _>(|_, _| Ok(1u32), crate::builder::FactoryOptions::lazy())
            .unwrap()
            .build();
        // Singleton default would fail eager materialization at build(); use
        // a lazy binding so the failure surfaces on first `get` instead.
        let container = result.unwrap();
        assert!(container.get::<u32>().is_err());
    }
}
