//! # Armature DI - Sealed Dependency Injection for Rust
//!
//! A typed dependency injection container: register bindings against a
//! fluent `Builder`, call `build()` once, and resolve everything else
//! through the returned `Container` and its scopes. There is no mutation
//! after `build()`; every later change in behavior comes from which scope
//! you resolve through, not from rebinding.
//!
//! ## Features
//!
//! - **Type-safe** - bindings are keyed by Rust type (plus an optional name),
//!   with compile-time-checked resolution via `Container::get::<T>()`
//! - **Four lifecycles** - `singleton`, `lazy`, `scope`, and `transient`,
//!   with a strict compatibility ordering enforced at activation time
//! - **Hierarchical scopes** - child scopes inherit upward, can be sealed
//!   against further nesting or isolated from ancestor reuse
//! - **Multi-bindings, aliases, modules** - ordered `append` buckets, cycle-
//!   checked alias redirection, and named composition units
//! - **Middleware** - observe or transform build, scope and activation events
//! - **Observable** - optional `tracing` integration with JSON or pretty output
//!
//! ## Quick start
//!
//! ```rust
//! use armature_di::Builder;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: std::sync::Arc<Database>,
//! }
//!
//! let container = Builder::new()
//!     .bind_instance(Database { url: "postgres://localhost".into() })
//!     .unwrap()
//!     .bind_factory::<UserService, _>(
//!         |scope, _path| Ok(UserService { db: scope.get::<Database>()? }),
//!         Default::default(),
//!     )
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let users = container.get::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Lifecycles
//!
//! ```rust
//! use armature_di::{Builder, builder::FactoryOptions};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! static COUNTER: AtomicU64 = AtomicU64::new(0);
//!
//! struct RequestId(u64);
//!
//! let container = Builder::new()
//!     .bind_factory::<RequestId, _>(
//!         |_, _| Ok(RequestId(COUNTER.fetch_add(1, Ordering::SeqCst))),
//!         FactoryOptions::transient(),
//!     )
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let a = container.get::<RequestId>().unwrap();
//! let b = container.get::<RequestId>().unwrap();
//! assert_ne!(a.0, b.0);
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use armature_di::{Builder, scope::ScopeOptions};
//!
//! struct AppConfig { name: String }
//!
//! let root = Builder::new()
//!     .bind_instance(AppConfig { name: "MyApp".into() })
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let request_scope = root.scope("request-1", ScopeOptions::default()).unwrap();
//! assert!(request_scope.has_type::<AppConfig>());
//! request_scope.dispose();
//! ```

pub mod activator;
pub mod builder;
pub mod container;
pub mod entry;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod middleware;
pub mod module;
pub mod phantom;
pub mod provider;
pub mod registrar;
pub mod scope;
pub mod storage;

pub use builder::Builder;
pub use container::Container;
pub use entry::{ConflictPolicy, Injectable, Key, Lifecycle, ScopeRestriction};
pub use error::{DiError, Result};
pub use middleware::Middleware;
#[cfg(feature = "async")]
pub use module::DynamicModuleHandle;
pub use module::{Module, ModuleBinder};
pub use phantom::Phantom;
pub use provider::Provider;
pub use scope::{Scope, ScopeOptions};

#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Convenience re-exports for the common import line.
pub mod prelude {
    pub use crate::{Builder, Container, DiError, Injectable, Lifecycle, Middleware, Module, Result, Scope};
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Database {
        url: String,
    }

    struct UserService {
        name: String,
    }

    #[test]
    fn singleton_registration_resolves() {
        let container = Builder::new().bind_instance(Database { url: "test".into() }).unwrap().build().unwrap();
        let db = container.get::<Database>().unwrap();
        assert_eq!(db.url, "test");
    }

    #[test]
    fn multiple_resolves_return_the_same_instance() {
        let container = Builder::new().bind_instance(Database { url: "test".into() }).unwrap().build().unwrap();
        let db1 = container.get::<Database>().unwrap();
        let db2 = container.get::<Database>().unwrap();
        assert!(std::sync::Arc::ptr_eq(&db1, &db2));
    }

    #[test]
    fn transient_creates_a_new_instance_every_time() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        struct Counter(u32);

        let container = Builder::new()
            .bind_factory::<Counter, _>(
                |_, _| Ok(Counter(COUNTER.fetch_add(1, Ordering::SeqCst))),
                builder::FactoryOptions::transient(),
            )
            .unwrap()
            .build()
            .unwrap();

        let c1 = container.get::<Counter>().unwrap();
        let c2 = container.get::<Counter>().unwrap();
        assert_ne!(c1.0, c2.0);
    }

    #[test]
    fn scoped_container_sees_root_but_not_vice_versa() {
        let root = Builder::new().bind_instance(Database { url: "root".into() }).unwrap().build().unwrap();
        let child = root.scope("child", scope::ScopeOptions::default()).unwrap();

        assert!(child.has_type::<Database>());
        assert!(!root.has_type::<UserService>());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let container = Builder::new().build().unwrap();
        let result = container.get::<Database>();
        assert!(result.is_err());
    }

    #[test]
    fn prelude_exposes_the_common_surface() {
        use crate::prelude::*;
        let container: Container = Builder::new().build().unwrap();
        let _: Result<std::sync::Arc<Database>> = container.get::<Database>();
    }
}
