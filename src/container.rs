//! The root scope, plus the one extra thing only the root exposes: the
//! bound-type inventory.

use std::ops::Deref;

use crate::entry::Key;
use crate::scope::Scope;

/// The value `Builder::build()` returns. Everything resolvable lives behind
/// the full `Scope` surface via `Deref`; `Container` only adds `types()`.
#[derive(Clone)]
pub struct Container {
    root: Scope,
}

impl Container {
    pub(crate) fn new(root: Scope) -> Self {
        Self { root }
    }

    /// Every bound `(type, name)` id, in first-registration order.
    pub fn types(&self) -> Vec<String> {
        self.root.registrar().keys().map(Key::id).collect()
    }

    pub fn root_scope(&self) -> &Scope {
        &self.root
    }
}

impl Deref for Container {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, FactoryOptions};

    #[test]
    fn types_lists_bound_ids_in_registration_order() {
        let container = Builder::new()
            .bind_instance(1u32)
            .unwrap()
            .bind_factory::<u64, _>(|_, _| Ok(2u64), FactoryOptions::singleton())
            .unwrap()
            .build()
            .unwrap();
        let types = container.types();
        assert_eq!(types.len(), 2);
        assert!(types[0].contains("u32"));
        assert!(types[1].contains("u64"));
    }
}
