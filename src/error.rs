//! Error taxonomy for the dependency injection container.
//!
//! Every error carries the offending identifier; activation failures also
//! carry the full dependency chain. Nothing in the core swallows an error;
//! `maybe`/`get_all` only convert *absence* to `None`/`[]`, never a raised
//! error.

use thiserror::Error;

/// Errors raised by the container at build time or resolution time.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// Duplicate registration under the `Throw` conflict policy, or an
    /// `Append` binding mixed with an incompatible prior policy.
    #[error("binding conflict for '{id}': {reason}")]
    BindingConflict { id: String, reason: String },

    /// `get`, `provider_of`, or `phantom_of` found no matching entry after
    /// alias resolution and scope-restriction filtering.
    #[error("unknown type: '{id}'")]
    UnknownType { id: String },

    /// A type named via `Builder::require_type` was not bound by `build()`.
    #[error("required type not bound: '{id}'")]
    UnmetRequiredType { id: String },

    /// The activator revisited an entry already on the activation stack.
    #[error("cyclic dependency detected: {chain}")]
    CyclicDependency { chain: String },

    /// A factory resolved a dependency whose lifecycle is stricter than its
    /// own (e.g. a `lazy` depending on a `transient`).
    #[error("'{caller}' cannot depend on a '{callee}' (resolving '{id}')")]
    LifecycleMismatch {
        caller: String,
        callee: String,
        id: String,
    },

    /// Malformed binding name (empty, or whitespace-only after trimming).
    #[error("invalid name: {reason}")]
    InvalidName { reason: String },

    /// Malformed lifecycle declaration.
    #[error("invalid lifecycle: {reason}")]
    InvalidLifecycle { reason: String },

    /// Malformed or duplicate module name.
    #[error("invalid module name: {reason}")]
    InvalidModuleName { reason: String },

    /// Operation attempted on a disposed or sealed scope.
    #[error("scope closed: {reason}")]
    ScopeClosed { reason: String },

    /// Resolution against a dynamic module before its loader resolved.
    #[error("dynamic module '{module}' not loaded")]
    DynamicModuleNotLoaded { module: String },

    /// Factory panicked or otherwise failed to produce a value.
    #[error("failed to create '{id}': {reason}")]
    CreationFailed { id: String, reason: String },

    /// A `Builder` operation ran after `build()` already consumed it.
    #[error("builder already built: {reason}")]
    BuilderAlreadyBuilt { reason: String },
}

impl DiError {
    #[inline]
    pub fn binding_conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindingConflict {
            id: id.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn unknown_type(id: impl Into<String>) -> Self {
        Self::UnknownType { id: id.into() }
    }

    #[inline]
    pub fn unmet_required_type(id: impl Into<String>) -> Self {
        Self::UnmetRequiredType { id: id.into() }
    }

    #[inline]
    pub fn scope_closed(reason: impl Into<String>) -> Self {
        Self::ScopeClosed {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn dynamic_module_not_loaded(module: impl Into<String>) -> Self {
        Self::DynamicModuleNotLoaded {
            module: module.into(),
        }
    }

    #[inline]
    pub fn creation_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn invalid_module_name(reason: impl Into<String>) -> Self {
        Self::InvalidModuleName {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn already_built(reason: impl Into<String>) -> Self {
        Self::BuilderAlreadyBuilt {
            reason: reason.into(),
        }
    }
}

/// Result type alias for DI operations.
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_mismatch_message_names_caller_and_callee() {
        let err = DiError::LifecycleMismatch {
            caller: "lazy".into(),
            callee: "transient".into(),
            id: "x".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'lazy' cannot depend on a 'transient'"));
    }

    #[test]
    fn cyclic_dependency_carries_chain_text() {
        let err = DiError::CyclicDependency {
            chain: "x -> x".into(),
        };
        assert!(err.to_string().contains("x -> x"));
    }
}
