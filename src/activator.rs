//! Factory invocation: activation-stack cycle detection and lifecycle
//! compatibility checking.
//!
//! Uses the same `thread_local! { RefCell<...> }` shape as a hot-path
//! resolution cache would, but holds an activation stack instead: a blind
//! cache can't distinguish a disposed-and-recreated scope at the same
//! address from a live one, so cycle/lifecycle bookkeeping is tracked
//! explicitly instead (see DESIGN.md).

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use crate::entry::{Entry, Lifecycle};
use crate::scope::Scope;
use crate::{DiError, Result};

type AnyArc = Arc<dyn Any + Send + Sync>;

struct Frame {
    entry: Arc<Entry>,
    lifecycle: Lifecycle,
}

thread_local! {
    static ACTIVATION_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Stateless entry point for turning an `Entry` into a live value.
pub(crate) struct Activator;

impl Activator {
    /// Check for a cycle and lifecycle compatibility, then push `entry`'s
    /// frame. The returned guard must be held for the *entire* memoized
    /// lookup it guards (not just the eventual factory call): re-entering
    /// the same storage slot on one thread while the outer lookup is still
    /// open would otherwise deadlock that slot's lock before the cycle is
    /// ever detected.
    pub fn enter(entry: &Arc<Entry>, _scope: &Scope) -> Result<ActivationGuard> {
        let (lifecycle, key) = match entry.as_ref() {
            Entry::Instance { .. } => return Ok(ActivationGuard(false)),
            Entry::Factory { lifecycle, key, .. } => (*lifecycle, key),
        };

        let cycle = ACTIVATION_STACK.with(|stack| stack.borrow().iter().any(|frame| Arc::ptr_eq(&frame.entry, entry)));
        if cycle {
            let chain = ACTIVATION_STACK.with(|stack| render_cycle(&stack.borrow(), entry));
            ACTIVATION_STACK.with(|stack| stack.borrow_mut().clear());
            return Err(DiError::CyclicDependency { chain });
        }

        if let Some(caller) = ACTIVATION_STACK.with(|stack| stack.borrow().last().map(|f| f.lifecycle)) {
            if !caller.may_depend_on(lifecycle) {
                return Err(DiError::LifecycleMismatch {
                    caller: caller.to_string(),
                    callee: lifecycle.to_string(),
                    id: key.id(),
                });
            }
        }

        ACTIVATION_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                entry: Arc::clone(entry),
                lifecycle,
            })
        });
        Ok(ActivationGuard(true))
    }

    /// Invoke the factory (or return the pre-built value). Call only while
    /// holding the guard `enter` returned for this same `entry`.
    pub fn invoke_factory(entry: &Arc<Entry>, scope: &Scope) -> Result<AnyArc> {
        match entry.as_ref() {
            Entry::Instance { value, .. } => Ok(Arc::clone(value)),
            Entry::Factory { factory, .. } => factory(scope, scope.path()),
        }
    }

    /// `enter` + `invoke_factory` in one call, for lifecycles with no
    /// memoized storage to guard (instances, transients).
    pub fn create(entry: &Arc<Entry>, scope: &Scope) -> Result<AnyArc> {
        let _guard = Self::enter(entry, scope)?;
        Self::invoke_factory(entry, scope)
    }
}

/// Pops this activator's own frame (if one was pushed) when dropped, on
/// either the success or the (non-cycle) error path.
pub(crate) struct ActivationGuard(bool);
impl Drop for ActivationGuard {
    fn drop(&mut self) {
        if self.0 {
            ACTIVATION_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}

/// Render the activation chain for a cycle error.
///
/// Two-element chains render plainly (`T -> T`); longer chains bracket every
/// appearance of the repeated target, e.g. `[A] -> B -> C -> [A]`.
fn render_cycle(stack: &[Frame], repeated: &Arc<Entry>) -> String {
    let mut ids: Vec<String> = stack.iter().map(|f| f.entry.key().id()).collect();
    ids.push(repeated.key().id());

    if ids.len() == 2 {
        return ids.join(" -> ");
    }

    let target = repeated.key().id();
    ids.into_iter()
        .map(|id| if id == target { format!("[{id}]") } else { id })
        .collect::<Vec<_>>()
        .join(" -> ")
}
