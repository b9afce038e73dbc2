//! Evaluation context shared by predicates and actions.
//!
//! An [`EvalContext`] is everything a compiled predicate or action may read:
//! the current tuple, the rule's attributes and name, the session result and
//! the stop-processing control. Only the result may be mutated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::rule::Attribute;
use crate::tuple::Tuple;
use crate::value::Value;

/// Notified once when a session is asked to stop processing.
pub trait StopListener: Send + Sync {
    /// Called with the name of the rule whose action requested the stop.
    fn on_stop(&self, rule: &str);
}

impl<F> StopListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_stop(&self, rule: &str) {
        self(rule);
    }
}

/// The session's shared, mutable result object.
///
/// Actions mutate it through [`SessionResult::update`]. The lock makes the
/// object safe to share with parallel workers; ordering of updates across
/// rules is unspecified.
#[derive(Debug, Default)]
pub struct SessionResult {
    inner: RwLock<Value>,
}

impl SessionResult {
    /// Wraps the initial result value.
    #[must_use]
    pub fn new(initial: Value) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Reads the result.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        // A panicking action cannot leave a Value half-written in a way that
        // breaks memory safety; keep serving the last state.
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutates the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Returns a copy of the current result.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.read(Value::clone)
    }

    /// Consumes the handle, returning the result.
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session-scoped stop-processing control.
///
/// The signal is cooperative: units already running finish, no new unit
/// starts once it is set.
#[derive(Default)]
pub struct SessionControl {
    stopped: AtomicBool,
    listener: Option<Arc<dyn StopListener>>,
}

impl SessionControl {
    /// Creates a control with an optional stop listener.
    #[must_use]
    pub fn new(listener: Option<Arc<dyn StopListener>>) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            listener,
        }
    }

    /// Requests that the session stop. Returns true for the first request;
    /// only the first request notifies the listener.
    pub fn request_stop(&self, rule: &str) -> bool {
        let first = self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            tracing::warn!(rule, "stop processing requested");
            if let Some(listener) = &self.listener {
                listener.on_stop(rule);
            }
        }
        first
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SessionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionControl")
            .field("stopped", &self.is_stopped())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

/// Everything a compiled predicate or action can see for one rule and tuple.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    rule_name: &'a str,
    attributes: &'a [Attribute],
    tuple: &'a Tuple<'a>,
    result: &'a SessionResult,
    control: &'a SessionControl,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub const fn new(
        rule_name: &'a str,
        attributes: &'a [Attribute],
        tuple: &'a Tuple<'a>,
        result: &'a SessionResult,
        control: &'a SessionControl,
    ) -> Self {
        Self {
            rule_name,
            attributes,
            tuple,
            result,
            control,
        }
    }

    #[must_use]
    pub const fn rule_name(&self) -> &'a str {
        self.rule_name
    }

    /// Returns the stored value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&'a Value> {
        self.attributes.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    #[must_use]
    pub const fn tuple(&self) -> &'a Tuple<'a> {
        self.tuple
    }

    #[must_use]
    pub const fn result(&self) -> &'a SessionResult {
        self.result
    }

    #[must_use]
    pub const fn control(&self) -> &'a SessionControl {
        self.control
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::types::TypeRef;
    use crate::value::Record;

    #[test]
    fn result_update_is_visible() {
        let result = SessionResult::new(Value::from(Record::new("Summary")));
        result.update(|v| {
            if let Some(r) = v.as_record_mut() {
                r.set("count", 2i64);
            }
        });
        assert_eq!(result.snapshot().field("count"), Some(&Value::Int(2)));
        assert_eq!(result.into_inner().field("count"), Some(&Value::Int(2)));
    }

    #[test]
    fn stop_notifies_listener_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener: Arc<dyn StopListener> = Arc::new(move |rule: &str| {
            assert_eq!(rule, "halt");
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let control = SessionControl::new(Some(listener));
        assert!(!control.is_stopped());
        assert!(control.request_stop("halt"));
        assert!(!control.request_stop("halt"));
        assert!(control.is_stopped());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn context_exposes_attributes_and_tuple() {
        let attrs = vec![Attribute {
            name: "limit".to_string(),
            ty: TypeRef::Int,
            value: Value::Int(5),
        }];
        let fact = Value::Int(9);
        let tuple = Tuple::new().bind("n", &fact);
        let result = SessionResult::default();
        let control = SessionControl::default();
        let ctx = EvalContext::new("r", &attrs, &tuple, &result, &control);
        assert_eq!(ctx.rule_name(), "r");
        assert_eq!(ctx.attribute("limit"), Some(&Value::Int(5)));
        assert_eq!(ctx.attribute("other"), None);
        assert_eq!(ctx.tuple().get("n"), Some(&fact));
    }
}
