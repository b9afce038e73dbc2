//! Call dispatch.
//!
//! Function and operator names resolve to backends through an explicit
//! registration table. The engine never inspects a backend: it resolves the
//! arguments, hands them over as a [`Call`], and takes back a [`Value`].

/// Call-result memoization.
pub mod cache;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::{EvalContext, SessionResult};
use crate::error::{ExecutionError, InvocationError};
use crate::value::Value;

pub use cache::{CacheStats, CallKey, InvocationCache};

/// A call backend.
///
/// Any `Fn(&Call) -> Result<Value, InvocationError>` closure is a backend.
pub trait Invocation: Send + Sync {
    /// Performs the call.
    ///
    /// # Errors
    /// Backend-specific failures. They are reported as execution errors for
    /// the rule and tuple that made the call.
    fn invoke(&self, call: &Call<'_>) -> Result<Value, InvocationError>;
}

impl<F> Invocation for F
where
    F: Fn(&Call<'_>) -> Result<Value, InvocationError> + Send + Sync,
{
    fn invoke(&self, call: &Call<'_>) -> Result<Value, InvocationError> {
        self(call)
    }
}

/// The arguments and session view a backend receives.
pub struct Call<'a> {
    name: &'a str,
    args: &'a [Value],
    param_names: &'a [String],
    ctx: EvalContext<'a>,
}

impl<'a> Call<'a> {
    /// Creates a call view. Names are optional; operators pass none.
    #[must_use]
    pub const fn new(
        name: &'a str,
        args: &'a [Value],
        param_names: &'a [String],
        ctx: EvalContext<'a>,
    ) -> Self {
        Self {
            name,
            args,
            param_names,
            ctx,
        }
    }

    /// The registered call name.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Resolved arguments, in declaration order. Absent values are `Null`.
    #[must_use]
    pub const fn args(&self) -> &'a [Value] {
        self.args
    }

    /// Positional argument.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }

    /// Named argument (functions only).
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&'a Value> {
        let index = self.param_names.iter().position(|p| p == name)?;
        self.args.get(index)
    }

    /// Name of the rule making the call.
    #[must_use]
    pub const fn rule_name(&self) -> &'a str {
        self.ctx.rule_name()
    }

    /// The session result; actions mutate it through [`SessionResult::update`].
    #[must_use]
    pub const fn result(&self) -> &'a SessionResult {
        self.ctx.result()
    }

    /// The fact instance bound to `id` in the current tuple.
    #[must_use]
    pub fn fact(&self, id: &str) -> Option<&'a Value> {
        self.ctx.tuple().get(id)
    }

    /// Asks the session to stop starting new rule and tuple evaluations.
    /// Returns true if this was the first request.
    pub fn stop_processing(&self) -> bool {
        self.ctx.control().request_stop(self.ctx.rule_name())
    }
}

impl fmt::Debug for Call<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("rule", &self.ctx.rule_name())
            .finish_non_exhaustive()
    }
}

/// A registered backend plus its caching policy.
#[derive(Clone)]
pub struct FunctionMapping {
    name: String,
    backend: Arc<dyn Invocation>,
    cacheable: bool,
}

impl FunctionMapping {
    /// Creates a mapping. Caching is on unless `cacheable` is false.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: Arc<dyn Invocation>, cacheable: bool) -> Self {
        Self {
            name: name.into(),
            backend,
            cacheable,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Returns the same backend with caching switched off. Actions are
    /// dispatched this way so their side effects run on every firing.
    #[must_use]
    pub fn uncached(&self) -> Self {
        Self {
            cacheable: false,
            ..self.clone()
        }
    }

    /// Invokes the backend, consulting `cache` first when caching is on.
    ///
    /// The cache key is the call name and `args`; cached backends must not
    /// depend on anything else (facts, the session result).
    ///
    /// # Errors
    /// Backend failures as `ExecutionError::Invocation`.
    pub fn dispatch(
        &self,
        cache: &InvocationCache,
        args: &[Value],
        param_names: &[String],
        ctx: EvalContext<'_>,
    ) -> Result<Value, ExecutionError> {
        let run = || {
            let call = Call::new(&self.name, args, param_names, ctx);
            self.backend
                .invoke(&call)
                .map_err(|e| ExecutionError::Invocation {
                    call: self.name.clone(),
                    message: e.message().to_string(),
                })
        };
        if self.cacheable {
            cache.get_or_invoke(&self.name, args, run)
        } else {
            run()
        }
    }
}

impl fmt::Debug for FunctionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionMapping")
            .field("name", &self.name)
            .field("cacheable", &self.cacheable)
            .finish_non_exhaustive()
    }
}

/// Registration table from call name to backend.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    mappings: HashMap<String, FunctionMapping>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cached backend, replacing any previous one of that name.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Invocation>) {
        self.insert(name.into(), backend, true);
    }

    /// Registers a backend that re-executes on every call.
    pub fn register_uncached(&mut self, name: impl Into<String>, backend: Arc<dyn Invocation>) {
        self.insert(name.into(), backend, false);
    }

    fn insert(&mut self, name: String, backend: Arc<dyn Invocation>, cacheable: bool) {
        let mapping = FunctionMapping::new(name.clone(), backend, cacheable);
        self.mappings.insert(name, mapping);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FunctionMapping> {
        self.mappings.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.mappings.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::context::SessionControl;
    use crate::tuple::Tuple;

    fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn Invocation> {
        Arc::new(move |call: &Call<'_>| -> Result<Value, InvocationError> {
            counter.fetch_add(1, Ordering::SeqCst);
            let n = call.arg(0).and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(n * 2))
        })
    }

    fn with_ctx<R>(f: impl FnOnce(EvalContext<'_>) -> R) -> R {
        let tuple = Tuple::new();
        let result = SessionResult::default();
        let control = SessionControl::default();
        f(EvalContext::new("r", &[], &tuple, &result, &control))
    }

    #[test]
    fn cached_mapping_invokes_once_per_argument_vector() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = FunctionRegistry::new();
        registry.register("double", counting(Arc::clone(&counter)));
        let cache = InvocationCache::new();
        let mapping = registry.get("double").unwrap();

        with_ctx(|ctx| {
            assert_eq!(mapping.dispatch(&cache, &[Value::Int(2)], &[], ctx).unwrap(), Value::Int(4));
            assert_eq!(mapping.dispatch(&cache, &[Value::Int(2)], &[], ctx).unwrap(), Value::Int(4));
            assert_eq!(mapping.dispatch(&cache, &[Value::Int(3)], &[], ctx).unwrap(), Value::Int(6));
        });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn uncached_mapping_always_invokes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = FunctionRegistry::new();
        registry.register_uncached("double", counting(Arc::clone(&counter)));
        let cache = InvocationCache::new();
        let mapping = registry.get("double").unwrap();
        assert!(!mapping.is_cacheable());

        with_ctx(|ctx| {
            mapping.dispatch(&cache, &[Value::Int(2)], &[], ctx).unwrap();
            mapping.dispatch(&cache, &[Value::Int(2)], &[], ctx).unwrap();
        });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn backend_failure_becomes_execution_error() {
        let mut registry = FunctionRegistry::new();
        registry.register("fail", Arc::new(|_: &Call<'_>| -> Result<Value, InvocationError> {
            Err(InvocationError::new("nope"))
        }));
        let cache = InvocationCache::new();
        let err = with_ctx(|ctx| registry.get("fail").unwrap().dispatch(&cache, &[], &[], ctx)).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Invocation {
                call: "fail".to_string(),
                message: "nope".to_string(),
            }
        );
    }

    #[test]
    fn named_arguments() {
        let names = vec!["amount".to_string(), "currency".to_string()];
        let args = vec![Value::Int(5), Value::from("EUR")];
        with_ctx(|ctx| {
            let call = Call::new("pay", &args, &names, ctx);
            assert_eq!(call.named("currency"), Some(&Value::from("EUR")));
            assert_eq!(call.named("missing"), None);
            assert_eq!(call.arg(0), Some(&Value::Int(5)));
            assert_eq!(call.rule_name(), "r");
        });
    }
}
