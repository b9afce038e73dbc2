//! The rule engine.
//!
//! [`RuleEngine`] owns everything that outlives a session: the function
//! registry, the operator chain, the reference resolver with its type cache,
//! the invocation cache, and compiled rules. Sessions are created per
//! repository URI and share all of it.

/// Engine configuration.
pub mod config;
/// Error events and the error sink.
pub mod events;
mod runtime;
mod session;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::context::StopListener;
use crate::error::{ConfigError, InvocationError, RuleError, RuleResult};
use crate::invocation::{Call, CacheStats, FunctionRegistry, Invocation, InvocationCache};
use crate::predicate::{BackendOperatorFactory, CompiledRule, OperatorFactory, OperatorRegistry, PredicateCompiler};
use crate::reference::ReferenceResolver;
use crate::repository::{InMemoryRuleRepository, RuleRepository};
use crate::rule::Rule;
use crate::types::{TypeIntrospector, TypeRegistry};
use crate::value::Value;

pub use config::{EngineConfig, ExecutionMode};
pub use events::{ErrorEvent, ErrorHandler, ErrorKind, LoggingErrorHandler};
pub use session::{Session, SessionId};

/// Builds sessions from a rule repository and runs them.
pub struct RuleEngine {
    repository: Arc<dyn RuleRepository>,
    types: Arc<dyn TypeIntrospector>,
    resolver: ReferenceResolver,
    functions: Arc<FunctionRegistry>,
    operators: OperatorRegistry,
    cache: Arc<InvocationCache>,
    error_handler: Arc<dyn ErrorHandler>,
    stop_listener: Option<Arc<dyn StopListener>>,
    config: EngineConfig,
    compiled: RwLock<HashMap<String, Arc<CompiledRule>>>,
}

impl RuleEngine {
    /// Creates a new engine builder.
    #[must_use]
    pub fn builder() -> RuleEngineBuilder {
        RuleEngineBuilder::new()
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The invocation cache shared by every session of this engine.
    #[must_use]
    pub fn invocation_cache(&self) -> &InvocationCache {
        &self.cache
    }

    /// Hit, miss and entry counts of the invocation cache.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The resolver used to compile references.
    #[must_use]
    pub const fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    /// Number of distinct compiled rules held by the engine.
    #[must_use]
    pub fn compiled_rules(&self) -> usize {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Creates a session for `uri`, compiling every rule it contains.
    ///
    /// Configuration errors are reported to the error handler and abort
    /// session creation.
    ///
    /// # Errors
    /// `UnknownSession` when the repository has no rules for `uri`, or the
    /// first configuration error found while compiling.
    pub fn create_session(&self, uri: &str) -> RuleResult<Session> {
        let rules = self
            .repository
            .rules(uri)
            .ok_or_else(|| ConfigError::UnknownSession { uri: uri.to_string() })
            .map_err(|e| self.configuration_error(uri, e))?;

        let compiled = rules
            .iter()
            .map(|rule| self.compile(rule).map_err(|e| self.configuration_error(uri, e)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(uri, rules = compiled.len(), "created session");
        Ok(Session::new(
            uri.to_string(),
            compiled,
            Arc::clone(&self.types),
            Arc::clone(&self.error_handler),
            self.stop_listener.clone(),
            self.config.mode,
        ))
    }

    /// Compiles a rule, reusing an earlier compilation of an identical rule.
    fn compile(&self, rule: &Arc<Rule>) -> Result<Arc<CompiledRule>, ConfigError> {
        let key = rule.fingerprint();
        if let Some(hit) = self
            .compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(
            PredicateCompiler::new(rule, &self.resolver, &self.functions, &self.operators, &self.cache)
                .compile()?,
        );

        // Another thread may have inserted it while we compiled.
        let mut guard = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(guard.entry(key).or_insert(compiled)))
    }

    fn configuration_error(&self, uri: &str, error: ConfigError) -> RuleError {
        self.error_handler.handle(&ErrorEvent::configuration(uri, error.clone()));
        RuleError::Configuration(error)
    }
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("functions", &self.functions.len())
            .field("operators", &self.operators)
            .field("config", &self.config)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RuleEngine`].
#[derive(Default)]
pub struct RuleEngineBuilder {
    repository: Option<Arc<dyn RuleRepository>>,
    types: Option<Arc<dyn TypeIntrospector>>,
    functions: FunctionRegistry,
    operators: Vec<Arc<dyn OperatorFactory>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    stop_listeners: Vec<Arc<dyn StopListener>>,
    config: EngineConfig,
}

impl RuleEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule repository. Defaults to an empty in-memory repository.
    #[must_use]
    pub fn repository(mut self, repository: impl RuleRepository + 'static) -> Self {
        self.repository = Some(Arc::new(repository));
        self
    }

    /// Sets a shared rule repository.
    #[must_use]
    pub fn shared_repository(mut self, repository: Arc<dyn RuleRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Sets the type introspector. Defaults to an empty [`TypeRegistry`].
    #[must_use]
    pub fn types(mut self, types: impl TypeIntrospector + 'static) -> Self {
        self.types = Some(Arc::new(types));
        self
    }

    /// Registers a cached function backend.
    #[must_use]
    pub fn function<F>(mut self, name: impl Into<String>, backend: F) -> Self
    where
        F: Fn(&Call<'_>) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.functions.register(name, Arc::new(backend));
        self
    }

    /// Registers a function backend that runs on every call.
    #[must_use]
    pub fn uncached_function<F>(mut self, name: impl Into<String>, backend: F) -> Self
    where
        F: Fn(&Call<'_>) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.functions.register_uncached(name, Arc::new(backend));
        self
    }

    /// Registers any [`Invocation`] implementation.
    #[must_use]
    pub fn backend(mut self, name: impl Into<String>, backend: Arc<dyn Invocation>, cacheable: bool) -> Self {
        if cacheable {
            self.functions.register(name, backend);
        } else {
            self.functions.register_uncached(name, backend);
        }
        self
    }

    /// Appends an operator factory after the built-in ones.
    #[must_use]
    pub fn operator(mut self, factory: impl OperatorFactory + 'static) -> Self {
        self.operators.push(Arc::new(factory));
        self
    }

    /// Sets the error sink. Defaults to [`LoggingErrorHandler`].
    #[must_use]
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Registers the stop-processing listener. Only one may be registered.
    #[must_use]
    pub fn on_stop(mut self, listener: impl StopListener + 'static) -> Self {
        self.stop_listeners.push(Arc::new(listener));
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    /// `InvalidConfig` for out-of-range settings, `DuplicateStopListener`
    /// when more than one stop listener was registered.
    pub fn build(self) -> RuleResult<RuleEngine> {
        let config = self.config.validate()?;
        if self.stop_listeners.len() > 1 {
            return Err(ConfigError::DuplicateStopListener.into());
        }

        let types = self
            .types
            .unwrap_or_else(|| Arc::new(TypeRegistry::new()));
        let functions = Arc::new(self.functions);

        let mut operators = OperatorRegistry::with_builtins();
        for factory in self.operators {
            operators.push(factory);
        }
        operators.push(Arc::new(BackendOperatorFactory::new(Arc::clone(&functions))));

        Ok(RuleEngine {
            repository: self
                .repository
                .unwrap_or_else(|| Arc::new(InMemoryRuleRepository::new())),
            resolver: ReferenceResolver::new(Arc::clone(&types)),
            types,
            functions,
            operators,
            cache: Arc::new(InvocationCache::new()),
            error_handler: self
                .error_handler
                .unwrap_or_else(|| Arc::new(LoggingErrorHandler)),
            stop_listener: self.stop_listeners.into_iter().next(),
            config,
            compiled: RwLock::new(HashMap::new()),
        })
    }
}
