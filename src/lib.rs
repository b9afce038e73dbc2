//! # KyroRules - Rule evaluation over typed facts
//!
//! KyroRules evaluates declarative rules against a heterogeneous collection of
//! fact instances. Each rule declares typed fact bindings, static attributes,
//! one predicate and an ordered list of actions. The engine finds every
//! combination of facts the predicate accepts and fires the actions against a
//! shared result value.
//!
//! ## Core Concepts
//!
//! - **Rule**: attributes + declared facts + predicate + actions
//! - **Reference**: a `${path}` placeholder compiled against a rule's attributes,
//!   facts, or the session result (`ctx`)
//! - **Truth**: three-valued logic; missing data is `Unknown`, never an error
//! - **Tuple**: one instance per declared fact, enumerated in odometer order
//! - **Invocation**: a named call dispatched to a registered backend, memoized
//!   by default
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kyrorules::{Expression, InMemoryRuleRepository, Rule, RuleEngine, TypeRef, Value};
//!
//! let rule = Rule::builder("big-order")
//!     .fact("order", TypeRef::named("Order"))
//!     .when(Expression::gt(Expression::placeholder("order.total"), Expression::int(100)))
//!     .then(Expression::function("flag", TypeRef::Any, vec![("order", Expression::placeholder("order"))]))
//!     .build()?;
//!
//! let engine = RuleEngine::builder()
//!     .repository(InMemoryRuleRepository::new().with_rules("orders", [rule]))
//!     .types(types)
//!     .function("flag", |call| {
//!         call.result().update(|r| *r = Value::Bool(true));
//!         Ok(Value::Null)
//!     })
//!     .build()?;
//!
//! let result = engine.create_session("orders")?.execute(Value::Bool(false), &facts)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod error;
pub mod expr;
pub mod logic;
pub mod rule;
pub mod types;
pub mod value;

// Compilation and evaluation
pub mod context;
pub mod invocation;
pub mod predicate;
pub mod reference;
pub mod tuple;

// Orchestration
pub mod engine;
pub mod repository;

// Re-export primary types at crate root for convenience
pub use context::{EvalContext, SessionControl, SessionResult, StopListener};
pub use engine::{
    EngineConfig, ErrorEvent, ErrorHandler, ErrorKind, ExecutionMode, LoggingErrorHandler,
    RuleEngine, RuleEngineBuilder, Session, SessionId,
};
pub use error::{
    ConfigError, ExecutionError, InvocationError, RuleError, RuleResult, ValidationError,
};
pub use expr::{Expression, FunctionExpr, OperatorExpr, Param, ValueExpr, ValuesExpr};
pub use invocation::{CacheStats, Call, FunctionRegistry, Invocation, InvocationCache};
pub use logic::Truth;
pub use predicate::{CompiledRule, OperatorFactory, OperatorRegistry, Predicate, PredicateCompiler, ValueProvider};
pub use reference::{Reference, ReferencePath, ReferenceResolver, ReferenceRoot};
pub use repository::{InMemoryRuleRepository, RuleRepository};
pub use rule::{Attribute, FactDecl, Rule, RuleBuilder, CONTEXT_ROOT};
pub use tuple::{FactCandidates, Tuple, TupleEnumerator};
pub use types::{TypeDescriptor, TypeIntrospector, TypeRef, TypeRegistry};
pub use value::{Record, Value};
