//! Predicate compilation and three-valued evaluation.
//!
//! A rule's predicate [`Expression`](crate::expr::Expression) tree is compiled
//! once into a graph of [`Predicate`] and [`ValueProvider`] nodes. The graph
//! holds no per-tuple state; the same compiled rule is evaluated for every
//! tuple of every session, from any thread.

/// The predicate compiler and compiled rules.
pub mod compiler;
/// Compiled node types.
pub mod nodes;
/// Operator factories and the factory chain.
pub mod operators;

use std::fmt::Debug;

use crate::context::EvalContext;
use crate::error::ExecutionError;
use crate::logic::Truth;
use crate::value::Value;

pub use compiler::{ActionFailure, CompiledRule, PredicateCompiler};
pub use nodes::PatternCache;
pub use operators::{
    BackendOperatorFactory, ComparisonFactory, LogicalFactory, MembershipFactory,
    OperatorFactory, OperatorRegistry, RegexFactory,
};

/// A compiled boolean node.
pub trait Predicate: Send + Sync + Debug {
    /// Evaluates the node for one rule and tuple.
    ///
    /// # Errors
    /// Only backend call failures. Absent data yields [`Truth::Unknown`].
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError>;
}

/// A compiled value-producing node.
pub trait ValueProvider: Send + Sync + Debug {
    /// Produces the node's value, or `None` when it is absent or null.
    ///
    /// # Errors
    /// Only backend call failures.
    fn provide(&self, ctx: EvalContext<'_>) -> Result<Option<Value>, ExecutionError>;
}
