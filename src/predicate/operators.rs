//! Operator factories.
//!
//! An `Operator` expression is compiled by the first factory in the chain
//! whose [`OperatorFactory::matches`] accepts it. The chain is built-ins
//! first, then caller-registered factories, then the backend fallback that
//! dispatches any remaining name registered as a function.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::ConfigError;
use crate::expr::{Expression, OperatorExpr};
use crate::invocation::FunctionRegistry;
use crate::reference::{classify, Literal};
use crate::types::TypeRef;
use crate::value::Value;

use super::compiler::PredicateCompiler;
use super::nodes::{
    And, CompareFn, Comparison, InvocationOperator, Not, Or, Pattern, PatternCache, RegexMatch,
};
use super::Predicate;

/// Compiles one family of `Operator` expressions.
pub trait OperatorFactory: Send + Sync {
    /// Returns true if this factory compiles `op` (by name and arity).
    fn matches(&self, op: &OperatorExpr) -> bool;

    /// Compiles `op`, using `compiler` for its arguments.
    ///
    /// # Errors
    /// Any configuration error raised while compiling the arguments.
    fn create(
        &self,
        op: &OperatorExpr,
        compiler: &PredicateCompiler<'_>,
    ) -> Result<Box<dyn Predicate>, ConfigError>;
}

/// `and`, `or` (one or more arguments) and `not` (exactly one).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogicalFactory;

impl OperatorFactory for LogicalFactory {
    fn matches(&self, op: &OperatorExpr) -> bool {
        match op.name.as_str() {
            "and" | "or" => op.arity() >= 1,
            "not" => op.arity() == 1,
            _ => false,
        }
    }

    fn create(
        &self,
        op: &OperatorExpr,
        compiler: &PredicateCompiler<'_>,
    ) -> Result<Box<dyn Predicate>, ConfigError> {
        let mut children = op
            .args
            .iter()
            .map(|arg| compiler.compile_predicate(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match op.name.as_str() {
            "and" => Box::new(And::new(children)),
            "or" => Box::new(Or::new(children)),
            _ => match children.pop() {
                Some(inner) => Box::new(Not::new(inner)),
                None => return Err(compiler.unresolved(op)),
            },
        })
    }
}

/// Numeric view of a value, if it has one.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) => value.as_float(),
        _ => None,
    }
}

/// Orders two values of compatible kinds. Mismatched kinds are unordered.
#[must_use]
pub fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => numeric(lhs)?.partial_cmp(&numeric(rhs)?),
    }
}

/// Equality with numeric widening between `Int` and `Float`.
#[must_use]
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (numeric(lhs), numeric(rhs)) {
        (Some(a), Some(b)) => compare_values(lhs, rhs).map_or(a == b, Ordering::is_eq),
        _ => lhs == rhs,
    }
}

fn eq(l: &Value, r: &Value) -> bool {
    values_equal(l, r)
}

fn ne(l: &Value, r: &Value) -> bool {
    !values_equal(l, r)
}

fn lt(l: &Value, r: &Value) -> bool {
    compare_values(l, r) == Some(Ordering::Less)
}

fn le(l: &Value, r: &Value) -> bool {
    matches!(compare_values(l, r), Some(Ordering::Less | Ordering::Equal))
}

fn gt(l: &Value, r: &Value) -> bool {
    compare_values(l, r) == Some(Ordering::Greater)
}

fn ge(l: &Value, r: &Value) -> bool {
    matches!(compare_values(l, r), Some(Ordering::Greater | Ordering::Equal))
}

fn member_of(item: &Value, list: &Value) -> bool {
    list.as_list()
        .is_some_and(|items| items.iter().any(|v| values_equal(item, v)))
}

fn contains(container: &Value, item: &Value) -> bool {
    match (container, item) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        _ => member_of(item, container),
    }
}

/// Binary relational operators.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComparisonFactory;

impl ComparisonFactory {
    fn function(name: &str) -> Option<CompareFn> {
        Some(match name {
            "eq" | "==" => eq,
            "ne" | "!=" => ne,
            "lt" | "<" => lt,
            "le" | "<=" => le,
            "gt" | ">" => gt,
            "ge" | ">=" => ge,
            _ => return None,
        })
    }
}

impl OperatorFactory for ComparisonFactory {
    fn matches(&self, op: &OperatorExpr) -> bool {
        op.arity() == 2 && Self::function(&op.name).is_some()
    }

    fn create(
        &self,
        op: &OperatorExpr,
        compiler: &PredicateCompiler<'_>,
    ) -> Result<Box<dyn Predicate>, ConfigError> {
        binary(op, compiler, Self::function(&op.name))
    }
}

/// `in` (left is an element of the right list) and `contains` (right is an
/// element of the left list, or a substring of the left string).
#[derive(Debug, Default, Clone, Copy)]
pub struct MembershipFactory;

impl MembershipFactory {
    fn function(name: &str) -> Option<CompareFn> {
        match name {
            "in" => Some(member_of),
            "contains" => Some(contains),
            _ => None,
        }
    }
}

impl OperatorFactory for MembershipFactory {
    fn matches(&self, op: &OperatorExpr) -> bool {
        op.arity() == 2 && Self::function(&op.name).is_some()
    }

    fn create(
        &self,
        op: &OperatorExpr,
        compiler: &PredicateCompiler<'_>,
    ) -> Result<Box<dyn Predicate>, ConfigError> {
        binary(op, compiler, Self::function(&op.name))
    }
}

fn binary(
    op: &OperatorExpr,
    compiler: &PredicateCompiler<'_>,
    compare: Option<CompareFn>,
) -> Result<Box<dyn Predicate>, ConfigError> {
    let (Some(compare), [lhs, rhs]) = (compare, op.args.as_slice()) else {
        return Err(compiler.unresolved(op));
    };
    Ok(Box::new(Comparison::new(
        op.name.clone(),
        compiler.compile_value(lhs)?,
        compiler.compile_value(rhs)?,
        compare,
    )))
}

/// `matches(subject, pattern)`.
///
/// A literal pattern is compiled with the rule and rejected there if
/// invalid. A pattern computed at runtime is compiled on first use and kept
/// in the factory's [`PatternCache`]; an invalid one makes the outcome
/// unknown.
#[derive(Debug, Default, Clone)]
pub struct RegexFactory {
    patterns: Arc<PatternCache>,
}

impl RegexFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory compiling runtime patterns through `patterns`.
    #[must_use]
    pub fn with_patterns(patterns: Arc<PatternCache>) -> Self {
        Self { patterns }
    }

    #[must_use]
    pub fn patterns(&self) -> &Arc<PatternCache> {
        &self.patterns
    }
}

impl OperatorFactory for RegexFactory {
    fn matches(&self, op: &OperatorExpr) -> bool {
        op.name == "matches" && op.arity() == 2
    }

    fn create(
        &self,
        op: &OperatorExpr,
        compiler: &PredicateCompiler<'_>,
    ) -> Result<Box<dyn Predicate>, ConfigError> {
        let [subject, pattern] = op.args.as_slice() else {
            return Err(compiler.unresolved(op));
        };
        let subject = compiler.compile_value(subject)?;
        let pattern = match literal_pattern(pattern) {
            Some(text) => Pattern::Compiled(Regex::new(&text).map_err(|e| ConfigError::InvalidRegex {
                rule: compiler.rule().name().to_string(),
                pattern: text.clone(),
                reason: e.to_string(),
            })?),
            None => Pattern::Dynamic {
                source: compiler.compile_value(pattern)?,
                cache: Arc::clone(&self.patterns),
            },
        };
        Ok(Box::new(RegexMatch::new(subject, pattern)))
    }
}

/// Returns the pattern text if `expr` is a plain (or escaped) string literal.
fn literal_pattern(expr: &Expression) -> Option<String> {
    let Expression::Value(v) = expr else {
        return None;
    };
    match classify(&v.ty, &v.value) {
        Literal::Placeholder(_) => None,
        Literal::Escaped(text) => Some(text),
        Literal::Plain if v.ty == TypeRef::String => v.value.as_str().map(str::to_string),
        Literal::Plain => None,
    }
}

/// Dispatches any operator name registered as a function to its backend.
/// Sits last in the chain.
#[derive(Clone)]
pub struct BackendOperatorFactory {
    functions: Arc<FunctionRegistry>,
}

impl BackendOperatorFactory {
    #[must_use]
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }
}

impl fmt::Debug for BackendOperatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendOperatorFactory")
            .field("functions", &self.functions.len())
            .finish()
    }
}

impl OperatorFactory for BackendOperatorFactory {
    fn matches(&self, op: &OperatorExpr) -> bool {
        self.functions.contains(&op.name)
    }

    fn create(
        &self,
        op: &OperatorExpr,
        compiler: &PredicateCompiler<'_>,
    ) -> Result<Box<dyn Predicate>, ConfigError> {
        let Some(mapping) = self.functions.get(&op.name) else {
            return Err(compiler.unresolved(op));
        };
        let args = op
            .args
            .iter()
            .map(|arg| compiler.compile_value(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(InvocationOperator::new(
            mapping.clone(),
            args,
            Arc::clone(compiler.cache()),
        )))
    }
}

/// The ordered factory chain.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    factories: Vec<Arc<dyn OperatorFactory>>,
}

impl OperatorRegistry {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding the built-in factories.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.push(Arc::new(LogicalFactory));
        registry.push(Arc::new(ComparisonFactory));
        registry.push(Arc::new(MembershipFactory));
        registry.push(Arc::new(RegexFactory::new()));
        registry
    }

    /// Appends a factory to the end of the chain.
    pub fn push(&mut self, factory: Arc<dyn OperatorFactory>) {
        self.factories.push(factory);
    }

    /// Returns the first factory accepting `op`.
    #[must_use]
    pub fn resolve(&self, op: &OperatorExpr) -> Option<&dyn OperatorFactory> {
        self.factories
            .iter()
            .find(|f| f.matches(op))
            .map(|f| f.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str, arity: usize) -> OperatorExpr {
        OperatorExpr {
            name: name.to_string(),
            args: vec![Expression::int(1); arity],
        }
    }

    #[test]
    fn numeric_comparison_widens() {
        assert!(values_equal(&Value::Int(2), &Value::Float(2.0)));
        assert!(lt(&Value::Int(1), &Value::Float(1.5)));
        assert!(ge(&Value::Float(3.0), &Value::Int(3)));
        assert!(gt(&Value::from("b"), &Value::from("a")));
        assert!(lt(&Value::Bool(false), &Value::Bool(true)));
    }

    #[test]
    fn mismatched_kinds_are_unequal_and_unordered() {
        assert!(!eq(&Value::Int(1), &Value::from("1")));
        assert!(ne(&Value::Int(1), &Value::from("1")));
        assert!(!lt(&Value::Int(1), &Value::from("2")));
        assert!(!ge(&Value::Int(1), &Value::from("0")));
    }

    #[test]
    fn membership() {
        let list = Value::from(vec![1i64, 2, 3]);
        assert!(member_of(&Value::Float(2.0), &list));
        assert!(!member_of(&Value::Int(4), &list));
        assert!(!member_of(&Value::Int(1), &Value::Int(1)));
        assert!(contains(&list, &Value::Int(3)));
        assert!(contains(&Value::from("premium gold"), &Value::from("gold")));
    }

    #[test]
    fn chain_resolves_builtins_by_name_and_arity() {
        let chain = OperatorRegistry::with_builtins();
        assert_eq!(chain.len(), 4);
        assert!(chain.resolve(&op("and", 3)).is_some());
        assert!(chain.resolve(&op("not", 1)).is_some());
        assert!(chain.resolve(&op("not", 2)).is_none());
        assert!(chain.resolve(&op(">=", 2)).is_some());
        assert!(chain.resolve(&op("gt", 3)).is_none());
        assert!(chain.resolve(&op("in", 2)).is_some());
        assert!(chain.resolve(&op("matches", 2)).is_some());
        assert!(chain.resolve(&op("near", 2)).is_none());
    }

    #[test]
    fn backend_factory_follows_function_registry() {
        let mut functions = FunctionRegistry::new();
        functions.register(
            "near",
            Arc::new(|_: &crate::invocation::Call<'_>| -> Result<Value, crate::error::InvocationError> {
                Ok(Value::Bool(true))
            }),
        );
        let mut chain = OperatorRegistry::with_builtins();
        chain.push(Arc::new(BackendOperatorFactory::new(Arc::new(functions))));
        assert!(chain.resolve(&op("near", 2)).is_some());
        assert!(chain.resolve(&op("far", 2)).is_none());
    }

    #[test]
    fn regex_factory_owns_its_pattern_cache() {
        let patterns = Arc::new(PatternCache::new());
        let factory = RegexFactory::with_patterns(Arc::clone(&patterns));
        assert!(Arc::ptr_eq(factory.patterns(), &patterns));
        assert!(factory.matches(&op("matches", 2)));
        assert!(!factory.matches(&op("matches", 3)));

        let other = RegexFactory::new();
        assert!(!Arc::ptr_eq(other.patterns(), &patterns));
        assert!(patterns.lookup("^x+$").unwrap().is_some_and(|re| re.is_match("xx")));
        assert!(other.patterns().is_empty());
    }
}
