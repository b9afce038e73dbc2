//! Compiled node types.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;

use crate::context::EvalContext;
use crate::error::ExecutionError;
use crate::invocation::{FunctionMapping, InvocationCache};
use crate::logic::Truth;
use crate::reference::Reference;
use crate::value::Value;

use super::{Predicate, ValueProvider};

/// A definite or unknown constant.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub Truth);

impl Predicate for Constant {
    fn test(&self, _ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        Ok(self.0)
    }
}

/// N-ary conjunction. Children run in declared order; the first `false`
/// stops evaluation.
#[derive(Debug)]
pub struct And {
    children: Vec<Box<dyn Predicate>>,
}

impl And {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Predicate>>) -> Self {
        Self { children }
    }
}

impl Predicate for And {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        let mut acc = Truth::True;
        for child in &self.children {
            match child.test(ctx)? {
                Truth::False => return Ok(Truth::False),
                other => acc = acc.and(other),
            }
        }
        Ok(acc)
    }
}

/// N-ary disjunction. Children run in declared order; the first `true`
/// stops evaluation.
#[derive(Debug)]
pub struct Or {
    children: Vec<Box<dyn Predicate>>,
}

impl Or {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Predicate>>) -> Self {
        Self { children }
    }
}

impl Predicate for Or {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        let mut acc = Truth::False;
        for child in &self.children {
            match child.test(ctx)? {
                Truth::True => return Ok(Truth::True),
                other => acc = acc.or(other),
            }
        }
        Ok(acc)
    }
}

#[derive(Debug)]
pub struct Not {
    inner: Box<dyn Predicate>,
}

impl Not {
    #[must_use]
    pub fn new(inner: Box<dyn Predicate>) -> Self {
        Self { inner }
    }
}

impl Predicate for Not {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        Ok(self.inner.test(ctx)?.not())
    }
}

/// Guards a rule's root predicate: every fact the rule's references depend
/// on must be bound, otherwise the rule does not match and the inner
/// predicate is never run.
#[derive(Debug)]
pub struct RequiredFacts {
    facts: Vec<String>,
    inner: Box<dyn Predicate>,
}

impl RequiredFacts {
    #[must_use]
    pub fn new(facts: Vec<String>, inner: Box<dyn Predicate>) -> Self {
        Self { facts, inner }
    }

    #[must_use]
    pub fn facts(&self) -> &[String] {
        &self.facts
    }
}

impl Predicate for RequiredFacts {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        if let Some(missing) = self.facts.iter().find(|f| !ctx.tuple().contains(f)) {
            tracing::trace!(rule = ctx.rule_name(), fact = %missing, "required fact not bound");
            return Ok(Truth::False);
        }
        self.inner.test(ctx)
    }
}

/// Uses a value as a predicate: `Bool` is definite, anything else unknown.
#[derive(Debug)]
pub struct ValuePredicate {
    provider: Box<dyn ValueProvider>,
}

impl ValuePredicate {
    #[must_use]
    pub fn new(provider: Box<dyn ValueProvider>) -> Self {
        Self { provider }
    }
}

impl Predicate for ValuePredicate {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        Ok(Truth::from(self.provider.provide(ctx)?.and_then(|v| v.as_bool())))
    }
}

/// Uses a predicate as a value: `Bool` for definite outcomes, absent when
/// unknown.
#[derive(Debug)]
pub struct PredicateValue {
    predicate: Box<dyn Predicate>,
}

impl PredicateValue {
    #[must_use]
    pub fn new(predicate: Box<dyn Predicate>) -> Self {
        Self { predicate }
    }
}

impl ValueProvider for PredicateValue {
    fn provide(&self, ctx: EvalContext<'_>) -> Result<Option<Value>, ExecutionError> {
        Ok(self.predicate.test(ctx)?.to_bool().map(Value::Bool))
    }
}

#[derive(Debug, Clone)]
pub struct LiteralValue(pub Value);

impl ValueProvider for LiteralValue {
    fn provide(&self, _ctx: EvalContext<'_>) -> Result<Option<Value>, ExecutionError> {
        Ok((!self.0.is_null()).then(|| self.0.clone()))
    }
}

/// An ordered sequence. Absent items are kept in place as `Null`.
#[derive(Debug)]
pub struct ValueList {
    items: Vec<Box<dyn ValueProvider>>,
}

impl ValueList {
    #[must_use]
    pub fn new(items: Vec<Box<dyn ValueProvider>>) -> Self {
        Self { items }
    }
}

impl ValueProvider for ValueList {
    fn provide(&self, ctx: EvalContext<'_>) -> Result<Option<Value>, ExecutionError> {
        let values = self
            .items
            .iter()
            .map(|item| Ok(item.provide(ctx)?.unwrap_or(Value::Null)))
            .collect::<Result<Vec<_>, ExecutionError>>()?;
        Ok(Some(Value::List(values)))
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceValue(pub Reference);

impl ValueProvider for ReferenceValue {
    fn provide(&self, ctx: EvalContext<'_>) -> Result<Option<Value>, ExecutionError> {
        Ok(self.0.resolve(&ctx))
    }
}

/// Resolves every argument, absent ones as `Null`.
fn resolve_args(
    args: &[Box<dyn ValueProvider>],
    ctx: EvalContext<'_>,
) -> Result<Vec<Option<Value>>, ExecutionError> {
    args.iter().map(|arg| arg.provide(ctx)).collect()
}

/// A function call in value position, or an action.
#[derive(Debug)]
pub struct FunctionValue {
    mapping: FunctionMapping,
    names: Vec<String>,
    args: Vec<Box<dyn ValueProvider>>,
    cache: Arc<InvocationCache>,
}

impl FunctionValue {
    #[must_use]
    pub fn new(
        mapping: FunctionMapping,
        params: Vec<(String, Box<dyn ValueProvider>)>,
        cache: Arc<InvocationCache>,
    ) -> Self {
        let (names, args) = params.into_iter().unzip();
        Self {
            mapping,
            names,
            args,
            cache,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.mapping.name()
    }

    /// Whether results are served from the invocation cache.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.mapping.is_cacheable()
    }

    /// Turns the call into an action: the backend runs on every evaluation.
    /// Calls nested in its arguments keep their own caching.
    #[must_use]
    pub fn into_action(mut self) -> Self {
        self.mapping = self.mapping.uncached();
        self
    }
}

impl ValueProvider for FunctionValue {
    fn provide(&self, ctx: EvalContext<'_>) -> Result<Option<Value>, ExecutionError> {
        let args: Vec<Value> = resolve_args(&self.args, ctx)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let value = self.mapping.dispatch(&self.cache, &args, &self.names, ctx)?;
        Ok((!value.is_null()).then_some(value))
    }
}

/// Signature of a built-in binary comparison.
pub type CompareFn = fn(&Value, &Value) -> bool;

/// A binary operator over two operands. Both operands are always resolved;
/// an absent operand makes the outcome unknown.
#[derive(Debug)]
pub struct Comparison {
    name: String,
    lhs: Box<dyn ValueProvider>,
    rhs: Box<dyn ValueProvider>,
    compare: CompareFn,
}

impl Comparison {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        lhs: Box<dyn ValueProvider>,
        rhs: Box<dyn ValueProvider>,
        compare: CompareFn,
    ) -> Self {
        Self {
            name: name.into(),
            lhs,
            rhs,
            compare,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Predicate for Comparison {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        let lhs = self.lhs.provide(ctx)?;
        let rhs = self.rhs.provide(ctx)?;
        match (lhs, rhs) {
            (Some(l), Some(r)) if !l.is_null() && !r.is_null() => Ok(Truth::from((self.compare)(&l, &r))),
            _ => Ok(Truth::Unknown),
        }
    }
}

const DEFAULT_PATTERN_CAPACITY: usize = 256;

/// Compiled runtime `matches` patterns.
///
/// Owned by the `matches` factory and shared by every rule it compiles. A
/// full cache is emptied before the next insert.
#[derive(Debug)]
pub struct PatternCache {
    patterns: RwLock<HashMap<String, Regex>>,
    capacity: usize,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PATTERN_CAPACITY)
    }
}

impl PatternCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the compiled pattern, or `None` if `pattern` is not a valid
    /// regex.
    ///
    /// # Errors
    /// `Internal` if the cache lock is poisoned.
    pub fn lookup(&self, pattern: &str) -> Result<Option<Regex>, ExecutionError> {
        if let Some(re) = self.patterns.read().map_err(poisoned)?.get(pattern) {
            return Ok(Some(re.clone()));
        }
        let Ok(compiled) = Regex::new(pattern) else {
            tracing::debug!(pattern, "runtime pattern does not compile");
            return Ok(None);
        };
        let mut patterns = self.patterns.write().map_err(poisoned)?;
        if patterns.len() >= self.capacity && !patterns.contains_key(pattern) {
            patterns.clear();
        }
        Ok(Some(patterns.entry(pattern.to_string()).or_insert(compiled).clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.read().map_or(0, |p| p.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: PoisonError<T>) -> ExecutionError {
    ExecutionError::Internal {
        message: "pattern cache lock poisoned".to_string(),
    }
}

/// Where a `matches` pattern comes from.
#[derive(Debug)]
pub enum Pattern {
    /// Compiled with the rule.
    Compiled(Regex),
    /// Evaluated per tuple and compiled through the shared cache.
    Dynamic {
        source: Box<dyn ValueProvider>,
        cache: Arc<PatternCache>,
    },
}

/// Regex match of a string subject against a pattern.
#[derive(Debug)]
pub struct RegexMatch {
    subject: Box<dyn ValueProvider>,
    pattern: Pattern,
}

impl RegexMatch {
    #[must_use]
    pub fn new(subject: Box<dyn ValueProvider>, pattern: Pattern) -> Self {
        Self { subject, pattern }
    }
}

impl Predicate for RegexMatch {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        let subject = self.subject.provide(ctx)?;
        let pattern = match &self.pattern {
            Pattern::Compiled(re) => Some(re.clone()),
            Pattern::Dynamic { source, cache } => match source.provide(ctx)? {
                Some(Value::String(p)) => cache.lookup(&p)?,
                _ => None,
            },
        };
        let (Some(subject), Some(re)) = (subject, pattern) else {
            return Ok(Truth::Unknown);
        };
        Ok(subject.as_str().map_or(Truth::False, |s| Truth::from(re.is_match(s))))
    }
}

/// A non-built-in operator dispatched to a registered backend.
///
/// Arguments resolve like a comparison's: all of them, with any absent one
/// making the outcome unknown. The backend must answer with a boolean.
#[derive(Debug)]
pub struct InvocationOperator {
    mapping: FunctionMapping,
    args: Vec<Box<dyn ValueProvider>>,
    cache: Arc<InvocationCache>,
}

impl InvocationOperator {
    #[must_use]
    pub fn new(
        mapping: FunctionMapping,
        args: Vec<Box<dyn ValueProvider>>,
        cache: Arc<InvocationCache>,
    ) -> Self {
        Self { mapping, args, cache }
    }
}

impl Predicate for InvocationOperator {
    fn test(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        let resolved = resolve_args(&self.args, ctx)?;
        let Some(args) = resolved
            .into_iter()
            .map(|v| v.filter(|v| !v.is_null()))
            .collect::<Option<Vec<Value>>>()
        else {
            return Ok(Truth::Unknown);
        };
        match self.mapping.dispatch(&self.cache, &args, &[], ctx)? {
            Value::Bool(b) => Ok(Truth::from(b)),
            Value::Null => Ok(Truth::Unknown),
            other => Err(ExecutionError::NonBooleanOperator {
                operator: self.mapping.name().to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}
