//! Rule compilation.
//!
//! [`PredicateCompiler`] turns one rule's expression trees into a
//! [`CompiledRule`]. Every name and path is resolved here, so an unknown
//! operator, function or reference fails compilation instead of surfacing
//! while a session runs.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::EvalContext;
use crate::error::{ConfigError, ExecutionError};
use crate::expr::{Expression, FunctionExpr, OperatorExpr, ValueExpr};
use crate::invocation::{FunctionRegistry, InvocationCache};
use crate::logic::Truth;
use crate::reference::{classify, Literal, ReferenceResolver};
use crate::rule::Rule;
use crate::types::TypeRef;
use crate::value::Value;

use super::nodes::{
    Constant, FunctionValue, LiteralValue, PredicateValue, ReferenceValue, RequiredFacts,
    ValueList, ValuePredicate,
};
use super::operators::OperatorRegistry;
use super::{Predicate, ValueProvider};

/// Compiles the expressions of a single rule.
///
/// A compiler is scoped to one rule; it records which facts the rule's
/// references depend on while compiling.
pub struct PredicateCompiler<'a> {
    rule: &'a Arc<Rule>,
    resolver: &'a ReferenceResolver,
    functions: &'a FunctionRegistry,
    operators: &'a OperatorRegistry,
    cache: &'a Arc<InvocationCache>,
    required: RefCell<BTreeSet<String>>,
}

impl<'a> PredicateCompiler<'a> {
    #[must_use]
    pub fn new(
        rule: &'a Arc<Rule>,
        resolver: &'a ReferenceResolver,
        functions: &'a FunctionRegistry,
        operators: &'a OperatorRegistry,
        cache: &'a Arc<InvocationCache>,
    ) -> Self {
        Self {
            rule,
            resolver,
            functions,
            operators,
            cache,
            required: RefCell::new(BTreeSet::new()),
        }
    }

    /// The rule being compiled.
    #[must_use]
    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    /// The invocation cache compiled calls will consult.
    #[must_use]
    pub const fn cache(&self) -> &'a Arc<InvocationCache> {
        self.cache
    }

    /// Compiles the whole rule: predicate, actions, and the required-fact
    /// guard around the predicate.
    ///
    /// # Errors
    /// The first configuration error found.
    pub fn compile(self) -> Result<CompiledRule, ConfigError> {
        let predicate = self.compile_predicate(self.rule.predicate())?;
        let actions = self
            .rule
            .actions()
            .iter()
            .map(|action| match action {
                Expression::Function(f) => self.compile_function(f).map(FunctionValue::into_action),
                other => Err(self.not_a_predicate(other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let required: Vec<String> = self.required.into_inner().into_iter().collect();
        let predicate = if required.is_empty() {
            predicate
        } else {
            Box::new(RequiredFacts::new(required, predicate))
        };

        tracing::debug!(
            rule = self.rule.name(),
            actions = actions.len(),
            "compiled rule"
        );
        Ok(CompiledRule {
            rule: Arc::clone(self.rule),
            predicate,
            actions,
        })
    }

    /// Compiles an expression in predicate position.
    ///
    /// # Errors
    /// Unresolved operators, functions or references, or an expression that
    /// can never be boolean.
    pub fn compile_predicate(&self, expr: &Expression) -> Result<Box<dyn Predicate>, ConfigError> {
        match expr {
            Expression::Operator(op) => self.compile_operator(op),
            Expression::Function(f) => Ok(Box::new(ValuePredicate::new(Box::new(
                self.compile_function(f)?,
            )))),
            Expression::Value(v) => match (classify(&v.ty, &v.value), &v.value) {
                (Literal::Plain, Value::Bool(b)) => Ok(Box::new(Constant(Truth::from(*b)))),
                _ => Ok(Box::new(ValuePredicate::new(self.compile_literal(v)?))),
            },
            Expression::Values(_) => Err(self.not_a_predicate(expr)),
        }
    }

    /// Compiles an expression in value position.
    ///
    /// # Errors
    /// Unresolved operators, functions or references, or a literal that does
    /// not fit its declared type.
    pub fn compile_value(&self, expr: &Expression) -> Result<Box<dyn ValueProvider>, ConfigError> {
        match expr {
            Expression::Value(v) => self.compile_literal(v),
            Expression::Values(values) => {
                let items = values
                    .items
                    .iter()
                    .map(|item| self.compile_value(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(ValueList::new(items)))
            }
            Expression::Function(f) => Ok(Box::new(self.compile_function(f)?)),
            Expression::Operator(op) => Ok(Box::new(PredicateValue::new(self.compile_operator(op)?))),
        }
    }

    fn compile_operator(&self, op: &OperatorExpr) -> Result<Box<dyn Predicate>, ConfigError> {
        self.operators
            .resolve(op)
            .ok_or_else(|| self.unresolved(op))?
            .create(op, self)
    }

    fn compile_function(&self, f: &FunctionExpr) -> Result<FunctionValue, ConfigError> {
        let mapping = self
            .functions
            .get(&f.name)
            .ok_or_else(|| ConfigError::UnresolvedFunction {
                rule: self.rule.name().to_string(),
                name: f.name.clone(),
            })?;
        let params = f
            .params
            .iter()
            .map(|p| Ok((p.name.clone(), self.compile_value(&p.value)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(FunctionValue::new(mapping.clone(), params, Arc::clone(self.cache)))
    }

    fn compile_literal(&self, v: &ValueExpr) -> Result<Box<dyn ValueProvider>, ConfigError> {
        match classify(&v.ty, &v.value) {
            Literal::Placeholder(path) => {
                let reference = self.resolver.compile(self.rule, path)?;
                if let Some(fact) = reference.fact_dependency() {
                    self.required.borrow_mut().insert(fact.to_string());
                }
                Ok(Box::new(ReferenceValue(reference)))
            }
            Literal::Escaped(text) => Ok(Box::new(LiteralValue(Value::String(text)))),
            Literal::Plain => {
                if !self.literal_fits(&v.ty, &v.value) {
                    return Err(ConfigError::LiteralTypeMismatch {
                        rule: self.rule.name().to_string(),
                        value: v.value.to_string(),
                        expected: v.ty.to_string(),
                    });
                }
                Ok(Box::new(LiteralValue(v.value.clone())))
            }
        }
    }

    fn literal_fits(&self, ty: &TypeRef, value: &Value) -> bool {
        match (ty, value) {
            (_, Value::Null) | (TypeRef::Float, Value::Int(_)) => true,
            _ => self.resolver.types().is_instance(ty, value),
        }
    }

    pub(crate) fn unresolved(&self, op: &OperatorExpr) -> ConfigError {
        ConfigError::UnresolvedOperator {
            rule: self.rule.name().to_string(),
            name: op.name.clone(),
            arity: op.arity(),
        }
    }

    fn not_a_predicate(&self, expr: &Expression) -> ConfigError {
        ConfigError::NotAPredicate {
            rule: self.rule.name().to_string(),
            expression: expr.to_string(),
        }
    }
}

/// An action that failed while a rule fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// Index of the failing action in the rule's action list.
    pub index: usize,
    pub error: ExecutionError,
}

/// A rule with its predicate and actions compiled.
///
/// Immutable and shareable across threads and sessions.
#[derive(Debug)]
pub struct CompiledRule {
    rule: Arc<Rule>,
    predicate: Box<dyn Predicate>,
    actions: Vec<FunctionValue>,
}

impl CompiledRule {
    #[must_use]
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.rule.name()
    }

    /// Evaluates the guarded predicate.
    ///
    /// # Errors
    /// Backend failures raised by functions or operators in the predicate.
    pub fn evaluate(&self, ctx: EvalContext<'_>) -> Result<Truth, ExecutionError> {
        self.predicate.test(ctx)
    }

    /// Runs the actions in declared order, stopping at the first failure.
    ///
    /// # Errors
    /// The failing action's index and error; later actions are skipped.
    pub fn fire(&self, ctx: EvalContext<'_>) -> Result<(), ActionFailure> {
        for (index, action) in self.actions.iter().enumerate() {
            action
                .provide(ctx)
                .map_err(|error| ActionFailure { index, error })?;
        }
        Ok(())
    }
}
