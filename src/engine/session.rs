//! Sessions.
//!
//! A [`Session`] holds the compiled rules of one repository URI. Every
//! [`Session::execute`] call starts from scratch: facts are partitioned by
//! the rules' declared types, tuples are enumerated, predicates evaluated
//! and actions fired against the caller's result value.

use std::fmt;
use std::iter;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{EvalContext, SessionControl, SessionResult, StopListener};
use crate::error::{ExecutionError, RuleResult};
use crate::logic::Truth;
use crate::predicate::CompiledRule;
use crate::tuple::{FactCandidates, Tuple, TupleEnumerator};
use crate::types::TypeIntrospector;
use crate::value::Value;

use super::config::ExecutionMode;
use super::events::{ErrorEvent, ErrorHandler};
use super::runtime;

/// Unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One schedulable piece of work: a rule and one tuple of its facts.
pub(crate) struct Unit<'a> {
    pub(crate) rule: &'a CompiledRule,
    pub(crate) tuple: Tuple<'a>,
}

/// A compiled rule set bound to a session URI.
pub struct Session {
    id: SessionId,
    uri: String,
    rules: Vec<Arc<CompiledRule>>,
    types: Arc<dyn TypeIntrospector>,
    error_handler: Arc<dyn ErrorHandler>,
    stop_listener: Option<Arc<dyn StopListener>>,
    mode: ExecutionMode,
}

impl Session {
    pub(crate) fn new(
        uri: String,
        rules: Vec<Arc<CompiledRule>>,
        types: Arc<dyn TypeIntrospector>,
        error_handler: Arc<dyn ErrorHandler>,
        stop_listener: Option<Arc<dyn StopListener>>,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            id: SessionId::new(),
            uri,
            rules,
            types,
            error_handler,
            stop_listener,
            mode,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Names of the session's rules, in repository order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Runs every rule against `facts`, threading `initial` through the
    /// actions, and returns it as mutated.
    ///
    /// Execution errors are reported to the error handler and never abort
    /// the run. A stop request lets running units finish and starts no new
    /// ones.
    ///
    /// # Errors
    /// `Internal` if parallel workers could not be started or panicked.
    pub fn execute(&self, initial: Value, facts: &[Value]) -> RuleResult<Value> {
        let result = SessionResult::new(initial);
        let control = SessionControl::new(self.stop_listener.clone());
        tracing::debug!(
            session = %self.id,
            uri = %self.uri,
            rules = self.rules.len(),
            facts = facts.len(),
            "executing session"
        );

        match self.mode {
            ExecutionMode::Sequential => {
                for unit in self.units(facts) {
                    if control.is_stopped() {
                        break;
                    }
                    self.run_unit(&unit, &result, &control);
                }
            }
            ExecutionMode::Parallel {
                workers,
                queue_capacity,
            } => runtime::run_parallel(self, facts, &result, &control, workers, queue_capacity)?,
        }

        Ok(result.into_inner())
    }

    /// Every unit of one execution, lazily: rules in order, each rule's
    /// tuples in odometer order.
    pub(crate) fn units<'a>(&'a self, facts: &'a [Value]) -> impl Iterator<Item = Unit<'a>> + 'a {
        self.rules.iter().flat_map(move |rule| {
            let rule: &'a CompiledRule = rule;
            self.tuples(rule, facts).map(move |tuple| Unit { rule, tuple })
        })
    }

    fn tuples<'a>(
        &self,
        rule: &'a CompiledRule,
        facts: &'a [Value],
    ) -> Box<dyn Iterator<Item = Tuple<'a>> + 'a> {
        let declared = rule.rule().facts();
        if declared.is_empty() {
            return Box::new(iter::once(Tuple::new()));
        }

        let mut candidates = FactCandidates::new();
        for decl in declared {
            let matching: Vec<&Value> = facts
                .iter()
                .filter(|fact| self.types.is_instance(&decl.ty, fact))
                .collect();
            if matching.is_empty() {
                tracing::debug!(
                    rule = rule.name(),
                    fact = %decl.id,
                    ty = %decl.ty,
                    "no matching facts, skipping rule"
                );
                return Box::new(iter::empty());
            }
            candidates.push(&decl.id, matching);
        }

        match TupleEnumerator::new(candidates) {
            Ok(tuples) => Box::new(tuples),
            Err(error) => {
                tracing::error!(rule = rule.name(), %error, "cannot enumerate tuples");
                Box::new(iter::empty())
            }
        }
    }

    /// Evaluates one unit and fires the rule's actions if it matches.
    pub(crate) fn run_unit(&self, unit: &Unit<'_>, result: &SessionResult, control: &SessionControl) {
        let rule = unit.rule.rule();
        let ctx = EvalContext::new(rule.name(), rule.attributes(), &unit.tuple, result, control);

        match unit.rule.evaluate(ctx) {
            Ok(Truth::True) => {
                tracing::trace!(rule = rule.name(), tuple = unit.tuple.len(), "rule matched");
                if let Err(failure) = unit.rule.fire(ctx) {
                    let expression = rule
                        .actions()
                        .get(failure.index)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    self.report(rule.name(), expression, failure.error);
                }
            }
            Ok(outcome) => {
                tracing::trace!(rule = rule.name(), %outcome, "rule did not match");
            }
            Err(error) => self.report(rule.name(), rule.predicate().to_string(), error),
        }
    }

    fn report(&self, rule: &str, expression: String, error: ExecutionError) {
        let event = ErrorEvent::execution(self.id, &self.uri, rule, expression, error);
        self.error_handler.handle(&event);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("rules", &self.rule_names())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
