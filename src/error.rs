//! Error types for KyroRules.
//!
//! Errors are split the same way the engine's lifecycle is split:
//! - [`ValidationError`]: a rule or input is malformed before anything is compiled.
//! - [`ConfigError`]: compiling rules or building the engine failed. These abort
//!   engine or session construction and never surface during evaluation.
//! - [`ExecutionError`]: a backend call failed while a session was running. These
//!   are reported per rule and tuple and never abort the whole session.

use thiserror::Error;

/// Validation errors raised while building rules, configs or enumerators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Rule name cannot be empty")]
    EmptyRuleName,

    #[error("Rule '{rule}' has no predicate")]
    MissingPredicate {
        rule: String,
    },

    #[error("Rule '{rule}' declares attribute '{name}' more than once")]
    DuplicateAttribute {
        rule: String,
        name: String,
    },

    #[error("Rule '{rule}' declares fact '{id}' more than once")]
    DuplicateFact {
        rule: String,
        id: String,
    },

    #[error("Rule '{rule}' uses '{name}' as both an attribute and a fact, or uses a reserved name")]
    ConflictingIdentifier {
        rule: String,
        name: String,
    },

    #[error("Rule '{rule}' action '{action}' is not a function invocation")]
    InvalidAction {
        rule: String,
        action: String,
    },

    #[error("Fact '{fact}' has no candidate instances")]
    EmptyCandidates {
        fact: String,
    },

    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Configuration errors detected while compiling rules or building the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Rule '{rule}': no operator factory accepts '{name}' with {arity} argument(s)")]
    UnresolvedOperator {
        rule: String,
        name: String,
        arity: usize,
    },

    #[error("Rule '{rule}': no function registered under '{name}'")]
    UnresolvedFunction {
        rule: String,
        name: String,
    },

    #[error("Rule '{rule}': invalid reference path '{path}': {reason}")]
    InvalidPath {
        rule: String,
        path: String,
        reason: String,
    },

    #[error("Rule '{rule}': reference '{path}' has unknown root '{root}'")]
    UnknownRoot {
        rule: String,
        path: String,
        root: String,
    },

    #[error("Rule '{rule}': expression '{expression}' cannot be used as a predicate")]
    NotAPredicate {
        rule: String,
        expression: String,
    },

    #[error("Rule '{rule}': literal {value} does not match declared type {expected}")]
    LiteralTypeMismatch {
        rule: String,
        value: String,
        expected: String,
    },

    #[error("Rule '{rule}': invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        rule: String,
        pattern: String,
        reason: String,
    },

    #[error("A stop-processing listener is already registered")]
    DuplicateStopListener,

    #[error("No rules registered for session '{uri}'")]
    UnknownSession {
        uri: String,
    },
}

impl ConfigError {
    /// Returns the rule this error was raised for, if any.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::UnresolvedOperator { rule, .. }
            | Self::UnresolvedFunction { rule, .. }
            | Self::InvalidPath { rule, .. }
            | Self::UnknownRoot { rule, .. }
            | Self::NotAPredicate { rule, .. }
            | Self::LiteralTypeMismatch { rule, .. }
            | Self::InvalidRegex { rule, .. } => Some(rule),
            Self::DuplicateStopListener | Self::UnknownSession { .. } => None,
        }
    }
}

/// Execution errors raised by backend calls during a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Call '{call}' failed: {message}")]
    Invocation {
        call: String,
        message: String,
    },

    #[error("Operator '{operator}' returned a non-boolean value of type {actual}")]
    NonBooleanOperator {
        operator: String,
        actual: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

/// Failure reported by a call backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvocationError {
    message: String,
}

impl InvocationError {
    /// Creates a backend failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Top-level error type for KyroRules.
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl RuleError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for KyroRules operations.
pub type RuleResult<T> = Result<T, RuleError>;
