//! Error events and the error sink.
//!
//! Configuration errors found while creating a session and execution errors
//! raised while it runs are reported as discrete [`ErrorEvent`]s to one
//! [`ErrorHandler`].

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, ExecutionError};

use super::SessionId;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A rule failed to compile; the session was not created.
    Configuration(ConfigError),
    /// A backend call failed for one rule and tuple.
    Execution(ExecutionError),
}

/// A reported error.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub session: Option<SessionId>,
    pub uri: String,
    pub rule: Option<String>,
    /// The expression that failed, rendered.
    pub expression: Option<String>,
    pub kind: ErrorKind,
    pub at: DateTime<Utc>,
}

impl ErrorEvent {
    pub(crate) fn configuration(uri: &str, error: ConfigError) -> Self {
        Self {
            session: None,
            uri: uri.to_string(),
            rule: error.rule().map(str::to_string),
            expression: None,
            kind: ErrorKind::Configuration(error),
            at: Utc::now(),
        }
    }

    pub(crate) fn execution(
        session: SessionId,
        uri: &str,
        rule: &str,
        expression: String,
        error: ExecutionError,
    ) -> Self {
        Self {
            session: Some(session),
            uri: uri.to_string(),
            rule: Some(rule.to_string()),
            expression: Some(expression),
            kind: ErrorKind::Execution(error),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind, ErrorKind::Configuration(_))
    }

    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self.kind, ErrorKind::Execution(_))
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Configuration(e) => write!(f, "[{}] {e}", self.uri),
            ErrorKind::Execution(e) => write!(
                f,
                "[{}] rule '{}' at '{}': {e}",
                self.uri,
                self.rule.as_deref().unwrap_or("?"),
                self.expression.as_deref().unwrap_or("?"),
            ),
        }
    }
}

/// Receives error events. Must tolerate calls from worker threads.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, event: &ErrorEvent);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ErrorEvent) + Send + Sync,
{
    fn handle(&self, event: &ErrorEvent) {
        self(event);
    }
}

/// The default sink: logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, event: &ErrorEvent) {
        match &event.kind {
            ErrorKind::Configuration(error) => tracing::error!(
                uri = %event.uri,
                rule = event.rule.as_deref(),
                %error,
                "rule configuration error"
            ),
            ErrorKind::Execution(error) => tracing::warn!(
                uri = %event.uri,
                session = ?event.session,
                rule = event.rule.as_deref(),
                expression = event.expression.as_deref(),
                %error,
                "rule execution error"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_kind() {
        let event = ErrorEvent::execution(
            SessionId::new(),
            "orders",
            "discount",
            "apply(rate=0.1)".to_string(),
            ExecutionError::Invocation {
                call: "apply".to_string(),
                message: "down".to_string(),
            },
        );
        assert!(event.is_execution());
        assert_eq!(
            event.to_string(),
            "[orders] rule 'discount' at 'apply(rate=0.1)': Call 'apply' failed: down"
        );

        let event = ErrorEvent::configuration("orders", ConfigError::DuplicateStopListener);
        assert!(event.is_configuration());
        assert_eq!(event.rule, None);
        LoggingErrorHandler.handle(&event);
    }
}
