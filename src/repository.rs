//! Rule repositories.
//!
//! A repository maps a session URI to the ordered rules that session runs.
//! The engine consults it once per session creation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::rule::Rule;

/// Source of rules by session URI.
pub trait RuleRepository: Send + Sync {
    /// Returns the rules registered for `uri`, in order, or `None` if the URI
    /// is unknown.
    fn rules(&self, uri: &str) -> Option<Vec<Arc<Rule>>>;
}

/// A repository held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    sessions: RwLock<HashMap<String, Vec<Arc<Rule>>>>,
}

impl InMemoryRuleRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule set, returning the repository.
    #[must_use]
    pub fn with_rules(self, uri: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.register(uri, rules);
        self
    }

    /// Replaces the rule set for `uri`.
    pub fn register(&self, uri: impl Into<String>, rules: impl IntoIterator<Item = Rule>) {
        let rules = rules.into_iter().map(Arc::new).collect();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), rules);
    }

    /// Appends one rule to the set for `uri`, creating the set if needed.
    pub fn add(&self, uri: impl Into<String>, rule: Rule) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uri.into())
            .or_default()
            .push(Arc::new(rule));
    }

    /// Removes the rule set for `uri`. Returns true if one existed.
    pub fn remove(&self, uri: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
            .is_some()
    }

    /// Registered session URIs, sorted.
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        uris.sort();
        uris
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn rules(&self, uri: &str) -> Option<Vec<Arc<Rule>>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }
}
