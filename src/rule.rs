//! Rule definitions.
//!
//! A [`Rule`] is immutable once built: attributes, declared facts, one root
//! predicate and an ordered list of actions. Rules are built once and reused
//! by every session that loads them.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::expr::Expression;
use crate::types::TypeRef;
use crate::value::Value;

/// The reserved reference root naming the session result object.
pub const CONTEXT_ROOT: &str = "ctx";

/// A static, rule-scoped named value.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub value: Value,
}

/// A typed fact binding the rule expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactDecl {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

/// A named unit of attributes, facts, one predicate and ordered actions.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Rule {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    attributes: Vec<Attribute>,
    #[serde(default)]
    facts: Vec<FactDecl>,
    predicate: Expression,
    #[serde(default)]
    actions: Vec<Expression>,
}

impl Rule {
    /// Creates a new rule builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Declared facts, in declaration order.
    #[must_use]
    pub fn facts(&self) -> &[FactDecl] {
        &self.facts
    }

    #[must_use]
    pub fn fact(&self, id: &str) -> Option<&FactDecl> {
        self.facts.iter().find(|f| f.id == id)
    }

    #[must_use]
    pub const fn predicate(&self) -> &Expression {
        &self.predicate
    }

    #[must_use]
    pub fn actions(&self) -> &[Expression] {
        &self.actions
    }

    /// Content hash of the rule (hex BLAKE3 over its structural `Hash`).
    ///
    /// Two structurally equal rules share a fingerprint, which lets an engine
    /// reuse one compiled form across sessions. Floats contribute their bit
    /// patterns, so `NaN`, `-0.0` and `null` literals all stay distinct.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Fingerprinter(blake3::Hasher::new());
        self.hash(&mut hasher);
        hasher.0.finalize().to_hex().to_string()
    }

    /// Validates structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyRuleName);
        }

        let mut attribute_names = HashSet::new();
        for attribute in &self.attributes {
            if !attribute_names.insert(attribute.name.as_str()) {
                return Err(ValidationError::DuplicateAttribute {
                    rule: self.name.clone(),
                    name: attribute.name.clone(),
                });
            }
            if attribute.name == CONTEXT_ROOT {
                return Err(self.conflicting(&attribute.name));
            }
        }

        let mut fact_ids = HashSet::new();
        for fact in &self.facts {
            if !fact_ids.insert(fact.id.as_str()) {
                return Err(ValidationError::DuplicateFact {
                    rule: self.name.clone(),
                    id: fact.id.clone(),
                });
            }
            if fact.id == CONTEXT_ROOT || attribute_names.contains(fact.id.as_str()) {
                return Err(self.conflicting(&fact.id));
            }
        }

        for action in &self.actions {
            if !matches!(action, Expression::Function(_)) {
                return Err(ValidationError::InvalidAction {
                    rule: self.name.clone(),
                    action: action.to_string(),
                });
            }
        }
        Ok(())
    }

    fn conflicting(&self, name: &str) -> ValidationError {
        ValidationError::ConflictingIdentifier {
            rule: self.name.clone(),
            name: name.to_string(),
        }
    }
}

/// Feeds `Hash` output into BLAKE3.
struct Fingerprinter(blake3::Hasher);

impl Hasher for Fingerprinter {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(&self) -> u64 {
        let digest = self.0.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

/// Builder for [`Rule`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    description: Option<String>,
    attributes: Vec<Attribute>,
    facts: Vec<FactDecl>,
    predicate: Option<Expression>,
    actions: Vec<Expression>,
}

impl RuleBuilder {
    /// Creates a builder for a rule with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            attributes: Vec::new(),
            facts: Vec::new(),
            predicate: None,
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, ty: TypeRef, value: impl Into<Value>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            ty,
            value: value.into(),
        });
        self
    }

    /// Declares a fact. Declaration order drives tuple enumeration order.
    #[must_use]
    pub fn fact(mut self, id: impl Into<String>, ty: TypeRef) -> Self {
        self.facts.push(FactDecl { id: id.into(), ty });
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn when(mut self, predicate: Expression) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn then(mut self, action: Expression) -> Self {
        self.actions.push(action);
        self
    }

    /// Builds and validates the rule.
    pub fn build(self) -> Result<Rule, ValidationError> {
        let predicate = self.predicate.ok_or_else(|| ValidationError::MissingPredicate {
            rule: self.name.clone(),
        })?;
        let rule = Rule {
            name: self.name,
            description: self.description,
            attributes: self.attributes,
            facts: self.facts,
            predicate,
            actions: self.actions,
        };
        rule.validate()?;
        Ok(rule)
    }
}
