//! `${path}` references.
//!
//! Placeholders are compiled into typed [`Reference`]s when a rule is
//! compiled, and resolved to live values against an [`EvalContext`] for every
//! tuple.

/// Placeholder detection and path parsing.
pub mod placeholder;
/// Static type resolution with memoization.
pub mod resolver;

use crate::context::EvalContext;
use crate::types::TypeRef;
use crate::value::Value;

pub use placeholder::{classify, Literal, ReferencePath};
pub use resolver::ReferenceResolver;

/// What a reference path is rooted at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceRoot {
    /// A rule attribute.
    Attribute(String),
    /// A declared fact identifier.
    Fact(String),
    /// The session result object.
    Context,
}

/// A compiled placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub(crate) root: ReferenceRoot,
    pub(crate) declaring_type: TypeRef,
    pub(crate) resolved_type: TypeRef,
    pub(crate) path: ReferencePath,
}

impl Reference {
    #[must_use]
    pub const fn root(&self) -> &ReferenceRoot {
        &self.root
    }

    /// Declared type of the root.
    #[must_use]
    pub const fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Statically resolved type of the full path. `Any` for `ctx` paths.
    #[must_use]
    pub const fn resolved_type(&self) -> &TypeRef {
        &self.resolved_type
    }

    #[must_use]
    pub const fn path(&self) -> &ReferencePath {
        &self.path
    }

    /// The fact this reference needs bound in the tuple, if any.
    #[must_use]
    pub fn fact_dependency(&self) -> Option<&str> {
        match &self.root {
            ReferenceRoot::Fact(id) => Some(id),
            ReferenceRoot::Attribute(_) | ReferenceRoot::Context => None,
        }
    }

    /// Resolves the reference to its current value.
    ///
    /// Returns `None` when the root is unbound or any value along the path is
    /// null or lacks the property; never panics on absent data.
    #[must_use]
    pub fn resolve(&self, ctx: &EvalContext<'_>) -> Option<Value> {
        let segments = self.path.segments();
        match &self.root {
            ReferenceRoot::Context => ctx.result().read(|result| walk(result, segments)),
            ReferenceRoot::Attribute(name) => walk(ctx.attribute(name)?, segments),
            ReferenceRoot::Fact(id) => walk(ctx.tuple().get(id)?, segments),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}}}", self.path)
    }
}

/// Walks `segments` from `value` by live property access.
///
/// A list in the middle of a path is projected: the remaining path is walked
/// on every element, and elements where it is absent become `Null`.
fn walk(value: &Value, segments: &[String]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return if value.is_null() { None } else { Some(value.clone()) };
    };
    match value {
        Value::Record(record) => walk(record.get(head)?, rest),
        Value::List(items) => Some(Value::List(
            items
                .iter()
                .map(|item| walk(item, segments).unwrap_or(Value::Null))
                .collect(),
        )),
        _ => None,
    }
}
