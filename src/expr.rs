//! Expression model for rule predicates and actions.
//!
//! Expressions are plain immutable data. They carry no behavior beyond
//! construction helpers and a display form used in error events; the
//! predicate compiler turns them into an executable graph.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TypeRef;
use crate::value::Value;

/// A node of a rule's predicate or action tree.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// A literal, or a `${path}` placeholder when the declared type is a string.
    Value(ValueExpr),
    /// An ordered homogeneous sequence.
    Values(ValuesExpr),
    /// A named call returning a value.
    Function(FunctionExpr),
    /// A named boolean or relational call evaluated in three-valued logic.
    Operator(OperatorExpr),
}

/// A literal or placeholder value.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValueExpr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub value: Value,
}

/// An ordered sequence of expressions.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValuesExpr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub element_type: TypeRef,
    pub items: Vec<Expression>,
}

/// A named function call with named parameters.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub name: String,
    pub return_type: TypeRef,
    #[serde(default)]
    pub params: Vec<Param>,
}

/// A named function parameter.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Expression,
}

/// A named operator call with positional arguments.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct OperatorExpr {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expression>,
}

impl OperatorExpr {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl Expression {
    /// A typed literal.
    #[must_use]
    pub fn literal(ty: TypeRef, value: impl Into<Value>) -> Self {
        Self::Value(ValueExpr {
            name: None,
            ty,
            value: value.into(),
        })
    }

    /// A string literal. Strings of the form `${path}` become references.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(TypeRef::String, value.into())
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::literal(TypeRef::Int, value)
    }

    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::literal(TypeRef::Float, value)
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::literal(TypeRef::Bool, value)
    }

    /// A `${path}` placeholder.
    #[must_use]
    pub fn placeholder(path: &str) -> Self {
        Self::string(format!("${{{path}}}"))
    }

    /// An ordered list of expressions.
    #[must_use]
    pub fn values(element_type: TypeRef, items: Vec<Expression>) -> Self {
        Self::Values(ValuesExpr {
            name: None,
            element_type,
            items,
        })
    }

    /// A function call.
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        return_type: TypeRef,
        params: Vec<(&str, Expression)>,
    ) -> Self {
        Self::Function(FunctionExpr {
            name: name.into(),
            return_type,
            params: params
                .into_iter()
                .map(|(name, value)| Param {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        })
    }

    /// An operator call.
    #[must_use]
    pub fn operator(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::Operator(OperatorExpr {
            name: name.into(),
            args,
        })
    }

    #[must_use]
    pub fn and(args: Vec<Expression>) -> Self {
        Self::operator("and", args)
    }

    #[must_use]
    pub fn or(args: Vec<Expression>) -> Self {
        Self::operator("or", args)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(arg: Expression) -> Self {
        Self::operator("not", vec![arg])
    }

    #[must_use]
    pub fn eq(lhs: Expression, rhs: Expression) -> Self {
        Self::operator("eq", vec![lhs, rhs])
    }

    #[must_use]
    pub fn gt(lhs: Expression, rhs: Expression) -> Self {
        Self::operator("gt", vec![lhs, rhs])
    }

    #[must_use]
    pub fn lt(lhs: Expression, rhs: Expression) -> Self {
        Self::operator("lt", vec![lhs, rhs])
    }

    /// Returns true for `Function` and `Operator` nodes.
    #[must_use]
    pub const fn is_invocation(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Operator(_))
    }

    /// Returns the call name of an invocation.
    #[must_use]
    pub fn invocation_name(&self) -> Option<&str> {
        match self {
            Self::Function(f) => Some(&f.name),
            Self::Operator(o) => Some(&o.name),
            Self::Value(_) | Self::Values(_) => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => match &v.value {
                Value::String(s) => f.write_str(s),
                other => write!(f, "{other}"),
            },
            Self::Values(v) => {
                write!(f, "[")?;
                write_joined(f, v.items.iter().map(|e| e as &dyn fmt::Display))?;
                write!(f, "]")
            }
            Self::Function(func) => {
                write!(f, "{}(", func.name)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", p.name, p.value)?;
                }
                write!(f, ")")
            }
            Self::Operator(op) => {
                write!(f, "{}(", op.name)?;
                write_joined(f, op.args.iter().map(|e| e as &dyn fmt::Display))?;
                write!(f, ")")
            }
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a dyn fmt::Display>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
