//! Declared types and type introspection.
//!
//! Rules declare the types of their facts and attributes with [`TypeRef`].
//! Reference resolution walks those types segment by segment through a
//! [`TypeIntrospector`], and the execution pipeline uses the same capability
//! to decide which runtime instances match a declared fact type.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TypeRef {
    /// Any non-null value; properties are resolved dynamically.
    Any,
    Bool,
    Int,
    Float,
    String,
    /// Homogeneous collection.
    List(Box<TypeRef>),
    /// A record type registered with the introspector.
    Named(String),
}

impl TypeRef {
    /// Creates a named record type.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Creates a collection type.
    #[must_use]
    pub fn list(element: Self) -> Self {
        Self::List(Box::new(element))
    }

    /// Returns true for types whose literals may hold `${...}` placeholders.
    #[must_use]
    pub const fn is_string_like(&self) -> bool {
        matches!(self, Self::String)
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Returns the element type of a collection.
    #[must_use]
    pub fn element_type(&self) -> Option<&TypeRef> {
        match self {
            Self::List(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Describes a named record type: its fields and the types it extends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, TypeRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    supertypes: Vec<String>,
}

impl TypeDescriptor {
    /// Creates a descriptor with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            supertypes: Vec::new(),
        }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    /// Declares a supertype. Fields of supertypes are visible on this type and
    /// instances of this type match facts declared with the supertype.
    #[must_use]
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<&TypeRef> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }
}

/// Introspection over declared types.
///
/// Implementations must be cheap to share across threads; the resolver and
/// the execution pipeline hold them behind an `Arc`.
pub trait TypeIntrospector: Send + Sync {
    /// Returns the type of `property` on `owner`, or `None` if `owner` has no
    /// such field or accessor.
    fn property_type(&self, owner: &TypeRef, property: &str) -> Option<TypeRef>;

    /// Returns true if `value` is an instance of `declared`.
    fn is_instance(&self, declared: &TypeRef, value: &Value) -> bool;
}

/// In-memory registry of record types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, replacing any previous descriptor of the same name.
    #[must_use]
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Registers a type, replacing any previous descriptor of the same name.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Finds a field on `name` or, breadth first, on its supertypes.
    fn lookup_field(&self, name: &str, field: &str) -> Option<TypeRef> {
        let mut queue = vec![name];
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(desc) = self.types.get(current) else {
                continue;
            };
            if let Some(ty) = desc.field_type(field) {
                return Some(ty.clone());
            }
            queue.splice(0..0, desc.supertypes.iter().map(String::as_str));
        }
        None
    }

    /// Returns true if `actual` is `expected` or transitively extends it.
    fn extends(&self, actual: &str, expected: &str) -> bool {
        let mut stack = vec![actual];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == expected {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(desc) = self.types.get(current) {
                stack.extend(desc.supertypes.iter().map(String::as_str));
            }
        }
        false
    }
}

impl TypeIntrospector for TypeRegistry {
    fn property_type(&self, owner: &TypeRef, property: &str) -> Option<TypeRef> {
        match owner {
            TypeRef::Any => Some(TypeRef::Any),
            TypeRef::Named(name) => self.lookup_field(name, property),
            _ => None,
        }
    }

    fn is_instance(&self, declared: &TypeRef, value: &Value) -> bool {
        match (declared, value) {
            (_, Value::Null) => false,
            (TypeRef::Any, _)
            | (TypeRef::Bool, Value::Bool(_))
            | (TypeRef::Int, Value::Int(_))
            | (TypeRef::Float, Value::Float(_))
            | (TypeRef::String, Value::String(_)) => true,
            (TypeRef::List(element), Value::List(items)) => {
                items.iter().all(|item| item.is_null() || self.is_instance(element, item))
            }
            (TypeRef::Named(name), Value::Record(record)) => self.extends(record.type_name(), name),
            _ => false,
        }
    }
}
