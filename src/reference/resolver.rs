//! Static reference resolution.
//!
//! Resolving `order.customer.tier` means walking the declared type of
//! `order` one segment at a time through the [`TypeIntrospector`]. The
//! (declaring type, path) → resolved type lookups are memoized for the
//! resolver's lifetime; the resolver is built once per engine and shared.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ConfigError;
use crate::rule::{Rule, CONTEXT_ROOT};
use crate::types::{TypeIntrospector, TypeRef};

use super::placeholder::ReferencePath;
use super::{Reference, ReferenceRoot};

/// Compiles placeholder paths into typed [`Reference`]s.
pub struct ReferenceResolver {
    types: Arc<dyn TypeIntrospector>,
    cache: RwLock<HashMap<(TypeRef, String), TypeRef>>,
}

impl ReferenceResolver {
    /// Creates a resolver over the given introspector.
    #[must_use]
    pub fn new(types: Arc<dyn TypeIntrospector>) -> Self {
        Self {
            types,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the introspector used for resolution.
    #[must_use]
    pub fn types(&self) -> &Arc<dyn TypeIntrospector> {
        &self.types
    }

    /// Number of memoized type lookups.
    #[must_use]
    pub fn cached_lookups(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Compiles a placeholder path against a rule's attributes and facts.
    ///
    /// # Errors
    /// `InvalidPath` for malformed paths or segments the declared type does not
    /// have, `UnknownRoot` when the root is neither an attribute, a fact nor
    /// `ctx`.
    pub fn compile(&self, rule: &Rule, raw: &str) -> Result<Reference, ConfigError> {
        let path = ReferencePath::parse(raw).map_err(|reason| ConfigError::InvalidPath {
            rule: rule.name().to_string(),
            path: raw.to_string(),
            reason,
        })?;

        // ctx is untyped until runtime.
        if path.root() == CONTEXT_ROOT {
            return Ok(Reference {
                root: ReferenceRoot::Context,
                declaring_type: TypeRef::Any,
                resolved_type: TypeRef::Any,
                path,
            });
        }

        let (root, declaring_type) = if let Some(attribute) = rule.attribute(path.root()) {
            (ReferenceRoot::Attribute(attribute.name.clone()), attribute.ty.clone())
        } else if let Some(fact) = rule.fact(path.root()) {
            (ReferenceRoot::Fact(fact.id.clone()), fact.ty.clone())
        } else {
            return Err(ConfigError::UnknownRoot {
                rule: rule.name().to_string(),
                path: path.to_string(),
                root: path.root().to_string(),
            });
        };

        let resolved_type = self
            .resolve_type(&declaring_type, &path)
            .map_err(|reason| ConfigError::InvalidPath {
                rule: rule.name().to_string(),
                path: path.to_string(),
                reason,
            })?;

        Ok(Reference {
            root,
            declaring_type,
            resolved_type,
            path,
        })
    }

    /// Resolves the type at the end of `path`, starting from `declaring`.
    ///
    /// # Errors
    /// Returns a reason when a segment does not exist on the current type.
    pub fn resolve_type(&self, declaring: &TypeRef, path: &ReferencePath) -> Result<TypeRef, String> {
        if path.segments().is_empty() {
            return Ok(declaring.clone());
        }

        let key = (declaring.clone(), path.tail());
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let resolved = self.walk(declaring, path.segments())?;

        // Another thread may have inserted it while we walked; both results
        // are identical.
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| resolved.clone());
        Ok(resolved)
    }

    fn walk(&self, declaring: &TypeRef, segments: &[String]) -> Result<TypeRef, String> {
        let mut current = declaring.clone();
        for (i, segment) in segments.iter().enumerate() {
            if let TypeRef::List(element) = &current {
                let element = element.as_ref().clone();
                let property = self.property(&element, segment)?;
                // A path that continues past a collection element is typed as a
                // collection of the element itself, not of the nested property.
                // Runtime resolution still walks the full path.
                if i + 1 < segments.len() {
                    return Ok(TypeRef::list(element));
                }
                return Ok(TypeRef::list(property));
            }
            current = self.property(&current, segment)?;
        }
        Ok(current)
    }

    fn property(&self, owner: &TypeRef, segment: &str) -> Result<TypeRef, String> {
        self.types
            .property_type(owner, segment)
            .ok_or_else(|| format!("type {owner} has no property '{segment}'"))
    }
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("cached_lookups", &self.cached_lookups())
            .finish_non_exhaustive()
    }
}
