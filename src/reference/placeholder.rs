//! Placeholder detection, escaping and path parsing.
//!
//! A string literal of the exact form `${path}` is a reference candidate.
//! A literal that starts with one or more backslashes followed by `${` is an
//! escaped literal: exactly one leading backslash is stripped and the rest is
//! kept as plain text.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::TypeRef;
use crate::value::Value;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        // Constant pattern; compiling it cannot fail.
        Regex::new(r"^\$\{([^{}]*)\}$").unwrap_or_else(|e| unreachable!("placeholder regex: {e}"))
    })
}

fn escaped_regex() -> &'static Regex {
    static ESCAPED: OnceLock<Regex> = OnceLock::new();
    ESCAPED.get_or_init(|| {
        Regex::new(r"^\\+\$\{").unwrap_or_else(|e| unreachable!("escaped placeholder regex: {e}"))
    })
}

fn segment_regex() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| unreachable!("segment regex: {e}"))
    })
}

/// How a literal value is to be treated by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal<'a> {
    /// A `${path}` placeholder; carries the text between the braces.
    Placeholder(&'a str),
    /// An escaped placeholder; carries the text with one backslash removed.
    Escaped(String),
    /// An ordinary literal.
    Plain,
}

/// Classifies a literal of the given declared type.
#[must_use]
pub fn classify<'a>(ty: &TypeRef, value: &'a Value) -> Literal<'a> {
    if !ty.is_string_like() {
        return Literal::Plain;
    }
    let Some(text) = value.as_str() else {
        return Literal::Plain;
    };
    if escaped_regex().is_match(text) {
        return Literal::Escaped(text[1..].to_string());
    }
    match placeholder_regex().captures(text).and_then(|c| c.get(1)) {
        Some(path) => Literal::Placeholder(path.as_str()),
        None => Literal::Plain,
    }
}

/// A parsed dotted path: `<root>(.<segment>)*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferencePath {
    raw: String,
    root: String,
    segments: Vec<String>,
}

impl ReferencePath {
    /// Parses a path.
    ///
    /// # Errors
    /// Returns a human-readable reason if the path is empty or a segment is
    /// not an identifier.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("path is empty".to_string());
        }
        let mut names = Vec::new();
        for part in trimmed.split('.') {
            if !segment_regex().is_match(part) {
                return Err(format!("'{part}' is not a valid path segment"));
            }
            names.push(part.to_string());
        }
        let root = names.remove(0);
        Ok(Self {
            raw: trimmed.to_string(),
            root,
            segments: names,
        })
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segments after the root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments after the root, joined with dots.
    #[must_use]
    pub fn tail(&self) -> String {
        self.segments.join(".")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn detects_placeholder() {
        let v = string("${order.total}");
        assert_eq!(classify(&TypeRef::String, &v), Literal::Placeholder("order.total"));
    }

    #[test]
    fn non_string_types_are_never_placeholders() {
        let v = string("${order.total}");
        assert_eq!(classify(&TypeRef::Any, &v), Literal::Plain);
        assert_eq!(classify(&TypeRef::String, &Value::Int(1)), Literal::Plain);
    }

    #[test]
    fn partial_matches_are_plain() {
        assert_eq!(classify(&TypeRef::String, &string("total: ${x}")), Literal::Plain);
        assert_eq!(classify(&TypeRef::String, &string("${x} and ${y}")), Literal::Plain);
    }

    #[test]
    fn single_escape_is_stripped_to_plain_text() {
        let v = string(r"\${placeholder}");
        assert_eq!(
            classify(&TypeRef::String, &v),
            Literal::Escaped("${placeholder}".to_string())
        );
    }

    #[test]
    fn double_escape_strips_exactly_one_backslash() {
        let v = string(r"\\${placeholder}");
        assert_eq!(
            classify(&TypeRef::String, &v),
            Literal::Escaped(r"\${placeholder}".to_string())
        );
    }

    #[test]
    fn parses_paths() {
        let path = ReferencePath::parse("order.customer.name").unwrap();
        assert_eq!(path.root(), "order");
        assert_eq!(path.segments(), ["customer".to_string(), "name".to_string()]);
        assert_eq!(path.tail(), "customer.name");
        assert_eq!(path.to_string(), "order.customer.name");

        let root_only = ReferencePath::parse("ctx").unwrap();
        assert!(root_only.segments().is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(ReferencePath::parse("").is_err());
        assert!(ReferencePath::parse("order..total").is_err());
        assert!(ReferencePath::parse("order.1st").is_err());
        assert!(ReferencePath::parse("order.").is_err());
    }
}
