//! Partial structural match patterns over schema descriptors.
//!
//! A [`Selector`] names a set of fields that must all match against a
//! descriptor's JSON projection. Field patterns are literals, nested
//! selectors, or predicate closures; there is no OR or negation. A key
//! missing from the subject fails the whole selector unless its pattern is
//! a predicate (which then receives `None`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::uri::IgluUri;

/// A single field pattern within a [`Selector`].
#[derive(Clone)]
pub enum Pattern {
    /// Strict equality against a literal JSON value. A `null` literal
    /// matches only an exactly-null subject value.
    Literal(Value),
    /// Recursive match against a nested object value; anything that is not
    /// an object fails.
    Nested(Selector),
    /// Arbitrary predicate, applied to the subject value (`None` when the
    /// key is absent).
    Predicate(Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>),
}

impl Pattern {
    /// Wrap a closure as a predicate pattern.
    pub fn predicate(f: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Predicate(Arc::new(f))
    }

    fn matches_key(&self, key: &str, value: Option<&Value>) -> bool {
        match (self, value) {
            (Pattern::Predicate(predicate), value) => predicate(value),
            // Strict presence: a named key must exist unless a predicate
            // chose to tolerate its absence.
            (_, None) => false,
            (Pattern::Literal(Value::Null), Some(value)) => value.is_null(),
            // A string literal against the identifier map compares its
            // canonical `iglu:` form rather than matching structurally.
            (Pattern::Literal(Value::String(expected)), Some(value))
                if key == "uri" && value.is_object() =>
            {
                canonical_uri(value).is_some_and(|actual| actual == *expected)
            }
            (Pattern::Nested(selector), Some(value)) => {
                value.is_object() && selector.matches(value)
            }
            (Pattern::Literal(expected), Some(value)) => value == expected,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Pattern::Nested(selector) => f.debug_tuple("Nested").field(selector).finish(),
            Pattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<Value> for Pattern {
    fn from(value: Value) -> Self {
        Pattern::Literal(value)
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Pattern::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Pattern::Literal(Value::String(value))
    }
}

impl From<bool> for Pattern {
    fn from(value: bool) -> Self {
        Pattern::Literal(Value::Bool(value))
    }
}

impl From<i64> for Pattern {
    fn from(value: i64) -> Self {
        Pattern::Literal(Value::from(value))
    }
}

impl From<Selector> for Pattern {
    fn from(selector: Selector) -> Self {
        Pattern::Nested(selector)
    }
}

impl From<&IgluUri> for Pattern {
    fn from(uri: &IgluUri) -> Self {
        Pattern::Literal(Value::String(uri.to_string()))
    }
}

/// A possibly-nested partial-match pattern over descriptor fields.
///
/// Constructed ad hoc per query with the builder-style
/// [`field`](Selector::field); never persisted.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    fields: BTreeMap<String, Pattern>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for matching one exact identifier.
    pub fn for_uri(uri: &IgluUri) -> Self {
        Self::new().field("uri", uri)
    }

    /// Add a field pattern. Later additions for the same key replace
    /// earlier ones.
    pub fn field(mut self, key: impl Into<String>, pattern: impl Into<Pattern>) -> Self {
        self.fields.insert(key.into(), pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether every field pattern matches the subject. All per-key
    /// results AND together; the first failing key short-circuits.
    pub fn matches(&self, subject: &Value) -> bool {
        let Some(map) = subject.as_object() else {
            return self.fields.is_empty();
        };

        self.fields
            .iter()
            .all(|(key, pattern)| pattern.matches_key(key, map.get(key)))
    }
}

/// Rebuild the canonical string form from an identifier's map projection.
fn canonical_uri(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    Some(format!(
        "iglu:{}/{}/{}/{}",
        map.get("vendor")?.as_str()?,
        map.get("name")?.as_str()?,
        map.get("format")?.as_str()?,
        map.get("version")?.as_str()?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subject() -> Value {
        json!({
            "uri": {
                "vendor": "com.acme",
                "name": "checkout",
                "format": "jsonschema",
                "version": "1-0-0"
            },
            "registry": { "kind": "workspace", "id": "schemas" },
            "hash": "abc123",
            "env": "LOCAL",
            "annotation": null
        })
    }

    #[test]
    fn literal_equality() {
        assert!(Selector::new().field("env", "LOCAL").matches(&subject()));
        assert!(!Selector::new().field("env", "PROD").matches(&subject()));
    }

    #[test]
    fn absent_key_fails_whole_selector() {
        let selector = Selector::new()
            .field("env", "LOCAL")
            .field("missing", "anything");
        assert!(!selector.matches(&subject()));
    }

    #[test]
    fn nested_patterns_recurse() {
        let selector = Selector::new().field(
            "registry",
            Selector::new().field("kind", "workspace").field("id", "schemas"),
        );
        assert!(selector.matches(&subject()));

        let wrong = Selector::new()
            .field("registry", Selector::new().field("kind", "static"));
        assert!(!wrong.matches(&subject()));
    }

    #[test]
    fn nested_pattern_fails_on_non_object_value() {
        let selector = Selector::new().field("env", Selector::new().field("x", "y"));
        assert!(!selector.matches(&subject()));
    }

    #[test]
    fn nested_key_absent_inside_nested_object_fails() {
        let selector = Selector::new()
            .field("uri", Selector::new().field("nonexistent", "x"));
        assert!(!selector.matches(&subject()));
    }

    #[test]
    fn null_literal_matches_exact_null_only() {
        assert!(Selector::new()
            .field("annotation", Value::Null)
            .matches(&subject()));
        assert!(!Selector::new().field("env", Value::Null).matches(&subject()));
    }

    #[test]
    fn uri_string_literal_compares_canonical_form() {
        let selector =
            Selector::new().field("uri", "iglu:com.acme/checkout/jsonschema/1-0-0");
        assert!(selector.matches(&subject()));

        let other = Selector::new().field("uri", "iglu:com.acme/refund/jsonschema/1-0-0");
        assert!(!other.matches(&subject()));
    }

    #[test]
    fn uri_nested_pattern_matches_structurally() {
        let selector = Selector::new()
            .field("uri", Selector::new().field("vendor", "com.acme"));
        assert!(selector.matches(&subject()));

        let wrong = Selector::new()
            .field("uri", Selector::new().field("vendor", "org.other"));
        assert!(!wrong.matches(&subject()));
    }

    #[test]
    fn predicate_sees_absent_keys() {
        let tolerant = Selector::new()
            .field("missing", Pattern::predicate(|value| value.is_none()));
        assert!(tolerant.matches(&subject()));

        let demanding = Selector::new().field(
            "env",
            Pattern::predicate(|value| value.and_then(Value::as_str) == Some("LOCAL")),
        );
        assert!(demanding.matches(&subject()));
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(Selector::new().matches(&subject()));
        assert!(Selector::new().matches(&json!("not even an object")));
    }
}
