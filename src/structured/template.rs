//! Prompt templates with `{{ path.to.value }}` placeholders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::literal::format_value;
use crate::{Error, Result};

/// A prompt template.
///
/// Placeholders are dotted paths resolved against a JSON binding object,
/// e.g. `{{example.question}}` against `{"example": {"question": "..."}}`.
/// String values are inserted verbatim; other values use the object-literal
/// notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template {
    text: String,
}

impl Template {
    /// Create a template from its source text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Template source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render the template against `bindings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] for unterminated placeholders or paths
    /// that do not resolve.
    pub fn render(&self, bindings: &Value) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::Template(format!("unterminated placeholder in {:?}", self.text)))?;
            let path = after[..end].trim();
            let value = lookup(bindings, path)
                .ok_or_else(|| Error::Template(format!("undefined variable '{path}'")))?;
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&format_value(other)),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Resolve a dotted key path (`a.b.0.c`) inside a JSON value.
#[must_use]
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_example_field() {
        let t = Template::new("Hello {{example.question}}");
        let out = t.render(&json!({"example": {"question": "Compute 1 + 1"}})).unwrap();
        assert_eq!(out, "Hello Compute 1 + 1");
    }

    #[test]
    fn test_render_tolerates_whitespace_and_non_strings() {
        let t = Template::new("n={{ example.n }}");
        assert_eq!(t.render(&json!({"example": {"n": 3}})).unwrap(), "n=3");
    }

    #[test]
    fn test_render_undefined_variable() {
        let t = Template::new("{{example.missing}}");
        let err = t.render(&json!({"example": {}})).unwrap_err();
        assert!(err.to_string().contains("undefined variable"));
    }

    #[test]
    fn test_render_unterminated() {
        let t = Template::new("{{example");
        assert!(matches!(t.render(&json!({})), Err(Error::Template(_))));
    }

    #[test]
    fn test_lookup_into_arrays() {
        let v = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(lookup(&v, "a.1.b"), Some(&json!(2)));
        assert_eq!(lookup(&v, "a.5.b"), None);
    }
}
