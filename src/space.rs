//! Search-space choice markers
//!
//! A configuration field holds either a concrete value or a "one of N"
//! choice. Choices nest: a candidate may itself be a choice, which flattens
//! depth-first during expansion. Expansion happens in a dedicated pass
//! ([`Evaluation::expand`](crate::eval::Evaluation::expand)) before anything
//! runs; nothing is resolved lazily during execution.
//!
//! ## Wire format
//!
//! ```text
//! "query"                          -> Param::Value("query")
//! {"_oneof": ["call", "query"]}    -> Param::OneOf([Value("call"), Value("query")])
//! ```
//!
//! The `_oneof` tag keeps a choice distinguishable from a concrete list value
//! in both persisted definitions and identity hashes.
//!
//! The same marker may appear anywhere inside free-form JSON configuration
//! (schema-function arguments, LM identity configs):
//!
//! ```text
//! {"k": {"_oneof": [1, 2]}, "style": "short"}
//!     -> {"k": 1, "style": "short"}, {"k": 2, "style": "short"}
//! ```
//!
//! See [`value_has_choices`] and [`expand_value`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key tagging a choice in serialized form.
pub const ONEOF_KEY: &str = "_oneof";

/// A concrete value or a choice among candidate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param<T> {
    /// Choose exactly one of the candidates.
    OneOf {
        /// Candidate values (possibly nested choices)
        #[serde(rename = "_oneof")]
        candidates: Vec<Param<T>>,
    },
    /// A concrete value.
    Value(T),
}

impl<T> Param<T> {
    /// Build a choice from candidate values.
    #[must_use]
    pub fn one_of<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Self>,
    {
        Self::OneOf {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this parameter is a choice.
    ///
    /// Choices nested inside a concrete value (e.g. in its JSON
    /// configuration) are the value's own concern.
    #[must_use]
    pub const fn has_choices(&self) -> bool {
        matches!(self, Self::OneOf { .. })
    }

    /// The concrete value, if this parameter is not a choice.
    #[must_use]
    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::OneOf { .. } => None,
        }
    }

    /// All concrete candidates, flattened depth-first in declaration order.
    #[must_use]
    pub fn candidates(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_candidates(&mut out);
        out
    }

    fn collect_candidates<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Self::Value(value) => out.push(value),
            Self::OneOf { candidates } => {
                for candidate in candidates {
                    candidate.collect_candidates(out);
                }
            }
        }
    }

    /// Number of flattened candidates (1 for a concrete value).
    #[must_use]
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Value(_) => 1,
            Self::OneOf { candidates } => candidates.iter().map(Self::cardinality).sum(),
        }
    }

    /// Whether any choice (at any depth) has no candidates.
    #[must_use]
    pub fn has_empty_choice(&self) -> bool {
        match self {
            Self::Value(_) => false,
            Self::OneOf { candidates } => {
                candidates.is_empty() || candidates.iter().any(Self::has_empty_choice)
            }
        }
    }

    /// Map every concrete value, preserving the choice structure.
    #[must_use]
    pub fn map<U>(&self, f: &impl Fn(&T) -> U) -> Param<U> {
        match self {
            Self::Value(value) => Param::Value(f(value)),
            Self::OneOf { candidates } => Param::OneOf {
                candidates: candidates.iter().map(|c| c.map(f)).collect(),
            },
        }
    }

    /// Fallible [`Param::map`].
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_map<U, E>(&self, f: &impl Fn(&T) -> Result<U, E>) -> Result<Param<U>, E> {
        match self {
            Self::Value(value) => Ok(Param::Value(f(value)?)),
            Self::OneOf { candidates } => Ok(Param::OneOf {
                candidates: candidates
                    .iter()
                    .map(|c| c.try_map(f))
                    .collect::<Result<_, _>>()?,
            }),
        }
    }
}

impl<T> From<T> for Param<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

/// The candidates of `value` if it is a `{"_oneof": [...]}` marker.
fn as_choice(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(ONEOF_KEY).and_then(Value::as_array),
        _ => None,
    }
}

/// Whether a JSON value holds a `_oneof` choice at any depth.
#[must_use]
pub fn value_has_choices(value: &Value) -> bool {
    if as_choice(value).is_some() {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(value_has_choices),
        Value::Object(map) => map.values().any(value_has_choices),
        _ => false,
    }
}

/// Every concrete value denoted by a JSON value with nested choices.
///
/// Candidates flatten depth-first; independent choices combine in odometer
/// order (the last object key or array element varies fastest). A value
/// without choices expands to itself; an empty choice anywhere yields no
/// values at all.
#[must_use]
pub fn expand_value(value: &Value) -> Vec<Value> {
    if let Some(candidates) = as_choice(value) {
        return candidates.iter().flat_map(expand_value).collect();
    }
    match value {
        Value::Array(items) => {
            let axes: Vec<Vec<Value>> = items.iter().map(expand_value).collect();
            combine(&axes).into_iter().map(Value::Array).collect()
        }
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().collect();
            let axes: Vec<Vec<Value>> = map.values().map(expand_value).collect();
            combine(&axes)
                .into_iter()
                .map(|values| {
                    let object: Map<String, Value> = keys.iter().map(|k| (*k).clone()).zip(values).collect();
                    Value::Object(object)
                })
                .collect()
        }
        _ => vec![value.clone()],
    }
}

fn combine(axes: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let lengths: Vec<usize> = axes.iter().map(Vec::len).collect();
    index_product(&lengths)
        .into_iter()
        .map(|combo| combo.iter().enumerate().map(|(axis, &i)| axes[axis][i].clone()).collect())
        .collect()
}

/// Enumerate every index combination over axes of the given lengths.
///
/// Odometer order: the last axis varies fastest. An empty axis list yields a
/// single empty combination; any zero-length axis yields nothing.
#[must_use]
pub fn index_product(lengths: &[usize]) -> Vec<Vec<usize>> {
    if lengths.contains(&0) {
        return Vec::new();
    }
    let total: usize = lengths.iter().product();
    let mut combos = Vec::with_capacity(total);
    let mut current = vec![0usize; lengths.len()];
    for _ in 0..total {
        combos.push(current.clone());
        for axis in (0..lengths.len()).rev() {
            current[axis] += 1;
            if current[axis] < lengths[axis] {
                break;
            }
            current[axis] = 0;
        }
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_has_no_choices() {
        let p: Param<String> = "query".to_string().into();
        assert!(!p.has_choices());
        assert_eq!(p.cardinality(), 1);
        assert_eq!(p.candidates(), vec![&"query".to_string()]);
    }

    #[test]
    fn test_nested_choices_flatten_depth_first() {
        let p: Param<i32> = Param::one_of(vec![
            Param::Value(1),
            Param::one_of(vec![2, 3]),
            Param::Value(4),
        ]);
        assert!(p.has_choices());
        assert_eq!(p.cardinality(), 4);
        assert_eq!(p.candidates(), vec![&1, &2, &3, &4]);
    }

    #[test]
    fn test_empty_choice_detected() {
        let p: Param<i32> = Param::one_of(vec![Param::Value(1), Param::one_of(Vec::<i32>::new())]);
        assert!(p.has_empty_choice());
    }

    #[test]
    fn test_serde_tags_choices() {
        let p = Param::one_of(vec!["call", "query"]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({"_oneof": ["call", "query"]}));

        let back: Param<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back.cardinality(), 2);

        let plain: Param<String> = serde_json::from_str("\"call\"").unwrap();
        assert_eq!(plain.as_value().map(String::as_str), Some("call"));
    }

    #[test]
    fn test_index_product_odometer_order() {
        let combos = index_product(&[2, 3]);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![0, 0]);
        assert_eq!(combos[1], vec![0, 1]);
        assert_eq!(combos[3], vec![1, 0]);
        assert_eq!(combos[5], vec![1, 2]);
    }

    #[test]
    fn test_index_product_edge_cases() {
        assert_eq!(index_product(&[]), vec![Vec::<usize>::new()]);
        assert!(index_product(&[2, 0]).is_empty());
    }

    #[test]
    fn test_expand_value_nested_choices() {
        let config = serde_json::json!({
            "k": {"_oneof": [1, {"_oneof": [2, 3]}]},
            "style": {"_oneof": ["short", "long"]},
            "fixed": [1, 2],
        });
        assert!(value_has_choices(&config));
        let variants = expand_value(&config);
        assert_eq!(variants.len(), 6);
        assert_eq!(variants[0], serde_json::json!({"fixed": [1, 2], "k": 1, "style": "short"}));
        assert_eq!(variants[1], serde_json::json!({"fixed": [1, 2], "k": 1, "style": "long"}));
        assert_eq!(variants[5], serde_json::json!({"fixed": [1, 2], "k": 3, "style": "long"}));
    }

    #[test]
    fn test_expand_value_without_choices() {
        let config = serde_json::json!({"k": [1, 2], "nested": {"a": "b"}});
        assert!(!value_has_choices(&config));
        assert_eq!(expand_value(&config), vec![config]);
        assert!(expand_value(&serde_json::json!({"k": {"_oneof": []}})).is_empty());
    }

    #[test]
    fn test_map_preserves_structure() {
        let p = Param::one_of(vec![1, 2]);
        let doubled = p.map(&|v| v * 2);
        assert_eq!(doubled.candidates(), vec![&2, &4]);
        assert!(doubled.has_choices());
    }
}
