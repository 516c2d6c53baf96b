//! Groundtruth matching for evaluations with a known answer
//!
//! A [`MatchSpec`] names where the groundtruth lives in each example and
//! where the answer lives in each parsed result. Every successfully parsed
//! outcome is audited into either the matches or the mismatches; failed
//! outcomes are neither.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::Outcome;
use crate::structured::{lookup, TYPE_KEY};

/// Key paths of the groundtruth and the answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchSpec {
    /// Dotted path into the example, e.g. `answer`
    pub groundtruth: String,
    /// Dotted path into the parsed result, e.g. `final_answer`
    pub answer_field: String,
}

impl MatchSpec {
    /// Create a match spec.
    #[must_use]
    pub fn new(groundtruth: impl Into<String>, answer_field: impl Into<String>) -> Self {
        Self {
            groundtruth: groundtruth.into(),
            answer_field: answer_field.into(),
        }
    }

    /// Whether the outcome's answer equals the example's groundtruth.
    ///
    /// A missing answer or groundtruth never matches.
    #[must_use]
    pub fn is_match(&self, example: &Value, result: &Value) -> bool {
        match (lookup(example, &self.groundtruth), lookup(result, &self.answer_field)) {
            (Some(expected), Some(answer)) => values_match(answer, expected),
            _ => false,
        }
    }
}

/// JSON equality where numbers compare by value (`2 == 2.0`).
fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_match(x, y)))
        }
        _ => a == b,
    }
}

/// An audited example, as persisted in `matches.json` / `mismatches.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// The input example
    pub input: Value,
    /// The parsed result with type tags stripped
    pub output: Value,
}

/// Matches and mismatches of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchAudit {
    /// Outcomes whose answer equals the groundtruth
    pub matches: Vec<MatchRecord>,
    /// Outcomes whose answer differs
    pub mismatches: Vec<MatchRecord>,
}

impl MatchAudit {
    /// Audit the successful outcomes of a run.
    #[must_use]
    pub fn audit(spec: &MatchSpec, outcomes: &[Outcome]) -> Self {
        let mut audit = Self::default();
        for outcome in outcomes.iter().filter(|o| !o.is_failure()) {
            let output = outcome.result.clone().unwrap_or(Value::Null);
            let matched = spec.is_match(&outcome.example, &output);
            let record = MatchRecord {
                input: outcome.example.clone(),
                output: strip_types(output),
            };
            if matched {
                audit.matches.push(record);
            } else {
                audit.mismatches.push(record);
            }
        }
        audit
    }
}

/// Remove `_type` tags recursively.
#[must_use]
pub fn strip_types(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| k != TYPE_KEY)
                .map(|(k, v)| (k, strip_types(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_types).collect()),
        other => other,
    }
}
