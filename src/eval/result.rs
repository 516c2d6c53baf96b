//! Outcomes and result records
//!
//! - [`Outcome`]: what happened to one example
//! - [`EvaluationResult`]: the persisted record of one leaf run
//! - [`ResultTree`]: leaf results arranged like the experiment tree

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::evaluation::Method;
use super::matching::MatchAudit;

/// The outcome of processing one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// The input example
    pub example: Value,
    /// Prompt sent to the LM, once rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_input: Option<String>,
    /// Raw LM response (after the task's post-processing for `call`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Parsed result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the response was served from the cache
    #[serde(default)]
    pub cache_hit: bool,
}

impl Outcome {
    pub(crate) const fn new(example: Value) -> Self {
        Self {
            example,
            lm_input: None,
            response: None,
            result: None,
            error: None,
            cache_hit: false,
        }
    }

    /// Whether processing this example failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Configuration summary of a leaf run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSetup {
    /// Node id
    pub id: String,
    /// Persistence directory
    pub dir: Option<PathBuf>,
    /// LM kind
    pub model: String,
    /// Prompt template text
    pub prompt_template: String,
    /// Prompting method
    pub method: Method,
    /// Schema function in call notation, e.g. `answer_schema()`
    pub schema_fn: Option<String>,
}

/// Cache usage of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Whether the cache was enabled
    pub use_cache: bool,
    /// Items dispatched
    pub num_queries: usize,
    /// Items served from the cache
    pub num_hits: usize,
    /// Items computed and inserted into the cache
    pub num_updates: usize,
}

/// Outcome metrics of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Examples processed
    pub total: usize,
    /// Examples that failed
    pub failures: usize,
    /// `failures / total`, 0 when nothing was processed
    pub failure_rate: f64,
    /// Answers equal to the groundtruth (matching evaluations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_matches: Option<usize>,
    /// `num_matches / total`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_rate: Option<f64>,
    /// Answers differing from the groundtruth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_mismatches: Option<usize>,
    /// `num_mismatches / total`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch_rate: Option<f64>,
}

/// Ratio that is 0 for an empty denominator.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

impl Metrics {
    /// Compute metrics over outcomes, extended by a matching audit.
    #[must_use]
    pub fn compute(outcomes: &[Outcome], audit: Option<&MatchAudit>) -> Self {
        let total = outcomes.len();
        let failures = outcomes.iter().filter(|o| o.is_failure()).count();
        let mut metrics = Self {
            total,
            failures,
            failure_rate: rate(failures, total),
            ..Self::default()
        };
        if let Some(audit) = audit {
            let matches = audit.matches.len();
            let mismatches = audit.mismatches.len();
            metrics.num_matches = Some(matches);
            metrics.match_rate = Some(rate(matches, total));
            metrics.num_mismatches = Some(mismatches);
            metrics.mismatch_rate = Some(rate(mismatches, total));
        }
        metrics
    }
}

/// Persisted record of a leaf run (`result.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// What ran
    pub experiment_setup: ExperimentSetup,
    /// Cache usage
    pub cache_stats: CacheStats,
    /// Outcome metrics
    pub metrics: Metrics,
}

/// Results arranged like the experiment tree.
///
/// A composite maps each child id to the child's result, or `None` when a
/// run filter excluded the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultTree {
    /// Result of a leaf evaluation
    Leaf(Box<EvaluationResult>),
    /// Results of a composite's children, keyed by child id
    Suite(BTreeMap<String, Option<ResultTree>>),
}

impl ResultTree {
    /// The leaf result, if this is a leaf.
    #[must_use]
    pub fn as_leaf(&self) -> Option<&EvaluationResult> {
        match self {
            Self::Leaf(result) => Some(result),
            Self::Suite(_) => None,
        }
    }

    /// Child result by id, if this is a composite.
    #[must_use]
    pub fn child(&self, id: &str) -> Option<&Option<Self>> {
        match self {
            Self::Leaf(_) => None,
            Self::Suite(children) => children.get(id),
        }
    }

    /// Every leaf result, depth-first in key order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&EvaluationResult> {
        match self {
            Self::Leaf(result) => vec![result.as_ref()],
            Self::Suite(children) => children
                .values()
                .flatten()
                .flat_map(Self::leaves)
                .collect(),
        }
    }
}

impl From<EvaluationResult> for ResultTree {
    fn from(result: EvaluationResult) -> Self {
        Self::Leaf(Box::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed(example: Value) -> Outcome {
        let mut o = Outcome::new(example);
        o.error = Some("Parse error".into());
        o
    }

    #[test]
    fn test_metrics_failure_rate() {
        let outcomes = vec![Outcome::new(json!(1)), failed(json!(2))];
        let m = Metrics::compute(&outcomes, None);
        assert_eq!((m.total, m.failures), (2, 1));
        assert!((m.failure_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(m.num_matches, None);
    }

    #[test]
    fn test_metrics_empty() {
        let m = Metrics::compute(&[], None);
        assert_eq!(m.failure_rate, 0.0);
    }

    #[test]
    fn test_metrics_serialization_omits_matching_fields() {
        let m = Metrics::compute(&[Outcome::new(json!(1))], None);
        assert_eq!(
            serde_json::to_value(m).unwrap(),
            json!({"total": 1, "failures": 0, "failure_rate": 0.0})
        );
    }

    #[test]
    fn test_result_tree_untagged_round_trip() {
        let leaf = EvaluationResult {
            experiment_setup: ExperimentSetup {
                id: "a".into(),
                dir: None,
                model: "Echo".into(),
                prompt_template: "{{example}}".into(),
                method: Method::Call,
                schema_fn: None,
            },
            cache_stats: CacheStats::default(),
            metrics: Metrics::default(),
        };
        let mut children = BTreeMap::new();
        children.insert("a".to_string(), Some(ResultTree::from(leaf)));
        children.insert("b".to_string(), None);
        let tree = ResultTree::Suite(children);

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["b"], Value::Null);
        assert_eq!(json["a"]["experiment_setup"]["method"], json!("call"));

        let back: ResultTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.leaves().len(), 1);
        assert!(back.child("b").unwrap().is_none());
    }
}
