//! Suites: composite experiments.

use std::path::{Path, PathBuf};

use serde_json::json;

use super::evaluation::Evaluation;
use crate::hash::identity_hash;
use crate::Result;

/// Name of the suite node type.
pub const SUITE_TYPE: &str = "Suite";

/// An experiment definition: a single evaluation (possibly a search space)
/// or a suite of further experiments.
#[derive(Debug, Clone, PartialEq)]
pub enum Experiment {
    /// Single evaluation or search space
    Evaluation(Evaluation),
    /// Composite
    Suite(Suite),
}

impl Experiment {
    /// Base id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Evaluation(e) => e.id(),
            Self::Suite(s) => s.id(),
        }
    }

    /// Identity hash.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the identity cannot be encoded.
    pub fn hash(&self) -> Result<String> {
        match self {
            Self::Evaluation(e) => e.hash(),
            Self::Suite(s) => s.hash(),
        }
    }
}

impl From<Evaluation> for Experiment {
    fn from(evaluation: Evaluation) -> Self {
        Self::Evaluation(evaluation)
    }
}

impl From<Suite> for Experiment {
    fn from(suite: Suite) -> Self {
        Self::Suite(suite)
    }
}

/// A composite of child experiments, run and reported together.
///
/// Children without a root directory inherit the suite's.
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    id: String,
    children: Vec<Experiment>,
    root_dir: Option<PathBuf>,
}

impl Suite {
    /// Create a suite.
    pub fn new<I, E>(id: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Experiment>,
    {
        Self {
            id: id.into(),
            children: children.into_iter().map(Into::into).collect(),
            root_dir: None,
        }
    }

    /// Set the root directory.
    #[must_use]
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    /// Suite id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Child experiments.
    #[must_use]
    pub fn children(&self) -> &[Experiment] {
        &self.children
    }

    /// Root directory, if configured.
    #[must_use]
    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Identity hash over the ordered child hashes.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a child identity cannot be encoded.
    pub fn hash(&self) -> Result<String> {
        let children = self
            .children
            .iter()
            .map(Experiment::hash)
            .collect::<Result<Vec<_>>>()?;
        suite_hash(&children)
    }
}

pub(crate) fn suite_hash(child_hashes: &[String]) -> Result<String> {
    identity_hash(&json!({ "_type": SUITE_TYPE, "children": child_hashes }))
}
