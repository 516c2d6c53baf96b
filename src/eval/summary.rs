//! Flattened, queryable view over experiment leaves
//!
//! A [`Summary`] holds one entry per leaf node, either taken from a live
//! tree ([`Summary::new`]) or rebuilt from persisted directories
//! ([`Summary::from_dirs`]). Selection never mutates the nodes.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::evaluation::Method;
use super::node::Node;
use super::report::{self, files, SummaryRow};
use super::workspace::Workspace;
use crate::lm::{LmDescriptor, LmRef};
use crate::store::Store;
use crate::structured::SchemaFn;
use crate::Result;

/// LM predicate of a [`Selector`].
#[derive(Debug, Clone, PartialEq)]
pub enum LmSelector {
    /// Same model as this descriptor (timeout ignored)
    Instance(LmDescriptor),
    /// Any of these kinds
    Kinds(BTreeSet<String>),
}

/// Conjunction of leaf predicates; unset predicates accept everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    task: Option<String>,
    lm: Option<LmSelector>,
    methods: Option<BTreeSet<Method>>,
    schema_fns: Option<Vec<SchemaFn>>,
    completed: Option<bool>,
}

impl Selector {
    /// Selector accepting every leaf.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves of this task type.
    #[must_use]
    pub fn task(mut self, name: impl Into<String>) -> Self {
        self.task = Some(name.into());
        self
    }

    /// Leaves evaluating this model.
    #[must_use]
    pub fn lm(mut self, lm: &LmRef) -> Self {
        self.lm = Some(LmSelector::Instance(lm.descriptor()));
        self
    }

    /// Leaves evaluating a model of this kind.
    #[must_use]
    pub fn lm_kind(self, kind: impl Into<String>) -> Self {
        self.lm_kinds([kind])
    }

    /// Leaves evaluating a model of any of these kinds.
    #[must_use]
    pub fn lm_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lm = Some(LmSelector::Kinds(kinds.into_iter().map(Into::into).collect()));
        self
    }

    /// Leaves using this method.
    #[must_use]
    pub fn method(self, method: Method) -> Self {
        self.methods([method])
    }

    /// Leaves using any of these methods.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Leaves using this schema function (name, arguments and resolved
    /// schema).
    #[must_use]
    pub fn schema_fn(self, schema_fn: &SchemaFn) -> Self {
        self.schema_fns([schema_fn])
    }

    /// Leaves using any of these schema functions.
    #[must_use]
    pub fn schema_fns<'a>(mut self, schema_fns: impl IntoIterator<Item = &'a SchemaFn>) -> Self {
        self.schema_fns = Some(schema_fns.into_iter().cloned().collect());
        self
    }

    /// Leaves whose result has (or has not) been persisted.
    #[must_use]
    pub const fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Whether `node` satisfies every predicate.
    ///
    /// # Errors
    ///
    /// Returns an IO error if completion cannot be determined.
    pub fn matches(&self, node: &Node) -> Result<bool> {
        if let Some(task) = &self.task {
            if node.task_name() != task.as_str() {
                return Ok(false);
            }
        }
        let evaluation = node.evaluation();
        if let Some(selector) = &self.lm {
            let Some(descriptor) = evaluation
                .and_then(|e| e.lm().as_value())
                .map(LmRef::descriptor)
            else {
                return Ok(false);
            };
            let accepted = match selector {
                LmSelector::Instance(wanted) => descriptor.same_model(wanted),
                LmSelector::Kinds(kinds) => kinds.contains(&descriptor.kind),
            };
            if !accepted {
                return Ok(false);
            }
        }
        if let Some(methods) = &self.methods {
            if !evaluation
                .and_then(|e| e.method().as_value())
                .is_some_and(|m| methods.contains(m))
            {
                return Ok(false);
            }
        }
        if let Some(schema_fns) = &self.schema_fns {
            if !evaluation
                .and_then(|e| e.schema_fn())
                .and_then(|p| p.as_value())
                .is_some_and(|f| schema_fns.contains(f))
            {
                return Ok(false);
            }
        }
        if let Some(completed) = self.completed {
            if node.completed()? != completed {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// One entry per leaf.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    leaves: Vec<Arc<Node>>,
}

impl Summary {
    /// Summary of the leaves under `root`.
    #[must_use]
    pub fn new(root: &Arc<Node>) -> Self {
        Self {
            leaves: root.leaves(),
        }
    }

    /// Rebuild a summary from the experiment directories directly under
    /// `root_dir`, results included.
    ///
    /// `include` keeps only directories whose id equals an entry or starts
    /// with `"{entry}@"` (the variants of a search space).
    ///
    /// # Errors
    ///
    /// Returns IO/JSON errors and [`Error::Config`](crate::Error::Config)
    /// for definitions naming unregistered types.
    pub fn from_dirs(workspace: &Workspace, root_dir: &Path, include: Option<&[&str]>) -> Result<Self> {
        let store = workspace.store();
        let mut leaves = Vec::new();
        for dir in store.list_dirs(root_dir)? {
            let Some(id) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(include) = include {
                if !include.iter().any(|entry| is_included(id, entry)) {
                    continue;
                }
            }
            if !store.exists(&dir.join(files::EXPERIMENT_JSON))? {
                debug!(dir = %dir.display(), "Skipping directory without experiment");
                continue;
            }
            let node = workspace.load(&dir)?;
            node.load_result()?;
            leaves.extend(node.leaves());
        }
        debug!(root = %root_dir.display(), leaves = leaves.len(), "Scanned experiment directories");
        Ok(Self { leaves })
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether there are no leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaf nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.leaves
    }

    /// Leaves satisfying `selector`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if completion cannot be determined.
    pub fn select(&self, selector: &Selector) -> Result<Self> {
        let mut leaves = Vec::new();
        for node in &self.leaves {
            if selector.matches(node)? {
                leaves.push(Arc::clone(node));
            }
        }
        Ok(Self { leaves })
    }

    /// Reload every leaf's persisted result.
    ///
    /// # Errors
    ///
    /// Returns IO/JSON errors from reading result files.
    pub fn refresh(&self) -> Result<()> {
        for node in &self.leaves {
            node.load_result()?;
        }
        Ok(())
    }

    /// Render the summary page.
    #[must_use]
    pub fn render_html(&self) -> String {
        let rows: Vec<SummaryRow> = self
            .leaves
            .iter()
            .map(|node| SummaryRow {
                id: node.id().to_string(),
                dir: node.dir(),
                task: node.task_name().to_string(),
                result: node.result().and_then(|tree| tree.as_leaf().cloned()),
            })
            .collect();
        report::render_summary("Summary", &rows)
    }

    /// Render and write the summary page to `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the page cannot be written.
    pub fn write_html(&self, store: &dyn Store, path: &Path) -> Result<()> {
        store.write(path, self.render_html().as_bytes())
    }
}

fn is_included(id: &str, entry: &str) -> bool {
    id == entry || id.strip_prefix(entry).is_some_and(|rest| rest.starts_with('@'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_rule() {
        assert!(is_included("task_a", "task_a"));
        assert!(is_included("task_a@1234abcd", "task_a"));
        assert!(!is_included("task_ab", "task_a"));
        assert!(!is_included("task_b@1234abcd", "task_a"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::default();
        assert!(summary.is_empty());
        assert!(summary.render_html().contains("<table"));
        assert!(summary.select(&Selector::new().completed(true)).unwrap().is_empty());
    }
}
