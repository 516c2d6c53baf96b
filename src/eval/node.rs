//! Materialized experiment trees and run orchestration
//!
//! A [`Node`] is an [`Experiment`] after materialization: root directories
//! inherited, search spaces expanded into variant children, identity hashes
//! computed. Nodes are shared as `Arc<Node>`; children hold a `Weak` handle
//! to their parent.
//!
//! Running a leaf:
//!
//! 1. resolve the schema and load the inputs,
//! 2. load the LM cache from `dir/cache.json` (when `use_cache`),
//! 3. process every example on a pool of `max_workers` threads,
//! 4. compute metrics (and the matching audit),
//! 5. persist the cache, then (when `save`) the definition, result and
//!    reports.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::cache::LmCache;
use super::evaluation::Evaluation;
use super::matching::MatchAudit;
use super::report::{self, files};
use super::result::{CacheStats, EvaluationResult, Metrics, Outcome, ResultTree};
use super::scheduler::{run_items, ScheduleOptions};
use super::suite::{suite_hash, Experiment, SUITE_TYPE};
use super::summary::Summary;
use crate::store::{read_json, write_json, Store};
use crate::structured::format_value;
use crate::{Error, Result};

/// Predicate deciding which leaves a run executes.
pub type NodeFilter = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// Options of [`Node::run`].
///
/// Defaults: `save`, `show_progress` and `summary` on; `dryrun`, `verbose`
/// and `parallel` off; no filter.
#[derive(Clone)]
pub struct RunOptions {
    /// Persist definition, result and reports of each leaf
    pub save: bool,
    /// Log progress at `info` level
    pub show_progress: bool,
    /// Process one sample per leaf instead of a full run
    pub dryrun: bool,
    /// Log every outcome
    pub verbose: bool,
    /// Regenerate `summary.html` under the root directory
    pub summary: bool,
    /// Run composite children on the global rayon pool
    pub parallel: bool,
    /// Leaves to run; others appear as `None` in the result tree
    pub filter: Option<NodeFilter>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            save: true,
            show_progress: true,
            dryrun: false,
            verbose: false,
            summary: true,
            parallel: false,
            filter: None,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("save", &self.save)
            .field("show_progress", &self.show_progress)
            .field("dryrun", &self.dryrun)
            .field("verbose", &self.verbose)
            .field("summary", &self.summary)
            .field("parallel", &self.parallel)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl RunOptions {
    /// Set `save`.
    #[must_use]
    pub const fn save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    /// Set `show_progress`.
    #[must_use]
    pub const fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Set `dryrun`.
    #[must_use]
    pub const fn dryrun(mut self, dryrun: bool) -> Self {
        self.dryrun = dryrun;
        self
    }

    /// Set `verbose`.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set `summary`.
    #[must_use]
    pub const fn summary(mut self, summary: bool) -> Self {
        self.summary = summary;
        self
    }

    /// Set `parallel`.
    #[must_use]
    pub const fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Only run leaves accepted by `filter`.
    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&Node) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn accepts(&self, node: &Node) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(node))
    }
}

#[derive(Debug)]
enum NodeKind {
    Evaluation(Evaluation),
    Suite,
}

#[derive(Debug, Default)]
struct NodeState {
    result: Option<EvaluationResult>,
    dryrun_output: Option<Outcome>,
    outcomes: Vec<Outcome>,
}

/// Fallible first pass of materialization.
struct Plan {
    id: String,
    hash: String,
    root_dir: Option<PathBuf>,
    kind: NodeKind,
    children: Vec<Plan>,
}

impl Plan {
    fn new(experiment: &Experiment, inherited: Option<&Path>) -> Result<Self> {
        match experiment {
            Experiment::Evaluation(evaluation) => {
                let mut evaluation = evaluation.clone();
                evaluation.inherit_root_dir(inherited);
                let children = if evaluation.has_choices() {
                    evaluation
                        .expand()?
                        .into_iter()
                        .map(Self::leaf)
                        .collect::<Result<Vec<_>>>()?
                } else {
                    Vec::new()
                };
                Ok(Self {
                    id: evaluation.id().to_string(),
                    hash: evaluation.hash()?,
                    root_dir: evaluation.root_dir().map(Path::to_path_buf),
                    kind: NodeKind::Evaluation(evaluation),
                    children,
                })
            }
            Experiment::Suite(suite) => {
                let root_dir = suite.root_dir().or(inherited);
                let mut ids = HashSet::new();
                if let Some(duplicate) = suite.children().iter().map(Experiment::id).find(|id| !ids.insert(*id)) {
                    return Err(Error::config(format!(
                        "suite '{}' has more than one child with id '{duplicate}'",
                        suite.id()
                    )));
                }
                let children = suite
                    .children()
                    .iter()
                    .map(|child| Self::new(child, root_dir))
                    .collect::<Result<Vec<_>>>()?;
                let hashes: Vec<String> = children.iter().map(|c| c.hash.clone()).collect();
                Ok(Self {
                    id: suite.id().to_string(),
                    hash: suite_hash(&hashes)?,
                    root_dir: root_dir.map(Path::to_path_buf),
                    kind: NodeKind::Suite,
                    children,
                })
            }
        }
    }

    fn leaf(evaluation: Evaluation) -> Result<Self> {
        Ok(Self {
            id: evaluation.id().to_string(),
            hash: evaluation.hash()?,
            root_dir: evaluation.root_dir().map(Path::to_path_buf),
            kind: NodeKind::Evaluation(evaluation),
            children: Vec::new(),
        })
    }
}

/// A materialized experiment node.
pub struct Node {
    id: String,
    hash: String,
    root_dir: Option<PathBuf>,
    kind: NodeKind,
    parent: Weak<Node>,
    children: Vec<Arc<Node>>,
    store: Arc<dyn Store>,
    state: Mutex<NodeState>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("hash", &self.hash)
            .field("root_dir", &self.root_dir)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Materialize an experiment over `store`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if an identity hash cannot be computed and
    /// [`Error::Config`] if a suite holds two children with the same id.
    pub fn new(experiment: impl Into<Experiment>, store: Arc<dyn Store>) -> Result<Arc<Self>> {
        let plan = Plan::new(&experiment.into(), None)?;
        Ok(Self::instantiate(plan, Weak::new(), &store))
    }

    fn instantiate(plan: Plan, parent: Weak<Self>, store: &Arc<dyn Store>) -> Arc<Self> {
        Arc::new_cyclic(|me| {
            let children = plan
                .children
                .into_iter()
                .map(|child| Self::instantiate(child, me.clone(), store))
                .collect();
            Self {
                id: plan.id,
                hash: plan.hash,
                root_dir: plan.root_dir,
                kind: plan.kind,
                parent,
                children,
                store: Arc::clone(store),
                state: Mutex::new(NodeState::default()),
            }
        })
    }

    /// Node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity hash.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Effective root directory.
    #[must_use]
    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Persistence directory, `root_dir/id`.
    #[must_use]
    pub fn dir(&self) -> Option<PathBuf> {
        self.root_dir.as_ref().map(|root| root.join(&self.id))
    }

    /// The evaluation of a leaf or search-space node.
    #[must_use]
    pub const fn evaluation(&self) -> Option<&Evaluation> {
        match &self.kind {
            NodeKind::Evaluation(evaluation) => Some(evaluation),
            NodeKind::Suite => None,
        }
    }

    /// Task type name; suites report `Suite`.
    #[must_use]
    pub fn task_name(&self) -> &str {
        self.evaluation().map_or(SUITE_TYPE, |e| e.task().name())
    }

    /// Whether this node runs examples itself.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.evaluation().is_some() && self.children.is_empty()
    }

    /// Enclosing node, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    /// Child nodes (suite members or search-space variants).
    #[must_use]
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// Child by id.
    #[must_use]
    pub fn child(&self, id: &str) -> Option<&Arc<Self>> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Every leaf under this node, depth-first.
    #[must_use]
    pub fn leaves(self: &Arc<Self>) -> Vec<Arc<Self>> {
        if self.is_leaf() {
            return vec![Arc::clone(self)];
        }
        self.children.iter().flat_map(Self::leaves).collect()
    }

    /// Persistence backend.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result of the last run or [`load_result`](Self::load_result).
    ///
    /// Composites always return a map; children without a result map to
    /// `None`.
    #[must_use]
    pub fn result(&self) -> Option<ResultTree> {
        if self.is_leaf() {
            return self.state().result.clone().map(ResultTree::from);
        }
        Some(ResultTree::Suite(
            self.children
                .iter()
                .map(|child| (child.id.clone(), child.result()))
                .collect(),
        ))
    }

    /// Outcomes of the last full run of a leaf.
    #[must_use]
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.state().outcomes.clone()
    }

    /// Outcome of the last dryrun of a leaf.
    #[must_use]
    pub fn dryrun_output(&self) -> Option<Outcome> {
        self.state().dryrun_output.clone()
    }

    /// Whether a result has been persisted for this node (every leaf, for
    /// composites).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the store cannot be queried.
    pub fn completed(&self) -> Result<bool> {
        if !self.is_leaf() {
            for child in &self.children {
                if !child.completed()? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        match self.dir() {
            Some(dir) => self.store.exists(&dir.join(files::RESULT_JSON)),
            None => Ok(false),
        }
    }

    /// Repopulate in-memory results from `result.json` files.
    ///
    /// # Errors
    ///
    /// Returns an error if a result file exists but cannot be read.
    pub fn load_result(&self) -> Result<Option<ResultTree>> {
        if self.is_leaf() {
            if let Some(dir) = self.dir() {
                let loaded = read_json::<EvaluationResult>(self.store.as_ref(), &dir.join(files::RESULT_JSON))?;
                if loaded.is_some() {
                    self.state().result = loaded;
                }
            }
        } else {
            for child in &self.children {
                child.load_result()?;
            }
        }
        Ok(self.result())
    }

    /// Run this node and everything under it.
    ///
    /// Returns `None` only for a leaf excluded by the filter.
    ///
    /// # Errors
    ///
    /// Returns schema, input and persistence errors. Failures of single
    /// examples are recorded in the metrics instead.
    pub fn run(self: &Arc<Self>, options: &RunOptions) -> Result<Option<ResultTree>> {
        info!(id = %self.id, dryrun = options.dryrun, "Running experiment");
        let tree = self.run_node(options)?;
        if options.summary && !options.dryrun {
            if let Some(root) = &self.root_dir {
                let path = root.join(files::SUMMARY_HTML);
                Summary::new(self).write_html(self.store.as_ref(), &path)?;
                info!(path = %path.display(), "Wrote summary");
            }
        }
        Ok(tree)
    }

    /// Process the first example of every leaf without persisting anything.
    ///
    /// # Errors
    ///
    /// Returns schema and input errors.
    pub fn dryrun(self: &Arc<Self>, verbose: bool) -> Result<Option<ResultTree>> {
        self.run(&RunOptions::default().dryrun(true).verbose(verbose))
    }

    fn run_node(&self, options: &RunOptions) -> Result<Option<ResultTree>> {
        if self.is_leaf() {
            if !options.accepts(self) {
                debug!(id = %self.id, "Skipped by filter");
                return Ok(None);
            }
            let result = if options.dryrun {
                self.dryrun_leaf(options.verbose)?
            } else {
                self.run_leaf(options)?
            };
            return Ok(Some(ResultTree::from(result)));
        }

        let run_child = |child: &Arc<Self>| -> Result<(String, Option<ResultTree>)> {
            Ok((child.id.clone(), child.run_node(options)?))
        };
        let results: Vec<(String, Option<ResultTree>)> = if options.parallel {
            self.children.par_iter().map(run_child).collect::<Result<_>>()?
        } else {
            self.children.iter().map(run_child).collect::<Result<_>>()?
        };
        Ok(Some(ResultTree::Suite(results.into_iter().collect())))
    }

    fn leaf_evaluation(&self) -> Result<&Evaluation> {
        self.evaluation()
            .ok_or_else(|| Error::config(format!("node '{}' is not an evaluation", self.id)))
    }

    fn run_leaf(&self, options: &RunOptions) -> Result<EvaluationResult> {
        let evaluation = self.leaf_evaluation()?;
        let resolved = evaluation.resolve_schema()?;
        let examples = evaluation.inputs().load()?;
        let lm = evaluation.concrete_lm()?;
        let descriptor = lm.descriptor();
        let dir = self.dir();
        let use_cache = evaluation.use_cache();

        let cache = match &dir {
            Some(dir) if use_cache => LmCache::load(self.store.as_ref(), &dir.join(files::CACHE_JSON))?,
            _ => LmCache::new(),
        };
        info!(
            id = %self.id,
            examples = examples.len(),
            max_workers = evaluation.max_workers(),
            use_cache,
            "Starting evaluation"
        );

        let schedule = ScheduleOptions {
            label: &self.id,
            max_workers: evaluation.max_workers(),
            show_progress: options.show_progress,
        };
        let outcomes = run_items(&examples, &schedule, |example| {
            let outcome = evaluation.process_with(example, &resolved, |lm_input| {
                if use_cache {
                    let key = LmCache::fingerprint(&descriptor, lm_input)?;
                    cache.get_or_compute(&key, || lm.sample(lm_input))
                } else {
                    cache.record_query();
                    Ok((lm.sample(lm_input)?, false))
                }
            })?;
            if options.verbose {
                log_outcome(&self.id, &outcome);
            }
            Ok(outcome)
        })?;

        let audit = evaluation
            .matching()
            .map(|spec| MatchAudit::audit(spec, &outcomes));
        let result = EvaluationResult {
            experiment_setup: evaluation.experiment_setup()?,
            cache_stats: cache.stats(use_cache),
            metrics: Metrics::compute(&outcomes, audit.as_ref()),
        };

        if let Some(dir) = &dir {
            if use_cache {
                cache.save(self.store.as_ref(), &dir.join(files::CACHE_JSON))?;
            }
            if options.save {
                self.save_artifacts(evaluation, dir, &result, &outcomes, audit.as_ref())?;
            }
        }
        info!(
            id = %self.id,
            total = result.metrics.total,
            failures = result.metrics.failures,
            cache_hits = result.cache_stats.num_hits,
            "Finished evaluation"
        );

        let mut state = self.state();
        state.result = Some(result.clone());
        state.outcomes = outcomes;
        Ok(result)
    }

    fn dryrun_leaf(&self, verbose: bool) -> Result<EvaluationResult> {
        let evaluation = self.leaf_evaluation()?;
        let resolved = evaluation.resolve_schema()?;
        let examples = evaluation.inputs().load()?;
        let lm = evaluation.concrete_lm()?.fresh();

        let mut stats = CacheStats {
            use_cache: evaluation.use_cache(),
            ..CacheStats::default()
        };
        let sample = match examples.first() {
            Some(example) => {
                let outcome =
                    evaluation.process_with(example, &resolved, |lm_input| Ok((lm.sample(lm_input)?, false)))?;
                if outcome.lm_input.is_some() {
                    stats.num_queries = 1;
                }
                if verbose {
                    log_outcome(&self.id, &outcome);
                }
                vec![outcome]
            }
            None => {
                warn!(id = %self.id, "Dryrun without inputs");
                Vec::new()
            }
        };
        info!(id = %self.id, failed = sample.iter().any(Outcome::is_failure), "Dryrun finished");

        let audit = evaluation.matching().map(|spec| MatchAudit::audit(spec, &sample));
        let result = EvaluationResult {
            experiment_setup: evaluation.experiment_setup()?,
            cache_stats: stats,
            metrics: Metrics::compute(&sample, audit.as_ref()),
        };
        self.state().dryrun_output = sample.into_iter().next();
        Ok(result)
    }

    fn save_artifacts(
        &self,
        evaluation: &Evaluation,
        dir: &Path,
        result: &EvaluationResult,
        outcomes: &[Outcome],
        audit: Option<&MatchAudit>,
    ) -> Result<()> {
        let store = self.store.as_ref();
        let mut definition = evaluation.definition();
        definition.created_at = Some(Utc::now());
        write_json(store, &dir.join(files::EXPERIMENT_JSON), &definition)?;
        write_json(store, &dir.join(files::RESULT_JSON), result)?;
        store.write(
            &dir.join(files::INDEX_HTML),
            report::render_index(result, outcomes).as_bytes(),
        )?;
        store.write(
            &dir.join(files::FAILURES_HTML),
            report::render_failures(result, outcomes).as_bytes(),
        )?;
        if let Some(audit) = audit {
            write_json(store, &dir.join(files::MATCHES_JSON), &audit.matches)?;
            write_json(store, &dir.join(files::MISMATCHES_JSON), &audit.mismatches)?;
            store.write(
                &dir.join(files::MATCHES_HTML),
                report::render_match_records(result, "matches", &audit.matches).as_bytes(),
            )?;
            store.write(
                &dir.join(files::MISMATCHES_HTML),
                report::render_match_records(result, "mismatches", &audit.mismatches).as_bytes(),
            )?;
        }
        debug!(id = %self.id, dir = %dir.display(), "Saved artifacts");
        Ok(())
    }
}

fn log_outcome(id: &str, outcome: &Outcome) {
    let result = outcome.result.as_ref().map_or_else(String::new, format_value);
    match &outcome.error {
        Some(error) => warn!(
            id = %id,
            example = %format_value(&outcome.example),
            error = %error,
            "Example failed"
        ),
        None => info!(
            id = %id,
            example = %format_value(&outcome.example),
            result = %result,
            cache_hit = outcome.cache_hit,
            "Example processed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::inputs::as_inputs;
    use crate::eval::{Method, Suite};
    use crate::lm::{LmRef, StaticResponse, StaticSequence};
    use crate::space::Param;
    use crate::store::MemoryStore;
    use crate::structured::{Schema, SchemaFn, Template};
    use serde_json::json;

    fn store() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new())
    }

    fn answer_schema() -> SchemaFn {
        SchemaFn::constant("answer_schema", Schema::object("Solution", [("final_answer", Schema::Int)]))
    }

    fn eval(id: &str) -> Evaluation {
        Evaluation::builder(id)
            .inputs(as_inputs(vec![json!({"question": "1 + 1"}), json!({"question": "1 + 2"})]))
            .method(Method::Query)
            .prompt(Template::new("{{example.question}}"))
            .schema_fn(answer_schema())
            .lm(LmRef::new(StaticSequence::new(["Solution(final_answer=2)", "3"])))
            .build()
            .unwrap()
    }

    #[test]
    fn test_root_dir_is_inherited() {
        let suite = Suite::new("s", [eval("a")]).with_root_dir("/r");
        let node = Node::new(suite, store()).unwrap();
        let leaf = &node.children()[0];
        assert_eq!(leaf.dir(), Some(PathBuf::from("/r/a")));
        assert_eq!(leaf.evaluation().unwrap().root_dir(), Some(Path::new("/r")));
        assert_eq!(leaf.parent().unwrap().id(), "s");
        assert!(node.parent().is_none());
    }

    #[test]
    fn test_search_space_children() {
        let space = eval("space").clone_with(|b| {
            b.prompt(Param::one_of([Template::new("{{example.question}}"), Template::new("Q: {{example.question}}")]))
        });
        let node = Node::new(space.unwrap(), store()).unwrap();
        assert!(!node.is_leaf());
        assert_eq!(node.children().len(), 2);
        for child in node.children() {
            assert!(child.is_leaf());
            assert_eq!(child.id(), format!("space@{}", child.hash()));
        }
    }

    #[test]
    fn test_run_without_dir_keeps_result_in_memory() {
        let node = Node::new(eval("a"), store()).unwrap();
        let tree = node.run(&RunOptions::default()).unwrap().unwrap();
        let result = tree.as_leaf().unwrap();
        assert_eq!((result.metrics.total, result.metrics.failures), (2, 1));
        assert_eq!(node.outcomes().len(), 2);
        assert_eq!(node.result(), Some(tree));
        assert!(!node.completed().unwrap());
    }

    #[test]
    fn test_dryrun_leaves_result_untouched() {
        let node = Node::new(eval("a").clone_with(|b| b.root_dir("/r")).unwrap(), store()).unwrap();
        let tree = node.dryrun(false).unwrap().unwrap();
        assert_eq!(tree.as_leaf().unwrap().metrics.total, 1);
        assert!(node.result().is_none());
        assert!(node.dryrun_output().unwrap().result.is_some());
        assert!(node.store().list_dirs(Path::new("/r")).unwrap().is_empty());
    }

    #[test]
    fn test_filter_excludes_leaves() {
        let suite = Suite::new("s", [eval("a"), eval("b")]);
        let node = Node::new(suite, store()).unwrap();
        let options = RunOptions::default().filter(|n: &Node| n.id() == "a");
        let tree = node.run(&options).unwrap().unwrap();
        assert!(tree.child("a").unwrap().is_some());
        assert!(tree.child("b").unwrap().is_none());
    }

    #[test]
    fn test_parallel_suite() {
        let lm = LmRef::new(StaticResponse::new("Solution(final_answer=2)"));
        let children: Vec<Evaluation> = (0..4)
            .map(|i| eval(&format!("e{i}")).clone_with(|b| b.lm(lm.clone())).unwrap())
            .collect();
        let node = Node::new(Suite::new("s", children), store()).unwrap();
        let tree = node.run(&RunOptions::default().parallel(true)).unwrap().unwrap();
        assert_eq!(tree.leaves().len(), 4);
        assert!(tree.leaves().iter().all(|r| r.metrics.failures == 0));
    }

    #[test]
    fn test_duplicate_sibling_ids_rejected() {
        let suite = Suite::new("s", [eval("a"), eval("a")]);
        match Node::new(suite, store()) {
            Err(Error::Config(message)) => assert!(message.contains("'a'")),
            other => panic!("expected a configuration error, got {other:?}"),
        }
        let nested = Suite::new("outer", [Suite::new("a", [eval("x")]).into(), Experiment::from(eval("a"))]);
        assert!(Node::new(nested, store()).is_err());
    }

    #[test]
    fn test_dryrun_does_not_advance_the_leaf_lm() {
        let node = Node::new(eval("a"), store()).unwrap();
        node.dryrun(false).unwrap();
        let tree = node.run(&RunOptions::default()).unwrap().unwrap();
        let result = tree.as_leaf().unwrap();
        assert_eq!((result.metrics.total, result.metrics.failures), (2, 1));
    }

    #[test]
    fn test_dryrun_counts_no_query_when_rendering_fails() {
        let broken = eval("a")
            .clone_with(|b| b.prompt(Template::new("{{example.missing}}")))
            .unwrap();
        let node = Node::new(broken, store()).unwrap();
        let tree = node.dryrun(false).unwrap().unwrap();
        let result = tree.as_leaf().unwrap();
        assert_eq!(result.cache_stats.num_queries, 0);
        assert_eq!(result.metrics.failures, 1);

        let node = Node::new(eval("b"), store()).unwrap();
        let tree = node.dryrun(false).unwrap().unwrap();
        assert_eq!(tree.as_leaf().unwrap().cache_stats.num_queries, 1);
    }
}
