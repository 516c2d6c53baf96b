//! Persistence backend + type registry, bundled.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::evaluation::EvaluationDefinition;
use super::node::Node;
use super::registry::Registry;
use super::report::files;
use super::suite::Experiment;
use crate::store::{read_json, FileStore, MemoryStore, Store};
use crate::{Error, Result};

/// Where experiments persist and how persisted definitions are rebuilt.
#[derive(Clone)]
pub struct Workspace {
    registry: Arc<Registry>,
    store: Arc<dyn Store>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Create a workspace.
    #[must_use]
    pub fn new(registry: Registry, store: Arc<dyn Store>) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
        }
    }

    /// Built-in registry over an in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Registry::new(), Arc::new(MemoryStore::new()))
    }

    /// Built-in registry over the local filesystem.
    #[must_use]
    pub fn filesystem() -> Self {
        Self::new(Registry::new(), Arc::new(FileStore::new()))
    }

    /// Replace the registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Type registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Persistence backend.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Materialize an experiment into a node tree over this store.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if an identity hash cannot be computed.
    pub fn materialize(&self, experiment: impl Into<Experiment>) -> Result<Arc<Node>> {
        Node::new(experiment, Arc::clone(&self.store))
    }

    /// Rebuild the node persisted under `dir`.
    ///
    /// The node's root directory is `dir`'s parent. Its result stays absent
    /// until [`Node::load_result`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `dir` holds no `experiment.json` or the
    /// definition names unregistered types, and IO/JSON errors from reading.
    pub fn load(&self, dir: &Path) -> Result<Arc<Node>> {
        let path = dir.join(files::EXPERIMENT_JSON);
        let mut definition: EvaluationDefinition = read_json(self.store.as_ref(), &path)?
            .ok_or_else(|| Error::config(format!("no experiment definition at {}", path.display())))?;
        if let Some(parent) = dir.parent() {
            definition.root_dir = Some(parent.to_path_buf());
        }
        debug!(dir = %dir.display(), id = %definition.id, "Loading experiment");
        let evaluation = self.registry.evaluation(&definition)?;
        self.materialize(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::inputs::as_inputs;
    use crate::eval::{Evaluation, Method, RunOptions};
    use crate::lm::{LmRef, StaticResponse};
    use crate::structured::Template;
    use serde_json::json;

    #[test]
    fn test_load_missing_definition() {
        let ws = Workspace::in_memory();
        let err = ws.load(Path::new("/nowhere/e")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_round_trip_in_memory() {
        let ws = Workspace::in_memory();
        let evaluation = Evaluation::builder("e")
            .root_dir("/root")
            .inputs(as_inputs(vec![json!({"q": "hi"})]))
            .method(Method::Call)
            .prompt(Template::new("{{example.q}}"))
            .lm(LmRef::new(StaticResponse::new("hello")))
            .build()
            .unwrap();
        let node = ws.materialize(evaluation).unwrap();
        let result = node.run(&RunOptions::default()).unwrap();

        let loaded = ws.load(Path::new("/root/e")).unwrap();
        assert_eq!(loaded.evaluation(), node.evaluation());
        assert_eq!(loaded.hash(), node.hash());
        assert!(loaded.result().is_none());
        assert_eq!(loaded.load_result().unwrap(), result);
    }
}
