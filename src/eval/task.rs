//! Task types and their hooks.

use std::fmt;
use std::sync::Arc;

/// Name of the built-in task type.
pub const DEFAULT_TASK: &str = "Evaluation";

/// Behavior a task type may customize.
///
/// Every method has a default, so a hook type only overrides what it needs.
pub trait TaskHooks: Send + Sync + fmt::Debug {
    /// Transform the raw LM response of the `call` method before parsing.
    fn call_postprocess(&self, response: &str) -> String {
        response.to_string()
    }
}

/// Hooks of the built-in task type: no customization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl TaskHooks for DefaultHooks {}

/// A named task type.
///
/// The name is the `_type` tag of persisted definitions, participates in
/// identity hashing, and is what [`Selector::task`](super::Selector::task)
/// matches.
#[derive(Clone)]
pub struct Task {
    name: String,
    hooks: Arc<dyn TaskHooks>,
}

impl Task {
    /// Create a task type.
    pub fn new(name: impl Into<String>, hooks: impl TaskHooks + 'static) -> Self {
        Self {
            name: name.into(),
            hooks: Arc::new(hooks),
        }
    }

    /// Task type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task hooks.
    #[must_use]
    pub fn hooks(&self) -> &dyn TaskHooks {
        self.hooks.as_ref()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new(DEFAULT_TASK, DefaultHooks)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Task").field(&self.name).finish()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Upper;

    impl TaskHooks for Upper {
        fn call_postprocess(&self, response: &str) -> String {
            response.to_uppercase()
        }
    }

    #[test]
    fn test_default_task() {
        let task = Task::default();
        assert_eq!(task.name(), DEFAULT_TASK);
        assert_eq!(task.hooks().call_postprocess("x"), "x");
    }

    #[test]
    fn test_custom_hooks_compare_by_name() {
        let a = Task::new("Upper", Upper);
        assert_eq!(a.hooks().call_postprocess("abc"), "ABC");
        assert_eq!(a, Task::new("Upper", DefaultHooks));
        assert_ne!(a, Task::default());
    }
}
