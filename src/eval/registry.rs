//! Name → implementation registry for reloading persisted definitions
//!
//! `experiment.json` stores LMs as [`LmDescriptor`]s, schema functions as
//! [`SchemaFnSpec`]s and task types by name. A [`Registry`] maps those back
//! to live objects. Built-in: the fake LMs and the default task type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::evaluation::{Evaluation, EvaluationDefinition};
use super::task::Task;
use crate::lm::{Echo, LmDescriptor, LmRef, StaticResponse, StaticSequence};
use crate::space::value_has_choices;
use crate::structured::{SchemaFn, SchemaFnSpec};
use crate::{Error, Result};

/// Builds a live LM from its descriptor's identity configuration.
pub type LmFactory = Arc<dyn Fn(&Value) -> Result<LmRef> + Send + Sync>;

/// Registered LM kinds, schema functions and task types.
#[derive(Clone)]
pub struct Registry {
    lms: HashMap<String, LmFactory>,
    schema_fns: HashMap<String, SchemaFn>,
    tasks: HashMap<String, Task>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lms: Vec<_> = self.lms.keys().collect();
        lms.sort();
        let mut schema_fns: Vec<_> = self.schema_fns.keys().collect();
        schema_fns.sort();
        let mut tasks: Vec<_> = self.tasks.keys().collect();
        tasks.sort();
        f.debug_struct("Registry")
            .field("lms", &lms)
            .field("schema_fns", &schema_fns)
            .field("tasks", &tasks)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn config_str<'a>(config: &'a Value, key: &str, kind: &str) -> Result<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config(format!("{kind}: missing string '{key}'")))
}

impl Registry {
    /// Registry with the built-in LM kinds and task type.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            lms: HashMap::new(),
            schema_fns: HashMap::new(),
            tasks: HashMap::new(),
        };
        registry
            .with_lm("StaticResponse", |config| {
                Ok(LmRef::new(StaticResponse::new(config_str(config, "response", "StaticResponse")?)))
            })
            .with_lm("StaticSequence", |config| {
                let responses = config
                    .get("responses")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::config("StaticSequence: missing list 'responses'"))?
                    .iter()
                    .map(|r| {
                        r.as_str()
                            .map(ToString::to_string)
                            .ok_or_else(|| Error::config("StaticSequence: responses must be strings"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(LmRef::new(StaticSequence::new(responses)))
            })
            .with_lm("Echo", |_| Ok(LmRef::new(Echo::new())))
            .with_task(Task::default())
    }

    /// Register an LM kind.
    #[must_use]
    pub fn with_lm<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<LmRef> + Send + Sync + 'static,
    {
        self.lms.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Register a schema function under its name.
    #[must_use]
    pub fn with_schema_fn(mut self, schema_fn: SchemaFn) -> Self {
        self.schema_fns.insert(schema_fn.name().to_string(), schema_fn);
        self
    }

    /// Register a task type under its name.
    #[must_use]
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.insert(task.name().to_string(), task);
        self
    }

    /// Rebuild an LM, timeout included.
    ///
    /// A configuration holding `_oneof` choices yields a model family that
    /// the factory instantiates on expansion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown kind or a malformed config.
    pub fn lm(&self, descriptor: &LmDescriptor) -> Result<LmRef> {
        let factory = self
            .lms
            .get(&descriptor.kind)
            .ok_or_else(|| Error::config(format!("unknown LM kind '{}'", descriptor.kind)))?;
        let lm = if value_has_choices(&descriptor.config) {
            LmRef::space(descriptor.kind.clone(), descriptor.config.clone(), Arc::clone(factory))
        } else {
            factory(&descriptor.config)?
        };
        Ok(lm.with_timeout(descriptor.timeout))
    }

    /// Rebuild a schema function with its bound arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn schema_fn(&self, spec: &SchemaFnSpec) -> Result<SchemaFn> {
        self.schema_fns
            .get(&spec.name)
            .map(|f| f.clone().with_args(spec.args.clone()))
            .ok_or_else(|| Error::config(format!("unknown schema function '{}'", spec.name)))
    }

    /// Look up a task type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn task(&self, name: &str) -> Result<Task> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("unknown task type '{name}'")))
    }

    /// Rebuild an evaluation from its persisted definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown names and for definitions that
    /// fail validation.
    pub fn evaluation(&self, definition: &EvaluationDefinition) -> Result<Evaluation> {
        let mut builder = Evaluation::builder(definition.id.clone())
            .task(self.task(&definition.task)?)
            .inputs(definition.inputs.clone())
            .method(definition.method.clone())
            .prompt(definition.prompt.clone())
            .lm(definition.lm.try_map(&|d: &LmDescriptor| self.lm(d))?)
            .use_cache(definition.use_cache)
            .max_workers(definition.max_workers);
        if let Some(root_dir) = &definition.root_dir {
            builder = builder.root_dir(root_dir.clone());
        }
        if let Some(schema_fn) = &definition.schema_fn {
            builder = builder.schema_fn(schema_fn.try_map(&|s: &SchemaFnSpec| self.schema_fn(s))?);
        }
        if let Some(field) = &definition.completion_prompt_field {
            builder = builder.completion_prompt_field(field.clone());
        }
        if let Some(matching) = &definition.matching {
            builder = builder.matching(matching.clone());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::inputs::as_inputs;
    use crate::eval::{Method, TaskHooks};
    use crate::space::Param;
    use crate::structured::{Schema, Template};
    use serde_json::json;

    #[derive(Debug)]
    struct Upper;

    impl TaskHooks for Upper {
        fn call_postprocess(&self, response: &str) -> String {
            response.to_uppercase()
        }
    }

    fn answer_schema() -> SchemaFn {
        SchemaFn::constant("answer_schema", Schema::object("Solution", [("final_answer", Schema::Int)]))
    }

    #[test]
    fn test_builtin_lms_round_trip() {
        let registry = Registry::new();
        for lm in [
            LmRef::new(StaticResponse::new("2")),
            LmRef::new(StaticSequence::new(["a", "b"])),
            LmRef::new(Echo::new()).with_timeout(Some(3.0)),
        ] {
            let rebuilt = registry.lm(&lm.descriptor()).unwrap();
            assert_eq!(rebuilt.descriptor(), lm.descriptor());
        }
    }

    #[test]
    fn test_unknown_names() {
        let registry = Registry::new();
        let err = registry.lm(&LmDescriptor::new("Gpt", json!({}))).unwrap_err();
        assert!(err.to_string().contains("unknown LM kind 'Gpt'"));
        assert!(matches!(registry.task("Math"), Err(Error::Config(_))));
        let spec = SchemaFnSpec {
            name: "nope".into(),
            args: json!({}),
        };
        assert!(matches!(registry.schema_fn(&spec), Err(Error::Config(_))));
    }

    #[test]
    fn test_evaluation_from_definition() {
        let registry = Registry::new()
            .with_schema_fn(answer_schema())
            .with_task(Task::new("Upper", Upper));
        let evaluation = Evaluation::builder("e")
            .root_dir("/r")
            .task(Task::new("Upper", Upper))
            .inputs(as_inputs(vec![json!({"q": 1})]))
            .method(Param::one_of([Method::Call, Method::Query]))
            .prompt(Template::new("{{example.q}}"))
            .schema_fn(answer_schema())
            .lm(Param::one_of([
                LmRef::new(StaticResponse::new("2")),
                LmRef::new(StaticSequence::new(["3"])),
            ]))
            .max_workers(4)
            .build()
            .unwrap();
        let rebuilt = registry.evaluation(&evaluation.definition()).unwrap();
        assert_eq!(rebuilt, evaluation);
        assert_eq!(rebuilt.hash().unwrap(), evaluation.hash().unwrap());
    }

    #[test]
    fn test_nested_choices_survive_definition_round_trip() {
        let registry = Registry::new().with_schema_fn(answer_schema());
        let evaluation = Evaluation::builder("nested")
            .inputs(as_inputs(vec![json!({"q": 1})]))
            .method(Method::Query)
            .prompt(Template::new("{{example.q}}"))
            .schema_fn(answer_schema().with_args(json!({"k": {"_oneof": [1, 2]}})))
            .lm(LmRef::new(StaticResponse::new("2"))
                .with_config(json!({"response": {"_oneof": ["2", "3"]}}))
                .unwrap())
            .build()
            .unwrap();
        let rebuilt = registry.evaluation(&evaluation.definition()).unwrap();
        assert_eq!(rebuilt.hash().unwrap(), evaluation.hash().unwrap());
        assert_eq!(rebuilt.expand().unwrap().len(), 4);
        assert_eq!(rebuilt.expand().unwrap(), evaluation.expand().unwrap());
    }
}
