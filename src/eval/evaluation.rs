//! Evaluation definitions
//!
//! An [`Evaluation`] is an immutable description of one experiment: where
//! its examples come from, how they are turned into LM requests, which LM
//! answers them, and how answers are parsed. Fields that may be searched over
//! (`method`, `prompt`, `schema_fn`, `lm`) are [`Param`]s; an evaluation
//! holding any choice is a search space and [`Evaluation::expand`] turns it
//! into concrete variants.
//!
//! Choices may also sit inside a concrete value: in a schema function's
//! arguments or in an LM's identity configuration.
//!
//! Identity: [`Evaluation::hash`] covers the task type, inputs, method,
//! prompt, schema function (including the schema it resolves to), LM
//! identity, completion field and matching spec. `id`, `root_dir`,
//! `max_workers`, `use_cache` and the LM timeout are execution-only and
//! never change the hash.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::inputs::InputSource;
use super::matching::MatchSpec;
use super::result::{ExperimentSetup, Outcome};
use super::task::Task;
use crate::hash::identity_hash;
use crate::lm::{LmDescriptor, LmRef};
use crate::space::{index_product, Param};
use crate::structured::{
    completion_prompt, completion_schema, query_prompt, MappingExample, Schema, SchemaFn,
    SchemaFnSpec, Template,
};
use crate::{Error, Result};

/// Prompting protocol used to obtain a structured answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Free-form call; the response is parsed when a schema is configured
    Call,
    /// Natural-language request mapped to a structured value
    Query,
    /// Partial object completed by the LM
    Complete,
}

impl Method {
    /// Whether this method cannot run without a schema.
    #[must_use]
    pub const fn requires_schema(self) -> bool {
        matches!(self, Self::Query | Self::Complete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Call => "call",
            Self::Query => "query",
            Self::Complete => "complete",
        })
    }
}

/// Schema and few-shot examples an evaluation prompts with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    /// Output schema; `None` for a `call` without schema function
    pub schema: Option<Schema>,
    /// Few-shot examples
    pub examples: Vec<MappingExample>,
}

/// A single evaluation, possibly holding search-space choices.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    id: String,
    root_dir: Option<PathBuf>,
    task: Task,
    inputs: InputSource,
    method: Param<Method>,
    prompt: Param<Template>,
    schema_fn: Option<Param<SchemaFn>>,
    lm: Param<LmRef>,
    completion_prompt_field: Option<String>,
    use_cache: bool,
    max_workers: usize,
    matching: Option<MatchSpec>,
}

/// Fields that determine an evaluation's identity hash.
#[derive(Serialize)]
struct Identity<'a> {
    #[serde(rename = "_type")]
    task: &'a str,
    inputs: &'a InputSource,
    method: &'a Param<Method>,
    prompt: &'a Param<Template>,
    schema_fn: Option<Param<Value>>,
    lm: Param<Value>,
    completion_prompt_field: Option<&'a str>,
    matching: Option<&'a MatchSpec>,
}

impl Evaluation {
    /// Start building an evaluation with the given id.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> EvaluationBuilder {
        EvaluationBuilder::new(id)
    }

    /// Builder pre-filled with this evaluation's fields.
    #[must_use]
    pub fn to_builder(&self) -> EvaluationBuilder {
        EvaluationBuilder {
            id: self.id.clone(),
            root_dir: self.root_dir.clone(),
            task: self.task.clone(),
            inputs: self.inputs.clone(),
            method: self.method.clone(),
            prompt: Some(self.prompt.clone()),
            schema_fn: self.schema_fn.clone(),
            lm: Some(self.lm.clone()),
            completion_prompt_field: self.completion_prompt_field.clone(),
            use_cache: self.use_cache,
            max_workers: self.max_workers,
            matching: self.matching.clone(),
        }
    }

    /// Structural copy with field overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the overridden configuration is invalid.
    pub fn clone_with(&self, overrides: impl FnOnce(EvaluationBuilder) -> EvaluationBuilder) -> Result<Self> {
        overrides(self.to_builder()).build()
    }

    /// Base id (or `base@hash` for an expanded variant).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configured root directory, if any.
    #[must_use]
    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    pub(crate) fn inherit_root_dir(&mut self, root_dir: Option<&Path>) {
        if self.root_dir.is_none() {
            self.root_dir = root_dir.map(Path::to_path_buf);
        }
    }

    /// Persistence directory, `root_dir/id`.
    #[must_use]
    pub fn dir(&self) -> Option<PathBuf> {
        self.root_dir.as_ref().map(|root| root.join(&self.id))
    }

    /// Task type.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Input source.
    #[must_use]
    pub const fn inputs(&self) -> &InputSource {
        &self.inputs
    }

    /// Prompting method (or choice of methods).
    #[must_use]
    pub const fn method(&self) -> &Param<Method> {
        &self.method
    }

    /// Prompt template (or choice of templates).
    #[must_use]
    pub const fn prompt(&self) -> &Param<Template> {
        &self.prompt
    }

    /// Schema function (or choice of schema functions).
    #[must_use]
    pub const fn schema_fn(&self) -> Option<&Param<SchemaFn>> {
        self.schema_fn.as_ref()
    }

    /// Language model (or choice of models).
    #[must_use]
    pub const fn lm(&self) -> &Param<LmRef> {
        &self.lm
    }

    /// Field of the completion object that receives the rendered prompt.
    #[must_use]
    pub fn completion_prompt_field(&self) -> Option<&str> {
        self.completion_prompt_field.as_deref()
    }

    /// Whether LM responses are cached.
    #[must_use]
    pub const fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Worker pool size.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Groundtruth matching, if this is a matching evaluation.
    #[must_use]
    pub const fn matching(&self) -> Option<&MatchSpec> {
        self.matching.as_ref()
    }

    /// Whether any searchable field holds a choice, at any depth.
    #[must_use]
    pub fn has_choices(&self) -> bool {
        self.method.has_choices()
            || self.prompt.has_choices()
            || self
                .schema_fn
                .as_ref()
                .is_some_and(|p| p.has_choices() || p.candidates().into_iter().any(SchemaFn::has_choices))
            || self.lm.has_choices()
            || self.lm.candidates().into_iter().any(LmRef::has_choices)
    }

    /// Identity hash: 8 hex characters of SHA-256 over the identity fields.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the identity cannot be encoded and propagates
    /// errors of a concrete schema function.
    pub fn hash(&self) -> Result<String> {
        let identity = Identity {
            task: self.task.name(),
            inputs: &self.inputs,
            method: &self.method,
            prompt: &self.prompt,
            schema_fn: self
                .schema_fn
                .as_ref()
                .map(|p| p.try_map(&SchemaFn::identity))
                .transpose()?,
            lm: self.lm.map(&|lm: &LmRef| lm.descriptor().identity()),
            completion_prompt_field: self.completion_prompt_field.as_deref(),
            matching: self.matching.as_ref(),
        };
        identity_hash(&identity)
    }

    /// Concrete variants of this evaluation.
    ///
    /// Without choices the evaluation expands to itself. Otherwise every
    /// combination of candidates (method, prompt, schema function, LM; last
    /// field varying fastest) becomes a variant with id `"{id}@{hash}"`;
    /// combinations with equal hashes collapse to the first. Schema
    /// functions and LMs with choices in their arguments or configuration
    /// contribute one candidate per concrete value. Every variant gets its
    /// own copy of its LM.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a variant cannot be hashed and
    /// [`Error::Config`] if an LM rejects an expanded configuration.
    pub fn expand(&self) -> Result<Vec<Self>> {
        if !self.has_choices() {
            return Ok(vec![self.clone()]);
        }
        let methods = self.method.candidates();
        let prompts = self.prompt.candidates();
        let schema_fns: Vec<Option<SchemaFn>> = match &self.schema_fn {
            Some(param) => param
                .candidates()
                .into_iter()
                .flat_map(SchemaFn::expand)
                .map(Some)
                .collect(),
            None => vec![None],
        };
        let mut lms = Vec::new();
        for lm in self.lm.candidates() {
            lms.extend(lm.expand()?);
        }

        let mut seen = HashSet::new();
        let mut variants = Vec::new();
        for combo in index_product(&[methods.len(), prompts.len(), schema_fns.len(), lms.len()]) {
            let mut variant = self.clone();
            variant.method = Param::Value(*methods[combo[0]]);
            variant.prompt = Param::Value(prompts[combo[1]].clone());
            variant.schema_fn = schema_fns[combo[2]].clone().map(Param::Value);
            variant.lm = Param::Value(lms[combo[3]].fresh());
            let hash = variant.hash()?;
            if seen.insert(hash.clone()) {
                variant.id = format!("{}@{hash}", self.id);
                variants.push(variant);
            }
        }
        Ok(variants)
    }

    fn concrete(&self) -> Result<Concrete<'_>> {
        let unexpanded = || Error::config(format!("evaluation '{}' has unexpanded choices", self.id));
        Ok(Concrete {
            method: *self.method.as_value().ok_or_else(unexpanded)?,
            prompt: self.prompt.as_value().ok_or_else(unexpanded)?,
            schema_fn: match &self.schema_fn {
                Some(param) => Some(
                    param
                        .as_value()
                        .filter(|f| !f.has_choices())
                        .ok_or_else(unexpanded)?,
                ),
                None => None,
            },
            lm: self
                .lm
                .as_value()
                .filter(|lm| !lm.has_choices())
                .ok_or_else(unexpanded)?,
        })
    }

    /// The concrete LM of an expanded evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the LM is still a choice.
    pub fn concrete_lm(&self) -> Result<&LmRef> {
        Ok(self.concrete()?.lm)
    }

    /// Resolve the schema function.
    ///
    /// For `complete` the schema must be an object; it is adapted by
    /// prepending the completion field as a string when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] for a non-object completion schema and
    /// propagates errors of the schema function.
    pub fn resolve_schema(&self) -> Result<ResolvedSchema> {
        let concrete = self.concrete()?;
        let Some(schema_fn) = concrete.schema_fn else {
            return Ok(ResolvedSchema {
                schema: None,
                examples: Vec::new(),
            });
        };
        let bundle = schema_fn.resolve()?;
        let schema = if concrete.method == Method::Complete {
            let field = self.completion_field()?;
            Schema::Object(completion_schema(&bundle.schema, field)?)
        } else {
            bundle.schema
        };
        Ok(ResolvedSchema {
            schema: Some(schema),
            examples: bundle.examples,
        })
    }

    fn completion_field(&self) -> Result<&str> {
        self.completion_prompt_field
            .as_deref()
            .ok_or_else(|| Error::config("method 'complete' requires completion_prompt_field"))
    }

    /// Process one example, calling the LM directly.
    ///
    /// # Errors
    ///
    /// Returns configuration and schema errors. Failures of the example
    /// itself are recorded on the returned [`Outcome`].
    pub fn process(&self, example: &Value) -> Result<Outcome> {
        let resolved = self.resolve_schema()?;
        let lm = self.concrete()?.lm;
        self.process_with(example, &resolved, |prompt| Ok((lm.sample(prompt)?, false)))
    }

    /// Process one example with a custom LM round.
    ///
    /// `sample` receives the fully assembled LM input and returns the
    /// response plus whether it came from a cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the evaluation has unexpanded choices.
    pub fn process_with<F>(&self, example: &Value, resolved: &ResolvedSchema, sample: F) -> Result<Outcome>
    where
        F: FnOnce(&str) -> anyhow::Result<(String, bool)>,
    {
        let concrete = self.concrete()?;
        let mut outcome = Outcome::new(example.clone());

        let mut bindings = Map::new();
        bindings.insert("example".to_string(), example.clone());
        let rendered = match concrete.prompt.render(&Value::Object(bindings)) {
            Ok(text) => text,
            Err(e) => {
                outcome.error = Some(e.to_string());
                return Ok(outcome);
            }
        };

        let lm_input = match (concrete.method, &resolved.schema) {
            (Method::Call, _) => rendered,
            (Method::Query, Some(schema)) => query_prompt(&rendered, schema, &resolved.examples),
            (Method::Complete, Some(Schema::Object(obj))) => {
                completion_prompt(&rendered, obj, self.completion_field()?, &resolved.examples)
            }
            (method, _) => {
                return Err(Error::schema(format!(
                    "method '{method}' cannot run without a suitable schema"
                )))
            }
        };
        outcome.lm_input = Some(lm_input.clone());

        let response = match sample(&lm_input) {
            Ok((response, hit)) => {
                outcome.cache_hit = hit;
                response
            }
            Err(e) => {
                outcome.error = Some(format!("LM error: {e:#}"));
                return Ok(outcome);
            }
        };
        let response = match concrete.method {
            Method::Call => self.task.hooks().call_postprocess(&response),
            Method::Query | Method::Complete => response,
        };

        match &resolved.schema {
            Some(schema) => match schema.parse(&response) {
                Ok(value) => outcome.result = Some(value),
                Err(e) => outcome.error = Some(e.to_string()),
            },
            None => outcome.result = Some(Value::String(response.clone())),
        }
        outcome.response = Some(response);
        Ok(outcome)
    }

    /// Setup summary recorded in results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the evaluation has unexpanded choices.
    pub fn experiment_setup(&self) -> Result<ExperimentSetup> {
        let concrete = self.concrete()?;
        Ok(ExperimentSetup {
            id: self.id.clone(),
            dir: self.dir(),
            model: concrete.lm.kind(),
            prompt_template: concrete.prompt.text().to_string(),
            method: concrete.method,
            schema_fn: concrete.schema_fn.map(ToString::to_string),
        })
    }

    /// Self-describing, serializable form of this evaluation.
    #[must_use]
    pub fn definition(&self) -> EvaluationDefinition {
        EvaluationDefinition {
            task: self.task.name().to_string(),
            id: self.id.clone(),
            root_dir: self.root_dir.clone(),
            inputs: self.inputs.clone(),
            method: self.method.clone(),
            prompt: self.prompt.clone(),
            schema_fn: self
                .schema_fn
                .as_ref()
                .map(|p| p.map(&|f: &SchemaFn| f.spec().clone())),
            lm: self.lm.map(&LmRef::descriptor),
            completion_prompt_field: self.completion_prompt_field.clone(),
            use_cache: self.use_cache,
            max_workers: self.max_workers,
            matching: self.matching.clone(),
            created_at: None,
        }
    }
}

struct Concrete<'a> {
    method: Method,
    prompt: &'a Template,
    schema_fn: Option<&'a SchemaFn>,
    lm: &'a LmRef,
}

/// Persisted form of an [`Evaluation`] (`experiment.json`).
///
/// Live collaborators are replaced by their identities: the task by its
/// name, schema functions by [`SchemaFnSpec`], LMs by [`LmDescriptor`]. A
/// [`Registry`](super::Registry) maps them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDefinition {
    /// Task type name
    #[serde(rename = "_type")]
    pub task: String,
    /// Node id
    pub id: String,
    /// Root directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    /// Input source
    pub inputs: InputSource,
    /// Prompting method
    pub method: Param<Method>,
    /// Prompt template
    pub prompt: Param<Template>,
    /// Schema function identity
    #[serde(default)]
    pub schema_fn: Option<Param<SchemaFnSpec>>,
    /// LM descriptor
    pub lm: Param<LmDescriptor>,
    /// Completion field
    #[serde(default)]
    pub completion_prompt_field: Option<String>,
    /// Cache switch
    pub use_cache: bool,
    /// Worker pool size
    pub max_workers: usize,
    /// Matching spec
    #[serde(default)]
    pub matching: Option<MatchSpec>,
    /// When the definition was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Builder for [`Evaluation`].
///
/// Defaults: task `Evaluation`, no inputs, method `query`, no schema
/// function, `use_cache = true`, `max_workers = 1`.
#[derive(Debug, Clone)]
pub struct EvaluationBuilder {
    id: String,
    root_dir: Option<PathBuf>,
    task: Task,
    inputs: InputSource,
    method: Param<Method>,
    prompt: Option<Param<Template>>,
    schema_fn: Option<Param<SchemaFn>>,
    lm: Option<Param<LmRef>>,
    completion_prompt_field: Option<String>,
    use_cache: bool,
    max_workers: usize,
    matching: Option<MatchSpec>,
}

impl EvaluationBuilder {
    /// Create a builder with required id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root_dir: None,
            task: Task::default(),
            inputs: InputSource::default(),
            method: Param::Value(Method::Query),
            prompt: None,
            schema_fn: None,
            lm: None,
            completion_prompt_field: None,
            use_cache: true,
            max_workers: 1,
            matching: None,
        }
    }

    /// Set the id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the root directory.
    #[must_use]
    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    /// Clear the root directory (inherit it from the parent node).
    #[must_use]
    pub fn no_root_dir(mut self) -> Self {
        self.root_dir = None;
        self
    }

    /// Set the task type.
    #[must_use]
    pub fn task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }

    /// Set the input source.
    #[must_use]
    pub fn inputs(mut self, inputs: InputSource) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set the method or a choice of methods.
    #[must_use]
    pub fn method(mut self, method: impl Into<Param<Method>>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the prompt template or a choice of templates.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<Param<Template>>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the schema function or a choice of schema functions.
    #[must_use]
    pub fn schema_fn(mut self, schema_fn: impl Into<Param<SchemaFn>>) -> Self {
        self.schema_fn = Some(schema_fn.into());
        self
    }

    /// Remove the schema function.
    #[must_use]
    pub fn no_schema_fn(mut self) -> Self {
        self.schema_fn = None;
        self
    }

    /// Set the LM or a choice of LMs.
    #[must_use]
    pub fn lm(mut self, lm: impl Into<Param<LmRef>>) -> Self {
        self.lm = Some(lm.into());
        self
    }

    /// Set the per-call timeout of every candidate LM.
    #[must_use]
    pub fn lm_timeout(mut self, timeout: Option<f64>) -> Self {
        self.lm = self
            .lm
            .map(|lm| lm.map(&|candidate: &LmRef| candidate.with_timeout(timeout)));
        self
    }

    /// Set the completion field.
    #[must_use]
    pub fn completion_prompt_field(mut self, field: impl Into<String>) -> Self {
        self.completion_prompt_field = Some(field.into());
        self
    }

    /// Enable or disable the LM cache.
    #[must_use]
    pub const fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the worker pool size.
    #[must_use]
    pub const fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Make this a matching evaluation.
    #[must_use]
    pub fn matching(mut self, matching: MatchSpec) -> Self {
        self.matching = Some(matching);
        self
    }

    /// Validate and build the evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty id, a missing prompt or LM,
    /// zero workers, an empty choice, a method requiring a schema without a
    /// schema function, or `complete` without a completion field.
    pub fn build(self) -> Result<Evaluation> {
        if self.id.trim().is_empty() {
            return Err(Error::config("evaluation id must not be empty"));
        }
        let id = self.id;
        let prompt = self
            .prompt
            .ok_or_else(|| Error::config(format!("evaluation '{id}' requires a prompt")))?;
        let lm = self
            .lm
            .ok_or_else(|| Error::config(format!("evaluation '{id}' requires an lm")))?;
        if self.max_workers == 0 {
            return Err(Error::config(format!("evaluation '{id}': max_workers must be at least 1")));
        }
        if self.method.has_empty_choice()
            || prompt.has_empty_choice()
            || lm.has_empty_choice()
            || self.schema_fn.as_ref().is_some_and(|p| {
                p.has_empty_choice() || p.candidates().into_iter().any(|f| f.expand().is_empty())
            })
        {
            return Err(Error::config(format!("evaluation '{id}' has an empty choice")));
        }
        for method in self.method.candidates() {
            if method.requires_schema() && self.schema_fn.is_none() {
                return Err(Error::config(format!(
                    "evaluation '{id}': method '{method}' requires a schema_fn"
                )));
            }
            if *method == Method::Complete && self.completion_prompt_field.is_none() {
                return Err(Error::config(format!(
                    "evaluation '{id}': method 'complete' requires completion_prompt_field"
                )));
            }
        }
        Ok(Evaluation {
            id,
            root_dir: self.root_dir,
            task: self.task,
            inputs: self.inputs,
            method: self.method,
            prompt,
            schema_fn: self.schema_fn,
            lm,
            completion_prompt_field: self.completion_prompt_field,
            use_cache: self.use_cache,
            max_workers: self.max_workers,
            matching: self.matching,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::inputs::as_inputs;
    use crate::lm::{StaticResponse, StaticSequence};
    use serde_json::json;

    fn solution() -> Schema {
        Schema::object("Solution", [("final_answer", Schema::Int)])
    }

    fn eval_set(id: &str, method: Method, lm: LmRef) -> EvaluationBuilder {
        Evaluation::builder(id)
            .root_dir("/tmp/evals")
            .inputs(as_inputs(vec![
                json!({"question": "Compute 1 + 1"}),
                json!({"question": "Compute 1 + 2"}),
            ]))
            .method(method)
            .prompt(Template::new("{{example.question}}"))
            .completion_prompt_field("question")
            .schema_fn(SchemaFn::constant("answer_schema", solution()))
            .lm(lm)
    }

    #[test]
    fn test_basics() {
        let lm = LmRef::new(StaticSequence::new(["two", "Solution(final_answer=2)"]));
        let e = eval_set("basic_test", Method::Call, lm).build().unwrap();
        assert_eq!(e.dir(), Some(PathBuf::from("/tmp/evals/basic_test")));
        assert_eq!(e.hash().unwrap(), e.clone().hash().unwrap());
        assert_eq!(e.hash().unwrap().len(), 8);

        let tweaked = e
            .clone_with(|b| b.max_workers(2).lm_timeout(Some(20.0)).use_cache(false).id("x"))
            .unwrap();
        assert_eq!(e.hash().unwrap(), tweaked.hash().unwrap());

        let reprompted = e
            .clone_with(|b| b.prompt(Template::new("Hello {{example.question}}")))
            .unwrap();
        assert_ne!(e.hash().unwrap(), reprompted.hash().unwrap());

        let resolved = e.resolve_schema().unwrap();
        assert_eq!(resolved.schema, Some(solution()));
        assert!(resolved.examples.is_empty());
    }

    #[test]
    fn test_bad_init() {
        let lm = LmRef::new(StaticResponse::new("hi"));
        let err = eval_set("bad", Method::Complete, lm.clone())
            .no_schema_fn()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(eval_set("bad", Method::Call, lm.clone()).max_workers(0).build().is_err());
        assert!(eval_set("", Method::Call, lm.clone()).build().is_err());
        assert!(eval_set("bad", Method::Call, lm)
            .method(Param::one_of(Vec::<Method>::new()))
            .build()
            .is_err());
    }

    #[test]
    fn test_schema_for_completion() {
        let lm = LmRef::new(StaticResponse::new("hi"));
        let e = eval_set("completion", Method::Complete, lm).build().unwrap();
        let resolved = e.resolve_schema().unwrap();
        let obj = resolved.schema.as_ref().and_then(Schema::as_object).unwrap();
        assert_eq!(obj.fields[0].0, "question");

        let bad = e
            .clone_with(|b| b.schema_fn(SchemaFn::constant("int_schema", Schema::Int)))
            .unwrap();
        let err = bad.resolve_schema().unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("object schema"));
    }

    #[test]
    fn test_process_call_without_schema() {
        let lm = LmRef::new(StaticResponse::new("two"));
        let e = eval_set("call", Method::Call, lm).no_schema_fn().build().unwrap();
        let outcome = e.process(&json!({"question": "Compute 1 + 1"})).unwrap();
        assert_eq!(outcome.lm_input.as_deref(), Some("Compute 1 + 1"));
        assert_eq!(outcome.result, Some(json!("two")));
    }

    #[test]
    fn test_process_query_records_parse_failure() {
        let lm = LmRef::new(StaticResponse::new("3"));
        let e = eval_set("query", Method::Query, lm).build().unwrap();
        let outcome = e.process(&json!({"question": "Compute 1 + 1"})).unwrap();
        assert!(outcome.is_failure());
        assert_eq!(outcome.response.as_deref(), Some("3"));
        assert!(outcome.lm_input.unwrap().contains("OUTPUT_TYPE"));
    }

    #[test]
    fn test_process_template_failure_is_recorded() {
        let lm = LmRef::new(StaticResponse::new("x"));
        let e = eval_set("tpl", Method::Call, lm).no_schema_fn().build().unwrap();
        let outcome = e.process(&json!({"other": 1})).unwrap();
        assert!(outcome.error.unwrap().contains("undefined variable"));
        assert!(outcome.lm_input.is_none());
    }

    #[test]
    fn test_expand_dedups_equal_choices() {
        let lm = LmRef::new(StaticResponse::new("2"));
        let schema = SchemaFn::constant("answer_schema", solution());
        let e = eval_set("space", Method::Query, lm)
            .method(Param::one_of([Method::Call, Method::Query]))
            .schema_fn(Param::one_of([schema.clone(), schema]))
            .build()
            .unwrap();
        assert!(e.has_choices());
        let variants = e.expand().unwrap();
        assert_eq!(variants.len(), 2);
        for v in &variants {
            assert!(!v.has_choices());
            assert_eq!(v.id(), format!("space@{}", v.hash().unwrap()));
        }
        assert_eq!(variants[0].method().as_value(), Some(&Method::Call));
    }

    #[test]
    fn test_expand_without_choices_is_identity() {
        let lm = LmRef::new(StaticResponse::new("2"));
        let e = eval_set("plain", Method::Query, lm).build().unwrap();
        assert_eq!(e.expand().unwrap(), vec![e.clone()]);
    }

    #[test]
    fn test_process_rejects_unexpanded() {
        let e = eval_set("space", Method::Query, LmRef::new(StaticResponse::new("2")))
            .method(Param::one_of([Method::Call, Method::Query]))
            .build()
            .unwrap();
        assert!(matches!(e.process(&json!({})), Err(Error::Config(_))));
    }

    #[test]
    fn test_definition_serializes_task_tag() {
        let e = eval_set("def", Method::Query, LmRef::new(StaticResponse::new("2")))
            .build()
            .unwrap();
        let json = serde_json::to_value(e.definition()).unwrap();
        assert_eq!(json["_type"], json!("Evaluation"));
        assert_eq!(json["method"], json!("query"));
        assert_eq!(json["schema_fn"], json!({"name": "answer_schema"}));
        assert_eq!(json["lm"]["kind"], json!("StaticResponse"));
    }
}
