//! Language-model collaborator interface
//!
//! The engine never talks to a network LM itself. It sees an LM as:
//!
//! - a **descriptor** ([`LmDescriptor`]): a kind name plus an identity
//!   configuration (hashed) and an execution-only `timeout` (not hashed);
//! - a **sampler**: `prompt -> response text`.
//!
//! Descriptors are what get persisted in `experiment.json`; a
//! [`Registry`](crate::eval::Registry) turns them back into live models when
//! experiments are reloaded.

mod fake;

pub use fake::{Echo, StaticResponse, StaticSequence};

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::space::{expand_value, value_has_choices};
use crate::{Error, Result};

/// Serializable description of a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmDescriptor {
    /// Model kind (the "class" of the model, e.g. `StaticSequence`)
    pub kind: String,
    /// Identity-relevant configuration
    #[serde(default)]
    pub config: Value,
    /// Per-call timeout in seconds (execution-only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl LmDescriptor {
    /// Create a descriptor without a timeout.
    #[must_use]
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
            timeout: None,
        }
    }

    /// The part of the descriptor that participates in identity hashing.
    #[must_use]
    pub fn identity(&self) -> Value {
        serde_json::json!({ "kind": self.kind, "config": self.config })
    }

    /// Whether two descriptors denote the same model (timeout ignored).
    #[must_use]
    pub fn same_model(&self, other: &Self) -> bool {
        self.kind == other.kind && self.config == other.config
    }
}

/// A language model as seen by the evaluation engine.
pub trait LanguageModel: Send + Sync + fmt::Debug {
    /// Describe this model for hashing, persistence, and selection.
    fn descriptor(&self) -> LmDescriptor;

    /// Produce a response for a fully rendered prompt.
    ///
    /// # Errors
    ///
    /// Any failure (transport, timeout, quota) is reported as an error and
    /// recorded as a failure of the item being processed.
    fn sample(&self, prompt: &str) -> anyhow::Result<String>;

    /// Return a copy of this model with a different per-call timeout.
    fn with_timeout(&self, timeout: Option<f64>) -> Arc<dyn LanguageModel>;

    /// Return an independent copy: sampling state is not shared with `self`.
    fn fresh(&self) -> Arc<dyn LanguageModel>;

    /// Return a model of the same kind with another identity configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is not understood. Models are not
    /// reconfigurable unless they say otherwise.
    fn configure(&self, config: &Value) -> anyhow::Result<Arc<dyn LanguageModel>> {
        let _ = config;
        Err(anyhow!("{} does not accept configuration overrides", self.descriptor().kind))
    }
}

/// Builds a live model from an identity configuration.
pub type LmBuilder = Arc<dyn Fn(&Value) -> Result<LmRef> + Send + Sync>;

/// An LM whose identity configuration still holds choices.
struct LmSpace {
    kind: String,
    config: Value,
    timeout: Option<f64>,
    build: LmBuilder,
}

#[derive(Clone)]
enum Inner {
    Model(Arc<dyn LanguageModel>),
    Space(Arc<LmSpace>),
}

/// Shared handle to a language model, compared by descriptor.
///
/// A handle may also denote a family of models whose configuration holds
/// `_oneof` choices ([`LmRef::with_config`], [`LmRef::space`]). Such a handle
/// cannot sample; [`LmRef::expand`] turns it into concrete models.
#[derive(Clone)]
pub struct LmRef(Inner);

impl LmRef {
    /// Wrap a model.
    pub fn new(model: impl LanguageModel + 'static) -> Self {
        Self(Inner::Model(Arc::new(model)))
    }

    /// Wrap an already shared model.
    #[must_use]
    pub fn from_arc(model: Arc<dyn LanguageModel>) -> Self {
        Self(Inner::Model(model))
    }

    /// A family of `kind` models, one per concrete value of `config`.
    #[must_use]
    pub fn space(kind: impl Into<String>, config: Value, build: LmBuilder) -> Self {
        Self(Inner::Space(Arc::new(LmSpace {
            kind: kind.into(),
            config,
            timeout: None,
            build,
        })))
    }

    /// Model descriptor.
    #[must_use]
    pub fn descriptor(&self) -> LmDescriptor {
        match &self.0 {
            Inner::Model(model) => model.descriptor(),
            Inner::Space(space) => LmDescriptor {
                kind: space.kind.clone(),
                config: space.config.clone(),
                timeout: space.timeout,
            },
        }
    }

    /// Model kind (class name).
    #[must_use]
    pub fn kind(&self) -> String {
        self.descriptor().kind
    }

    /// Sample a response.
    ///
    /// # Errors
    ///
    /// Propagates the model's failure; a model family cannot sample.
    pub fn sample(&self, prompt: &str) -> anyhow::Result<String> {
        match &self.0 {
            Inner::Model(model) => model.sample(prompt),
            Inner::Space(space) => Err(anyhow!("'{}' has unexpanded configuration choices", space.kind)),
        }
    }

    /// Copy of this handle with another timeout.
    #[must_use]
    pub fn with_timeout(&self, timeout: Option<f64>) -> Self {
        match &self.0 {
            Inner::Model(model) => Self(Inner::Model(model.with_timeout(timeout))),
            Inner::Space(space) => Self(Inner::Space(Arc::new(LmSpace {
                kind: space.kind.clone(),
                config: space.config.clone(),
                timeout,
                build: Arc::clone(&space.build),
            }))),
        }
    }

    /// Independent copy that does not share sampling state with `self`.
    #[must_use]
    pub fn fresh(&self) -> Self {
        match &self.0 {
            Inner::Model(model) => Self(Inner::Model(model.fresh())),
            Inner::Space(_) => self.clone(),
        }
    }

    /// Whether the identity configuration holds choices.
    #[must_use]
    pub const fn has_choices(&self) -> bool {
        matches!(self.0, Inner::Space(_))
    }

    /// Model of the same kind with `overrides` merged over its identity
    /// configuration (top-level keys replace).
    ///
    /// Overrides may hold `_oneof` choices, yielding a model family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the model rejects a configuration, a
    /// choice is empty, or `self` is already a family.
    pub fn with_config(&self, overrides: Value) -> Result<Self> {
        let Inner::Model(model) = &self.0 else {
            return Err(Error::config(format!("'{}' is already a configuration space", self.kind())));
        };
        let descriptor = model.descriptor();
        let config = merge_config(descriptor.config, overrides);
        let base = Arc::clone(model);
        let build: LmBuilder = Arc::new(move |config: &Value| {
            base.configure(config)
                .map(LmRef::from_arc)
                .map_err(|e| Error::config(format!("{}: {e:#}", base.descriptor().kind)))
        });
        if !value_has_choices(&config) {
            return Ok(build(&config)?.with_timeout(descriptor.timeout));
        }
        let family = Self::space(descriptor.kind, config, build).with_timeout(descriptor.timeout);
        family.expand()?;
        Ok(family)
    }

    /// Concrete models of this handle.
    ///
    /// A plain model expands to itself; a family to one model per concrete
    /// configuration, in [`expand_value`] order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a configuration is rejected or a choice
    /// is empty.
    pub fn expand(&self) -> Result<Vec<Self>> {
        let Inner::Space(space) = &self.0 else {
            return Ok(vec![self.clone()]);
        };
        let configs = expand_value(&space.config);
        if configs.is_empty() {
            return Err(Error::config(format!("'{}' has an empty configuration choice", space.kind)));
        }
        configs
            .iter()
            .map(|config| Ok((space.build)(config)?.with_timeout(space.timeout)))
            .collect()
    }
}

fn merge_config(base: Value, overrides: Value) -> Value {
    match (base, overrides) {
        (Value::Object(mut base), Value::Object(overrides)) => {
            base.extend(overrides);
            Value::Object(base)
        }
        (_, overrides) => overrides,
    }
}

impl fmt::Debug for LmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LmRef").field(&self.descriptor()).finish()
    }
}

impl PartialEq for LmRef {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor() == other.descriptor()
    }
}

impl<M: LanguageModel + 'static> From<M> for LmRef {
    fn from(model: M) -> Self {
        Self::new(model)
    }
}
