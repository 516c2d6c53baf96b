//! Deterministic fake language models for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::{json, Value};

use super::{LanguageModel, LmDescriptor};

/// Always answers with the same text.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    response: String,
    timeout: Option<f64>,
}

impl StaticResponse {
    /// Create a model answering `response` to every prompt.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            timeout: None,
        }
    }
}

impl LanguageModel for StaticResponse {
    fn descriptor(&self) -> LmDescriptor {
        LmDescriptor {
            kind: "StaticResponse".to_string(),
            config: json!({ "response": self.response }),
            timeout: self.timeout,
        }
    }

    fn sample(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.response.clone())
    }

    fn with_timeout(&self, timeout: Option<f64>) -> Arc<dyn LanguageModel> {
        Arc::new(Self {
            response: self.response.clone(),
            timeout,
        })
    }

    fn fresh(&self) -> Arc<dyn LanguageModel> {
        Arc::new(self.clone())
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Arc<dyn LanguageModel>> {
        let response = config
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing string 'response'"))?;
        Ok(Arc::new(Self {
            response: response.to_string(),
            timeout: self.timeout,
        }))
    }
}

/// Answers with the next response of a fixed sequence.
///
/// The position is shared by every clone of the handle, so a sequence wired
/// into several evaluations keeps advancing across them. Search-space
/// variants receive [`LanguageModel::fresh`] copies with their own position.
/// Sampling past the end of the sequence is an error.
#[derive(Debug, Clone)]
pub struct StaticSequence {
    responses: Arc<Vec<String>>,
    position: Arc<AtomicUsize>,
    timeout: Option<f64>,
}

impl StaticSequence {
    /// Create a model replaying `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Arc::new(responses.into_iter().map(Into::into).collect()),
            position: Arc::new(AtomicUsize::new(0)),
            timeout: None,
        }
    }

    /// Number of responses handed out so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.position.load(Ordering::SeqCst).min(self.responses.len())
    }
}

impl LanguageModel for StaticSequence {
    fn descriptor(&self) -> LmDescriptor {
        LmDescriptor {
            kind: "StaticSequence".to_string(),
            config: json!({ "responses": self.responses.as_slice() }),
            timeout: self.timeout,
        }
    }

    fn sample(&self, _prompt: &str) -> anyhow::Result<String> {
        let index = self.position.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("StaticSequence exhausted after {} responses", self.responses.len()))
    }

    fn with_timeout(&self, timeout: Option<f64>) -> Arc<dyn LanguageModel> {
        Arc::new(Self {
            responses: Arc::clone(&self.responses),
            position: Arc::clone(&self.position),
            timeout,
        })
    }

    fn fresh(&self) -> Arc<dyn LanguageModel> {
        Arc::new(Self {
            responses: Arc::clone(&self.responses),
            position: Arc::new(AtomicUsize::new(self.position.load(Ordering::SeqCst))),
            timeout: self.timeout,
        })
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Arc<dyn LanguageModel>> {
        let responses = config
            .get("responses")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("missing list 'responses'"))?
            .iter()
            .map(|r| r.as_str().map(str::to_string).ok_or_else(|| anyhow!("responses must be strings")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Arc::new(Self {
            responses: Arc::new(responses),
            position: Arc::new(AtomicUsize::new(0)),
            timeout: self.timeout,
        }))
    }
}

/// Answers with the prompt itself.
#[derive(Debug, Clone, Default)]
pub struct Echo {
    timeout: Option<f64>,
}

impl Echo {
    /// Create an echo model.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }
}

impl LanguageModel for Echo {
    fn descriptor(&self) -> LmDescriptor {
        LmDescriptor {
            kind: "Echo".to_string(),
            config: json!({}),
            timeout: self.timeout,
        }
    }

    fn sample(&self, prompt: &str) -> anyhow::Result<String> {
        Ok(prompt.to_string())
    }

    fn with_timeout(&self, timeout: Option<f64>) -> Arc<dyn LanguageModel> {
        Arc::new(Self { timeout })
    }

    fn fresh(&self) -> Arc<dyn LanguageModel> {
        Arc::new(self.clone())
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Arc<dyn LanguageModel>> {
        match config {
            Value::Object(map) if !map.is_empty() => Err(anyhow!("Echo takes no configuration")),
            _ => Ok(self.fresh()),
        }
    }
}
