//! Input sources for evaluations.
//!
//! An input source is part of an evaluation's identity, so it is described
//! declaratively (in-memory values or JSON file paths) and only loaded when
//! the evaluation runs.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Where an evaluation's examples come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// Inline examples
    Values {
        /// The examples
        values: Vec<Value>,
    },
    /// JSON files each holding an array of examples, concatenated in order
    Files {
        /// File paths
        paths: Vec<PathBuf>,
    },
}

impl InputSource {
    /// Load the examples.
    ///
    /// # Errors
    ///
    /// Returns an IO or JSON error if a file cannot be read or parsed, and a
    /// configuration error if a file does not hold a JSON array.
    pub fn load(&self) -> Result<Vec<Value>> {
        match self {
            Self::Values { values } => Ok(values.clone()),
            Self::Files { paths } => {
                let mut examples = Vec::new();
                for path in paths {
                    let bytes = fs::read(path)?;
                    match serde_json::from_slice(&bytes)? {
                        Value::Array(items) => examples.extend(items),
                        _ => {
                            return Err(Error::config(format!(
                                "input file {} must hold a JSON array",
                                path.display()
                            )))
                        }
                    }
                }
                Ok(examples)
            }
        }
    }
}

impl Default for InputSource {
    fn default() -> Self {
        Self::Values { values: Vec::new() }
    }
}

/// Inline examples.
pub fn as_inputs(values: impl IntoIterator<Item = Value>) -> InputSource {
    InputSource::Values {
        values: values.into_iter().collect(),
    }
}

/// Examples from one JSON array file.
pub fn inputs_from(path: impl Into<PathBuf>) -> InputSource {
    InputSource::Files {
        paths: vec![path.into()],
    }
}

/// Examples from several JSON array files, concatenated in order.
pub fn inputs_from_files<I, P>(paths: I) -> InputSource
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    InputSource::Files {
        paths: paths.into_iter().map(Into::into).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_inputs() {
        let source = as_inputs(vec![json!({"q": 1}), json!({"q": 2})]);
        assert_eq!(source.load().unwrap().len(), 2);
    }

    #[test]
    fn test_inputs_from_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("input.json");
        fs::write(&path, r#"[{"q": 1}, {"q": 2}]"#).unwrap();
        assert_eq!(inputs_from(&path).load().unwrap(), vec![json!({"q": 1}), json!({"q": 2})]);
    }

    #[test]
    fn test_inputs_from_multiple_files() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.json");
        let b = tmp.path().join("b.json");
        fs::write(&a, "[1, 2]").unwrap();
        fs::write(&b, "[3]").unwrap();
        assert_eq!(inputs_from_files([&a, &b]).load().unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_inputs_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(inputs_from(tmp.path().join("missing.json")).load(), Err(Error::Io(_))));

        let path = tmp.path().join("object.json");
        fs::write(&path, "{}").unwrap();
        assert!(matches!(inputs_from(&path).load(), Err(Error::Config(_))));
    }

    #[test]
    fn test_serde_is_tagged() {
        let json = serde_json::to_value(inputs_from("data.json")).unwrap();
        assert_eq!(json, json!({"kind": "files", "paths": ["data.json"]}));
    }
}
