//! Prompt assembly for structured LM protocols
//!
//! - **query**: natural-language request in, structured value out. The
//!   prompt shows the output type and few-shot examples, then the request.
//! - **complete**: a partially filled object in, the filled object out. The
//!   request occupies a designated string field of the output structure.
//!
//! The free-form **call** protocol needs no assembly: the rendered template is
//! sent as is.

use serde_json::{Map, Value};

use super::schema::{MappingExample, ObjectSchema, Schema};
use crate::{Error, Result};

const QUERY_PREAMBLE: &str =
    "Please respond to the last INPUT with OUTPUT according to OUTPUT_TYPE.";
const COMPLETE_PREAMBLE: &str =
    "Please generate the OUTPUT_OBJECT by completing the MISSING fields from the last INPUT_OBJECT.";

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the prompt for the query protocol.
#[must_use]
pub fn query_prompt(request: &str, schema: &Schema, examples: &[MappingExample]) -> String {
    let output_type = indent(&schema.describe());
    let mut prompt = String::from(QUERY_PREAMBLE);
    for example in examples {
        prompt.push_str(&format!(
            "\n\nINPUT:\n{}\n\nOUTPUT_TYPE:\n{output_type}\n\nOUTPUT:\n{}",
            indent(&example.request),
            indent(&schema.format(&example.value)),
        ));
    }
    prompt.push_str(&format!(
        "\n\nINPUT:\n{}\n\nOUTPUT_TYPE:\n{output_type}\n\nOUTPUT:\n",
        indent(request)
    ));
    prompt
}

/// Adapt a schema for completion: it must be an object, and `field` is
/// prepended as a string field when the object does not declare it.
///
/// # Errors
///
/// Returns [`Error::Schema`] when `schema` is not an object schema.
pub fn completion_schema(schema: &Schema, field: &str) -> Result<ObjectSchema> {
    let mut obj = schema.as_object().cloned().ok_or_else(|| {
        Error::schema(format!(
            "completion requires an object schema, got {}",
            schema.describe()
        ))
    })?;
    if obj.field(field).is_none() {
        obj.fields.insert(0, (field.to_string(), Schema::Str));
    }
    Ok(obj)
}

/// Build the prompt for the completion protocol.
///
/// Few-shot examples use their request as the value of `field` unless their
/// structured value already carries it.
#[must_use]
pub fn completion_prompt(
    request: &str,
    schema: &ObjectSchema,
    field: &str,
    examples: &[MappingExample],
) -> String {
    let whole = Schema::Object(schema.clone());
    let mut prompt = String::from(COMPLETE_PREAMBLE);
    for example in examples {
        let mut filled = example.value.as_object().cloned().unwrap_or_default();
        filled
            .entry(field.to_string())
            .or_insert_with(|| Value::String(example.request.clone()));
        let input = partial(field, &example.request);
        prompt.push_str(&format!(
            "\n\nINPUT_OBJECT:\n{}\n\nOUTPUT_OBJECT:\n{}",
            indent(&schema.format_partial(&input)),
            indent(&whole.format(&Value::Object(filled))),
        ));
    }
    prompt.push_str(&format!(
        "\n\nINPUT_OBJECT:\n{}\n\nOUTPUT_OBJECT:\n",
        indent(&schema.format_partial(&partial(field, request)))
    ));
    prompt
}

fn partial(field: &str, request: &str) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert(field.to_string(), Value::String(request.to_string()));
    values
}
