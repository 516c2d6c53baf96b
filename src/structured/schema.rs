//! Output schemas and schema functions
//!
//! A [`Schema`] describes the structure an LM response must parse into. A
//! [`SchemaFn`] is a named, argument-carrying recipe that produces a schema
//! (plus optional few-shot [`MappingExample`]s). Schema functions are
//! persisted by name and arguments; their identity additionally covers the
//! schema and examples they resolve to. Arguments may hold `_oneof`
//! choices, expanded by [`SchemaFn::expand`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::literal::{parse_literal, write_value, TYPE_KEY};
use crate::space::{expand_value, value_has_choices};
use crate::{Error, Result};

/// Structure an LM response must conform to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// Integer
    Int,
    /// Floating point (integers accepted)
    Float,
    /// String
    Str,
    /// Boolean
    Bool,
    /// Homogeneous list
    List(Box<Schema>),
    /// Named structure with ordered fields
    Object(ObjectSchema),
    /// Anything
    Any,
}

/// Named structure with ordered fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSchema {
    /// Structure name (the constructor in object-literal notation)
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<(String, Schema)>,
}

impl Schema {
    /// Build an object schema.
    #[must_use]
    pub fn object<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Self)>,
        S: Into<String>,
    {
        Self::Object(ObjectSchema {
            name: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    /// Build a list schema.
    #[must_use]
    pub fn list(item: Self) -> Self {
        Self::List(Box::new(item))
    }

    /// The object schema, if this is one.
    #[must_use]
    pub const fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Type annotation shown to the LM, e.g. `Solution(final_answer: int)`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Str => "str".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Any => "Any".to_string(),
            Self::List(item) => format!("list[{}]", item.describe()),
            Self::Object(obj) => {
                let fields: Vec<String> = obj
                    .fields
                    .iter()
                    .map(|(name, ty)| format!("{name}: {}", ty.describe()))
                    .collect();
                format!("{}({})", obj.name, fields.join(", "))
            }
        }
    }

    /// Check that `value` conforms to this schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] naming the first mismatch.
    pub fn validate(&self, value: &Value) -> Result<()> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<()> {
        let ok = match (self, value) {
            (Self::Any, _) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(_))
            | (Self::Str, Value::String(_))
            | (Self::Bool, Value::Bool(_)) => true,
            (Self::List(item), Value::Array(items)) => {
                for (i, v) in items.iter().enumerate() {
                    item.validate_at(v, &format!("{path}[{i}]"))?;
                }
                true
            }
            (Self::Object(obj), Value::Object(map)) => {
                obj.validate_fields(map, path)?;
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::parse(format!(
                "{path}: expected {}, got {value}",
                self.describe()
            )))
        }
    }

    /// Parse an LM response and validate it against this schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the text is not a literal or does not
    /// conform.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let value = parse_literal(text)?;
        self.validate(&value)?;
        Ok(value)
    }

    /// Format a conforming value in object-literal notation, with object
    /// fields in schema order.
    #[must_use]
    pub fn format(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write(&mut out, value);
        out
    }

    fn write(&self, out: &mut String, value: &Value) {
        match (self, value) {
            (Self::Object(obj), Value::Object(map)) => {
                out.push_str(&obj.name);
                out.push('(');
                let present = obj
                    .fields
                    .iter()
                    .filter_map(|(name, ty)| map.get(name).map(|v| (name, ty, v)));
                for (i, (name, ty, v)) in present.enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push('=');
                    ty.write(out, v);
                }
                out.push(')');
            }
            (Self::List(item), Value::Array(items)) => {
                out.push('[');
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write(out, v);
                }
                out.push(']');
            }
            _ => write_value(out, value),
        }
    }
}

impl ObjectSchema {
    /// Schema of a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Schema> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    fn validate_fields(&self, map: &Map<String, Value>, path: &str) -> Result<()> {
        if let Some(ty) = map.get(TYPE_KEY) {
            if ty.as_str() != Some(self.name.as_str()) {
                return Err(Error::parse(format!(
                    "{path}: expected {}, got {ty}",
                    self.name
                )));
            }
        }
        for (name, schema) in &self.fields {
            let value = map
                .get(name)
                .ok_or_else(|| Error::parse(format!("{path}: missing field '{name}'")))?;
            schema.validate_at(value, &format!("{path}.{name}"))?;
        }
        if let Some(extra) = map
            .keys()
            .find(|k| k.as_str() != TYPE_KEY && self.field(k).is_none())
        {
            return Err(Error::parse(format!("{path}: unexpected field '{extra}'")));
        }
        Ok(())
    }

    /// Render a partially filled object; absent fields show as `MISSING`.
    #[must_use]
    pub fn format_partial(&self, values: &Map<String, Value>) -> String {
        let mut out = String::new();
        out.push_str(&self.name);
        out.push('(');
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push('=');
            match values.get(name) {
                Some(v) => ty.write(&mut out, v),
                None => out.push_str(MISSING),
            }
        }
        out.push(')');
        out
    }
}

/// A worked example shown to the LM before the actual request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingExample {
    /// Natural-language request (or completion context)
    pub request: String,
    /// Expected structured value
    pub value: Value,
}

impl MappingExample {
    /// Create an example.
    #[must_use]
    pub fn new(request: impl Into<String>, value: Value) -> Self {
        Self {
            request: request.into(),
            value,
        }
    }
}

/// Output of a schema function: the schema and optional few-shot examples.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaBundle {
    /// Schema the response must conform to
    pub schema: Schema,
    /// Few-shot examples, possibly empty
    pub examples: Vec<MappingExample>,
}

impl SchemaBundle {
    /// Attach few-shot examples.
    #[must_use]
    pub fn with_examples(mut self, examples: Vec<MappingExample>) -> Self {
        self.examples = examples;
        self
    }
}

impl From<Schema> for SchemaBundle {
    fn from(schema: Schema) -> Self {
        Self {
            schema,
            examples: Vec::new(),
        }
    }
}

/// Serializable identity of a schema function: name plus bound arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFnSpec {
    /// Function name
    pub name: String,
    /// Bound arguments (a JSON object; empty when none)
    #[serde(default, skip_serializing_if = "is_empty_args")]
    pub args: Value,
}

fn is_empty_args(args: &Value) -> bool {
    match args {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Placeholder for an unfilled field in a partial object.
pub const MISSING: &str = "MISSING";

type BuildFn = dyn Fn(&Value) -> Result<SchemaBundle> + Send + Sync;

/// A named schema recipe, evaluated lazily at run time.
#[derive(Clone)]
pub struct SchemaFn {
    spec: SchemaFnSpec,
    build: Arc<BuildFn>,
}

impl SchemaFn {
    /// Create a schema function without arguments.
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Value) -> Result<SchemaBundle> + Send + Sync + 'static,
    {
        Self {
            spec: SchemaFnSpec {
                name: name.into(),
                args: Value::Object(Map::new()),
            },
            build: Arc::new(build),
        }
    }

    /// Schema function that always yields `schema`.
    #[must_use]
    pub fn constant(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, move |_| Ok(schema.clone().into()))
    }

    /// Bind arguments (a JSON object passed to the builder).
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.spec.args = args;
        self
    }

    /// Serializable identity.
    #[must_use]
    pub const fn spec(&self) -> &SchemaFnSpec {
        &self.spec
    }

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Evaluate the function.
    ///
    /// # Errors
    ///
    /// Propagates the builder's error, and returns [`Error::Config`] while
    /// the arguments still hold choices.
    pub fn resolve(&self) -> Result<SchemaBundle> {
        if self.has_choices() {
            return Err(Error::config(format!("schema function '{self}' has unexpanded choices")));
        }
        (self.build)(&self.spec.args)
    }

    /// Whether the arguments hold choices.
    #[must_use]
    pub fn has_choices(&self) -> bool {
        value_has_choices(&self.spec.args)
    }

    /// One function per concrete argument set; empty if a choice is empty.
    #[must_use]
    pub fn expand(&self) -> Vec<Self> {
        if !self.has_choices() {
            return vec![self.clone()];
        }
        expand_value(&self.spec.args)
            .into_iter()
            .map(|args| self.clone().with_args(args))
            .collect()
    }

    /// Identity value: name and arguments, plus the resolved schema and
    /// examples once the arguments are concrete.
    ///
    /// # Errors
    ///
    /// Propagates the builder's error.
    pub fn identity(&self) -> Result<Value> {
        let mut identity = Map::new();
        identity.insert("name".to_string(), Value::String(self.spec.name.clone()));
        if !is_empty_args(&self.spec.args) {
            identity.insert("args".to_string(), self.spec.args.clone());
        }
        if !self.has_choices() {
            let bundle = self.resolve()?;
            identity.insert("schema".to_string(), Value::String(bundle.schema.describe()));
            identity.insert("examples".to_string(), serde_json::to_value(&bundle.examples)?);
        }
        Ok(Value::Object(identity))
    }
}

impl fmt::Display for SchemaFn {
    /// Call notation, e.g. `answer_schema()` or `fewshot(k=2)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.spec.name)?;
        if let Value::Object(args) = &self.spec.args {
            for (i, (k, v)) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let mut rendered = String::new();
                write_value(&mut rendered, v);
                write!(f, "{k}={rendered}")?;
            }
        }
        write!(f, ")")
    }
}

impl fmt::Debug for SchemaFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaFn").field("spec", &self.spec).finish()
    }
}

impl PartialEq for SchemaFn {
    /// Same name and arguments, resolving to the same schema and examples.
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
            && (self.has_choices() || self.resolve().ok() == other.resolve().ok())
    }
}
