//! Structured-prompting collaborators
//!
//! Default implementations of the pieces an evaluation delegates to:
//! prompt [`Template`]s, output [`Schema`]s and [`SchemaFn`]s, the
//! object-literal codec, and prompt assembly for the query and completion
//! protocols.

mod literal;
mod prompting;
mod schema;
mod template;

pub use literal::{format_value, parse_literal, TYPE_KEY};
pub use prompting::{completion_prompt, completion_schema, query_prompt};
pub use schema::{MappingExample, ObjectSchema, Schema, SchemaBundle, SchemaFn, SchemaFnSpec, MISSING};
pub use template::{lookup, Template};
