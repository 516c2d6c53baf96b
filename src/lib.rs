//! # Trueno-Eval: Evaluation Harness for Structured Prompting
//!
//! **Version**: 0.1.0
//!
//! Trueno-Eval measures how well a language model, driven through a prompt
//! template and an output schema, performs on a set of input examples. It
//! organizes experiments as a tree (single evaluations, search spaces over
//! prompts/methods/schemas/models, and suites), runs leaves concurrently with
//! a per-node response cache, and persists results and reports per node.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: LM responses are cached per request fingerprint;
//!   re-runs cost no model calls
//! - **Poka-Yoke safety**: configuration is validated when an evaluation is
//!   built, before any model is called
//! - **Genchi Genbutsu**: every per-example outcome is persisted and browsable
//! - **Jidoka**: per-example failures are recorded and counted, never hidden
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use trueno_eval::eval::{as_inputs, Evaluation, Method, RunOptions, Workspace};
//! use trueno_eval::lm::{LmRef, StaticSequence};
//! use trueno_eval::space::Param;
//! use trueno_eval::structured::Template;
//!
//! // Two prompts × one model: a search space of two leaves
//! let space = Evaluation::builder("greeting")
//!     .inputs(as_inputs(vec![json!({"name": "Ada"})]))
//!     .method(Method::Call)
//!     .prompt(Param::one_of([
//!         Template::new("Hi {{example.name}}"),
//!         Template::new("Hello {{example.name}}"),
//!     ]))
//!     .lm(LmRef::new(StaticSequence::new(["hey", "hello"])))
//!     .build()?;
//!
//! let node = Workspace::in_memory().materialize(space)?;
//! assert_eq!(node.children().len(), 2);
//! let tree = node.run(&RunOptions::default())?.expect("not filtered");
//! assert_eq!(tree.leaves().len(), 2);
//! # Ok::<(), trueno_eval::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod eval;
pub mod hash;
pub mod lm;
pub mod logging;
pub mod space;
pub mod store;
pub mod structured;

pub use error::{Error, Result};
