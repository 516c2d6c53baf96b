//! Experiment trees: definition, expansion, execution and reporting
//!
//! - [`Evaluation`] / [`Suite`]: experiment definitions ([`Experiment`])
//! - [`Node`]: a materialized tree; [`Node::run`] executes it
//! - [`LmCache`]: per-node response cache shared by the workers of one run
//! - [`Workspace`]: persistence backend + [`Registry`] for reloading
//! - [`Summary`] / [`Selector`]: flattened leaf view and queries
//! - [`monitor`] / [`monitor_async`]: summary report rendering
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trueno_eval::eval::{as_inputs, Evaluation, Method, RunOptions, Workspace};
//! use trueno_eval::lm::{LmRef, StaticResponse};
//! use trueno_eval::structured::{Schema, SchemaFn, Template};
//!
//! let evaluation = Evaluation::builder("arith")
//!     .inputs(as_inputs(vec![json!({"question": "1 + 1"})]))
//!     .method(Method::Query)
//!     .prompt(Template::new("{{example.question}}"))
//!     .schema_fn(SchemaFn::constant(
//!         "answer_schema",
//!         Schema::object("Solution", [("final_answer", Schema::Int)]),
//!     ))
//!     .lm(LmRef::new(StaticResponse::new("Solution(final_answer=2)")))
//!     .build()?;
//!
//! let node = Workspace::in_memory().materialize(evaluation)?;
//! let result = node.run(&RunOptions::default())?.expect("not filtered");
//! assert_eq!(result.as_leaf().map(|r| r.metrics.failures), Some(0));
//! # Ok::<(), trueno_eval::Error>(())
//! ```

pub mod cache;
pub mod evaluation;
pub mod inputs;
pub mod matching;
pub mod monitor;
pub mod node;
pub mod registry;
pub mod report;
pub mod result;
pub mod scheduler;
pub mod suite;
pub mod summary;
pub mod task;
pub mod workspace;

pub use cache::LmCache;
pub use evaluation::{Evaluation, EvaluationBuilder, EvaluationDefinition, Method, ResolvedSchema};
pub use inputs::{as_inputs, inputs_from, inputs_from_files, InputSource};
pub use matching::{MatchAudit, MatchRecord, MatchSpec};
pub use monitor::{monitor, monitor_async, MonitorHandle, MonitorOptions};
pub use node::{Node, NodeFilter, RunOptions};
pub use registry::{LmFactory, Registry};
pub use result::{CacheStats, EvaluationResult, ExperimentSetup, Metrics, Outcome, ResultTree};
pub use suite::{Experiment, Suite};
pub use summary::{LmSelector, Selector, Summary};
pub use task::{DefaultHooks, Task, TaskHooks, DEFAULT_TASK};
pub use workspace::Workspace;
