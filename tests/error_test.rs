//! Tests for error types and configuration validation

use std::io::Write;
use std::path::Path;

use serde_json::json;
use tempfile::{NamedTempFile, TempDir};
use trueno_eval::eval::report::files;
use trueno_eval::eval::{as_inputs, inputs_from, Evaluation, Method, Workspace};
use trueno_eval::lm::{LmRef, StaticResponse};
use trueno_eval::space::Param;
use trueno_eval::structured::{Schema, SchemaFn, Template};
use trueno_eval::Error;

fn base() -> trueno_eval::eval::EvaluationBuilder {
    Evaluation::builder("e")
        .inputs(as_inputs(vec![json!({"q": 1})]))
        .method(Method::Call)
        .prompt(Template::new("{{example.q}}"))
        .lm(LmRef::new(StaticResponse::new("ok")))
}

fn config_message(result: trueno_eval::Result<Evaluation>) -> String {
    match result {
        Err(Error::Config(message)) => message,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_error_display() {
    assert_eq!(Error::config("bad").to_string(), "Configuration error: bad");
    assert_eq!(Error::schema("shape").to_string(), "Schema error: shape");
    assert_eq!(Error::parse("tokens").to_string(), "Parse error: tokens");
    assert_eq!(Error::Pool("threads".into()).to_string(), "Worker pool error: threads");
    assert_eq!(Error::Monitor("join".into()).to_string(), "Monitor error: join");

    let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
    assert!(io.to_string().starts_with("IO error"));
    let json = Error::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
    assert!(json.to_string().starts_with("JSON error"));
}

#[test]
fn test_valid_base_builds() {
    assert!(base().build().is_ok());
}

#[test]
fn test_empty_id() {
    assert!(config_message(base().id("  ").build()).contains("id"));
}

#[test]
fn test_missing_prompt_and_lm() {
    let no_prompt = Evaluation::builder("e").lm(LmRef::new(StaticResponse::new("ok")));
    assert!(config_message(no_prompt.build()).contains("prompt"));
    let no_lm = Evaluation::builder("e").prompt(Template::new("x"));
    assert!(config_message(no_lm.build()).contains("lm"));
}

#[test]
fn test_zero_workers() {
    assert!(config_message(base().max_workers(0).build()).contains("max_workers"));
}

#[test]
fn test_query_requires_schema() {
    let message = config_message(base().method(Param::one_of([Method::Call, Method::Query])).build());
    assert!(message.contains("requires a schema_fn"));
}

#[test]
fn test_complete_requires_field() {
    let builder = base()
        .method(Method::Complete)
        .schema_fn(SchemaFn::constant("s", Schema::object("S", [("a", Schema::Int)])));
    assert!(config_message(builder.build()).contains("completion_prompt_field"));
}

#[test]
fn test_empty_choice() {
    let builder = base().prompt(Param::<Template>::one_of(Vec::<Template>::new()));
    assert!(config_message(builder.build()).contains("empty choice"));
}

#[test]
fn test_missing_input_file() {
    let tmp = TempDir::new().unwrap();
    let source = inputs_from(tmp.path().join("absent.json"));
    assert!(matches!(source.load(), Err(Error::Io(_))));
}

#[test]
fn test_input_file_must_hold_array() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{\"q\": 1}}").unwrap();
    assert!(matches!(inputs_from(file.path()).load(), Err(Error::Config(_))));

    let mut broken = NamedTempFile::new().unwrap();
    write!(broken, "[1, 2").unwrap();
    assert!(matches!(inputs_from(broken.path()).load(), Err(Error::Json(_))));
}

#[test]
fn test_load_unknown_lm_kind() {
    let ws = Workspace::in_memory();
    let definition = json!({
        "_type": "Evaluation",
        "id": "e",
        "inputs": {"kind": "values", "values": []},
        "method": "call",
        "prompt": "{{example.q}}",
        "lm": {"kind": "Mystery", "config": {}},
        "use_cache": true,
        "max_workers": 1
    });
    let dir = Path::new("/root/e");
    ws.store()
        .write(&dir.join(files::EXPERIMENT_JSON), definition.to_string().as_bytes())
        .unwrap();
    match ws.load(dir) {
        Err(Error::Config(message)) => assert!(message.contains("Mystery")),
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_load_unregistered_schema_fn() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::filesystem();
    let evaluation = base()
        .root_dir(tmp.path())
        .method(Method::Query)
        .schema_fn(SchemaFn::constant("custom", Schema::Int))
        .build()
        .unwrap();
    let node = ws.materialize(evaluation).unwrap();
    node.run(&trueno_eval::eval::RunOptions::default()).unwrap();

    let err = ws.load(&tmp.path().join("e")).unwrap_err();
    assert!(err.to_string().contains("unknown schema function 'custom'"));
}
