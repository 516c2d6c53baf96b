//! Summary selection, directory scans and monitoring

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use trueno_eval::eval::{
    as_inputs, monitor, monitor_async, DefaultHooks, Evaluation, Method, MonitorOptions, Registry, RunOptions,
    Selector, Suite, Summary, Task, Workspace,
};
use trueno_eval::lm::{LmRef, StaticResponse, StaticSequence};
use trueno_eval::space::Param;
use trueno_eval::structured::{MappingExample, Schema, SchemaBundle, SchemaFn, Template};

fn solution() -> Schema {
    Schema::object("Solution", [("final_answer", Schema::Int)])
}

fn answer_schema() -> SchemaFn {
    SchemaFn::constant("answer_schema", solution())
}

fn answer_schema_with_fewshot() -> SchemaFn {
    SchemaFn::new("answer_schema_with_fewshot", |_| {
        Ok(SchemaBundle::from(solution()).with_examples(vec![MappingExample::new(
            "Compute 1 + 2",
            json!({"_type": "Solution", "final_answer": 3}),
        )]))
    })
}

fn sequence_lm() -> LmRef {
    LmRef::new(StaticSequence::new(["3"]))
}

fn static_lm() -> LmRef {
    LmRef::new(StaticResponse::new("2"))
}

fn methods() -> Param<Method> {
    Param::one_of([Method::Query, Method::Call])
}

fn lms() -> Param<LmRef> {
    Param::one_of([sequence_lm(), static_lm()])
}

/// 2 methods × 2 prompts × 2 schema functions × 2 LMs, plus
/// 2 methods × 1 prompt × 1 schema function × 2 LMs.
fn experiments(root: &Path) -> Suite {
    let task_a = Evaluation::builder("task_a")
        .task(Task::new("TaskA", DefaultHooks))
        .inputs(as_inputs(vec![json!({"question": "Compute 1 + 1"})]))
        .method(methods())
        .prompt(Param::one_of([
            Template::new("{{example.question}}"),
            Template::new("Hello {{example.question}}"),
        ]))
        .schema_fn(Param::one_of([answer_schema(), answer_schema_with_fewshot()]))
        .lm(lms())
        .build()
        .unwrap();
    let task_b = Evaluation::builder("task_b")
        .task(Task::new("TaskB", DefaultHooks))
        .inputs(as_inputs(vec![json!({"question": "Compute 1 + 1"})]))
        .method(methods())
        .prompt(Param::one_of([Template::new("{{example.question}}")]))
        .schema_fn(Param::one_of([answer_schema()]))
        .lm(lms())
        .build()
        .unwrap();
    Suite::new("my_suite", [task_a, task_b]).with_root_dir(root)
}

/// Filesystem workspace able to reload the experiments above.
fn workspace() -> Workspace {
    Workspace::filesystem().with_registry(
        Registry::new()
            .with_schema_fn(answer_schema())
            .with_schema_fn(answer_schema_with_fewshot())
            .with_task(Task::new("TaskA", DefaultHooks))
            .with_task(Task::new("TaskB", DefaultHooks)),
    )
}

fn count(summary: &Summary, selector: Selector) -> usize {
    summary.select(&selector).unwrap().len()
}

#[test]
fn test_select() {
    let tmp = TempDir::new().unwrap();
    let node = Workspace::filesystem().materialize(experiments(tmp.path())).unwrap();
    let summary = Summary::new(&node);

    assert_eq!(summary.len(), 20);
    assert_eq!(count(&summary, Selector::new()), 20);
    assert_eq!(count(&summary, Selector::new().task("TaskA")), 16);
    assert_eq!(count(&summary, Selector::new().task("TaskB")), 4);
    assert_eq!(count(&summary, Selector::new().lm_kind("StaticResponse")), 10);
    assert_eq!(count(&summary, Selector::new().lm(&sequence_lm())), 10);
    assert_eq!(count(&summary, Selector::new().lm_kinds(["StaticResponse", "StaticSequence"])), 20);
    assert_eq!(count(&summary, Selector::new().method(Method::Call)), 10);
    assert_eq!(count(&summary, Selector::new().methods([Method::Query, Method::Call])), 20);
    assert_eq!(count(&summary, Selector::new().schema_fn(&answer_schema())), 12);
    assert_eq!(count(&summary, Selector::new().schema_fn(&answer_schema_with_fewshot())), 8);
    assert_eq!(
        count(
            &summary,
            Selector::new().schema_fns([&answer_schema(), &answer_schema_with_fewshot()])
        ),
        20
    );
    assert_eq!(count(&summary, Selector::new().completed(true)), 0);
    assert_eq!(count(&summary, Selector::new().completed(false)), 20);
    assert_eq!(
        count(&summary, Selector::new().task("TaskA").method(Method::Call).lm_kind("StaticResponse")),
        4
    );
    // Selection never shrinks the source.
    assert_eq!(summary.len(), 20);
}

#[test]
fn test_from_dirs() {
    let tmp = TempDir::new().unwrap();
    let ws = workspace();
    let node = ws.materialize(experiments(tmp.path())).unwrap();
    node.run(&RunOptions::default().show_progress(false)).unwrap();

    let all = Summary::from_dirs(&ws, tmp.path(), None).unwrap();
    assert_eq!(all.len(), 20);
    assert!(all.nodes().iter().all(|n| n.result().is_some()));
    assert_eq!(count(&all, Selector::new().completed(true)), 20);
    assert_eq!(count(&all, Selector::new().task("TaskA")), 16);

    assert_eq!(Summary::from_dirs(&ws, tmp.path(), Some(&["task_b"][..])).unwrap().len(), 4);
    assert_eq!(Summary::from_dirs(&ws, tmp.path(), Some(&["task_a"][..])).unwrap().len(), 16);
    assert!(Summary::from_dirs(&ws, &tmp.path().join("missing"), None).unwrap().is_empty());

    let html = all.render_html();
    assert!(html.contains("task_a@"));
    assert!(!html.contains("pending"));
}

#[test]
fn test_monitor() {
    let tmp = TempDir::new().unwrap();
    let ws = workspace();
    let node = ws.materialize(experiments(tmp.path())).unwrap();
    node.run(&RunOptions::default().summary(false)).unwrap();
    assert!(!tmp.path().join("summary.html").exists());

    let report = tmp.path().join("my_summary.html");
    let summary = monitor(&ws, tmp.path(), &report).unwrap();
    assert_eq!(summary.len(), 20);
    assert!(summary.nodes().iter().all(|n| n.result().is_some()));
    assert!(report.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_monitor_async() {
    let tmp = TempDir::new().unwrap();
    let ws = workspace();
    let report = tmp.path().join("my_summary.html");
    let handle = monitor_async(
        &ws,
        tmp.path(),
        &report,
        MonitorOptions::default()
            .interval(Duration::from_millis(20))
            .expect_new_dirs(true),
    );

    let node = ws.materialize(experiments(tmp.path())).unwrap();
    tokio::task::spawn_blocking(move || node.run(&RunOptions::default().summary(false)))
        .await
        .unwrap()
        .unwrap();

    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.len(), 20);
    assert!(summary.nodes().iter().all(|n| n.result().is_some()));
    assert!(report.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_monitor_async_refreshes_known_dirs() {
    let tmp = TempDir::new().unwrap();
    let ws = workspace();
    let node = ws.materialize(experiments(tmp.path())).unwrap();
    // Persist definitions only; results come later.
    node.run(&RunOptions::default().summary(false)).unwrap();
    for leaf in node.leaves() {
        let dir = leaf.dir().unwrap();
        std::fs::remove_file(dir.join("result.json")).unwrap();
    }

    let report = tmp.path().join("my_summary.html");
    let handle = monitor_async(&ws, tmp.path(), &report, MonitorOptions::default().interval(Duration::from_millis(20)));
    let mut waited = Duration::ZERO;
    while !report.exists() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert!(std::fs::read_to_string(&report).unwrap().contains("pending"));

    let rerun = ws.materialize(experiments(tmp.path())).unwrap();
    tokio::task::spawn_blocking(move || rerun.run(&RunOptions::default().summary(false)))
        .await
        .unwrap()
        .unwrap();

    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.len(), 20);
    assert!(summary.nodes().iter().all(|n| n.result().is_some()));
}
