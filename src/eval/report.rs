//! HTML reports
//!
//! Plain, self-contained pages: `index.html` and `failures.html` per leaf,
//! `matches.html` / `mismatches.html` for matching evaluations, and the
//! root-level summary page.

use std::path::PathBuf;

use chrono::Utc;

use super::matching::MatchRecord;
use super::result::{EvaluationResult, Outcome};
use crate::structured::format_value;

/// File names of persisted artifacts.
pub mod files {
    /// Evaluation definition
    pub const EXPERIMENT_JSON: &str = "experiment.json";
    /// Leaf result record
    pub const RESULT_JSON: &str = "result.json";
    /// LM cache
    pub const CACHE_JSON: &str = "cache.json";
    /// Per-example outcomes
    pub const INDEX_HTML: &str = "index.html";
    /// Failed examples
    pub const FAILURES_HTML: &str = "failures.html";
    /// Matched examples (matching evaluations)
    pub const MATCHES_JSON: &str = "matches.json";
    /// Mismatched examples (matching evaluations)
    pub const MISMATCHES_JSON: &str = "mismatches.json";
    /// Matched examples page
    pub const MATCHES_HTML: &str = "matches.html";
    /// Mismatched examples page
    pub const MISMATCHES_HTML: &str = "mismatches.html";
    /// Root-level summary page
    pub const SUMMARY_HTML: &str = "summary.html";
}

/// Escape text for HTML element content and attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>Generated at {now}</p>{body}</body></html>",
        title = escape(title),
        now = Utc::now().to_rfc3339(),
    )
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn render_result(result: &EvaluationResult) -> String {
    let setup = &result.experiment_setup;
    let stats = &result.cache_stats;
    let m = &result.metrics;
    let mut header = String::from(
        "<tr><th>Model</th><th>Method</th><th>Prompt</th><th>Schema</th>\
         <th>Cache (hits/queries)</th><th>Failures</th>",
    );
    let mut row = format!(
        "<tr><td>{model}</td><td>{method}</td><td><pre>{prompt}</pre></td><td>{schema}</td>\
         <td>{hits}/{queries}</td><td>{rate} ({failures}/{total})</td>",
        model = escape(&setup.model),
        method = setup.method,
        prompt = escape(&setup.prompt_template),
        schema = escape(setup.schema_fn.as_deref().unwrap_or("")),
        hits = stats.num_hits,
        queries = stats.num_queries,
        rate = percent(m.failure_rate),
        failures = m.failures,
        total = m.total,
    );
    if let (Some(matches), Some(match_rate), Some(mismatches), Some(mismatch_rate)) =
        (m.num_matches, m.match_rate, m.num_mismatches, m.mismatch_rate)
    {
        header.push_str("<th>Matches</th><th>Mismatches</th>");
        row.push_str(&format!(
            "<td><a href=\"matches.html\">{}</a> ({matches}/{total})</td>\
             <td><a href=\"mismatches.html\">{}</a> ({mismatches}/{total})</td>",
            percent(match_rate),
            percent(mismatch_rate),
            total = m.total,
        ));
    }
    format!("<table border=\"1\">{header}</tr>{row}</tr></table>")
}

fn render_outcomes<'a>(outcomes: impl Iterator<Item = &'a Outcome>) -> String {
    let mut rows = String::new();
    for (i, o) in outcomes.enumerate() {
        let status = o.error.as_deref().map_or_else(
            || "OK".to_string(),
            |e| format!("<span style=\"color:red\">{}</span>", escape(e)),
        );
        rows.push_str(&format!(
            "<tr><td>{i}</td><td><pre>{example}</pre></td><td><pre>{input}</pre></td>\
             <td><pre>{response}</pre></td><td><pre>{result}</pre></td><td>{cached}</td><td>{status}</td></tr>",
            example = escape(&format_value(&o.example)),
            input = escape(o.lm_input.as_deref().unwrap_or("")),
            response = escape(o.response.as_deref().unwrap_or("")),
            result = escape(&o.result.as_ref().map(format_value).unwrap_or_default()),
            cached = if o.cache_hit { "hit" } else { "" },
        ));
    }
    format!(
        "<table border=\"1\"><tr><th>#</th><th>Example</th><th>LM input</th>\
         <th>Response</th><th>Result</th><th>Cache</th><th>Status</th></tr>{rows}</table>"
    )
}

/// `index.html`: every outcome.
#[must_use]
pub fn render_index(result: &EvaluationResult, outcomes: &[Outcome]) -> String {
    let body = format!(
        "{}<p><a href=\"failures.html\">Failures</a></p>{}",
        render_result(result),
        render_outcomes(outcomes.iter())
    );
    page(&result.experiment_setup.id, &body)
}

/// `failures.html`: failed outcomes only.
#[must_use]
pub fn render_failures(result: &EvaluationResult, outcomes: &[Outcome]) -> String {
    let body = format!(
        "{}<p><a href=\"index.html\">All examples</a></p>{}",
        render_result(result),
        render_outcomes(outcomes.iter().filter(|o| o.is_failure()))
    );
    page(&format!("{} failures", result.experiment_setup.id), &body)
}

/// `matches.html` / `mismatches.html`.
#[must_use]
pub fn render_match_records(result: &EvaluationResult, kind: &str, records: &[MatchRecord]) -> String {
    let mut rows = String::new();
    for (i, r) in records.iter().enumerate() {
        rows.push_str(&format!(
            "<tr><td>{i}</td><td><pre>{}</pre></td><td><pre>{}</pre></td></tr>",
            escape(&format_value(&r.input)),
            escape(&format_value(&r.output)),
        ));
    }
    let body = format!(
        "{}<table border=\"1\"><tr><th>#</th><th>Input</th><th>Output</th></tr>{rows}</table>",
        render_result(result)
    );
    page(&format!("{} {kind}", result.experiment_setup.id), &body)
}

/// One line of the summary page.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    /// Node id
    pub id: String,
    /// Persistence directory
    pub dir: Option<PathBuf>,
    /// Task type
    pub task: String,
    /// Result, when the node has completed
    pub result: Option<EvaluationResult>,
}

/// Root-level summary page over all leaves.
#[must_use]
pub fn render_summary(title: &str, rows: &[SummaryRow]) -> String {
    let mut body = String::from(
        "<table border=\"1\"><tr><th>Id</th><th>Task</th><th>Model</th><th>Method</th>\
         <th>Schema</th><th>Total</th><th>Failures</th><th>Matches</th></tr>",
    );
    for row in rows {
        let link = row.dir.as_ref().map_or_else(
            || escape(&row.id),
            |dir| {
                format!(
                    "<a href=\"{}\">{}</a>",
                    escape(&dir.join(files::INDEX_HTML).display().to_string()),
                    escape(&row.id)
                )
            },
        );
        let cells = row.result.as_ref().map_or_else(
            || "<td colspan=\"5\">pending</td>".to_string(),
            |r| {
                let m = &r.metrics;
                format!(
                    "<td>{model}</td><td>{method}</td><td>{schema}</td><td>{total}</td>\
                     <td>{failures}</td><td>{matches}</td>",
                    model = escape(&r.experiment_setup.model),
                    method = r.experiment_setup.method,
                    schema = escape(r.experiment_setup.schema_fn.as_deref().unwrap_or("")),
                    total = m.total,
                    failures = percent(m.failure_rate),
                    matches = m.match_rate.map(percent).unwrap_or_default(),
                )
            },
        );
        body.push_str(&format!(
            "<tr><td>{link}</td><td>{task}</td>{cells}</tr>",
            task = escape(&row.task)
        ));
    }
    body.push_str("</table>");
    page(title, &body)
}
