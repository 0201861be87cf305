use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::json;

use super::*;
use crate::config::substitute_env_map;
use crate::error::{BackendError, ConstructionError, EngineError, JudgeError};
use crate::judge::{Judge, JudgeResponse};
use crate::model::{
    ComparisonStatus, Evaluation, EvaluatorConfig, MAX_QUERIES_PER_SET, Metadata, Query, QuerySet,
    RetrievedChunk, Run, RunStatus, SystemConfig,
};
use crate::system::System;

/// Deterministic fake backend. Sleeps a query-dependent amount so parallel completion order
/// differs from input order, and fails for any query listed in `failing`.
struct FakeSystem {
    failing: Vec<String>,
    empty_for: Vec<String>,
}

impl FakeSystem {
    fn healthy() -> Self {
        Self {
            failing: Vec::new(),
            empty_for: Vec::new(),
        }
    }

    fn failing_on(text: &str) -> Self {
        Self {
            failing: vec![text.to_string()],
            empty_for: Vec::new(),
        }
    }
}

impl System for FakeSystem {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError> {
        let jitter = query.bytes().map(u64::from).sum::<u64>() % 4;
        thread::sleep(Duration::from_millis(jitter));

        if self.failing.iter().any(|text| text == query) {
            return Err(BackendError::Transport(format!("connection reset for '{query}'")));
        }
        if self.empty_for.iter().any(|text| text == query) {
            return Ok(Vec::new());
        }
        Ok((0..top_k.min(2))
            .map(|rank| {
                let score = 1.0 - rank as f64 / 10.0;
                RetrievedChunk::new(format!("{query} doc {rank}"), Some(score))
            })
            .collect())
    }
}

struct PanickingSystem;

impl System for PanickingSystem {
    fn search(&self, query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError> {
        if query == "boom" {
            panic!("backend exploded");
        }
        Ok(vec![RetrievedChunk::new("fine", None)])
    }
}

struct ScriptedJudge {
    calls: AtomicUsize,
    winner: &'static str,
}

impl ScriptedJudge {
    fn picking(winner: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            winner,
        }
    }
}

impl Judge for ScriptedJudge {
    fn judge(
        &self,
        prompt: &str,
        _model: &str,
        _temperature: f64,
    ) -> Result<JudgeResponse, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scores = IndexMap::new();
        scores.insert("alpha".to_string(), 8.0);
        scores.insert("beta".to_string(), 6.0);
        Ok(JudgeResponse {
            winner: Some(self.winner.to_string()),
            scores,
            reasoning: format!("judged prompt of {} chars", prompt.len()),
            cost: Some(0.01),
        })
    }
}

struct FailingJudge {
    calls: AtomicUsize,
    succeed_after: Option<usize>,
}

impl Judge for FailingJudge {
    fn judge(
        &self,
        _prompt: &str,
        _model: &str,
        _temperature: f64,
    ) -> Result<JudgeResponse, JudgeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.succeed_after {
            Some(threshold) if call > threshold => Ok(JudgeResponse {
                winner: Some("tie".to_string()),
                scores: IndexMap::new(),
                reasoning: "recovered".to_string(),
                cost: None,
            }),
            _ => Err(JudgeError::Parse("model returned prose".to_string())),
        }
    }
}

fn system_config(name: &str) -> SystemConfig {
    SystemConfig {
        name: name.to_string(),
        tool: "fake".to_string(),
        config: json!({"top_k": 2}).as_object().cloned().unwrap_or_default(),
    }
}

fn query_set(domain: &str, texts: &[&str]) -> QuerySet {
    QuerySet::new(
        "basics",
        domain,
        texts.iter().map(|text| Query::new(*text)).collect(),
    )
    .expect("query set should build")
}

fn numbered_queries(count: usize) -> QuerySet {
    let texts = (0..count)
        .map(|index| format!("question number {index}"))
        .collect::<Vec<String>>();
    let refs = texts.iter().map(String::as_str).collect::<Vec<&str>>();
    query_set("islam", &refs)
}

fn run_with(system: &dyn System, name: &str, set: &QuerySet, concurrency: usize) -> Run {
    execute_run(
        &set.domain,
        system,
        &system_config(name),
        set,
        RunOptions {
            concurrency,
            top_k: 2,
        },
        None,
    )
    .expect("run should execute")
}

fn fast_compare(concurrency: usize, max_retries: u32) -> CompareOptions {
    CompareOptions {
        concurrency,
        retry: RetryPolicy::new(max_retries, Duration::ZERO),
    }
}

#[test]
fn results_keep_query_order_for_every_concurrency_level() {
    let set = numbered_queries(60);
    for concurrency in [1, 5, 50] {
        let run = run_with(&FakeSystem::healthy(), "alpha", &set, concurrency);
        assert_eq!(run.results.len(), set.len());
        for (result, query) in run.results.iter().zip(&set.queries) {
            assert_eq!(result.query, query.text, "concurrency {concurrency}");
        }
        assert_eq!(run.status, RunStatus::Completed);
    }
}

#[test]
fn one_failing_query_yields_partial_run_and_isolated_error() {
    let set = numbered_queries(10);
    let failing_text = set.queries[4].text.clone();
    let run = run_with(&FakeSystem::failing_on(&failing_text), "alpha", &set, 4);

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.metadata.successful, 9);
    assert_eq!(run.metadata.failed, 1);
    for (index, result) in run.results.iter().enumerate() {
        if index == 4 {
            assert!(result.error.as_deref().unwrap_or_default().contains("connection reset"));
            assert!(result.retrieved.is_empty());
        } else {
            assert!(result.error.is_none(), "query {index} should succeed");
        }
    }
}

#[test]
fn every_query_failing_marks_run_failed() {
    let set = query_set("islam", &["only question"]);
    let run = run_with(&FakeSystem::failing_on("only question"), "alpha", &set, 1);
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.results.len(), 1);
}

#[test]
fn panicking_backend_is_captured_as_query_error() {
    let set = query_set("islam", &["calm", "boom", "steady"]);
    let run = run_with(&PanickingSystem, "alpha", &set, 3);
    assert_eq!(run.status, RunStatus::Partial);
    assert!(run.results[1].error.as_deref().unwrap_or_default().contains("backend exploded"));
    assert!(run.results[0].error.is_none());
    assert!(run.results[2].error.is_none());
}

#[test]
fn snapshots_do_not_follow_later_config_edits() {
    let mut config = system_config("alpha");
    let mut set = query_set("islam", &["What is zakat?"]);
    let original_config = config.clone();
    let original_set = set.clone();

    let run = execute_run(
        "islam",
        &FakeSystem::healthy(),
        &config,
        &set,
        RunOptions::default(),
        None,
    )
    .expect("run should execute");

    config.config.insert("top_k".to_string(), json!(50));
    config.tool = "edited".to_string();
    set.queries.push(Query::new("What is tawhid?"));
    set.queries[0].text = "edited".to_string();

    assert_eq!(run.system_config_snapshot, original_config);
    assert_eq!(run.query_set_snapshot, original_set);
    assert!(verify_run_snapshot(&run).expect("checksum should compute"));
}

#[test]
fn tampered_snapshot_fails_verification() {
    let set = query_set("islam", &["What is zakat?"]);
    let mut run = run_with(&FakeSystem::healthy(), "alpha", &set, 1);
    run.system_config_snapshot.tool = "something-else".to_string();
    assert!(!verify_run_snapshot(&run).expect("checksum should compute"));
}

#[test]
fn results_do_not_depend_on_concurrency() {
    let set = numbered_queries(40);
    let strip = |run: Run| {
        run.results
            .into_iter()
            .map(|result| (result.query, result.retrieved, result.reference, result.error))
            .collect::<Vec<_>>()
    };
    let sequential = strip(run_with(&FakeSystem::healthy(), "alpha", &set, 1));
    let parallel = strip(run_with(&FakeSystem::healthy(), "alpha", &set, 20));
    assert_eq!(sequential, parallel);
}

#[test]
fn empty_chunk_list_is_a_successful_result() {
    let set = query_set("islam", &["What is zakat?", "What is tawhid?"]);
    let system = FakeSystem {
        failing: Vec::new(),
        empty_for: vec!["What is tawhid?".to_string()],
    };
    let run = run_with(&system, "alpha", &set, 2);

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.results[0].retrieved[0].content, "What is zakat? doc 0");
    assert!(run.results[1].retrieved.is_empty());
    assert!(run.results[1].error.is_none());
}

#[test]
fn invalid_arguments_are_rejected_before_execution() {
    let empty = QuerySet {
        name: "empty".to_string(),
        domain: "islam".to_string(),
        queries: Vec::new(),
    };
    let error = execute_run(
        "islam",
        &FakeSystem::healthy(),
        &system_config("alpha"),
        &empty,
        RunOptions::default(),
        None,
    )
    .expect_err("empty query set must be rejected");
    assert!(matches!(error, EngineError::InvalidArgument(_)));

    let set = query_set("islam", &["What is zakat?"]);
    let error = execute_run(
        "islam",
        &FakeSystem::healthy(),
        &system_config("alpha"),
        &set,
        RunOptions {
            concurrency: 1,
            top_k: 0,
        },
        None,
    )
    .expect_err("top_k of zero must be rejected");
    assert!(matches!(error, EngineError::InvalidArgument(_)));
}

#[test]
fn construction_failure_produces_failed_run_artifact() {
    let set = query_set("islam", &["What is zakat?", "What is tawhid?"]);
    let run = execute_configured_run(
        "islam",
        &system_config("alpha"),
        &set,
        RunOptions::default(),
        |_| Err(ConstructionError::new("system 'alpha'", "missing api key")),
        None,
    )
    .expect("construction failure is not an engine error");

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.results.is_empty());
    assert!(run.error.as_deref().unwrap_or_default().contains("missing api key"));
    assert_eq!(run.query_set_snapshot, set);
}

#[test]
fn progress_is_reported_once_per_query_with_monotonic_counts() {
    let set = numbered_queries(25);
    let failing_text = set.queries[7].text.clone();
    let mut updates = Vec::<Progress>::new();
    let mut record = |progress: Progress| updates.push(progress);

    execute_run(
        "islam",
        &FakeSystem::failing_on(&failing_text),
        &system_config("alpha"),
        &set,
        RunOptions {
            concurrency: 6,
            top_k: 2,
        },
        Some(&mut record),
    )
    .expect("run should execute");

    assert_eq!(updates.len(), 25);
    for (index, update) in updates.iter().enumerate() {
        assert_eq!(update.done, index + 1);
        assert_eq!(update.total, 25);
        assert_eq!(update.ok + update.failed, update.done);
    }
    let last = updates.last().copied().expect("at least one update");
    assert_eq!((last.ok, last.failed), (24, 1));
}

#[test]
fn end_to_end_zakat_run_completes() {
    struct ZakatSystem;
    impl System for ZakatSystem {
        fn search(&self, query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError> {
            if query == "What is zakat?" {
                Ok(vec![RetrievedChunk::new("Zakat is...", Some(0.9))])
            } else {
                Ok(Vec::new())
            }
        }
    }

    let set = query_set("islam", &["What is zakat?", "What is tawhid?"]);
    let run = run_with(&ZakatSystem, "alpha", &set, 2);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.metadata.successful, 2);
    assert_eq!(run.results[0].retrieved[0].score, Some(0.9));
}

#[test]
fn comparison_rejects_runs_from_other_domains() {
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &query_set("islam", &["q1"]), 1);
    let beta = run_with(&FakeSystem::healthy(), "beta", &query_set("finance", &["q1"]), 1);
    let judge = ScriptedJudge::picking("alpha");

    let error = compare_runs(
        "islam",
        &[alpha, beta],
        &EvaluatorConfig::default(),
        &judge,
        fast_compare(1, 0),
        None,
    )
    .expect_err("mixed domains must be rejected");
    assert!(matches!(error, EngineError::DomainMismatch { ref found, .. } if found == "finance"));
    assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn comparison_requires_two_runs() {
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &query_set("islam", &["q1"]), 1);
    let error = compare_runs(
        "islam",
        &[alpha],
        &EvaluatorConfig::default(),
        &ScriptedJudge::picking("alpha"),
        fast_compare(1, 0),
        None,
    )
    .expect_err("a single run cannot be compared");
    assert!(matches!(error, EngineError::InsufficientRuns(1)));
}

#[test]
fn comparison_only_covers_queries_shared_by_every_run() {
    let alpha_set = query_set("islam", &["q1", "q2", "q3"]);
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &alpha_set, 2);
    let beta_set = query_set("islam", &["q1", "q2", "q4"]);
    let beta = run_with(&FakeSystem::healthy(), "beta", &beta_set, 2);
    let judge = ScriptedJudge::picking("alpha");

    let comparison = compare_runs(
        "islam",
        &[alpha.clone(), beta.clone()],
        &EvaluatorConfig::default(),
        &judge,
        fast_compare(4, 0),
        None,
    )
    .expect("comparison should run");

    let queries = comparison
        .evaluations
        .iter()
        .map(|result| result.query.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(queries, vec!["q1", "q2"]);
    assert_eq!(comparison.status, ComparisonStatus::Completed);
    assert_eq!(comparison.runs, vec![alpha.id, beta.id]);
    assert_eq!(comparison.metadata.successful, 2);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);

    let first = &comparison.evaluations[0];
    assert_eq!(
        first.run_results.keys().map(String::as_str).collect::<Vec<&str>>(),
        vec!["alpha", "beta"]
    );
    assert_eq!(first.run_results["alpha"][0].content, "q1 doc 0");
}

#[test]
fn always_failing_judge_is_called_max_retries_plus_one_times_per_query() {
    let set = query_set("islam", &["q1", "q2", "q3"]);
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &set, 1);
    let beta = run_with(&FakeSystem::healthy(), "beta", &set, 1);
    let judge = FailingJudge {
        calls: AtomicUsize::new(0),
        succeed_after: None,
    };

    let comparison = compare_runs(
        "islam",
        &[alpha, beta],
        &EvaluatorConfig::default(),
        &judge,
        fast_compare(2, 2),
        None,
    )
    .expect("comparison should complete despite judge failures");

    assert_eq!(judge.calls.load(Ordering::SeqCst), 3 * 3);
    assert_eq!(comparison.metadata.failed, comparison.evaluations.len());
    assert_eq!(comparison.metadata.successful, 0);
    assert_eq!(comparison.status, ComparisonStatus::Completed);
    for result in &comparison.evaluations {
        assert!(result.evaluation.error().unwrap_or_default().contains("prose"));
    }
}

#[test]
fn flaky_judge_recovers_within_retry_budget() {
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &query_set("islam", &["q1"]), 1);
    let beta = run_with(&FakeSystem::healthy(), "beta", &query_set("islam", &["q1"]), 1);
    let judge = FailingJudge {
        calls: AtomicUsize::new(0),
        succeed_after: Some(2),
    };

    let comparison = compare_runs(
        "islam",
        &[alpha, beta],
        &EvaluatorConfig::default(),
        &judge,
        fast_compare(1, 3),
        None,
    )
    .expect("comparison should run");

    assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
    assert!(comparison.evaluations[0].evaluation.is_ok());
}

#[test]
fn judge_construction_failure_produces_failed_comparison() {
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &query_set("islam", &["q1", "q2"]), 1);
    let beta = run_with(&FakeSystem::healthy(), "beta", &query_set("islam", &["q1", "q2"]), 1);

    let comparison = compare_configured_runs(
        "islam",
        &[alpha, beta],
        &EvaluatorConfig::default(),
        |_| Err(ConstructionError::new("judge", "no api key")),
        fast_compare(1, 0),
        None,
    )
    .expect("construction failure is not an engine error");

    assert_eq!(comparison.status, ComparisonStatus::Failed);
    assert!(comparison.evaluations.is_empty());
    assert_eq!(comparison.metadata.total, 2);
    assert!(comparison.error.as_deref().unwrap_or_default().contains("no api key"));
}

#[test]
fn template_with_too_many_providers_is_rejected() {
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &query_set("islam", &["q1"]), 1);
    let beta = run_with(&FakeSystem::healthy(), "beta", &query_set("islam", &["q1"]), 1);
    let config = EvaluatorConfig {
        prompt_template: "{query} {response_1} {response_2} {response_3}".to_string(),
        ..EvaluatorConfig::default()
    };

    let error = compare_runs(
        "islam",
        &[alpha, beta],
        &config,
        &ScriptedJudge::picking("alpha"),
        fast_compare(1, 0),
        None,
    )
    .expect_err("provider_3 cannot be filled by two runs");
    assert!(matches!(error, EngineError::InvalidArgument(_)));
}

#[test]
fn repeated_system_names_get_distinct_labels() {
    let set = query_set("islam", &["q1"]);
    let first = run_with(&FakeSystem::healthy(), "alpha", &set, 1);
    let second = run_with(&FakeSystem::healthy(), "alpha", &set, 1);
    let second_label = format!("alpha@{}", second.short_id());

    let comparison = compare_runs(
        "islam",
        &[first, second],
        &EvaluatorConfig::default(),
        &ScriptedJudge::picking("tie"),
        fast_compare(1, 0),
        None,
    )
    .expect("comparison should run");

    let labels = comparison.evaluations[0]
        .run_results
        .keys()
        .cloned()
        .collect::<Vec<String>>();
    assert_eq!(labels, vec!["alpha".to_string(), second_label]);
}

#[test]
fn summary_counts_wins_ties_and_mean_scores() {
    let set = query_set("islam", &["q1", "q2"]);
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &set, 1);
    let beta = run_with(&FakeSystem::healthy(), "beta", &set, 1);

    let mut comparison = compare_runs(
        "islam",
        &[alpha, beta],
        &EvaluatorConfig::default(),
        &ScriptedJudge::picking("alpha"),
        fast_compare(2, 0),
        None,
    )
    .expect("comparison should run");
    if let Evaluation::Judged { winner, .. } = &mut comparison.evaluations[1].evaluation {
        *winner = Some("tie".to_string());
    }

    let summary = ComparisonSummary::from_comparison(&comparison);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 0);
    assert!((summary.total_cost - 0.02).abs() < 1e-9);

    let alpha = &summary.systems["alpha"];
    assert_eq!((alpha.wins, alpha.ties, alpha.losses, alpha.evaluated), (1, 1, 0, 2));
    assert_eq!(alpha.mean_score, Some(8.0));
    let beta = &summary.systems["beta"];
    assert_eq!((beta.wins, beta.ties, beta.losses), (0, 1, 1));
    assert_eq!(summary.leader(), Some("alpha"));
}

#[test]
fn failed_retrieval_is_shown_to_the_judge_as_an_error() {
    struct CapturingJudge {
        prompts: std::sync::Mutex<Vec<String>>,
    }
    impl Judge for CapturingJudge {
        fn judge(
            &self,
            prompt: &str,
            _model: &str,
            _temperature: f64,
        ) -> Result<JudgeResponse, JudgeError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok(JudgeResponse {
                winner: None,
                scores: IndexMap::new(),
                reasoning: "ok".to_string(),
                cost: None,
            })
        }
    }

    let set = query_set("islam", &["q1"]);
    let alpha = run_with(&FakeSystem::healthy(), "alpha", &set, 1);
    let beta = run_with(&FakeSystem::failing_on("q1"), "beta", &set, 1);
    let judge = CapturingJudge {
        prompts: std::sync::Mutex::new(Vec::new()),
    };
    let config = EvaluatorConfig {
        prompt_template: "{provider_1}: {response_1}\n{provider_2}: {response_2}".to_string(),
        ..EvaluatorConfig::default()
    };

    compare_runs("islam", &[alpha, beta], &config, &judge, fast_compare(1, 0), None)
        .expect("comparison should run");

    let prompts = judge.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("alpha: [1] (score: 1.000) q1 doc 0"), "{}", prompts[0]);
    assert!(prompts[0].contains("beta: (retrieval failed:"), "{}", prompts[0]);
}

#[test]
fn stored_run_round_trips_through_json() {
    let set = QuerySet::new(
        "basics",
        "islam",
        vec![Query::new("What is zakat?").with_reference("Obligatory alms")],
    )
    .expect("query set should build");
    let mut config = system_config("alpha");
    config.config = json!({
        "top_k": 2,
        "url": "http://example.invalid",
        "headers": {"b": "1", "a": "2"}
    })
    .as_object()
    .cloned()
    .unwrap_or_else(Metadata::new);
    let run = execute_run(
        "islam",
        &FakeSystem::healthy(),
        &config,
        &set,
        RunOptions::default(),
        None,
    )
    .expect("run should execute");

    let encoded = serde_json::to_string_pretty(&run).expect("run should serialize");
    let decoded: Run = serde_json::from_str(&encoded).expect("run should deserialize");
    assert_eq!(decoded, run);
    assert_eq!(
        serde_json::to_string_pretty(&decoded).expect("run should serialize again"),
        encoded
    );
}

#[test]
fn concurrent_run_with_real_timings_round_trips_through_json() {
    let set = numbered_queries(200);
    let failing_text = set.queries[17].text.clone();
    let run = run_with(&FakeSystem::failing_on(&failing_text), "alpha", &set, 8);
    assert_eq!(run.results.len(), 200);

    let encoded = serde_json::to_string_pretty(&run).expect("run should serialize");
    let decoded: Run = serde_json::from_str(&encoded).expect("run should deserialize");
    assert_eq!(decoded, run);
    assert!(verify_run_snapshot(&decoded).expect("checksum should compute"));
}

#[test]
fn snapshot_keeps_placeholders_while_backend_sees_resolved_values() {
    struct TokenEcho {
        token: String,
    }
    impl System for TokenEcho {
        fn search(&self, query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError> {
            Ok(vec![RetrievedChunk::new(format!("{query} via {}", self.token), None)])
        }
    }
    fn fake_env(name: &str) -> Option<String> {
        (name == "SEARCH_TOKEN").then(|| "s3cret".to_string())
    }

    let mut config = system_config("alpha");
    config.config.insert("token".to_string(), json!("Bearer ${SEARCH_TOKEN}"));
    let set = query_set("islam", &["What is zakat?"]);

    let run = execute_configured_run(
        "islam",
        &config,
        &set,
        RunOptions::default(),
        |config| {
            let resolved = substitute_env_map(&config.config, fake_env)
                .map_err(|err| ConstructionError::new("system 'alpha'", err.to_string()))?;
            let token = resolved
                .get("token")
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(Box::new(TokenEcho { token }) as Box<dyn System>)
        },
        None,
    )
    .expect("run should execute");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.results[0].retrieved[0].content, "What is zakat? via Bearer s3cret");
    assert_eq!(run.system_config_snapshot.config["token"], json!("Bearer ${SEARCH_TOKEN}"));
    assert!(!serde_json::to_string(&run).expect("run should serialize").contains("s3cret"));
}

#[test]
fn oversized_or_blank_query_sets_are_rejected_before_execution() {
    let oversized = QuerySet {
        name: "huge".to_string(),
        domain: "islam".to_string(),
        queries: (0..=MAX_QUERIES_PER_SET)
            .map(|index| Query::new(format!("question {index}")))
            .collect(),
    };
    let blank = QuerySet {
        name: "blank".to_string(),
        domain: "islam".to_string(),
        queries: vec![Query::new("What is zakat?"), Query::new("   ")],
    };

    for set in [&oversized, &blank] {
        let error = execute_run(
            "islam",
            &FakeSystem::healthy(),
            &system_config("alpha"),
            set,
            RunOptions::default(),
            None,
        )
        .expect_err("invalid query set must be rejected");
        assert!(matches!(error, EngineError::InvalidArgument(_)), "{}: {error}", set.name);
    }
}
