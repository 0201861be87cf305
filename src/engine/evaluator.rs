use std::collections::{HashMap, HashSet};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ConstructionError, EngineError};
use crate::judge::Judge;
use crate::model::{
    Comparison, ComparisonMetadata, ComparisonStatus, Evaluation, EvaluationResult,
    EvaluatorConfig, QueryResult, RetrievedChunk, Run,
};

use super::pool::{ProgressCallback, ProgressTracker, isolate, run_ordered};
use super::prompt::{ProviderView, render_prompt, validate_template};
use super::retry::{RetryPolicy, with_retries};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            retry: RetryPolicy::default(),
        }
    }
}

/// One shared query, with each system's retrieved chunks keyed by its label in run order.
#[derive(Debug, Clone)]
struct EvaluationTask {
    query: String,
    reference: Option<String>,
    run_results: IndexMap<String, Vec<RetrievedChunk>>,
    errors: Vec<Option<String>>,
}

fn validate(
    domain: &str,
    runs: &[Run],
    evaluator_config: &EvaluatorConfig,
    options: &CompareOptions,
) -> Result<(), EngineError> {
    if options.concurrency == 0 {
        return Err(EngineError::InvalidArgument(
            "concurrency must be at least 1".to_string(),
        ));
    }
    if runs.len() < 2 {
        return Err(EngineError::InsufficientRuns(runs.len()));
    }
    if let Some(run) = runs.iter().find(|run| run.domain != domain) {
        return Err(EngineError::DomainMismatch {
            expected: domain.to_string(),
            found: run.domain.clone(),
            run_id: run.id,
        });
    }
    validate_template(&evaluator_config.prompt_template, runs.len())
}

/// Judges every query shared by all `runs` and returns the finished comparison.
///
/// Evaluations keep the first run's query order. A query whose judge calls keep failing after
/// `options.retry` is recorded as an error entry; only argument errors are returned.
pub fn compare_runs(
    domain: &str,
    runs: &[Run],
    evaluator_config: &EvaluatorConfig,
    judge: &dyn Judge,
    options: CompareOptions,
    progress: Option<ProgressCallback<'_>>,
) -> Result<Comparison, EngineError> {
    validate(domain, runs, evaluator_config, &options)?;

    let id = Uuid::new_v4();
    let created_at = Utc::now();
    let tasks = build_tasks(runs);
    info!(
        comparison_id = %id,
        domain,
        runs = runs.len(),
        shared_queries = tasks.len(),
        model = %evaluator_config.model,
        concurrency = options.concurrency,
        max_retries = options.retry.max_retries,
        "comparison started"
    );

    let mut tracker = ProgressTracker::new(tasks.len(), progress);
    let evaluations = run_ordered(
        &tasks,
        options.concurrency,
        |_, task| evaluate_task(task, evaluator_config, judge, &options.retry),
        |result: &EvaluationResult| result.evaluation.is_ok(),
        &mut tracker,
    )?;

    let successful = evaluations
        .iter()
        .filter(|result| result.evaluation.is_ok())
        .count();
    let total_cost = evaluations
        .iter()
        .filter_map(|result| match &result.evaluation {
            Evaluation::Judged { cost, .. } => *cost,
            Evaluation::Failed { .. } => None,
        })
        .sum::<f64>();
    let metadata = ComparisonMetadata {
        total: evaluations.len(),
        successful,
        failed: evaluations.len() - successful,
        total_cost,
    };

    info!(
        comparison_id = %id,
        successful = metadata.successful,
        failed = metadata.failed,
        total_cost,
        "comparison finished"
    );

    Ok(Comparison {
        id,
        domain: domain.to_string(),
        runs: runs.iter().map(|run| run.id).collect(),
        status: ComparisonStatus::Completed,
        evaluations,
        evaluator_config_snapshot: evaluator_config.clone(),
        created_at,
        metadata,
        error: None,
    })
}

/// Builds the judge with `build` and runs the comparison. A construction failure yields a
/// `failed` comparison with no evaluations instead of an error.
pub fn compare_configured_runs<B>(
    domain: &str,
    runs: &[Run],
    evaluator_config: &EvaluatorConfig,
    build: B,
    options: CompareOptions,
    progress: Option<ProgressCallback<'_>>,
) -> Result<Comparison, EngineError>
where
    B: FnOnce(&EvaluatorConfig) -> Result<Box<dyn Judge>, ConstructionError>,
{
    validate(domain, runs, evaluator_config, &options)?;

    match build(evaluator_config) {
        Ok(judge) => compare_runs(
            domain,
            runs,
            evaluator_config,
            judge.as_ref(),
            options,
            progress,
        ),
        Err(err) => {
            warn!(provider = %evaluator_config.provider, error = %err, "judge construction failed");
            let shared = shared_query_count(runs);
            Ok(Comparison {
                id: Uuid::new_v4(),
                domain: domain.to_string(),
                runs: runs.iter().map(|run| run.id).collect(),
                status: ComparisonStatus::Failed,
                evaluations: Vec::new(),
                evaluator_config_snapshot: evaluator_config.clone(),
                created_at: Utc::now(),
                metadata: ComparisonMetadata {
                    total: shared,
                    successful: 0,
                    failed: shared,
                    total_cost: 0.0,
                },
                error: Some(err.to_string()),
            })
        }
    }
}

/// Labels are system names; repeated names get the run's short id appended.
fn system_labels(runs: &[Run]) -> Vec<String> {
    let mut seen = HashSet::<&str>::new();
    runs.iter()
        .map(|run| {
            if seen.insert(run.system.as_str()) {
                run.system.clone()
            } else {
                format!("{}@{}", run.system, run.short_id())
            }
        })
        .collect()
}

/// Query texts present in every run's query-set snapshot, in the first run's order.
fn shared_query_texts(runs: &[Run]) -> Vec<&str> {
    let Some((first, rest)) = runs.split_first() else {
        return Vec::new();
    };
    let others = rest
        .iter()
        .map(|run| {
            run.query_set_snapshot
                .queries
                .iter()
                .map(|query| query.text.as_str())
                .collect::<HashSet<&str>>()
        })
        .collect::<Vec<HashSet<&str>>>();

    let mut seen = HashSet::<&str>::new();
    first
        .query_set_snapshot
        .queries
        .iter()
        .map(|query| query.text.as_str())
        .filter(|text| others.iter().all(|set| set.contains(text)))
        .filter(|text| seen.insert(*text))
        .collect()
}

fn shared_query_count(runs: &[Run]) -> usize {
    shared_query_texts(runs).len()
}

fn build_tasks(runs: &[Run]) -> Vec<EvaluationTask> {
    let labels = system_labels(runs);
    let indexes = runs
        .iter()
        .map(|run| {
            let mut index = HashMap::<&str, &QueryResult>::with_capacity(run.results.len());
            for result in &run.results {
                index.entry(result.query.as_str()).or_insert(result);
            }
            index
        })
        .collect::<Vec<HashMap<&str, &QueryResult>>>();

    shared_query_texts(runs)
        .into_iter()
        .map(|text| {
            let reference = runs.iter().find_map(|run| {
                run.query_set_snapshot
                    .queries
                    .iter()
                    .find(|query| query.text == text)
                    .and_then(|query| query.reference.clone())
            });

            let mut run_results = IndexMap::with_capacity(runs.len());
            let mut errors = Vec::with_capacity(runs.len());
            for ((run, label), index) in runs.iter().zip(&labels).zip(&indexes) {
                match index.get(text) {
                    Some(result) => {
                        run_results.insert(label.clone(), result.retrieved.clone());
                        errors.push(result.error.clone());
                    }
                    None => {
                        run_results.insert(label.clone(), Vec::new());
                        errors.push(Some(
                            run.error
                                .clone()
                                .unwrap_or_else(|| "query was not executed".to_string()),
                        ));
                    }
                }
            }

            EvaluationTask {
                query: text.to_string(),
                reference,
                run_results,
                errors,
            }
        })
        .collect()
}

fn evaluate_task(
    task: &EvaluationTask,
    config: &EvaluatorConfig,
    judge: &dyn Judge,
    retry: &RetryPolicy,
) -> EvaluationResult {
    let providers = task
        .run_results
        .iter()
        .zip(&task.errors)
        .map(|((label, chunks), error)| ProviderView {
            label,
            chunks,
            error: error.as_deref(),
        })
        .collect::<Vec<ProviderView<'_>>>();
    let prompt = render_prompt(
        &config.prompt_template,
        &task.query,
        task.reference.as_deref(),
        &providers,
        config.max_chunk_chars,
    );

    let outcome = with_retries(retry, &task.query, |_| {
        isolate(|| judge.judge(&prompt, &config.model, config.temperature))
    });

    let evaluation = match outcome {
        Ok(response) => Evaluation::Judged {
            winner: response.winner,
            scores: response.scores,
            reasoning: response.reasoning,
            cost: response.cost,
        },
        Err(error) => {
            warn!(query = %task.query, error = %error, "evaluation failed after retries");
            Evaluation::Failed { error }
        }
    };

    EvaluationResult {
        query: task.query.clone(),
        reference: task.reference.clone(),
        run_results: task.run_results.clone(),
        evaluation,
    }
}
