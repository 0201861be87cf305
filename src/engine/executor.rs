use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ConstructionError, EngineError};
use crate::model::{
    MAX_QUERIES_PER_SET, Query, QueryResult, QuerySet, Run, RunMetadata, RunStatus, SystemConfig,
};
use crate::system::System;

use super::pool::{ProgressCallback, ProgressTracker, isolate, run_ordered};
use super::snapshot::snapshot_checksum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub concurrency: usize,
    pub top_k: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            top_k: SystemConfig::DEFAULT_TOP_K,
        }
    }
}

fn validate(query_set: &QuerySet, options: &RunOptions) -> Result<(), EngineError> {
    if query_set.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "query set '{}' is empty",
            query_set.name
        )));
    }
    if query_set.len() > MAX_QUERIES_PER_SET {
        return Err(EngineError::InvalidArgument(format!(
            "query set '{}' has {} queries (max {MAX_QUERIES_PER_SET})",
            query_set.name,
            query_set.len()
        )));
    }
    if let Some(index) = query_set
        .queries
        .iter()
        .position(|query| query.text.trim().is_empty())
    {
        return Err(EngineError::InvalidArgument(format!(
            "query #{} in set '{}' is empty",
            index + 1,
            query_set.name
        )));
    }
    if options.top_k == 0 {
        return Err(EngineError::InvalidArgument(
            "top_k must be positive".to_string(),
        ));
    }
    if options.concurrency == 0 {
        return Err(EngineError::InvalidArgument(
            "concurrency must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Executes every query of `query_set` against `system` and returns the finished run.
///
/// Results keep query-set order whatever the completion order. Backend failures are recorded on
/// the affected result and never abort sibling queries; only argument errors are returned.
pub fn execute_run(
    domain: &str,
    system: &dyn System,
    system_config: &SystemConfig,
    query_set: &QuerySet,
    options: RunOptions,
    progress: Option<ProgressCallback<'_>>,
) -> Result<Run, EngineError> {
    validate(query_set, &options)?;

    let id = Uuid::new_v4();
    let started_at = Utc::now();
    let total = query_set.len();
    info!(
        run_id = %id,
        domain,
        system = %system_config.name,
        query_set = %query_set.name,
        total,
        concurrency = options.concurrency,
        top_k = options.top_k,
        "run started"
    );

    let wall_clock = Instant::now();
    let mut tracker = ProgressTracker::new(total, progress);
    let results = run_ordered(
        &query_set.queries,
        options.concurrency,
        |_, query| execute_query(system, query, options.top_k),
        QueryResult::is_ok,
        &mut tracker,
    )?;

    let successful = results.iter().filter(|result| result.is_ok()).count();
    let failed = results.len() - successful;
    let total_duration_ms = wall_clock.elapsed().as_secs_f64() * 1000.0;
    let status = RunStatus::derive(successful, failed);

    let run = Run {
        id,
        domain: domain.to_string(),
        system: system_config.name.clone(),
        query_set: query_set.name.clone(),
        status,
        results,
        system_config_snapshot: system_config.clone(),
        query_set_snapshot: query_set.clone(),
        started_at,
        completed_at: Some(Utc::now()),
        metadata: RunMetadata {
            total,
            successful,
            failed,
            total_duration_ms,
        },
        error: None,
        snapshot_checksum: snapshot_checksum(system_config, query_set)?,
    };

    info!(
        run_id = %run.id,
        status = run.status.as_str(),
        successful,
        failed,
        total_duration_ms,
        "run finished"
    );
    Ok(run)
}

/// Builds the system with `build` and executes the run. A construction failure yields a stored
/// `failed` run with no results instead of an error.
pub fn execute_configured_run<B>(
    domain: &str,
    system_config: &SystemConfig,
    query_set: &QuerySet,
    options: RunOptions,
    build: B,
    progress: Option<ProgressCallback<'_>>,
) -> Result<Run, EngineError>
where
    B: FnOnce(&SystemConfig) -> Result<Box<dyn System>, ConstructionError>,
{
    validate(query_set, &options)?;

    match build(system_config) {
        Ok(system) => execute_run(
            domain,
            system.as_ref(),
            system_config,
            query_set,
            options,
            progress,
        ),
        Err(err) => {
            warn!(system = %system_config.name, error = %err, "system construction failed");
            failed_run(domain, system_config, query_set, err.to_string())
        }
    }
}

fn failed_run(
    domain: &str,
    system_config: &SystemConfig,
    query_set: &QuerySet,
    reason: String,
) -> Result<Run, EngineError> {
    let now = Utc::now();
    Ok(Run {
        id: Uuid::new_v4(),
        domain: domain.to_string(),
        system: system_config.name.clone(),
        query_set: query_set.name.clone(),
        status: RunStatus::Failed,
        results: Vec::new(),
        system_config_snapshot: system_config.clone(),
        query_set_snapshot: query_set.clone(),
        started_at: now,
        completed_at: Some(now),
        metadata: RunMetadata {
            total: query_set.len(),
            successful: 0,
            failed: query_set.len(),
            total_duration_ms: 0.0,
        },
        error: Some(reason),
        snapshot_checksum: snapshot_checksum(system_config, query_set)?,
    })
}

fn execute_query(system: &dyn System, query: &Query, top_k: usize) -> QueryResult {
    let started = Instant::now();
    let outcome = isolate(|| system.search(&query.text, top_k));
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(retrieved) => QueryResult {
            query: query.text.clone(),
            retrieved,
            reference: query.reference.clone(),
            duration_ms,
            error: None,
        },
        Err(error) => {
            warn!(query = %query.text, error = %error, "query failed");
            QueryResult {
                query: query.text.clone(),
                retrieved: Vec::new(),
                reference: query.reference.clone(),
                duration_ms,
                error: Some(error),
            }
        }
    }
}
