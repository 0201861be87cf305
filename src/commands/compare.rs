use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::CompareArgs;
use crate::engine::{CompareOptions, ComparisonSummary, RetryPolicy, compare_configured_runs};
use crate::judge::build_judge;
use crate::model::{Comparison, Run};

use super::stats::write_summary_table;
use super::{Workspace, log_progress, write_json};

#[derive(Debug, Serialize)]
struct CompareOutput<'a> {
    comparison: &'a Comparison,
    summary: ComparisonSummary,
}

pub fn run(workspace: &Workspace, args: CompareArgs) -> Result<()> {
    workspace.config.load_domain(&args.domain)?;
    let evaluator_config = workspace
        .config
        .load_evaluator(&args.domain)
        .context("failed to load evaluator config")?;
    let runs = args
        .run_ids
        .iter()
        .map(|id| {
            workspace
                .store
                .load_run(id)
                .with_context(|| format!("failed to load run '{id}'"))
        })
        .collect::<Result<Vec<Run>>>()?;

    let options = CompareOptions {
        concurrency: args.concurrency,
        retry: RetryPolicy::new(args.max_retries, Duration::from_millis(args.retry_base_ms)),
    };
    let mut progress = log_progress("compare");
    let comparison = compare_configured_runs(
        &args.domain,
        &runs,
        &evaluator_config,
        build_judge,
        options,
        Some(&mut progress),
    )?;
    let path = workspace.store.save_comparison(&comparison)?;
    let summary = ComparisonSummary::from_comparison(&comparison);

    if args.json {
        write_json(
            &CompareOutput {
                comparison: &comparison,
                summary,
            },
            "comparison",
        )
    } else {
        write_text(&comparison, &summary, &path)
    }
}

fn write_text(comparison: &Comparison, summary: &ComparisonSummary, path: &Path) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(
        output,
        "Comparison: {} ({})",
        comparison.id,
        comparison.status.as_str()
    )?;
    if let Some(error) = &comparison.error {
        writeln!(output, "Error: {error}")?;
    }
    write_summary_table(&mut output, summary)?;
    writeln!(output, "Saved: {}", path.display())?;
    output.flush()?;
    Ok(())
}
