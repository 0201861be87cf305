use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::RunArgs;
use crate::engine::{RunOptions, execute_configured_run};
use crate::model::Run;
use crate::system::build_system;

use super::{Workspace, log_progress, write_json};

pub fn run(workspace: &Workspace, args: RunArgs) -> Result<()> {
    let domain = workspace.config.load_domain(&args.domain)?;
    if let Some(description) = &domain.description {
        debug!(domain = %args.domain, description = %description, "domain loaded");
    }
    let system_config = workspace
        .config
        .load_system(&args.domain, &args.system)
        .with_context(|| format!("failed to load system '{}'", args.system))?;
    let query_set = workspace
        .config
        .load_query_set(&args.domain, &args.query_set)
        .with_context(|| format!("failed to load query set '{}'", args.query_set))?;

    let options = RunOptions {
        concurrency: args.concurrency,
        top_k: args.top_k.unwrap_or_else(|| system_config.top_k()),
    };
    let mut progress = log_progress("run");
    let run = execute_configured_run(
        &args.domain,
        &system_config,
        &query_set,
        options,
        build_system,
        Some(&mut progress),
    )?;
    let path = workspace.store.save_run(&run)?;

    if args.json {
        write_json(&run, "run")
    } else {
        write_text(&run, &path)
    }
}

fn write_text(run: &Run, path: &Path) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Run: {} ({})", run.id, run.status.as_str())?;
    writeln!(
        output,
        "System: {}\tQuery set: {}\tDomain: {}",
        run.system, run.query_set, run.domain
    )?;
    writeln!(
        output,
        "Queries: total={} successful={} failed={} duration_ms={:.1}",
        run.metadata.total,
        run.metadata.successful,
        run.metadata.failed,
        run.metadata.total_duration_ms
    )?;
    if let Some(error) = &run.error {
        writeln!(output, "Error: {error}")?;
    }
    for result in run.results.iter().filter(|result| !result.is_ok()) {
        writeln!(
            output,
            "\tfailed: {}\t{}",
            result.query,
            result.error.as_deref().unwrap_or_default()
        )?;
    }
    writeln!(output, "Saved: {}", path.display())?;
    output.flush()?;
    Ok(())
}
