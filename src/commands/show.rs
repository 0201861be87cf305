use std::io::{self, Write};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::warn;

use crate::cli::ShowArgs;
use crate::engine::verify_run_snapshot;
use crate::model::{Comparison, Evaluation, Run};
use crate::store::{ArtifactKind, StoreError};
use crate::util::utc_string;

use super::{Workspace, format_score, write_json};

#[derive(Debug, Serialize)]
struct VerifiedRun<'a> {
    #[serde(flatten)]
    run: &'a Run,
    snapshot_verified: bool,
}

enum Artifact {
    Run(Box<Run>),
    Comparison(Box<Comparison>),
}

pub fn run(workspace: &Workspace, args: ShowArgs) -> Result<()> {
    match load_artifact(workspace, &args.id)? {
        Artifact::Run(run) => {
            let verified = if args.verify {
                let ok = verify_run_snapshot(&run)?;
                if !ok {
                    warn!(run_id = %run.id, "snapshot checksum mismatch");
                }
                Some(ok)
            } else {
                None
            };
            if args.json {
                match verified {
                    Some(snapshot_verified) => write_json(
                        &VerifiedRun {
                            run: &run,
                            snapshot_verified,
                        },
                        "run",
                    )?,
                    None => write_json(run.as_ref(), "run")?,
                }
            } else {
                write_run_text(&run, verified)?;
            }
            ensure_verified(&run, verified)
        }
        Artifact::Comparison(comparison) => {
            if args.verify {
                warn!(comparison_id = %comparison.id, "--verify only applies to runs");
            }
            if args.json {
                write_json(comparison.as_ref(), "comparison")
            } else {
                write_comparison_text(&comparison)
            }
        }
    }
}

/// Fails the command after output when `--verify` found a checksum mismatch.
fn ensure_verified(run: &Run, verified: Option<bool>) -> Result<()> {
    if verified == Some(false) {
        bail!("run {} failed snapshot verification", run.id);
    }
    Ok(())
}

/// Resolves `id` as a run first, then as a comparison.
fn load_artifact(workspace: &Workspace, id: &str) -> Result<Artifact> {
    match workspace.store.load_run(id) {
        Ok(run) => return Ok(Artifact::Run(Box::new(run))),
        Err(err) => match err.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound {
                kind: ArtifactKind::Run,
                ..
            }) => {}
            _ => return Err(err),
        },
    }
    let comparison = workspace.store.load_comparison(id)?;
    Ok(Artifact::Comparison(Box::new(comparison)))
}

fn write_run_text(run: &Run, verified: Option<bool>) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Run: {} ({})", run.id, run.status.as_str())?;
    writeln!(
        output,
        "Domain: {}\tSystem: {} ({})\tQuery set: {}",
        run.domain, run.system, run.system_config_snapshot.tool, run.query_set
    )?;
    writeln!(
        output,
        "Started: {}\tQueries: total={} successful={} failed={}",
        utc_string(run.started_at),
        run.metadata.total,
        run.metadata.successful,
        run.metadata.failed
    )?;
    if let Some(error) = &run.error {
        writeln!(output, "Error: {error}")?;
    }
    if let Some(ok) = verified {
        writeln!(
            output,
            "Snapshot: {}",
            if ok { "verified" } else { "MISMATCH" }
        )?;
    }

    for (index, result) in run.results.iter().enumerate() {
        writeln!(
            output,
            "{}.\t{}\t{:.1}ms",
            index + 1,
            result.query,
            result.duration_ms
        )?;
        if let Some(error) = &result.error {
            writeln!(output, "\terror: {error}")?;
            continue;
        }
        for (rank, chunk) in result.retrieved.iter().enumerate() {
            writeln!(
                output,
                "\t[{}] score={}\t{}",
                rank + 1,
                format_score(chunk.score),
                snippet(&chunk.content)
            )?;
        }
    }
    output.flush()?;
    Ok(())
}

fn write_comparison_text(comparison: &Comparison) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(
        output,
        "Comparison: {} ({})",
        comparison.id,
        comparison.status.as_str()
    )?;
    writeln!(
        output,
        "Domain: {}\tModel: {}\tCreated: {}",
        comparison.domain,
        comparison.evaluator_config_snapshot.model,
        utc_string(comparison.created_at)
    )?;
    let runs = comparison
        .runs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>();
    writeln!(output, "Runs: {}", runs.join(", "))?;
    if let Some(error) = &comparison.error {
        writeln!(output, "Error: {error}")?;
    }

    for (index, result) in comparison.evaluations.iter().enumerate() {
        writeln!(output, "{}.\t{}", index + 1, result.query)?;
        match &result.evaluation {
            Evaluation::Judged {
                winner,
                scores,
                reasoning,
                ..
            } => {
                let scores = scores
                    .iter()
                    .map(|(label, score)| format!("{label}={score:.1}"))
                    .collect::<Vec<String>>();
                writeln!(
                    output,
                    "\twinner={}\t{}",
                    winner.as_deref().unwrap_or("-"),
                    scores.join(" ")
                )?;
                writeln!(output, "\t{}", snippet(reasoning))?;
            }
            Evaluation::Failed { error } => writeln!(output, "\terror: {error}")?,
        }
    }
    output.flush()?;
    Ok(())
}

fn snippet(text: &str) -> String {
    const MAX: usize = 160;
    let flat = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    if flat.chars().count() <= MAX {
        return flat;
    }
    let mut out = flat.chars().take(MAX).collect::<String>();
    out.push_str("...");
    out
}
