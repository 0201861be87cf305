use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::{ListArgs, ListTarget};
use crate::util::utc_string;

use super::{Workspace, write_json};

#[derive(Debug, Serialize)]
struct RunRow {
    id: Uuid,
    domain: String,
    system: String,
    query_set: String,
    status: &'static str,
    started_at: String,
    successful: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct ComparisonRow {
    id: Uuid,
    domain: String,
    status: &'static str,
    created_at: String,
    runs: Vec<Uuid>,
    evaluations: usize,
    failed: usize,
}

pub fn run(workspace: &Workspace, args: ListArgs) -> Result<()> {
    let domain = args.domain.as_deref();
    match args.target {
        ListTarget::Runs => {
            let rows = workspace
                .store
                .list_runs(domain)?
                .into_iter()
                .map(|run| RunRow {
                    id: run.id,
                    status: run.status.as_str(),
                    started_at: utc_string(run.started_at),
                    successful: run.metadata.successful,
                    failed: run.metadata.failed,
                    domain: run.domain,
                    system: run.system,
                    query_set: run.query_set,
                })
                .collect::<Vec<RunRow>>();
            if args.json {
                return write_json(&rows, "run list");
            }

            let mut output = io::BufWriter::new(io::stdout().lock());
            writeln!(output, "id\tstarted_at\tdomain\tsystem\tquery_set\tstatus\tok/failed")?;
            for row in &rows {
                writeln!(
                    output,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}/{}",
                    row.id,
                    row.started_at,
                    row.domain,
                    row.system,
                    row.query_set,
                    row.status,
                    row.successful,
                    row.failed
                )?;
            }
            output.flush()?;
        }
        ListTarget::Comparisons => {
            let rows = workspace
                .store
                .list_comparisons(domain)?
                .into_iter()
                .map(|comparison| ComparisonRow {
                    id: comparison.id,
                    status: comparison.status.as_str(),
                    created_at: utc_string(comparison.created_at),
                    evaluations: comparison.evaluations.len(),
                    failed: comparison.metadata.failed,
                    domain: comparison.domain,
                    runs: comparison.runs,
                })
                .collect::<Vec<ComparisonRow>>();
            if args.json {
                return write_json(&rows, "comparison list");
            }

            let mut output = io::BufWriter::new(io::stdout().lock());
            writeln!(output, "id\tcreated_at\tdomain\tstatus\truns\tevaluations\tfailed")?;
            for row in &rows {
                writeln!(
                    output,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    row.id,
                    row.created_at,
                    row.domain,
                    row.status,
                    row.runs.len(),
                    row.evaluations,
                    row.failed
                )?;
            }
            output.flush()?;
        }
    }
    Ok(())
}
