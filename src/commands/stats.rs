use std::io::{self, Write};

use anyhow::Result;

use crate::cli::StatsArgs;
use crate::engine::ComparisonSummary;

use super::{Workspace, format_score, write_json};

pub fn run(workspace: &Workspace, args: StatsArgs) -> Result<()> {
    let comparison = workspace.store.load_comparison(&args.comparison_id)?;
    let summary = ComparisonSummary::from_comparison(&comparison);

    if args.json {
        return write_json(&summary, "stats");
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(
        output,
        "Comparison: {}\tDomain: {}\tRuns: {}",
        comparison.id,
        comparison.domain,
        comparison.runs.len()
    )?;
    write_summary_table(&mut output, &summary)?;
    output.flush()?;
    Ok(())
}

pub(super) fn write_summary_table(
    output: &mut impl Write,
    summary: &ComparisonSummary,
) -> Result<()> {
    writeln!(
        output,
        "Evaluations: total={} successful={} failed={} cost={:.4}",
        summary.total, summary.successful, summary.failed, summary.total_cost
    )?;
    writeln!(output, "system\twins\tties\tlosses\tevaluated\tmean_score")?;
    for (label, system) in &summary.systems {
        writeln!(
            output,
            "{label}\t{}\t{}\t{}\t{}\t{}",
            system.wins,
            system.ties,
            system.losses,
            system.evaluated,
            format_score(system.mean_score)
        )?;
    }
    if let Some(leader) = summary.leader() {
        writeln!(output, "Leader: {leader}")?;
    }
    Ok(())
}
