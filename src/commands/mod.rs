pub mod compare;
pub mod index;
pub mod list;
pub mod run;
pub mod show;
pub mod stats;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::config::ConfigRoot;
use crate::engine::Progress;
use crate::store::Store;

const PROGRESS_LOG_EVERY: usize = 10;

/// Configuration and storage roots shared by every command.
pub struct Workspace {
    pub config: ConfigRoot,
    pub store: Store,
}

impl Workspace {
    pub fn new(config_root: &Path, data_root: &Path) -> Self {
        Self {
            config: ConfigRoot::new(config_root),
            store: Store::new(data_root),
        }
    }
}

/// Logs every tenth completion and the final one.
fn log_progress(stage: &'static str) -> impl FnMut(Progress) {
    move |progress: Progress| {
        if progress.done % PROGRESS_LOG_EVERY == 0 || progress.done == progress.total {
            info!(
                stage,
                done = progress.done,
                total = progress.total,
                ok = progress.ok,
                failed = progress.failed,
                "progress"
            );
        }
    }
}

fn write_json<T: Serialize>(value: &T, what: &str) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value)
        .with_context(|| format!("failed to serialize {what} json output"))?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |value| format!("{value:.2}"))
}
