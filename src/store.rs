use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Comparison, Run};
use crate::util::{read_json, utc_day_string, write_json_pretty};

pub const DEFAULT_DATA_ROOT: &str = ".rageval";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Run,
    Comparison,
}

impl ArtifactKind {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Run => "runs",
            Self::Comparison => "comparisons",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Comparison => "comparison",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no {kind} matches '{id}'")]
    NotFound { kind: ArtifactKind, id: String },

    #[error("'{id}' is ambiguous: {count} {kind}s match")]
    Ambiguous {
        kind: ArtifactKind,
        id: String,
        count: usize,
    },
}

/// On-disk home for runs and comparisons: `<root>/<domain>/<runs|comparisons>/<day>/<id>.json`.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn save_run(&self, run: &Run) -> Result<PathBuf> {
        let path = self
            .root
            .join(&run.domain)
            .join(ArtifactKind::Run.dir_name())
            .join(utc_day_string(run.started_at))
            .join(format!("{}.json", run.id));
        write_json_pretty(&path, run)?;
        info!(run_id = %run.id, path = %path.display(), "run saved");
        Ok(path)
    }

    pub fn save_comparison(&self, comparison: &Comparison) -> Result<PathBuf> {
        let path = self
            .root
            .join(&comparison.domain)
            .join(ArtifactKind::Comparison.dir_name())
            .join(utc_day_string(comparison.created_at))
            .join(format!("{}.json", comparison.id));
        write_json_pretty(&path, comparison)?;
        info!(comparison_id = %comparison.id, path = %path.display(), "comparison saved");
        Ok(path)
    }

    /// Loads a run by full id or unique id prefix, searching every domain.
    pub fn load_run(&self, id_or_prefix: &str) -> Result<Run> {
        let path = self.resolve(ArtifactKind::Run, id_or_prefix)?;
        read_json(&path)
    }

    pub fn load_comparison(&self, id_or_prefix: &str) -> Result<Comparison> {
        let path = self.resolve(ArtifactKind::Comparison, id_or_prefix)?;
        read_json(&path)
    }

    /// Runs sorted by start time, optionally restricted to one domain.
    pub fn list_runs(&self, domain: Option<&str>) -> Result<Vec<Run>> {
        let mut runs = self.load_all::<Run>(ArtifactKind::Run, domain)?;
        runs.sort_by(|left, right| {
            left.started_at
                .cmp(&right.started_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(runs)
    }

    pub fn list_comparisons(&self, domain: Option<&str>) -> Result<Vec<Comparison>> {
        let mut comparisons = self.load_all::<Comparison>(ArtifactKind::Comparison, domain)?;
        comparisons.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(comparisons)
    }

    pub fn resolve(&self, kind: ArtifactKind, id_or_prefix: &str) -> Result<PathBuf> {
        let needle = id_or_prefix.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(StoreError::NotFound {
                kind,
                id: id_or_prefix.to_string(),
            }
            .into());
        }

        let mut matches = self
            .artifact_paths(kind, None)?
            .into_iter()
            .filter(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| stem.starts_with(&needle))
            })
            .collect::<Vec<PathBuf>>();
        debug!(
            kind = kind.as_str(),
            id = %needle,
            matches = matches.len(),
            "resolved artifact prefix"
        );

        match matches.len() {
            0 => Err(StoreError::NotFound {
                kind,
                id: id_or_prefix.to_string(),
            }
            .into()),
            1 => Ok(matches.remove(0)),
            count => Err(StoreError::Ambiguous {
                kind,
                id: id_or_prefix.to_string(),
                count,
            }
            .into()),
        }
    }

    fn load_all<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
        domain: Option<&str>,
    ) -> Result<Vec<T>> {
        self.artifact_paths(kind, domain)?
            .iter()
            .map(|path| read_json::<T>(path))
            .collect()
    }

    fn artifact_paths(&self, kind: ArtifactKind, domain: Option<&str>) -> Result<Vec<PathBuf>> {
        let domains = match domain {
            Some(domain) => vec![self.root.join(domain)],
            None => sorted_entries(&self.root)?
                .into_iter()
                .filter(|path| path.is_dir())
                .collect(),
        };

        let mut paths = Vec::new();
        for domain_dir in domains {
            let kind_dir = domain_dir.join(kind.dir_name());
            for day_dir in sorted_entries(&kind_dir)? {
                if !day_dir.is_dir() {
                    continue;
                }
                paths.extend(
                    sorted_entries(&day_dir)?
                        .into_iter()
                        .filter(|path| path.extension().is_some_and(|ext| ext == "json")),
                );
            }
        }
        Ok(paths)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| {
            entry
                .map(|entry| entry.path())
                .with_context(|| format!("failed to read entry in {}", dir.display()))
        })
        .collect::<Result<Vec<PathBuf>>>()?;
    entries.sort();
    Ok(entries)
}
