use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{EvaluatorConfig, Metadata, Query, QuerySet, SystemConfig};

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("env reference regex is valid")
});

pub type EnvLookup = fn(&str) -> Option<String>;

pub fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

#[derive(Debug, Error)]
#[error("environment variable '{0}' is not set")]
pub struct MissingEnvVar(pub String);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainInfo {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SystemFile {
    tool: String,
    #[serde(default)]
    config: Metadata,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryEntry {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        reference: Option<String>,
        #[serde(default)]
        metadata: Metadata,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuerySetFile {
    List(Vec<QueryEntry>),
    Object { queries: Vec<QueryEntry> },
}

/// Project configuration rooted at `<root>/domains/<domain>/`.
///
/// Files are loaded verbatim: `${VAR}` references stay in place so snapshots never carry
/// resolved secrets. Backends resolve them with [`substitute_env_map`] when they are built.
#[derive(Debug, Clone)]
pub struct ConfigRoot {
    root: PathBuf,
}

impl ConfigRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        self.root.join("domains").join(domain)
    }

    pub fn load_domain(&self, domain: &str) -> Result<DomainInfo> {
        let dir = self.domain_dir(domain);
        if !dir.is_dir() {
            bail!("unknown domain '{domain}': {} does not exist", dir.display());
        }
        let path = dir.join("domain.json");
        if !path.exists() {
            return Ok(DomainInfo::default());
        }
        read_config(&path)
    }

    pub fn load_system(&self, domain: &str, name: &str) -> Result<SystemConfig> {
        let path = self
            .domain_dir(domain)
            .join("systems")
            .join(format!("{name}.json"));
        let file: SystemFile = read_config(&path)?;
        Ok(SystemConfig {
            name: name.to_string(),
            tool: file.tool,
            config: file.config,
        })
    }

    pub fn load_query_set(&self, domain: &str, name: &str) -> Result<QuerySet> {
        let path = self
            .domain_dir(domain)
            .join("query_sets")
            .join(format!("{name}.json"));
        let file: QuerySetFile = read_config(&path)?;
        let entries = match file {
            QuerySetFile::List(entries) => entries,
            QuerySetFile::Object { queries } => queries,
        };
        let queries = entries
            .into_iter()
            .map(|entry| match entry {
                QueryEntry::Text(text) => Query::new(text),
                QueryEntry::Full {
                    text,
                    reference,
                    metadata,
                } => Query {
                    text,
                    reference,
                    metadata,
                },
            })
            .collect();

        QuerySet::new(name, domain, queries)
            .with_context(|| format!("invalid query set: {}", path.display()))
    }

    /// Evaluator settings for `domain`; defaults apply when no `evaluator.json` exists.
    pub fn load_evaluator(&self, domain: &str) -> Result<EvaluatorConfig> {
        let path = self.domain_dir(domain).join("evaluator.json");
        if !path.exists() {
            return Ok(EvaluatorConfig::default());
        }
        read_config(&path)
    }
}

fn read_config<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config file: {}", path.display()))
}

/// Replaces `${VAR}` and `${VAR:-default}` in every string value of `entries`.
pub fn substitute_env_map(
    entries: &Map<String, Value>,
    lookup: EnvLookup,
) -> Result<Map<String, Value>, MissingEnvVar> {
    let mut out = Map::with_capacity(entries.len());
    for (key, item) in entries {
        out.insert(key.clone(), substitute_env(item, lookup)?);
    }
    Ok(out)
}

pub fn substitute_env(value: &Value, lookup: EnvLookup) -> Result<Value, MissingEnvVar> {
    match value {
        Value::String(text) => substitute_str(text, lookup).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_env(item, lookup))
            .collect::<Result<Vec<Value>, MissingEnvVar>>()
            .map(Value::Array),
        Value::Object(entries) => substitute_env_map(entries, lookup).map(Value::Object),
        other => Ok(other.clone()),
    }
}

pub fn substitute_str(text: &str, lookup: EnvLookup) -> Result<String, MissingEnvVar> {
    let mut missing = None;
    let replaced = ENV_REFERENCE.replace_all(text, |captures: &Captures<'_>| {
        let name = &captures[1];
        match (lookup(name), captures.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(MissingEnvVar(name)),
        None => Ok(replaced.into_owned()),
    }
}
