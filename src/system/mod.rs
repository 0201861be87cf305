//! Retrieval backends. The engine only sees [`System`]; [`build_system`] is the single place
//! that maps a configured `tool` name to an implementation.

mod http;
mod sqlite;

use serde_json::Value;

use crate::config::{EnvLookup, process_env, substitute_env_map};
use crate::error::{BackendError, ConstructionError};
use crate::model::{RetrievedChunk, SystemConfig};

pub use self::http::HttpSystem;
pub use self::sqlite::{IndexStats, SqliteMode, SqliteSystem, build_index};

/// A retrieval backend bound to one configuration.
///
/// Implementations are shared across worker threads, so they must be `Sync`; a
/// search returns chunks most-relevant first.
pub trait System: Send + Sync {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError>;
}

pub const SUPPORTED_TOOLS: &[&str] = &["http", "sqlite"];

pub fn build_system(config: &SystemConfig) -> Result<Box<dyn System>, ConstructionError> {
    build_system_with_env(config, process_env)
}

/// Builds the backend from a copy of `config` whose `${VAR}` references are resolved through
/// `lookup`; the caller's config keeps its placeholders.
pub fn build_system_with_env(
    config: &SystemConfig,
    lookup: EnvLookup,
) -> Result<Box<dyn System>, ConstructionError> {
    let resolved = SystemConfig {
        name: config.name.clone(),
        tool: config.tool.clone(),
        config: substitute_env_map(&config.config, lookup)
            .map_err(|err| ConstructionError::new(component(config), err.to_string()))?,
    };

    match resolved.tool.trim().to_ascii_lowercase().as_str() {
        "http" => Ok(Box::new(HttpSystem::from_config(&resolved)?)),
        "sqlite" => Ok(Box::new(SqliteSystem::from_config(&resolved)?)),
        other => Err(ConstructionError::new(
            format!("system '{}'", config.name),
            format!(
                "unknown tool '{other}' (supported: {})",
                SUPPORTED_TOOLS.join(", ")
            ),
        )),
    }
}

fn component(config: &SystemConfig) -> String {
    format!("system '{}'", config.name)
}

fn required_str<'a>(config: &'a SystemConfig, key: &str) -> Result<&'a str, ConstructionError> {
    config
        .config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ConstructionError::new(
                component(config),
                format!("missing required string field '{key}'"),
            )
        })
}

fn optional_str<'a>(config: &'a SystemConfig, key: &str, default: &'a str) -> &'a str {
    config
        .config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

fn optional_u64(config: &SystemConfig, key: &str, default: u64) -> u64 {
    config
        .config
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or(default)
}
