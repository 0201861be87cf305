use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::EngineError;

pub const MAX_QUERIES_PER_SET: usize = 1000;
pub const TIE: &str = "tie";

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    pub name: String,
    pub domain: String,
    pub queries: Vec<Query>,
}

impl QuerySet {
    /// Builds a query set, trimming every query text and enforcing the size bound.
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        queries: Vec<Query>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if queries.is_empty() {
            return Err(EngineError::InvalidArgument(format!(
                "query set '{name}' contains no queries"
            )));
        }
        if queries.len() > MAX_QUERIES_PER_SET {
            return Err(EngineError::InvalidArgument(format!(
                "query set '{name}' has {} queries (max {MAX_QUERIES_PER_SET})",
                queries.len()
            )));
        }

        let mut normalized = Vec::with_capacity(queries.len());
        for (index, mut query) in queries.into_iter().enumerate() {
            let trimmed = query.text.trim();
            if trimmed.is_empty() {
                return Err(EngineError::InvalidArgument(format!(
                    "query #{} in set '{name}' is empty",
                    index + 1
                )));
            }
            query.text = trimmed.to_string();
            normalized.push(query);
        }

        Ok(Self {
            name,
            domain: domain.into(),
            queries: normalized,
        })
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    pub tool: String,
    #[serde(default)]
    pub config: Metadata,
}

impl SystemConfig {
    pub const DEFAULT_TOP_K: usize = 5;

    /// Reads `top_k` from the tool payload. Only the CLI layer consults this.
    pub fn top_k(&self) -> usize {
        self.config
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|value| value as usize)
            .unwrap_or(Self::DEFAULT_TOP_K)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
}

impl RetrievedChunk {
    pub fn new(content: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            content: content.into(),
            score,
            metadata: Metadata::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub retrieved: Vec<RetrievedChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl RunStatus {
    /// `completed` with no errors, `failed` when nothing succeeded, `partial` otherwise.
    pub fn derive(successful: usize, failed: usize) -> Self {
        match (successful, failed) {
            (_, 0) if successful > 0 => Self::Completed,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub domain: String,
    pub system: String,
    pub query_set: String,
    pub status: RunStatus,
    pub results: Vec<QueryResult>,
    pub system_config_snapshot: SystemConfig,
    pub query_set_snapshot: QuerySet,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: RunMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub snapshot_checksum: String,
}

impl Run {
    pub fn short_id(&self) -> String {
        short_uuid(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunk_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cost_per_1k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cost_per_1k: Option<f64>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            prompt_template: default_prompt_template(),
            provider: default_provider(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_chunk_chars: None,
            input_cost_per_1k: None,
            output_cost_per_1k: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are judging retrieval systems. For the question below, \
each system returned a ranked list of passages. Decide which system's passages better answer \
the question.

Question: {query}

Reference answer: {reference}

{responses}

Score every system from 0 to 10. Respond with JSON only:
{\"winner\": \"<one of: {providers}> or tie\", \"scores\": {\"<system>\": <score>}, \"reasoning\": \"<short explanation>\"}";

/// Outcome of judging one query: the judge's verdict or the error that remained after retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Evaluation {
    Judged {
        winner: Option<String>,
        scores: IndexMap<String, f64>,
        reasoning: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
    },
    Failed {
        error: String,
    },
}

impl Evaluation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Judged { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Judged { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub run_results: IndexMap<String, Vec<RetrievedChunk>>,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    Completed,
    Failed,
}

impl ComparisonStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetadata {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(default)]
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub id: Uuid,
    pub domain: String,
    pub runs: Vec<Uuid>,
    pub status: ComparisonStatus,
    pub evaluations: Vec<EvaluationResult>,
    pub evaluator_config_snapshot: EvaluatorConfig,
    pub created_at: DateTime<Utc>,
    pub metadata: ComparisonMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Comparison {
    pub fn short_id(&self) -> String {
        short_uuid(&self.id)
    }
}

pub fn short_uuid(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}
