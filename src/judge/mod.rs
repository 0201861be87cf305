//! LLM judges. The evaluator only sees [`Judge`]; [`build_judge`] picks the provider.

mod openai;
mod verdict;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{EnvLookup, process_env};
use crate::error::{ConstructionError, JudgeError};
use crate::model::EvaluatorConfig;

pub use self::openai::OpenAiJudge;
pub use self::verdict::parse_verdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResponse {
    pub winner: Option<String>,
    pub scores: IndexMap<String, f64>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Scores the retrieved content of several systems for one rendered prompt.
///
/// Implementations must either return a fully parsed verdict or fail; partial verdicts are not
/// allowed.
pub trait Judge: Send + Sync {
    fn judge(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
    ) -> Result<JudgeResponse, JudgeError>;
}

pub const SUPPORTED_PROVIDERS: &[&str] = &["openai"];

pub fn build_judge(config: &EvaluatorConfig) -> Result<Box<dyn Judge>, ConstructionError> {
    build_judge_with_env(config, process_env)
}

/// Builds the configured judge, resolving credentials through `lookup`. The config itself is
/// left untouched so the comparison snapshot keeps its placeholders.
pub fn build_judge_with_env(
    config: &EvaluatorConfig,
    lookup: EnvLookup,
) -> Result<Box<dyn Judge>, ConstructionError> {
    match config.provider.trim().to_ascii_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiJudge::from_config(config, lookup)?)),
        other => Err(ConstructionError::new(
            "judge",
            format!(
                "unknown provider '{other}' (supported: {})",
                SUPPORTED_PROVIDERS.join(", ")
            ),
        )),
    }
}
