use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::{EnvLookup, substitute_str};
use crate::error::{ConstructionError, JudgeError};
use crate::model::EvaluatorConfig;

use super::{Judge, JudgeResponse, parse_verdict};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ERROR_BODY_CHARS: usize = 500;
const SYSTEM_PROMPT: &str =
    "You are an impartial evaluator of retrieval quality. Answer with a single JSON object.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Judge backed by any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAiJudge {
    client: Client,
    endpoint: String,
    api_key: String,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
}

impl OpenAiJudge {
    /// Resolves the API key and any `${VAR}` in `base_url` through `lookup`.
    pub fn from_config(
        config: &EvaluatorConfig,
        lookup: EnvLookup,
    ) -> Result<Self, ConstructionError> {
        let api_key = lookup(&config.api_key_env)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                ConstructionError::new(
                    "judge",
                    format!("environment variable {} is not set", config.api_key_env),
                )
            })?;
        let base_url = match config.base_url.as_deref() {
            Some(base_url) => substitute_str(base_url, lookup)
                .map_err(|err| ConstructionError::new("judge", err.to_string()))?,
            None => OPENAI_API_BASE.to_string(),
        };
        Self::new(
            &base_url,
            api_key,
            config.input_cost_per_1k.unwrap_or(0.0),
            config.output_cost_per_1k.unwrap_or(0.0),
        )
    }

    pub fn new(
        base_url: &str,
        api_key: String,
        input_cost_per_1k: f64,
        output_cost_per_1k: f64,
    ) -> Result<Self, ConstructionError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ConstructionError::new("judge", format!("http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            input_cost_per_1k,
            output_cost_per_1k,
        })
    }

    fn cost(&self, usage: Option<ChatUsage>) -> Option<f64> {
        let usage = usage?;
        Some(
            usage.prompt_tokens as f64 / 1000.0 * self.input_cost_per_1k
                + usage.completion_tokens as f64 / 1000.0 * self.output_cost_per_1k,
        )
    }
}

impl Judge for OpenAiJudge {
    fn judge(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
    ) -> Result<JudgeResponse, JudgeError> {
        let request = ChatRequest {
            model,
            temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|err| JudgeError::Parse(format!("chat response: {err}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| JudgeError::Parse("chat response has no content".to_string()))?;

        let mut verdict = parse_verdict(&content)?;
        verdict.cost = self.cost(chat.usage);
        Ok(verdict)
    }
}
