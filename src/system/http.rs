use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Map, Value};

use crate::error::{BackendError, ConstructionError};
use crate::model::{Metadata, RetrievedChunk, SystemConfig};

use super::{System, component, optional_str, optional_u64, required_str};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpMethod {
    Get,
    Post,
}

/// Generic JSON-over-HTTP retrieval service.
///
/// The request carries the query and `top_k` under configurable field names; the response
/// must hold an array (located by `results_pointer`) of either strings or objects.
#[derive(Debug)]
pub struct HttpSystem {
    client: Client,
    url: String,
    method: HttpMethod,
    headers: Vec<(String, String)>,
    query_field: String,
    top_k_field: String,
    extra_body: Map<String, Value>,
    results_pointer: String,
    content_field: String,
    score_field: String,
}

impl HttpSystem {
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConstructionError> {
        let url = required_str(config, "url")?.to_string();
        let method = match optional_str(config, "method", "POST")
            .to_ascii_uppercase()
            .as_str()
        {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            other => {
                return Err(ConstructionError::new(
                    component(config),
                    format!("unsupported method '{other}' (expected GET or POST)"),
                ));
            }
        };

        let mut headers = Vec::new();
        if let Some(raw_headers) = config.config.get("headers") {
            let Some(map) = raw_headers.as_object() else {
                return Err(ConstructionError::new(
                    component(config),
                    "'headers' must be an object of strings",
                ));
            };
            for (name, value) in map {
                let Some(value) = value.as_str() else {
                    return Err(ConstructionError::new(
                        component(config),
                        format!("header '{name}' must be a string"),
                    ));
                };
                headers.push((name.clone(), value.to_string()));
            }
        }

        let extra_body = match config.config.get("extra_body") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(ConstructionError::new(
                    component(config),
                    "'extra_body' must be an object",
                ));
            }
        };

        let results_pointer = optional_str(config, "results_pointer", "/results").to_string();
        if !results_pointer.is_empty() && !results_pointer.starts_with('/') {
            return Err(ConstructionError::new(
                component(config),
                format!("results_pointer '{results_pointer}' must start with '/'"),
            ));
        }

        let timeout = Duration::from_millis(optional_u64(config, "timeout_ms", DEFAULT_TIMEOUT_MS));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                ConstructionError::new(component(config), format!("http client: {err}"))
            })?;

        Ok(Self {
            client,
            url,
            method,
            headers,
            query_field: optional_str(config, "query_field", "query").to_string(),
            top_k_field: optional_str(config, "top_k_field", "top_k").to_string(),
            extra_body,
            results_pointer,
            content_field: optional_str(config, "content_field", "content").to_string(),
            score_field: optional_str(config, "score_field", "score").to_string(),
        })
    }

    fn parse_results(
        &self,
        body: &Value,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, BackendError> {
        let items = body
            .pointer(&self.results_pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                BackendError::Parse(format!(
                    "no result array at pointer '{}'",
                    self.results_pointer
                ))
            })?;

        let mut chunks = Vec::with_capacity(items.len().min(top_k));
        for item in items.iter().take(top_k) {
            chunks.push(self.parse_item(item)?);
        }
        Ok(chunks)
    }

    fn parse_item(&self, item: &Value) -> Result<RetrievedChunk, BackendError> {
        match item {
            Value::String(content) => Ok(RetrievedChunk::new(content.clone(), None)),
            Value::Object(fields) => {
                let content = fields
                    .get(&self.content_field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        BackendError::Parse(format!(
                            "result is missing string field '{}'",
                            self.content_field
                        ))
                    })?
                    .to_string();
                let score = fields.get(&self.score_field).and_then(Value::as_f64);
                let metadata = fields
                    .iter()
                    .filter(|(key, _)| **key != self.content_field && **key != self.score_field)
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<Metadata>();
                Ok(RetrievedChunk {
                    content,
                    score,
                    metadata,
                })
            }
            other => Err(BackendError::Parse(format!(
                "unexpected result entry: {other}"
            ))),
        }
    }
}

impl System for HttpSystem {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError> {
        let mut request = match self.method {
            HttpMethod::Post => {
                let mut body = self.extra_body.clone();
                body.insert(self.query_field.clone(), Value::from(query));
                body.insert(self.top_k_field.clone(), Value::from(top_k as u64));
                self.client.post(&self.url).json(&Value::Object(body))
            }
            HttpMethod::Get => self.client.get(&self.url).query(&[
                (self.query_field.as_str(), query.to_string()),
                (self.top_k_field.as_str(), top_k.to_string()),
            ]),
        };
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body = response
            .json::<Value>()
            .map_err(|err| BackendError::Parse(err.to_string()))?;
        self.parse_results(&body, top_k)
    }
}
