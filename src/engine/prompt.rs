use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::EngineError;
use crate::model::RetrievedChunk;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(query|reference|responses|providers|provider_\d+|response_\d+)\}")
        .expect("placeholder regex is valid")
});

static NUMBERED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(?:provider|response)_(\d+)\}").expect("numbered placeholder regex is valid")
});

const NO_REFERENCE: &str = "(no reference provided)";
const NO_RESULTS: &str = "(no results)";

/// One participating system as the judge sees it.
#[derive(Debug, Clone, Copy)]
pub(super) struct ProviderView<'a> {
    pub(super) label: &'a str,
    pub(super) chunks: &'a [RetrievedChunk],
    pub(super) error: Option<&'a str>,
}

/// Rejects templates that reference a provider index the comparison cannot fill.
pub(super) fn validate_template(template: &str, provider_count: usize) -> Result<(), EngineError> {
    for captures in NUMBERED_PLACEHOLDER.captures_iter(template) {
        let index = captures[1].parse::<usize>().unwrap_or(usize::MAX);
        if index == 0 || index > provider_count {
            return Err(EngineError::InvalidArgument(format!(
                "prompt template references {} but only {provider_count} runs are compared",
                &captures[0]
            )));
        }
    }
    Ok(())
}

/// Substitutes every known placeholder in a single pass, so substituted text is never rescanned.
pub(super) fn render_prompt(
    template: &str,
    query: &str,
    reference: Option<&str>,
    providers: &[ProviderView<'_>],
    max_chunk_chars: Option<usize>,
) -> String {
    let mut values = HashMap::<String, String>::new();
    values.insert("query".to_string(), query.to_string());
    values.insert(
        "reference".to_string(),
        reference
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(NO_REFERENCE)
            .to_string(),
    );
    values.insert(
        "providers".to_string(),
        providers
            .iter()
            .map(|provider| provider.label)
            .collect::<Vec<&str>>()
            .join(", "),
    );

    let mut blocks = Vec::with_capacity(providers.len());
    for (index, provider) in providers.iter().enumerate() {
        let number = index + 1;
        let response = render_chunks(provider.chunks, provider.error, max_chunk_chars);
        blocks.push(format!("### {}\n{}", provider.label, response));
        values.insert(format!("provider_{number}"), provider.label.to_string());
        values.insert(format!("response_{number}"), response);
    }
    values.insert("responses".to_string(), blocks.join("\n\n"));

    PLACEHOLDER
        .replace_all(template, |captures: &regex::Captures<'_>| {
            values
                .get(&captures[1])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

pub(super) fn render_chunks(
    chunks: &[RetrievedChunk],
    error: Option<&str>,
    max_chunk_chars: Option<usize>,
) -> String {
    if let Some(error) = error {
        return format!("(retrieval failed: {error})");
    }
    if chunks.is_empty() {
        return NO_RESULTS.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let content = truncate_chars(chunk.content.trim(), max_chunk_chars);
            match chunk.score {
                Some(score) => format!("[{}] (score: {score:.3}) {content}", index + 1),
                None => format!("[{}] {content}", index + 1),
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

fn truncate_chars(text: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) if text.chars().count() > limit => {
            let mut out = text.chars().take(limit).collect::<String>();
            out.push_str("...");
            out
        }
        _ => text.to_string(),
    }
}
