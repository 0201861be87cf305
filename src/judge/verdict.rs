use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::JudgeError;

use super::JudgeResponse;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fenced json regex is valid")
});

#[derive(Debug, Deserialize)]
struct RawVerdict {
    /// `None` when the key is absent, `Some(None)` for an explicit `null`.
    #[serde(default, deserialize_with = "present")]
    winner: Option<Option<String>>,
    scores: IndexMap<String, Value>,
    reasoning: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Extracts `{winner, scores, reasoning}` from free model text: a fenced json block wins,
/// otherwise the span between the first `{` and the last `}`.
pub fn parse_verdict(text: &str) -> Result<JudgeResponse, JudgeError> {
    let candidate = FENCED_JSON
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str())
        .or_else(|| outer_object(text))
        .ok_or_else(|| JudgeError::Parse(format!("no JSON object in: {}", preview(text))))?;

    let raw: RawVerdict = serde_json::from_str(candidate)
        .map_err(|err| JudgeError::Parse(format!("{err} in: {}", preview(candidate))))?;

    let reasoning = raw
        .reasoning
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| JudgeError::Parse("verdict has no reasoning".to_string()))?;

    let Some(winner) = raw.winner else {
        return Err(JudgeError::Parse("verdict has no winner".to_string()));
    };
    if raw.scores.is_empty() {
        return Err(JudgeError::Parse("verdict has no scores".to_string()));
    }

    let mut scores = IndexMap::with_capacity(raw.scores.len());
    for (system, value) in raw.scores {
        let score = match &value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| JudgeError::Parse(format!("score for '{system}' is not numeric: {value}")))?;
        scores.insert(system, score);
    }

    let winner = winner
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    Ok(JudgeResponse {
        winner,
        scores,
        reasoning,
        cost: None,
    })
}

fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    let mut out = text.chars().take(200).collect::<String>();
    if text.chars().count() > 200 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json_block() {
        let text = "Here is my verdict:\n```json\n{\"winner\": \"alpha\", \"scores\": {\"alpha\": 9, \"beta\": 4}, \"reasoning\": \"alpha defines zakat\"}\n```\nThanks.";
        let verdict = parse_verdict(text).expect("fenced verdict should parse");
        assert_eq!(verdict.winner.as_deref(), Some("alpha"));
        assert_eq!(verdict.scores.get("beta"), Some(&4.0));
        assert_eq!(verdict.reasoning, "alpha defines zakat");
    }

    #[test]
    fn parses_bare_object_and_numeric_strings() {
        let text = "{\"winner\": \"tie\", \"scores\": {\"alpha\": \"7.5\", \"beta\": 7.5}, \"reasoning\": \"equivalent\"}";
        let verdict = parse_verdict(text).expect("bare verdict should parse");
        assert_eq!(verdict.winner.as_deref(), Some("tie"));
        assert_eq!(verdict.scores.get("alpha"), Some(&7.5));
        assert_eq!(
            verdict.scores.keys().map(String::as_str).collect::<Vec<&str>>(),
            vec!["alpha", "beta"]
        );
    }

    #[test]
    fn empty_winner_means_no_winner() {
        let empty = r#"{"winner": "", "scores": {"alpha": 2}, "reasoning": "neither helps"}"#;
        let verdict = parse_verdict(empty).expect("verdict should parse");
        assert_eq!(verdict.winner, None);

        let null = r#"{"winner": null, "scores": {"alpha": 2}, "reasoning": "neither helps"}"#;
        let verdict = parse_verdict(null).expect("explicit null winner should parse");
        assert_eq!(verdict.winner, None);
    }

    #[test]
    fn rejects_verdict_without_winner_or_scores() {
        let reasoning_only = parse_verdict(r#"{"reasoning": "looks fine"}"#)
            .expect_err("a verdict needs a winner and scores");
        assert!(matches!(reasoning_only, JudgeError::Parse(_)));

        let no_winner = parse_verdict(r#"{"scores": {"alpha": 3}, "reasoning": "r"}"#)
            .expect_err("winner key is required");
        assert!(no_winner.to_string().contains("winner"), "{no_winner}");

        let no_scores = parse_verdict(r#"{"winner": "alpha", "scores": {}, "reasoning": "r"}"#)
            .expect_err("scores must not be empty");
        assert!(no_scores.to_string().contains("scores"), "{no_scores}");
    }

    #[test]
    fn rejects_missing_reasoning_and_non_json() {
        let missing = parse_verdict("{\"winner\": \"alpha\", \"scores\": {\"alpha\": 1}}")
            .expect_err("reasoning is required");
        assert!(missing.to_string().contains("reasoning"), "{missing}");

        let prose = parse_verdict("alpha is better").expect_err("prose is not a verdict");
        assert!(matches!(prose, JudgeError::Parse(_)));
    }

    #[test]
    fn rejects_non_numeric_scores() {
        let error = parse_verdict(
            "{\"winner\": \"alpha\", \"scores\": {\"alpha\": \"high\"}, \"reasoning\": \"r\"}",
        )
        .expect_err("non-numeric score should fail");
        assert!(error.to_string().contains("alpha"), "{error}");
    }
}
