//! Multi-strategy parser for structured provider responses.
//!
//! Ported from the fallback cascade in `deepthink.rs::extract_json_array` /
//! `parse_judge_sections`, generalized to the four strategies spec.md §4.2
//! requires and to a fixed output length (padding with placeholders).

use regex::Regex;
use serde_json::Value;

/// One parsed evaluation-style record: a score and free-text comment.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub score: f64,
    pub comment: String,
    /// `true` when this record was synthesized to pad a short response
    /// rather than parsed from provider output.
    pub is_placeholder: bool,
}

const PLACEHOLDER_COMMENT: &str = "Failed to parse evaluation";
const DEFAULT_COMMENT: &str = "No comment provided";

/// Parses `text` into exactly `expected` records, trying strategies in order
/// and stopping at the first one that yields at least one record. Missing
/// records are padded with `{score:0, comment:"Failed to parse evaluation"}`
/// and flagged via `is_placeholder` so callers can translate them into their
/// own "missing" representation instead of surfacing this internal text.
pub fn parse_records(text: &str, expected: usize) -> Vec<EvaluationRecord> {
    let mut records = strategy_whole_document(text)
        .or_else(|| strategy_line_by_line(text))
        .or_else(|| strategy_object_regex(text))
        .or_else(|| strategy_key_value_regex(text))
        .unwrap_or_default();

    records.truncate(expected);
    while records.len() < expected {
        records.push(EvaluationRecord {
            score: 0.0,
            comment: PLACEHOLDER_COMMENT.to_string(),
            is_placeholder: true,
        });
    }
    records.into_iter().map(validate).collect()
}

fn validate(record: EvaluationRecord) -> EvaluationRecord {
    let score = record.score.clamp(0.0, 10.0);
    let comment = if record.comment.trim().is_empty() {
        DEFAULT_COMMENT.to_string()
    } else {
        record.comment
    };
    EvaluationRecord { score, comment, is_placeholder: record.is_placeholder }
}

fn record_from_value(value: &Value) -> Option<EvaluationRecord> {
    let obj = value.as_object()?;
    let score = match obj.get("score") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    let comment = ["comment", "critique", "feedback"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_COMMENT)
        .to_string();
    Some(EvaluationRecord { score, comment, is_placeholder: false })
}

fn strategy_whole_document(text: &str) -> Option<Vec<EvaluationRecord>> {
    let trimmed = strip_code_fence(text);
    let value: Value = serde_json::from_str(trimmed).ok()?;
    match value {
        Value::Array(items) => {
            let records: Vec<EvaluationRecord> = items.iter().filter_map(record_from_value).collect();
            (!records.is_empty()).then_some(records)
        }
        Value::Object(_) => record_from_value(&value).map(|r| vec![r]),
        _ => None,
    }
}

fn strategy_line_by_line(text: &str) -> Option<Vec<EvaluationRecord>> {
    let records: Vec<EvaluationRecord> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter_map(|v| record_from_value(&v))
        .collect();
    (!records.is_empty()).then_some(records)
}

fn strategy_object_regex(text: &str) -> Option<Vec<EvaluationRecord>> {
    let re = Regex::new(r"\{[^{}]*\}").ok()?;
    let records: Vec<EvaluationRecord> = re
        .find_iter(text)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter_map(|v| record_from_value(&v))
        .collect();
    (!records.is_empty()).then_some(records)
}

fn strategy_key_value_regex(text: &str) -> Option<Vec<EvaluationRecord>> {
    let score_re = Regex::new(r"(?i)score\s*[:=]\s*([0-9]+(?:\.[0-9]+)?)").ok()?;
    let comment_re =
        Regex::new(r"(?i)(?:comment|critique|feedback)\s*[:=]\s*([^\n,]+)").ok()?;

    let scores: Vec<f64> = score_re
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .collect();
    let comments: Vec<String> = comment_re
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect();

    if scores.is_empty() && comments.is_empty() {
        return None;
    }

    let len = scores.len().max(comments.len());
    let records: Vec<EvaluationRecord> = (0..len)
        .map(|i| EvaluationRecord {
            score: scores.get(i).copied().unwrap_or(0.0),
            comment: comments.get(i).cloned().unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
            is_placeholder: false,
        })
        .collect();
    Some(records)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let text = r#"[{"score": 8, "comment": "great"}, {"score": 6, "critique": "ok"}]"#;
        let records = parse_records(text, 2);
        assert_eq!(records[0].score, 8.0);
        assert_eq!(records[0].comment, "great");
        assert_eq!(records[1].comment, "ok");
    }

    #[test]
    fn parses_json_wrapped_in_code_fence() {
        let text = "```json\n[{\"score\": 9, \"comment\": \"excellent\"}]\n```";
        let records = parse_records(text, 1);
        assert_eq!(records[0].score, 9.0);
    }

    #[test]
    fn falls_back_to_line_by_line() {
        let text = "{\"score\": 5, \"comment\": \"fine\"}\n{\"score\": 7, \"comment\": \"good\"}\n";
        let records = parse_records(text, 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].score, 7.0);
    }

    #[test]
    fn falls_back_to_key_value_regex_on_plain_text() {
        let text = "score: 7, comment: good\nscore: 9, comment: great\n";
        let records = parse_records(text, 2);
        assert_eq!(records[0].score, 7.0);
        assert_eq!(records[0].comment, "good");
        assert_eq!(records[1].score, 9.0);
        assert_eq!(records[1].comment, "great");
    }

    #[test]
    fn pads_short_results_with_placeholders() {
        let text = r#"[{"score": 8, "comment": "great"}]"#;
        let records = parse_records(text, 3);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].comment, PLACEHOLDER_COMMENT);
        assert_eq!(records[2].score, 0.0);
    }

    #[test]
    fn total_failure_yields_all_placeholders() {
        let records = parse_records("not json and no key/value pairs at all", 2);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.comment == PLACEHOLDER_COMMENT));
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let text = r#"[{"score": 42, "comment": "too high"}]"#;
        let records = parse_records(text, 1);
        assert_eq!(records[0].score, 10.0);
    }

    #[test]
    fn empty_comment_defaults_to_no_comment_provided() {
        let text = r#"[{"score": 5, "comment": ""}]"#;
        let records = parse_records(text, 1);
        assert_eq!(records[0].comment, DEFAULT_COMMENT);
    }

    #[test]
    fn validation_is_idempotent() {
        let record = EvaluationRecord { score: 42.0, comment: "".to_string(), is_placeholder: true };
        let once = validate(record);
        let twice = validate(once.clone());
        assert_eq!(once, twice);
    }
}
