//! LLM-backed logical-inference analyses (spec.md §4.9).
//!
//! Fresh module, grounded on `original_source/src/madspark/utils/
//! logical_inference_engine.py`: JSON is tried first, then a labeled
//! plain-text fallback grammar (`INFERENCE_CHAIN`, `CONCLUSION`,
//! `CONFIDENCE`, and variant-specific sections). On total failure each item
//! gets a typed placeholder with `confidence=0.0` rather than aborting the
//! batch, mirroring the original's per-item error objects.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BatchError;
use crate::provider::{GenerateRequest, ModelProvider};
use crate::state::{AnalysisTypeOption, IdeaText, InferenceResult};

const INFERENCE_SYSTEM_INSTRUCTION: &str = "You are a rigorous logical-inference engine. Given an idea and its context, trace the chain of reasoning step by step and state a conclusion with a confidence in [0,1]. Always respond in the same language as the input provided.";

#[async_trait]
pub trait LogicalInferenceEngine: Send + Sync {
    async fn analyze_batch(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
        analysis_type: AnalysisTypeOption,
    ) -> Result<Vec<InferenceResult>, BatchError>;
}

pub struct ProviderInferenceEngine<P: ModelProvider> {
    provider: P,
    temperature: f64,
}

impl<P: ModelProvider> ProviderInferenceEngine<P> {
    pub fn new(provider: P, temperature: f64) -> Self {
        Self { provider, temperature }
    }
}

fn section_label(analysis_type: AnalysisTypeOption) -> &'static str {
    match analysis_type {
        AnalysisTypeOption::Full => "full logical analysis",
        AnalysisTypeOption::Causal => "causal chain analysis, including feedback loops and root cause",
        AnalysisTypeOption::Constraints => "constraint-satisfaction analysis, including trade-offs",
        AnalysisTypeOption::Contradiction => "contradiction analysis",
        AnalysisTypeOption::Implications => "implications analysis, including second-order effects",
    }
}

fn placeholder(analysis_type: AnalysisTypeOption) -> InferenceResult {
    let inference_chain = vec!["Unable to parse logical analysis from batch response".to_string()];
    let conclusion = "Unable to perform logical analysis due to an error".to_string();
    match analysis_type {
        AnalysisTypeOption::Full => {
            InferenceResult::Full { inference_chain, conclusion, confidence: 0.0 }
        }
        AnalysisTypeOption::Causal => InferenceResult::Causal {
            inference_chain,
            conclusion,
            confidence: 0.0,
            causal_chain: Vec::new(),
            feedback_loops: Vec::new(),
            root_cause: None,
        },
        AnalysisTypeOption::Constraints => InferenceResult::Constraints {
            inference_chain,
            conclusion,
            confidence: 0.0,
            constraint_satisfaction: Default::default(),
            trade_offs: Vec::new(),
        },
        AnalysisTypeOption::Contradiction => InferenceResult::Contradiction {
            inference_chain,
            conclusion,
            confidence: 0.0,
            contradictions: Vec::new(),
        },
        AnalysisTypeOption::Implications => InferenceResult::Implications {
            inference_chain,
            conclusion,
            confidence: 0.0,
            implications: Vec::new(),
            second_order_effects: Vec::new(),
            improvements_hint: None,
        },
    }
}

fn from_json(value: &Value, analysis_type: AnalysisTypeOption) -> Option<InferenceResult> {
    let obj = value.as_object()?;
    let inference_chain: Vec<String> = obj
        .get("inference_chain")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let conclusion = obj.get("conclusion").and_then(Value::as_str).unwrap_or_default().to_string();
    let confidence = obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.5).clamp(0.0, 1.0);

    let strings = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };

    Some(match analysis_type {
        AnalysisTypeOption::Full => InferenceResult::Full { inference_chain, conclusion, confidence },
        AnalysisTypeOption::Causal => InferenceResult::Causal {
            inference_chain,
            conclusion,
            confidence: if confidence == 0.5 { 0.8 } else { confidence },
            causal_chain: strings("causal_chain"),
            feedback_loops: strings("feedback_loops"),
            root_cause: obj.get("root_cause").and_then(Value::as_str).map(str::to_string),
        },
        AnalysisTypeOption::Constraints => {
            let satisfaction: std::collections::BTreeMap<String, f64> = obj
                .get("constraint_satisfaction")
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f.clamp(0.0, 1.0))))
                        .collect()
                })
                .unwrap_or_default();
            let overall = if satisfaction.is_empty() {
                confidence
            } else {
                satisfaction.values().sum::<f64>() / satisfaction.len() as f64
            };
            InferenceResult::Constraints {
                inference_chain,
                conclusion,
                confidence: overall,
                constraint_satisfaction: satisfaction,
                trade_offs: strings("trade_offs"),
            }
        }
        AnalysisTypeOption::Contradiction => {
            let contradictions = strings("contradictions");
            let confidence = if !contradictions.is_empty() { 0.6 } else { confidence };
            InferenceResult::Contradiction { inference_chain, conclusion, confidence, contradictions }
        }
        AnalysisTypeOption::Implications => InferenceResult::Implications {
            inference_chain,
            conclusion,
            confidence,
            implications: strings("implications"),
            second_order_effects: strings("second_order_effects"),
            improvements_hint: obj.get("improvements_hint").and_then(Value::as_str).map(str::to_string),
        },
    })
}

fn parse_json_array(text: &str) -> Option<Vec<Value>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim();
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();
    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    (end >= start)
        .then(|| serde_json::from_str::<Vec<Value>>(&trimmed[start..=end]).ok())
        .flatten()
}

/// Plain-text fallback: labeled sections separated by blank lines, one block
/// per idea, in order. Used when the provider did not return JSON.
fn from_labeled_text(block: &str, analysis_type: AnalysisTypeOption) -> InferenceResult {
    let get_section = |label: &str| -> Option<String> {
        block
            .lines()
            .find(|line| line.to_uppercase().trim_start().starts_with(label))
            .and_then(|line| line.splitn(2, ':').nth(1))
            .map(|s| s.trim().to_string())
    };

    let inference_chain = get_section("INFERENCE_CHAIN")
        .map(|s| s.split(';').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let conclusion = get_section("CONCLUSION").unwrap_or_else(|| "No conclusion reached".to_string());
    let confidence = get_section("CONFIDENCE")
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    match analysis_type {
        AnalysisTypeOption::Full => InferenceResult::Full { inference_chain, conclusion, confidence },
        AnalysisTypeOption::Causal => InferenceResult::Causal {
            inference_chain,
            conclusion,
            confidence: 0.8,
            causal_chain: Vec::new(),
            feedback_loops: Vec::new(),
            root_cause: get_section("ROOT_CAUSE"),
        },
        AnalysisTypeOption::Constraints => InferenceResult::Constraints {
            inference_chain,
            conclusion,
            confidence,
            constraint_satisfaction: Default::default(),
            trade_offs: Vec::new(),
        },
        AnalysisTypeOption::Contradiction => InferenceResult::Contradiction {
            inference_chain,
            conclusion,
            confidence,
            contradictions: Vec::new(),
        },
        AnalysisTypeOption::Implications => InferenceResult::Implications {
            inference_chain,
            conclusion,
            confidence,
            implications: Vec::new(),
            second_order_effects: Vec::new(),
            improvements_hint: None,
        },
    }
}

#[async_trait]
impl<P: ModelProvider> LogicalInferenceEngine for ProviderInferenceEngine<P> {
    async fn analyze_batch(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
        analysis_type: AnalysisTypeOption,
    ) -> Result<Vec<InferenceResult>, BatchError> {
        if ideas.is_empty() {
            return Ok(Vec::new());
        }

        let listed = ideas
            .iter()
            .enumerate()
            .map(|(i, idea)| format!("{}. {}", i + 1, idea.display()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Topic: {topic}\nContext: {context}\n\nPerform a {} for each of the following {} ideas. Respond as a JSON array, one object per idea, aligned to the input order, each with fields inference_chain (array of strings), conclusion, confidence (0-1), and any analysis-specific fields.\n\n{listed}",
            section_label(analysis_type),
            ideas.len()
        );
        let response = self
            .provider
            .generate(
                GenerateRequest::new(prompt, self.temperature)
                    .with_system_instruction(INFERENCE_SYSTEM_INSTRUCTION),
            )
            .await?;

        let mut results: Vec<InferenceResult> = match parse_json_array(&response.text) {
            Some(items) if !items.is_empty() => items
                .iter()
                .map(|v| from_json(v, analysis_type).unwrap_or_else(|| placeholder(analysis_type)))
                .collect(),
            _ => {
                // Fall back to labeled-text blocks, one per blank-line-separated
                // section; if there's exactly one block, apply it to every idea
                // (single-shot providers that only ever analyze the batch once).
                let blocks: Vec<&str> =
                    response.text.split("\n\n").filter(|b| !b.trim().is_empty()).collect();
                if blocks.is_empty() {
                    ideas.iter().map(|_| placeholder(analysis_type)).collect()
                } else if blocks.len() >= ideas.len() {
                    blocks.iter().map(|b| from_labeled_text(b, analysis_type)).collect()
                } else {
                    ideas.iter().map(|_| from_labeled_text(&response.text, analysis_type)).collect()
                }
            }
        };

        results.truncate(ideas.len());
        while results.len() < ideas.len() {
            results.push(placeholder(analysis_type));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[tokio::test]
    async fn parses_structured_json_response() {
        let provider = MockProvider::new("[]").with_response(
            "Perform a full",
            r#"[{"inference_chain":["a implies b","b implies c"],"conclusion":"c follows","confidence":0.9}]"#,
        );
        let engine = ProviderInferenceEngine::new(provider, 0.5);
        let ideas = vec![IdeaText::new("an idea")];
        let results = engine
            .analyze_batch(&ideas, "topic", "ctx", AnalysisTypeOption::Full)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence(), 0.9);
        assert_eq!(results[0].conclusion(), "c follows");
    }

    #[tokio::test]
    async fn falls_back_to_labeled_text_when_not_json() {
        let provider = MockProvider::new(
            "INFERENCE_CHAIN: step one; step two\nCONCLUSION: it holds\nCONFIDENCE: 0.7",
        );
        let engine = ProviderInferenceEngine::new(provider, 0.5);
        let ideas = vec![IdeaText::new("an idea")];
        let results = engine
            .analyze_batch(&ideas, "topic", "ctx", AnalysisTypeOption::Full)
            .await
            .unwrap();
        assert_eq!(results[0].conclusion(), "it holds");
        assert!((results[0].confidence() - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn total_parse_failure_yields_placeholder_with_zero_confidence() {
        let provider = MockProvider::new("");
        let engine = ProviderInferenceEngine::new(provider, 0.5);
        let ideas = vec![IdeaText::new("an idea")];
        let results = engine
            .analyze_batch(&ideas, "topic", "ctx", AnalysisTypeOption::Causal)
            .await
            .unwrap();
        assert_eq!(results[0].confidence(), 0.0);
    }
}
