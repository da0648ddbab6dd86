//! 7-dimension batch scoring (spec.md §4.8). One provider call per batch of
//! N ideas for the dimension scores, plus one additional call for the
//! natural-language summary (see DESIGN.md for why this is two calls).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BatchError;
use crate::provider::{GenerateRequest, ModelProvider};
use crate::state::{IdeaText, MultiDimScore};

const DIMENSION_EVAL_SYSTEM_INSTRUCTION: &str = "You are an expert multi-dimensional evaluator. Score each idea across feasibility, innovation, impact, cost_effectiveness, scalability, risk_assessment, and timeline, each on a 1-10 scale. Always respond in the same language as the input provided.";

const SUMMARY_SYSTEM_INSTRUCTION: &str = "You write a one- to two-sentence synopsis of a multi-dimensional evaluation. Always respond in the same language as the input provided.";

#[async_trait]
pub trait MultiDimensionalEvaluator: Send + Sync {
    async fn evaluate_batch(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
    ) -> Result<Vec<MultiDimScore>, BatchError>;
}

pub struct ProviderMultiDimEvaluator<P: ModelProvider> {
    provider: P,
    temperature: f64,
}

impl<P: ModelProvider> ProviderMultiDimEvaluator<P> {
    pub fn new(provider: P, temperature: f64) -> Self {
        Self { provider, temperature }
    }
}

#[derive(Debug, Deserialize, Default)]
struct DimensionScores {
    #[serde(default)]
    feasibility: Option<f64>,
    #[serde(default)]
    innovation: Option<f64>,
    #[serde(default)]
    impact: Option<f64>,
    #[serde(default)]
    cost_effectiveness: Option<f64>,
    #[serde(default)]
    scalability: Option<f64>,
    #[serde(default)]
    risk_assessment: Option<f64>,
    #[serde(default)]
    timeline: Option<f64>,
}

impl DimensionScores {
    /// Validation rejects responses missing any dimension (spec.md §4.8);
    /// such entries fall back to the midpoint (5.0) per dimension rather
    /// than aborting the whole batch.
    fn resolved(&self) -> [f64; 7] {
        [
            self.feasibility.unwrap_or(5.0),
            self.innovation.unwrap_or(5.0),
            self.impact.unwrap_or(5.0),
            self.cost_effectiveness.unwrap_or(5.0),
            self.scalability.unwrap_or(5.0),
            self.risk_assessment.unwrap_or(5.0),
            self.timeline.unwrap_or(5.0),
        ]
    }
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

#[async_trait]
impl<P: ModelProvider> MultiDimensionalEvaluator for ProviderMultiDimEvaluator<P> {
    async fn evaluate_batch(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
    ) -> Result<Vec<MultiDimScore>, BatchError> {
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
            "Topic: {topic}\nContext: {context}\n\nScore each of the following {} ideas. Respond as a JSON array of objects with fields feasibility, innovation, impact, cost_effectiveness, scalability, risk_assessment, timeline (each 1-10).\n\n{listed}",
            ideas.len()
        );
        let scores_response = self
            .provider
            .generate(
                GenerateRequest::new(prompt, self.temperature)
                    .with_system_instruction(DIMENSION_EVAL_SYSTEM_INSTRUCTION),
            )
            .await?;

        let items = parse_json_array(&scores_response.text).unwrap_or_default();
        let mut dims: Vec<[f64; 7]> = items
            .iter()
            .map(|v| serde_json::from_value::<DimensionScores>(v.clone()).unwrap_or_default().resolved())
            .collect();
        dims.resize(ideas.len(), DimensionScores::default().resolved());

        let summary_prompt = format!(
            "Topic: {topic}\n\nWrite a one- to two-sentence synopsis summarizing the multi-dimensional evaluation of these {} ideas.",
            ideas.len()
        );
        let summary_response = self
            .provider
            .generate(
                GenerateRequest::new(summary_prompt, self.temperature)
                    .with_system_instruction(SUMMARY_SYSTEM_INSTRUCTION),
            )
            .await?;
        let summary = summary_response.text.trim().to_string();

        Ok(dims
            .into_iter()
            .map(|d| {
                MultiDimScore::from_dimensions(
                    d[0], d[1], d[2], d[3], d[4], d[5], d[6], summary.clone(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[tokio::test]
    async fn evaluates_each_idea_and_computes_weighted_score() {
        let provider = MockProvider::new("synopsis text").with_response(
            "Score each",
            r#"[{"feasibility":8,"innovation":7,"impact":9,"cost_effectiveness":6,"scalability":5,"risk_assessment":6,"timeline":7}]"#,
        );
        let evaluator = ProviderMultiDimEvaluator::new(provider, 0.3);
        let ideas = vec![IdeaText::new("an idea")];
        let scores = evaluator.evaluate_batch(&ideas, "topic", "ctx").await.unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores[0].weighted > 0.0);
        assert_eq!(scores[0].summary, "synopsis text");
    }

    #[tokio::test]
    async fn missing_dimension_falls_back_to_midpoint() {
        let provider = MockProvider::new("synopsis").with_response(
            "Score each",
            r#"[{"feasibility":8}]"#,
        );
        let evaluator = ProviderMultiDimEvaluator::new(provider, 0.3);
        let ideas = vec![IdeaText::new("an idea")];
        let scores = evaluator.evaluate_batch(&ideas, "topic", "ctx").await.unwrap();
        assert_eq!(scores[0].innovation, 5.0);
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_a_call() {
        let provider = MockProvider::new("should not be used");
        let evaluator = ProviderMultiDimEvaluator::new(provider, 0.3);
        let scores = evaluator.evaluate_batch(&[], "topic", "ctx").await.unwrap();
        assert!(scores.is_empty());
    }
}
