//! Phase-level batched provider calls (spec.md §4.7). Each op makes exactly
//! one outbound provider call for a whole batch of items, requests a
//! structured JSON response, and returns results aligned 1:1 to the inputs.
//!
//! Grounded on `ensemble/coordinator.rs::query_model`'s single-call-then-parse
//! shape and `modes/deepthink.rs`'s markdown-fence-tolerant JSON-array parsing.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BatchError;
use crate::provider::{GenerateRequest, ModelProvider};
use crate::state::IdeaText;

pub const LANGUAGE_CONSISTENCY_INSTRUCTION: &str =
    "Please respond in the same language as this prompt.\n\n";

pub const IDEA_GENERATOR_SYSTEM_INSTRUCTION: &str = "You are an expert idea generator and improver. Given a topic and some context, generate a list of diverse and creative ideas.\n\nCRITICAL OUTPUT REQUIREMENTS:\n- Start directly with the content requested\n- Do NOT include meta-commentary like \"Here's the improved version\", \"Enhanced concept:\", etc.\n- Do NOT reference the original idea or improvement process\n- Write as if this is the first and only version\n- Be concise and direct\n- Always respond in the same language as the input provided.";

pub const CRITIC_SYSTEM_INSTRUCTION: &str = "You are an expert critic. Evaluate the given ideas based on the provided criteria and context. Provide constructive feedback and identify potential weaknesses. Always respond in the same language as the input provided.";

pub const ADVOCATE_SYSTEM_INSTRUCTION: &str = "You are a persuasive advocate. Given an idea, its evaluation, and context, build a strong case for the idea. List key strengths and benefits as bullet points. Be direct and concise. Focus on specific advantages and opportunities. Always respond in the same language as the input provided.";

pub const SKEPTIC_SYSTEM_INSTRUCTION: &str = "You are a devil's advocate. Given an idea, the arguments for it, and context, critically analyze the idea. List specific concerns, risks, and flaws as bullet points. Be direct and critical. Focus on concrete problems and potential failures. Always respond in the same language as the input provided.";

/// The fixed advocate fallback text substituted on a timeout/failure
/// (spec.md §4.10 Advocate/Skeptic fan-out, §8 scenario 4).
pub const ADVOCATE_FALLBACK: &str = "Advocacy unavailable for this idea.";
pub const SKEPTIC_FALLBACK: &str = "Skepticism unavailable for this idea.";

#[derive(Debug, Clone)]
pub struct IdeaEvaluation {
    pub score: f64,
    pub comment: String,
    /// `true` when the provider returned no record for this idea and the
    /// parser padded it rather than parsing real provider output.
    pub is_placeholder: bool,
}

#[derive(Debug, Clone)]
pub struct ImproveResult {
    pub improved_idea: String,
}

#[async_trait]
pub trait BatchAgentOps: Send + Sync {
    async fn generate_ideas(
        &self,
        topic: &str,
        context: &str,
        n: usize,
        temperature: f64,
    ) -> Result<Vec<IdeaText>, BatchError>;

    async fn evaluate_batch(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
        temperature: f64,
    ) -> Result<Vec<IdeaEvaluation>, BatchError>;

    async fn advocate_batch(
        &self,
        pairs: &[(IdeaText, String)],
        topic: &str,
        context: &str,
        temperature: f64,
    ) -> Result<Vec<String>, BatchError>;

    async fn skepticize_batch(
        &self,
        pairs: &[(IdeaText, String)],
        topic: &str,
        context: &str,
        temperature: f64,
    ) -> Result<Vec<String>, BatchError>;

    async fn improve_batch(
        &self,
        quads: &[(IdeaText, String, String, String)],
        context: &str,
        temperature: f64,
    ) -> Result<Vec<ImproveResult>, BatchError>;
}

pub struct ProviderBatchOps<P: ModelProvider> {
    provider: P,
}

impl<P: ModelProvider> ProviderBatchOps<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedIdea {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    key_features: Vec<String>,
}

impl GeneratedIdea {
    fn format(&self) -> String {
        let mut out = String::new();
        if !self.title.is_empty() {
            out.push_str(&self.title);
        }
        if !self.description.is_empty() {
            if !out.is_empty() {
                out.push_str(": ");
            }
            out.push_str(&self.description);
        }
        if !self.key_features.is_empty() {
            out.push_str(" (");
            out.push_str(&self.key_features.join(", "));
            out.push(')');
        }
        out
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
    if end < start {
        return None;
    }
    serde_json::from_str::<Vec<Value>>(&trimmed[start..=end]).ok()
}

#[async_trait]
impl<P: ModelProvider> BatchAgentOps for ProviderBatchOps<P> {
    async fn generate_ideas(
        &self,
        topic: &str,
        context: &str,
        n: usize,
        temperature: f64,
    ) -> Result<Vec<IdeaText>, BatchError> {
        let prompt = format!(
            "{LANGUAGE_CONSISTENCY_INSTRUCTION}Topic: {topic}\nContext: {context}\n\nGenerate exactly {n} diverse, creative ideas. Respond as a JSON array of {n} objects, each with fields \"title\", \"description\", and \"key_features\" (array of strings)."
        );
        let request = GenerateRequest::new(prompt, temperature)
            .with_system_instruction(IDEA_GENERATOR_SYSTEM_INSTRUCTION);
        let response = self.provider.generate(request).await?;

        let items = parse_json_array(&response.text).unwrap_or_default();
        let ideas: Vec<IdeaText> = items
            .iter()
            .filter_map(|item| serde_json::from_value::<GeneratedIdea>(item.clone()).ok())
            .map(|idea| IdeaText::new(idea.format()))
            .filter(|idea| !idea.is_empty())
            .collect();

        Ok(ideas)
    }

    async fn evaluate_batch(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
        temperature: f64,
    ) -> Result<Vec<IdeaEvaluation>, BatchError> {
        let listed = ideas
            .iter()
            .enumerate()
            .map(|(i, idea)| format!("{}. {}", i + 1, idea.display()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{LANGUAGE_CONSISTENCY_INSTRUCTION}Topic: {topic}\nContext: {context}\n\nEvaluate each of the following {} ideas on a 0-10 scale. Respond as a JSON array of {{\"score\": <int>, \"comment\": <text>}} aligned to the input order.\n\n{listed}",
            ideas.len()
        );
        let request = GenerateRequest::new(prompt, temperature)
            .with_system_instruction(CRITIC_SYSTEM_INSTRUCTION);
        let response = self.provider.generate(request).await?;

        let records = crate::parsing::parse_records(&response.text, ideas.len());
        Ok(records
            .into_iter()
            .map(|r| IdeaEvaluation { score: r.score, comment: r.comment, is_placeholder: r.is_placeholder })
            .collect())
    }

    async fn advocate_batch(
        &self,
        pairs: &[(IdeaText, String)],
        topic: &str,
        context: &str,
        temperature: f64,
    ) -> Result<Vec<String>, BatchError> {
        let listed = pairs
            .iter()
            .enumerate()
            .map(|(i, (idea, evaluation))| {
                format!("{}. Idea: {}\n   Evaluation: {}", i + 1, idea.display(), evaluation)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{LANGUAGE_CONSISTENCY_INSTRUCTION}Topic: {topic}\nContext: {context}\n\nFor each idea below, build the strongest case for it. Respond as a JSON array of strings, one per idea, aligned to the input order.\n\n{listed}"
        );
        let request = GenerateRequest::new(prompt, temperature)
            .with_system_instruction(ADVOCATE_SYSTEM_INSTRUCTION);
        let response = self.provider.generate(request).await?;

        Ok(align_string_array(&response.text, pairs.len(), ADVOCATE_FALLBACK))
    }

    async fn skepticize_batch(
        &self,
        pairs: &[(IdeaText, String)],
        topic: &str,
        context: &str,
        temperature: f64,
    ) -> Result<Vec<String>, BatchError> {
        let listed = pairs
            .iter()
            .enumerate()
            .map(|(i, (idea, advocacy))| {
                format!("{}. Idea: {}\n   Advocacy: {}", i + 1, idea.display(), advocacy)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{LANGUAGE_CONSISTENCY_INSTRUCTION}Topic: {topic}\nContext: {context}\n\nFor each idea below, critically analyze it. Respond as a JSON array of strings, one per idea, aligned to the input order.\n\n{listed}"
        );
        let request = GenerateRequest::new(prompt, temperature)
            .with_system_instruction(SKEPTIC_SYSTEM_INSTRUCTION);
        let response = self.provider.generate(request).await?;

        Ok(align_string_array(&response.text, pairs.len(), SKEPTIC_FALLBACK))
    }

    async fn improve_batch(
        &self,
        quads: &[(IdeaText, String, String, String)],
        context: &str,
        temperature: f64,
    ) -> Result<Vec<ImproveResult>, BatchError> {
        let listed = quads
            .iter()
            .enumerate()
            .map(|(i, (idea, critique, advocacy, skepticism))| {
                format!(
                    "{}. Idea: {}\n   Critique: {}\n   Advocacy: {}\n   Skepticism: {}",
                    i + 1,
                    idea.display(),
                    critique,
                    advocacy,
                    skepticism
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{LANGUAGE_CONSISTENCY_INSTRUCTION}Context: {context}\n\nUsing the critique, advocacy, and skepticism for each idea below, produce an improved version of each idea. Respond as a JSON array of strings, one per idea, aligned to the input order.\n\n{listed}"
        );
        let request = GenerateRequest::new(prompt, temperature)
            .with_system_instruction(IDEA_GENERATOR_SYSTEM_INSTRUCTION);
        let response = self.provider.generate(request).await?;

        let items = parse_json_array(&response.text).unwrap_or_default();
        let mut results: Vec<ImproveResult> = items
            .iter()
            .map(|v| ImproveResult {
                improved_idea: v.as_str().unwrap_or_default().trim().to_string(),
            })
            .collect();
        results.truncate(quads.len());
        while results.len() < quads.len() {
            results.push(ImproveResult { improved_idea: String::new() });
        }

        // Blank outputs fall back to the original idea (spec.md §4.7).
        for (result, (idea, ..)) in results.iter_mut().zip(quads.iter()) {
            if result.improved_idea.is_empty() {
                result.improved_idea = idea.display().to_string();
            }
        }

        Ok(results)
    }
}

fn align_string_array(text: &str, expected: usize, fallback: &str) -> Vec<String> {
    let items = parse_json_array(text).unwrap_or_default();
    let mut out: Vec<String> = items
        .iter()
        .map(|v| v.as_str().unwrap_or_default().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.truncate(expected);
    while out.len() < expected {
        out.push(fallback.to_string());
    }
    out
}
