//! Core record types threaded through the orchestrator's phase table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate idea's text. Normalization is cheap and done eagerly so
/// hashing/similarity never re-derive it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdeaText {
    display: String,
    normalized: String,
}

impl IdeaText {
    pub fn new(raw: impl Into<String>) -> Self {
        let display = raw.into();
        let normalized = normalize(&display);
        Self { display, normalized }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

impl std::fmt::Display for IdeaText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display)
    }
}

fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An idea after critique, clamped to the documented score range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedIdea {
    pub text: IdeaText,
    pub score: f64,
    pub critique: String,
    pub multi_dim: Option<MultiDimScore>,
    pub logical: Option<InferenceResult>,
}

impl EvaluatedIdea {
    pub fn new(text: IdeaText, score: f64, critique: impl Into<String>) -> Self {
        Self {
            text,
            score: score.clamp(0.0, 10.0),
            critique: critique.into(),
            multi_dim: None,
            logical: None,
        }
    }

    pub fn missing(text: IdeaText) -> Self {
        Self::new(text, 0.0, "Evaluation missing")
    }

    pub fn with_multi_dim(mut self, multi_dim: MultiDimScore) -> Self {
        self.multi_dim = Some(multi_dim);
        self
    }

    pub fn with_logical(mut self, logical: InferenceResult) -> Self {
        self.logical = Some(logical);
        self
    }
}

/// The fixed per-dimension weight table from the evaluator's weighted mean.
pub const DIMENSION_WEIGHTS: [(&str, f64); 7] = [
    ("feasibility", 0.20),
    ("innovation", 0.15),
    ("impact", 0.20),
    ("cost_effectiveness", 0.15),
    ("scalability", 0.10),
    ("risk_assessment", 0.10),
    ("timeline", 0.10),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiDimScore {
    pub feasibility: f64,
    pub innovation: f64,
    pub impact: f64,
    pub cost_effectiveness: f64,
    pub scalability: f64,
    pub risk_assessment: f64,
    pub timeline: f64,
    pub overall: f64,
    pub weighted: f64,
    pub confidence_interval: f64,
    pub summary: String,
}

impl MultiDimScore {
    /// Builds from the seven raw dimension scores (each clamped to `[1,10]`)
    /// plus the provider-generated summary, computing `overall`, `weighted`,
    /// and `confidence_interval` deterministically.
    pub fn from_dimensions(
        feasibility: f64,
        innovation: f64,
        impact: f64,
        cost_effectiveness: f64,
        scalability: f64,
        risk_assessment: f64,
        timeline: f64,
        summary: impl Into<String>,
    ) -> Self {
        let clamp = |v: f64| v.clamp(1.0, 10.0);
        let dims = [
            clamp(feasibility),
            clamp(innovation),
            clamp(impact),
            clamp(cost_effectiveness),
            clamp(scalability),
            clamp(risk_assessment),
            clamp(timeline),
        ];
        let overall = dims.iter().sum::<f64>() / dims.len() as f64;
        let weighted = dims
            .iter()
            .zip(DIMENSION_WEIGHTS.iter())
            .map(|(score, (_, weight))| score * weight)
            .sum();
        let variance =
            dims.iter().map(|d| (d - overall).powi(2)).sum::<f64>() / dims.len() as f64;
        let confidence_interval = (1.0 - variance / 25.0).max(0.0);

        Self {
            feasibility: dims[0],
            innovation: dims[1],
            impact: dims[2],
            cost_effectiveness: dims[3],
            scalability: dims[4],
            risk_assessment: dims[5],
            timeline: dims[6],
            overall,
            weighted,
            confidence_interval,
            summary: summary.into(),
        }
    }
}

/// One of the five logical-inference analysis types, each with its own
/// optional per-variant fields (only the relevant ones are populated).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "snake_case")]
pub enum InferenceResult {
    Full {
        inference_chain: Vec<String>,
        conclusion: String,
        confidence: f64,
    },
    Causal {
        inference_chain: Vec<String>,
        conclusion: String,
        confidence: f64,
        causal_chain: Vec<String>,
        feedback_loops: Vec<String>,
        root_cause: Option<String>,
    },
    Constraints {
        inference_chain: Vec<String>,
        conclusion: String,
        confidence: f64,
        constraint_satisfaction: std::collections::BTreeMap<String, f64>,
        trade_offs: Vec<String>,
    },
    Contradiction {
        inference_chain: Vec<String>,
        conclusion: String,
        confidence: f64,
        contradictions: Vec<String>,
    },
    Implications {
        inference_chain: Vec<String>,
        conclusion: String,
        confidence: f64,
        implications: Vec<String>,
        second_order_effects: Vec<String>,
        improvements_hint: Option<String>,
    },
}

impl InferenceResult {
    pub fn confidence(&self) -> f64 {
        match self {
            InferenceResult::Full { confidence, .. }
            | InferenceResult::Causal { confidence, .. }
            | InferenceResult::Constraints { confidence, .. }
            | InferenceResult::Contradiction { confidence, .. }
            | InferenceResult::Implications { confidence, .. } => *confidence,
        }
    }

    pub fn conclusion(&self) -> &str {
        match self {
            InferenceResult::Full { conclusion, .. }
            | InferenceResult::Causal { conclusion, .. }
            | InferenceResult::Constraints { conclusion, .. }
            | InferenceResult::Contradiction { conclusion, .. }
            | InferenceResult::Implications { conclusion, .. } => conclusion,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Advocacy,
    Skepticism,
    Improvement,
    ReEvaluation,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureStage::Advocacy => "advocacy",
            FailureStage::Skepticism => "skepticism",
            FailureStage::Improvement => "improvement",
            FailureStage::ReEvaluation => "re-evaluation",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TimeoutError,
    TransientProviderError,
    PermanentProviderError,
    ParseError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureNote {
    pub stage: FailureStage,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureNote {
    pub fn new(stage: FailureStage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self { stage, kind, message: message.into() }
    }
}

/// Final per-idea output record assembled at the end of a Run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub idea: IdeaText,
    pub initial_score: f64,
    pub initial_critique: String,
    pub advocacy: String,
    pub skepticism: String,
    pub improved_idea: IdeaText,
    pub improved_score: f64,
    pub improved_critique: String,
    pub score_delta: f64,
    pub is_meaningful_improvement: bool,
    pub similarity_score: f64,
    pub multi_dim: Option<MultiDimScore>,
    pub improved_multi_dim: Option<MultiDimScore>,
    pub logical: Option<InferenceResult>,
    pub partial_failures: Vec<FailureNote>,
    pub assembled_at: DateTime<Utc>,
}
