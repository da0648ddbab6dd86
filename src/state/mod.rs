//! Data model for the idea-refinement workflow.
//!
//! All entities are plain serde-derived records, constructed fresh per `Run`.
//! Builders clamp invariant-bearing fields on build rather than trusting
//! callers (scores, confidences, similarities are all user/provider-facing
//! and must stay in their documented ranges regardless of how they arrive).

mod options;
mod types;

pub use options::{AnalysisTypeOption, TemperaturePolicyOption, WorkflowOptions};
pub use types::{
    CandidateResult, EvaluatedIdea, FailureKind, FailureNote, FailureStage, IdeaText,
    InferenceResult, MultiDimScore,
};
