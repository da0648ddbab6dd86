//! Multi-agent idea generation and refinement workflow orchestrator.
//!
//! Given a topic and a context (constraints), drives four cooperating
//! language-model roles — IdeaGenerator, Critic, Advocate, Skeptic — through
//! a fixed phase sequence that produces, evaluates, defends, challenges,
//! improves, and re-evaluates a small set of candidate ideas.
//!
//! The core is [`orchestrator::WorkflowOrchestrator`]; everything else in
//! this crate is a capability it depends on (`provider`, `cache`, `progress`)
//! or a pure helper it calls (`novelty`, `temperature`, `parsing`).

pub mod batch;
pub mod cache;
pub mod error;
pub mod evaluator;
pub mod inference;
pub mod novelty;
pub mod orchestrator;
pub mod parsing;
pub mod progress;
pub mod provider;
pub mod state;
pub mod temperature;

pub use batch::{BatchAgentOps, ProviderBatchOps};
pub use cache::{Cache, InMemoryCache};
pub use error::{BatchError, ProviderError, WorkflowError};
pub use evaluator::{MultiDimensionalEvaluator, ProviderMultiDimEvaluator};
pub use inference::{LogicalInferenceEngine, ProviderInferenceEngine};
pub use orchestrator::WorkflowOrchestrator;
pub use progress::{BroadcastProgressSink, NullProgressSink, ProgressSink};
pub use provider::{HttpModelProvider, MockProvider, ModelProvider};
pub use state::{CandidateResult, WorkflowOptions};
