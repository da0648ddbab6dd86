//! Run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTypeOption {
    Full,
    Causal,
    Constraints,
    Contradiction,
    Implications,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperaturePolicyOption {
    Preset(String),
    Base(f64),
}

impl Default for TemperaturePolicyOption {
    fn default() -> Self {
        TemperaturePolicyOption::Preset("balanced".to_string())
    }
}

/// Mirrors spec.md §3's `WorkflowOptions` field-for-field. Validated once, at
/// construction, so the orchestrator never has to re-check bounds mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOptions {
    pub num_top_candidates: usize,
    pub enable_novelty_filter: bool,
    pub novelty_similarity_threshold: f64,
    pub temperature_policy: TemperaturePolicyOption,
    pub enhanced_reasoning: bool,
    pub multi_dimensional: bool,
    pub logical_inference: bool,
    pub analysis_type: AnalysisTypeOption,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub max_concurrent_agents: usize,
    pub cache_enabled: bool,
    /// Open Question resolution (DESIGN.md): defaults to 0.0, a permissive
    /// no-op gate, matching spec.md §9's stated original behavior.
    pub logical_inference_confidence_threshold: f64,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            num_top_candidates: 3,
            enable_novelty_filter: true,
            novelty_similarity_threshold: 0.8,
            temperature_policy: TemperaturePolicyOption::default(),
            enhanced_reasoning: true,
            multi_dimensional: true,
            logical_inference: false,
            analysis_type: AnalysisTypeOption::Full,
            timeout: Duration::from_secs(600),
            max_concurrent_agents: 10,
            cache_enabled: false,
            logical_inference_confidence_threshold: 0.0,
        }
    }
}

impl WorkflowOptions {
    /// Validates bounds from spec.md §3/§6 and returns a `ConfigurationError`
    /// before any provider call is made.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !(1..=5).contains(&self.num_top_candidates) {
            return Err(WorkflowError::Configuration(
                "numTopCandidates must be in [1,5]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.novelty_similarity_threshold) {
            return Err(WorkflowError::Configuration(
                "noveltySimilarityThreshold must be in [0,1]".to_string(),
            ));
        }
        if !(1..=64).contains(&self.max_concurrent_agents) {
            return Err(WorkflowError::Configuration(
                "maxConcurrentAgents must be in [1,64]".to_string(),
            ));
        }
        if self.timeout > Duration::from_secs(3600) {
            return Err(WorkflowError::Configuration(
                "timeout must not exceed 1 hour".to_string(),
            ));
        }
        if let TemperaturePolicyOption::Base(base) = &self.temperature_policy {
            if !(0.0..=1.0).contains(base) {
                return Err(WorkflowError::Configuration(
                    "base temperature must be in [0,1]".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        WorkflowOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_top_k() {
        let mut opts = WorkflowOptions::default();
        opts.num_top_candidates = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_timeout_over_one_hour() {
        let mut opts = WorkflowOptions::default();
        opts.timeout = Duration::from_secs(3601);
        assert!(opts.validate().is_err());
    }
}
