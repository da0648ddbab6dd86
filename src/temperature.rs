//! Maps pipeline phase to sampling temperature.
//!
//! Presets and the base-temperature scaling formula are ported verbatim from
//! `TemperatureManager` / `TemperatureConfig` (mad_spark_multiagent/temperature_control.py).

use crate::error::WorkflowError;
use crate::state::TemperaturePolicyOption;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureConfig {
    pub base_temperature: f64,
    pub idea_generation: f64,
    pub evaluation: f64,
    pub advocacy: f64,
    pub skepticism: f64,
}

impl TemperatureConfig {
    const fn new(
        base_temperature: f64,
        idea_generation: f64,
        evaluation: f64,
        advocacy: f64,
        skepticism: f64,
    ) -> Self {
        Self { base_temperature, idea_generation, evaluation, advocacy, skepticism }
    }
}

pub const CONSERVATIVE: TemperatureConfig = TemperatureConfig::new(0.3, 0.5, 0.2, 0.3, 0.3);
pub const BALANCED: TemperatureConfig = TemperatureConfig::new(0.7, 0.8, 0.3, 0.5, 0.5);
pub const CREATIVE: TemperatureConfig = TemperatureConfig::new(0.9, 1.0, 0.4, 0.7, 0.7);
pub const WILD: TemperatureConfig = TemperatureConfig::new(1.0, 1.0, 0.5, 0.9, 0.9);

#[derive(Debug, Clone, Copy)]
pub enum Stage {
    IdeaGeneration,
    Evaluation,
    Advocacy,
    Skepticism,
}

/// Resolved temperature table for one Run.
pub struct TemperaturePolicy {
    config: TemperatureConfig,
}

impl TemperaturePolicy {
    pub fn from_preset(name: &str) -> Result<Self, WorkflowError> {
        let config = match name {
            "conservative" => CONSERVATIVE,
            "balanced" => BALANCED,
            "creative" => CREATIVE,
            "wild" => WILD,
            other => {
                return Err(WorkflowError::Configuration(format!(
                    "unknown temperature preset '{other}'"
                )))
            }
        };
        Ok(Self { config })
    }

    /// `idea_generation = min(1.0, base*1.3)`, `evaluation = max(0.1, base*0.4)`,
    /// `advocacy = skepticism = base`. All clamped to `[0.0, 1.0]`.
    pub fn from_base_temperature(base: f64) -> Self {
        let base = base.clamp(0.0, 1.0);
        Self {
            config: TemperatureConfig::new(
                base,
                (base * 1.3).min(1.0),
                (base * 0.4).max(0.1),
                base,
                base,
            ),
        }
    }

    pub fn from_option(option: &TemperaturePolicyOption) -> Result<Self, WorkflowError> {
        match option {
            TemperaturePolicyOption::Preset(name) => Self::from_preset(name),
            TemperaturePolicyOption::Base(base) => Ok(Self::from_base_temperature(*base)),
        }
    }

    pub fn temperature_for(&self, stage: Stage) -> f64 {
        match stage {
            Stage::IdeaGeneration => self.config.idea_generation,
            Stage::Evaluation => self.config.evaluation,
            Stage::Advocacy => self.config.advocacy,
            Stage::Skepticism => self.config.skepticism,
        }
    }

    pub fn config(&self) -> TemperatureConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_balanced_matches_original_defaults() {
        let policy = TemperaturePolicy::from_preset("balanced").unwrap();
        assert_eq!(policy.temperature_for(Stage::IdeaGeneration), 0.8);
        assert_eq!(policy.temperature_for(Stage::Evaluation), 0.3);
    }

    #[test]
    fn base_temperature_scaling_formula() {
        let policy = TemperaturePolicy::from_base_temperature(0.5);
        assert!((policy.temperature_for(Stage::IdeaGeneration) - 0.65).abs() < 1e-9);
        assert!((policy.temperature_for(Stage::Evaluation) - 0.2).abs() < 1e-9);
        assert_eq!(policy.temperature_for(Stage::Advocacy), 0.5);
    }

    #[test]
    fn base_temperature_scaling_clamps_at_extremes() {
        let policy = TemperaturePolicy::from_base_temperature(1.0);
        assert_eq!(policy.temperature_for(Stage::IdeaGeneration), 1.0);

        let policy = TemperaturePolicy::from_base_temperature(0.0);
        assert_eq!(policy.temperature_for(Stage::Evaluation), 0.1);
    }

    #[test]
    fn unknown_preset_is_a_configuration_error() {
        assert!(TemperaturePolicy::from_preset("nonexistent").is_err());
    }
}
