//! Planner and model-collaborator settings.
//!
//! Both structs deserialize from the `[planner]` and `[model]` sections of
//! the CLI config file; every field has a default so partial sections work.

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::model::Effort;

/// Bounds applied while validating and ingesting plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Task estimates below this are raised to it.
    pub min_effort_hours: f64,
    /// Task estimates above this are clamped to it.
    pub max_effort_hours: f64,
    /// Largest accepted timeframe, in days.
    pub max_days: i64,
    /// Largest accepted team size.
    pub max_team_size: i64,
    /// Re-prompt the model once with the violation list when its output is
    /// rejected. Off by default.
    pub repair_retry: bool,
    /// Bound on each model call.
    pub model_timeout_secs: u64,
    /// Reasoning effort requested from the model.
    pub effort: Effort,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_effort_hours: 1.0,
            max_effort_hours: 40.0,
            max_days: 365,
            max_team_size: 20,
            repair_retry: false,
            model_timeout_secs: 120,
            effort: Effort::Low,
        }
    }
}

impl PlannerConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn effort_limits(&self) -> EffortLimits {
        EffortLimits {
            min_hours: self.min_effort_hours,
            max_hours: self.max_effort_hours,
        }
    }

    /// Reject settings that would make every plan invalid or every call time
    /// out immediately.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_effort_hours.is_finite() && self.min_effort_hours > 0.0) {
            bail!("planner.min_effort_hours must be a positive number");
        }
        if !(self.max_effort_hours.is_finite() && self.max_effort_hours >= self.min_effort_hours) {
            bail!("planner.max_effort_hours must be >= planner.min_effort_hours");
        }
        if self.max_days < 1 {
            bail!("planner.max_days must be at least 1");
        }
        if self.max_team_size < 1 {
            bail!("planner.max_team_size must be at least 1");
        }
        if self.model_timeout_secs == 0 {
            bail!("planner.model_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

/// Inclusive range task estimates are clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffortLimits {
    pub min_hours: f64,
    pub max_hours: f64,
}

impl Default for EffortLimits {
    fn default() -> Self {
        PlannerConfig::default().effort_limits()
    }
}

/// Where and how to reach the model collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API root, without the trailing `/responses`.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-5".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
        }
    }
}
