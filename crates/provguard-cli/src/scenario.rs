//! Simulation scenarios — scripted provider outcomes.
//!
//! A scenario file is JSON:
//!
//! ```json
//! {
//!   "providers": ["openai", "anthropic"],
//!   "steps": [
//!     { "provider": "openai", "latencyMs": 320, "score": 0.9 },
//!     { "provider": "openai", "success": false, "reason": "timeout" },
//!     { "strategy": "RoundRobin", "reason": "load spike", "advanceSecs": 5 }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use provguard_core::bus::{BusEvent, ProviderFailure, ProviderSuccess, StrategyChange};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scenario {
    /// Candidate order; used when the config names none.
    pub providers: Vec<String>,
    pub steps: Vec<Step>,
}

/// One scripted event. A step with `strategy` is a strategy change;
/// otherwise it is an outcome for `provider`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Step {
    pub provider: Option<String>,
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub reason: Option<String>,
    pub score: Option<f64>,
    pub strategy: Option<String>,
    /// Simulated seconds elapsed before this step.
    pub advance_secs: i64,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            provider: None,
            success: true,
            latency_ms: None,
            reason: None,
            score: None,
            strategy: None,
            advance_secs: 1,
        }
    }
}

impl Step {
    fn ok(provider: &str, latency_ms: f64, score: f64) -> Self {
        Self {
            provider: Some(provider.to_string()),
            latency_ms: Some(latency_ms),
            score: Some(score),
            ..Self::default()
        }
    }

    fn failed(provider: &str, reason: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            success: false,
            reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// The bus event this step publishes at `at`.
    pub fn to_event(&self, at: DateTime<Utc>) -> Result<BusEvent> {
        if let Some(strategy) = &self.strategy {
            return Ok(BusEvent::StrategyChange(StrategyChange {
                strategy_name: strategy.clone(),
                reason: self.reason.clone().unwrap_or_default(),
                timestamp: at,
                provider_id: self.provider.clone(),
                replayed: false,
            }));
        }

        let Some(provider) = self.provider.as_deref() else {
            bail!("scenario step needs either `provider` or `strategy`");
        };
        let event = if self.success {
            let mut success = ProviderSuccess::new(provider, at);
            success.latency_ms = self.latency_ms;
            success.score = self.score;
            BusEvent::ProviderSuccess(success)
        } else {
            let reason = self.reason.as_deref().unwrap_or("unknown error");
            let mut failure = ProviderFailure::new(provider, reason, at);
            failure.latency_ms = self.latency_ms;
            BusEvent::ProviderFailure(failure)
        };
        Ok(event)
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid scenario JSON in {}", path.display()))
    }

    /// Three providers; `openai` slows down, then fails five times in a row.
    pub fn degraded_provider() -> Self {
        let mut steps = vec![
            Step::ok("openai", 320.0, 0.92),
            Step::ok("anthropic", 410.0, 0.88),
            Step::ok("groq", 180.0, 0.81),
            Step::ok("openai", 650.0, 0.85),
            Step::ok("openai", 720.0, 0.8),
            Step::ok("openai", 910.0, 0.74),
            Step {
                strategy: Some("RoundRobin".to_string()),
                reason: Some("latency above budget".to_string()),
                ..Step::default()
            },
        ];
        steps.extend((0..5).map(|i| {
            Step::failed("openai", if i % 2 == 0 { "timeout" } else { "503 service unavailable" })
        }));

        Self {
            providers: vec!["openai".into(), "anthropic".into(), "groq".into()],
            steps,
        }
    }
}
