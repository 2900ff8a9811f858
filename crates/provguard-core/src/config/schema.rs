//! Configuration schema — health, analyzer, and routing parameters.
//!
//! Hierarchy: `Config` → `HealthConfig`, `AnalyzerConfig`, `RoutingConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.provguard/config.json` + env vars.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub health: HealthConfig,
    pub analyzer: AnalyzerConfig,
    pub routing: RoutingConfig,
}

// ─────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Blacklist, mitigation loop, and audit trail settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    /// Default time a blocked provider stays blocked.
    pub blacklist_ttl_secs: u64,
    /// Period of the expired-entry sweep.
    pub sweep_interval_secs: u64,
    /// Period of the auto-mitigation tick.
    pub mitigation_interval_secs: u64,
    /// Confidence above which the loop fails a provider over (0.0 – 1.0).
    pub confidence_threshold: f64,
    /// Maximum audit entries kept; 0 keeps everything.
    pub history_limit: usize,
    /// Whether the mitigation loop ignores replay-tagged entries.
    pub ignore_replayed: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            blacklist_ttl_secs: 120,
            sweep_interval_secs: 1,
            mitigation_interval_secs: 5,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            history_limit: 0,
            ignore_replayed: true,
        }
    }
}

impl HealthConfig {
    pub fn blacklist_ttl(&self) -> Duration {
        Duration::from_secs(self.blacklist_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn mitigation_interval(&self) -> Duration {
        Duration::from_secs(self.mitigation_interval_secs.max(1))
    }

    /// `confidence_threshold` clamped to `[0, 1]`. Non-finite values fall
    /// back to the default.
    pub fn effective_threshold(&self) -> f64 {
        if self.confidence_threshold.is_finite() {
            self.confidence_threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_CONFIDENCE_THRESHOLD
        }
    }
}

// ─────────────────────────────────────────────
// Analyzer
// ─────────────────────────────────────────────

/// Thresholds for the predictive warning analyzer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    /// Entries per provider considered by each analysis.
    pub window_size: usize,
    /// Latency above which an entry counts as slow.
    pub latency_threshold_ms: f64,
    /// Mean slow latency above which the warning is critical.
    pub latency_critical_ms: f64,
    /// Slow entries needed in the window before warning.
    pub min_latency_violations: usize,
    /// Success rate below which the analyzer warns.
    pub success_rate_threshold: f64,
    /// Success rate below which the warning is critical.
    pub success_rate_critical: f64,
    /// Consecutive trailing failures needed before warning.
    pub failure_streak_threshold: usize,
    /// Streak length at which the warning is critical.
    pub failure_streak_critical: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            latency_threshold_ms: 500.0,
            latency_critical_ms: 1000.0,
            min_latency_violations: 3,
            success_rate_threshold: 0.75,
            success_rate_critical: 0.5,
            failure_streak_threshold: 3,
            failure_streak_critical: 5,
        }
    }
}

// ─────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────

/// What the host's router looks like, as far as auditing is concerned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Name of the active routing strategy until a change event says otherwise.
    pub strategy: String,
    /// Candidate providers in preference order.
    pub providers: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: "adaptive".to_string(),
            providers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.health.blacklist_ttl(), Duration::from_secs(120));
        assert_eq!(config.health.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.health.mitigation_interval(), Duration::from_secs(5));
        assert_eq!(config.health.confidence_threshold, 0.8);
        assert_eq!(config.analyzer.window_size, 10);
        assert_eq!(config.routing.strategy, "adaptive");
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let health = HealthConfig {
            sweep_interval_secs: 0,
            mitigation_interval_secs: 0,
            ..HealthConfig::default()
        };
        assert_eq!(health.sweep_interval(), Duration::from_secs(1));
        assert_eq!(health.mitigation_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_threshold_is_bounded() {
        let with = |t: f64| HealthConfig {
            confidence_threshold: t,
            ..HealthConfig::default()
        };
        assert_eq!(with(0.65).effective_threshold(), 0.65);
        assert_eq!(with(1.7).effective_threshold(), 1.0);
        assert_eq!(with(-0.2).effective_threshold(), 0.0);
        assert_eq!(with(f64::NAN).effective_threshold(), DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(with(f64::INFINITY).effective_threshold(), DEFAULT_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "health": { "blacklistTtlSecs": 30 } }"#).unwrap();
        assert_eq!(config.health.blacklist_ttl_secs, 30);
        assert_eq!(config.health.mitigation_interval_secs, 5);
        assert_eq!(config.analyzer.failure_streak_critical, 5);
    }
}
