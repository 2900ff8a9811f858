//! Pluggable decision points of the control loop.
//!
//! [`ConfidenceScorer`] turns a warning plus the audit context into a value
//! in `[0, 1]`; [`FallbackSelector`] picks the provider to fail over to.

use provguard_core::types::{AuditEntry, ProviderId, WarningEntry, WarningLevel};
use provguard_core::Error;

use crate::blacklist::Blacklist;
use crate::predictive::WINDOW_SIZE;

/// Inputs available to a scorer on one tick.
#[derive(Clone, Copy, Debug)]
pub struct ScoringContext<'a> {
    /// Newest warning about `entry.selected_provider`.
    pub warning: &'a WarningEntry,
    /// Most recent outcome entry in the trail.
    pub entry: &'a AuditEntry,
    /// Live outcome entries, oldest first.
    pub history: &'a [&'a AuditEntry],
}

pub trait ConfidenceScorer: Send + Sync {
    /// Confidence that failing over away from `ctx.entry.selected_provider`
    /// is warranted. Values outside `[0, 1]` are clamped by the caller.
    fn score(&self, ctx: &ScoringContext<'_>) -> anyhow::Result<f64>;
}

pub trait FallbackSelector: Send + Sync {
    /// Pick a replacement for `failing`, or `None` if no candidate qualifies.
    fn select(&self, failing: &str, entry: &AuditEntry, blacklist: &Blacklist) -> Option<ProviderId>;
}

// ─────────────────────────────────────────────
// WeightedConfidence
// ─────────────────────────────────────────────

/// `0.5 * severity + 0.3 * trend + 0.2 * current`, where
///
/// - severity is 1.0 / 0.75 / 0.5 for critical / high / moderate warnings
/// - trend is the failure ratio of the warned provider's last window
/// - current is 1.0 when the latest entry is a failure of the warned provider
#[derive(Clone, Copy, Debug)]
pub struct WeightedConfidence {
    pub window_size: usize,
}

impl Default for WeightedConfidence {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
        }
    }
}

const SEVERITY_WEIGHT: f64 = 0.5;
const TREND_WEIGHT: f64 = 0.3;
const CURRENT_WEIGHT: f64 = 0.2;

fn severity(level: WarningLevel) -> f64 {
    match level {
        WarningLevel::Critical => 1.0,
        WarningLevel::High => 0.75,
        WarningLevel::Moderate => 0.5,
    }
}

impl WeightedConfidence {
    fn trend(&self, ctx: &ScoringContext<'_>) -> f64 {
        let outcomes: Vec<bool> = ctx
            .history
            .iter()
            .rev()
            .filter(|e| e.selected_provider == ctx.warning.provider)
            .take(self.window_size.max(1))
            .map(|e| e.success)
            .collect();
        if outcomes.is_empty() {
            return 0.0;
        }
        outcomes.iter().filter(|ok| !**ok).count() as f64 / outcomes.len() as f64
    }
}

impl ConfidenceScorer for WeightedConfidence {
    fn score(&self, ctx: &ScoringContext<'_>) -> anyhow::Result<f64> {
        let current = if ctx.entry.selected_provider == ctx.warning.provider && !ctx.entry.success {
            1.0
        } else {
            0.0
        };
        let confidence = SEVERITY_WEIGHT * severity(ctx.warning.level)
            + TREND_WEIGHT * self.trend(ctx)
            + CURRENT_WEIGHT * current;

        if !confidence.is_finite() {
            return Err(Error::Scoring(format!("non-finite confidence {confidence}")).into());
        }
        Ok(confidence.clamp(0.0, 1.0))
    }
}

// ─────────────────────────────────────────────
// HighestScoreSelector
// ─────────────────────────────────────────────

/// Highest-ranked usable candidate of the entry.
///
/// A candidate is usable when it is not excluded, not blocked, and not the
/// failing provider. Rank is `score`, then `stats.success_rate`, then 0;
/// ties keep candidate order.
#[derive(Clone, Copy, Debug, Default)]
pub struct HighestScoreSelector;

impl FallbackSelector for HighestScoreSelector {
    fn select(&self, failing: &str, entry: &AuditEntry, blacklist: &Blacklist) -> Option<ProviderId> {
        let mut best: Option<(f64, &str)> = None;
        for c in &entry.provider_candidates {
            if c.excluded || c.id == failing || blacklist.get(&c.id).is_some() {
                continue;
            }
            let rank = c
                .score
                .or_else(|| c.stats.as_ref().map(|s| s.success_rate))
                .unwrap_or(0.0);
            if best.map_or(true, |(top, _)| rank > top) {
                best = Some((rank, c.id.as_str()));
            }
        }
        best.map(|(_, id)| id.to_string())
    }
}
