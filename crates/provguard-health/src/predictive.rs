//! Predictive warning analyzer — a pure function over the audit trail.
//!
//! Entries are grouped by selected provider and the last `window_size` of
//! each group are checked three independent ways: slow calls, low success
//! rate, and a trailing failure streak. A provider can trip any combination
//! of the three in one pass.

use std::collections::HashMap;

use provguard_core::config::AnalyzerConfig;
use provguard_core::types::{AuditEntry, WarningEntry, WarningLevel, WarningSignal};

/// Entries per provider considered by default.
pub const WINDOW_SIZE: usize = 10;

/// Analyze with the default thresholds.
pub fn analyze<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<WarningEntry> {
    analyze_with(entries, &AnalyzerConfig::default())
}

/// Analyze `entries` (oldest first) and return every warning raised.
///
/// Warnings are ordered by the timestamp of the newest entry in their
/// provider's window, so the last warning belongs to the most recently
/// active degraded provider.
pub fn analyze_with<'a>(
    entries: impl IntoIterator<Item = &'a AuditEntry>,
    config: &AnalyzerConfig,
) -> Vec<WarningEntry> {
    let mut warnings: Vec<WarningEntry> = group_by_provider(entries)
        .into_iter()
        .flat_map(|mut group| {
            group.sort_by_key(|e| e.timestamp);
            let start = group.len().saturating_sub(config.window_size.max(1));
            analyze_window(&group[start..], config)
        })
        .collect();

    warnings.sort_by_key(|w| w.timestamp);
    warnings
}

/// Group entries per selected provider, in order of first appearance.
fn group_by_provider<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<Vec<&'a AuditEntry>> {
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&'a AuditEntry>> = Vec::new();

    for entry in entries {
        let slot = *index.entry(entry.selected_provider.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(entry);
    }
    groups
}

/// Run all three checks over one provider's window (chronological, non-empty).
fn analyze_window(window: &[&AuditEntry], config: &AnalyzerConfig) -> Vec<WarningEntry> {
    let Some(newest) = window.last() else {
        return Vec::new();
    };
    let warn = |signal, value, threshold, level| WarningEntry {
        provider: newest.selected_provider.clone(),
        signal,
        value,
        threshold,
        level,
        timestamp: newest.timestamp,
    };

    let mut warnings = Vec::new();

    // Latency: mean over the slow entries only.
    let slow: Vec<f64> = window
        .iter()
        .map(|e| e.latency_ms)
        .filter(|&ms| ms > config.latency_threshold_ms)
        .collect();
    if !slow.is_empty() && slow.len() >= config.min_latency_violations {
        let mean = slow.iter().sum::<f64>() / slow.len() as f64;
        let level = if mean > config.latency_critical_ms {
            WarningLevel::Critical
        } else {
            WarningLevel::High
        };
        warnings.push(warn(WarningSignal::Latency, mean, config.latency_threshold_ms, level));
    }

    // Success rate over the whole window.
    let successes = window.iter().filter(|e| e.success).count();
    let rate = successes as f64 / window.len() as f64;
    if rate < config.success_rate_threshold {
        let level = if rate < config.success_rate_critical {
            WarningLevel::Critical
        } else {
            WarningLevel::Moderate
        };
        warnings.push(warn(WarningSignal::SuccessRate, rate, config.success_rate_threshold, level));
    }

    // Trailing failure streak.
    let streak = window.iter().rev().take_while(|e| !e.success).count();
    if streak > 0 && streak >= config.failure_streak_threshold {
        let level = if streak >= config.failure_streak_critical {
            WarningLevel::Critical
        } else {
            WarningLevel::High
        };
        warnings.push(warn(
            WarningSignal::FailureStreak,
            streak as f64,
            config.failure_streak_threshold as f64,
            level,
        ));
    }

    warnings
}
