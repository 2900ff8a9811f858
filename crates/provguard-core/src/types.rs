//! Shared data model — audit entries, blocked providers, warnings, and
//! mitigation state.
//!
//! All types derive `Serialize`/`Deserialize` with `camelCase` keys so the
//! audit trail can be exported as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::Topic;
use crate::error::Error;

/// Identifier shared by every record that names a provider (e.g. `"openai"`).
pub type ProviderId = String;

// ─────────────────────────────────────────────
// Audit entries
// ─────────────────────────────────────────────

/// Rolling statistics attached to a routing candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStats {
    /// Average latency of successful calls, in milliseconds.
    pub latency_ms: f64,
    /// Share of successful calls, in `[0, 1]`.
    pub success_rate: f64,
}

/// One provider considered by a routing decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCandidate {
    pub id: ProviderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Whether the candidate was excluded (blacklisted) at decision time.
    pub excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CandidateStats>,
}

impl ProviderCandidate {
    /// A candidate with no score and no stats yet.
    pub fn new(id: impl Into<ProviderId>) -> Self {
        Self {
            id: id.into(),
            score: None,
            excluded: false,
            stats: None,
        }
    }
}

/// A named routing condition and whether it held at decision time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCondition {
    pub name: String,
    pub is_active: bool,
}

/// What produced an audit entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A live provider outcome, strategy change, or blacklist change.
    ProviderChange,
    /// A decision taken by the auto-mitigation loop.
    Predictive,
    /// An event re-emitted by the replay engine.
    Replay,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::ProviderChange => "provider_change",
            EntryKind::Predictive => "predictive",
            EntryKind::Replay => "replay",
        }
    }
}

/// An immutable record of one routing or failover decision.
///
/// The trail hands entries out behind `Arc`, so nothing can mutate them
/// once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub strategy_name: String,
    pub selected_provider: ProviderId,
    /// Free-text reason; the legacy event-type filter matches on it.
    pub fallback_reason: String,
    pub provider_candidates: Vec<ProviderCandidate>,
    pub active_conditions: Vec<ActiveCondition>,
    pub success: bool,
    pub latency_ms: f64,
    pub kind: EntryKind,
    /// Bus topic that produced the entry.
    pub source: Topic,
}

impl AuditEntry {
    /// Start an entry for `selected_provider`; the remaining fields default
    /// to empty and are filled with the `with_*` builders.
    pub fn new(
        selected_provider: impl Into<ProviderId>,
        source: Topic,
        kind: EntryKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            strategy_name: String::new(),
            selected_provider: selected_provider.into(),
            fallback_reason: String::new(),
            provider_candidates: Vec::new(),
            active_conditions: Vec::new(),
            success: true,
            latency_ms: 0.0,
            kind,
            source,
        }
    }

    pub fn with_strategy(mut self, strategy_name: impl Into<String>) -> Self {
        self.strategy_name = strategy_name.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.fallback_reason = reason.into();
        self
    }

    pub fn with_outcome(mut self, success: bool, latency_ms: f64) -> Self {
        self.success = success;
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<ProviderCandidate>) -> Self {
        self.provider_candidates = candidates;
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<ActiveCondition>) -> Self {
        self.active_conditions = conditions;
        self
    }

    /// Look up a candidate by provider id.
    pub fn candidate(&self, provider: &str) -> Option<&ProviderCandidate> {
        self.provider_candidates.iter().find(|c| c.id == provider)
    }

    /// Whether the entry selected `provider` or listed it as a candidate.
    pub fn involves(&self, provider: &str) -> bool {
        self.selected_provider == provider || self.candidate(provider).is_some()
    }

    /// Whether this entry is a live `provider:success` / `provider:failure`
    /// outcome (the input the predictive analyzer cares about).
    pub fn is_live_outcome(&self) -> bool {
        self.kind != EntryKind::Replay
            && matches!(self.source, Topic::ProviderSuccess | Topic::ProviderFailure)
    }
}

// ─────────────────────────────────────────────
// Blacklist
// ─────────────────────────────────────────────

/// Why a provider was blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    Predictive,
    Manual,
    AutoMitigation,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Predictive => "predictive",
            BlockReason::Manual => "manual",
            BlockReason::AutoMitigation => "auto-mitigation",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "predictive" => Ok(BlockReason::Predictive),
            "manual" => Ok(BlockReason::Manual),
            "auto-mitigation" => Ok(BlockReason::AutoMitigation),
            other => Err(Error::UnknownReason(other.to_string())),
        }
    }
}

/// A time-bounded block on one provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedProvider {
    pub provider_id: ProviderId,
    pub reason: BlockReason,
    pub blocked_at: DateTime<Utc>,
    /// Always strictly after `blocked_at`.
    pub expires_at: DateTime<Utc>,
}

impl BlockedProvider {
    /// Expired once `now` is strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ─────────────────────────────────────────────
// Predictive warnings
// ─────────────────────────────────────────────

/// Which health signal tripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningSignal {
    Latency,
    SuccessRate,
    FailureStreak,
}

impl WarningSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningSignal::Latency => "latency",
            WarningSignal::SuccessRate => "successRate",
            WarningSignal::FailureStreak => "failureStreak",
        }
    }
}

/// Severity of a warning, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Moderate,
    High,
    Critical,
}

impl WarningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningLevel::Moderate => "moderate",
            WarningLevel::High => "high",
            WarningLevel::Critical => "critical",
        }
    }
}

/// An ephemeral warning, recomputed on every analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningEntry {
    pub provider: ProviderId,
    pub signal: WarningSignal,
    pub value: f64,
    pub threshold: f64,
    pub level: WarningLevel,
    /// Timestamp of the newest entry in the analyzed window.
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────
// Auto-mitigation
// ─────────────────────────────────────────────

/// Singleton state owned by the mitigation control loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoMitigationState {
    pub is_active: bool,
    pub current_provider: Option<ProviderId>,
    pub next_provider: Option<ProviderId>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub last_mitigation: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
