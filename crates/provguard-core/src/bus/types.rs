//! Bus topics and typed payloads.
//!
//! Each [`BusEvent`] variant belongs to exactly one [`Topic`]; publishing an
//! event routes it to the handlers subscribed to that topic.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{BlockReason, ProviderId};

// ─────────────────────────────────────────────
// Topics
// ─────────────────────────────────────────────

/// The canonical bus topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "provider:failure")]
    ProviderFailure,
    #[serde(rename = "provider:success")]
    ProviderSuccess,
    #[serde(rename = "provider:blacklisted")]
    ProviderBlacklisted,
    #[serde(rename = "provider:restored")]
    ProviderRestored,
    #[serde(rename = "strategy:adaptive:change")]
    StrategyAdaptiveChange,
    #[serde(rename = "auto-mitigation:triggered")]
    AutoMitigationTriggered,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 6] = [
        Topic::ProviderFailure,
        Topic::ProviderSuccess,
        Topic::ProviderBlacklisted,
        Topic::ProviderRestored,
        Topic::StrategyAdaptiveChange,
        Topic::AutoMitigationTriggered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ProviderFailure => "provider:failure",
            Topic::ProviderSuccess => "provider:success",
            Topic::ProviderBlacklisted => "provider:blacklisted",
            Topic::ProviderRestored => "provider:restored",
            Topic::StrategyAdaptiveChange => "strategy:adaptive:change",
            Topic::AutoMitigationTriggered => "auto-mitigation:triggered",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownTopic(s.to_string()))
    }
}

// ─────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────

/// `provider:failure` — a call attempt failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider_id: ProviderId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Time spent before the call failed, if the caller measured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub replayed: bool,
}

impl ProviderFailure {
    pub fn new(
        provider_id: impl Into<ProviderId>,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            reason: reason.into(),
            timestamp,
            latency_ms: None,
            replayed: false,
        }
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// `provider:success` — a call attempt succeeded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSuccess {
    pub provider_id: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub replayed: bool,
}

impl ProviderSuccess {
    pub fn new(provider_id: impl Into<ProviderId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            provider_id: provider_id.into(),
            score: None,
            timestamp,
            latency_ms: None,
            replayed: false,
        }
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// `provider:blacklisted` — the blacklist accepted a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBlacklisted {
    pub provider_id: ProviderId,
    pub reason: BlockReason,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// `provider:restored` — a provider left the blacklist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRestored {
    pub provider_id: ProviderId,
}

/// `strategy:adaptive:change` — the routing strategy switched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyChange {
    pub strategy_name: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Provider the change is recorded under; the live current provider when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    #[serde(default)]
    pub replayed: bool,
}

/// `auto-mitigation:triggered` — the control loop failed a provider over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MitigationTriggered {
    pub from: ProviderId,
    /// `None` when no healthy fallback candidate was available.
    pub to: Option<ProviderId>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────
// BusEvent
// ─────────────────────────────────────────────

/// A payload published on the bus. The variant determines the topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum BusEvent {
    #[serde(rename = "provider:failure")]
    ProviderFailure(ProviderFailure),
    #[serde(rename = "provider:success")]
    ProviderSuccess(ProviderSuccess),
    #[serde(rename = "provider:blacklisted")]
    ProviderBlacklisted(ProviderBlacklisted),
    #[serde(rename = "provider:restored")]
    ProviderRestored(ProviderRestored),
    #[serde(rename = "strategy:adaptive:change")]
    StrategyChange(StrategyChange),
    #[serde(rename = "auto-mitigation:triggered")]
    MitigationTriggered(MitigationTriggered),
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::ProviderFailure(_) => Topic::ProviderFailure,
            BusEvent::ProviderSuccess(_) => Topic::ProviderSuccess,
            BusEvent::ProviderBlacklisted(_) => Topic::ProviderBlacklisted,
            BusEvent::ProviderRestored(_) => Topic::ProviderRestored,
            BusEvent::StrategyChange(_) => Topic::StrategyAdaptiveChange,
            BusEvent::MitigationTriggered(_) => Topic::AutoMitigationTriggered,
        }
    }

    /// Whether the event was re-emitted by the replay engine.
    pub fn is_replayed(&self) -> bool {
        match self {
            BusEvent::ProviderFailure(e) => e.replayed,
            BusEvent::ProviderSuccess(e) => e.replayed,
            BusEvent::StrategyChange(e) => e.replayed,
            _ => false,
        }
    }

    /// Provider the event is about, if any.
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            BusEvent::ProviderFailure(e) => Some(&e.provider_id),
            BusEvent::ProviderSuccess(e) => Some(&e.provider_id),
            BusEvent::ProviderBlacklisted(e) => Some(&e.provider_id),
            BusEvent::ProviderRestored(e) => Some(&e.provider_id),
            BusEvent::MitigationTriggered(e) => Some(&e.from),
            BusEvent::StrategyChange(e) => e.provider_id.as_deref(),
        }
    }
}

impl From<ProviderFailure> for BusEvent {
    fn from(e: ProviderFailure) -> Self {
        BusEvent::ProviderFailure(e)
    }
}

impl From<ProviderSuccess> for BusEvent {
    fn from(e: ProviderSuccess) -> Self {
        BusEvent::ProviderSuccess(e)
    }
}

impl From<ProviderBlacklisted> for BusEvent {
    fn from(e: ProviderBlacklisted) -> Self {
        BusEvent::ProviderBlacklisted(e)
    }
}

impl From<ProviderRestored> for BusEvent {
    fn from(e: ProviderRestored) -> Self {
        BusEvent::ProviderRestored(e)
    }
}

impl From<StrategyChange> for BusEvent {
    fn from(e: StrategyChange) -> Self {
        BusEvent::StrategyChange(e)
    }
}

impl From<MitigationTriggered> for BusEvent {
    fn from(e: MitigationTriggered) -> Self {
        BusEvent::MitigationTriggered(e)
    }
}
