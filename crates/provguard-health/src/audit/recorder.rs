//! Audit recorder — turns bus events into audit trail snapshots.
//!
//! Keeps the routing picture the snapshots need: per-provider rolling
//! statistics, candidate order, and the active strategy name. Replayed
//! events are recorded with `kind = replay` and leave that picture untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use tracing::debug;

use provguard_core::bus::{
    BusEvent, MessageBus, MitigationTriggered, ProviderBlacklisted, ProviderFailure,
    ProviderSuccess, StrategyChange, Subscription, Topic,
};
use provguard_core::config::RoutingConfig;
use provguard_core::types::{
    ActiveCondition, AuditEntry, CandidateStats, EntryKind, ProviderCandidate, ProviderId,
};
use provguard_core::utils::lock;
use provguard_core::SharedClock;

use super::trail::AuditTrail;
use crate::blacklist::Blacklist;

/// Failure-rate percentage above which `failureRateAbove` holds.
const FAILURE_RATE_CONDITION_PCT: f64 = 25.0;
/// Average latency above which `avgLatencyAbove` holds.
const AVG_LATENCY_CONDITION_MS: f64 = 500.0;
/// Failure count above which `totalFailuresAbove` holds.
const TOTAL_FAILURES_CONDITION: u64 = 3;

// ─────────────────────────────────────────────
// Routing state
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
struct ProviderStats {
    success_count: u64,
    failure_count: u64,
    /// Sum of latencies of successful calls.
    total_latency_ms: f64,
    last_score: Option<f64>,
    last_failed: bool,
}

impl ProviderStats {
    fn attempts(&self) -> u64 {
        self.success_count + self.failure_count
    }

    fn success_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.success_count as f64 / n as f64,
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        match self.success_count {
            0 => 0.0,
            n => self.total_latency_ms / n as f64,
        }
    }
}

#[derive(Debug)]
struct RoutingState {
    strategy: String,
    /// Configured providers first, then newly seen ones.
    order: Vec<ProviderId>,
    stats: HashMap<ProviderId, ProviderStats>,
    /// Provider most recently routed to.
    current: Option<ProviderId>,
}

impl RoutingState {
    fn new(routing: &RoutingConfig) -> Self {
        let mut order: Vec<ProviderId> = Vec::new();
        for p in &routing.providers {
            if !order.contains(p) {
                order.push(p.clone());
            }
        }
        Self {
            strategy: routing.strategy.clone(),
            order,
            stats: HashMap::new(),
            current: None,
        }
    }

    fn stats_mut(&mut self, provider: &str) -> &mut ProviderStats {
        if !self.order.iter().any(|p| p == provider) {
            self.order.push(provider.to_string());
        }
        self.stats.entry(provider.to_string()).or_default()
    }

    fn conditions(&self) -> Vec<ActiveCondition> {
        let failure_rate_above = self.stats.values().any(|s| {
            s.attempts() > 0
                && (s.failure_count as f64 / s.attempts() as f64) * 100.0 > FAILURE_RATE_CONDITION_PCT
        });

        let latencies: Vec<f64> = self
            .stats
            .values()
            .map(ProviderStats::avg_latency_ms)
            .filter(|&ms| ms > 0.0)
            .collect();
        let avg_latency_above = !latencies.is_empty()
            && latencies.iter().sum::<f64>() / latencies.len() as f64 > AVG_LATENCY_CONDITION_MS;

        let total_failures_above = self
            .stats
            .values()
            .any(|s| s.failure_count > TOTAL_FAILURES_CONDITION);

        vec![
            condition(format!("failureRateAbove({FAILURE_RATE_CONDITION_PCT})"), failure_rate_above),
            condition(format!("avgLatencyAbove({AVG_LATENCY_CONDITION_MS})"), avg_latency_above),
            condition(format!("totalFailuresAbove({TOTAL_FAILURES_CONDITION})"), total_failures_above),
        ]
    }
}

fn condition(name: String, is_active: bool) -> ActiveCondition {
    ActiveCondition { name, is_active }
}

// ─────────────────────────────────────────────
// AuditRecorder
// ─────────────────────────────────────────────

struct RecorderInner {
    trail: Arc<AuditTrail>,
    blacklist: Arc<Blacklist>,
    clock: SharedClock,
    state: Mutex<RoutingState>,
}

/// Bus subscriber that appends one audit entry per relevant event.
pub struct AuditRecorder {
    inner: Arc<RecorderInner>,
    subscriptions: Vec<Subscription>,
}

impl AuditRecorder {
    /// Subscribe to the bus and start recording into `trail`.
    ///
    /// Handlers hold a weak reference, so dropping the recorder stops
    /// recording even if `detach` is never called.
    pub fn attach(
        bus: &MessageBus,
        trail: Arc<AuditTrail>,
        blacklist: Arc<Blacklist>,
        clock: SharedClock,
        routing: &RoutingConfig,
    ) -> Self {
        let inner = Arc::new(RecorderInner {
            trail,
            blacklist,
            clock,
            state: Mutex::new(RoutingState::new(routing)),
        });

        let topics = [
            Topic::ProviderFailure,
            Topic::ProviderSuccess,
            Topic::ProviderBlacklisted,
            Topic::ProviderRestored,
            Topic::StrategyAdaptiveChange,
            Topic::AutoMitigationTriggered,
        ];
        let subscriptions = topics
            .into_iter()
            .map(|topic| {
                let weak: Weak<RecorderInner> = Arc::downgrade(&inner);
                bus.subscribe(topic, move |event| {
                    if let Some(inner) = weak.upgrade() {
                        inner.record(event);
                    }
                })
            })
            .collect();

        Self {
            inner,
            subscriptions,
        }
    }

    /// Unsubscribe every handler.
    pub fn detach(self) {
        for sub in self.subscriptions {
            sub.unsubscribe();
        }
    }

    /// Name of the active routing strategy.
    pub fn strategy(&self) -> String {
        lock(&self.inner.state).strategy.clone()
    }

    /// Current candidate list, as a new entry would record it.
    pub fn candidates(&self) -> Vec<ProviderCandidate> {
        self.inner.candidates()
    }
}

impl RecorderInner {
    fn record(&self, event: &BusEvent) {
        let entry = match event {
            BusEvent::ProviderFailure(e) => self.on_failure(e),
            BusEvent::ProviderSuccess(e) => self.on_success(e),
            BusEvent::ProviderBlacklisted(e) => self.on_blacklisted(e),
            BusEvent::ProviderRestored(e) => self.simple_entry(
                &e.provider_id,
                Topic::ProviderRestored,
                format!("Provider {} restored from blacklist", e.provider_id),
                self.clock.now(),
            ),
            BusEvent::StrategyChange(e) => self.on_strategy_change(e),
            BusEvent::MitigationTriggered(e) => self.on_mitigation(e),
        };
        self.trail.add_entry(entry);
    }

    fn on_failure(&self, e: &ProviderFailure) -> AuditEntry {
        let latency = e.latency_ms.unwrap_or(0.0);
        if e.replayed {
            return self
                .base_entry(&e.provider_id, Topic::ProviderFailure, EntryKind::Replay, e.timestamp)
                .with_reason(e.reason.clone())
                .with_outcome(false, latency);
        }

        {
            let mut state = lock(&self.state);
            let stats = state.stats_mut(&e.provider_id);
            stats.failure_count += 1;
            stats.last_failed = true;
            state.current = Some(e.provider_id.clone());
        }
        debug!(provider = %e.provider_id, reason = %e.reason, "recording provider failure");

        self.base_entry(&e.provider_id, Topic::ProviderFailure, EntryKind::ProviderChange, e.timestamp)
            .with_reason(format!("Provider {} failed: {}", e.provider_id, e.reason))
            .with_outcome(false, latency)
    }

    fn on_success(&self, e: &ProviderSuccess) -> AuditEntry {
        let latency = e.latency_ms.unwrap_or(0.0);
        if e.replayed {
            return self
                .base_entry(&e.provider_id, Topic::ProviderSuccess, EntryKind::Replay, e.timestamp)
                .with_outcome(true, latency);
        }

        let recovered = {
            let mut state = lock(&self.state);
            let stats = state.stats_mut(&e.provider_id);
            let recovered = stats.last_failed;
            stats.success_count += 1;
            stats.total_latency_ms += latency;
            stats.last_failed = false;
            if e.score.is_some() {
                stats.last_score = e.score;
            }
            state.current = Some(e.provider_id.clone());
            recovered
        };

        let reason = if recovered {
            format!("Provider {} restored", e.provider_id)
        } else {
            String::new()
        };
        self.base_entry(&e.provider_id, Topic::ProviderSuccess, EntryKind::ProviderChange, e.timestamp)
            .with_reason(reason)
            .with_outcome(true, latency)
    }

    fn on_blacklisted(&self, e: &ProviderBlacklisted) -> AuditEntry {
        self.simple_entry(
            &e.provider_id,
            Topic::ProviderBlacklisted,
            format!("Provider {} blacklisted ({})", e.provider_id, e.reason),
            e.blocked_at,
        )
    }

    fn on_strategy_change(&self, e: &StrategyChange) -> AuditEntry {
        let (kind, reason) = if e.replayed {
            (EntryKind::Replay, e.reason.clone())
        } else {
            lock(&self.state).strategy = e.strategy_name.clone();
            (
                EntryKind::ProviderChange,
                format!("strategy changed to {}: {}", e.strategy_name, e.reason),
            )
        };
        let provider = match &e.provider_id {
            Some(p) => p.clone(),
            None => lock(&self.state).current.clone().unwrap_or_default(),
        };

        self.base_entry(&provider, Topic::StrategyAdaptiveChange, kind, e.timestamp)
            .with_strategy(e.strategy_name.clone())
            .with_reason(reason)
    }

    fn on_mitigation(&self, e: &MitigationTriggered) -> AuditEntry {
        let target = e.to.clone().unwrap_or_else(|| e.from.clone());
        if e.to.is_some() {
            lock(&self.state).current = Some(target.clone());
        }
        let reason = format!(
            "auto-mitigation: switched from {} to {} (confidence {:.2})",
            e.from,
            e.to.as_deref().unwrap_or("none"),
            e.confidence
        );

        self.base_entry(&target, Topic::AutoMitigationTriggered, EntryKind::Predictive, e.timestamp)
            .with_reason(reason)
            .with_outcome(e.to.is_some(), 0.0)
    }

    fn simple_entry(
        &self,
        provider: &str,
        source: Topic,
        reason: String,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        self.base_entry(provider, source, EntryKind::ProviderChange, timestamp)
            .with_reason(reason)
    }

    /// Entry pre-filled with strategy, candidates, and conditions.
    fn base_entry(
        &self,
        provider: &str,
        source: Topic,
        kind: EntryKind,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        let (strategy, conditions) = {
            let state = lock(&self.state);
            (state.strategy.clone(), state.conditions())
        };
        AuditEntry::new(provider, source, kind, timestamp)
            .with_strategy(strategy)
            .with_candidates(self.candidates())
            .with_conditions(conditions)
    }

    fn candidates(&self) -> Vec<ProviderCandidate> {
        let rows: Vec<(ProviderId, Option<ProviderStats>)> = {
            let state = lock(&self.state);
            state
                .order
                .iter()
                .map(|id| (id.clone(), state.stats.get(id).cloned()))
                .collect()
        };

        // Blacklist reads happen outside the state lock; `get` never publishes.
        rows.into_iter()
            .map(|(id, stats)| {
                let excluded = self.blacklist.get(&id).is_some();
                let observed = stats.filter(|s| s.attempts() > 0);
                ProviderCandidate {
                    score: observed
                        .as_ref()
                        .map(|s| s.last_score.unwrap_or_else(|| s.success_rate())),
                    excluded,
                    stats: observed.map(|s| CandidateStats {
                        latency_ms: s.avg_latency_ms(),
                        success_rate: s.success_rate(),
                    }),
                    id,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::DEFAULT_BLOCK_TTL;
    use provguard_core::types::BlockReason;
    use provguard_core::ManualClock;

    struct Fixture {
        bus: Arc<MessageBus>,
        trail: Arc<AuditTrail>,
        blacklist: Arc<Blacklist>,
        recorder: AuditRecorder,
    }

    fn fixture(providers: &[&str]) -> Fixture {
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        let bus = Arc::new(MessageBus::new());
        let trail = Arc::new(AuditTrail::default());
        let blacklist = Arc::new(Blacklist::new(bus.clone(), clock.clone(), DEFAULT_BLOCK_TTL));
        let routing = RoutingConfig {
            strategy: "adaptive".into(),
            providers: providers.iter().map(|p| p.to_string()).collect(),
        };
        let recorder = AuditRecorder::attach(&bus, trail.clone(), blacklist.clone(), clock, &routing);
        Fixture {
            bus,
            trail,
            blacklist,
            recorder,
        }
    }

    #[test]
    fn test_failure_recorded_with_failed_reason() {
        let f = fixture(&["openai", "anthropic"]);
        f.bus.publish(ProviderFailure::new("openai", "timeout", Utc::now()).with_latency(900.0));

        let entry = f.trail.current().unwrap();
        assert_eq!(entry.selected_provider, "openai");
        assert_eq!(entry.fallback_reason, "Provider openai failed: timeout");
        assert!(!entry.success);
        assert_eq!(entry.latency_ms, 900.0);
        assert_eq!(entry.kind, EntryKind::ProviderChange);
        assert_eq!(entry.source, Topic::ProviderFailure);
        assert_eq!(entry.strategy_name, "adaptive");
    }

    #[test]
    fn test_success_after_failure_is_restored() {
        let f = fixture(&[]);
        f.bus.publish(ProviderSuccess::new("groq", Utc::now()));
        assert_eq!(f.trail.current().unwrap().fallback_reason, "");

        f.bus.publish(ProviderFailure::new("groq", "502", Utc::now()));
        f.bus.publish(ProviderSuccess::new("groq", Utc::now()).with_latency(120.0));
        assert_eq!(f.trail.current().unwrap().fallback_reason, "Provider groq restored");
    }

    #[test]
    fn test_candidates_follow_config_then_first_seen() {
        let f = fixture(&["openai", "anthropic"]);
        f.bus.publish(ProviderSuccess::new("mistral", Utc::now()).with_latency(200.0));

        let ids: Vec<String> = f.recorder.candidates().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["openai", "anthropic", "mistral"]);
    }

    #[test]
    fn test_candidate_stats_and_scores() {
        let f = fixture(&["openai", "anthropic"]);
        f.bus.publish(ProviderSuccess::new("openai", Utc::now()).with_latency(100.0));
        f.bus.publish(ProviderSuccess::new("openai", Utc::now()).with_latency(300.0));
        f.bus.publish(ProviderFailure::new("openai", "timeout", Utc::now()));
        f.bus.publish(ProviderSuccess::new("anthropic", Utc::now()).with_score(0.95));

        let candidates = f.recorder.candidates();
        let openai = &candidates[0];
        let stats = openai.stats.as_ref().unwrap();
        assert_eq!(stats.latency_ms, 200.0);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((openai.score.unwrap() - 2.0 / 3.0).abs() < 1e-9);

        assert_eq!(candidates[1].score, Some(0.95));
    }

    #[test]
    fn test_unobserved_candidate_has_no_stats() {
        let f = fixture(&["openai"]);
        let candidates = f.recorder.candidates();
        assert!(candidates[0].stats.is_none());
        assert!(candidates[0].score.is_none());
    }

    #[test]
    fn test_blacklisted_candidate_excluded_and_recorded() {
        let f = fixture(&["openai", "anthropic"]);
        f.blacklist.block("openai", BlockReason::Manual);

        let entry = f.trail.current().unwrap();
        assert_eq!(entry.source, Topic::ProviderBlacklisted);
        assert_eq!(entry.fallback_reason, "Provider openai blacklisted (manual)");
        assert!(entry.candidate("openai").unwrap().excluded);
        assert!(!entry.candidate("anthropic").unwrap().excluded);
    }

    #[test]
    fn test_restored_recorded() {
        let f = fixture(&["openai"]);
        f.blacklist.unblock("openai");
        let entry = f.trail.current().unwrap();
        assert_eq!(entry.source, Topic::ProviderRestored);
        assert!(entry.fallback_reason.contains("restored"));
    }

    #[test]
    fn test_strategy_change_updates_strategy() {
        let f = fixture(&["openai"]);
        f.bus.publish(ProviderSuccess::new("openai", Utc::now()));
        f.bus.publish(StrategyChange {
            strategy_name: "RoundRobin".into(),
            reason: "load spike".into(),
            timestamp: Utc::now(),
            provider_id: None,
            replayed: false,
        });

        let entry = f.trail.current().unwrap();
        assert_eq!(entry.strategy_name, "RoundRobin");
        assert_eq!(entry.selected_provider, "openai");
        assert_eq!(entry.fallback_reason, "strategy changed to RoundRobin: load spike");
        assert_eq!(f.recorder.strategy(), "RoundRobin");
    }

    #[test]
    fn test_replayed_events_do_not_touch_live_state() {
        let f = fixture(&["openai"]);
        let mut failure = ProviderFailure::new("openai", "Provider openai failed: old", Utc::now());
        failure.replayed = true;
        f.bus.publish(failure);
        f.bus.publish(StrategyChange {
            strategy_name: "RoundRobin".into(),
            reason: "Replay snapshot".into(),
            timestamp: Utc::now(),
            provider_id: None,
            replayed: true,
        });

        let history = f.trail.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.kind == EntryKind::Replay));
        assert_eq!(history[0].fallback_reason, "Provider openai failed: old");
        assert_eq!(f.recorder.strategy(), "adaptive");
        assert!(f.recorder.candidates()[0].stats.is_none());
    }

    #[test]
    fn test_replayed_strategy_change_keeps_its_provider() {
        let f = fixture(&["openai", "groq"]);
        f.bus.publish(ProviderSuccess::new("openai", Utc::now()));
        f.bus.publish(StrategyChange {
            strategy_name: "RoundRobin".into(),
            reason: "Replay snapshot".into(),
            timestamp: Utc::now(),
            provider_id: Some("groq".into()),
            replayed: true,
        });

        let entry = f.trail.current().unwrap();
        assert_eq!(entry.kind, EntryKind::Replay);
        assert_eq!(entry.selected_provider, "groq");
        assert_eq!(f.recorder.strategy(), "adaptive");
    }

    #[test]
    fn test_mitigation_entry_is_predictive() {
        let f = fixture(&["openai", "anthropic"]);
        f.bus.publish(BusEvent::MitigationTriggered(MitigationTriggered {
            from: "openai".into(),
            to: Some("anthropic".into()),
            confidence: 0.925,
            timestamp: Utc::now(),
        }));

        let entry = f.trail.current().unwrap();
        assert_eq!(entry.kind, EntryKind::Predictive);
        assert_eq!(entry.selected_provider, "anthropic");
        assert!(entry.fallback_reason.starts_with("auto-mitigation: switched from openai to anthropic"));
    }

    #[test]
    fn test_conditions_reflect_stats() {
        let f = fixture(&["openai"]);
        for _ in 0..4 {
            f.bus.publish(ProviderFailure::new("openai", "timeout", Utc::now()));
        }
        f.bus.publish(ProviderSuccess::new("openai", Utc::now()).with_latency(800.0));

        let entry = f.trail.current().unwrap();
        let active: Vec<&str> = entry
            .active_conditions
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            active,
            vec!["failureRateAbove(25)", "avgLatencyAbove(500)", "totalFailuresAbove(3)"]
        );
    }

    #[test]
    fn test_detach_stops_recording() {
        let f = fixture(&["openai"]);
        f.recorder.detach();
        f.bus.publish(ProviderSuccess::new("openai", Utc::now()));
        assert!(f.trail.is_empty());
    }
}
