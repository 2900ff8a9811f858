//! Auto-mitigation control loop.
//!
//! Each tick reads the audit trail, runs the analyzer over live outcomes,
//! and fails the current provider over when the confidence for its newest
//! warning clears the threshold. Warnings about other providers are ignored.
//! Two logical states, tracked by `AutoMitigationState::is_active`:
//!
//! - Idle → Mitigating: a tick triggers a mitigation
//! - Mitigating → Idle: a later tick finds the mitigated provider unblocked
//!   and nothing new to trigger

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use provguard_core::bus::{MessageBus, MitigationTriggered};
use provguard_core::config::{AnalyzerConfig, Config};
use provguard_core::types::{AuditEntry, AutoMitigationState, BlockReason, EntryKind, ProviderId};
use provguard_core::utils::{lock, panic_message};
use provguard_core::{PeriodicTask, SharedClock, TaskHandle, Topic};

use super::scoring::{
    ConfidenceScorer, FallbackSelector, HighestScoreSelector, ScoringContext, WeightedConfidence,
};
use crate::audit::AuditTrail;
use crate::blacklist::Blacklist;
use crate::predictive::analyze_with;

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// No outcome entry, or no warning about its provider.
    Idle,
    /// The latest entry's provider is already blacklisted.
    AlreadyBlocked { provider: ProviderId },
    /// Confidence did not clear the threshold.
    BelowThreshold { provider: ProviderId, confidence: f64 },
    Triggered {
        from: ProviderId,
        to: Option<ProviderId>,
        confidence: f64,
    },
    /// Scoring or selection failed; treated as idle.
    Failed { error: String },
}

pub struct MitigationLoop {
    bus: Arc<MessageBus>,
    blacklist: Arc<Blacklist>,
    trail: Arc<AuditTrail>,
    clock: SharedClock,
    scorer: Box<dyn ConfidenceScorer>,
    selector: Box<dyn FallbackSelector>,
    analyzer: AnalyzerConfig,
    threshold: f64,
    block_ttl: Duration,
    ignore_replayed: bool,
    state: Mutex<AutoMitigationState>,
    /// Serializes ticks so one failover is evaluated and blocked at a time.
    ticking: Mutex<()>,
}

impl MitigationLoop {
    pub fn new(
        bus: Arc<MessageBus>,
        blacklist: Arc<Blacklist>,
        trail: Arc<AuditTrail>,
        clock: SharedClock,
        config: &Config,
    ) -> Self {
        let threshold = config.health.effective_threshold();
        if threshold != config.health.confidence_threshold {
            warn!(
                configured = config.health.confidence_threshold,
                threshold, "confidence threshold out of range, adjusted"
            );
        }
        Self {
            bus,
            blacklist,
            trail,
            clock,
            scorer: Box::new(WeightedConfidence {
                window_size: config.analyzer.window_size,
            }),
            selector: Box::new(HighestScoreSelector),
            analyzer: config.analyzer.clone(),
            threshold,
            block_ttl: config.health.blacklist_ttl(),
            ignore_replayed: config.health.ignore_replayed,
            state: Mutex::new(AutoMitigationState::default()),
            ticking: Mutex::new(()),
        }
    }

    pub fn with_scorer(mut self, scorer: impl ConfidenceScorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    pub fn with_selector(mut self, selector: impl FallbackSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn state(&self) -> AutoMitigationState {
        lock(&self.state).clone()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run one evaluation. Never panics and never propagates errors.
    ///
    /// Concurrent callers run one after another.
    pub fn tick(&self) -> TickOutcome {
        let _serial = lock(&self.ticking);
        self.evaluate()
    }

    fn evaluate(&self) -> TickOutcome {
        let history = self.trail.history();
        let live: Vec<&AuditEntry> = history
            .iter()
            .map(Arc::as_ref)
            .filter(|e| e.is_live_outcome())
            .collect();
        let warnings = analyze_with(live.iter().copied(), &self.analyzer);

        let latest = history
            .iter()
            .rev()
            .map(Arc::as_ref)
            .find(|e| self.is_decision_input(e));

        // Only a warning about the provider currently serving traffic counts.
        let target = latest.and_then(|entry| {
            warnings
                .iter()
                .rev()
                .find(|w| w.provider == entry.selected_provider)
                .map(|w| (w, entry))
        });
        let Some((warning, entry)) = target else {
            debug!(warnings = warnings.len(), "mitigation tick: nothing to evaluate");
            self.settle();
            return TickOutcome::Idle;
        };

        let provider = entry.selected_provider.clone();
        if self.blacklist.is_blocked(&provider) {
            debug!(provider = %provider, "mitigation tick: provider already blocked");
            return TickOutcome::AlreadyBlocked { provider };
        }

        let ctx = ScoringContext {
            warning,
            entry,
            history: &live,
        };
        let confidence = match panic::catch_unwind(AssertUnwindSafe(|| self.scorer.score(&ctx))) {
            Ok(Ok(c)) if c.is_finite() => c.clamp(0.0, 1.0),
            Ok(Ok(c)) => return self.failed(format!("scorer returned {c}")),
            Ok(Err(e)) => return self.failed(format!("{e:#}")),
            Err(payload) => return self.failed(panic_message(payload.as_ref())),
        };

        if confidence <= self.threshold {
            debug!(
                provider = %provider,
                signal = warning.signal.as_str(),
                confidence,
                threshold = self.threshold,
                "mitigation tick: below threshold"
            );
            self.settle();
            return TickOutcome::BelowThreshold {
                provider,
                confidence,
            };
        }

        let next = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.selector.select(&provider, entry, &self.blacklist)
        })) {
            Ok(next) => next,
            Err(payload) => return self.failed(panic_message(payload.as_ref())),
        };

        self.blacklist
            .block_for(&provider, BlockReason::AutoMitigation, self.block_ttl);
        let now = self.clock.now();
        *lock(&self.state) = AutoMitigationState {
            is_active: true,
            current_provider: Some(provider.clone()),
            next_provider: next.clone(),
            confidence,
            last_mitigation: Some(now),
        };

        warn!(
            from = %provider,
            to = next.as_deref().unwrap_or("none"),
            confidence,
            signal = warning.signal.as_str(),
            level = warning.level.as_str(),
            "auto-mitigation triggered"
        );
        self.bus.publish(MitigationTriggered {
            from: provider.clone(),
            to: next.clone(),
            confidence,
            timestamp: now,
        });

        TickOutcome::Triggered {
            from: provider,
            to: next,
            confidence,
        }
    }

    /// Run `tick` every `period` until the handle is stopped.
    pub fn start(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let this: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::spawn("auto-mitigation", period, move || {
            if let Some(this) = this.upgrade() {
                this.tick();
            }
        })
    }

    /// Outcome entries feed decisions; replays only when not ignored.
    fn is_decision_input(&self, entry: &AuditEntry) -> bool {
        let outcome = matches!(entry.source, Topic::ProviderSuccess | Topic::ProviderFailure);
        outcome && !(self.ignore_replayed && entry.kind == EntryKind::Replay)
    }

    /// Mitigating → Idle once the mitigated provider is back.
    fn settle(&self) {
        let mitigated = {
            let state = lock(&self.state);
            if !state.is_active {
                return;
            }
            match state.current_provider.clone() {
                Some(p) => p,
                None => return,
            }
        };
        if self.blacklist.get(&mitigated).is_some() {
            return;
        }
        lock(&self.state).is_active = false;
        info!(provider = %mitigated, "auto-mitigation settled, back to idle");
    }

    fn failed(&self, error: String) -> TickOutcome {
        error!(error = %error, "mitigation tick failed, treating as idle");
        TickOutcome::Failed { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provguard_core::bus::{BusEvent, ProviderFailure, ProviderSuccess};
    use provguard_core::config::RoutingConfig;
    use provguard_core::types::WarningLevel;
    use provguard_core::{Clock, ManualClock};

    use crate::audit::AuditRecorder;

    struct Fixture {
        clock: Arc<ManualClock>,
        bus: Arc<MessageBus>,
        blacklist: Arc<Blacklist>,
        trail: Arc<AuditTrail>,
        _recorder: AuditRecorder,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::starting_now());
            let bus = Arc::new(MessageBus::new());
            let trail = Arc::new(AuditTrail::default());
            let blacklist = Arc::new(Blacklist::new(bus.clone(), clock.clone(), Duration::from_secs(120)));
            let routing = RoutingConfig {
                strategy: "adaptive".into(),
                providers: vec!["openai".into(), "anthropic".into(), "groq".into()],
            };
            let recorder =
                AuditRecorder::attach(&bus, trail.clone(), blacklist.clone(), clock.clone(), &routing);
            Self {
                clock,
                bus,
                blacklist,
                trail,
                _recorder: recorder,
            }
        }

        fn mitigation(&self) -> MitigationLoop {
            self.mitigation_with(&Config::default())
        }

        fn mitigation_with(&self, config: &Config) -> MitigationLoop {
            MitigationLoop::new(
                self.bus.clone(),
                self.blacklist.clone(),
                self.trail.clone(),
                self.clock.clone(),
                config,
            )
        }

        fn fail(&self, provider: &str, times: usize) {
            for _ in 0..times {
                self.clock.advance_secs(1);
                self.bus.publish(ProviderFailure::new(provider, "timeout", self.clock.now()));
            }
        }

        fn succeed(&self, provider: &str, score: f64) {
            self.clock.advance_secs(1);
            self.bus.publish(
                ProviderSuccess::new(provider, self.clock.now())
                    .with_latency(120.0)
                    .with_score(score),
            );
        }
    }

    struct Fixed(f64);

    impl ConfidenceScorer for Fixed {
        fn score(&self, _: &ScoringContext<'_>) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl ConfidenceScorer for Broken {
        fn score(&self, _: &ScoringContext<'_>) -> anyhow::Result<f64> {
            anyhow::bail!("model unavailable")
        }
    }

    struct Panicking;

    impl FallbackSelector for Panicking {
        fn select(&self, _: &str, _: &AuditEntry, _: &Blacklist) -> Option<ProviderId> {
            panic!("selector exploded")
        }
    }

    #[test]
    fn test_empty_trail_is_idle() {
        let f = Fixture::new();
        assert_eq!(f.mitigation().tick(), TickOutcome::Idle);
        assert!(!f.mitigation().state().is_active);
    }

    #[test]
    fn test_healthy_provider_is_idle() {
        let f = Fixture::new();
        for _ in 0..5 {
            f.succeed("openai", 0.9);
        }
        assert_eq!(f.mitigation().tick(), TickOutcome::Idle);
    }

    #[test]
    fn test_critical_streak_triggers_failover() {
        let f = Fixture::new();
        f.succeed("anthropic", 0.8);
        f.succeed("groq", 0.95);
        f.fail("openai", 5);

        let triggered = Arc::new(Mutex::new(Vec::new()));
        let sink = triggered.clone();
        f.bus.subscribe(Topic::AutoMitigationTriggered, move |e| {
            sink.lock().unwrap().push(e.clone())
        });

        let mitigation = f.mitigation();
        match mitigation.tick() {
            TickOutcome::Triggered { from, to, confidence } => {
                assert_eq!(from, "openai");
                assert_eq!(to.as_deref(), Some("groq"));
                assert!(confidence > 0.8);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(f.blacklist.block_reason("openai"), Some(BlockReason::AutoMitigation));
        let state = mitigation.state();
        assert!(state.is_active);
        assert_eq!(state.current_provider.as_deref(), Some("openai"));
        assert_eq!(state.next_provider.as_deref(), Some("groq"));
        assert_eq!(state.last_mitigation, Some(f.clock.now()));

        let events = triggered.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], BusEvent::MitigationTriggered(m) if m.from == "openai"));
    }

    #[test]
    fn test_already_blocked_skips() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let mitigation = f.mitigation();
        assert!(matches!(mitigation.tick(), TickOutcome::Triggered { .. }));
        assert_eq!(
            mitigation.tick(),
            TickOutcome::AlreadyBlocked {
                provider: "openai".into()
            }
        );
    }

    #[test]
    fn test_below_threshold_does_not_block() {
        let f = Fixture::new();
        // Seven successes then a three-failure streak: high, not critical.
        for _ in 0..7 {
            f.succeed("openai", 0.9);
        }
        f.fail("openai", 3);

        match f.mitigation().tick() {
            TickOutcome::BelowThreshold { provider, confidence } => {
                assert_eq!(provider, "openai");
                assert!(confidence <= 0.8);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(f.blacklist.is_empty());
    }

    #[test]
    fn test_no_fallback_still_blocks() {
        let f = Fixture::new();
        f.fail("openai", 5);
        f.blacklist.block("anthropic", BlockReason::Manual);
        f.blacklist.block("groq", BlockReason::Manual);

        let outcome = f.mitigation().with_scorer(Fixed(0.95)).tick();
        assert_eq!(
            outcome,
            TickOutcome::Triggered {
                from: "openai".into(),
                to: None,
                confidence: 0.95
            }
        );
        assert!(f.blacklist.get("openai").is_some());
    }

    #[test]
    fn test_scorer_error_is_failed_tick() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let outcome = f.mitigation().with_scorer(Broken).tick();
        assert!(matches!(outcome, TickOutcome::Failed { ref error } if error.contains("model unavailable")));
        assert!(f.blacklist.is_empty());
    }

    #[test]
    fn test_selector_panic_is_failed_tick() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let outcome = f.mitigation().with_selector(Panicking).tick();
        assert!(matches!(outcome, TickOutcome::Failed { ref error } if error.contains("selector exploded")));
        assert!(f.blacklist.is_empty());
    }

    #[test]
    fn test_out_of_range_score_is_clamped() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let outcome = f.mitigation().with_scorer(Fixed(3.0)).tick();
        assert!(matches!(outcome, TickOutcome::Triggered { confidence, .. } if confidence == 1.0));
    }

    #[test]
    fn test_replayed_entries_are_ignored() {
        let f = Fixture::new();
        for _ in 0..5 {
            f.clock.advance_secs(1);
            let mut failure = ProviderFailure::new("openai", "Provider openai failed", f.clock.now());
            failure.replayed = true;
            f.bus.publish(failure);
        }
        assert!(f.trail.history().iter().all(|e| e.kind == EntryKind::Replay));
        assert_eq!(f.mitigation().tick(), TickOutcome::Idle);
        assert!(f.blacklist.is_empty());
    }

    #[test]
    fn test_settles_back_to_idle_after_expiry() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let mitigation = f.mitigation();
        assert!(matches!(mitigation.tick(), TickOutcome::Triggered { .. }));

        // Traffic moves to the fallback and the block runs out.
        for _ in 0..3 {
            f.succeed("groq", 0.95);
        }
        f.clock.advance_secs(121);

        assert_eq!(mitigation.tick(), TickOutcome::Idle);
        let state = mitigation.state();
        assert!(!state.is_active);
        assert_eq!(state.current_provider.as_deref(), Some("openai"));
    }

    fn with_threshold(threshold: f64) -> Config {
        let mut config = Config::default();
        config.health.confidence_threshold = threshold;
        config
    }

    #[test]
    fn test_fallback_is_not_blocked_for_previous_provider_warnings() {
        let f = Fixture::new();
        f.succeed("anthropic", 0.9);
        f.fail("openai", 5);

        let mitigation = f.mitigation_with(&with_threshold(0.7));
        assert!(matches!(
            mitigation.tick(),
            TickOutcome::Triggered { ref from, ref to, .. }
                if from == "openai" && to.as_deref() == Some("anthropic")
        ));

        // openai's warnings stay in the window while anthropic serves traffic.
        f.succeed("anthropic", 0.9);
        assert_eq!(mitigation.tick(), TickOutcome::Idle);
        assert!(f.blacklist.get("anthropic").is_none());
        assert!(f.blacklist.get("groq").is_none());
        assert_eq!(mitigation.state().next_provider.as_deref(), Some("anthropic"));
    }

    #[test]
    fn test_invalid_threshold_is_bounded() {
        let f = Fixture::new();
        assert_eq!(f.mitigation_with(&with_threshold(f64::NAN)).threshold(), 0.8);
        assert_eq!(f.mitigation_with(&with_threshold(1.7)).threshold(), 1.0);
        assert_eq!(f.mitigation_with(&with_threshold(-1.0)).threshold(), 0.0);

        // A high-level streak stays below the default threshold.
        for _ in 0..7 {
            f.succeed("openai", 0.9);
        }
        f.fail("openai", 3);
        let outcome = f.mitigation_with(&with_threshold(f64::NAN)).tick();
        assert!(matches!(outcome, TickOutcome::BelowThreshold { .. }));
        assert!(f.blacklist.is_empty());
    }

    #[test]
    fn test_concurrent_ticks_trigger_once() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let triggered = Arc::new(Mutex::new(0));
        let count = triggered.clone();
        f.bus.subscribe(Topic::AutoMitigationTriggered, move |_| *count.lock().unwrap() += 1);

        let mitigation = f.mitigation();
        let outcomes: Vec<TickOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| mitigation.tick())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let fired = outcomes
            .iter()
            .filter(|o| matches!(o, TickOutcome::Triggered { .. }))
            .count();
        assert_eq!(fired, 1);
        assert_eq!(*triggered.lock().unwrap(), 1);
    }

    #[test]
    fn test_warning_level_drives_default_score() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let history = f.trail.history();
        let live: Vec<&AuditEntry> = history.iter().map(Arc::as_ref).collect();
        let warnings = analyze_with(live.iter().copied(), &AnalyzerConfig::default());
        assert_eq!(warnings.last().unwrap().level, WarningLevel::Critical);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_loop_ticks_periodically() {
        let f = Fixture::new();
        f.fail("openai", 5);
        let mitigation = Arc::new(f.mitigation());
        let handle = mitigation.start(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(mitigation.state().is_active);
        assert!(f.blacklist.get("openai").is_some());
        handle.join().await;
    }
}
