//! Health engine — wires bus, blacklist, audit trail, mitigation, and replay.
//!
//! Every service is constructed here and shared by `Arc`; nothing is a
//! process-wide singleton, so tests build isolated engines freely.

use std::sync::Arc;

use tracing::info;

use provguard_core::config::Config;
use provguard_core::types::{AuditEntry, WarningEntry};
use provguard_core::{MessageBus, SharedClock, SystemClock, TaskHandle};

use crate::audit::{AuditRecorder, AuditTrail};
use crate::blacklist::Blacklist;
use crate::mitigation::MitigationLoop;
use crate::predictive::analyze_with;
use crate::replay::ReplayEngine;

pub struct HealthEngine {
    config: Config,
    clock: SharedClock,
    bus: Arc<MessageBus>,
    blacklist: Arc<Blacklist>,
    trail: Arc<AuditTrail>,
    recorder: AuditRecorder,
    mitigation: Arc<MitigationLoop>,
    replay: ReplayEngine,
}

impl HealthEngine {
    /// Engine on the system clock.
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: SharedClock) -> Self {
        let bus = Arc::new(MessageBus::new());
        let blacklist = Arc::new(Blacklist::new(
            bus.clone(),
            clock.clone(),
            config.health.blacklist_ttl(),
        ));
        let trail = Arc::new(AuditTrail::new(config.health.history_limit));
        let recorder = AuditRecorder::attach(
            &bus,
            trail.clone(),
            blacklist.clone(),
            clock.clone(),
            &config.routing,
        );
        let mitigation = Arc::new(MitigationLoop::new(
            bus.clone(),
            blacklist.clone(),
            trail.clone(),
            clock.clone(),
            &config,
        ));
        let replay = ReplayEngine::new(bus.clone(), clock.clone());

        Self {
            config,
            clock,
            bus,
            blacklist,
            trail,
            recorder,
            mitigation,
            replay,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub fn trail(&self) -> &Arc<AuditTrail> {
        &self.trail
    }

    pub fn recorder(&self) -> &AuditRecorder {
        &self.recorder
    }

    pub fn mitigation(&self) -> &Arc<MitigationLoop> {
        &self.mitigation
    }

    /// Current warnings over the live outcomes in the trail.
    pub fn warnings(&self) -> Vec<WarningEntry> {
        let history = self.trail.history();
        analyze_with(
            history.iter().map(Arc::as_ref).filter(|e| e.is_live_outcome()),
            &self.config.analyzer,
        )
    }

    pub fn replay(&self, entry: &AuditEntry) -> bool {
        self.replay.replay(entry)
    }

    /// Start the blacklist sweep and the mitigation tick on the current
    /// tokio runtime.
    pub fn start(&self) -> EngineHandle {
        let health = &self.config.health;
        info!(
            sweep_secs = health.sweep_interval().as_secs(),
            mitigation_secs = health.mitigation_interval().as_secs(),
            threshold = health.effective_threshold(),
            "health engine started"
        );
        EngineHandle {
            sweeper: self.blacklist.start_sweeper(health.sweep_interval()),
            mitigation: self.mitigation.start(health.mitigation_interval()),
        }
    }
}

/// Timers started by [`HealthEngine::start`]. Dropping it stops both.
pub struct EngineHandle {
    sweeper: TaskHandle,
    mitigation: TaskHandle,
}

impl EngineHandle {
    pub fn stop(&self) {
        self.sweeper.stop();
        self.mitigation.stop();
    }

    /// Stop both timers and wait for them to exit.
    pub async fn join(self) {
        let EngineHandle { sweeper, mitigation } = self;
        sweeper.join().await;
        mitigation.join().await;
        info!("health engine stopped");
    }
}
