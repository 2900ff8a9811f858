//! Replay engine — re-emit the events behind a stored audit entry.
//!
//! Order is fixed: failure (when the entry has a reason), strategy change
//! (when it names a strategy), then success. Every event is stamped with the
//! current time and `replayed: true`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, info};

use provguard_core::bus::{MessageBus, ProviderFailure, ProviderSuccess, StrategyChange};
use provguard_core::types::AuditEntry;
use provguard_core::utils::panic_message;
use provguard_core::SharedClock;

/// Reason attached to replayed strategy changes.
pub const REPLAY_REASON: &str = "Replay snapshot";

pub struct ReplayEngine {
    bus: Arc<MessageBus>,
    clock: SharedClock,
}

impl ReplayEngine {
    pub fn new(bus: Arc<MessageBus>, clock: SharedClock) -> Self {
        Self { bus, clock }
    }

    /// Replay `entry`. Returns `false` if any step panicked.
    pub fn replay(&self, entry: &AuditEntry) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.emit(entry))) {
            Ok(events) => {
                info!(entry = %entry.id, provider = %entry.selected_provider, events, "audit entry replayed");
                true
            }
            Err(payload) => {
                error!(
                    entry = %entry.id,
                    panic = %panic_message(payload.as_ref()),
                    "replay failed"
                );
                false
            }
        }
    }

    fn emit(&self, entry: &AuditEntry) -> usize {
        let now = self.clock.now();
        let provider = &entry.selected_provider;
        let mut events = 0;

        if !entry.fallback_reason.is_empty() {
            let mut failure = ProviderFailure::new(provider.clone(), entry.fallback_reason.clone(), now);
            failure.replayed = true;
            self.bus.publish(failure);
            events += 1;
        }

        if !entry.strategy_name.is_empty() {
            self.bus.publish(StrategyChange {
                strategy_name: entry.strategy_name.clone(),
                reason: REPLAY_REASON.to_string(),
                timestamp: now,
                provider_id: Some(provider.clone()),
                replayed: true,
            });
            events += 1;
        }

        let mut success = ProviderSuccess::new(provider.clone(), now);
        success.score = entry.candidate(provider).and_then(|c| c.score);
        success.replayed = true;
        self.bus.publish(success);

        events + 1
    }
}
