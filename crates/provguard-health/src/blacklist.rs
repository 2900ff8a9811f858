//! Blacklist manager — a time-bounded circuit breaker per provider.
//!
//! - `block` inserts or overwrites the entry and publishes `provider:blacklisted`
//! - `unblock` removes the entry and always publishes `provider:restored`
//! - `is_blocked` lazily evicts an expired entry, publishing `provider:restored`
//!   exactly once for it
//! - the background sweep evicts expired entries silently
//!
//! Events are published after the map lock is released, so handlers may read
//! the blacklist. Each change and its event happen under one transition lock,
//! so a stale `provider:restored` never follows a newer `provider:blacklisted`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info};

use provguard_core::bus::{MessageBus, ProviderBlacklisted, ProviderRestored};
use provguard_core::types::{BlockReason, BlockedProvider, ProviderId};
use provguard_core::utils::lock;
use provguard_core::{PeriodicTask, SharedClock, TaskHandle};

/// Default time a provider stays blocked.
pub const DEFAULT_BLOCK_TTL: Duration = Duration::from_secs(120);

/// Longest block accepted; larger TTLs are clamped.
const MAX_BLOCK_TTL_DAYS: i64 = 36_500;

pub struct Blacklist {
    bus: Arc<MessageBus>,
    clock: SharedClock,
    default_ttl: Duration,
    entries: Mutex<HashMap<ProviderId, BlockedProvider>>,
    /// Held across each change and its event so subscribers see changes in
    /// the order they were made. Blacklist handlers must stick to `get`,
    /// `blocked` and `block_reason`.
    transitions: Mutex<()>,
}

impl Blacklist {
    pub fn new(bus: Arc<MessageBus>, clock: SharedClock, default_ttl: Duration) -> Self {
        Self {
            bus,
            clock,
            default_ttl,
            entries: Mutex::new(HashMap::new()),
            transitions: Mutex::new(()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whether `provider` is blocked right now.
    ///
    /// Not side-effect free: an expired entry is removed here and
    /// `provider:restored` is published for it.
    pub fn is_blocked(&self, provider: &str) -> bool {
        let now = self.clock.now();
        match lock(&self.entries).get(provider) {
            None => return false,
            Some(entry) if !entry.is_expired(now) => return true,
            Some(_) => {}
        }

        // Re-check under the transition lock; a concurrent block may have
        // replaced the expired entry.
        let _transition = lock(&self.transitions);
        {
            let mut entries = lock(&self.entries);
            match entries.get(provider) {
                None => return false,
                Some(entry) if !entry.is_expired(now) => return true,
                Some(_) => {
                    entries.remove(provider);
                }
            }
        }

        info!(provider = %provider, "block expired, provider restored");
        self.bus.publish(ProviderRestored {
            provider_id: provider.to_string(),
        });
        false
    }

    /// Block `provider` for the default TTL.
    pub fn block(&self, provider: &str, reason: BlockReason) -> BlockedProvider {
        self.block_for(provider, reason, self.default_ttl)
    }

    /// Block `provider` for `ttl`, replacing any existing block.
    pub fn block_for(&self, provider: &str, reason: BlockReason, ttl: Duration) -> BlockedProvider {
        let blocked_at = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(MAX_BLOCK_TTL_DAYS))
            .clamp(
                chrono::Duration::milliseconds(1),
                chrono::Duration::days(MAX_BLOCK_TTL_DAYS),
            );

        let entry = BlockedProvider {
            provider_id: provider.to_string(),
            reason,
            blocked_at,
            expires_at: blocked_at + ttl,
        };
        let _transition = lock(&self.transitions);
        lock(&self.entries).insert(provider.to_string(), entry.clone());

        info!(
            provider = %provider,
            reason = %reason,
            expires_at = %entry.expires_at,
            "provider blacklisted"
        );
        self.bus.publish(ProviderBlacklisted {
            provider_id: entry.provider_id.clone(),
            reason,
            blocked_at: entry.blocked_at,
            expires_at: entry.expires_at,
        });
        entry
    }

    /// Remove any block on `provider` and publish `provider:restored`.
    ///
    /// Returns whether an entry was present.
    pub fn unblock(&self, provider: &str) -> bool {
        let _transition = lock(&self.transitions);
        let removed = lock(&self.entries).remove(provider).is_some();
        info!(provider = %provider, was_blocked = removed, "provider unblocked");
        self.bus.publish(ProviderRestored {
            provider_id: provider.to_string(),
        });
        removed
    }

    /// Drop every expired entry without publishing anything.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "blacklist sweep evicted expired entries");
        }
        removed
    }

    /// The active block on `provider`, if any. Does not evict.
    pub fn get(&self, provider: &str) -> Option<BlockedProvider> {
        let now = self.clock.now();
        lock(&self.entries)
            .get(provider)
            .filter(|e| !e.is_expired(now))
            .cloned()
    }

    /// Why `provider` is blocked, if it is.
    pub fn block_reason(&self, provider: &str) -> Option<BlockReason> {
        self.get(provider).map(|e| e.reason)
    }

    /// All active blocks, ordered by provider id.
    pub fn blocked(&self) -> Vec<BlockedProvider> {
        let now = self.clock.now();
        let mut active: Vec<BlockedProvider> = lock(&self.entries)
            .values()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        active
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `sweep_expired` every `period` until the handle is stopped.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let blacklist: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::spawn("blacklist-sweep", period, move || {
            if let Some(blacklist) = blacklist.upgrade() {
                blacklist.sweep_expired();
            }
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
