//! Audit history filters.
//!
//! The event-type filter infers the event from `fallback_reason` text:
//!
//! | event type                 | reason contains |
//! |----------------------------|-----------------|
//! | `provider:failure`         | `failed`        |
//! | `strategy:adaptive:change` | `strategy`      |
//! | `provider:success`         | `restored`      |
//!
//! Existing consumers depend on exactly this matching, ambiguities included.
//! [`filter_by_source`] is the unambiguous alternative, keyed on the topic
//! each entry was recorded from.

use std::sync::Arc;

use provguard_core::types::AuditEntry;
use provguard_core::Topic;

/// Criteria for [`filter_entries`]. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub event_type: Option<String>,
    pub provider: Option<String>,
    pub strategy: Option<String>,
}

impl AuditFilter {
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(event_type) = active(&self.event_type) {
            if !matches_event_type(entry, event_type) {
                return false;
            }
        }
        if let Some(provider) = active(&self.provider) {
            if !entry.involves(provider) {
                return false;
            }
        }
        if let Some(strategy) = active(&self.strategy) {
            if entry.strategy_name != strategy {
                return false;
            }
        }
        true
    }
}

/// A criterion is inactive when unset, blank, or `"all"`.
fn active(criterion: &Option<String>) -> Option<&str> {
    criterion
        .as_deref()
        .filter(|c| !c.is_empty() && *c != "all")
}

/// Reason-text matching for an event type. Unknown types match nothing.
fn matches_event_type(entry: &AuditEntry, event_type: &str) -> bool {
    let needle = match event_type {
        "provider:failure" => "failed",
        "strategy:adaptive:change" => "strategy",
        "provider:success" => "restored",
        _ => return false,
    };
    entry.fallback_reason.contains(needle)
}

/// Entries of `history` matching `filter`, order preserved.
pub fn filter_entries(history: &[Arc<AuditEntry>], filter: &AuditFilter) -> Vec<Arc<AuditEntry>> {
    history.iter().filter(|e| filter.matches(e)).cloned().collect()
}

/// Entries of `history` recorded from `source`, order preserved.
pub fn filter_by_source(history: &[Arc<AuditEntry>], source: Topic) -> Vec<Arc<AuditEntry>> {
    history.iter().filter(|e| e.source == source).cloned().collect()
}
