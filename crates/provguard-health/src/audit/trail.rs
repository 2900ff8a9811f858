//! Append-only audit trail with `current` / `history` views.
//!
//! Both views live under one mutex, so a reader never sees a history that
//! includes an entry `current` does not point at (or the reverse).

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use provguard_core::types::AuditEntry;
use provguard_core::utils::lock;
use provguard_core::Topic;

use super::export::{export_entries, ExportFormat};
use super::filter::{filter_by_source, filter_entries, AuditFilter};

#[derive(Default)]
struct TrailState {
    current: Option<Arc<AuditEntry>>,
    history: Vec<Arc<AuditEntry>>,
}

/// A consistent read of both views.
#[derive(Clone, Debug, Default)]
pub struct AuditSnapshot {
    pub current: Option<Arc<AuditEntry>>,
    /// Oldest first.
    pub history: Vec<Arc<AuditEntry>>,
}

pub struct AuditTrail {
    state: Mutex<TrailState>,
    /// Maximum entries kept; 0 keeps everything.
    limit: usize,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AuditTrail {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(TrailState::default()),
            limit,
        }
    }

    /// Append `entry` and make it current, in one step.
    pub fn add_entry(&self, entry: AuditEntry) -> Arc<AuditEntry> {
        let entry = Arc::new(entry);
        let mut state = lock(&self.state);
        state.history.push(entry.clone());
        state.current = Some(entry.clone());

        if self.limit > 0 && state.history.len() > self.limit {
            let overflow = state.history.len() - self.limit;
            state.history.drain(..overflow);
            debug!(evicted = overflow, "audit history trimmed to limit");
        }

        debug!(
            id = %entry.id,
            provider = %entry.selected_provider,
            kind = entry.kind.as_str(),
            "audit entry recorded"
        );
        entry
    }

    /// Reset both views to empty.
    pub fn clear_history(&self) {
        let mut state = lock(&self.state);
        state.history.clear();
        state.current = None;
    }

    pub fn current(&self) -> Option<Arc<AuditEntry>> {
        lock(&self.state).current.clone()
    }

    pub fn history(&self) -> Vec<Arc<AuditEntry>> {
        lock(&self.state).history.clone()
    }

    pub fn snapshot(&self) -> AuditSnapshot {
        let state = lock(&self.state);
        AuditSnapshot {
            current: state.current.clone(),
            history: state.history.clone(),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.state).history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: Uuid) -> Option<Arc<AuditEntry>> {
        lock(&self.state).history.iter().find(|e| e.id == id).cloned()
    }

    /// History narrowed by `filter`.
    pub fn filter(&self, filter: &AuditFilter) -> Vec<Arc<AuditEntry>> {
        filter_entries(&self.history(), filter)
    }

    /// History entries produced by `source`.
    pub fn by_source(&self, source: Topic) -> Vec<Arc<AuditEntry>> {
        filter_by_source(&self.history(), source)
    }

    /// Render the whole history in `format`.
    pub fn export(&self, format: ExportFormat) -> provguard_core::Result<String> {
        export_entries(&self.history(), format)
    }

    /// Every provider named in the history, selected or candidate, sorted.
    pub fn available_providers(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut providers = BTreeSet::new();
        for entry in &state.history {
            providers.insert(entry.selected_provider.as_str());
            providers.extend(entry.provider_candidates.iter().map(|c| c.id.as_str()));
        }
        providers
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }

    /// Every strategy named in the history, sorted.
    pub fn available_strategies(&self) -> Vec<String> {
        let state = lock(&self.state);
        state
            .history
            .iter()
            .map(|e| e.strategy_name.as_str())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use provguard_core::types::{EntryKind, ProviderCandidate};

    fn entry(provider: &str, strategy: &str) -> AuditEntry {
        AuditEntry::new(provider, Topic::ProviderSuccess, EntryKind::ProviderChange, Utc::now())
            .with_strategy(strategy)
    }

    #[test]
    fn test_add_updates_current_and_history() {
        let trail = AuditTrail::default();
        assert!(trail.current().is_none());

        trail.add_entry(entry("openai", "adaptive"));
        let second = trail.add_entry(entry("groq", "adaptive"));

        let snap = trail.snapshot();
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.history[0].selected_provider, "openai");
        assert_eq!(snap.current.unwrap().id, second.id);
    }

    #[test]
    fn test_clear_resets_both_views() {
        let trail = AuditTrail::default();
        trail.add_entry(entry("openai", "adaptive"));
        trail.clear_history();

        assert!(trail.current().is_none());
        assert!(trail.is_empty());
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let trail = AuditTrail::new(2);
        trail.add_entry(entry("a", "s"));
        trail.add_entry(entry("b", "s"));
        let last = trail.add_entry(entry("c", "s"));

        let history = trail.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].selected_provider, "b");
        assert_eq!(trail.current().unwrap().id, last.id);
    }

    #[test]
    fn test_find_by_id() {
        let trail = AuditTrail::default();
        let recorded = trail.add_entry(entry("openai", "adaptive"));
        assert_eq!(trail.find(recorded.id).unwrap().selected_provider, "openai");
        assert!(trail.find(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_available_sets_are_unique_and_sorted() {
        let trail = AuditTrail::default();
        trail.add_entry(
            entry("openai", "RoundRobin")
                .with_candidates(vec![ProviderCandidate::new("openai"), ProviderCandidate::new("anthropic")]),
        );
        trail.add_entry(entry("groq", "adaptive"));
        trail.add_entry(entry("openai", "adaptive"));
        trail.add_entry(entry("", ""));

        assert_eq!(trail.available_providers(), vec!["anthropic", "groq", "openai"]);
        assert_eq!(trail.available_strategies(), vec!["RoundRobin", "adaptive"]);
    }
}
