//! Shared CLI helpers — section headers and colored rendering of engine state.

use colored::{ColoredString, Colorize};

use provguard_core::types::{AuditEntry, BlockedProvider, EntryKind, WarningEntry, WarningLevel};
use provguard_core::utils::truncate_string;
use provguard_health::TickOutcome;

/// Widest reason shown in the audit table.
const REASON_WIDTH: usize = 60;

pub fn print_header(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

pub fn level(level: WarningLevel) -> ColoredString {
    match level {
        WarningLevel::Critical => level.as_str().red().bold(),
        WarningLevel::High => level.as_str().yellow().bold(),
        WarningLevel::Moderate => level.as_str().yellow(),
    }
}

pub fn format_warning(w: &WarningEntry) -> String {
    format!(
        "{:<12} {:<14} {:>9.2} (threshold {}) {}",
        w.provider,
        w.signal.as_str(),
        w.value,
        w.threshold,
        level(w.level)
    )
}

pub fn format_block(b: &BlockedProvider) -> String {
    format!(
        "{:<12} {:<16} until {}",
        b.provider_id,
        b.reason.as_str(),
        b.expires_at.format("%H:%M:%S")
    )
}

pub fn format_outcome(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::Idle => "idle".dimmed().to_string(),
        TickOutcome::AlreadyBlocked { provider } => {
            format!("{} {provider} already blocked", "skip".dimmed())
        }
        TickOutcome::BelowThreshold {
            provider,
            confidence,
        } => format!("{} {provider} confidence {confidence:.2}", "hold".yellow()),
        TickOutcome::Triggered {
            from,
            to,
            confidence,
        } => format!(
            "{} {from} → {} confidence {confidence:.2}",
            "failover".red().bold(),
            to.as_deref().unwrap_or("none")
        ),
        TickOutcome::Failed { error } => format!("{} {error}", "error".red()),
    }
}

pub fn format_entry(e: &AuditEntry) -> String {
    let status = if e.success {
        "✓".green()
    } else {
        "✗".red()
    };
    let kind = match e.kind {
        EntryKind::ProviderChange => e.kind.as_str().normal(),
        EntryKind::Predictive => e.kind.as_str().magenta(),
        EntryKind::Replay => e.kind.as_str().blue(),
    };
    format!(
        "{} {} {:<15} {:<12} {:<10} {}",
        e.timestamp.format("%H:%M:%S"),
        status,
        kind,
        e.selected_provider,
        e.strategy_name,
        truncate_string(&e.fallback_reason, REASON_WIDTH).dimmed()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mentions_providers() {
        colored::control::set_override(false);
        let text = format_outcome(&TickOutcome::Triggered {
            from: "openai".into(),
            to: None,
            confidence: 0.912,
        });
        assert_eq!(text, "failover openai → none confidence 0.91");
    }

    #[test]
    fn test_entry_reason_truncated() {
        colored::control::set_override(false);
        let entry = AuditEntry::new(
            "openai",
            provguard_core::Topic::ProviderFailure,
            EntryKind::ProviderChange,
            chrono::Utc::now(),
        )
        .with_reason("x".repeat(200));
        let line = format_entry(&entry);
        assert!(line.ends_with("..."));
        assert!(line.len() < 200);
    }
}
