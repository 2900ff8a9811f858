//! `provguard status` — show the effective configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use provguard_core::config::{get_config_path, load_config};

/// Run the status command.
pub fn run(path: Option<&Path>) -> Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let config = load_config(Some(&config_path));

    println!();
    println!("{}", "Provguard Status".cyan().bold());
    println!();

    println!(
        "  {:<22} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, defaults)".red().to_string()
        }
    );

    let health = &config.health;
    println!();
    println!("  {}", "Health:".bold());
    println!("    {:<20} {}s", "blacklist TTL", health.blacklist_ttl_secs);
    println!("    {:<20} {}s", "sweep interval", health.sweep_interval().as_secs());
    println!("    {:<20} {}s", "mitigation interval", health.mitigation_interval().as_secs());
    println!("    {:<20} {}", "confidence threshold", health.effective_threshold());
    println!(
        "    {:<20} {}",
        "history limit",
        if health.history_limit == 0 {
            "unbounded".to_string()
        } else {
            health.history_limit.to_string()
        }
    );
    println!("    {:<20} {}", "ignore replayed", health.ignore_replayed);

    let analyzer = &config.analyzer;
    println!();
    println!("  {}", "Analyzer:".bold());
    println!("    {:<20} {}", "window size", analyzer.window_size);
    println!(
        "    {:<20} > {}ms x{} (critical > {}ms)",
        "latency",
        analyzer.latency_threshold_ms,
        analyzer.min_latency_violations,
        analyzer.latency_critical_ms
    );
    println!(
        "    {:<20} < {} (critical < {})",
        "success rate", analyzer.success_rate_threshold, analyzer.success_rate_critical
    );
    println!(
        "    {:<20} >= {} (critical >= {})",
        "failure streak", analyzer.failure_streak_threshold, analyzer.failure_streak_critical
    );

    println!();
    println!("  {}", "Routing:".bold());
    println!("    {:<20} {}", "strategy", config.routing.strategy);
    if config.routing.providers.is_empty() {
        println!("    {:<20} {}", "providers", "· none configured".dimmed());
    } else {
        println!("    {:<20} {}", "providers", config.routing.providers.join(", "));
    }
    println!();

    Ok(())
}
