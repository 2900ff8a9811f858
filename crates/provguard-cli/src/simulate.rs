//! `provguard simulate` — drive the health engine through a scenario.
//!
//! By default time is simulated: a manual clock advances per step and the
//! mitigation loop is ticked directly. With `--realtime` the engine runs on
//! the system clock with its own sweep and mitigation timers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use provguard_core::config::Config;
use provguard_core::{ManualClock, SharedClock, SystemClock};
use provguard_health::{AuditFilter, ExportFormat, HealthEngine};

use crate::helpers;
use crate::scenario::Scenario;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario JSON file (defaults to a built-in degraded-provider run)
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Mitigation ticks to run after the scenario
    #[arg(long, default_value_t = 3)]
    pub ticks: u32,

    /// Only show audit entries for this event type (provider:failure, provider:success, strategy:adaptive:change)
    #[arg(long)]
    pub event: Option<String>,

    /// Only show audit entries involving this provider
    #[arg(long)]
    pub provider: Option<String>,

    /// Only show audit entries recorded under this strategy
    #[arg(long)]
    pub strategy: Option<String>,

    /// Replay the most recent live audit entry before printing
    #[arg(long, default_value_t = false)]
    pub replay_last: bool,

    /// Print the filtered trail as json or csv instead of a table
    #[arg(long)]
    pub export: Option<ExportFormat>,

    /// Use the system clock and the engine's own timers
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub logs: bool,
}

/// Run the simulate command.
pub async fn run(mut config: Config, args: SimulateArgs) -> Result<()> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::degraded_provider(),
    };
    if config.routing.providers.is_empty() {
        config.routing.providers = scenario.providers.clone();
    }

    if args.realtime {
        run_realtime(config, &scenario, &args).await?;
    } else {
        run_simulated(config, &scenario, &args)?;
    }
    Ok(())
}

fn run_simulated(config: Config, scenario: &Scenario, args: &SimulateArgs) -> Result<()> {
    let clock = Arc::new(ManualClock::starting_now());
    let engine = HealthEngine::with_clock(config, clock.clone());
    let tick_secs = engine.config().health.mitigation_interval().as_secs() as i64;

    play(&engine, scenario, |secs| clock.advance_secs(secs))?;

    helpers::print_header("Mitigation ticks");
    for n in 1..=args.ticks {
        clock.advance_secs(tick_secs);
        let outcome = engine.mitigation().tick();
        println!("  #{n:<3} {}", helpers::format_outcome(&outcome));
    }

    report(&engine, args)
}

async fn run_realtime(config: Config, scenario: &Scenario, args: &SimulateArgs) -> Result<()> {
    let clock: SharedClock = Arc::new(SystemClock);
    let engine = HealthEngine::with_clock(config, clock);
    let period = engine.config().health.mitigation_interval();

    play(&engine, scenario, |_| {})?;

    let handle = engine.start();
    let wait = period * args.ticks + Duration::from_millis(100);
    info!(wait_ms = wait.as_millis() as u64, "waiting for mitigation ticks");
    tokio::time::sleep(wait).await;
    handle.join().await;

    report(&engine, args)
}

/// Publish every scenario step, calling `advance` with each step's delay first.
fn play(engine: &HealthEngine, scenario: &Scenario, mut advance: impl FnMut(i64)) -> Result<()> {
    for step in &scenario.steps {
        advance(step.advance_secs.max(0));
        let event = step.to_event(engine.clock().now())?;
        engine.bus().publish(event);
    }
    info!(steps = scenario.steps.len(), "scenario played");
    Ok(())
}

fn report(engine: &HealthEngine, args: &SimulateArgs) -> Result<()> {
    if args.replay_last {
        let last_live = engine
            .trail()
            .history()
            .into_iter()
            .rev()
            .find(|e| e.is_live_outcome());
        if let Some(entry) = last_live {
            let replayed = engine.replay(&entry);
            helpers::print_header("Replay");
            println!("  {} {}", entry.id, if replayed { "ok".green() } else { "failed".red() });
        }
    }

    let filter = AuditFilter {
        event_type: args.event.clone(),
        provider: args.provider.clone(),
        strategy: args.strategy.clone(),
    };
    let entries = engine.trail().filter(&filter);

    if let Some(format) = args.export {
        println!("{}", provguard_health::audit::export_entries(&entries, format)?);
        return Ok(());
    }

    helpers::print_header("Warnings");
    let warnings = engine.warnings();
    if warnings.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for w in &warnings {
        println!("  {}", helpers::format_warning(w));
    }

    helpers::print_header("Blacklist");
    let blocked = engine.blacklist().blocked();
    if blocked.is_empty() {
        println!("  {}", "empty".dimmed());
    }
    for b in &blocked {
        println!("  {}", helpers::format_block(b));
    }

    let state = engine.mitigation().state();
    helpers::print_header("Auto-mitigation");
    println!(
        "  active: {}  current: {}  next: {}  confidence: {:.2}",
        state.is_active,
        state.current_provider.as_deref().unwrap_or("-"),
        state.next_provider.as_deref().unwrap_or("-"),
        state.confidence
    );

    helpers::print_header(&format!(
        "Audit trail ({} of {} entries)",
        entries.len(),
        engine.trail().len()
    ));
    for e in &entries {
        println!("  {}", helpers::format_entry(e));
    }
    println!();
    println!(
        "  {} {}",
        "providers:".dimmed(),
        engine.trail().available_providers().join(", ")
    );
    println!(
        "  {} {}",
        "strategies:".dimmed(),
        engine.trail().available_strategies().join(", ")
    );
    println!();

    Ok(())
}
