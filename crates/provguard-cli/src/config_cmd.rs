//! `provguard config` — write a default configuration file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use provguard_core::config::{get_config_path, save_config, Config};
use provguard_core::utils::expand_home;

/// Run the config command.
pub fn run(path: Option<&str>, force: bool) -> Result<()> {
    let target: PathBuf = path.map(expand_home).unwrap_or_else(get_config_path);

    println!();
    if target.exists() && !force {
        println!(
            "  {} config already exists at {} {}",
            "✓".green(),
            target.display(),
            "(use --force to overwrite)".dimmed()
        );
        println!();
        return Ok(());
    }

    let written = save_config(&Config::default(), Some(&target))
        .with_context(|| format!("failed to write config to {}", target.display()))?;
    println!("  {} wrote default config to {}", "✓".green(), written.display());
    println!();
    Ok(())
}
