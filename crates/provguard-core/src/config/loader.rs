//! Config loader — reads `~/.provguard/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.provguard/config.json`
//! 3. Environment variables `PROVGUARD_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    apply_env_overrides(load_config_from_path(&config_path))
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        warn!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<PathBuf> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(config_path)
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `PROVGUARD_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `PROVGUARD_HEALTH__BLACKLIST_TTL_SECS`
/// - `PROVGUARD_HEALTH__SWEEP_INTERVAL_SECS`
/// - `PROVGUARD_HEALTH__MITIGATION_INTERVAL_SECS`
/// - `PROVGUARD_HEALTH__CONFIDENCE_THRESHOLD`
/// - `PROVGUARD_HEALTH__HISTORY_LIMIT`
/// - `PROVGUARD_HEALTH__IGNORE_REPLAYED`
/// - `PROVGUARD_ANALYZER__WINDOW_SIZE`
/// - `PROVGUARD_ROUTING__STRATEGY`
/// - `PROVGUARD_ROUTING__PROVIDERS` (comma-separated)
fn apply_env_overrides(mut config: Config) -> Config {
    let health = &mut config.health;
    override_parsed("PROVGUARD_HEALTH__BLACKLIST_TTL_SECS", &mut health.blacklist_ttl_secs);
    override_parsed("PROVGUARD_HEALTH__SWEEP_INTERVAL_SECS", &mut health.sweep_interval_secs);
    override_parsed(
        "PROVGUARD_HEALTH__MITIGATION_INTERVAL_SECS",
        &mut health.mitigation_interval_secs,
    );
    override_parsed("PROVGUARD_HEALTH__CONFIDENCE_THRESHOLD", &mut health.confidence_threshold);
    override_parsed("PROVGUARD_HEALTH__HISTORY_LIMIT", &mut health.history_limit);
    if let Ok(val) = std::env::var("PROVGUARD_HEALTH__IGNORE_REPLAYED") {
        health.ignore_replayed = val == "true" || val == "1";
    }

    override_parsed("PROVGUARD_ANALYZER__WINDOW_SIZE", &mut config.analyzer.window_size);

    if let Ok(val) = std::env::var("PROVGUARD_ROUTING__STRATEGY") {
        config.routing.strategy = val;
    }
    if let Ok(val) = std::env::var("PROVGUARD_ROUTING__PROVIDERS") {
        config.routing.providers = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    config
}

/// Overwrite `target` with the parsed env var, ignoring unparsable values.
fn override_parsed<T: FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var, value = %val, "ignoring unparsable env override"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
