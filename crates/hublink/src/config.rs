//! CLI configuration: a thin wrapper around `hublink_config` that layers
//! `GlobalOpts` flag overrides (--url, --token, --timeout, --config) on top.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use hublink_core::HubConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use hublink_config::{
    Config, Profile, find_profile, parse_url, profile_names, store_token,
};

// ── File location ───────────────────────────────────────────────────

/// `--config` if given, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(hublink_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(hublink_config::load_config_from(&config_path(global))?)
}

pub fn save_config(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    hublink_config::save_config_to(cfg, &config_path(global))?;
    Ok(())
}

pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    hublink_config::active_profile_name(global.profile.as_deref(), config)
}

// ── Resolution ──────────────────────────────────────────────────────

/// Build a `HubConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile the hub is described by flags alone, which
/// then need both --url and --token.
pub fn build_hub_config(global: &GlobalOpts) -> Result<HubConfig, CliError> {
    let cfg = load_config(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let Some(profile) = cfg.profiles.get(&profile_name) else {
        // An explicitly requested profile must exist.
        if global.profile.is_some() {
            find_profile(&cfg, &profile_name)?;
        }
        return from_flags(global, &profile_name);
    };

    // 1. URL (flag > env > profile)
    let url = parse_url(global.url.as_deref().unwrap_or(&profile.url))?;

    // 2. Token (flag > token chain)
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => hublink_config::resolve_token(profile, &profile_name)?,
    };

    // 3. Tuning
    let mut tuning = hublink_config::profile_tuning(profile, &cfg.defaults);
    if let Some(secs) = global.timeout {
        tuning.request_timeout = Duration::from_secs(secs);
    }

    let mut config = HubConfig::new(url, token);
    config.tuning = tuning;
    Ok(config)
}

fn from_flags(global: &GlobalOpts, profile_name: &str) -> Result<HubConfig, CliError> {
    let raw = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path(global).display().to_string(),
    })?;
    let url = parse_url(raw)?;

    let token = global
        .token
        .clone()
        .or_else(|| std::env::var(hublink_config::TOKEN_ENV).ok())
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.into(),
        })?;

    let mut config = HubConfig::new(url, SecretString::from(token));
    if let Some(secs) = global.timeout {
        config.tuning.request_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}
