//! Shared configuration for hublink front-ends.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `hublink_core::HubConfig`. Core never reads files; the
//! CLI layers its own flag overrides on top of what this crate returns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hublink_core::{HubConfig, Tuning};

/// Keyring service name for stored tokens.
pub const KEYRING_SERVICE: &str = "hublink";

/// Environment variable consulted after a profile's own `token_env`.
pub const TOKEN_ENV: &str = "HUBLINK_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("keyring access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is requested explicitly.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named hub profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Hub base URL (e.g., "http://homeassistant.local:8123").
    pub url: String,

    /// Long-lived access token (plaintext; prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Request timeout override, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// How long an optimistic state waits for the hub, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_window_ms: Option<u64>,

    /// Media resend window, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_confirm_window_ms: Option<u64>,

    /// Media in-flight ceiling, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ceiling_ms: Option<u64>,

    /// Reconnect backoff ceiling, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_max_secs: Option<u64>,

    /// Failed reconnects in a row before giving up. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("app", "neolia", "hublink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hublink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. Missing files yield defaults plus env.
///
/// Environment keys nest on a double underscore, e.g.
/// `HUBLINK_DEFAULTS__OUTPUT=json` or `HUBLINK_DEFAULT_PROFILE=lab`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUBLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile lookup ──────────────────────────────────────────────────

/// Requested name, else the configured default, else `"default"`.
pub fn active_profile_name(requested: Option<&str>, config: &Config) -> String {
    requested
        .map(str::to_owned)
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub fn find_profile<'a>(config: &'a Config, name: &str) -> Result<&'a Profile, ConfigError> {
    config
        .profiles
        .get(name)
        .ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.into(),
            available: profile_names(config).join(", "),
        })
}

/// Profile names, sorted.
pub fn profile_names(config: &Config) -> Vec<String> {
    let mut names: Vec<String> = config.profiles.keys().cloned().collect();
    names.sort();
    names
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

/// Resolve the access token from the credential chain.
///
/// Order: the profile's `token_env` variable, `HUBLINK_TOKEN`, the
/// system keyring, then the plaintext `token` field.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(val) = std::env::var(TOKEN_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token for `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(token)?;
    Ok(())
}

// ── Translation to core ─────────────────────────────────────────────

pub fn parse_url(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("unsupported scheme '{other}', expected http(s) or ws(s)"),
        }),
    }
}

/// Apply a profile's tuning overrides on top of the defaults.
pub fn profile_tuning(profile: &Profile, defaults: &Defaults) -> Tuning {
    let mut tuning = Tuning {
        request_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..Tuning::default()
    };
    if let Some(ms) = profile.optimistic_window_ms {
        tuning.optimistic_window = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.media_confirm_window_ms {
        tuning.media_confirm_window = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.media_ceiling_ms {
        tuning.media_ceiling = Duration::from_millis(ms);
    }
    if let Some(secs) = profile.backoff_max_secs {
        tuning.backoff_ceiling = Duration::from_secs(secs);
    }
    tuning.reconnect_attempts = profile.reconnect_attempts;
    tuning
}

/// Build a `HubConfig` from a profile, with no front-end overrides.
pub fn profile_to_hub_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<HubConfig, ConfigError> {
    let url = parse_url(&profile.url)?;
    let token = resolve_token(profile, profile_name)?;

    let mut config = HubConfig::new(url, token);
    config.tuning = profile_tuning(profile, defaults);
    Ok(config)
}
