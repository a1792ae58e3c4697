//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hublink_config::ConfigError;
use hublink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const NOT_CONFIRMED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to hub at {url}")]
    #[diagnostic(
        code(hublink::connection_failed),
        help(
            "Check that the hub is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the hub was lost")]
    #[diagnostic(
        code(hublink::connection_lost),
        help("The command may not have reached the hub. Retry once it is reachable.")
    )]
    ConnectionLost,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hublink::auth_failed),
        help(
            "Create a long-lived access token in the hub's user profile, then run:\n\
             hublink config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(hublink::no_credentials),
        help(
            "Store one with: hublink config set-token --profile {profile}\n\
             Or set the HUBLINK_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Entities ─────────────────────────────────────────────────────
    #[error("Entity '{entity_id}' not found")]
    #[diagnostic(
        code(hublink::not_found),
        help("Run: hublink entities to see available entities")
    )]
    NotFound { entity_id: String },

    #[error("'{operation}' is not supported for {domain} entities")]
    #[diagnostic(
        code(hublink::unsupported),
        help("Use `hublink call <entity> <service>` to invoke a specific service.")
    )]
    Unsupported { operation: String, domain: String },

    #[error("{entity_id}: {reason}")]
    #[diagnostic(
        code(hublink::not_confirmed),
        help("The hub accepted the command but never reported the new state.")
    )]
    NotConfirmed { entity_id: String, reason: String },

    // ── Hub ──────────────────────────────────────────────────────────
    #[error("Hub error ({code}): {message}")]
    #[diagnostic(code(hublink::hub_error))]
    Hub { code: String, message: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(hublink::timeout),
        help("Increase the timeout with --timeout or check hub responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hublink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hublink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hublink config init --url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(hublink::no_config),
        help(
            "Create a profile with: hublink config init --url <URL>\n\
             Or pass --url and --token. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(hublink::config))]
    Config { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(hublink::json), help("Service data must be a JSON object."))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(hublink::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::NotConfirmed { .. } => exit_code::NOT_CONFIRMED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },

            CoreError::ConnectionClosed | CoreError::NotConnected => CliError::ConnectionLost,

            CoreError::SendFailed { entity_id, reason } => CliError::NotConfirmed {
                entity_id,
                reason: format!("command could not be sent ({reason})"),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::ConfirmationTimeout {
                entity_id,
                window_secs,
            } => CliError::NotConfirmed {
                entity_id,
                reason: format!("no confirmation within {window_secs}s, state restored"),
            },

            CoreError::Superseded { entity_id } => CliError::NotConfirmed {
                entity_id,
                reason: "superseded by a newer command".into(),
            },

            CoreError::EntityNotFound { entity_id } => CliError::NotFound { entity_id },

            CoreError::InvalidEntityId(e) => CliError::Validation {
                field: "entity_id".into(),
                reason: e.to_string(),
            },

            CoreError::Unsupported { operation, domain } => {
                CliError::Unsupported { operation, domain }
            }

            CoreError::Hub { code, message } => CliError::Hub { code, message },

            CoreError::SnapshotLoad { message } => CliError::Hub {
                code: "snapshot".into(),
                message,
            },

            CoreError::RegistryLoad { registry, message } => CliError::Hub {
                code: registry,
                message,
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
