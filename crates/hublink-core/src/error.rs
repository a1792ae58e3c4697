// ── Core error types ──
//
// User-facing errors from hublink-core. Consumers never see raw frames or
// socket errors directly; the `From<hublink_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection to hub closed")]
    ConnectionClosed,

    #[error("Not connected to hub")]
    NotConnected,

    #[error("Hub request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Command for {entity_id} could not be sent: {reason}")]
    SendFailed { entity_id: String, reason: String },

    #[error("No confirmation for {entity_id} within {window_secs}s, state restored")]
    ConfirmationTimeout { entity_id: String, window_secs: u64 },

    #[error("Command for {entity_id} was superseded by a newer one")]
    Superseded { entity_id: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Snapshot load failed: {message}")]
    SnapshotLoad { message: String },

    #[error("Registry load failed ({registry}): {message}")]
    RegistryLoad { registry: String, message: String },

    #[error("Entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    #[error(transparent)]
    InvalidEntityId(#[from] crate::model::EntityIdError),

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} on {domain}")]
    Unsupported { operation: String, domain: String },

    #[error("Hub rejected the request ({code}): {message}")]
    Hub { code: String, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Errors that mean the command never reached the hub.
    pub fn is_send_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::NotConnected
                | Self::ConnectionFailed { .. }
                | Self::SendFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hublink_api::Error> for CoreError {
    fn from(err: hublink_api::Error) -> Self {
        use hublink_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::AuthTimeout { timeout_secs } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("no authentication response within {timeout_secs}s"),
            },
            Api::ConnectionClosed => CoreError::ConnectionClosed,
            Api::NotConnected => CoreError::NotConnected,
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("Unsupported URL scheme '{scheme}'"),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Hub { code, message } => CoreError::Hub { code, message },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::Serialization(message) => {
                CoreError::Internal(format!("Serialization error: {message}"))
            }
        }
    }
}
