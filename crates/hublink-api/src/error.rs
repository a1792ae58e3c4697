use thiserror::Error;

/// Top-level error type for the `hublink-api` crate.
///
/// Covers every failure mode of the hub WebSocket API: the auth
/// handshake, the socket itself, correlated requests, and payload
/// decoding. `hublink-core` maps these into domain-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub answered the credential with `auth_invalid`.
    #[error("Authentication rejected by hub: {message}")]
    Authentication { message: String },

    /// The socket never opened, or `auth_ok` / `auth_invalid` never arrived.
    #[error("Authentication handshake timed out after {timeout_secs}s")]
    AuthTimeout { timeout_secs: u64 },

    // ── Session ─────────────────────────────────────────────────────
    /// The socket dropped while the request was in flight.
    #[error("Connection closed before the hub replied")]
    ConnectionClosed,

    /// The session is not in the open + authenticated phase.
    #[error("Not connected to hub")]
    NotConnected,

    /// No response arrived for a correlated request in time.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Transport ───────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The hub URL does not use a scheme we can map to a WebSocket.
    #[error("Unsupported URL scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    /// WebSocket connection or I/O failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the hub.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Hub responses ───────────────────────────────────────────────
    /// The hub answered a request with `success: false`.
    #[error("Hub error ({code}): {message}")]
    Hub { code: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw payload for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outgoing request could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns `true` if the hub rejected the credential.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::NotConnected
                | Self::Timeout { .. }
                | Self::AuthTimeout { .. }
                | Self::WebSocketConnect(_)
                | Self::WebSocketClosed { .. }
        )
    }

    /// Extract the hub error code, if available.
    pub fn hub_error_code(&self) -> Option<&str> {
        match self {
            Self::Hub { code, .. } => Some(code),
            _ => None,
        }
    }
}
