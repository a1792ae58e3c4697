// ── Runtime connection configuration ──
//
// These types describe *how* to connect to a hub and how long the
// optimistic machinery waits. They carry credential data and tuning but
// never touch disk. The CLI builds a `HubConfig` and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use hublink_api::{ReconnectConfig, SessionConfig};

use crate::error::CoreError;

/// Path of the WebSocket endpoint under the hub base URL.
const WEBSOCKET_PATH: &str = "/api/websocket";

/// Timing knobs. Defaults match what the hub and typical devices need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub request_timeout: Duration,
    pub auth_timeout: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    /// Consecutive failed reconnects before the session gives up.
    /// `None` keeps retrying.
    pub reconnect_attempts: Option<u32>,
    /// How long an optimistic overlay waits for the hub's confirming event
    /// before it is rolled back.
    pub optimistic_window: Duration,
    /// How long before an unconfirmed media transport action is resent.
    pub media_confirm_window: Duration,
    /// Hard ceiling on a media action's in-flight flag.
    pub media_ceiling: Duration,
    /// Minimum spacing between accepted resync signals.
    pub resync_min_interval: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(15),
            backoff_floor: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(30),
            reconnect_attempts: None,
            optimistic_window: Duration::from_secs(5),
            media_confirm_window: Duration::from_millis(1500),
            media_ceiling: Duration::from_secs(4),
            resync_min_interval: Duration::from_secs(3),
        }
    }
}

/// Configuration for connecting to a single hub.
///
/// Built by the CLI, passed to `Controller`; core never reads config files.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub base URL (e.g. `http://homeassistant.local:8123`).
    pub url: Url,
    /// Long-lived access token.
    pub token: SecretString,
    pub tuning: Tuning,
}

impl HubConfig {
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            tuning: Tuning::default(),
        }
    }

    /// Derive the WebSocket endpoint: `http`→`ws`, `https`→`wss`, path
    /// `/api/websocket`. A URL that is already `ws`/`wss` keeps its path
    /// when it ends in the endpoint.
    pub fn websocket_url(&self) -> Result<Url, CoreError> {
        let scheme = match self.url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CoreError::from(hublink_api::Error::UnsupportedScheme(
                    other.to_owned(),
                )));
            }
        };

        let mut ws = self.url.clone();
        ws.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot use scheme '{scheme}' with {}", self.url),
        })?;

        let base = ws.path().trim_end_matches('/').to_owned();
        if !base.ends_with(WEBSOCKET_PATH) {
            ws.set_path(&format!("{base}{WEBSOCKET_PATH}"));
        }
        ws.set_query(None);
        ws.set_fragment(None);
        Ok(ws)
    }

    pub fn session_config(&self) -> Result<SessionConfig, CoreError> {
        let mut config = SessionConfig::new(
            self.websocket_url()?,
            SecretString::from(self.token.expose_secret().to_owned()),
        );
        config.auth_timeout = self.tuning.auth_timeout;
        config.request_timeout = self.tuning.request_timeout;
        config.reconnect = ReconnectConfig {
            initial_delay: self.tuning.backoff_floor,
            max_delay: self.tuning.backoff_ceiling,
            max_retries: self.tuning.reconnect_attempts,
        };
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(url: &str) -> HubConfig {
        HubConfig::new(Url::parse(url).unwrap(), SecretString::from("t"))
    }

    #[test]
    fn http_maps_to_ws() {
        let url = config("http://homeassistant.local:8123").websocket_url().unwrap();
        assert_eq!(url.as_str(), "ws://homeassistant.local:8123/api/websocket");
    }

    #[test]
    fn https_maps_to_wss_and_keeps_prefix() {
        let url = config("https://example.ui.nabu.casa/").websocket_url().unwrap();
        assert_eq!(url.as_str(), "wss://example.ui.nabu.casa/api/websocket");

        let url = config("https://proxy.example/hub").websocket_url().unwrap();
        assert_eq!(url.as_str(), "wss://proxy.example/hub/api/websocket");
    }

    #[test]
    fn websocket_url_passes_through() {
        let url = config("ws://10.0.0.2:8123/api/websocket")
            .websocket_url()
            .unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.2:8123/api/websocket");
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = config("ftp://hub.local").websocket_url().unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn session_config_carries_tuning() {
        let mut cfg = config("http://hub.local:8123");
        cfg.tuning.backoff_floor = Duration::from_millis(250);
        cfg.tuning.reconnect_attempts = Some(5);
        let session = cfg.session_config().unwrap();
        assert_eq!(session.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(session.reconnect.max_retries, Some(5));
        assert_eq!(session.request_timeout, Duration::from_secs(30));
        assert_eq!(session.url.as_str(), "ws://hub.local:8123/api/websocket");
    }
}
