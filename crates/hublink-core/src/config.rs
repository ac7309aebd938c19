// ── Runtime client configuration ──
//
// Describes *how* to reach a hub: where it lives, which token to present,
// and the timing knobs for reconnects, requests, and heartbeats. Core never
// reads config files; the CLI (or any embedder) builds a `ClientConfig` and
// hands it in.

use std::collections::BTreeSet;
use std::time::Duration;

use hublink_api::{RetryPolicy, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Path of the duplex endpoint relative to the hub root.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// TLS verification strategy for the REST gateway.
///
/// The socket connector always verifies against the bundled webpki roots.
pub type TlsVerification = TlsMode;

/// Configuration for one hub connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub root URL, e.g. `http://hub.local:8123`.
    pub hub_url: Url,
    /// Long-lived access token.
    pub token: SecretString,
    /// Schedule reconnects after a lost connection.
    pub auto_reconnect: bool,
    /// Unit of the reconnect delay (`base * min(attempt, 5)`).
    pub reconnect_base_interval: Duration,
    /// Reconnect budget. Reset on every successful authentication.
    pub max_reconnect_attempts: u32,
    /// Entities whose updates are cached. Empty means every entity.
    pub tracked_entity_ids: BTreeSet<String>,
    /// Default deadline for correlated requests.
    pub request_timeout: Duration,
    /// Period of the keep-alive ping while connected.
    pub heartbeat_interval: Duration,
    /// Total tries for a REST call that fails at the transport level.
    pub rest_retry_attempts: u32,
    /// Unit of the REST retry delay (`base * 2^attempt`).
    pub rest_retry_base_delay: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    pub tls: TlsVerification,
}

impl ClientConfig {
    /// Config with the stock timings: 5s reconnect unit, 10 reconnects,
    /// 30s request timeout, 30s heartbeat, 3 REST tries from 1s.
    pub fn new(hub_url: Url, token: SecretString) -> Self {
        Self {
            hub_url,
            token,
            auto_reconnect: true,
            reconnect_base_interval: Duration::from_millis(5000),
            max_reconnect_attempts: 10,
            tracked_entity_ids: BTreeSet::new(),
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            rest_retry_attempts: 3,
            rest_retry_base_delay: Duration::from_millis(1000),
            http_timeout: Duration::from_secs(30),
            tls: TlsVerification::default(),
        }
    }

    /// Restrict the cache to the given entity ids.
    pub fn track<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_entity_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Whether updates for `entity_id` belong in the cache.
    pub fn tracks(&self, entity_id: &str) -> bool {
        self.tracked_entity_ids.is_empty() || self.tracked_entity_ids.contains(entity_id)
    }

    /// Duplex endpoint derived from the hub URL: `http` becomes `ws`,
    /// `https` becomes `wss`, and the path becomes `/api/websocket` under
    /// whatever base path the hub is mounted at.
    pub fn websocket_url(&self) -> Result<Url, CoreError> {
        let scheme = match self.hub_url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CoreError::Config {
                    message: format!("unsupported hub URL scheme '{other}'"),
                });
            }
        };

        let mut url = self.hub_url.clone();
        url.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot derive socket URL from {}", self.hub_url),
        })?;
        let base = self.hub_url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{base}{WEBSOCKET_PATH}"));
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::linear_capped(self.reconnect_base_interval, self.max_reconnect_attempts)
    }

    pub fn rest_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.rest_retry_base_delay, self.rest_retry_attempts)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.http_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(url: &str) -> ClientConfig {
        ClientConfig::new(
            Url::parse(url).unwrap(),
            SecretString::from("token".to_string()),
        )
    }

    #[test]
    fn defaults_match_stock_timings() {
        let cfg = config("http://hub.local:8123");
        assert!(cfg.auto_reconnect);
        assert_eq!(cfg.reconnect_base_interval, Duration::from_millis(5000));
        assert_eq!(cfg.max_reconnect_attempts, 10);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.rest_retry_attempts, 3);
        assert_eq!(cfg.rest_retry_base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn websocket_url_swaps_scheme_and_path() {
        assert_eq!(
            config("http://hub.local:8123").websocket_url().unwrap().as_str(),
            "ws://hub.local:8123/api/websocket"
        );
        assert_eq!(
            config("https://hub.example.org/").websocket_url().unwrap().as_str(),
            "wss://hub.example.org/api/websocket"
        );
    }

    #[test]
    fn websocket_url_keeps_base_path() {
        assert_eq!(
            config("https://proxy.example.org/hub/?x=1")
                .websocket_url()
                .unwrap()
                .as_str(),
            "wss://proxy.example.org/hub/api/websocket"
        );
    }

    #[test]
    fn websocket_url_rejects_unknown_scheme() {
        assert!(matches!(
            config("ftp://hub.local").websocket_url(),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn empty_tracking_set_tracks_everything() {
        let cfg = config("http://hub.local:8123");
        assert!(cfg.tracks("light.anything"));

        let cfg = cfg.track(["light.kitchen"]);
        assert!(cfg.tracks("light.kitchen"));
        assert!(!cfg.tracks("light.porch"));
    }

    #[test]
    fn reconnect_policy_uses_linear_curve() {
        let policy = config("http://hub.local:8123").reconnect_policy();
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(4), Duration::from_millis(20_000));
        assert_eq!(policy.delay(9), Duration::from_millis(25_000));
        assert!(policy.allows(9));
        assert!(!policy.allows(10));
    }
}
