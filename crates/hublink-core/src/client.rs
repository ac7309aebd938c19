// ── Hub client handle ──
//
// Cheaply cloneable facade over the connection reactor. All clones share
// one connection, one cache, and one set of listeners. Dropping the last
// clone shuts the connection down.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use hublink_api::{Connector, Entity, EntityQuery, RestGateway, ServiceCall, WsConnector};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::EntityStateCache;
use crate::config::ClientConfig;
use crate::connection::{self, Command, ConnectionState, Settings, Shared};
use crate::dispatcher::{HubEvent, StateChange};
use crate::error::CoreError;

/// A persistent, auto-reconnecting client for one hub.
///
/// Created in the `Disconnected` state; call [`connect`](Self::connect) to
/// open the duplex channel. REST helpers work regardless of the socket.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl HubClient {
    /// Build a client that connects over a real WebSocket.
    ///
    /// Spawns the connection task, so it must be called from within a
    /// Tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Build a client that opens its links through `connector`.
    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, CoreError> {
        let settings = Settings::build(config)?;
        let shared = Arc::new(Shared::new(settings, Arc::new(EntityStateCache::new())));
        let cancel = CancellationToken::new();
        let commands = connection::spawn(Arc::clone(&shared), connector, cancel.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                shared,
                commands,
                cancel,
            }),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the connection and wait until it is authenticated.
    ///
    /// Idempotent: returns at once when already connected and joins the
    /// in-flight attempt when one is running. While automatic reconnects
    /// are scheduled the call keeps waiting; it fails when the client
    /// gives up (bad token, exhausted budget, reconnects disabled) or
    /// [`disconnect`](Self::disconnect) is called.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let (done, rx) = oneshot::channel();
        self.command(Command::Connect { done }).await?;
        rx.await.map_err(|_| CoreError::ConnectionClosed)?
    }

    /// Close the connection, cancel any scheduled reconnect, and fail
    /// every pending request with [`CoreError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        let (done, rx) = oneshot::channel();
        if self.command(Command::Disconnect { done }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Replace the configuration. Takes effect on the next connection
    /// attempt; an open connection keeps the settings it was opened with.
    pub fn update_config(&self, config: ClientConfig) -> Result<(), CoreError> {
        let settings = Settings::build(config)?;
        debug!(hub = %settings.config.hub_url, "configuration updated");
        self.inner.shared.settings.store(Arc::new(settings));
        Ok(())
    }

    pub fn config(&self) -> ClientConfig {
        self.inner.shared.settings.load().config.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Reconnect attempts since the last successful authentication.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Version string the hub announced during the handshake.
    pub fn hub_version(&self) -> Option<String> {
        self.inner
            .shared
            .hub_version
            .load_full()
            .map(|v| String::clone(&v))
    }

    // ── Correlated requests ──────────────────────────────────────────

    /// Send a control message and wait for its `result`, using the
    /// configured request timeout.
    ///
    /// `message` must be a JSON object with a string `type`; its `id` is
    /// assigned here.
    pub async fn send(&self, message: Value) -> Result<Value, CoreError> {
        let timeout = self.inner.shared.settings.load().config.request_timeout;
        self.send_with_timeout(message, timeout).await
    }

    pub async fn send_with_timeout(
        &self,
        message: Value,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        if !self.state().is_connected() {
            return Err(CoreError::NotConnected);
        }

        // Dropping `pending` on any early return releases the id.
        let pending = self.inner.shared.correlator.register(timeout);
        let id = pending.id();

        let frame = hublink_api::wire::encode_command(id, &message)?;
        self.command(Command::Send { id, frame }).await?;

        pending.wait().await
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Receive every [`HubEvent`] from now on.
    pub fn events(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.shared.dispatcher.subscribe()
    }

    /// [`events`](Self::events) as a `Stream`. A listener that falls
    /// behind skips the events it missed; the gap is logged.
    pub fn event_stream(&self) -> impl Stream<Item = HubEvent> + Send + 'static {
        BroadcastStream::new(self.events()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event listener fell behind; events dropped");
                None
            }
        })
    }

    /// Receive state changes for one entity only.
    pub fn subscribe_entity(&self, entity_id: &str) -> broadcast::Receiver<Arc<StateChange>> {
        self.inner.shared.dispatcher.subscribe_entity(entity_id)
    }

    // ── Cache reads ──────────────────────────────────────────────────

    pub fn entity(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.cache().get(entity_id)
    }

    pub fn entities(&self) -> Arc<Vec<Arc<Entity>>> {
        self.cache().snapshot()
    }

    pub fn entity_count(&self) -> usize {
        self.cache().len()
    }

    /// Cached entities matching `query`.
    pub fn query(&self, query: &EntityQuery) -> Vec<Arc<Entity>> {
        query.filter(self.entities().iter().cloned())
    }

    pub fn cache(&self) -> &EntityStateCache {
        self.inner.shared.dispatcher.cache()
    }

    // ── REST ─────────────────────────────────────────────────────────

    /// Gateway built from the current configuration.
    pub fn rest(&self) -> Arc<RestGateway> {
        Arc::clone(&self.inner.shared.settings.load().rest)
    }

    /// Probe the hub over HTTP.
    pub async fn ping(&self) -> Result<(), CoreError> {
        Ok(self.rest().ping().await?)
    }

    /// Fresh snapshot over HTTP. Does not touch the cache.
    pub async fn fetch_states(&self) -> Result<Vec<Entity>, CoreError> {
        Ok(self.rest().states().await?)
    }

    pub async fn fetch_state(&self, entity_id: &str) -> Result<Option<Entity>, CoreError> {
        Ok(self.rest().state(entity_id).await?)
    }

    /// One-shot control call over HTTP.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        call: &ServiceCall,
    ) -> Result<Value, CoreError> {
        Ok(self.rest().call_service(domain, service, call).await?)
    }

    async fn command(&self, command: Command) -> Result<(), CoreError> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| CoreError::ConnectionClosed)
    }
}
