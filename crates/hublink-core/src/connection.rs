//! Connection lifecycle.
//!
//! A single reactor task owns everything that changes with the connection:
//! the [`ConnectionState`], the open [`Link`], the authentication handshake,
//! the heartbeat and reconnect timers, and every write to the entity cache.
//! Callers talk to it through [`Command`]s; background work it spawns (the
//! event subscription reply, the snapshot fetch) reports back through the
//! same channel tagged with the connection *generation* it was started
//! for, so results from a torn-down connection are recognised and dropped.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use futures_util::future::BoxFuture;
use hublink_api::wire::{self, ClientMessage, EventPayload, HubMessage, STATE_CHANGED};
use hublink_api::{Connector, Entity, Link, LinkEvent, RestGateway};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthHandshake, AuthStep};
use crate::cache::EntityStateCache;
use crate::config::ClientConfig;
use crate::correlator::RequestCorrelator;
use crate::dispatcher::{EventDispatcher, HubEvent};
use crate::error::CoreError;
use crate::heartbeat::HeartbeatMonitor;

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── Public state ─────────────────────────────────────────────────────

/// Where the client is in its connection lifecycle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumIs,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    /// Authentication was rejected or the reconnect budget ran out.
    /// Only an explicit `connect()` leaves this state.
    Error,
}

// ── Shared between the reactor and client handles ───────────────────

/// A config together with the REST gateway built from it. Swapped as a
/// unit so a connection attempt always sees a matching pair.
pub(crate) struct Settings {
    pub(crate) config: ClientConfig,
    pub(crate) rest: Arc<RestGateway>,
}

impl Settings {
    pub(crate) fn build(config: ClientConfig) -> Result<Self, CoreError> {
        config.websocket_url()?;
        let rest = RestGateway::new(
            config.hub_url.clone(),
            &config.token,
            &config.transport(),
            config.rest_policy(),
        )?;
        Ok(Self {
            config,
            rest: Arc::new(rest),
        })
    }
}

pub(crate) struct Shared {
    pub(crate) settings: ArcSwap<Settings>,
    pub(crate) correlator: RequestCorrelator,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) reconnect_attempts: AtomicU32,
    pub(crate) hub_version: ArcSwapOption<String>,
}

impl Shared {
    pub(crate) fn new(settings: Settings, cache: Arc<EntityStateCache>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            settings: ArcSwap::from_pointee(settings),
            correlator: RequestCorrelator::new(),
            dispatcher: EventDispatcher::new(cache),
            state,
            reconnect_attempts: AtomicU32::new(0),
            hub_version: ArcSwapOption::empty(),
        }
    }
}

/// Requests to the reactor.
pub(crate) enum Command {
    Connect {
        done: oneshot::Sender<Result<(), CoreError>>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    /// Write an already registered, already encoded request.
    Send { id: u64, frame: String },
    Subscribed {
        generation: u64,
        result: Result<Value, CoreError>,
    },
    SnapshotFetched {
        generation: u64,
        result: Result<Vec<Entity>, CoreError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscription {
    Inactive,
    Pending(u64),
    Active,
}

/// Start the reactor and return its command channel.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
) -> mpsc::Sender<Command> {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let reactor = Reactor {
        shared,
        connector,
        cancel,
        commands: rx,
        loopback: tx.clone(),
        state: ConnectionState::Disconnected,
        generation: 0,
        reconnect_counter: 0,
        attempt: None,
        dialing: None,
        link: None,
        handshake: None,
        heartbeat: HeartbeatMonitor::default(),
        reconnect_at: None,
        handshake_deadline: None,
        subscription: Subscription::Inactive,
        connect_waiters: Vec::new(),
    };
    tokio::spawn(reactor.run());
    tx
}

// ── Reactor ──────────────────────────────────────────────────────────

type Dial = BoxFuture<'static, Result<Link, hublink_api::Error>>;

struct Reactor {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<Command>,
    loopback: mpsc::Sender<Command>,

    state: ConnectionState,
    /// Bumped whenever a connection attempt starts or ends.
    generation: u64,
    reconnect_counter: u32,
    /// Settings snapshot of the current attempt.
    attempt: Option<Arc<Settings>>,
    dialing: Option<Dial>,
    link: Option<Link>,
    handshake: Option<AuthHandshake>,
    heartbeat: HeartbeatMonitor,
    reconnect_at: Option<Pin<Box<Sleep>>>,
    /// Armed from dial until `auth_ok`.
    handshake_deadline: Option<Pin<Box<Sleep>>>,
    subscription: Subscription,
    connect_waiters: Vec<oneshot::Sender<Result<(), CoreError>>>,
}

impl Reactor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command),
                event = next_link_event(&mut self.link) => self.handle_link_event(event),
                dialed = finish_dial(&mut self.dialing) => self.handle_dial(dialed),
                () = self.heartbeat.tick() => self.send_heartbeat(),
                () = timer_due(&mut self.reconnect_at) => {
                    self.reconnect_at = None;
                    debug!(attempt = self.reconnect_counter, "reconnecting");
                    self.begin_connect();
                }
                () = timer_due(&mut self.handshake_deadline) => {
                    self.handshake_deadline = None;
                    self.handshake_timed_out();
                }
            }
        }

        debug!("client dropped; shutting down connection");
        self.disconnect();
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { done } => self.connect(done),
            Command::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Send { id, frame } => {
                let written = if self.state.is_connected() {
                    self.write(frame)
                } else {
                    Err(CoreError::NotConnected)
                };
                if let Err(e) = written {
                    self.shared.correlator.resolve(id, Err(e));
                }
            }
            Command::Subscribed { generation, result } => {
                if generation == self.generation {
                    self.on_subscribed(result);
                } else {
                    trace!(generation, "dropping stale subscription reply");
                }
            }
            Command::SnapshotFetched { generation, result } => {
                if generation == self.generation {
                    self.on_snapshot(result);
                } else {
                    trace!(generation, "dropping stale snapshot");
                }
            }
        }
    }

    fn connect(&mut self, done: oneshot::Sender<Result<(), CoreError>>) {
        match self.state {
            ConnectionState::Connected => {
                let _ = done.send(Ok(()));
            }
            ConnectionState::Connecting | ConnectionState::Authenticating => {
                self.connect_waiters.push(done);
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.connect_waiters.push(done);
                self.reconnect_at = None;
                self.set_reconnect_counter(0);
                self.begin_connect();
            }
        }
    }

    fn disconnect(&mut self) {
        if !self.state.is_disconnected() {
            info!("disconnecting from hub");
        }
        self.reconnect_at = None;
        self.drop_connection();
        self.set_state(ConnectionState::Disconnected);
        self.finish_waiters(&Err(CoreError::ConnectionClosed));
    }

    // ── Connection attempts ──────────────────────────────────────────

    fn begin_connect(&mut self) {
        let settings = self.shared.settings.load_full();
        self.generation += 1;

        let url = match settings.config.websocket_url() {
            Ok(url) => url,
            Err(e) => {
                self.fail_terminal(e);
                return;
            }
        };

        debug!(%url, generation = self.generation, "opening link");
        self.set_state(ConnectionState::Connecting);
        self.dialing = Some(self.connector.connect(&url));
        self.handshake_deadline = Some(Box::pin(tokio::time::sleep(
            settings.config.request_timeout,
        )));
        self.attempt = Some(settings);
    }

    fn handle_dial(&mut self, dialed: Result<Link, hublink_api::Error>) {
        self.dialing = None;
        match dialed {
            Ok(link) => {
                debug!("link open; waiting for auth_required");
                let token = self.attempt_settings().config.token.clone();
                self.handshake = Some(AuthHandshake::new(token));
                self.link = Some(link);
            }
            Err(e) => self.connection_lost(e.into()),
        }
    }

    fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Frame(text)) => self.handle_frame(&text),
            Some(LinkEvent::Closed { code, reason }) => {
                self.connection_lost(hublink_api::Error::WebSocketClosed { code, reason }.into());
            }
            Some(LinkEvent::Failed(reason)) => {
                let url = self
                    .attempt_settings()
                    .config
                    .websocket_url()
                    .map(|u| u.to_string())
                    .unwrap_or_default();
                self.connection_lost(CoreError::ConnectionFailed { url, reason });
            }
            None => self.connection_lost(CoreError::ConnectionClosed),
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let message = match wire::decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "ignoring undecodable frame");
                return;
            }
        };

        if let Some(handshake) = self.handshake.as_mut() {
            match handshake.on_message(&message) {
                Ok(step) => self.handle_auth_step(step),
                Err(e) => self.connection_lost(e),
            }
            return;
        }

        match message {
            HubMessage::Event { event, .. } => self.handle_event(&event),
            HubMessage::Result {
                id,
                success,
                result,
                error,
            } => {
                self.shared
                    .correlator
                    .resolve_frame(id, success, result, error);
            }
            HubMessage::Pong { id } => trace!(?id, "pong"),
            other => debug!(frame = ?other, "ignoring frame"),
        }
    }

    fn handle_auth_step(&mut self, step: AuthStep) {
        match step {
            AuthStep::Ignore => {}
            AuthStep::Respond(frame) => {
                self.set_state(ConnectionState::Authenticating);
                if let Err(e) = self.write(frame) {
                    self.connection_lost(e);
                }
            }
            AuthStep::Accepted { hub_version } => self.on_authenticated(hub_version),
            AuthStep::Rejected { message } => {
                self.drop_connection();
                self.reconnect_at = None;
                self.fail_terminal(CoreError::AuthenticationFailed { message });
            }
        }
    }

    fn on_authenticated(&mut self, hub_version: Option<String>) {
        self.handshake = None;
        self.handshake_deadline = None;
        self.set_reconnect_counter(0);
        info!(hub_version = ?hub_version, "authenticated with hub");
        self.shared.hub_version.store(hub_version.map(Arc::new));

        let settings = self.attempt_settings();
        self.heartbeat.start(settings.config.heartbeat_interval);
        self.set_state(ConnectionState::Connected);
        self.finish_waiters(&Ok(()));
        self.subscribe_state_changes();
    }

    // ── Subscription and snapshot ────────────────────────────────────

    fn subscribe_state_changes(&mut self) {
        if self.subscription != Subscription::Inactive {
            return;
        }

        let timeout = self.attempt_settings().config.request_timeout;
        let pending = self.shared.correlator.register(timeout);
        let id = pending.id();
        let sent = ClientMessage::SubscribeEvents {
            id,
            event_type: Some(STATE_CHANGED),
        }
        .encode()
        .map_err(CoreError::from)
        .and_then(|frame| self.write(frame));

        if let Err(e) = sent {
            self.shared.correlator.forget(id);
            warn!(error = %e, "could not subscribe to state changes");
            self.shared.dispatcher.publish(HubEvent::Error(e));
            return;
        }

        debug!(id, "subscribing to state changes");
        self.subscription = Subscription::Pending(id);
        let loopback = self.loopback.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = pending.wait().await;
            let _ = loopback
                .send(Command::Subscribed { generation, result })
                .await;
        });
    }

    fn on_subscribed(&mut self, result: Result<Value, CoreError>) {
        match (result, self.subscription) {
            (Ok(_), Subscription::Pending(id)) => {
                info!(id, "subscribed to state changes");
                self.subscription = Subscription::Active;
                self.fetch_snapshot();
            }
            (Ok(_), _) => {}
            (Err(e), _) => {
                self.subscription = Subscription::Inactive;
                warn!(error = %e, "state change subscription failed");
                self.shared.dispatcher.publish(HubEvent::Error(e));
            }
        }
    }

    fn fetch_snapshot(&self) {
        let settings = self.attempt_settings();
        let loopback = self.loopback.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = settings.rest.states().await.map_err(CoreError::from);
            let _ = loopback
                .send(Command::SnapshotFetched { generation, result })
                .await;
        });
    }

    fn on_snapshot(&self, result: Result<Vec<Entity>, CoreError>) {
        match result {
            Ok(entities) => {
                let settings = self.attempt_settings();
                let received = entities.len();
                let written = self
                    .shared
                    .dispatcher
                    .load_snapshot(entities, |id| settings.config.tracks(id));
                info!(received, written, "state snapshot loaded");
            }
            Err(e) => {
                warn!(error = %e, "state snapshot failed");
                self.shared.dispatcher.publish(HubEvent::Error(e));
            }
        }
    }

    fn handle_event(&self, event: &EventPayload) {
        match event.state_changed() {
            Some(Ok(data)) => {
                let settings = self.attempt_settings();
                self.shared
                    .dispatcher
                    .apply_state_change(data, |id| settings.config.tracks(id));
            }
            Some(Err(e)) => debug!(error = %e, "ignoring malformed state change"),
            None => trace!(event_type = %event.event_type, "ignoring event"),
        }
    }

    // ── Loss and recovery ────────────────────────────────────────────

    fn connection_lost(&mut self, err: CoreError) {
        warn!(error = %err, state = %self.state, "connection lost");
        self.drop_connection();
        self.set_state(ConnectionState::Disconnected);
        self.shared.dispatcher.publish(HubEvent::Error(err.clone()));

        let settings = self.shared.settings.load_full();
        if !settings.config.auto_reconnect {
            self.finish_waiters(&Err(err));
            return;
        }

        let policy = settings.config.reconnect_policy();
        if policy.allows(self.reconnect_counter) {
            let delay = policy.delay(self.reconnect_counter);
            self.set_reconnect_counter(self.reconnect_counter + 1);
            info!(
                attempt = self.reconnect_counter,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnect scheduled"
            );
            self.reconnect_at = Some(Box::pin(tokio::time::sleep(delay)));
        } else {
            self.fail_terminal(CoreError::ReconnectExhausted {
                attempts: self.reconnect_counter,
            });
        }
    }

    /// The dial or the handshake outlived the request timeout.
    fn handshake_timed_out(&mut self) {
        let settings = self.attempt_settings();
        let url = settings
            .config
            .websocket_url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        let waited = settings.config.request_timeout;
        self.connection_lost(CoreError::ConnectionFailed {
            url,
            reason: format!("no completed handshake after {waited:?}"),
        });
    }

    /// Enter `Error`: no more automatic attempts until `connect()`.
    fn fail_terminal(&mut self, err: CoreError) {
        error!(error = %err, "giving up on hub connection");
        self.set_state(ConnectionState::Error);
        self.shared.dispatcher.publish(HubEvent::Error(err.clone()));
        self.finish_waiters(&Err(err));
    }

    /// Tear down the current link and everything scoped to it.
    fn drop_connection(&mut self) {
        self.generation += 1;
        self.dialing = None;
        self.link = None;
        self.handshake = None;
        self.handshake_deadline = None;
        self.heartbeat.stop();
        self.subscription = Subscription::Inactive;
        self.shared
            .correlator
            .reject_all(&CoreError::ConnectionClosed);
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn send_heartbeat(&mut self) {
        let id = self.shared.correlator.next_id();
        trace!(id, period = ?self.heartbeat.period(), "heartbeat");
        if let Err(e) = HeartbeatMonitor::probe(id).and_then(|frame| self.write(frame)) {
            warn!(error = %e, "heartbeat not sent");
        }
    }

    fn write(&self, frame: String) -> Result<(), CoreError> {
        let link = self.link.as_ref().ok_or(CoreError::NotConnected)?;
        link.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => CoreError::Internal("outbound queue full".into()),
            TrySendError::Closed(_) => CoreError::ConnectionClosed,
        })
    }

    fn attempt_settings(&self) -> Arc<Settings> {
        self.attempt
            .clone()
            .unwrap_or_else(|| self.shared.settings.load_full())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "connection state changed");
        self.state = state;
        self.shared.state.send_replace(state);
        self.shared
            .dispatcher
            .publish(HubEvent::ConnectionStatus(state));
    }

    fn set_reconnect_counter(&mut self, value: u32) {
        self.reconnect_counter = value;
        self.shared
            .reconnect_attempts
            .store(value, Ordering::Relaxed);
    }

    fn finish_waiters(&mut self, result: &Result<(), CoreError>) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

// ── Select helpers ───────────────────────────────────────────────────
//
// Each resolves only when its slot is occupied, so the reactor's select
// loop can poll every source unconditionally.

async fn next_link_event(link: &mut Option<Link>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => pending().await,
    }
}

async fn finish_dial(dialing: &mut Option<Dial>) -> Result<Link, hublink_api::Error> {
    match dialing {
        Some(dial) => dial.await,
        None => pending().await,
    }
}

async fn timer_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
