//! Session protocol engine.
//!
//! Owns the connection lifecycle (connect → register → authenticate →
//! steady-state) over a message-framed transport, routes inbound commands to
//! local state changes or tag operations, and enforces rate-limited retries
//! for registration, authentication, and heartbeat.
//!
//! The engine is driven by an explicit tick with injected monotonic time.
//! Within one tick, inbound processing runs strictly after connection-state
//! resolution and strictly before outbound sends, so a freshly received
//! UNAUTHORIZED suppresses the same tick's stale authentication attempt.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use tapgate_proto::envelope::{kind, Envelope};
use tapgate_proto::payloads::{
    KeyPress, Notice, ReaderCredentials, ReaderInfo, TagAuthRequest, TagAuthResult, TapReport,
};

use crate::config::ReaderConfig;
use crate::dispatch::{route, InboundCommand};
use crate::errors::CoreError;
use crate::rotation::KeyRotationBatch;
use crate::store::{ReaderIdentity, Store};
use crate::tag::{TagEvent, TagKey, TagLink, TagSequencer};
use crate::transport::{Transport, MAX_FRAME_LEN};

// ============================================================================
// Collaborator seams
// ============================================================================

/// One-way sink for UI/LED feedback. Implementations must be cheap and
/// non-blocking; the engine calls these from inside its tick.
pub trait Presentation: Send + Sync {
    fn set_api_connected(&self, connected: bool);
    fn set_device_name(&self, name: &str);
    fn set_tap_enabled(&self, enabled: bool);
    fn set_tap_prompt(&self, prompt: &str);
    fn show_text(&self, line_one: &str, line_two: &str);
    fn hide_text(&self);
    /// Duration 0 means sticky.
    fn show_success(&self, message: &str, duration_ms: u64);
    fn show_error(&self, message: &str, duration_ms: u64);
}

/// Presentation sink that discards everything.
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn set_api_connected(&self, _connected: bool) {}
    fn set_device_name(&self, _name: &str) {}
    fn set_tap_enabled(&self, _enabled: bool) {}
    fn set_tap_prompt(&self, _prompt: &str) {}
    fn show_text(&self, _line_one: &str, _line_two: &str) {}
    fn hide_text(&self) {}
    fn show_success(&self, _message: &str, _duration_ms: u64) {}
    fn show_error(&self, _message: &str, _duration_ms: u64) {}
}

/// Local input device, polled for one keypress per tick.
pub trait InputSource: Send {
    fn poll_key(&mut self) -> Option<char>;
}

// ============================================================================
// Connection state
// ============================================================================

/// The engine's view of the link to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A connection attempt is in progress.
    TcpPending,
    SocketConnected,
}

// ============================================================================
// Session engine
// ============================================================================

/// The session protocol engine. Owns the transport; shares nothing.
pub struct SessionEngine<T: Transport, S: Store> {
    config: ReaderConfig,
    transport: T,
    store: Arc<S>,
    presentation: Arc<dyn Presentation>,
    input: Option<Box<dyn InputSource>>,

    identity: ReaderIdentity,

    state: ConnectionState,
    is_authenticated: bool,

    // Monotonic-millisecond timers; None = never.
    last_connection_attempt: Option<u64>,
    registration_sent_at: Option<u64>,
    authentication_sent_at: Option<u64>,
    heartbeat_sent_at: Option<u64>,
}

impl<T: Transport, S: Store> SessionEngine<T, S> {
    /// Create an engine around an already-loaded identity.
    pub fn new(config: ReaderConfig, transport: T, store: Arc<S>, identity: ReaderIdentity) -> Self {
        Self {
            config,
            transport,
            store,
            presentation: Arc::new(NullPresentation),
            input: None,
            identity,
            state: ConnectionState::Disconnected,
            is_authenticated: false,
            last_connection_attempt: None,
            registration_sent_at: None,
            authentication_sent_at: None,
            heartbeat_sent_at: None,
        }
    }

    /// Create an engine, loading the identity from the store.
    pub async fn boot(config: ReaderConfig, transport: T, store: Arc<S>) -> Result<Self, CoreError> {
        let identity = store.load_identity().await?;
        info!(
            reader_id = identity.reader_id,
            registered = identity.is_registered(),
            "loaded reader identity"
        );
        Ok(Self::new(config, transport, store, identity))
    }

    pub fn set_presentation(&mut self, presentation: Arc<dyn Presentation>) {
        self.presentation = presentation;
    }

    pub fn set_input(&mut self, input: Box<dyn InputSource>) {
        self.input = Some(input);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn identity(&self) -> &ReaderIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Run one scheduling step. Never fails and never blocks beyond the
    /// transport's own bounded calls; every fault is logged and recovered.
    pub async fn tick<L: TagLink>(&mut self, now_ms: u64, tags: &mut TagSequencer<L>) {
        if !self.config.endpoint.is_configured() {
            // An unconfigured reader never touches the transport.
            return;
        }

        if !self.resolve_connection(now_ms).await {
            return;
        }

        self.process_inbound(tags).await;
        self.send_pending(now_ms).await;
        self.poll_input().await;
    }

    /// Report a tag event surfaced by the sequencer's scan branch.
    pub async fn publish_tag_event(&mut self, event: TagEvent) {
        match event {
            TagEvent::Tapped { uid } => {
                if self.state != ConnectionState::SocketConnected {
                    debug!(uid = %uid.to_hex(), "dropping tap report while disconnected");
                    return;
                }
                info!(uid = %uid.to_hex(), "tag tapped");
                let payload = TapReport {
                    card_uid: uid.to_hex(),
                };
                self.send_event(kind::NFC_TAP, to_payload(&payload)).await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Connection resolution
    // ------------------------------------------------------------------------

    /// Returns true when the socket is connected and the tick may proceed.
    async fn resolve_connection(&mut self, now_ms: u64) -> bool {
        if self.transport.connected() {
            if self.state != ConnectionState::SocketConnected {
                info!(
                    host = %self.config.endpoint.host,
                    port = self.config.endpoint.port,
                    "socket connected"
                );
                self.enter_socket_connected();
            }
            return true;
        }

        if self.state == ConnectionState::SocketConnected {
            warn!("socket lost, forcing re-registration on reconnect");
            self.reset_handshake();
            self.presentation.set_api_connected(false);
        }
        self.state = ConnectionState::Disconnected;

        // Outbound rate limiter: never hammer the endpoint.
        if let Some(last) = self.last_connection_attempt {
            if now_ms.saturating_sub(last) < self.config.connect_retry_ms {
                return false;
            }
        }
        self.last_connection_attempt = Some(now_ms);

        self.state = ConnectionState::TcpPending;
        let host = self.config.endpoint.host.clone();
        let port = self.config.endpoint.port;
        match self.transport.connect(&host, port).await {
            Ok(()) => {
                info!(host = %host, port, "connection established");
                self.enter_socket_connected();
                true
            }
            Err(e) => {
                warn!(host = %host, port, error = %e, "connection attempt failed");
                self.state = ConnectionState::Disconnected;
                self.presentation.set_api_connected(false);
                false
            }
        }
    }

    fn enter_socket_connected(&mut self) {
        self.state = ConnectionState::SocketConnected;
        self.reset_handshake();
    }

    /// Force the register/authenticate sequence to restart.
    fn reset_handshake(&mut self) {
        self.is_authenticated = false;
        self.registration_sent_at = None;
        self.authentication_sent_at = None;
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Drain at most one inbound message; backlog keeps its order for the
    /// next tick.
    async fn process_inbound<L: TagLink>(&mut self, tags: &mut TagSequencer<L>) {
        if !self.transport.available().await {
            return;
        }

        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = match self.transport.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "transport read failed");
                return;
            }
        };
        if n == 0 {
            return;
        }

        let envelope = match Envelope::decode(&buf[..n]) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                return;
            }
        };
        let Some(data) = envelope.data else {
            debug!("ignoring bare inbound frame");
            return;
        };
        debug!(kind = %data.kind, "received message");

        let command = route(&data);
        self.apply(command, tags).await;
    }

    async fn apply<L: TagLink>(&mut self, command: InboundCommand, tags: &mut TagSequencer<L>) {
        match command {
            InboundCommand::Register(credentials) => self.on_register(credentials).await,
            InboundCommand::Unauthorized(notice) => self.on_unauthorized(notice).await,
            InboundCommand::ReaderAuthenticated(info) => self.on_reader_authenticated(info),
            InboundCommand::EnableCardChecking(notice) => {
                info!("card checking enabled");
                tags.set_scanning(true);
                self.presentation.set_tap_enabled(true);
                self.presentation.set_tap_prompt(&notice.message);
            }
            InboundCommand::DisableCardChecking => {
                info!("card checking disabled");
                tags.set_scanning(false);
                self.presentation.set_tap_enabled(false);
            }
            InboundCommand::TagAuthenticate(request) => {
                self.on_tag_authenticate(request, tags).await
            }
            InboundCommand::ChangeKeys(request) => {
                let batch = KeyRotationBatch::from_request(&request);
                info!(slots = batch.len(), "running key rotation batch");
                let result = batch.run(tags);
                self.send_response(kind::CHANGE_KEYS, to_payload(&result)).await;
            }
            InboundCommand::Reauthenticate => {
                info!("reauthentication requested");
                self.presentation.show_success("Resetting...", 0);
                self.is_authenticated = false;
                self.authentication_sent_at = None;
            }
            InboundCommand::Show(text) => {
                self.presentation.show_text(&text.line_one, &text.line_two)
            }
            InboundCommand::Hide => self.presentation.hide_text(),
            InboundCommand::DisplaySuccess(banner) => {
                self.presentation.show_success(&banner.message, banner.duration)
            }
            InboundCommand::DisplayError(banner) => {
                self.presentation.show_error(&banner.message, banner.duration)
            }
            InboundCommand::Unknown(kind) => warn!(kind = %kind, "unknown message type"),
            InboundCommand::Invalid { kind, reason } => {
                warn!(kind = %kind, reason = %reason, "dropping malformed payload")
            }
        }
    }

    async fn on_register(&mut self, credentials: ReaderCredentials) {
        if self.identity.is_registered() {
            debug!("already registered, ignoring registration data");
            return;
        }
        self.identity.reader_id = credentials.id;
        self.identity.api_key = credentials.token;
        self.identity.has_auth = true;
        self.persist_identity().await;
        info!(reader_id = self.identity.reader_id, "reader registered");
    }

    async fn on_unauthorized(&mut self, notice: Notice) {
        warn!(message = %notice.message, "backend revoked authorization");
        self.is_authenticated = false;
        self.registration_sent_at = None;
        self.authentication_sent_at = None;
        // Flag-only revocation: the stored id and token stay in place.
        self.identity.has_auth = false;
        self.persist_identity().await;
        self.presentation.set_api_connected(false);
    }

    fn on_reader_authenticated(&mut self, info: ReaderInfo) {
        info!(name = %info.name, "reader authenticated");
        self.is_authenticated = true;
        self.presentation.set_api_connected(true);
        self.presentation.set_device_name(&info.name);
    }

    async fn on_tag_authenticate<L: TagLink>(
        &mut self,
        request: TagAuthRequest,
        tags: &mut TagSequencer<L>,
    ) {
        let key = TagKey::from_hex(&request.authentication_key);
        let success = tags.authenticate_blocking(request.key_number, &key);
        if success {
            info!(key_number = request.key_number, "tag authentication successful");
        } else {
            warn!(key_number = request.key_number, "tag authentication failed");
        }
        let payload = TagAuthResult {
            authentication_successful: success,
        };
        self.send_response(kind::AUTHENTICATE, to_payload(&payload)).await;
    }

    async fn persist_identity(&mut self) {
        if let Err(e) = self.store.save_identity(&self.identity).await {
            warn!(error = %e, "failed to persist identity");
        }
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    async fn send_pending(&mut self, now_ms: u64) {
        if !self.identity.is_registered() {
            if due(self.registration_sent_at, now_ms, self.config.register_interval_ms) {
                info!("registering reader");
                self.send_event(kind::REGISTER, json!({})).await;
                self.registration_sent_at = Some(now_ms);
            }
        } else if !self.is_authenticated
            && due(
                self.authentication_sent_at,
                now_ms,
                self.config.authenticate_interval_ms,
            )
        {
            let credentials = ReaderCredentials {
                id: self.identity.reader_id,
                token: self.identity.api_key.clone(),
            };
            self.send_event(kind::AUTHENTICATE, to_payload(&credentials)).await;
            self.authentication_sent_at = Some(now_ms);
        }

        if due(self.heartbeat_sent_at, now_ms, self.config.heartbeat_interval_ms) {
            self.send_envelope(Envelope::heartbeat()).await;
            self.heartbeat_sent_at = Some(now_ms);
        }
    }

    async fn poll_input(&mut self) {
        let key = self.input.as_mut().and_then(|input| input.poll_key());
        if let Some(key) = key {
            let payload = KeyPress {
                key: key.to_string(),
            };
            self.send_event(kind::KEY_PRESSED, to_payload(&payload)).await;
        }
    }

    async fn send_event(&mut self, kind: &str, payload: Value) {
        self.send_envelope(Envelope::event(kind, payload)).await;
    }

    async fn send_response(&mut self, kind: &str, payload: Value) {
        self.send_envelope(Envelope::response(kind, payload)).await;
    }

    async fn send_envelope(&mut self, envelope: Envelope) {
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound envelope");
                return;
            }
        };
        if let Some(data) = &envelope.data {
            debug!(kind = %data.kind, "sending message");
        }
        if let Err(e) = self.transport.write(&bytes).await {
            warn!(error = %e, "transport write failed");
            return;
        }
        if let Err(e) = self.transport.flush().await {
            warn!(error = %e, "transport flush failed");
        }
    }
}

fn due(last: Option<u64>, now_ms: u64, interval_ms: u64) -> bool {
    last.map_or(true, |t| now_ms.saturating_sub(t) >= interval_ms)
}

fn to_payload<P: serde::Serialize>(payload: &P) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}
