//! Test harness for tapgate core.
//!
//! Mock implementations of every seam (bus, transport, presentation, input)
//! plus a preassembled rig for whole-flow tests. The mocks record every call
//! so tests can assert on hardware traffic and wire traffic alike.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tapgate_proto::Envelope;

use crate::config::ReaderConfig;
use crate::session::{InputSource, Presentation, SessionEngine};
use crate::store::{InMemoryStore, ReaderIdentity};
use crate::tag::{TagKey, TagLink, TagSequencer, TagUid};
use crate::transport::{Transport, TransportError};

// ============================================================================
// Tag link mock
// ============================================================================

/// Scriptable bus mock. Operations succeed unless a slot is listed in the
/// corresponding failure set; every call is recorded.
#[derive(Default)]
pub struct MockTagLink {
    /// Detection script, consumed front to back; empty means no tag.
    pub detect_results: VecDeque<Option<TagUid>>,
    pub fail_auth_slots: HashSet<u8>,
    pub fail_change_slots: HashSet<u8>,
    pub fail_write: bool,

    pub detect_calls: usize,
    pub auth_calls: Vec<(u8, TagKey)>,
    pub write_calls: Vec<(u8, u8, Vec<u8>, u8)>,
    pub change_calls: Vec<(u8, TagKey, TagKey)>,
}

impl MockTagLink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TagLink for MockTagLink {
    fn detect(&mut self, _timeout: Duration) -> Option<TagUid> {
        self.detect_calls += 1;
        self.detect_results.pop_front().flatten()
    }

    fn authenticate(&mut self, key: &TagKey, key_number: u8) -> bool {
        self.auth_calls.push((key_number, key.clone()));
        !self.fail_auth_slots.contains(&key_number)
    }

    fn write_block(&mut self, file: u8, offset: u8, data: &[u8], key_number: u8) -> bool {
        self.write_calls.push((file, offset, data.to_vec(), key_number));
        !self.fail_write
    }

    fn change_key(&mut self, current: &TagKey, new: &TagKey, key_number: u8) -> bool {
        self.change_calls
            .push((key_number, current.clone(), new.clone()));
        !self.fail_change_slots.contains(&key_number)
    }
}

// ============================================================================
// Transport mock
// ============================================================================

/// In-memory transport: inbound frames are queued by the test, outbound
/// frames are captured for inspection.
pub struct MockTransport {
    pub connected: bool,
    pub connect_ok: bool,
    pub connect_calls: usize,
    pub inbound: VecDeque<Vec<u8>>,
    pub outbound: Vec<Vec<u8>>,
    pub flushes: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            connected: false,
            connect_ok: true,
            connect_calls: 0,
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            flushes: 0,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound envelope for the next tick.
    pub fn push_inbound(&mut self, envelope: &Envelope) {
        self.inbound
            .push_back(envelope.encode().expect("envelope encodes"));
    }

    /// Decode everything sent so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.outbound
            .iter()
            .map(|bytes| Envelope::decode(bytes).expect("outbound frame decodes"))
            .collect()
    }

    /// The `type` of every sent frame, with bare heartbeats as "HEARTBEAT".
    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|env| match &env.data {
                Some(data) => data.kind.clone(),
                None => "HEARTBEAT".to_string(),
            })
            .collect()
    }

    /// Sent frames of one type, for payload assertions.
    pub fn sent_of_kind(&self, kind: &str) -> Vec<Envelope> {
        self.sent()
            .into_iter()
            .filter(|env| env.data.as_ref().map(|d| d.kind.as_str()) == Some(kind))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, _host: &str, _port: u16) -> Result<(), TransportError> {
        self.connect_calls += 1;
        if self.connect_ok {
            self.connected = true;
            Ok(())
        } else {
            Err(TransportError::ConnectFailed("connection refused".into()))
        }
    }

    fn connected(&self) -> bool {
        self.connected
    }

    async fn available(&mut self) -> bool {
        self.connected && !self.inbound.is_empty()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.inbound.pop_front() {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.outbound.push(buf.to_vec());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.flushes += 1;
        Ok(())
    }
}

// ============================================================================
// Presentation and input mocks
// ============================================================================

/// One recorded presentation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationCall {
    ApiConnected(bool),
    DeviceName(String),
    TapEnabled(bool),
    TapPrompt(String),
    Text(String, String),
    HideText,
    Success(String, u64),
    Error(String, u64),
}

/// Presentation sink that records every call.
#[derive(Default)]
pub struct RecordingPresentation {
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PresentationCall> {
        self.calls.lock().expect("presentation lock").clone()
    }

    fn record(&self, call: PresentationCall) {
        self.calls.lock().expect("presentation lock").push(call);
    }
}

impl Presentation for RecordingPresentation {
    fn set_api_connected(&self, connected: bool) {
        self.record(PresentationCall::ApiConnected(connected));
    }

    fn set_device_name(&self, name: &str) {
        self.record(PresentationCall::DeviceName(name.to_string()));
    }

    fn set_tap_enabled(&self, enabled: bool) {
        self.record(PresentationCall::TapEnabled(enabled));
    }

    fn set_tap_prompt(&self, prompt: &str) {
        self.record(PresentationCall::TapPrompt(prompt.to_string()));
    }

    fn show_text(&self, line_one: &str, line_two: &str) {
        self.record(PresentationCall::Text(
            line_one.to_string(),
            line_two.to_string(),
        ));
    }

    fn hide_text(&self) {
        self.record(PresentationCall::HideText);
    }

    fn show_success(&self, message: &str, duration_ms: u64) {
        self.record(PresentationCall::Success(message.to_string(), duration_ms));
    }

    fn show_error(&self, message: &str, duration_ms: u64) {
        self.record(PresentationCall::Error(message.to_string(), duration_ms));
    }
}

/// Input source fed from a fixed key script.
#[derive(Default)]
pub struct ScriptedInput {
    pub keys: VecDeque<char>,
}

impl ScriptedInput {
    pub fn new(keys: impl IntoIterator<Item = char>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn poll_key(&mut self) -> Option<char> {
        self.keys.pop_front()
    }
}

// ============================================================================
// Preassembled rig
// ============================================================================

/// A full reader core wired to mocks: engine, sequencer, shared store, and
/// recording presentation.
pub struct TestRig {
    pub engine: SessionEngine<MockTransport, InMemoryStore>,
    pub tags: TagSequencer<MockTagLink>,
    pub store: Arc<InMemoryStore>,
    pub presentation: Arc<RecordingPresentation>,
}

impl TestRig {
    /// Rig with a configured endpoint and the given starting identity.
    pub fn new(identity: ReaderIdentity) -> Self {
        let store = Arc::new(InMemoryStore::with_identity(identity.clone()));
        let presentation = Arc::new(RecordingPresentation::new());
        let mut engine = SessionEngine::new(
            ReaderConfig::with_endpoint("backend.local", 4000),
            MockTransport::new(),
            store.clone(),
            identity,
        );
        engine.set_presentation(presentation.clone());
        Self {
            engine,
            tags: TagSequencer::new(MockTagLink::new()),
            store,
            presentation,
        }
    }

    /// One combined scheduling step: sequencer first, then the engine, the
    /// same order the device loop uses.
    pub async fn tick(&mut self, now_ms: u64) {
        if let Some(event) = self.tags.tick(now_ms) {
            self.engine.publish_tag_event(event).await;
        }
        self.engine.tick(now_ms, &mut self.tags).await;
    }

    /// Queue an inbound envelope for the next tick.
    pub fn push_inbound(&mut self, envelope: &Envelope) {
        self.engine.transport_mut().push_inbound(envelope);
    }
}
