//! Tag operation sequencer and the bus seam.
//!
//! The sequencer turns one logical intent (authenticate / write / rotate a
//! key) into the ordered sequence of bus calls, one operation in flight at a
//! time. `start_*` never touches the hardware; the work happens on the next
//! tick. Card-detection scanning runs as a separate always-on branch of the
//! same tick and reports taps as returned events.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};
use zeroize::Zeroize;

use tapgate_proto::codec;

/// Length of an NTAG424-class key in bytes.
pub const TAG_KEY_LEN: usize = codec::TAG_KEY_LEN;

/// Capacity of the write payload buffer.
pub const MAX_WRITE_LEN: usize = 64;

/// Maximum UID length for ISO14443A targets.
pub const MAX_UID_LEN: usize = 7;

/// File number holding reader-writable custom data on the tag.
const DATA_FILE_NUMBER: u8 = 0x03;

/// Sleep between polls in the blocking wrappers.
const POLL_SLEEP_MS: u64 = 10;

// ============================================================================
// Key and UID types
// ============================================================================

/// A 16-byte tag key. Cloned at every boundary, never aliased, and zeroized
/// when an operation record is retired.
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
pub struct TagKey([u8; TAG_KEY_LEN]);

impl TagKey {
    pub fn new(bytes: [u8; TAG_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from hex with the wire's zero-fill tolerance.
    pub fn from_hex(s: &str) -> Self {
        Self(codec::key_from_hex(s))
    }

    pub fn as_bytes(&self) -> &[u8; TAG_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for TagKey {
    /// Only the key tail is ever shown, mirroring what the reader logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagKey(xxxx{})", hex::encode(&self.0[12..]))
    }
}

/// A detected tag UID: fixed capacity, explicit length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagUid {
    bytes: [u8; MAX_UID_LEN],
    len: u8,
}

impl TagUid {
    /// Copy up to [`MAX_UID_LEN`] bytes.
    pub fn new(uid: &[u8]) -> Self {
        let len = uid.len().min(MAX_UID_LEN);
        let mut bytes = [0u8; MAX_UID_LEN];
        bytes[..len].copy_from_slice(&uid[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn to_hex(&self) -> String {
        codec::uid_to_hex(self.as_slice())
    }
}

// ============================================================================
// Bus seam
// ============================================================================

/// Atomic hardware primitives over the local bus.
///
/// Calls block for the duration of one bus transaction, bounded by a timeout
/// of a few hundred milliseconds, and are only ever invoked from the
/// sequencer's own tick.
pub trait TagLink: Send {
    /// Attempt one tag-presence read.
    fn detect(&mut self, timeout: Duration) -> Option<TagUid>;

    /// Authenticate against the given key slot.
    fn authenticate(&mut self, key: &TagKey, key_number: u8) -> bool;

    /// Write `data` to `file` at `offset`, authenticated via `key_number`.
    fn write_block(&mut self, file: u8, offset: u8, data: &[u8], key_number: u8) -> bool;

    /// Replace the key in `key_number` with `new`, authenticating with
    /// `current`.
    fn change_key(&mut self, current: &TagKey, new: &TagKey, key_number: u8) -> bool;
}

/// Placeholder link for builds without a bus driver attached: detects
/// nothing and fails every operation.
pub struct NoopTagLink;

impl TagLink for NoopTagLink {
    fn detect(&mut self, _timeout: Duration) -> Option<TagUid> {
        None
    }

    fn authenticate(&mut self, _key: &TagKey, _key_number: u8) -> bool {
        false
    }

    fn write_block(&mut self, _file: u8, _offset: u8, _data: &[u8], _key_number: u8) -> bool {
        false
    }

    fn change_key(&mut self, _current: &TagKey, _new: &TagKey, _key_number: u8) -> bool {
        false
    }
}

// ============================================================================
// Operation records
// ============================================================================

/// The logical intent behind an in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOpKind {
    Authenticate,
    WriteData,
    ChangeKey,
}

/// Execution phase of an operation. `Wait` is reserved for hardware that
/// completes asynchronously; every current operation resolves within one
/// `Start` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpPhase {
    Start,
    Wait,
}

/// Outcome of the most recent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    Pending,
    Success,
    Failure,
}

/// Event emitted by the scan branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEvent {
    Tapped { uid: TagUid },
}

/// Completion hook, invoked exactly once per operation on leaving Pending.
pub type CompletionHook = Box<dyn FnMut(TagOpKind, bool) + Send>;

struct TagOperation {
    kind: TagOpKind,
    phase: OpPhase,
    key_number: u8,
    auth_key: TagKey,
    new_key: TagKey,
    payload: [u8; MAX_WRITE_LEN],
    payload_len: usize,
    submitted_at_ms: u64,
}

impl TagOperation {
    fn new(kind: TagOpKind, key_number: u8, auth_key: TagKey, submitted_at_ms: u64) -> Self {
        Self {
            kind,
            phase: OpPhase::Start,
            key_number,
            auth_key,
            new_key: TagKey::default(),
            payload: [0u8; MAX_WRITE_LEN],
            payload_len: 0,
            submitted_at_ms,
        }
    }

    fn retire(mut self) {
        self.auth_key.zeroize();
        self.new_key.zeroize();
        self.payload.zeroize();
    }
}

// ============================================================================
// Sequencer
// ============================================================================

/// Single-outstanding-operation state machine over a [`TagLink`].
///
/// At most one operation is in flight; a `start_*` call while busy is
/// rejected with no side effect. Scanning never latches: every detect
/// attempt returns the sequencer to the ready state, success or not.
pub struct TagSequencer<L: TagLink> {
    link: L,
    op: Option<TagOperation>,
    last_result: OpResult,
    on_complete: Option<CompletionHook>,
    scanning_enabled: bool,
    last_scan_ms: u64,
    scan_interval_ms: u64,
    detect_timeout: Duration,
    /// Monotonic time observed at the most recent tick; stamps submissions.
    last_tick_ms: u64,
}

impl<L: TagLink> TagSequencer<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            op: None,
            last_result: OpResult::Pending,
            on_complete: None,
            scanning_enabled: false,
            last_scan_ms: 0,
            scan_interval_ms: 100,
            detect_timeout: Duration::from_millis(250),
            last_tick_ms: 0,
        }
    }

    /// Override the scan cadence and detect bound.
    pub fn set_scan_cadence(&mut self, interval_ms: u64, detect_timeout: Duration) {
        self.scan_interval_ms = interval_ms;
        self.detect_timeout = detect_timeout;
    }

    /// Install the completion hook fired once per finished operation.
    pub fn set_completion_hook(&mut self, hook: CompletionHook) {
        self.on_complete = Some(hook);
    }

    pub fn set_scanning(&mut self, enabled: bool) {
        self.scanning_enabled = enabled;
    }

    pub fn scanning_enabled(&self) -> bool {
        self.scanning_enabled
    }

    /// Whether an operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.op.is_some()
    }

    /// Result of the most recent operation; `Pending` while one is in
    /// flight or before the first submission.
    pub fn last_result(&self) -> OpResult {
        self.last_result
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    // ------------------------------------------------------------------------
    // Non-blocking starters
    // ------------------------------------------------------------------------

    /// Queue a bare authentication against `key_number`.
    pub fn start_authenticate(&mut self, key_number: u8, key: &TagKey) -> bool {
        if self.op.is_some() {
            return false;
        }
        self.op = Some(TagOperation::new(
            TagOpKind::Authenticate,
            key_number,
            key.clone(),
            self.last_tick_ms,
        ));
        self.last_result = OpResult::Pending;
        true
    }

    /// Queue an authenticated write of `data` to the custom data file.
    pub fn start_write(&mut self, auth_key: &TagKey, key_number: u8, data: &[u8]) -> bool {
        if self.op.is_some() {
            return false;
        }
        if data.len() > MAX_WRITE_LEN {
            return false;
        }
        let mut op = TagOperation::new(
            TagOpKind::WriteData,
            key_number,
            auth_key.clone(),
            self.last_tick_ms,
        );
        op.payload[..data.len()].copy_from_slice(data);
        op.payload_len = data.len();
        self.op = Some(op);
        self.last_result = OpResult::Pending;
        true
    }

    /// Queue a key rotation of `key_number` from `auth_key` to `new_key`.
    pub fn start_change_key(&mut self, key_number: u8, auth_key: &TagKey, new_key: &TagKey) -> bool {
        if self.op.is_some() {
            return false;
        }
        let mut op = TagOperation::new(
            TagOpKind::ChangeKey,
            key_number,
            auth_key.clone(),
            self.last_tick_ms,
        );
        op.new_key = new_key.clone();
        self.op = Some(op);
        self.last_result = OpResult::Pending;
        true
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Run one scheduling step. Executes the in-flight operation if any,
    /// otherwise runs the scan branch when it is due. Returns a tap event
    /// when the scan found a tag.
    pub fn tick(&mut self, now_ms: u64) -> Option<TagEvent> {
        self.last_tick_ms = now_ms;

        if let Some(op) = self.op.take() {
            self.execute(op);
            return None;
        }

        if self.scanning_enabled && now_ms.saturating_sub(self.last_scan_ms) >= self.scan_interval_ms
        {
            self.last_scan_ms = now_ms;
            if let Some(uid) = self.link.detect(self.detect_timeout) {
                debug!(uid = %uid.to_hex(), "tag detected");
                return Some(TagEvent::Tapped { uid });
            }
        }

        None
    }

    fn execute(&mut self, op: TagOperation) {
        debug_assert_eq!(op.phase, OpPhase::Start);
        debug!(
            kind = ?op.kind,
            submitted_at_ms = op.submitted_at_ms,
            "executing tag operation"
        );

        let ok = match op.kind {
            TagOpKind::Authenticate => {
                debug!(key_number = op.key_number, "authenticating tag");
                self.link.authenticate(&op.auth_key, op.key_number)
            }
            TagOpKind::WriteData => {
                if !self.link.authenticate(&op.auth_key, op.key_number) {
                    warn!(key_number = op.key_number, "authentication for write failed");
                    false
                } else {
                    self.link.write_block(
                        DATA_FILE_NUMBER,
                        0,
                        &op.payload[..op.payload_len],
                        op.key_number,
                    )
                }
            }
            TagOpKind::ChangeKey => {
                if !self.link.authenticate(&op.auth_key, op.key_number) {
                    warn!(key_number = op.key_number, "authentication for key change failed");
                    false
                } else {
                    debug!(key_number = op.key_number, "changing tag key");
                    self.link.change_key(&op.auth_key, &op.new_key, op.key_number)
                }
            }
        };

        let kind = op.kind;
        op.retire();
        self.last_result = if ok { OpResult::Success } else { OpResult::Failure };

        if let Some(hook) = self.on_complete.as_mut() {
            hook(kind, ok);
        }
    }

    // ------------------------------------------------------------------------
    // Blocking wrappers
    // ------------------------------------------------------------------------

    /// Drive the sequencer until it leaves the busy state and report whether
    /// the completed operation succeeded. Pure polling over the Pending/Done
    /// query; once entered there is no cancellation.
    fn drive_to_completion(&mut self) -> bool {
        let mut now = self.last_tick_ms;
        while self.is_busy() {
            now = now.saturating_add(POLL_SLEEP_MS);
            self.tick(now);
            if self.is_busy() {
                std::thread::sleep(Duration::from_millis(POLL_SLEEP_MS));
            }
        }
        self.last_result == OpResult::Success
    }

    /// Blocking adapter over [`start_authenticate`](Self::start_authenticate).
    pub fn authenticate_blocking(&mut self, key_number: u8, key: &TagKey) -> bool {
        self.drive_to_completion();
        if !self.start_authenticate(key_number, key) {
            return false;
        }
        self.drive_to_completion()
    }

    /// Blocking adapter over [`start_write`](Self::start_write).
    pub fn write_blocking(&mut self, auth_key: &TagKey, key_number: u8, data: &[u8]) -> bool {
        self.drive_to_completion();
        if !self.start_write(auth_key, key_number, data) {
            return false;
        }
        self.drive_to_completion()
    }

    /// Blocking adapter over [`start_change_key`](Self::start_change_key).
    pub fn change_key_blocking(
        &mut self,
        key_number: u8,
        auth_key: &TagKey,
        new_key: &TagKey,
    ) -> bool {
        self.drive_to_completion();
        if !self.start_change_key(key_number, auth_key, new_key) {
            return false;
        }
        self.drive_to_completion()
    }
}
