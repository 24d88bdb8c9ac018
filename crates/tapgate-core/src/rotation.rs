//! Key rotation batches.
//!
//! A batch is scoped to one CHANGE_KEYS message and never persisted. Slot 0
//! gates access to every other slot on this tag family, so it is always
//! rotated first, and a successful rotation of slot 0 makes the new key the
//! authenticating key for the rest of the batch. The batch is fail-fast:
//! the first failure is reported immediately and no further slots are
//! attempted.

use tracing::{debug, warn};

use tapgate_proto::payloads::{ChangeKeysRequest, ChangeKeysResult};

use crate::tag::{TagKey, TagLink, TagSequencer};

/// Highest addressable key slot on the tag.
pub const MAX_KEY_SLOT: u8 = 4;

/// One CHANGE_KEYS batch: the authenticating key for slot 0 plus the ordered
/// slot → new-key assignments.
pub struct KeyRotationBatch {
    auth_key: TagKey,
    entries: Vec<(u8, TagKey)>,
}

impl KeyRotationBatch {
    /// Build a batch from the wire request. Slots outside 0..=4 are logged
    /// and skipped; the map's ascending order puts slot 0 first.
    pub fn from_request(request: &ChangeKeysRequest) -> Self {
        let auth_key = TagKey::from_hex(&request.authentication_key);
        let mut entries = Vec::with_capacity(request.keys.len());
        for (slot, key_hex) in &request.keys {
            match parse_slot(slot) {
                Some(number) => entries.push((number, TagKey::from_hex(key_hex))),
                None => warn!(slot = %slot, "ignoring out-of-range key slot"),
            }
        }
        Self { auth_key, entries }
    }

    /// Number of slots the batch will attempt.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the batch against the sequencer and build the wire response.
    pub fn run<L: TagLink>(self, tags: &mut TagSequencer<L>) -> ChangeKeysResult {
        let mut result = ChangeKeysResult::default();
        let mut auth_key = self.auth_key;

        for (slot, new_key) in &self.entries {
            debug!(slot, "rotating tag key");
            if !tags.change_key_blocking(*slot, &auth_key, new_key) {
                warn!(slot, "key rotation failed, aborting batch");
                result.failed_keys.push(*slot);
                return result;
            }
            result.successful_keys.push(*slot);
            if *slot == 0 {
                // Key 0 now gates the remaining slots.
                auth_key = new_key.clone();
            }
        }

        result
    }
}

fn parse_slot(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    if bytes.len() != 1 || !bytes[0].is_ascii_digit() {
        return None;
    }
    let slot = bytes[0] - b'0';
    (slot <= MAX_KEY_SLOT).then_some(slot)
}
