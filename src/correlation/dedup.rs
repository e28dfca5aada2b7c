//! Duplicate suppression for frames and messages.
//!
//! A relayed packet is heard once per repeater, and the companion firmware may
//! deliver the same message twice (once decoded from the RX log, once as a
//! channel message event). Letting those copies into the archive or the message
//! list produces several equally "closest" candidates and double-counted hops.
//!
//! Two keys are checked: the protocol hash when the decoder supplied one, and a
//! CRC-32 content fingerprint bucketed by time. A hit on either rejects the
//! insert. Both seen-sets are bounded and evict oldest first.

use crc::{Crc, CRC_32_ISO_HDLC};
use std::collections::{HashSet, VecDeque};

use super::model::{DecodedMessage, RawFrameRecord, Timestamp};

const FINGERPRINT: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Identity under which a record is remembered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Hash(String),
    Fingerprint(u32),
}

/// Insertion-ordered set with a fixed capacity.
#[derive(Debug)]
struct SeenSet {
    keys: HashSet<DedupKey>,
    order: VecDeque<DedupKey>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    fn mark(&mut self, key: DedupKey) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Outcome of offering a record to the deduplicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    New,
    AlreadyPresent,
}

#[derive(Debug)]
pub struct Deduplicator {
    hashes: SeenSet,
    content: SeenSet,
    bucket_ms: i64,
}

impl Deduplicator {
    pub fn new(capacity: usize, bucket_seconds: u64) -> Self {
        Self {
            hashes: SeenSet::new(capacity),
            content: SeenSet::new(capacity),
            bucket_ms: (bucket_seconds.max(1) as i64).saturating_mul(1000),
        }
    }

    fn bucket(&self, ts: Timestamp) -> i64 {
        ts.as_millis().div_euclid(self.bucket_ms)
    }

    /// Content fingerprint of a frame: its payload plus time bucket. Frames with
    /// no payload have no fingerprint.
    pub fn frame_fingerprint(&self, record: &RawFrameRecord) -> Option<u32> {
        if record.payload().is_empty() {
            return None;
        }
        let mut digest = FINGERPRINT.digest();
        digest.update(record.payload().as_bytes());
        digest.update(&self.bucket(record.received_at()).to_le_bytes());
        Some(digest.finalize())
    }

    /// Content fingerprint of a message: `channel:sender:text` plus time bucket.
    pub fn message_fingerprint(&self, msg: &DecodedMessage) -> u32 {
        let sender = msg
            .sender()
            .pubkey_prefix
            .as_deref()
            .or(msg.sender().name.as_deref())
            .unwrap_or("");
        let channel = msg.channel().map(|c| c.to_string()).unwrap_or_default();
        let mut digest = FINGERPRINT.digest();
        digest.update(channel.as_bytes());
        digest.update(b":");
        digest.update(sender.as_bytes());
        digest.update(b":");
        digest.update(msg.text().as_bytes());
        digest.update(&self.bucket(msg.received_at()).to_le_bytes());
        digest.finalize()
    }

    /// Stable lookup key for a stored message.
    pub fn message_key(&self, msg: &DecodedMessage) -> DedupKey {
        match msg.message_hash() {
            Some(h) => DedupKey::Hash(h.to_string()),
            None => DedupKey::Fingerprint(self.message_fingerprint(msg)),
        }
    }

    pub fn admit_frame(&mut self, record: &RawFrameRecord) -> Admission {
        let hash = record.packet_hash().map(|h| DedupKey::Hash(h.to_string()));
        let fingerprint = self.frame_fingerprint(record).map(DedupKey::Fingerprint);
        self.admit(hash, fingerprint)
    }

    pub fn admit_message(&mut self, msg: &DecodedMessage) -> Admission {
        let hash = msg.message_hash().map(|h| DedupKey::Hash(h.to_string()));
        let fingerprint = Some(DedupKey::Fingerprint(self.message_fingerprint(msg)));
        self.admit(hash, fingerprint)
    }

    fn admit(&mut self, hash: Option<DedupKey>, fingerprint: Option<DedupKey>) -> Admission {
        let seen_hash = hash.as_ref().map_or(false, |k| self.hashes.contains(k));
        let seen_content = fingerprint.as_ref().map_or(false, |k| self.content.contains(k));
        if seen_hash || seen_content {
            return Admission::AlreadyPresent;
        }
        if let Some(k) = hash {
            self.hashes.mark(k);
        }
        if let Some(k) = fingerprint {
            self.content.mark(k);
        }
        Admission::New
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.content.clear();
    }

    pub fn remembered(&self) -> usize {
        self.hashes.len() + self.content.len()
    }
}
