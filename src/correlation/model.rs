//! Records flowing from the device session into the correlation store.
//!
//! Producer events (`RawFrameEvent`, `DecodedMessageEvent`) are loose: every field
//! the decoding layer may fail to fill is optional. They are converted into the
//! immutable [`RawFrameRecord`] / [`DecodedMessage`] at ingestion, which is where
//! malformed input gets refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use crate::error::IngestError;

/// Point on the producer clock, millisecond resolution.
///
/// Serialized as floating point seconds, which is how captures and replays
/// write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1000.0).round() as i64)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Absolute distance to `other` in milliseconds.
    pub fn distance_ms(self, other: Timestamp) -> u64 {
        self.0.abs_diff(other.0)
    }

    pub fn saturating_sub_ms(self, ms: i64) -> Timestamp {
        Self(self.0.saturating_sub(ms))
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Timestamp::from_secs_f64(secs)
    }
}

impl From<Timestamp> for f64 {
    fn from(ts: Timestamp) -> f64 {
        ts.as_secs_f64()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// Converts seconds from configuration into a millisecond span.
pub(crate) fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

/// A raw frame as reported by the packet-capture log (RX log).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFrameEvent {
    #[serde(default)]
    pub received_at: Option<Timestamp>,
    /// 1-byte repeater hashes, hex encoded (e.g. `["8d", "a8"]`).
    #[serde(default)]
    pub path_hashes: Vec<String>,
    #[serde(default)]
    pub snr: Option<f32>,
    /// Protocol packet hash when the decoder could compute one.
    #[serde(default)]
    pub packet_hash: Option<String>,
    /// Hex payload of the frame; used for the content fingerprint.
    #[serde(default)]
    pub payload: Option<String>,
}

/// One observed radio frame. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrameRecord {
    received_at: Timestamp,
    path_hashes: Vec<String>,
    signal_quality: Option<f32>,
    packet_hash: Option<String>,
    payload: String,
}

impl RawFrameRecord {
    pub fn new(received_at: Timestamp, path_hashes: Vec<String>, signal_quality: Option<f32>) -> Self {
        Self {
            received_at,
            path_hashes: path_hashes.into_iter().map(|h| normalize_hash(&h)).collect(),
            signal_quality,
            packet_hash: None,
            payload: String::new(),
        }
    }

    pub fn with_packet_hash(mut self, hash: impl Into<String>) -> Self {
        self.packet_hash = Some(hash.into().to_ascii_lowercase());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into().to_ascii_lowercase();
        self
    }

    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    pub fn path_hashes(&self) -> &[String] {
        &self.path_hashes
    }

    pub fn path_len(&self) -> usize {
        self.path_hashes.len()
    }

    pub fn signal_quality(&self) -> Option<f32> {
        self.signal_quality
    }

    pub fn packet_hash(&self) -> Option<&str> {
        self.packet_hash.as_deref()
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl TryFrom<RawFrameEvent> for RawFrameRecord {
    type Error = IngestError;

    fn try_from(ev: RawFrameEvent) -> Result<Self, Self::Error> {
        let received_at = ev
            .received_at
            .ok_or(IngestError::MissingTimestamp { kind: "raw frame" })?;
        let mut record = RawFrameRecord::new(received_at, ev.path_hashes, ev.snr);
        if let Some(hash) = ev.packet_hash.filter(|h| !h.trim().is_empty()) {
            record = record.with_packet_hash(hash.trim());
        }
        if let Some(payload) = ev.payload {
            record = record.with_payload(payload.trim());
        }
        Ok(record)
    }
}

impl AsRef<RawFrameRecord> for RawFrameRecord {
    fn as_ref(&self) -> &RawFrameRecord {
        self
    }
}

/// An admitted frame with its ingestion sequence number.
///
/// Buffer and archive hold clones of the same slot, so `seq` names one
/// physical frame across both.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    pub seq: u64,
    pub record: Arc<RawFrameRecord>,
}

impl AsRef<RawFrameRecord> for FrameSlot {
    fn as_ref(&self) -> &RawFrameRecord {
        &self.record
    }
}

fn normalize_hash(h: &str) -> String {
    h.trim().to_ascii_lowercase()
}

/// Who sent a decoded message, as far as the protocol layer knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRef {
    /// Public key or key prefix (hex); DMs carry it, channel messages usually don't.
    #[serde(default)]
    pub pubkey_prefix: Option<String>,
    /// Advertised name, as parsed from `"Name: text"` for channel messages.
    #[serde(default)]
    pub name: Option<String>,
}

/// A decoded application message as reported by the protocol layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodedMessageEvent {
    #[serde(default)]
    pub received_at: Option<Timestamp>,
    #[serde(default)]
    pub path_len: u32,
    #[serde(default)]
    pub snr: Option<f32>,
    #[serde(default)]
    pub message_hash: Option<String>,
    #[serde(default)]
    pub sender: SenderRef,
    #[serde(default)]
    pub channel: Option<u8>,
    #[serde(default)]
    pub text: String,
}

/// One application-level message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    received_at: Timestamp,
    reported_hop_count: u32,
    signal_quality_reported: Option<f32>,
    message_hash: Option<String>,
    sender: SenderRef,
    channel: Option<u8>,
    text: String,
}

impl DecodedMessage {
    pub fn new(received_at: Timestamp, reported_hop_count: u32) -> Self {
        Self {
            received_at,
            reported_hop_count,
            signal_quality_reported: None,
            message_hash: None,
            sender: SenderRef::default(),
            channel: None,
            text: String::new(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.message_hash = Some(hash.into().to_ascii_lowercase());
        self
    }

    pub fn with_sender(mut self, sender: SenderRef) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_text(mut self, channel: Option<u8>, text: impl Into<String>) -> Self {
        self.channel = channel;
        self.text = text.into();
        self
    }

    pub fn with_snr(mut self, snr: f32) -> Self {
        self.signal_quality_reported = Some(snr);
        self
    }

    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    pub fn reported_hop_count(&self) -> u32 {
        self.reported_hop_count
    }

    /// SNR as reported by the protocol layer. Display only, never a matching key.
    pub fn signal_quality_reported(&self) -> Option<f32> {
        self.signal_quality_reported
    }

    pub fn message_hash(&self) -> Option<&str> {
        self.message_hash.as_deref()
    }

    pub fn sender(&self) -> &SenderRef {
        &self.sender
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl TryFrom<DecodedMessageEvent> for DecodedMessage {
    type Error = IngestError;

    fn try_from(ev: DecodedMessageEvent) -> Result<Self, Self::Error> {
        let received_at = ev
            .received_at
            .ok_or(IngestError::MissingTimestamp { kind: "decoded message" })?;
        let hash = ev.message_hash.filter(|h| !h.trim().is_empty());
        let has_sender = ev.sender.pubkey_prefix.is_some() || ev.sender.name.is_some();
        if hash.is_none() && !has_sender && ev.text.is_empty() {
            return Err(IngestError::NoIdentity);
        }
        let mut msg = DecodedMessage::new(received_at, ev.path_len)
            .with_sender(ev.sender)
            .with_text(ev.channel, ev.text);
        msg.signal_quality_reported = ev.snr;
        if let Some(h) = hash {
            msg = msg.with_hash(h.trim());
        }
        Ok(msg)
    }
}

/// Which tier of the matching engine produced a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Forward,
    Retroactive,
    Archive,
    None,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchSource::Forward => "forward",
            MatchSource::Retroactive => "retroactive",
            MatchSource::Archive => "archive",
            MatchSource::None => "none",
        };
        f.write_str(s)
    }
}

/// Outcome of correlating one message against frame data.
///
/// A non-empty `resolved_path` has passed the sanity check but not yet the
/// display guard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub resolved_path: Vec<String>,
    pub source: MatchSource,
    /// SNR of the matched frame, carried for display.
    pub frame_signal_quality: Option<f32>,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            resolved_path: Vec::new(),
            source: MatchSource::None,
            frame_signal_quality: None,
        }
    }

    pub fn from_record(record: &RawFrameRecord, source: MatchSource) -> Self {
        Self {
            resolved_path: record.path_hashes().to_vec(),
            source,
            frame_signal_quality: record.signal_quality(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.source != MatchSource::None
    }
}
