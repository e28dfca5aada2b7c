//! The shared correlation store.
//!
//! One mutex covers the ingestion buffer, the retention archive and the message
//! list. Every operation is a short, bounded scan, so a single lock domain is
//! enough and is never held across an await point.
//!
//! ## Startup barrier
//!
//! Until [`CorrelationStore::clear_all`] runs the store is in its init phase:
//! frames and messages are accepted (so the clear has something to discard)
//! but nothing is matched. Messages received in that phase stay unmatched for
//! good. The barrier clears buffer and archive; anything inserted after it has
//! taken effect survives.
//!
//! ## Frame attribution
//!
//! Every admitted frame gets a sequence number shared by its buffer and archive
//! slots. A forward or retroactive match claims that number, and claimed frames
//! are never offered to another message. The archive tier stays read-only: it
//! offers a frame to a message only when no other unmatched message lies closer
//! to it (ties go to the earlier message).

use log::{debug, info, warn};
use std::collections::{BTreeSet, VecDeque};
use std::convert::TryFrom;
use std::sync::{Arc, Mutex, MutexGuard};

use super::archive::RetentionArchive;
use super::buffer::IngestionBuffer;
use super::dedup::{Admission, DedupKey, Deduplicator};
use super::matcher::MatchPolicy;
use super::model::{
    secs_to_ms, DecodedMessage, DecodedMessageEvent, FrameSlot, MatchResult, MatchSource,
    RawFrameEvent, RawFrameRecord,
};
use crate::config::CorrelationConfig;
use crate::logutil::{escape_log, fmt_chain};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the startup barrier: accumulate, never match.
    Init,
    Live,
}

#[derive(Debug)]
struct MessageEntry {
    key: DedupKey,
    message: DecodedMessage,
    /// Arrived after the startup barrier.
    matchable: bool,
    matched: Option<MatchResult>,
}

#[derive(Debug)]
struct StoreState {
    phase: Phase,
    buffer: IngestionBuffer,
    archive: RetentionArchive,
    messages: VecDeque<MessageEntry>,
    message_dedup: Deduplicator,
    next_frame_seq: u64,
    /// Sequence numbers of frames already attributed to a message.
    claimed: BTreeSet<u64>,
}

impl StoreState {
    /// Forgets claims on frames that neither the buffer nor the archive holds.
    fn release_claims(&mut self) {
        let floor = match (self.buffer.oldest_seq(), self.archive.oldest_seq()) {
            (Some(b), Some(a)) => b.min(a),
            (Some(seq), None) | (None, Some(seq)) => seq,
            (None, None) => {
                self.claimed.clear();
                return;
            }
        };
        self.claimed = self.claimed.split_off(&floor);
    }
}

/// Counts of what the store currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub phase: Phase,
    pub buffered_frames: usize,
    pub archived_frames: usize,
    pub messages: usize,
    pub matched_messages: usize,
}

pub struct CorrelationStore {
    config: CorrelationConfig,
    policy: MatchPolicy,
    horizon_ms: i64,
    state: Mutex<StoreState>,
}

impl CorrelationStore {
    pub fn new(config: CorrelationConfig) -> Self {
        let state = StoreState {
            phase: Phase::Init,
            buffer: IngestionBuffer::new(),
            archive: RetentionArchive::from_config(&config),
            messages: VecDeque::new(),
            // Must outlive every stored message or a late redelivery gets in.
            message_dedup: Deduplicator::new(
                config.dedup_capacity.max(config.max_messages),
                config.dedup_bucket_seconds,
            ),
            next_frame_seq: 0,
            claimed: BTreeSet::new(),
        };
        Self {
            policy: MatchPolicy::from_config(&config),
            horizon_ms: secs_to_ms(config.buffer_horizon_seconds),
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    // A panic elsewhere must not take the store down with it; the state is
    // consistent between operations, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Producer hook for a raw frame from the RX log.
    pub fn on_raw_frame(&self, event: RawFrameEvent) {
        let record = match RawFrameRecord::try_from(event) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                warn!("dropping raw frame: {}", e);
                metrics::inc_malformed_dropped();
                return;
            }
        };
        let mut state = self.lock();
        let slot = FrameSlot {
            seq: state.next_frame_seq,
            record: Arc::clone(&record),
        };
        if state.archive.insert(slot.clone()) == Admission::AlreadyPresent {
            debug!(
                "duplicate frame t={} chain={} ignored",
                record.received_at(),
                fmt_chain(record.path_hashes())
            );
            metrics::inc_duplicate_frames();
            return;
        }
        state.next_frame_seq += 1;
        state.buffer.push(slot.clone());
        if state.phase == Phase::Init {
            return;
        }

        let cutoff = record.received_at().saturating_sub_ms(self.horizon_ms);
        state.buffer.prune_before(cutoff);
        state.release_claims();

        let pending = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matchable && e.matched.is_none())
            .map(|(i, e)| (i, &e.message));
        if let Some(idx) = self.policy.select_message(&record, pending) {
            state.claimed.insert(slot.seq);
            let entry = &mut state.messages[idx];
            debug!(
                "retroactive match: msg t={} <- frame t={} chain={}",
                entry.message.received_at(),
                record.received_at(),
                fmt_chain(record.path_hashes())
            );
            entry.matched = Some(MatchResult::from_record(&record, MatchSource::Retroactive));
            metrics::record_match(MatchSource::Retroactive);
        }
    }

    /// Producer hook for a decoded message.
    pub fn on_decoded_message(&self, event: DecodedMessageEvent) {
        let message = match DecodedMessage::try_from(event) {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping decoded message: {}", e);
                metrics::inc_malformed_dropped();
                return;
            }
        };
        let mut state = self.lock();
        if state.message_dedup.admit_message(&message) == Admission::AlreadyPresent {
            debug!(
                "duplicate message t={} text='{}' ignored",
                message.received_at(),
                escape_log(message.text())
            );
            metrics::inc_duplicate_messages();
            return;
        }
        let key = state.message_dedup.message_key(&message);
        let matchable = state.phase == Phase::Live;

        let matched = if matchable {
            let cutoff = message.received_at().saturating_sub_ms(self.horizon_ms);
            state.buffer.prune_before(cutoff);
            state.release_claims();
            let claimed = &state.claimed;
            let candidates = state
                .buffer
                .candidates_within(self.policy.window_ms(), message.received_at())
                .filter(|s| !claimed.contains(&s.seq));
            let best = self.policy.select_best(&message, candidates).cloned();
            best.map(|slot| {
                state.claimed.insert(slot.seq);
                let record = slot.record.as_ref();
                debug!(
                    "forward match: msg t={} hops={} -> frame t={} chain={}",
                    message.received_at(),
                    message.reported_hop_count(),
                    record.received_at(),
                    fmt_chain(record.path_hashes())
                );
                metrics::record_match(MatchSource::Forward);
                MatchResult::from_record(record, MatchSource::Forward)
            })
        } else {
            debug!(
                "message t={} received during init phase; not matchable",
                message.received_at()
            );
            None
        };

        state.messages.push_back(MessageEntry {
            key,
            message,
            matchable,
            matched,
        });
        while state.messages.len() > self.config.max_messages {
            state.messages.pop_front();
        }
    }

    /// Startup barrier: empties buffer and archive and enables matching.
    pub fn clear_all(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Live {
            warn!("startup barrier invoked again; clearing anyway");
        }
        let discarded = state.buffer.len() + state.archive.len();
        state.buffer.clear();
        state.archive.reset();
        state.claimed.clear();
        state.phase = Phase::Live;
        metrics::inc_startup_barriers();
        info!("startup barrier: discarded {} init-phase frame(s), matching enabled", discarded);
    }

    pub fn clear_archive(&self) {
        let mut state = self.lock();
        let n = state.archive.len();
        state.archive.clear();
        state.release_claims();
        info!("archive cleared ({} frame(s))", n);
    }

    /// Correlation result for `message`: the stored forward/retroactive match,
    /// otherwise an on-demand archive lookup. Read-only.
    pub fn match_for(&self, message: &DecodedMessage) -> MatchResult {
        let state = self.lock();
        let key = state.message_dedup.message_key(message);
        let found = state.messages.iter().enumerate().rev().find(|(_, e)| e.key == key);
        let target = match found {
            Some((_, e)) if !e.matchable => None,
            Some((idx, e)) => match &e.matched {
                Some(m) => return m.clone(),
                None => Some(idx),
            },
            None if state.phase == Phase::Live => Some(usize::MAX),
            None => None,
        };
        let result = match target {
            Some(target) => self.archive_lookup(&state, message, target),
            None => MatchResult::none(),
        };
        metrics::record_match(result.source);
        result
    }

    /// Archive tier for `message`, known to the store under index `target`
    /// (`usize::MAX` when it is not stored). A frame qualifies when it is
    /// unclaimed and `message` is its closest unmatched message.
    fn archive_lookup(&self, state: &StoreState, message: &DecodedMessage, target: usize) -> MatchResult {
        let mut rivals: Vec<(usize, &DecodedMessage)> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matchable && e.matched.is_none())
            .map(|(i, e)| (i, &e.message))
            .collect();
        if target == usize::MAX {
            rivals.push((target, message));
        }
        state.archive.find_path(message, &self.policy, |slot| {
            !state.claimed.contains(&slot.seq)
                && self.policy.select_message(&slot.record, rivals.iter().copied()) == Some(target)
        })
    }

    /// Messages currently held, oldest first.
    pub fn messages(&self) -> Vec<DecodedMessage> {
        self.lock().messages.iter().map(|e| e.message.clone()).collect()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.lock();
        StoreStats {
            phase: state.phase,
            buffered_frames: state.buffer.len(),
            archived_frames: state.archive.len(),
            messages: state.messages.len(),
            matched_messages: state.messages.iter().filter(|e| e.matched.is_some()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::model::{SenderRef, Timestamp};

    fn frame(secs: f64, chain: &[&str]) -> RawFrameEvent {
        RawFrameEvent {
            received_at: Some(Timestamp::from_secs_f64(secs)),
            path_hashes: chain.iter().map(|s| s.to_string()).collect(),
            snr: Some(6.25),
            packet_hash: None,
            payload: None,
        }
    }

    fn message(secs: f64, hops: u32, text: &str) -> DecodedMessageEvent {
        DecodedMessageEvent {
            received_at: Some(Timestamp::from_secs_f64(secs)),
            path_len: hops,
            snr: Some(2.0),
            message_hash: None,
            sender: SenderRef {
                pubkey_prefix: None,
                name: Some("Alice".into()),
            },
            channel: Some(0),
            text: text.to_string(),
        }
    }

    fn live_store() -> CorrelationStore {
        let store = CorrelationStore::new(CorrelationConfig::default());
        store.clear_all();
        store
    }

    fn last_message(store: &CorrelationStore) -> DecodedMessage {
        store.messages().pop().expect("message stored")
    }

    #[test]
    fn forward_match_picks_buffered_frame() {
        let store = live_store();
        store.on_raw_frame(frame(9.8, &["8d", "a8"]));
        store.on_decoded_message(message(10.0, 2, "hello"));
        let res = store.match_for(&last_message(&store));
        assert_eq!(res.source, MatchSource::Forward);
        assert_eq!(res.resolved_path, vec!["8d".to_string(), "a8".to_string()]);
        assert_eq!(res.frame_signal_quality, Some(6.25));
    }

    #[test]
    fn late_frame_matches_retroactively() {
        let store = live_store();
        store.on_decoded_message(message(10.0, 1, "late frame"));
        store.on_raw_frame(frame(10.4, &["42"]));
        let res = store.match_for(&last_message(&store));
        assert_eq!(res.source, MatchSource::Retroactive);
        assert_eq!(res.resolved_path, vec!["42".to_string()]);
    }

    #[test]
    fn init_phase_never_matches() {
        let store = CorrelationStore::new(CorrelationConfig::default());
        store.on_raw_frame(frame(1.0, &["01"]));
        store.on_decoded_message(message(1.1, 1, "early"));
        assert_eq!(store.phase(), Phase::Init);
        assert_eq!(store.match_for(&last_message(&store)), MatchResult::none());

        store.clear_all();
        let stats = store.stats();
        assert_eq!(stats.buffered_frames, 0);
        assert_eq!(stats.archived_frames, 0);
        assert_eq!(stats.messages, 1);
        // A frame after the barrier must not rescue a pre-barrier message.
        store.on_raw_frame(frame(1.2, &["02"]));
        assert_eq!(store.match_for(&store.messages()[0]), MatchResult::none());
    }

    #[test]
    fn archive_fallback_after_buffer_pruned() {
        let store = live_store();
        store.on_raw_frame(frame(100.0, &["aa", "bb"]));
        // A much later frame pushes the first one out of the buffer horizon.
        store.on_raw_frame(frame(200.0, &[]));
        assert_eq!(store.stats().buffered_frames, 1);
        store.on_decoded_message(message(100.5, 2, "from the past"));
        let msg = last_message(&store);
        let res = store.match_for(&msg);
        assert_eq!(res.source, MatchSource::Archive);
        assert_eq!(res.resolved_path, vec!["aa".to_string(), "bb".to_string()]);
        assert_eq!(store.match_for(&msg), res);
    }

    #[test]
    fn malformed_and_duplicate_events_are_dropped() {
        let store = live_store();
        store.on_raw_frame(RawFrameEvent::default());
        store.on_decoded_message(DecodedMessageEvent::default());
        store.on_decoded_message(message(5.0, 0, "twice"));
        store.on_decoded_message(message(5.2, 0, "twice"));
        let stats = store.stats();
        assert_eq!(stats.buffered_frames, 0);
        assert_eq!(stats.messages, 1);
    }

    #[test]
    fn message_list_is_bounded() {
        let mut cfg = CorrelationConfig::default();
        cfg.max_messages = 2;
        let store = CorrelationStore::new(cfg);
        store.clear_all();
        for (i, t) in [1.0, 2.0, 3.0].iter().enumerate() {
            store.on_decoded_message(message(*t, 0, &format!("m{}", i)));
        }
        let texts: Vec<String> = store.messages().iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, vec!["m1".to_string(), "m2".to_string()]);
    }

    #[test]
    fn forward_match_claims_its_frame() {
        let store = live_store();
        store.on_raw_frame(frame(10.0, &["8d"]));
        store.on_decoded_message(message(10.1, 1, "first"));
        store.on_decoded_message(message(10.2, 1, "second"));
        let msgs = store.messages();
        assert_eq!(store.match_for(&msgs[0]).source, MatchSource::Forward);
        assert_eq!(store.match_for(&msgs[1]), MatchResult::none());
        assert_eq!(store.stats().matched_messages, 1);
    }

    #[test]
    fn archive_offers_frame_to_closest_unmatched_message_only() {
        let store = live_store();
        store.on_raw_frame(frame(100.0, &["aa"]));
        store.on_raw_frame(frame(200.0, &[]));
        store.on_decoded_message(message(100.2, 1, "near"));
        store.on_decoded_message(message(101.0, 1, "far"));
        let msgs = store.messages();
        assert_eq!(store.stats().matched_messages, 0);
        assert_eq!(store.match_for(&msgs[1]), MatchResult::none());
        let near = store.match_for(&msgs[0]);
        assert_eq!(near.source, MatchSource::Archive);
        assert_eq!(near.resolved_path, vec!["aa".to_string()]);
    }

    #[test]
    fn archive_lookup_skips_frames_claimed_elsewhere() {
        let store = live_store();
        store.on_decoded_message(message(50.0, 1, "claimer"));
        store.on_raw_frame(frame(50.5, &["aa"]));
        // Push the frame out of the buffer; the archive still holds it.
        store.on_raw_frame(frame(500.0, &[]));
        assert_eq!(store.stats().buffered_frames, 1);
        let claimer = store.messages().pop().expect("message stored");
        assert_eq!(store.match_for(&claimer).source, MatchSource::Retroactive);

        store.on_decoded_message(message(50.6, 1, "latecomer"));
        let latecomer = last_message(&store);
        assert_eq!(store.match_for(&latecomer), MatchResult::none());
    }

    #[test]
    fn claims_are_released_with_their_frames() {
        let mut cfg = CorrelationConfig::default();
        cfg.archive_max_entries = 1;
        let store = CorrelationStore::new(cfg);
        store.clear_all();
        store.on_raw_frame(frame(10.0, &["8d"]));
        store.on_decoded_message(message(10.1, 1, "takes it"));
        assert!(store.lock().claimed.contains(&0));

        // Evicted from the archive and pruned from the buffer.
        store.on_raw_frame(frame(400.0, &[]));
        assert!(store.lock().claimed.is_empty());
    }

    #[test]
    fn message_dedup_outlives_message_list() {
        let mut cfg = CorrelationConfig::default();
        cfg.dedup_capacity = 2;
        cfg.max_messages = 10;
        let store = CorrelationStore::new(cfg);
        store.clear_all();
        for (i, t) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            store.on_decoded_message(message(*t, 0, &format!("m{}", i)));
        }
        store.on_decoded_message(message(1.5, 0, "m0"));
        assert_eq!(store.stats().messages, 4);
    }
}
