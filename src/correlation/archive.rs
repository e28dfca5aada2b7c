//! Bounded, longer-lived frame store consulted when the buffer yields nothing.
//!
//! Slots are kept in insertion order in a `VecDeque`; eviction always pops the
//! front, either because the entry count exceeds `max_entries` or because the
//! front slot is older than `max_age` relative to the newest frame inserted.
//! Both checks are O(1) amortized per insert.
//!
//! The frame deduplicator lives here because every admitted frame passes
//! through the archive first. Emptying the slots ([`RetentionArchive::clear`])
//! keeps the seen-sets, since the ingestion buffer may still hold those frames;
//! only [`RetentionArchive::reset`] forgets them.

use log::{debug, trace};
use std::collections::VecDeque;

use super::dedup::{Admission, Deduplicator};
use super::matcher::MatchPolicy;
use super::model::{secs_to_ms, DecodedMessage, FrameSlot, MatchResult, MatchSource, Timestamp};
use crate::config::CorrelationConfig;
use crate::metrics;

#[derive(Debug)]
pub struct RetentionArchive {
    slots: VecDeque<FrameSlot>,
    newest: Option<Timestamp>,
    max_entries: usize,
    max_age_ms: i64,
    dedup: Deduplicator,
}

impl RetentionArchive {
    pub fn new(max_entries: usize, max_age_seconds: f64, dedup: Deduplicator) -> Self {
        Self {
            slots: VecDeque::new(),
            newest: None,
            max_entries: max_entries.max(1),
            max_age_ms: secs_to_ms(max_age_seconds),
            dedup,
        }
    }

    pub fn from_config(cfg: &CorrelationConfig) -> Self {
        Self::new(
            cfg.archive_max_entries,
            cfg.archive_max_age_seconds,
            Deduplicator::new(cfg.dedup_capacity, cfg.dedup_bucket_seconds),
        )
    }

    /// Adds a frame unless the deduplicator has already seen it.
    pub fn insert(&mut self, slot: FrameSlot) -> Admission {
        if self.dedup.admit_frame(&slot.record) == Admission::AlreadyPresent {
            return Admission::AlreadyPresent;
        }
        let at = slot.record.received_at();
        self.newest = Some(self.newest.map_or(at, |n| n.max(at)));
        self.slots.push_back(slot);
        self.evict();
        Admission::New
    }

    fn evict(&mut self) {
        let mut evicted = 0u64;
        while self.slots.len() > self.max_entries {
            self.slots.pop_front();
            evicted += 1;
        }
        if let Some(newest) = self.newest {
            let cutoff = newest.saturating_sub_ms(self.max_age_ms);
            while self
                .slots
                .front()
                .map_or(false, |s| s.record.received_at() < cutoff)
            {
                self.slots.pop_front();
                evicted += 1;
            }
        }
        if evicted > 0 {
            trace!("archive evicted {} slot(s), {} retained", evicted, self.slots.len());
            metrics::add_archive_evictions(evicted);
        }
    }

    /// Best temporal match for `message` among retained frames for which
    /// `eligible` holds.
    pub fn find_path<F>(&self, message: &DecodedMessage, policy: &MatchPolicy, eligible: F) -> MatchResult
    where
        F: Fn(&FrameSlot) -> bool,
    {
        match policy.select_best(message, self.slots.iter().filter(|&s| eligible(s))) {
            Some(slot) => {
                let record = slot.record.as_ref();
                debug!(
                    "archive match for msg t={}: frame t={} ({} hops)",
                    message.received_at(),
                    record.received_at(),
                    record.path_len()
                );
                MatchResult::from_record(record, MatchSource::Archive)
            }
            None => MatchResult::none(),
        }
    }

    /// Drops every retained frame. Frame identities stay remembered.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.newest = None;
    }

    /// Drops every retained frame and forgets every frame identity.
    pub fn reset(&mut self) {
        self.clear();
        self.dedup.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn oldest_seq(&self) -> Option<u64> {
        self.slots.front().map(|s| s.seq)
    }
}
