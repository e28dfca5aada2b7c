//! Short-term working set of raw frames for forward and retroactive matching.

use std::collections::VecDeque;

use super::model::{FrameSlot, Timestamp};

/// Frames in arrival order. No count bound; old frames are pruned lazily by
/// the matching path via [`IngestionBuffer::prune_before`].
#[derive(Debug, Default)]
pub struct IngestionBuffer {
    records: VecDeque<FrameSlot>,
}

impl IngestionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: FrameSlot) {
        self.records.push_back(slot);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Frames whose `received_at` lies within `window_ms` either side of `as_of`.
    pub fn candidates_within(
        &self,
        window_ms: i64,
        as_of: Timestamp,
    ) -> impl Iterator<Item = &FrameSlot> + '_ {
        let window = window_ms.max(0) as u64;
        self.records
            .iter()
            .filter(move |s| s.record.received_at().distance_ms(as_of) <= window)
    }

    /// Sequence number of the oldest frame still buffered.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.records.front().map(|s| s.seq)
    }

    /// Drops frames older than `cutoff` from the front. Frames arrive in
    /// per-stream order, so the scan stops at the first frame still in range.
    pub fn prune_before(&mut self, cutoff: Timestamp) -> usize {
        let mut dropped = 0;
        while let Some(front) = self.records.front() {
            if front.record.received_at() >= cutoff {
                break;
            }
            self.records.pop_front();
            dropped += 1;
        }
        dropped
    }
}
