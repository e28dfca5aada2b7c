//! Candidate validation and selection shared by all three matching tiers.
//!
//! A candidate frame is acceptable for a message when its hash chain is no
//! longer than `reported_hop_count + sanity_margin`. Among acceptable frames in
//! the temporal window, the one closest in time wins; ties go to the earlier
//! frame. Signal quality plays no part in either step.

use log::trace;

use super::model::{secs_to_ms, DecodedMessage, RawFrameRecord};
use crate::config::CorrelationConfig;
use crate::logutil::fmt_chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    window_ms: i64,
    sanity_margin: usize,
}

impl MatchPolicy {
    pub fn new(window_seconds: f64, sanity_margin: usize) -> Self {
        Self {
            window_ms: secs_to_ms(window_seconds),
            sanity_margin,
        }
    }

    pub fn from_config(cfg: &CorrelationConfig) -> Self {
        Self::new(cfg.temporal_window_seconds, cfg.path_len_sanity_margin)
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn sanity_margin(&self) -> usize {
        self.sanity_margin
    }

    /// `path_len <= hops + margin`
    pub fn passes_sanity(&self, path_len: usize, reported_hop_count: u32) -> bool {
        path_len <= (reported_hop_count as usize).saturating_add(self.sanity_margin)
    }

    pub fn in_window(&self, record: &RawFrameRecord, message: &DecodedMessage) -> bool {
        record.received_at().distance_ms(message.received_at()) <= self.window_ms.max(0) as u64
    }

    /// Whether `record` may be attributed to `message` at all.
    pub fn accepts(&self, record: &RawFrameRecord, message: &DecodedMessage) -> bool {
        self.in_window(record, message)
            && self.passes_sanity(record.path_len(), message.reported_hop_count())
    }

    /// Best acceptable candidate for `message`, or `None` when the window is
    /// empty or holds only invalid frames. Works over bare records as well as
    /// buffer/archive slots.
    pub fn select_best<T, I>(&self, message: &DecodedMessage, candidates: I) -> Option<T>
    where
        T: AsRef<RawFrameRecord>,
        I: IntoIterator<Item = T>,
    {
        let mut best: Option<T> = None;
        for candidate in candidates {
            let record = candidate.as_ref();
            if !self.accepts(record, message) {
                trace!(
                    "reject frame t={} chain={} for msg t={} hops={}",
                    record.received_at(),
                    fmt_chain(record.path_hashes()),
                    message.received_at(),
                    message.reported_hop_count()
                );
                continue;
            }
            let replace = match &best {
                None => true,
                Some(current) => closer(record, current.as_ref(), message),
            };
            if replace {
                best = Some(candidate);
            }
        }
        best
    }

    /// For a frame that arrived after one or more messages: index of the
    /// closest message it may belong to. Ties go to the earlier message.
    pub fn select_message<'a, I>(&self, record: &RawFrameRecord, messages: I) -> Option<usize>
    where
        I: IntoIterator<Item = (usize, &'a DecodedMessage)>,
    {
        let mut best: Option<(usize, u64, i64)> = None;
        for (idx, message) in messages {
            if !self.accepts(record, message) {
                continue;
            }
            let dist = record.received_at().distance_ms(message.received_at());
            let at = message.received_at().as_millis();
            let better = match best {
                None => true,
                Some((_, best_dist, best_at)) => dist < best_dist || (dist == best_dist && at < best_at),
            };
            if better {
                best = Some((idx, dist, at));
            }
        }
        best.map(|(idx, _, _)| idx)
    }
}

fn closer(candidate: &RawFrameRecord, current: &RawFrameRecord, message: &DecodedMessage) -> bool {
    let d_new = candidate.received_at().distance_ms(message.received_at());
    let d_cur = current.received_at().distance_ms(message.received_at());
    d_new < d_cur || (d_new == d_cur && candidate.received_at() < current.received_at())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::model::Timestamp;

    fn frame(secs: f64, hops: usize, snr: f32) -> RawFrameRecord {
        let chain = (0..hops).map(|i| format!("{:02x}", i)).collect();
        RawFrameRecord::new(Timestamp::from_secs_f64(secs), chain, Some(snr))
    }

    fn msg(secs: f64, hops: u32) -> DecodedMessage {
        DecodedMessage::new(Timestamp::from_secs_f64(secs), hops).with_text(Some(0), "x")
    }

    #[test]
    fn sanity_margin_bounds_chain_length() {
        let policy = MatchPolicy::new(3.0, 5);
        assert!(policy.passes_sanity(12, 7));
        assert!(!policy.passes_sanity(13, 7));
        assert!(!policy.passes_sanity(22, 7));
        assert!(policy.passes_sanity(0, 0));
        assert!(policy.passes_sanity(5, 0));
        assert!(!policy.passes_sanity(6, 0));
    }

    #[test]
    fn closest_candidate_wins() {
        let policy = MatchPolicy::new(3.0, 5);
        let m = msg(10.0, 2);
        let frames = [frame(11.0, 2, 0.0), frame(9.5, 1, 0.0)];
        let best = policy.select_best(&m, frames.iter()).unwrap();
        assert_eq!(best.received_at().as_millis(), 9_500);
    }

    #[test]
    fn equal_distance_prefers_earlier_frame() {
        let policy = MatchPolicy::new(3.0, 5);
        let m = msg(10.0, 2);
        let frames = [frame(11.0, 2, 0.0), frame(9.0, 1, 0.0)];
        let best = policy.select_best(&m, frames.iter()).unwrap();
        assert_eq!(best.received_at().as_millis(), 9_000);
    }

    #[test]
    fn invalid_only_window_is_no_match() {
        let policy = MatchPolicy::new(3.0, 5);
        let m = msg(10.0, 1);
        let frames = [frame(10.1, 9, 0.0), frame(20.0, 1, 0.0)];
        assert!(policy.select_best(&m, frames.iter()).is_none());
        assert!(policy
            .select_best(&m, std::iter::empty::<&RawFrameRecord>())
            .is_none());
    }

    #[test]
    fn signal_quality_does_not_influence_choice() {
        let policy = MatchPolicy::new(3.0, 5);
        let m = msg(10.0, 1);
        for (snr_a, snr_b) in [(12.0, -15.0), (-15.0, 12.0), (0.0, 0.0)] {
            let frames = [frame(10.8, 1, snr_a), frame(10.3, 1, snr_b)];
            let best = policy.select_best(&m, frames.iter()).unwrap();
            assert_eq!(best.received_at().as_millis(), 10_300);
        }
    }

    #[test]
    fn frame_goes_to_closest_message() {
        let policy = MatchPolicy::new(3.0, 5);
        let msgs = [msg(8.0, 1), msg(10.0, 1), msg(30.0, 1)];
        let f = frame(10.4, 1, 0.0);
        let idx = policy.select_message(&f, msgs.iter().enumerate());
        assert_eq!(idx, Some(1));
    }
}
