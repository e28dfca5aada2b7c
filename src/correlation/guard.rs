//! Render-time veto on matched routes.
//!
//! Evaluated against the message's reported hop count just before a route is
//! shown, regardless of which tier produced it. Kept apart from the matcher's
//! sanity margin so retuning one never loosens the other.

use log::debug;

use super::model::{DecodedMessage, MatchResult};
use crate::logutil::fmt_chain;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGuard {
    factor: usize,
}

impl Default for DisplayGuard {
    fn default() -> Self {
        Self { factor: 2 }
    }
}

impl DisplayGuard {
    pub fn new(factor: usize) -> Self {
        Self { factor }
    }

    /// A route of `path_len` hops may be shown for a message reporting
    /// `reported_hop_count` hops. Direct messages (0 hops) are never vetoed.
    pub fn permits(&self, reported_hop_count: u32, path_len: usize) -> bool {
        reported_hop_count == 0 || path_len <= (reported_hop_count as usize).saturating_mul(self.factor)
    }

    /// Returns the match unchanged, or an empty no-match result when vetoed.
    pub fn review(&self, message: &DecodedMessage, result: MatchResult) -> MatchResult {
        if self.permits(message.reported_hop_count(), result.resolved_path.len()) {
            return result;
        }
        debug!(
            "display guard veto: {} match {} has {} hops, message reports {}",
            result.source,
            fmt_chain(&result.resolved_path),
            result.resolved_path.len(),
            message.reported_hop_count()
        );
        metrics::inc_guard_vetoes();
        MatchResult::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::model::{MatchSource, Timestamp};

    #[test]
    fn permits_up_to_twice_the_hop_count() {
        let guard = DisplayGuard::default();
        assert!(guard.permits(1, 2));
        assert!(!guard.permits(1, 3));
        assert!(guard.permits(3, 6));
        assert!(!guard.permits(3, 7));
        assert!(guard.permits(0, 9));
    }

    #[test]
    fn vetoed_match_becomes_empty() {
        let guard = DisplayGuard::default();
        let msg = DecodedMessage::new(Timestamp::from_secs_f64(1.0), 1).with_text(None, "t");
        let matched = MatchResult {
            resolved_path: vec!["01".into(), "02".into(), "03".into(), "04".into()],
            source: MatchSource::Forward,
            frame_signal_quality: Some(4.5),
        };
        let reviewed = guard.review(&msg, matched);
        assert!(reviewed.resolved_path.is_empty());
        assert_eq!(reviewed.source, MatchSource::None);
    }
}
