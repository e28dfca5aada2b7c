//! Process-wide correlation counters.
//! Cheap relaxed atomics; read them through [`snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

use crate::correlation::MatchSource;

static FORWARD_MATCHES: AtomicU64 = AtomicU64::new(0);
static RETROACTIVE_MATCHES: AtomicU64 = AtomicU64::new(0);
static ARCHIVE_MATCHES: AtomicU64 = AtomicU64::new(0);
static NO_MATCHES: AtomicU64 = AtomicU64::new(0);
static GUARD_VETOES: AtomicU64 = AtomicU64::new(0);
static DUPLICATE_FRAMES: AtomicU64 = AtomicU64::new(0);
static DUPLICATE_MESSAGES: AtomicU64 = AtomicU64::new(0);
static MALFORMED_DROPPED: AtomicU64 = AtomicU64::new(0);
static STARTUP_BARRIERS: AtomicU64 = AtomicU64::new(0);
static ARCHIVE_EVICTIONS: AtomicU64 = AtomicU64::new(0);

/// Counts a matching outcome. Forward and retroactive are counted when the
/// match is made, archive and none each time a route is resolved.
pub fn record_match(source: MatchSource) {
    let counter = match source {
        MatchSource::Forward => &FORWARD_MATCHES,
        MatchSource::Retroactive => &RETROACTIVE_MATCHES,
        MatchSource::Archive => &ARCHIVE_MATCHES,
        MatchSource::None => &NO_MATCHES,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_guard_vetoes() {
    GUARD_VETOES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_duplicate_frames() {
    DUPLICATE_FRAMES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_duplicate_messages() {
    DUPLICATE_MESSAGES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_malformed_dropped() {
    MALFORMED_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_startup_barriers() {
    STARTUP_BARRIERS.fetch_add(1, Ordering::Relaxed);
}

pub fn add_archive_evictions(n: u64) {
    ARCHIVE_EVICTIONS.fetch_add(n, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub forward_matches: u64,
    pub retroactive_matches: u64,
    pub archive_matches: u64,
    pub no_matches: u64,
    pub guard_vetoes: u64,
    pub duplicate_frames: u64,
    pub duplicate_messages: u64,
    pub malformed_dropped: u64,
    pub startup_barriers: u64,
    pub archive_evictions: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        forward_matches: FORWARD_MATCHES.load(Ordering::Relaxed),
        retroactive_matches: RETROACTIVE_MATCHES.load(Ordering::Relaxed),
        archive_matches: ARCHIVE_MATCHES.load(Ordering::Relaxed),
        no_matches: NO_MATCHES.load(Ordering::Relaxed),
        guard_vetoes: GUARD_VETOES.load(Ordering::Relaxed),
        duplicate_frames: DUPLICATE_FRAMES.load(Ordering::Relaxed),
        duplicate_messages: DUPLICATE_MESSAGES.load(Ordering::Relaxed),
        malformed_dropped: MALFORMED_DROPPED.load(Ordering::Relaxed),
        startup_barriers: STARTUP_BARRIERS.load(Ordering::Relaxed),
        archive_evictions: ARCHIVE_EVICTIONS.load(Ordering::Relaxed),
    }
}
