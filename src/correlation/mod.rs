//! # Correlation Engine
//!
//! The companion radio reports every packet twice, through two unsynchronized
//! streams:
//!
//! - the **RX log**: raw frames, including relayed copies, each with the chain
//!   of 1-byte repeater hashes it passed through;
//! - the **protocol layer**: decoded messages with only a hop count.
//!
//! There is no shared identifier between the two. This module pairs them up by
//! time, in three tiers tried in order:
//!
//! 1. **forward** - a message arrives and a buffered frame lies within the window;
//! 2. **retroactive** - a frame arrives after a still-unmatched message;
//! 3. **archive** - on demand, when a route is requested, the retention archive
//!    is searched with the same window.
//!
//! Every tier applies the same sanity check ([`MatchPolicy::passes_sanity`]),
//! and a frame is attributed to at most one message: once a forward or
//! retroactive match claims it, no other message can receive it, and the
//! archive tier only offers a frame to the message it lies closest to. The
//! [`DisplayGuard`] vetoes implausible routes once more at render time.
//! A wrong path is worse than no path, so every doubtful case resolves to
//! [`MatchSource::None`].
//!
//! ```text
//!  RX log ──► on_raw_frame ──► Deduplicator ──► RetentionArchive
//!                                   │                 ▲
//!                                   ▼                 │ archive tier
//!                           IngestionBuffer ──► MatchPolicy ◄── on_decoded_message
//!                                                     │
//!                                            MatchResult ──► DisplayGuard ──► route
//! ```

pub mod archive;
pub mod buffer;
pub mod dedup;
pub mod guard;
pub mod matcher;
pub mod model;
pub mod store;

pub use archive::RetentionArchive;
pub use buffer::IngestionBuffer;
pub use dedup::{Admission, DedupKey, Deduplicator};
pub use guard::DisplayGuard;
pub use matcher::MatchPolicy;
pub use model::{
    DecodedMessage, DecodedMessageEvent, FrameSlot, MatchResult, MatchSource, RawFrameEvent,
    RawFrameRecord, SenderRef, Timestamp,
};
pub use store::{CorrelationStore, Phase, StoreStats};
