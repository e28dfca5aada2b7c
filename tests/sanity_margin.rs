//! Every tier refuses frames whose chain is longer than hops + margin.

mod common;

use common::{channel_msg, frame};
use meshtrace::config::CorrelationConfig;
use meshtrace::correlation::{CorrelationStore, MatchSource};

const SEVEN: [&str; 7] = ["01", "02", "03", "04", "05", "06", "07"];
const EIGHT: [&str; 8] = ["01", "02", "03", "04", "05", "06", "07", "08"];

fn live_store() -> CorrelationStore {
    let store = CorrelationStore::new(CorrelationConfig::default());
    store.clear_all();
    store
}

#[test]
fn forward_tier_accepts_up_to_hops_plus_five() {
    let store = live_store();
    store.on_raw_frame(frame(10.1, &SEVEN));
    store.on_decoded_message(channel_msg(10.0, 2, "Bob", "seven"));
    let res = store.match_for(&store.messages()[0]);
    assert_eq!(res.source, MatchSource::Forward);
    assert_eq!(res.resolved_path.len(), 7);
}

#[test]
fn forward_tier_rejects_hops_plus_six() {
    let store = live_store();
    store.on_raw_frame(frame(10.1, &EIGHT));
    store.on_decoded_message(channel_msg(10.0, 2, "Bob", "eight"));
    let res = store.match_for(&store.messages()[0]);
    // The archive holds the same frame and applies the same check.
    assert_eq!(res.source, MatchSource::None);
    assert!(res.resolved_path.is_empty());
}

#[test]
fn invalid_frame_does_not_shadow_a_valid_one() {
    let store = live_store();
    store.on_raw_frame(frame(10.05, &EIGHT));
    store.on_raw_frame(frame(11.0, &["aa", "bb"]));
    store.on_decoded_message(channel_msg(10.0, 2, "Bob", "pick valid"));
    let res = store.match_for(&store.messages()[0]);
    assert_eq!(res.source, MatchSource::Forward);
    assert_eq!(res.resolved_path, vec!["aa".to_string(), "bb".to_string()]);
}

#[test]
fn retroactive_tier_applies_the_same_check() {
    let store = live_store();
    store.on_decoded_message(channel_msg(10.0, 0, "Bob", "direct"));
    store.on_raw_frame(frame(10.2, &["01", "02", "03", "04", "05", "06"]));
    assert_eq!(store.stats().matched_messages, 0);
    store.on_raw_frame(frame(10.3, &["01", "02", "03", "04", "05"]));
    let res = store.match_for(&store.messages()[0]);
    assert_eq!(res.source, MatchSource::Retroactive);
    assert_eq!(res.resolved_path.len(), 5);
}

#[test]
fn margin_is_configurable() {
    let mut cfg = CorrelationConfig::default();
    cfg.path_len_sanity_margin = 0;
    let store = CorrelationStore::new(cfg);
    store.clear_all();
    store.on_raw_frame(frame(10.1, &["aa", "bb"]));
    store.on_decoded_message(channel_msg(10.0, 1, "Bob", "strict"));
    assert_eq!(store.match_for(&store.messages()[0]).source, MatchSource::None);
}
