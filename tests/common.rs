//! Test utilities & fixtures.
//! Builds engines and events with terse helpers; times are float seconds.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshtrace::config::Config;
use meshtrace::correlation::{DecodedMessageEvent, RawFrameEvent, SenderRef, Timestamp};
use meshtrace::engine::{Correlator, EventSink};
use meshtrace::route::{Contact, ContactBook, NodeType};

/// Return the path to the static integration test fixture directory.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// Correlator with default settings, already past the startup barrier.
pub fn live_correlator() -> Correlator {
    live_correlator_with(Config::default(), ContactBook::new())
}

pub fn live_correlator_with(config: Config, contacts: ContactBook) -> Correlator {
    let correlator = Correlator::new(&config, Arc::new(contacts)).expect("valid config");
    correlator.producer().clear_all();
    correlator
}

pub fn frame(secs: f64, chain: &[&str]) -> RawFrameEvent {
    RawFrameEvent {
        received_at: Some(Timestamp::from_secs_f64(secs)),
        path_hashes: chain.iter().map(|s| s.to_string()).collect(),
        snr: Some(5.0),
        packet_hash: None,
        payload: None,
    }
}

pub fn frame_with_payload(secs: f64, chain: &[&str], payload: &str) -> RawFrameEvent {
    RawFrameEvent {
        payload: Some(payload.to_string()),
        ..frame(secs, chain)
    }
}

pub fn channel_msg(secs: f64, hops: u32, sender: &str, text: &str) -> DecodedMessageEvent {
    DecodedMessageEvent {
        received_at: Some(Timestamp::from_secs_f64(secs)),
        path_len: hops,
        snr: Some(-3.5),
        message_hash: None,
        sender: SenderRef {
            pubkey_prefix: None,
            name: Some(sender.to_string()),
        },
        channel: Some(0),
        text: text.to_string(),
    }
}

/// Repeaters `8d` (Hilltop) and `a8` (Tower) plus companion Alice.
pub fn sample_contacts() -> ContactBook {
    ContactBook::from_contacts(vec![
        Contact::new("8d11223344", "Hilltop", NodeType::Repeater).at(52.51, 6.09),
        Contact::new("a855667788", "Tower", NodeType::Repeater).at(52.49, 6.14),
        Contact::new("c0ffee0011", "Alice", NodeType::Companion).with_out_path("a8", 1),
    ])
}

pub fn chain(path: &[String]) -> Vec<&str> {
    path.iter().map(|s| s.as_str()).collect()
}
