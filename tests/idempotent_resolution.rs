//! Resolving the same message twice against an unchanged store gives the same view.

mod common;

use common::{channel_msg, frame, live_correlator_with, sample_contacts};
use meshtrace::config::Config;
use meshtrace::correlation::{DecodedMessage, Timestamp};
use meshtrace::engine::{EventSink, RouteLookup};

#[test]
fn forward_match_resolves_identically() {
    let correlator = live_correlator_with(Config::default(), sample_contacts());
    let producer = correlator.producer();
    producer.on_raw_frame(frame(10.0, &["8d", "a8"]));
    producer.on_decoded_message(channel_msg(10.2, 2, "Alice", "again"));

    let routes = correlator.routes();
    let msg = routes.messages().pop().unwrap();
    let first = routes.resolve_route(&msg);
    let second = routes.resolve_route(&msg);
    assert_eq!(first, second);
    assert_eq!(first.path_nodes.len(), 2);
}

#[test]
fn archive_and_fallback_resolve_identically() {
    let correlator = live_correlator_with(Config::default(), sample_contacts());
    let producer = correlator.producer();
    producer.on_raw_frame(frame(40.0, &["8d"]));

    let routes = correlator.routes();
    let archived = DecodedMessage::new(Timestamp::from_secs_f64(41.0), 1).with_text(Some(0), "archived");
    assert_eq!(routes.resolve_route(&archived), routes.resolve_route(&archived));

    producer.on_decoded_message(channel_msg(500.0, 1, "Alice", "fallback"));
    let msg = routes.messages().pop().unwrap();
    let a = routes.resolve_route(&msg);
    let b = routes.resolve_route(&msg);
    assert_eq!(a, b);
    assert_eq!(a.path_nodes[0].name, "Tower");
}

#[test]
fn resolution_does_not_change_store_contents() {
    let correlator = live_correlator_with(Config::default(), sample_contacts());
    let producer = correlator.producer();
    producer.on_raw_frame(frame(10.0, &["8d"]));
    producer.on_decoded_message(channel_msg(10.1, 1, "Bob", "stats"));
    let before = correlator.stats();
    let routes = correlator.routes();
    for msg in routes.messages() {
        routes.resolve_route(&msg);
    }
    assert_eq!(correlator.stats(), before);
}
