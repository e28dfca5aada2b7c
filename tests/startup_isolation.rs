//! Frames and messages seen before the startup barrier never produce a route.

mod common;

use std::sync::Arc;

use common::{channel_msg, frame};
use meshtrace::config::Config;
use meshtrace::correlation::Phase;
use meshtrace::engine::{ArchiveControl, Correlator, EventSink, RouteLookup};
use meshtrace::route::{ContactBook, PathSource};

fn fresh() -> Correlator {
    Correlator::new(&Config::default(), Arc::new(ContactBook::new())).unwrap()
}

#[test]
fn pre_barrier_message_stays_unmatched() {
    let correlator = fresh();
    let producer = correlator.producer();
    producer.on_raw_frame(frame(1.0, &["aa"]));
    producer.on_decoded_message(channel_msg(1.2, 1, "Bob", "before ready"));
    assert_eq!(correlator.stats().phase, Phase::Init);

    producer.clear_all();
    // Even a perfectly timed frame after the barrier does not rescue it.
    producer.on_raw_frame(frame(1.3, &["bb"]));

    let routes = correlator.routes();
    let msgs = routes.messages();
    assert_eq!(msgs.len(), 1);
    let view = routes.resolve_route(&msgs[0]);
    assert!(view.path_nodes.is_empty());
    assert_eq!(view.path_source, PathSource::None);
}

#[test]
fn barrier_discards_buffer_and_archive() {
    let correlator = fresh();
    let producer = correlator.producer();
    producer.on_raw_frame(frame(10.0, &["cc"]));
    producer.on_raw_frame(frame(10.1, &["dd"]));
    assert_eq!(correlator.stats().archived_frames, 2);

    producer.clear_all();
    let stats = correlator.stats();
    assert_eq!(stats.phase, Phase::Live);
    assert_eq!(stats.buffered_frames, 0);
    assert_eq!(stats.archived_frames, 0);

    producer.on_decoded_message(channel_msg(10.5, 1, "Bob", "after ready"));
    let routes = correlator.routes();
    let msg = routes.messages().pop().unwrap();
    assert!(routes.resolve_route(&msg).path_nodes.is_empty());
}

#[test]
fn post_barrier_traffic_survives() {
    let correlator = fresh();
    let producer = correlator.producer();
    producer.clear_all();
    producer.on_raw_frame(frame(50.0, &["8d"]));
    producer.on_decoded_message(channel_msg(50.5, 1, "Bob", "live"));

    let routes = correlator.routes();
    let msg = routes.messages().pop().unwrap();
    let view = routes.resolve_route(&msg);
    assert_eq!(view.path_nodes.len(), 1);
    assert_eq!(view.path_nodes[0].key, "8d");

    // Clearing the archive leaves stored forward matches intact.
    correlator.archive_control().clear_archive();
    assert_eq!(routes.resolve_route(&msg), view);
}
