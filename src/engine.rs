//! Capability handles over the correlation store.
//!
//! The producer (device session) and the consumers (presentation loop, route
//! pages, debug tooling) never see the store itself. Each side gets a small
//! cloneable handle exposing only its own operations:
//!
//! - [`ProducerHandle`] implements [`EventSink`]: frame/message hooks and the startup barrier;
//! - [`RouteHandle`] implements [`RouteLookup`]: message snapshot and `resolve_route`;
//! - [`ArchiveHandle`] implements [`ArchiveControl`]: `clear_archive` only.
//!
//! ```rust
//! use std::sync::Arc;
//! use meshtrace::config::Config;
//! use meshtrace::engine::{Correlator, EventSink, RouteLookup};
//! use meshtrace::correlation::{DecodedMessageEvent, RawFrameEvent, Timestamp};
//! use meshtrace::route::ContactBook;
//!
//! let correlator = Correlator::new(&Config::default(), Arc::new(ContactBook::new())).unwrap();
//! let producer = correlator.producer();
//! producer.clear_all();
//! producer.on_raw_frame(RawFrameEvent {
//!     received_at: Some(Timestamp::from_secs_f64(9.9)),
//!     path_hashes: vec!["8d".into()],
//!     ..Default::default()
//! });
//! producer.on_decoded_message(DecodedMessageEvent {
//!     received_at: Some(Timestamp::from_secs_f64(10.0)),
//!     path_len: 1,
//!     text: "hello".into(),
//!     ..Default::default()
//! });
//!
//! let routes = correlator.routes();
//! let msg = routes.messages().pop().unwrap();
//! assert_eq!(routes.resolve_route(&msg).path_summary(), "path(1); 8D");
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::correlation::{
    CorrelationStore, DecodedMessage, DecodedMessageEvent, DisplayGuard, RawFrameEvent, StoreStats,
};
use crate::error::ConfigError;
use crate::route::{ContactDirectory, RouteResolver, RouteView, SelfNode};

/// Producer-side operations. Never blocks on I/O and never fails: bad input is
/// logged and dropped inside the store.
pub trait EventSink: Send + Sync {
    fn on_raw_frame(&self, event: RawFrameEvent);
    fn on_decoded_message(&self, event: DecodedMessageEvent);
    /// Startup barrier, called once after the device session is initialised.
    fn clear_all(&self);
}

/// Consumer-side, read-only operations.
pub trait RouteLookup: Send + Sync {
    fn messages(&self) -> Vec<DecodedMessage>;
    /// Synchronous and idempotent for an unchanged store.
    fn resolve_route(&self, message: &DecodedMessage) -> RouteView;
}

/// The one mutation a consumer may trigger.
pub trait ArchiveControl: Send + Sync {
    fn clear_archive(&self);
}

/// Owns the store and the resolver and hands out capability handles.
pub struct Correlator {
    store: Arc<CorrelationStore>,
    resolver: Arc<RouteResolver>,
}

impl Correlator {
    pub fn new(config: &Config, directory: Arc<dyn ContactDirectory>) -> Result<Self, ConfigError> {
        config.validate()?;
        let guard = DisplayGuard::new(config.correlation.display_guard_factor);
        let resolver = RouteResolver::new(directory, guard, SelfNode::from(&config.node));
        Ok(Self {
            store: Arc::new(CorrelationStore::new(config.correlation.clone())),
            resolver: Arc::new(resolver),
        })
    }

    pub fn producer(&self) -> ProducerHandle {
        ProducerHandle {
            store: Arc::clone(&self.store),
        }
    }

    pub fn routes(&self) -> RouteHandle {
        RouteHandle {
            store: Arc::clone(&self.store),
            resolver: Arc::clone(&self.resolver),
        }
    }

    pub fn archive_control(&self) -> ArchiveHandle {
        ArchiveHandle {
            store: Arc::clone(&self.store),
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

#[derive(Clone)]
pub struct ProducerHandle {
    store: Arc<CorrelationStore>,
}

impl EventSink for ProducerHandle {
    fn on_raw_frame(&self, event: RawFrameEvent) {
        self.store.on_raw_frame(event);
    }

    fn on_decoded_message(&self, event: DecodedMessageEvent) {
        self.store.on_decoded_message(event);
    }

    fn clear_all(&self) {
        self.store.clear_all();
    }
}

#[derive(Clone)]
pub struct RouteHandle {
    store: Arc<CorrelationStore>,
    resolver: Arc<RouteResolver>,
}

impl RouteLookup for RouteHandle {
    fn messages(&self) -> Vec<DecodedMessage> {
        self.store.messages()
    }

    fn resolve_route(&self, message: &DecodedMessage) -> RouteView {
        // The store lock is released before contact lookups start.
        let matched = self.store.match_for(message);
        self.resolver.resolve(message, matched)
    }
}

#[derive(Clone)]
pub struct ArchiveHandle {
    store: Arc<CorrelationStore>,
}

impl ArchiveControl for ArchiveHandle {
    fn clear_archive(&self) {
        self.store.clear_archive();
    }
}
