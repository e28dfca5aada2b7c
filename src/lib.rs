//! # Meshtrace - route correlation for MeshCore companion radios
//!
//! A companion radio reports each received packet twice: once as a raw frame
//! in the RX log, carrying the repeater hashes it travelled through, and once
//! as a decoded message carrying only a hop count. Meshtrace pairs the two by
//! time so every message can be shown with the route it actually took, and
//! refuses to show a route when the pairing is doubtful.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshtrace::config::Config;
//! use meshtrace::session::replay::{load_events, replay};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let events = load_events("capture.jsonl").await?;
//!     for entry in replay(&config, events)?.entries {
//!         println!("{} {}", entry.message.text(), entry.summary);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`correlation`] - ingestion buffer, retention archive, matching tiers, display guard
//! - [`route`] - contact directory and route resolution
//! - [`engine`] - producer / consumer capability handles over the store
//! - [`session`] - device event loop and capture replay
//! - [`config`] - configuration loading and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Device Session  │ ← sole producer, runs the startup barrier
//! └─────────────────┘
//!          │ EventSink
//! ┌─────────────────┐
//! │ Correlation     │ ← buffer, archive, matcher (one lock)
//! │ Store           │
//! └─────────────────┘
//!          │ RouteLookup
//! ┌─────────────────┐
//! │ Route Resolver  │ ← display guard, contact names, out_path fallback
//! └─────────────────┘
//! ```

pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod logutil;
pub mod metrics;
pub mod route;
pub mod session;
