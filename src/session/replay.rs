//! Offline replay of captured device events.
//!
//! A capture is a JSON-lines file, one [`DeviceEvent`] per line. Blank lines and
//! lines starting with `#` are skipped.

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::{DeviceEvent, DeviceSession, SessionSummary};
use crate::config::Config;
use crate::correlation::DecodedMessage;
use crate::engine::{Correlator, RouteLookup};
use crate::route::{ContactBook, RouteView};

/// One replayed message with the route the engine resolved for it.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayEntry {
    pub message: DecodedMessage,
    pub summary: String,
    pub route: RouteView,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub session: SessionSummary,
    pub entries: Vec<ReplayEntry>,
}

pub fn parse_events(input: &str) -> Result<Vec<DeviceEvent>> {
    let mut events = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: DeviceEvent =
            serde_json::from_str(line).with_context(|| format!("line {}: invalid device event", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

pub async fn load_events<P: AsRef<Path>>(path: P) -> Result<Vec<DeviceEvent>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading capture {}", path.display()))?;
    parse_events(&content).with_context(|| format!("parsing capture {}", path.display()))
}

/// Feeds `events` through a fresh engine and resolves every stored message.
pub fn replay(config: &Config, events: Vec<DeviceEvent>) -> Result<ReplayReport> {
    let contacts = Arc::new(ContactBook::new());
    let correlator = Correlator::new(config, contacts.clone())?;
    let mut session = DeviceSession::new(correlator.producer(), contacts);
    for event in events {
        if !session.handle(event) {
            break;
        }
    }

    let routes = correlator.routes();
    let entries = routes
        .messages()
        .into_iter()
        .map(|message| {
            let route = routes.resolve_route(&message);
            ReplayEntry {
                summary: route.path_summary(),
                message,
                route,
            }
        })
        .collect::<Vec<_>>();
    info!(
        "replay finished: {} message(s), {} with a route",
        entries.len(),
        entries.iter().filter(|e| !e.route.path_nodes.is_empty()).count()
    );
    Ok(ReplayReport {
        session: session.summary().clone(),
        entries,
    })
}
