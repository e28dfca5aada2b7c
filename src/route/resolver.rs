use log::debug;
use serde::Serialize;
use std::sync::Arc;

use super::contacts::{Contact, ContactDirectory, NodeType};
use crate::config::NodeConfig;
use crate::correlation::{DecodedMessage, DisplayGuard, MatchResult, MatchSource};
use crate::logutil::{escape_log, fmt_chain};

/// Where the hops of a route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathSource {
    /// Correlated RX-log frame, with the tier that found it.
    Frame { tier: MatchSource },
    /// The sender contact's last learned route; lower confidence.
    ContactOutPath,
    None,
}

/// One node on a rendered route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteNode {
    pub name: String,
    pub node_type: NodeType,
    pub lat: f64,
    pub lon: f64,
    /// Full public key for the sender, the 1-byte hash for hops.
    pub key: String,
}

impl RouteNode {
    fn from_contact(contact: &Contact, key: &str) -> Self {
        let name = if contact.name.is_empty() {
            format!("0x{}", key)
        } else {
            contact.name.clone()
        };
        Self {
            name,
            node_type: contact.node_type,
            lat: contact.adv_lat,
            lon: contact.adv_lon,
            key: key.to_string(),
        }
    }

    fn unknown(hash: &str) -> Self {
        Self {
            name: "-".to_string(),
            node_type: NodeType::Unknown,
            lat: 0.0,
            lon: 0.0,
            key: hash.to_string(),
        }
    }

    pub fn has_location(&self) -> bool {
        self.lat != 0.0 || self.lon != 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfNode {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl From<&NodeConfig> for SelfNode {
    fn from(cfg: &NodeConfig) -> Self {
        Self {
            name: if cfg.name.is_empty() { "Me".to_string() } else { cfg.name.clone() },
            lat: cfg.adv_lat,
            lon: cfg.adv_lon,
        }
    }
}

/// Everything the presentation layer needs to draw one message's route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteView {
    pub sender: Option<RouteNode>,
    pub self_node: SelfNode,
    pub path_nodes: Vec<RouteNode>,
    /// SNR reported by the protocol layer.
    pub snr: Option<f32>,
    /// SNR of the correlated frame, if any.
    pub frame_snr: Option<f32>,
    pub reported_hops: u32,
    pub has_locations: bool,
    pub path_source: PathSource,
}

impl RouteView {
    /// Reply-text rendering: `path(2); 8D>A8`, `path(2)` without known hops,
    /// `path(0)` for a direct message.
    pub fn path_summary(&self) -> String {
        if self.reported_hops == 0 {
            return "path(0)".to_string();
        }
        let hops: Vec<String> = self
            .path_nodes
            .iter()
            .filter(|n| n.key.len() >= 2)
            .map(|n| n.key.to_ascii_uppercase())
            .collect();
        if hops.is_empty() {
            format!("path({})", self.reported_hops)
        } else {
            format!("path({}); {}", self.reported_hops, hops.join(">"))
        }
    }
}

/// Turns a [`MatchResult`] plus contact data into a [`RouteView`].
///
/// Pure with respect to its inputs: the same match against an unchanged
/// directory always yields the same view.
pub struct RouteResolver {
    directory: Arc<dyn ContactDirectory>,
    guard: DisplayGuard,
    self_node: SelfNode,
}

impl RouteResolver {
    pub fn new(directory: Arc<dyn ContactDirectory>, guard: DisplayGuard, self_node: SelfNode) -> Self {
        Self {
            directory,
            guard,
            self_node,
        }
    }

    pub fn resolve(&self, message: &DecodedMessage, matched: MatchResult) -> RouteView {
        let (sender_key, contact) = self.lookup_sender(message);
        let sender = contact
            .as_ref()
            .map(|c| RouteNode::from_contact(c, sender_key.as_deref().unwrap_or(&c.public_key)));

        let frame_snr = matched.frame_signal_quality;
        let reviewed = self.guard.review(message, matched);

        let (path_nodes, path_source) = if reviewed.is_match() {
            let nodes = self.resolve_hashes(&reviewed.resolved_path);
            (nodes, PathSource::Frame { tier: reviewed.source })
        } else {
            match contact.as_ref().and_then(|c| self.out_path_nodes(c)) {
                Some(nodes) => (nodes, PathSource::ContactOutPath),
                None => (Vec::new(), PathSource::None),
            }
        };

        debug!(
            "route for msg t={} from '{}': source={:?} path={}",
            message.received_at(),
            escape_log(sender.as_ref().map(|s| s.name.as_str()).unwrap_or("?")),
            path_source,
            fmt_chain(&path_nodes.iter().map(|n| n.key.as_str()).collect::<Vec<_>>())
        );

        let has_locations = (self.self_node.lat != 0.0 || self.self_node.lon != 0.0)
            || sender.as_ref().map_or(false, RouteNode::has_location)
            || path_nodes.iter().any(RouteNode::has_location);

        RouteView {
            sender,
            self_node: self.self_node.clone(),
            path_nodes,
            snr: message.signal_quality_reported(),
            frame_snr: if matches!(path_source, PathSource::Frame { .. }) { frame_snr } else { None },
            reported_hops: message.reported_hop_count(),
            has_locations,
            path_source,
        }
    }

    /// Sender by public key prefix, or by name when the message has no key.
    fn lookup_sender(&self, message: &DecodedMessage) -> (Option<String>, Option<Contact>) {
        let sender = message.sender();
        if let Some(prefix) = sender.pubkey_prefix.as_deref().filter(|p| !p.is_empty()) {
            return (Some(prefix.to_string()), self.directory.contact_by_prefix(prefix));
        }
        match sender.name.as_deref() {
            Some(name) => {
                let contact = self.directory.contact_by_name(name);
                let key = contact.as_ref().map(|c| c.public_key.clone());
                (key, contact)
            }
            None => (None, None),
        }
    }

    fn resolve_hashes<S: AsRef<str>>(&self, hashes: &[S]) -> Vec<RouteNode> {
        hashes
            .iter()
            .map(|h| h.as_ref())
            .filter(|h| h.len() >= 2)
            .map(|h| match self.directory.contact_by_hash(h) {
                Some(c) => RouteNode::from_contact(&c, h),
                None => RouteNode::unknown(h),
            })
            .collect()
    }

    fn out_path_nodes(&self, contact: &Contact) -> Option<Vec<RouteNode>> {
        let hashes = parse_out_path(contact.out_path.as_deref()?, contact.out_path_len);
        if hashes.is_empty() {
            return None;
        }
        Some(self.resolve_hashes(&hashes))
    }
}

/// Splits a stored out_path into 1-byte hashes, at most `hops` of them.
pub fn parse_out_path(out_path: &str, hops: u32) -> Vec<String> {
    let bytes = out_path.trim().as_bytes();
    bytes
        .chunks(2)
        .take(hops as usize)
        .filter(|c| c.len() == 2)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}
