//! Contact directory used to name the hops of a route.
//!
//! Repeater hashes are the first byte of a node's public key, so with only 256
//! values collisions are possible; lookups return the first match in public
//! key order, which keeps resolution deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Node role as advertised on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NodeType {
    #[default]
    Unknown,
    Companion,
    Repeater,
    RoomServer,
}

impl From<u8> for NodeType {
    fn from(v: u8) -> Self {
        match v {
            1 => NodeType::Companion,
            2 => NodeType::Repeater,
            3 => NodeType::RoomServer,
            _ => NodeType::Unknown,
        }
    }
}

impl From<NodeType> for u8 {
    fn from(t: NodeType) -> u8 {
        match t {
            NodeType::Unknown => 0,
            NodeType::Companion => 1,
            NodeType::Repeater => 2,
            NodeType::RoomServer => 3,
        }
    }
}

impl NodeType {
    /// Short column label used in route tables.
    pub fn short_name(self) -> &'static str {
        match self {
            NodeType::Unknown => "-",
            NodeType::Companion => "CLI",
            NodeType::Repeater => "REP",
            NodeType::RoomServer => "ROOM",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Unknown => "-",
            NodeType::Companion => "Companion",
            NodeType::Repeater => "Repeater",
            NodeType::RoomServer => "Room Server",
        };
        f.write_str(s)
    }
}

/// A contact as retrieved from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub public_key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub adv_lat: f64,
    #[serde(default)]
    pub adv_lon: f64,
    /// Last learned route to this contact: one hex byte per hop.
    #[serde(default)]
    pub out_path: Option<String>,
    #[serde(default)]
    pub out_path_len: u32,
}

impl Contact {
    pub fn new(public_key: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            public_key: public_key.into(),
            name: name.into(),
            node_type,
            adv_lat: 0.0,
            adv_lon: 0.0,
            out_path: None,
            out_path_len: 0,
        }
    }

    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.adv_lat = lat;
        self.adv_lon = lon;
        self
    }

    pub fn with_out_path(mut self, out_path: impl Into<String>, hops: u32) -> Self {
        self.out_path = Some(out_path.into());
        self.out_path_len = hops;
        self
    }

    pub fn has_location(&self) -> bool {
        self.adv_lat != 0.0 || self.adv_lon != 0.0
    }
}

/// Read-only lookups the route resolver needs.
pub trait ContactDirectory: Send + Sync {
    /// First contact whose public key starts with the 1-byte `hash`.
    fn contact_by_hash(&self, hash: &str) -> Option<Contact>;
    /// Contact whose public key starts with `prefix` (a full key also matches).
    fn contact_by_prefix(&self, prefix: &str) -> Option<Contact>;
    /// Contact by advertised name: exact, then case-insensitive, then prefix.
    fn contact_by_name(&self, name: &str) -> Option<Contact>;
}

/// In-memory, thread-safe contact directory keyed by lowercase public key.
#[derive(Debug, Default)]
pub struct ContactBook {
    contacts: RwLock<BTreeMap<String, Contact>>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let book = Self::new();
        book.merge(contacts);
        book
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Contact>> {
        self.contacts.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Contact>> {
        self.contacts.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Adds or updates contacts. Cached contacts missing from `contacts` are
    /// kept so offline nodes stay resolvable. Returns how many were new.
    pub fn merge(&self, contacts: impl IntoIterator<Item = Contact>) -> usize {
        let mut map = self.write();
        let mut added = 0;
        for c in contacts {
            let key = c.public_key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            if map.insert(key, c).is_none() {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl ContactDirectory for ContactBook {
    fn contact_by_hash(&self, hash: &str) -> Option<Contact> {
        self.contact_by_prefix(hash)
    }

    fn contact_by_prefix(&self, prefix: &str) -> Option<Contact> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return None;
        }
        let map = self.read();
        map.range(prefix.clone()..)
            .next()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, c)| c.clone())
            // A full key longer than the stored one: match by the stored key.
            .or_else(|| {
                map.iter()
                    .find(|(k, _)| prefix.starts_with(k.as_str()))
                    .map(|(_, c)| c.clone())
            })
    }

    fn contact_by_name(&self, name: &str) -> Option<Contact> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let map = self.read();
        let lower = name.to_lowercase();
        map.values()
            .find(|c| c.name == name)
            .or_else(|| map.values().find(|c| c.name.to_lowercase() == lower))
            .or_else(|| map.values().find(|c| c.name.to_lowercase().starts_with(&lower)))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> ContactBook {
        ContactBook::from_contacts(vec![
            Contact::new("8DAA11", "Hilltop", NodeType::Repeater).at(52.5, 6.1),
            Contact::new("8D0011", "Church", NodeType::Repeater),
            Contact::new("a8ff00", "Alice Home", NodeType::Companion),
        ])
    }

    #[test]
    fn hash_lookup_returns_first_in_key_order() {
        let b = book();
        assert_eq!(b.contact_by_hash("8D").unwrap().name, "Church");
        assert_eq!(b.contact_by_hash("a8").unwrap().name, "Alice Home");
        assert!(b.contact_by_hash("ff").is_none());
    }

    #[test]
    fn prefix_lookup_accepts_longer_keys() {
        let b = book();
        assert_eq!(b.contact_by_prefix("a8ff").unwrap().name, "Alice Home");
        assert_eq!(b.contact_by_prefix("a8ff00deadbeef").unwrap().name, "Alice Home");
        assert!(b.contact_by_prefix("").is_none());
    }

    #[test]
    fn name_lookup_falls_back_to_case_and_prefix() {
        let b = book();
        assert_eq!(b.contact_by_name("hilltop").unwrap().public_key, "8DAA11");
        assert_eq!(b.contact_by_name("Alice").unwrap().public_key, "a8ff00");
        assert!(b.contact_by_name("Bob").is_none());
    }

    #[test]
    fn merge_keeps_offline_contacts() {
        let b = book();
        let added = b.merge(vec![Contact::new("8daa11", "Hilltop v2", NodeType::Repeater)]);
        assert_eq!(added, 0);
        assert_eq!(b.len(), 3);
        assert_eq!(b.contact_by_hash("8daa").unwrap().name, "Hilltop v2");
    }

    #[test]
    fn node_type_from_wire_value() {
        let c: Contact = serde_json::from_str(r#"{"public_key":"01","name":"R","type":2}"#).unwrap();
        assert_eq!(c.node_type, NodeType::Repeater);
        assert_eq!(c.node_type.short_name(), "REP");
        assert_eq!(NodeType::from(9), NodeType::Unknown);
    }
}
