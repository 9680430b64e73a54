//! Session-wide link table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Directed device pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    pub src: String,
    pub dst: String,
}

impl LinkKey {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn involves(&self, device: &str) -> bool {
        self.src == device || self.dst == device
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Requested,
    Established,
    Removed,
}

/// At most one entry per ordered pair. Removed links are dropped.
#[derive(Debug, Default, Clone)]
pub struct LinkTable {
    links: BTreeMap<LinkKey, LinkState>,
}

impl LinkTable {
    pub fn state(&self, key: &LinkKey) -> Option<LinkState> {
        self.links.get(key).copied()
    }

    pub fn set(&mut self, key: LinkKey, state: LinkState) {
        if state == LinkState::Removed {
            self.links.remove(&key);
        } else {
            self.links.insert(key, state);
        }
    }

    pub fn remove(&mut self, key: &LinkKey) -> Option<LinkState> {
        self.links.remove(key)
    }

    /// Drop every link touching `device`, returning their keys.
    pub fn remove_device(&mut self, device: &str) -> Vec<LinkKey> {
        let keys: Vec<LinkKey> = self
            .links
            .keys()
            .filter(|k| k.involves(device))
            .cloned()
            .collect();
        for key in &keys {
            self.links.remove(key);
        }
        keys
    }

    pub fn snapshot(&self) -> BTreeMap<LinkKey, LinkState> {
        self.links.clone()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
