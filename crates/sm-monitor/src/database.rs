//! The monitor's view of the session, built from notifications.

use std::collections::{BTreeMap, BTreeSet};

use sm_core::{ConnectionProps, SignalPath};
use sm_session::{DeviceInfo, Notification};

#[derive(Debug, Clone, Default)]
pub struct Database {
    devices: BTreeMap<String, DeviceInfo>,
    links: BTreeSet<(String, String)>,
    connections: BTreeMap<(SignalPath, SignalPath), ConnectionProps>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one notification into the database.
    pub fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::DeviceReady(info) => {
                self.devices.insert(info.name.clone(), info);
            }
            Notification::DeviceRemoved { name } => {
                self.devices.remove(&name);
                self.links.retain(|(src, dst)| *src != name && *dst != name);
                self.connections
                    .retain(|(src, dst), _| src.device != name && dst.device != name);
            }
            Notification::LinkEstablished { src, dst } => {
                self.links.insert((src, dst));
            }
            Notification::LinkRemoved { src, dst } => {
                self.connections
                    .retain(|(s, d), _| !(s.device == src && d.device == dst));
                self.links.remove(&(src, dst));
            }
            Notification::Connected(props) | Notification::ConnectionModified(props) => {
                self.connections
                    .insert((props.src.clone(), props.dst.clone()), props);
            }
            Notification::Disconnected { src, dst } => {
                self.connections.remove(&(src, dst));
            }
        }
    }

    pub(crate) fn seed_device(&mut self, name: &str) {
        self.devices
            .entry(name.to_string())
            .or_insert_with(|| DeviceInfo {
                name: name.to_string(),
                outputs: Vec::new(),
                inputs: Vec::new(),
            });
    }

    pub(crate) fn seed_link(&mut self, src: &str, dst: &str) {
        self.links.insert((src.to_string(), dst.to_string()));
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.values()
    }

    pub fn device(&self, name: &str) -> Option<&DeviceInfo> {
        self.devices.get(name)
    }

    pub fn links(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links.iter().map(|(s, d)| (s.as_str(), d.as_str()))
    }

    pub fn has_link(&self, src: &str, dst: &str) -> bool {
        self.links.contains(&(src.to_string(), dst.to_string()))
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionProps> {
        self.connections.values()
    }

    pub fn connection(&self, src: &SignalPath, dst: &SignalPath) -> Option<&ConnectionProps> {
        self.connections.get(&(src.clone(), dst.clone()))
    }
}
