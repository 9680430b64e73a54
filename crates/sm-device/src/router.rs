//! Outbound links: one router per destination device.

use sm_core::{SignalPath, SignalValue};
use sm_session::Update;

use crate::connection::OutboundConnection;

#[derive(Debug, Clone)]
pub struct Router {
    peer: String,
    established: bool,
    connections: Vec<OutboundConnection>,
}

impl Router {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            established: false,
            connections: Vec::new(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn establish(&mut self) {
        self.established = true;
    }

    pub fn connections(&self) -> &[OutboundConnection] {
        &self.connections
    }

    pub fn connection(&self, src: &SignalPath, dst: &SignalPath) -> Option<&OutboundConnection> {
        self.connections
            .iter()
            .find(|c| &c.props().src == src && &c.props().dst == dst)
    }

    pub fn connection_mut(
        &mut self,
        src: &SignalPath,
        dst: &SignalPath,
    ) -> Option<&mut OutboundConnection> {
        self.connections
            .iter_mut()
            .find(|c| &c.props().src == src && &c.props().dst == dst)
    }

    pub fn add(&mut self, connection: OutboundConnection) {
        self.connections.push(connection);
    }

    pub fn remove(&mut self, src: &SignalPath, dst: &SignalPath) -> Option<OutboundConnection> {
        let index = self
            .connections
            .iter()
            .position(|c| &c.props().src == src && &c.props().dst == dst)?;
        Some(self.connections.remove(index))
    }

    /// Drop every connection fed by `signal`.
    pub fn remove_source(&mut self, signal: &str) -> Vec<OutboundConnection> {
        let (removed, kept) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|c| c.props().src.signal == signal);
        self.connections = kept;
        removed
    }

    pub fn into_connections(self) -> Vec<OutboundConnection> {
        self.connections
    }

    /// Transform `value` through every established connection fed by
    /// `signal`.
    pub fn route(&mut self, signal: &str, value: &SignalValue) -> Vec<Update> {
        self.connections
            .iter_mut()
            .filter(|c| c.props().src.signal == signal)
            .filter_map(|c| {
                let mapped = c.transform(value)?;
                Some(Update {
                    signal: c.props().dst.signal.clone(),
                    value: mapped,
                })
            })
            .collect()
    }
}
