//! Messages exchanged between devices and monitors.
//!
//! Every protocol step is one message dropped into the recipient's mailbox.
//! The names follow the round trip they belong to: a monitor's `*Request`
//! goes to the source device, the source talks to the destination, and the
//! destination acknowledges back to the source.

use serde::{Deserialize, Serialize};
use sm_core::{ConnectOptions, ConnectionProps, Range, ScalarType, SignalPath, SignalValue, Timetag};

/// One value destined for a signal on the receiving device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Destination signal name, with its leading `/`.
    pub signal: String,
    pub value: SignalValue,
}

/// Updates from one source device sharing a timetag, applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub from: String,
    pub timetag: Timetag,
    pub updates: Vec<Update>,
}

/// Summary of a device published to monitors once it is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub outputs: Vec<String>,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Self-addressed at registration; delivering it makes the device ready.
    Announce,

    LinkRequest { src: String, dst: String },
    Link { src: String, dst: String },
    LinkAck { src: String, dst: String },
    UnlinkRequest { src: String, dst: String },
    Unlink { src: String, dst: String },

    ConnectRequest {
        src: SignalPath,
        dst: SignalPath,
        options: ConnectOptions,
    },
    Connect {
        src: SignalPath,
        dst: SignalPath,
        src_type: ScalarType,
        src_length: usize,
        range: Range,
    },
    ConnectAck {
        src: SignalPath,
        dst: SignalPath,
        dst_type: ScalarType,
        dst_length: usize,
        dst_min: Option<Vec<f64>>,
        dst_max: Option<Vec<f64>>,
    },
    /// Sent back instead of `ConnectAck` when the destination signal is
    /// missing or not an input.
    ConnectNack {
        src: SignalPath,
        dst: SignalPath,
        reason: String,
    },
    ModifyRequest {
        src: SignalPath,
        dst: SignalPath,
        options: ConnectOptions,
    },
    DisconnectRequest { src: SignalPath, dst: SignalPath },
    Disconnect { src: SignalPath, dst: SignalPath },

    /// A peer device left the session.
    PeerRemoved { device: String },

    Bundle(Bundle),

    Notify(Notification),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Announce => "announce",
            Message::LinkRequest { .. } => "link_request",
            Message::Link { .. } => "link",
            Message::LinkAck { .. } => "link_ack",
            Message::UnlinkRequest { .. } => "unlink_request",
            Message::Unlink { .. } => "unlink",
            Message::ConnectRequest { .. } => "connect_request",
            Message::Connect { .. } => "connect",
            Message::ConnectAck { .. } => "connect_ack",
            Message::ConnectNack { .. } => "connect_nack",
            Message::ModifyRequest { .. } => "modify_request",
            Message::DisconnectRequest { .. } => "disconnect_request",
            Message::Disconnect { .. } => "disconnect",
            Message::PeerRemoved { .. } => "peer_removed",
            Message::Bundle(_) => "bundle",
            Message::Notify(_) => "notify",
        }
    }
}

/// State changes reported to every monitor in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    DeviceReady(DeviceInfo),
    DeviceRemoved { name: String },
    LinkEstablished { src: String, dst: String },
    LinkRemoved { src: String, dst: String },
    Connected(ConnectionProps),
    ConnectionModified(ConnectionProps),
    Disconnected { src: SignalPath, dst: SignalPath },
}
