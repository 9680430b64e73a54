//! sm-session: the explicit context devices and monitors share.
//!
//! Contains:
//! - session (device/monitor registry, mailboxes, clock, configuration)
//! - link (session-wide link table)
//! - message (protocol messages and monitor notifications)

pub mod link;
pub mod message;
pub mod session;

pub use link::{LinkKey, LinkState, LinkTable};
pub use message::{Bundle, DeviceInfo, Message, Notification, Update};
pub use session::{Endpoint, Session};
