//! sm-monitor: session-wide coordination of links and connections.
//!
//! Contains:
//! - monitor (requests links/connections, drains notifications)
//! - database (what the monitor has observed)

pub mod database;
pub mod monitor;

pub use database::Database;
pub use monitor::Monitor;
