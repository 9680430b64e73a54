//! sm-device: devices, their signals and the outbound connections they feed.
//!
//! Contains:
//! - device (signal registry, polling, queues, protocol handling)
//! - signal (signal declarations, value checks, delivery)
//! - handler (input update callbacks)
//! - connection (per-connection mode, expression state and transform)
//! - boundary (out-of-range actions on transformed values)
//! - router (outbound connections grouped by destination device)
//! - queue (timestamped update batches)

pub mod boundary;
pub mod connection;
pub mod device;
pub mod handler;
pub mod queue;
pub mod router;
pub mod signal;

pub use connection::{OutboundConnection, linear_expression};
pub use device::{Device, RetryPolicy, SignalMut, poll_until};
pub use handler::UpdateHandler;
pub use signal::{Signal, SignalHandle, SignalProps, SignalSpec};
