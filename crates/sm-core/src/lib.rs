//! sm-core: stable foundation for sigmap.
//!
//! Contains:
//! - ids (compact IDs for monitor records and signal instances)
//! - numeric (tolerances + float helpers)
//! - timetag (NTP-style timestamps and clocks)
//! - value (scalar types, signal values, directions)
//! - mapping (connection modes, boundary actions, ranges, connection properties)
//! - error (shared error taxonomy)

pub mod error;
pub mod ids;
pub mod mapping;
pub mod numeric;
pub mod timetag;
pub mod value;

// Re-exports: nice ergonomics for downstream crates
pub use error::{MapperError, MapperResult};
pub use ids::*;
pub use mapping::*;
pub use numeric::*;
pub use timetag::*;
pub use value::*;
