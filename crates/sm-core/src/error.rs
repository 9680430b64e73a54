use thiserror::Error;

use crate::timetag::Timetag;

pub type MapperResult<T> = Result<T, MapperError>;

/// Errors surfaced synchronously by device, signal, queue and monitor calls.
///
/// Asynchronous outcomes (link and connection establishment, delivery) have no
/// variant here: they show up as state that never advances while polling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapperError {
    #[error("Device name already registered: {name}")]
    NameConflict { name: String },

    #[error("Invalid signal specification for '{name}': {what}")]
    InvalidSignalSpec { name: String, what: String },

    #[error("Shape mismatch for '{signal}': expected length {expected}, got {actual}")]
    ShapeMismatch {
        signal: String,
        expected: usize,
        actual: usize,
    },

    #[error("Value {value} at index {index} is out of bounds for '{signal}'")]
    OutOfBounds {
        signal: String,
        index: usize,
        value: f64,
    },

    #[error("Unknown device: {name}")]
    UnknownDevice { name: String },

    #[error("Unknown signal: {path}")]
    UnknownSignal { path: String },

    #[error("No link established from '{src}' to '{dst}'")]
    NoLinkEstablished { src: String, dst: String },

    #[error("Queue already open at {open} (requested {requested})")]
    QueueAlreadyOpen { open: Timetag, requested: Timetag },

    #[error("No active queue")]
    NoActiveQueue,

    #[error("Timestamp mismatch: queue opened at {open}, closed with {requested}")]
    TimestampMismatch { open: Timetag, requested: Timetag },

    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = MapperError::NameConflict {
            name: "src".to_string(),
        };
        assert!(format!("{err}").contains("src"));

        let err = MapperError::ShapeMismatch {
            signal: "/outsig".to_string(),
            expected: 2,
            actual: 3,
        };
        let msg = format!("{err}");
        assert!(msg.contains("expected length 2"));
        assert!(msg.contains("got 3"));
    }
}
