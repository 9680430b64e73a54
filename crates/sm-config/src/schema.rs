//! Session configuration schema.

use serde::{Deserialize, Serialize};
use sm_core::{BoundaryAction, ClockKind, OutOfBoundsPolicy};

pub const LATEST_VERSION: u32 = 1;

/// Settings shared by every device and monitor in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub version: u32,
    #[serde(default)]
    pub clock: ClockKind,
    #[serde(default)]
    pub out_of_bounds: OutOfBoundsPolicy,
    #[serde(default)]
    pub retry: RetryDef,
    #[serde(default)]
    pub defaults: DefaultsDef,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: LATEST_VERSION,
            clock: ClockKind::default(),
            out_of_bounds: OutOfBoundsPolicy::default(),
            retry: RetryDef::default(),
            defaults: DefaultsDef::default(),
        }
    }
}

/// Bounded polling used while waiting for links and connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryDef {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for RetryDef {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

fn default_max_rounds() -> u32 {
    50
}

fn default_poll_timeout_ms() -> u64 {
    100
}

/// Connection defaults applied when `connect` leaves a field unset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultsDef {
    #[serde(default)]
    pub bound_min: BoundaryAction,
    #[serde(default)]
    pub bound_max: BoundaryAction,
}
