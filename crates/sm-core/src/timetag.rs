//! NTP-style timestamps and the clocks that produce them.
//!
//! A [`Timetag`] counts seconds since 1900-01-01 plus a 32-bit binary
//! fraction, the layout used by OSC bundles. Clocks are injected into a
//! session so tests can use a deterministic [`LogicalClock`].

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const FRAC_PER_SEC: f64 = 4_294_967_296.0;

/// Timestamp attached to every dispatched update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timetag {
    pub sec: u32,
    pub frac: u32,
}

impl Timetag {
    pub const ZERO: Timetag = Timetag { sec: 0, frac: 0 };

    pub fn new(sec: u32, frac: u32) -> Self {
        Self { sec, frac }
    }

    pub fn from_millis(millis: u64) -> Self {
        let sec = (millis / 1000) as u32;
        let frac = (((millis % 1000) as f64 / 1000.0) * FRAC_PER_SEC) as u32;
        Self { sec, frac }
    }

    /// Seconds since the NTP epoch as a float.
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.frac as f64 / FRAC_PER_SEC
    }
}

impl fmt::Display for Timetag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08x}", self.sec, self.frac)
    }
}

/// Source of timetags for a session.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timetag;
}

/// Wall clock converted to the NTP epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timetag {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let sec = since_unix.as_secs() + NTP_UNIX_OFFSET;
        let frac = (since_unix.subsec_nanos() as f64 / 1e9 * FRAC_PER_SEC) as u32;
        Timetag {
            sec: sec as u32,
            frac,
        }
    }
}

/// Deterministic clock: each call advances by one millisecond.
#[derive(Debug, Default)]
pub struct LogicalClock {
    ticks: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> Timetag {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        Timetag::from_millis(tick)
    }
}

/// Clock selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    #[default]
    System,
    Logical,
}

impl ClockKind {
    pub fn build(self) -> Box<dyn Clock> {
        match self {
            ClockKind::System => Box::new(SystemClock),
            ClockKind::Logical => Box::new(LogicalClock::new()),
        }
    }
}

/// Per-device guard that keeps successive readings non-decreasing even if the
/// underlying clock steps backwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicStamp {
    last: Option<Timetag>,
}

impl MonotonicStamp {
    pub fn observe(&mut self, reading: Timetag) -> Timetag {
        let stamped = match self.last {
            Some(last) if reading < last => last,
            _ => reading,
        };
        self.last = Some(stamped);
        stamped
    }
}
