//! Connection properties shared by devices, monitors and the wire protocol.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::ScalarType;

/// Fully qualified signal name: owning device plus signal name.
///
/// Signal names always carry a leading `/`, so the display form is
/// `/device/signal`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalPath {
    pub device: String,
    pub signal: String,
}

impl SignalPath {
    pub fn new(device: impl Into<String>, signal: impl AsRef<str>) -> Self {
        Self {
            device: device.into(),
            signal: normalize_signal_name(signal.as_ref()),
        }
    }
}

impl fmt::Display for SignalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}{}", self.device, self.signal)
    }
}

/// Prefix a signal name with `/` unless it already has one.
pub fn normalize_signal_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// Transform applied by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapMode {
    /// Copy with type conversion only.
    #[default]
    Bypass,
    /// Scale the source range onto the destination range.
    Linear,
    /// Evaluate a user expression.
    Expression,
    /// Learn the source range from incoming samples, then scale linearly.
    Calibrate,
}

impl MapMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MapMode::Bypass => "bypass",
            MapMode::Linear => "linear",
            MapMode::Expression => "expression",
            MapMode::Calibrate => "calibrate",
        }
    }
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bypass" => Ok(MapMode::Bypass),
            "linear" => Ok(MapMode::Linear),
            "expression" => Ok(MapMode::Expression),
            "calibrate" => Ok(MapMode::Calibrate),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// What happens when a mapped value falls outside the destination range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryAction {
    /// Leave the value unchanged.
    #[default]
    None,
    /// Drop the update.
    Mute,
    /// Limit the value to the bound.
    Clamp,
    /// Reflect the value back into range at the bound.
    Fold,
    /// Wrap the value around to the opposite bound.
    Wrap,
}

impl BoundaryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryAction::None => "none",
            BoundaryAction::Mute => "mute",
            BoundaryAction::Clamp => "clamp",
            BoundaryAction::Fold => "fold",
            BoundaryAction::Wrap => "wrap",
        }
    }
}

impl fmt::Display for BoundaryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BoundaryAction::None),
            "mute" => Ok(BoundaryAction::Mute),
            "clamp" => Ok(BoundaryAction::Clamp),
            "fold" => Ok(BoundaryAction::Fold),
            "wrap" => Ok(BoundaryAction::Wrap),
            other => Err(format!("unknown boundary action '{other}'")),
        }
    }
}

/// Source and destination ranges of a connection, one entry per element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_min: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_max: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_min: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_max: Option<Vec<f64>>,
}

impl Range {
    /// All four ends are known.
    pub fn is_known(&self) -> bool {
        self.src_known() && self.dst_known()
    }

    pub fn src_known(&self) -> bool {
        self.src_min.is_some() && self.src_max.is_some()
    }

    pub fn dst_known(&self) -> bool {
        self.dst_min.is_some() && self.dst_max.is_some()
    }

    /// Fill every end that `other` specifies.
    pub fn merge_from(&mut self, other: &Range) {
        if other.src_min.is_some() {
            self.src_min = other.src_min.clone();
        }
        if other.src_max.is_some() {
            self.src_max = other.src_max.clone();
        }
        if other.dst_min.is_some() {
            self.dst_min = other.dst_min.clone();
        }
        if other.dst_max.is_some() {
            self.dst_max = other.dst_max.clone();
        }
    }
}

/// Caller-supplied options for `connect` and `modify`.
///
/// Every field is optional; unset fields keep the connection's current value
/// or the value derived during negotiation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MapMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_min: Option<BoundaryAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_max: Option<BoundaryAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: MapMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_src_range(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.range.src_min = Some(min);
        self.range.src_max = Some(max);
        self
    }

    pub fn with_dst_range(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.range.dst_min = Some(min);
        self.range.dst_max = Some(max);
        self
    }

    pub fn with_bounds(mut self, min: BoundaryAction, max: BoundaryAction) -> Self {
        self.bound_min = Some(min);
        self.bound_max = Some(max);
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = Some(muted);
        self
    }
}

/// Negotiated state of one connection, as held by the source device and
/// reported to monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProps {
    pub src: SignalPath,
    pub dst: SignalPath,
    pub src_type: ScalarType,
    pub src_length: usize,
    pub dst_type: ScalarType,
    pub dst_length: usize,
    pub mode: MapMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub range: Range,
    #[serde(default)]
    pub bound_min: BoundaryAction,
    #[serde(default)]
    pub bound_max: BoundaryAction,
    #[serde(default)]
    pub muted: bool,
}

impl ConnectionProps {
    /// Apply the explicitly set fields of `options`, except the mode, which
    /// the owner resolves once the range is known.
    pub fn apply_options(&mut self, options: &ConnectOptions) {
        self.range.merge_from(&options.range);
        if let Some(expression) = &options.expression {
            self.expression = Some(expression.clone());
        }
        if let Some(bound) = options.bound_min {
            self.bound_min = bound;
        }
        if let Some(bound) = options.bound_max {
            self.bound_max = bound;
        }
        if let Some(muted) = options.muted {
            self.muted = muted;
        }
    }
}
