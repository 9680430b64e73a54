//! Outbound connection: mode resolution and the per-sample transform.
//!
//! Connections live on the source device. Values are converted into the
//! destination's type, length and scale before they are sent, so the
//! destination only stores and reports what arrives.

use sm_config::DefaultsDef;
use sm_core::{
    ConnectOptions, ConnectionProps, MapMode, MapperError, MapperResult, Range, ScalarType,
    SignalPath, SignalValue, Tolerances, nearly_equal,
};
use sm_expr::{Expression, History, Signature};
use tracing::{debug, warn};

use crate::boundary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `Connect` sent, waiting for the destination's acknowledgement.
    Requested,
    Established,
}

/// Source-side description of the signal a connection starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub path: SignalPath,
    pub ty: ScalarType,
    pub length: usize,
    pub min: Option<Vec<f64>>,
    pub max: Option<Vec<f64>>,
}

/// Destination facts learned from `ConnectAck`.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationInfo {
    pub ty: ScalarType,
    pub length: usize,
    pub min: Option<Vec<f64>>,
    pub max: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct OutboundConnection {
    props: ConnectionProps,
    requested_mode: Option<MapMode>,
    state: ConnectionState,
    expression: Option<Expression>,
    input: History,
    output: History,
    calibrating: bool,
}

impl OutboundConnection {
    pub fn new(
        src: SourceInfo,
        dst: SignalPath,
        options: &ConnectOptions,
        defaults: DefaultsDef,
    ) -> Self {
        let mut props = ConnectionProps {
            src: src.path,
            dst,
            src_type: src.ty,
            src_length: src.length,
            // Placeholders until the destination answers.
            dst_type: src.ty,
            dst_length: src.length,
            mode: MapMode::Bypass,
            expression: None,
            range: Range {
                src_min: src.min,
                src_max: src.max,
                ..Range::default()
            },
            bound_min: defaults.bound_min,
            bound_max: defaults.bound_max,
            muted: false,
        };
        props.apply_options(options);
        Self {
            props,
            requested_mode: options.mode,
            state: ConnectionState::Requested,
            expression: None,
            input: History::new(1),
            output: History::new(1),
            calibrating: false,
        }
    }

    pub fn props(&self) -> &ConnectionProps {
        &self.props
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// Complete negotiation with the destination's type, length and range.
    /// Range ends set explicitly by the caller's options win over the
    /// destination's declared bounds.
    pub fn establish(&mut self, dst: DestinationInfo) -> MapperResult<()> {
        self.props.dst_type = dst.ty;
        self.props.dst_length = dst.length;
        if self.props.range.dst_min.is_none() {
            self.props.range.dst_min = dst.min;
        }
        if self.props.range.dst_max.is_none() {
            self.props.range.dst_max = dst.max;
        }
        self.resolve_mode()?;
        self.state = ConnectionState::Established;
        Ok(())
    }

    /// Apply new options. On failure the connection is left as it was.
    pub fn modify(&mut self, options: &ConnectOptions) -> MapperResult<()> {
        let saved = (self.props.clone(), self.requested_mode);
        self.props.apply_options(options);
        if options.mode.is_some() {
            self.requested_mode = options.mode;
        }
        if let Err(e) = self.resolve_mode() {
            (self.props, self.requested_mode) = saved;
            return Err(e);
        }
        Ok(())
    }

    fn resolve_mode(&mut self) -> MapperResult<()> {
        self.calibrating = false;
        match self.requested_mode {
            Some(MapMode::Bypass) => self.set_bypass(),
            Some(MapMode::Linear) if self.props.range.is_known() => self.set_linear(),
            Some(MapMode::Linear) => {
                warn!(src = %self.props.src, dst = %self.props.dst, "linear mode needs a full range; using bypass");
                self.set_bypass();
            }
            Some(MapMode::Expression) => {
                let text = self
                    .props
                    .expression
                    .clone()
                    .unwrap_or_else(|| "y=x".to_string());
                self.set_expression(&text)?;
            }
            Some(MapMode::Calibrate) if self.props.range.dst_known() => {
                self.props.mode = MapMode::Calibrate;
                self.props.expression = None;
                self.expression = None;
            }
            Some(MapMode::Calibrate) => {
                warn!(src = %self.props.src, dst = %self.props.dst, "calibrate mode needs a destination range; using bypass");
                self.set_bypass();
            }
            None if self.props.range.is_known() => self.set_linear(),
            None => self.set_bypass(),
        }
        debug!(src = %self.props.src, dst = %self.props.dst, mode = %self.props.mode, "resolved mode");
        Ok(())
    }

    fn set_bypass(&mut self) {
        self.props.mode = MapMode::Bypass;
        self.expression = None;
        self.input = History::new(1);
        self.output = History::new(1);
    }

    fn set_linear(&mut self) {
        let built = linear_expression(&self.props.range, self.props.src_length, self.props.dst_length)
            .and_then(|text| self.compile(&text).ok().map(|expr| (text, expr)));
        match built {
            Some((text, expr)) => {
                self.props.mode = MapMode::Linear;
                self.props.expression = Some(text);
                self.install(expr);
            }
            None => {
                warn!(src = %self.props.src, dst = %self.props.dst, "cannot build linear scaling; using bypass");
                self.set_bypass();
            }
        }
    }

    fn set_expression(&mut self, text: &str) -> MapperResult<()> {
        let expr = self.compile(text).map_err(|e| MapperError::InvalidExpression {
            expression: text.to_string(),
            reason: e.to_string(),
        })?;
        self.props.mode = MapMode::Expression;
        self.props.expression = Some(text.to_string());
        self.install(expr);
        Ok(())
    }

    fn compile(&self, text: &str) -> sm_expr::ExprResult<Expression> {
        Expression::parse(
            text,
            Signature {
                src_type: self.props.src_type,
                src_length: self.props.src_length,
                dst_type: self.props.dst_type,
                dst_length: self.props.dst_length,
            },
        )
    }

    fn install(&mut self, expr: Expression) {
        (self.input, self.output) = expr.new_histories();
        self.expression = Some(expr);
    }

    /// Map one source sample. `None` means nothing is sent: the connection
    /// is muted or not yet established, a boundary muted the value, or the
    /// expression failed.
    pub fn transform(&mut self, value: &SignalValue) -> Option<SignalValue> {
        if self.props.muted || !self.is_established() {
            return None;
        }
        let x = value.to_f64s();
        let y = match self.props.mode {
            MapMode::Bypass => adapt_length(&x, self.props.dst_length),
            MapMode::Calibrate => {
                self.calibrate(&x);
                self.evaluate(x)?
            }
            MapMode::Linear | MapMode::Expression => self.evaluate(x)?,
        };
        let y = match (&self.props.range.dst_min, &self.props.range.dst_max) {
            (Some(min), Some(max)) => {
                boundary::apply(&y, min, max, self.props.bound_min, self.props.bound_max)?
            }
            _ => y,
        };
        Some(SignalValue::from_f64s(self.props.dst_type, &y))
    }

    fn evaluate(&mut self, x: Vec<f64>) -> Option<Vec<f64>> {
        let expr = self.expression.as_ref()?;
        self.input.push(x);
        match expr.evaluate(&self.input, &mut self.output) {
            Ok(y) => Some(y),
            Err(e) => {
                warn!(src = %self.props.src, dst = %self.props.dst, error = %e, "expression evaluation failed");
                None
            }
        }
    }

    /// First sample sets the source range; later samples widen it. The
    /// linear scaling is rebuilt whenever the range changes.
    fn calibrate(&mut self, x: &[f64]) {
        let changed = if self.calibrating {
            let min = self.props.range.src_min.get_or_insert_with(|| x.to_vec());
            let mut changed = false;
            for (m, &v) in min.iter_mut().zip(x) {
                if v < *m {
                    *m = v;
                    changed = true;
                }
            }
            let max = self.props.range.src_max.get_or_insert_with(|| x.to_vec());
            for (m, &v) in max.iter_mut().zip(x) {
                if v > *m {
                    *m = v;
                    changed = true;
                }
            }
            changed
        } else {
            self.props.range.src_min = Some(x.to_vec());
            self.props.range.src_max = Some(x.to_vec());
            self.calibrating = true;
            true
        };

        if !changed {
            return;
        }
        let built = linear_expression(&self.props.range, self.props.src_length, self.props.dst_length)
            .and_then(|text| self.compile(&text).ok().map(|expr| (text, expr)));
        if let Some((text, expr)) = built {
            debug!(src = %self.props.src, dst = %self.props.dst, expression = %text, "calibrated");
            self.props.expression = Some(text);
            self.install(expr);
        }
    }
}

/// Truncate or zero-pad to `length`.
fn adapt_length(x: &[f64], length: usize) -> Vec<f64> {
    (0..length).map(|i| x.get(i).copied().unwrap_or(0.0)).collect()
}

fn at(values: &[f64], i: usize) -> Option<f64> {
    match values.len() {
        1 => values.first().copied(),
        _ => values.get(i).copied(),
    }
}

/// Expression text mapping the source range onto the destination range.
///
/// A collapsed source range maps everything to the destination minimum;
/// identical ranges map straight through.
pub fn linear_expression(range: &Range, src_length: usize, dst_length: usize) -> Option<String> {
    if src_length != dst_length {
        return None;
    }
    let (smin, smax, dmin, dmax) = (
        range.src_min.as_deref()?,
        range.src_max.as_deref()?,
        range.dst_min.as_deref()?,
        range.dst_max.as_deref()?,
    );

    let tol = Tolerances::default();
    let mut scales = Vec::with_capacity(dst_length);
    let mut offsets = Vec::with_capacity(dst_length);
    for i in 0..dst_length {
        let (s0, s1, d0, d1) = (at(smin, i)?, at(smax, i)?, at(dmin, i)?, at(dmax, i)?);
        let (scale, offset) = if nearly_equal(s0, s1, tol) {
            (0.0, d0)
        } else if nearly_equal(s0, d0, tol) && nearly_equal(s1, d1, tol) {
            (1.0, 0.0)
        } else {
            ((d0 - d1) / (s0 - s1), (d1 * s0 - d0 * s1) / (s0 - s1))
        };
        if !scale.is_finite() || !offset.is_finite() {
            return None;
        }
        // Keep `-0.0` out of the expression text.
        let offset = if offset == 0.0 { 0.0 } else { offset };
        scales.push(scale);
        offsets.push(offset);
    }

    if dst_length == 1 {
        let (scale, offset) = (scales[0], offsets[0]);
        return Some(if scale == 0.0 {
            format!("y={offset:?}")
        } else if scale == 1.0 && offset == 0.0 {
            "y=x".to_string()
        } else {
            format!("y=x*({scale:?})+({offset:?})")
        });
    }
    Some(format!("y=x*{}+{}", vector_literal(&scales), vector_literal(&offsets)))
}

fn vector_literal(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("[{}]", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::BoundaryAction;

    fn source(ty: ScalarType, min: f64, max: f64) -> SourceInfo {
        SourceInfo {
            path: SignalPath::new("src", "out"),
            ty,
            length: 1,
            min: Some(vec![min]),
            max: Some(vec![max]),
        }
    }

    fn dest(ty: ScalarType, min: Option<f64>, max: Option<f64>) -> DestinationInfo {
        DestinationInfo {
            ty,
            length: 1,
            min: min.map(|m| vec![m]),
            max: max.map(|m| vec![m]),
        }
    }

    fn connect(options: ConnectOptions, dst: DestinationInfo) -> OutboundConnection {
        let mut c = OutboundConnection::new(
            source(ScalarType::Int32, 0.0, 1000.0),
            SignalPath::new("dest", "in"),
            &options,
            DefaultsDef::default(),
        );
        c.establish(dst).unwrap();
        c
    }

    fn first_f64(v: Option<SignalValue>) -> f64 {
        v.and_then(|v| v.first()).unwrap()
    }

    #[test]
    fn linear_formula_matches_ranges() {
        let range = Range {
            src_min: Some(vec![0.0]),
            src_max: Some(vec![1000.0]),
            dst_min: Some(vec![0.0]),
            dst_max: Some(vec![1.0]),
        };
        let text = linear_expression(&range, 1, 1).unwrap();
        assert!(text.starts_with("y=x*(0.001)+("), "{text}");
    }

    #[test]
    fn linear_special_cases() {
        let same = Range {
            src_min: Some(vec![0.0]),
            src_max: Some(vec![1.0]),
            dst_min: Some(vec![0.0]),
            dst_max: Some(vec![1.0]),
        };
        assert_eq!(linear_expression(&same, 1, 1).as_deref(), Some("y=x"));
        let collapsed = Range {
            src_min: Some(vec![5.0]),
            src_max: Some(vec![5.0]),
            dst_min: Some(vec![2.0]),
            dst_max: Some(vec![3.0]),
        };
        assert_eq!(linear_expression(&collapsed, 1, 1).as_deref(), Some("y=2.0"));
        assert_eq!(linear_expression(&Range::default(), 1, 1), None);
    }

    #[test]
    fn unspecified_mode_picks_linear_with_full_range() {
        let mut c = connect(
            ConnectOptions::new(),
            dest(ScalarType::Float32, Some(0.0), Some(1.0)),
        );
        assert_eq!(c.props().mode, MapMode::Linear);
        let y = first_f64(c.transform(&SignalValue::from(500)));
        assert!((y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unspecified_mode_without_range_is_bypass() {
        let mut c = connect(ConnectOptions::new(), dest(ScalarType::Float64, None, None));
        assert_eq!(c.props().mode, MapMode::Bypass);
        assert_eq!(
            c.transform(&SignalValue::from(7)),
            Some(SignalValue::Float64(vec![7.0]))
        );
    }

    #[test]
    fn linear_without_range_falls_back_to_bypass() {
        let c = connect(
            ConnectOptions::new().with_mode(MapMode::Linear),
            dest(ScalarType::Float64, None, Some(1.0)),
        );
        assert_eq!(c.props().mode, MapMode::Bypass);
    }

    #[test]
    fn expression_mode_defaults_to_identity() {
        let mut c = connect(
            ConnectOptions::new().with_mode(MapMode::Expression),
            dest(ScalarType::Float64, None, None),
        );
        assert_eq!(c.props().expression.as_deref(), Some("y=x"));
        assert_eq!(first_f64(c.transform(&SignalValue::from(3))), 3.0);
    }

    #[test]
    fn bad_expression_is_rejected() {
        let mut c = OutboundConnection::new(
            source(ScalarType::Int32, 0.0, 1.0),
            SignalPath::new("dest", "in"),
            &ConnectOptions::new()
                .with_mode(MapMode::Expression)
                .with_expression("y=x+"),
            DefaultsDef::default(),
        );
        let err = c.establish(dest(ScalarType::Float64, None, None)).unwrap_err();
        assert!(matches!(err, MapperError::InvalidExpression { .. }));
        assert!(!c.is_established());
    }

    #[test]
    fn failed_modify_keeps_previous_state() {
        let mut c = connect(
            ConnectOptions::new()
                .with_mode(MapMode::Expression)
                .with_expression("y=x*2"),
            dest(ScalarType::Float64, None, None),
        );
        let bad = ConnectOptions::new().with_expression("y=(");
        assert!(c.modify(&bad).is_err());
        assert_eq!(c.props().expression.as_deref(), Some("y=x*2"));
        assert_eq!(first_f64(c.transform(&SignalValue::from(4))), 8.0);
    }

    #[test]
    fn calibrate_tracks_observed_source_range() {
        let mut c = connect(
            ConnectOptions::new().with_mode(MapMode::Calibrate),
            dest(ScalarType::Float64, Some(0.0), Some(1.0)),
        );
        assert_eq!(c.props().mode, MapMode::Calibrate);
        // The first sample collapses the range onto itself.
        assert_eq!(first_f64(c.transform(&SignalValue::from(10))), 0.0);
        let top = first_f64(c.transform(&SignalValue::from(20)));
        assert!((top - 1.0).abs() < 1e-9);
        let mid = first_f64(c.transform(&SignalValue::from(15)));
        assert!((mid - 0.5).abs() < 1e-9);
        assert_eq!(c.props().mode, MapMode::Calibrate);
        assert_eq!(c.props().range.src_min, Some(vec![10.0]));
        assert_eq!(c.props().range.src_max, Some(vec![20.0]));
    }

    #[test]
    fn muted_connection_sends_nothing() {
        let mut c = connect(
            ConnectOptions::new().with_muted(true),
            dest(ScalarType::Float64, None, None),
        );
        assert_eq!(c.transform(&SignalValue::from(1)), None);
    }

    #[test]
    fn boundary_clamps_mapped_value() {
        let mut c = connect(
            ConnectOptions::new()
                .with_mode(MapMode::Expression)
                .with_expression("y=x*2")
                .with_bounds(BoundaryAction::Clamp, BoundaryAction::Clamp),
            dest(ScalarType::Float64, Some(0.0), Some(100.0)),
        );
        assert_eq!(first_f64(c.transform(&SignalValue::from(80))), 100.0);
        assert_eq!(first_f64(c.transform(&SignalValue::from(-5))), 0.0);
    }

    #[test]
    fn bypass_adapts_length() {
        let mut c = OutboundConnection::new(
            SourceInfo {
                path: SignalPath::new("src", "vec"),
                ty: ScalarType::Float64,
                length: 3,
                min: None,
                max: None,
            },
            SignalPath::new("dest", "in"),
            &ConnectOptions::new().with_mode(MapMode::Bypass),
            DefaultsDef::default(),
        );
        c.establish(DestinationInfo {
            ty: ScalarType::Int32,
            length: 2,
            min: None,
            max: None,
        })
        .unwrap();
        assert_eq!(
            c.transform(&SignalValue::Float64(vec![1.7, 2.2, 3.0])),
            Some(SignalValue::Int32(vec![1, 2]))
        );
    }
}
