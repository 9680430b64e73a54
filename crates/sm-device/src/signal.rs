//! Signals: typed, optionally bounded vector values owned by a device.

use std::fmt;

use sm_core::{
    Direction, InstanceId, MapperError, MapperResult, OutOfBoundsPolicy, ScalarType, SignalValue,
    Timetag, normalize_signal_name,
};

use crate::handler::UpdateHandler;

/// Declaration used by `add_output` / `add_input`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub name: String,
    pub length: usize,
    pub ty: ScalarType,
    pub unit: Option<String>,
    pub min: Option<Vec<f64>>,
    pub max: Option<Vec<f64>>,
}

impl SignalSpec {
    pub fn new(name: impl AsRef<str>, length: usize, ty: ScalarType) -> Self {
        Self {
            name: normalize_signal_name(name.as_ref()),
            length,
            ty,
            unit: None,
            min: None,
            max: None,
        }
    }

    /// Scalar signal.
    pub fn scalar(name: impl AsRef<str>, ty: ScalarType) -> Self {
        Self::new(name, 1, ty)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_min(mut self, min: Vec<f64>) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: Vec<f64>) -> Self {
        self.max = Some(max);
        self
    }

    /// Same bounds for every element.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(vec![min; self.length]);
        self.max = Some(vec![max; self.length]);
        self
    }

    fn invalid(&self, what: impl Into<String>) -> MapperError {
        MapperError::InvalidSignalSpec {
            name: self.name.clone(),
            what: what.into(),
        }
    }

    pub fn validate(&self) -> MapperResult<()> {
        if self.name.len() <= 1 {
            return Err(self.invalid("empty name"));
        }
        if self.length == 0 {
            return Err(self.invalid("length must be at least 1"));
        }
        for (label, bound) in [("min", &self.min), ("max", &self.max)] {
            let Some(bound) = bound else { continue };
            if bound.len() != self.length {
                return Err(self.invalid(format!(
                    "{label} has {} elements, signal has {}",
                    bound.len(),
                    self.length
                )));
            }
        }
        Ok(())
    }
}

/// Inspectable description of a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalProps {
    pub name: String,
    pub direction: Direction,
    pub length: usize,
    pub ty: ScalarType,
    pub unit: Option<String>,
    pub min: Option<Vec<f64>>,
    pub max: Option<Vec<f64>>,
}

impl SignalProps {
    pub(crate) fn from_spec(spec: SignalSpec, direction: Direction) -> Self {
        Self {
            name: spec.name,
            direction,
            length: spec.length,
            ty: spec.ty,
            unit: spec.unit,
            min: spec.min,
            max: spec.max,
        }
    }
}

/// Stable reference to a signal on its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalHandle(pub(crate) u32);

pub struct Signal {
    pub(crate) handle: SignalHandle,
    pub(crate) props: SignalProps,
    pub(crate) value: Option<SignalValue>,
    pub(crate) timetag: Option<Timetag>,
    pub(crate) handler: Option<Box<dyn UpdateHandler>>,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handle", &self.handle)
            .field("props", &self.props)
            .field("value", &self.value)
            .field("timetag", &self.timetag)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl Signal {
    pub(crate) fn new(
        handle: SignalHandle,
        props: SignalProps,
        handler: Option<Box<dyn UpdateHandler>>,
    ) -> Self {
        Self {
            handle,
            props,
            value: None,
            timetag: None,
            handler,
        }
    }

    pub fn handle(&self) -> SignalHandle {
        self.handle
    }

    pub fn props(&self) -> &SignalProps {
        &self.props
    }

    pub fn name(&self) -> &str {
        &self.props.name
    }

    pub fn is_output(&self) -> bool {
        self.props.direction == Direction::Output
    }

    /// Current value, `None` until the first update or delivery.
    pub fn value(&self) -> Option<&SignalValue> {
        self.value.as_ref()
    }

    pub fn timetag(&self) -> Option<Timetag> {
        self.timetag
    }

    /// Convert `value` to this signal's type and check its length and
    /// bounds. Int conversion truncates toward zero. A NaN element of a
    /// bounded signal is out of bounds under either policy.
    pub fn check_value(
        &self,
        value: &SignalValue,
        policy: OutOfBoundsPolicy,
    ) -> MapperResult<SignalValue> {
        if value.len() != self.props.length {
            return Err(MapperError::ShapeMismatch {
                signal: self.props.name.clone(),
                expected: self.props.length,
                actual: value.len(),
            });
        }
        let cast = value.cast(self.props.ty);
        if self.props.min.is_none() && self.props.max.is_none() {
            return Ok(cast);
        }

        let mut elements = cast.to_f64s();
        let mut clamped = false;
        for (index, v) in elements.iter_mut().enumerate() {
            let lo = self.props.min.as_ref().and_then(|m| m.get(index)).copied();
            let hi = self.props.max.as_ref().and_then(|m| m.get(index)).copied();
            let limit = match (lo, hi) {
                (None, None) => continue,
                // NaN lies outside every range and has no bound to clamp to.
                _ if v.is_nan() => None,
                (Some(lo), _) if *v < lo => Some(lo),
                (_, Some(hi)) if *v > hi => Some(hi),
                _ => continue,
            };
            match (policy, limit) {
                (OutOfBoundsPolicy::Clamp, Some(limit)) => {
                    *v = limit;
                    clamped = true;
                }
                _ => {
                    return Err(MapperError::OutOfBounds {
                        signal: self.props.name.clone(),
                        index,
                        value: *v,
                    });
                }
            }
        }
        if clamped {
            Ok(SignalValue::from_f64s(self.props.ty, &elements))
        } else {
            Ok(cast)
        }
    }

    pub(crate) fn store(&mut self, value: SignalValue, timetag: Timetag) {
        self.value = Some(value);
        self.timetag = Some(timetag);
    }

    /// Store a delivered value and hand it to the handler, if any.
    pub(crate) fn deliver(&mut self, value: SignalValue, timetag: Timetag) {
        let Signal {
            props,
            handler,
            value: current,
            timetag: stamp,
            ..
        } = self;
        *stamp = Some(timetag);
        let value = current.insert(value);
        if let Some(handler) = handler.as_mut() {
            handler.on_update(props, InstanceId(0), value, timetag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_int() -> Signal {
        let spec = SignalSpec::scalar("out", ScalarType::Int32).with_range(0.0, 1000.0);
        Signal::new(
            SignalHandle(0),
            SignalProps::from_spec(spec, Direction::Output),
            None,
        )
    }

    #[test]
    fn spec_normalizes_name() {
        let spec = SignalSpec::scalar("outsig1", ScalarType::Float32);
        assert_eq!(spec.name, "/outsig1");
        spec.validate().unwrap();
    }

    #[test]
    fn spec_validation_rejects_bad_shapes() {
        assert!(SignalSpec::new("x", 0, ScalarType::Int32).validate().is_err());
        assert!(SignalSpec::new("", 1, ScalarType::Int32).validate().is_err());
        let spec = SignalSpec::new("v", 2, ScalarType::Float64).with_min(vec![0.0]);
        assert!(matches!(
            spec.validate(),
            Err(MapperError::InvalidSignalSpec { .. })
        ));
    }

    #[test]
    fn bounds_are_inclusive() {
        let signal = bounded_int();
        let reject = OutOfBoundsPolicy::Reject;
        assert!(signal.check_value(&SignalValue::from(0), reject).is_ok());
        assert!(signal.check_value(&SignalValue::from(1000), reject).is_ok());
        assert!(matches!(
            signal.check_value(&SignalValue::from(1001), reject),
            Err(MapperError::OutOfBounds { index: 0, .. })
        ));
        assert!(signal.check_value(&SignalValue::from(-1), reject).is_err());
    }

    #[test]
    fn nan_is_out_of_bounds_under_both_policies() {
        let spec = SignalSpec::scalar("x", ScalarType::Float64).with_range(0.0, 1.0);
        let signal = Signal::new(
            SignalHandle(0),
            SignalProps::from_spec(spec, Direction::Output),
            None,
        );
        for policy in [OutOfBoundsPolicy::Reject, OutOfBoundsPolicy::Clamp] {
            let err = signal
                .check_value(&SignalValue::from(f64::NAN), policy)
                .unwrap_err();
            assert!(matches!(err, MapperError::OutOfBounds { index: 0, .. }));
        }
        let unbounded = Signal::new(
            SignalHandle(1),
            SignalProps::from_spec(
                SignalSpec::scalar("free", ScalarType::Float64),
                Direction::Output,
            ),
            None,
        );
        assert!(
            unbounded
                .check_value(&SignalValue::from(f64::NAN), OutOfBoundsPolicy::Reject)
                .is_ok()
        );
    }

    #[test]
    fn clamp_policy_limits_value() {
        let signal = bounded_int();
        let out = signal
            .check_value(&SignalValue::from(1500), OutOfBoundsPolicy::Clamp)
            .unwrap();
        assert_eq!(out, SignalValue::Int32(vec![1000]));
    }

    #[test]
    fn value_is_cast_before_checking() {
        let signal = bounded_int();
        // 1000.7 truncates to 1000, which is in range.
        let out = signal
            .check_value(&SignalValue::from(1000.7), OutOfBoundsPolicy::Reject)
            .unwrap();
        assert_eq!(out, SignalValue::Int32(vec![1000]));
    }

    #[test]
    fn shape_mismatch_reports_lengths() {
        let signal = bounded_int();
        let err = signal
            .check_value(&SignalValue::Int32(vec![1, 2]), OutOfBoundsPolicy::Reject)
            .unwrap_err();
        assert_eq!(
            err,
            MapperError::ShapeMismatch {
                signal: "/out".to_string(),
                expected: 1,
                actual: 2,
            }
        );
    }

    #[test]
    fn deliver_calls_handler_with_props() {
        use std::sync::{Arc, Mutex};
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let spec = SignalSpec::scalar("in", ScalarType::Float32);
        let mut signal = Signal::new(
            SignalHandle(1),
            SignalProps::from_spec(spec, Direction::Input),
            Some(Box::new(
                move |props: &SignalProps, _: InstanceId, v: &SignalValue, t: Timetag| {
                    sink.lock().unwrap().push((props.name.clone(), v.clone(), t));
                },
            )),
        );
        signal.deliver(SignalValue::Float32(vec![0.5]), Timetag::new(1, 2));
        assert_eq!(signal.value(), Some(&SignalValue::Float32(vec![0.5])));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[(
                "/in".to_string(),
                SignalValue::Float32(vec![0.5]),
                Timetag::new(1, 2)
            )]
        );
    }
}
