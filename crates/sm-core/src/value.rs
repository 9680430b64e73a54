//! Scalar types, signal directions and signal values.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, MapperResult};

/// Element type of a signal, tagged `i`, `f` and `d` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int32,
    Float32,
    Float64,
}

impl ScalarType {
    pub fn as_char(self) -> char {
        match self {
            ScalarType::Int32 => 'i',
            ScalarType::Float32 => 'f',
            ScalarType::Float64 => 'd',
        }
    }

    /// Parse a one-letter type tag.
    pub fn from_char(tag: char) -> MapperResult<Self> {
        match tag {
            'i' => Ok(ScalarType::Int32),
            'f' => Ok(ScalarType::Float32),
            'd' => Ok(ScalarType::Float64),
            other => Err(MapperError::InvalidSignalSpec {
                name: String::new(),
                what: format!("unsupported type tag '{other}'"),
            }),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ScalarType::Int32)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for ScalarType {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int32" | "int" => Ok(ScalarType::Int32),
            "float32" | "float" => Ok(ScalarType::Float32),
            "float64" | "double" => Ok(ScalarType::Float64),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(tag), None) => ScalarType::from_char(tag),
                    _ => Err(MapperError::InvalidSignalSpec {
                        name: String::new(),
                        what: format!("unsupported type '{other}'"),
                    }),
                }
            }
        }
    }
}

/// Whether a signal publishes (output) or receives (input) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Output,
    Input,
}

/// How `update` treats elements outside a signal's declared bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfBoundsPolicy {
    /// Fail with `OutOfBounds`.
    #[default]
    Reject,
    /// Limit each element to its bound.
    Clamp,
}

/// A scalar or vector value carried by a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl SignalValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            SignalValue::Int32(_) => ScalarType::Int32,
            SignalValue::Float32(_) => ScalarType::Float32,
            SignalValue::Float64(_) => ScalarType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SignalValue::Int32(v) => v.len(),
            SignalValue::Float32(v) => v.len(),
            SignalValue::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` widened to `f64`.
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            SignalValue::Int32(v) => v.get(index).map(|x| *x as f64),
            SignalValue::Float32(v) => v.get(index).map(|x| *x as f64),
            SignalValue::Float64(v) => v.get(index).copied(),
        }
    }

    /// First element widened to `f64`; convenient for scalar signals.
    pub fn first(&self) -> Option<f64> {
        self.get(0)
    }

    pub fn to_f64s(&self) -> Vec<f64> {
        match self {
            SignalValue::Int32(v) => v.iter().map(|x| *x as f64).collect(),
            SignalValue::Float32(v) => v.iter().map(|x| *x as f64).collect(),
            SignalValue::Float64(v) => v.clone(),
        }
    }

    /// Build a value of type `ty` from doubles. Integer conversion truncates
    /// toward zero and saturates at the `i32` limits.
    pub fn from_f64s(ty: ScalarType, values: &[f64]) -> Self {
        match ty {
            ScalarType::Int32 => SignalValue::Int32(values.iter().map(|x| *x as i32).collect()),
            ScalarType::Float32 => {
                SignalValue::Float32(values.iter().map(|x| *x as f32).collect())
            }
            ScalarType::Float64 => SignalValue::Float64(values.to_vec()),
        }
    }

    /// Convert to another element type.
    pub fn cast(&self, ty: ScalarType) -> Self {
        if self.scalar_type() == ty {
            return self.clone();
        }
        SignalValue::from_f64s(ty, &self.to_f64s())
    }

    /// All-zero value of the given type and length.
    pub fn zeros(ty: ScalarType, length: usize) -> Self {
        SignalValue::from_f64s(ty, &vec![0.0; length])
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items = self.to_f64s();
        if items.len() == 1 {
            return write!(f, "{}", items[0]);
        }
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, "]")
    }
}

impl From<i32> for SignalValue {
    fn from(value: i32) -> Self {
        SignalValue::Int32(vec![value])
    }
}

impl From<f32> for SignalValue {
    fn from(value: f32) -> Self {
        SignalValue::Float32(vec![value])
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Float64(vec![value])
    }
}

impl From<Vec<i32>> for SignalValue {
    fn from(value: Vec<i32>) -> Self {
        SignalValue::Int32(value)
    }
}

impl From<Vec<f32>> for SignalValue {
    fn from(value: Vec<f32>) -> Self {
        SignalValue::Float32(value)
    }
}

impl From<Vec<f64>> for SignalValue {
    fn from(value: Vec<f64>) -> Self {
        SignalValue::Float64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_round_trip() {
        for ty in [ScalarType::Int32, ScalarType::Float32, ScalarType::Float64] {
            assert_eq!(ScalarType::from_char(ty.as_char()).unwrap(), ty);
        }
        assert!(ScalarType::from_char('s').is_err());
    }

    #[test]
    fn type_parses_from_names_and_tags() {
        assert_eq!("f".parse::<ScalarType>().unwrap(), ScalarType::Float32);
        assert_eq!("double".parse::<ScalarType>().unwrap(), ScalarType::Float64);
        assert!("string".parse::<ScalarType>().is_err());
    }

    #[test]
    fn cast_to_int_truncates_toward_zero() {
        let v = SignalValue::Float64(vec![1.9, -1.9]);
        assert_eq!(v.cast(ScalarType::Int32), SignalValue::Int32(vec![1, -1]));
    }

    #[test]
    fn display_scalar_and_vector() {
        assert_eq!(SignalValue::from(3).to_string(), "3");
        assert_eq!(SignalValue::Float64(vec![1.0, 2.5]).to_string(), "[1, 2.5]");
    }

    #[test]
    fn zeros_has_requested_shape() {
        let z = SignalValue::zeros(ScalarType::Float32, 3);
        assert_eq!(z.len(), 3);
        assert_eq!(z.scalar_type(), ScalarType::Float32);
    }
}
