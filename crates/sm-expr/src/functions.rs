//! Built-in functions available to mapping expressions.

use rand::Rng;

/// Scalar functions, applied element-wise to vector arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atan2,
    Atanh,
    Cbrt,
    Ceil,
    Cos,
    Cosh,
    E,
    Exp,
    Exp2,
    Floor,
    Hypot,
    HzToMidi,
    Log,
    Log10,
    Log2,
    Logb,
    Max,
    MidiToHz,
    Min,
    Pi,
    Pow,
    Round,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
    Trunc,
    Uniform,
}

const FUNCTIONS: &[(&str, Function)] = &[
    ("abs", Function::Abs),
    ("acos", Function::Acos),
    ("acosh", Function::Acosh),
    ("asin", Function::Asin),
    ("asinh", Function::Asinh),
    ("atan", Function::Atan),
    ("atan2", Function::Atan2),
    ("atanh", Function::Atanh),
    ("cbrt", Function::Cbrt),
    ("ceil", Function::Ceil),
    ("cos", Function::Cos),
    ("cosh", Function::Cosh),
    ("e", Function::E),
    ("exp", Function::Exp),
    ("exp2", Function::Exp2),
    ("floor", Function::Floor),
    ("hypot", Function::Hypot),
    ("hzToMidi", Function::HzToMidi),
    ("log", Function::Log),
    ("log10", Function::Log10),
    ("log2", Function::Log2),
    ("logb", Function::Logb),
    ("max", Function::Max),
    ("midiToHz", Function::MidiToHz),
    ("min", Function::Min),
    ("pi", Function::Pi),
    ("pow", Function::Pow),
    ("round", Function::Round),
    ("sin", Function::Sin),
    ("sinh", Function::Sinh),
    ("sqrt", Function::Sqrt),
    ("tan", Function::Tan),
    ("tanh", Function::Tanh),
    ("trunc", Function::Trunc),
    ("uniform", Function::Uniform),
];

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        FUNCTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }

    pub fn name(self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, f)| *f == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    pub fn arity(self) -> usize {
        match self {
            Function::E | Function::Pi => 0,
            Function::Atan2 | Function::Hypot | Function::Max | Function::Min | Function::Pow => 2,
            _ => 1,
        }
    }

    /// Integer arguments produce an integer result only for these.
    pub fn preserves_int(self) -> bool {
        matches!(self, Function::Abs | Function::Max | Function::Min)
    }

    /// Apply to already-broadcast arguments (`args.len() == arity`).
    pub fn apply(self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(0.0);
        let b = args.get(1).copied().unwrap_or(0.0);
        match self {
            Function::Abs => a.abs(),
            Function::Acos => a.acos(),
            Function::Acosh => a.acosh(),
            Function::Asin => a.asin(),
            Function::Asinh => a.asinh(),
            Function::Atan => a.atan(),
            Function::Atan2 => a.atan2(b),
            Function::Atanh => a.atanh(),
            Function::Cbrt => a.cbrt(),
            Function::Ceil => a.ceil(),
            Function::Cos => a.cos(),
            Function::Cosh => a.cosh(),
            Function::E => std::f64::consts::E,
            Function::Exp => a.exp(),
            Function::Exp2 => a.exp2(),
            Function::Floor => a.floor(),
            Function::Hypot => a.hypot(b),
            Function::HzToMidi => 69.0 + 12.0 * (a / 440.0).log2(),
            Function::Log => a.ln(),
            Function::Log10 => a.log10(),
            Function::Log2 => a.log2(),
            Function::Logb => logb(a),
            Function::Max => a.max(b),
            Function::MidiToHz => 440.0 * 2.0_f64.powf((a - 69.0) / 12.0),
            Function::Min => a.min(b),
            Function::Pi => std::f64::consts::PI,
            Function::Pow => a.powf(b),
            Function::Round => a.round(),
            Function::Sin => a.sin(),
            Function::Sinh => a.sinh(),
            Function::Sqrt => a.sqrt(),
            Function::Tan => a.tan(),
            Function::Tanh => a.tanh(),
            Function::Trunc => a.trunc(),
            Function::Uniform => rand::thread_rng().r#gen::<f64>() * a,
        }
    }
}

/// Unbiased binary exponent, as C's `logb`.
fn logb(x: f64) -> f64 {
    if x == 0.0 {
        return f64::NEG_INFINITY;
    }
    if !x.is_finite() {
        return x.abs();
    }
    x.abs().log2().floor()
}

/// Reductions from a vector to a single truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFunction {
    All,
    Any,
}

impl VectorFunction {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "all" => Some(VectorFunction::All),
            "any" => Some(VectorFunction::Any),
            _ => None,
        }
    }

    pub fn apply(self, values: &[f64]) -> f64 {
        let truth = match self {
            VectorFunction::All => values.iter().all(|v| *v != 0.0),
            VectorFunction::Any => values.iter().any(|v| *v != 0.0),
        };
        if truth { 1.0 } else { 0.0 }
    }
}
