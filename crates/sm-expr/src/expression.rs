//! Compiled mapping expression and its evaluator.

use sm_core::ScalarType;

use crate::ast::{Assignment, BinaryOp, Node, Slice, UnaryOp, Var};
use crate::error::{ExprError, ExprResult};
use crate::history::History;
use crate::parser::{Parser, Shape};

/// Types and lengths of the two ends an expression connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub src_type: ScalarType,
    pub src_length: usize,
    pub dst_type: ScalarType,
    pub dst_length: usize,
}

impl Signature {
    pub fn scalar(src_type: ScalarType, dst_type: ScalarType) -> Self {
        Self {
            src_type,
            src_length: 1,
            dst_type,
            dst_length: 1,
        }
    }
}

/// A parsed expression ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    signature: Signature,
    assignments: Vec<Assignment>,
    input_history_size: usize,
    output_history_size: usize,
}

impl Expression {
    pub fn parse(source: &str, signature: Signature) -> ExprResult<Self> {
        let parsed = Parser::parse(
            source,
            Shape {
                src_length: signature.src_length,
                dst_length: signature.dst_length,
            },
        )?;
        Ok(Self {
            source: source.to_string(),
            signature,
            assignments: parsed.assignments,
            input_history_size: parsed.input_history_size,
            output_history_size: parsed.output_history_size,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn input_history_size(&self) -> usize {
        self.input_history_size
    }

    pub fn output_history_size(&self) -> usize {
        self.output_history_size
    }

    /// Empty input and output histories sized for this expression.
    pub fn new_histories(&self) -> (History, History) {
        (
            History::new(self.input_history_size),
            History::new(self.output_history_size),
        )
    }

    /// Evaluate once. The current source sample must already be pushed to
    /// `input`; the result is pushed to `output` and returned.
    ///
    /// Initializers (`y{-n} = ...`) run only while `output` is empty.
    pub fn evaluate(&self, input: &History, output: &mut History) -> ExprResult<Vec<f64>> {
        if output.is_empty() {
            for init in self.assignments.iter().filter(|a| a.is_initializer()) {
                let age = (-init.history - 1) as usize;
                let value = self.eval(&init.value, input, output)?;
                let mut sample = output
                    .get(age)
                    .map(<[f64]>::to_vec)
                    .unwrap_or_else(|| vec![0.0; self.signature.dst_length]);
                self.assign(&mut sample, init.slice, &value);
                output.set(age, sample);
            }
        }

        let mut result = vec![0.0; self.signature.dst_length];
        for assignment in self.assignments.iter().filter(|a| !a.is_initializer()) {
            let value = self.eval(&assignment.value, input, output)?;
            self.assign(&mut result, assignment.slice, &value);
        }
        if self.signature.dst_type.is_integer() {
            for v in &mut result {
                *v = v.trunc();
            }
        }

        output.push(result.clone());
        Ok(result)
    }

    fn assign(&self, target: &mut [f64], slice: Option<Slice>, value: &Value) {
        let (start, width) = match slice {
            Some(s) => (s.start, s.width()),
            None => (0, target.len()),
        };
        for (i, slot) in target.iter_mut().skip(start).take(width).enumerate() {
            *slot = value.at(i);
        }
    }

    fn eval(&self, node: &Node, input: &History, output: &History) -> ExprResult<Value> {
        match node {
            Node::Int(v) => Ok(Value::int(vec![*v as f64])),
            Node::Float(v) => Ok(Value::float(vec![*v])),
            Node::Var {
                var,
                slice,
                history,
            } => Ok(self.read_var(*var, *slice, *history, input, output)),
            Node::Vector(items) => {
                let mut data = Vec::new();
                let mut int = true;
                for item in items {
                    let v = self.eval(item, input, output)?;
                    int &= v.int;
                    data.extend(v.data);
                }
                Ok(Value { data, int })
            }
            Node::Unary { op, operand } => {
                let v = self.eval(operand, input, output)?;
                Ok(match op {
                    UnaryOp::Neg => Value {
                        data: v.data.iter().map(|x| -x).collect(),
                        int: v.int,
                    },
                    UnaryOp::Not => Value::int(v.data.iter().map(|x| truth(*x == 0.0)).collect()),
                })
            }
            Node::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs, input, output)?;
                let b = self.eval(rhs, input, output)?;
                binary(*op, &a, &b)
            }
            Node::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let c = self.eval(cond, input, output)?;
                let t = self.eval(then, input, output)?;
                let o = self.eval(otherwise, input, output)?;
                let n = c.len().max(t.len()).max(o.len());
                Ok(Value {
                    data: (0..n)
                        .map(|i| if c.at(i) != 0.0 { t.at(i) } else { o.at(i) })
                        .collect(),
                    int: t.int && o.int,
                })
            }
            Node::Fallback { value, fallback } => {
                let v = self.eval(value, input, output)?;
                let f = self.eval(fallback, input, output)?;
                let n = v.len().max(f.len());
                Ok(Value {
                    data: (0..n)
                        .map(|i| if v.at(i) != 0.0 { v.at(i) } else { f.at(i) })
                        .collect(),
                    int: v.int && f.int,
                })
            }
            Node::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, input, output))
                    .collect::<ExprResult<Vec<_>>>()?;
                let n = args.iter().map(Value::len).max().unwrap_or(1);
                let int = func.preserves_int() && args.iter().all(|a| a.int);
                let data = (0..n)
                    .map(|i| {
                        let row: Vec<f64> = args.iter().map(|a| a.at(i)).collect();
                        func.apply(&row)
                    })
                    .collect();
                Ok(Value { data, int })
            }
            Node::Reduce { func, arg } => {
                let v = self.eval(arg, input, output)?;
                Ok(Value::int(vec![func.apply(&v.data)]))
            }
        }
    }

    fn read_var(
        &self,
        var: Var,
        slice: Option<Slice>,
        history: i64,
        input: &History,
        output: &History,
    ) -> Value {
        let (sample, length, ty) = match var {
            Var::X => (
                input.get((-history) as usize),
                self.signature.src_length,
                self.signature.src_type,
            ),
            Var::Y => (
                output.get((-history - 1) as usize),
                self.signature.dst_length,
                self.signature.dst_type,
            ),
        };
        let full: Vec<f64> = match sample {
            Some(s) => (0..length).map(|i| s.get(i).copied().unwrap_or(0.0)).collect(),
            None => vec![0.0; length],
        };
        let data = match slice {
            Some(s) => full[s.start..=s.end].to_vec(),
            None => full,
        };
        Value {
            data,
            int: ty.is_integer(),
        }
    }
}

/// Intermediate result: a vector with an integer-or-float tag.
#[derive(Debug, Clone, PartialEq)]
struct Value {
    data: Vec<f64>,
    int: bool,
}

impl Value {
    fn int(data: Vec<f64>) -> Self {
        Self { data, int: true }
    }

    fn float(data: Vec<f64>) -> Self {
        Self { data, int: false }
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    /// Element `i`, broadcasting length-1 values.
    fn at(&self, i: usize) -> f64 {
        if self.data.len() == 1 {
            self.data[0]
        } else {
            self.data.get(i).copied().unwrap_or(0.0)
        }
    }
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> ExprResult<Value> {
    let n = a.len().max(b.len());
    let both_int = a.int && b.int;

    let map = |f: &dyn Fn(f64, f64) -> f64| -> Vec<f64> { (0..n).map(|i| f(a.at(i), b.at(i))).collect() };
    let map_int = |f: &dyn Fn(i64, i64) -> ExprResult<i64>| -> ExprResult<Vec<f64>> {
        (0..n)
            .map(|i| f(a.at(i) as i64, b.at(i) as i64).map(|v| v as f64))
            .collect()
    };

    let value = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem if both_int => {
            Value::int(map_int(&|x, y| integer_arith(op, x, y))?)
        }
        BinaryOp::Add => Value::float(map(&|x, y| x + y)),
        BinaryOp::Sub => Value::float(map(&|x, y| x - y)),
        BinaryOp::Mul => Value::float(map(&|x, y| x * y)),
        BinaryOp::Div => Value::float(map(&|x, y| x / y)),
        BinaryOp::Rem => Value::float(map(&|x, y| x % y)),
        BinaryOp::Shl => Value::int(map_int(&|x, y| Ok(x.wrapping_shl((y & 63) as u32)))?),
        BinaryOp::Shr => Value::int(map_int(&|x, y| Ok(x.wrapping_shr((y & 63) as u32)))?),
        BinaryOp::BitAnd => Value::int(map_int(&|x, y| Ok(x & y))?),
        BinaryOp::BitXor => Value::int(map_int(&|x, y| Ok(x ^ y))?),
        BinaryOp::BitOr => Value::int(map_int(&|x, y| Ok(x | y))?),
        BinaryOp::Gt => Value::int(map(&|x, y| truth(x > y))),
        BinaryOp::Ge => Value::int(map(&|x, y| truth(x >= y))),
        BinaryOp::Lt => Value::int(map(&|x, y| truth(x < y))),
        BinaryOp::Le => Value::int(map(&|x, y| truth(x <= y))),
        BinaryOp::Eq => Value::int(map(&|x, y| truth(x == y))),
        BinaryOp::Ne => Value::int(map(&|x, y| truth(x != y))),
        BinaryOp::And => Value::int(map(&|x, y| truth(x != 0.0 && y != 0.0))),
        BinaryOp::Or => Value::int(map(&|x, y| truth(x != 0.0 || y != 0.0))),
    };
    Ok(value)
}

fn integer_arith(op: BinaryOp, x: i64, y: i64) -> ExprResult<i64> {
    match op {
        BinaryOp::Add => Ok(x.wrapping_add(y)),
        BinaryOp::Sub => Ok(x.wrapping_sub(y)),
        BinaryOp::Mul => Ok(x.wrapping_mul(y)),
        BinaryOp::Div | BinaryOp::Rem if y == 0 => Err(ExprError::Eval {
            what: "integer division by zero".to_string(),
        }),
        BinaryOp::Div => Ok(x.wrapping_div(y)),
        BinaryOp::Rem => Ok(x.wrapping_rem(y)),
        _ => Err(ExprError::Eval {
            what: format!("{op:?} is not an arithmetic operator"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(expr: &str, sig: Signature, inputs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let expr = Expression::parse(expr, sig).unwrap();
        let (mut input, mut output) = expr.new_histories();
        inputs
            .iter()
            .map(|x| {
                input.push(x.clone());
                expr.evaluate(&input, &mut output).unwrap()
            })
            .collect()
    }

    fn float_scalar() -> Signature {
        Signature::scalar(ScalarType::Float64, ScalarType::Float64)
    }

    #[test]
    fn linear_scaling() {
        let sig = Signature::scalar(ScalarType::Int32, ScalarType::Float32);
        let out = run("y=x*(0.001)+(0)", sig, &[vec![500.0], vec![1000.0]]);
        assert!((out[0][0] - 0.5).abs() < 1e-12);
        assert!((out[1][0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn integer_division_truncates() {
        let sig = Signature::scalar(ScalarType::Int32, ScalarType::Float64);
        assert_eq!(run("y=x/2", sig, &[vec![7.0]])[0], vec![3.0]);
        assert_eq!(run("y=x/2.0", sig, &[vec![7.0]])[0], vec![3.5]);
    }

    #[test]
    fn integer_division_by_zero_errors() {
        let sig = Signature::scalar(ScalarType::Int32, ScalarType::Int32);
        let expr = Expression::parse("y=x/0", sig).unwrap();
        let (mut input, mut output) = expr.new_histories();
        input.push(vec![3.0]);
        assert!(matches!(
            expr.evaluate(&input, &mut output),
            Err(ExprError::Eval { .. })
        ));
    }

    #[test]
    fn integer_destination_truncates_result() {
        let sig = Signature::scalar(ScalarType::Float64, ScalarType::Int32);
        assert_eq!(run("y=x*1.9", sig, &[vec![1.0]])[0], vec![1.0]);
    }

    #[test]
    fn input_history_reads_past_samples() {
        let out = run(
            "y=x-x{-1}",
            float_scalar(),
            &[vec![1.0], vec![4.0], vec![10.0]],
        );
        assert_eq!(out, vec![vec![1.0], vec![3.0], vec![6.0]]);
    }

    #[test]
    fn accumulator_with_initializer() {
        let out = run(
            "y=y{-1}+x, y{-1}=100",
            float_scalar(),
            &[vec![1.0], vec![2.0], vec![3.0]],
        );
        assert_eq!(out, vec![vec![101.0], vec![103.0], vec![106.0]]);
    }

    #[test]
    fn vector_slices_and_literals() {
        let sig = Signature {
            src_type: ScalarType::Float64,
            src_length: 3,
            dst_type: ScalarType::Float64,
            dst_length: 2,
        };
        let out = run("y=[x[2], x[0]]", sig, &[vec![1.0, 2.0, 3.0]]);
        assert_eq!(out[0], vec![3.0, 1.0]);
        let out = run("y=x[1:2]*10", sig, &[vec![1.0, 2.0, 3.0]]);
        assert_eq!(out[0], vec![20.0, 30.0]);
        let out = run("y[1]=x[0]", sig, &[vec![5.0, 2.0, 3.0]]);
        assert_eq!(out[0], vec![0.0, 5.0]);
    }

    #[test]
    fn conditional_and_fallback() {
        let out = run("y=x>0?x:-x", float_scalar(), &[vec![-2.0], vec![3.0]]);
        assert_eq!(out, vec![vec![2.0], vec![3.0]]);
        let out = run("y=x?:7", float_scalar(), &[vec![0.0], vec![3.0]]);
        assert_eq!(out, vec![vec![7.0], vec![3.0]]);
    }

    #[test]
    fn bitwise_and_logic() {
        let sig = Signature::scalar(ScalarType::Int32, ScalarType::Int32);
        assert_eq!(run("y=(x<<2)|1", sig, &[vec![3.0]])[0], vec![13.0]);
        assert_eq!(run("y=x&6^1", sig, &[vec![7.0]])[0], vec![7.0]);
        assert_eq!(run("y=!x||0", sig, &[vec![0.0]])[0], vec![1.0]);
    }

    #[test]
    fn functions_and_reducers() {
        let out = run("y=max(x, 2)+pi*0", float_scalar(), &[vec![1.0]]);
        assert_eq!(out[0], vec![2.0]);
        let sig = Signature {
            src_type: ScalarType::Float64,
            src_length: 2,
            dst_type: ScalarType::Float64,
            dst_length: 1,
        };
        assert_eq!(run("y=any(x>1)", sig, &[vec![0.0, 3.0]])[0], vec![1.0]);
        assert_eq!(run("y=all(x>1)", sig, &[vec![0.0, 3.0]])[0], vec![0.0]);
    }

    #[test]
    fn missing_history_reads_as_zero() {
        let out = run("y=x{-5}+1", float_scalar(), &[vec![9.0]]);
        assert_eq!(out[0], vec![1.0]);
    }
}
