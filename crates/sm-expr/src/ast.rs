//! Syntax tree of a parsed mapping expression.

use crate::functions::{Function, VectorFunction};

/// Expression variables: `x` is the source sample, `y` the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    X,
    Y,
}

/// Inclusive element range `[start:end]`; `[i]` is `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
}

impl Slice {
    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter. Conditionals sit at 0.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 10,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => 7,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::BitAnd => 5,
            BinaryOp::BitXor => 4,
            BinaryOp::BitOr => 3,
            BinaryOp::And => 2,
            BinaryOp::Or => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Int(i64),
    Float(f64),
    Var {
        var: Var,
        slice: Option<Slice>,
        /// 0 for the current sample, negative for past samples.
        history: i64,
    },
    Vector(Vec<Node>),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// `cond ? then : otherwise`
    Conditional {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    /// `value ?: fallback`
    Fallback {
        value: Box<Node>,
        fallback: Box<Node>,
    },
    Call {
        func: Function,
        args: Vec<Node>,
    },
    Reduce {
        func: VectorFunction,
        arg: Box<Node>,
    },
}

/// One `y... = value` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub slice: Option<Slice>,
    /// 0 assigns the output; negative values seed past outputs once.
    pub history: i64,
    pub value: Node,
}

impl Assignment {
    pub fn is_initializer(&self) -> bool {
        self.history != 0
    }
}
