//! Parser: precedence-climbing parser for mapping expressions.
//!
//! Consumes tokens from the lexer and produces a list of assignments. The
//! first form is always `y = <expr>`; further comma-separated assignments
//! either target part of the output (`y[1] = ...`) or seed past outputs
//! (`y{-1} = 0`).

use crate::ast::{Assignment, BinaryOp, Node, Slice, UnaryOp, Var};
use crate::error::{ExprError, ExprResult};
use crate::functions::{Function, VectorFunction};
use crate::lexer::{Lexer, Token, TokenKind};

/// Oldest history index accepted for either variable.
pub const MAX_HISTORY: i64 = 100;

/// Vector lengths the expression is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub src_length: usize,
    pub dst_length: usize,
}

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub assignments: Vec<Assignment>,
    /// Samples of `x` needed, including the current one.
    pub input_history_size: usize,
    /// Samples of `y` needed, including the one being produced.
    pub output_history_size: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    shape: Shape,
    oldest_input: i64,
    oldest_output: i64,
}

impl Parser {
    /// Parse expression text against the given vector lengths.
    pub fn parse(input: &str, shape: Shape) -> ExprResult<Parsed> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self {
            tokens,
            pos: 0,
            shape,
            oldest_input: 0,
            oldest_output: 0,
        };
        parser.parse_program()
    }

    fn parse_program(&mut self) -> ExprResult<Parsed> {
        if self.check(&TokenKind::Eof) {
            return Err(self.error("no expression found"));
        }

        let mut assignments = Vec::new();
        loop {
            let assignment = self.parse_assignment()?;
            self.check_assignment_length(&assignment)?;
            assignments.push(assignment);
            if self.check(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(&TokenKind::Eof)?;

        if assignments.iter().all(Assignment::is_initializer) {
            return Err(ExprError::Parse {
                pos: 0,
                what: "expression never assigns the output 'y'".to_string(),
            });
        }

        Ok(Parsed {
            assignments,
            input_history_size: (1 - self.oldest_input) as usize,
            output_history_size: (1 - self.oldest_output) as usize,
        })
    }

    fn parse_assignment(&mut self) -> ExprResult<Assignment> {
        let pos = self.peek().pos;
        match &self.peek().kind {
            TokenKind::Ident(name) if name == "y" => {
                self.advance();
            }
            TokenKind::Ident(name) if name == "x" => {
                return Err(ExprError::Parse {
                    pos,
                    what: "cannot assign to input 'x'".to_string(),
                });
            }
            other => {
                return Err(ExprError::Parse {
                    pos,
                    what: format!("expected 'y' at start of assignment, found '{other}'"),
                });
            }
        }

        let (slice, history) = self.parse_var_suffixes(Var::Y, true)?;
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expr(0)?;
        Ok(Assignment {
            slice,
            history,
            value,
        })
    }

    fn parse_expr(&mut self, min_prec: u8) -> ExprResult<Node> {
        let mut lhs = self.parse_unary()?;

        loop {
            match self.peek().kind {
                TokenKind::Question if min_prec == 0 => {
                    self.advance();
                    let then = self.parse_expr(0)?;
                    self.expect(&TokenKind::Colon)?;
                    let otherwise = self.parse_expr(0)?;
                    lhs = Node::Conditional {
                        cond: Box::new(lhs),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    };
                    continue;
                }
                TokenKind::QuestionColon if min_prec == 0 => {
                    self.advance();
                    let fallback = self.parse_expr(0)?;
                    lhs = Node::Fallback {
                        value: Box::new(lhs),
                        fallback: Box::new(fallback),
                    };
                    continue;
                }
                _ => {}
            }

            let Some(op) = binary_op(&self.peek().kind) else {
                break;
            };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(prec + 1)?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ExprResult<Node> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        // Fold negative literals so `-3` stays a constant.
        Ok(match (op, operand) {
            (UnaryOp::Neg, Node::Int(v)) => Node::Int(-v),
            (UnaryOp::Neg, Node::Float(v)) => Node::Float(-v),
            (op, operand) => Node::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_primary(&mut self) -> ExprResult<Node> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Int(v) => Ok(Node::Int(v)),
            TokenKind::Float(v) => Ok(Node::Float(v)),
            TokenKind::OpenParen => {
                let inner = self.parse_expr(0)?;
                self.expect(&TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::OpenSquare => self.parse_vector_literal(token.pos),
            TokenKind::Ident(name) => self.parse_identifier(&name, token.pos),
            other => Err(ExprError::Parse {
                pos: token.pos,
                what: format!("unexpected '{other}'"),
            }),
        }
    }

    fn parse_identifier(&mut self, name: &str, pos: usize) -> ExprResult<Node> {
        let var = match name {
            "x" => Some(Var::X),
            "y" => Some(Var::Y),
            _ => None,
        };
        if let Some(var) = var {
            let (slice, history) = self.parse_var_suffixes(var, false)?;
            return Ok(Node::Var {
                var,
                slice,
                history,
            });
        }

        if let Some(func) = Function::lookup(name) {
            let args = if func.arity() == 0 && !self.check(&TokenKind::OpenParen) {
                Vec::new()
            } else {
                self.parse_call_args()?
            };
            if args.len() != func.arity() {
                return Err(ExprError::Parse {
                    pos,
                    what: format!(
                        "function '{name}' takes {} argument(s), got {}",
                        func.arity(),
                        args.len()
                    ),
                });
            }
            return Ok(Node::Call { func, args });
        }

        if let Some(func) = VectorFunction::lookup(name) {
            let mut args = self.parse_call_args()?;
            if args.len() != 1 {
                return Err(ExprError::Parse {
                    pos,
                    what: format!("function '{name}' takes 1 argument, got {}", args.len()),
                });
            }
            return Ok(Node::Reduce {
                func,
                arg: Box::new(args.remove(0)),
            });
        }

        Err(ExprError::UnknownName {
            name: name.to_string(),
        })
    }

    fn parse_call_args(&mut self) -> ExprResult<Vec<Node>> {
        self.expect(&TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if self.check(&TokenKind::CloseParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(0)?);
            if self.check(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            self.expect(&TokenKind::CloseParen)?;
            return Ok(args);
        }
    }

    fn parse_vector_literal(&mut self, pos: usize) -> ExprResult<Node> {
        let mut items = Vec::new();
        loop {
            if self.check(&TokenKind::OpenSquare) {
                return Err(ExprError::Parse {
                    pos: self.peek().pos,
                    what: "nested vectors are not allowed".to_string(),
                });
            }
            items.push(self.parse_expr(0)?);
            if self.check(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            self.expect(&TokenKind::CloseSquare)?;
            break;
        }
        if items.is_empty() {
            return Err(ExprError::Parse {
                pos,
                what: "empty vector".to_string(),
            });
        }
        Ok(Node::Vector(items))
    }

    /// Optional `[i]` / `[i:j]` element selection and `{-n}` history index,
    /// in either order.
    fn parse_var_suffixes(
        &mut self,
        var: Var,
        assigning: bool,
    ) -> ExprResult<(Option<Slice>, i64)> {
        let length = match var {
            Var::X => self.shape.src_length,
            Var::Y => self.shape.dst_length,
        };
        let mut slice = None;
        let mut history = None;

        loop {
            if slice.is_none() && self.check(&TokenKind::OpenSquare) {
                self.advance();
                slice = Some(self.parse_slice(length)?);
            } else if history.is_none() && self.check(&TokenKind::OpenCurly) {
                self.advance();
                history = Some(self.parse_history()?);
            } else {
                break;
            }
        }

        let history = history.unwrap_or(0);
        if history < -MAX_HISTORY || history > 0 {
            return Err(ExprError::HistoryOutOfRange { index: history });
        }
        match var {
            Var::X => self.oldest_input = self.oldest_input.min(history),
            Var::Y if !assigning && history == 0 => {
                return Err(ExprError::HistoryOutOfRange { index: history });
            }
            Var::Y => self.oldest_output = self.oldest_output.min(history),
        }
        Ok((slice, history))
    }

    fn parse_slice(&mut self, length: usize) -> ExprResult<Slice> {
        let start = self.expect_index()?;
        let end = if self.check(&TokenKind::Colon) {
            self.advance();
            let end = self.expect_index()?;
            if end <= start {
                return Err(self.error("malformed vector index range"));
            }
            end
        } else {
            start
        };
        self.expect(&TokenKind::CloseSquare)?;
        if end >= length {
            return Err(ExprError::IndexOutOfRange { index: end, length });
        }
        Ok(Slice { start, end })
    }

    fn parse_history(&mut self) -> ExprResult<i64> {
        let negative = if self.check(&TokenKind::Minus) {
            self.advance();
            true
        } else {
            false
        };
        let token = self.advance().clone();
        let TokenKind::Int(value) = token.kind else {
            return Err(ExprError::Parse {
                pos: token.pos,
                what: "non-integer history index".to_string(),
            });
        };
        self.expect(&TokenKind::CloseCurly)?;
        Ok(if negative { -value } else { value })
    }

    fn expect_index(&mut self) -> ExprResult<usize> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Int(v) if v >= 0 => Ok(v as usize),
            _ => Err(ExprError::Parse {
                pos: token.pos,
                what: "non-integer vector index".to_string(),
            }),
        }
    }

    fn check_assignment_length(&self, assignment: &Assignment) -> ExprResult<()> {
        let target = assignment
            .slice
            .map(|s| s.width())
            .unwrap_or(self.shape.dst_length);
        let value = self.length_of(&assignment.value)?;
        if value != 1 && value != target {
            return Err(ExprError::Parse {
                pos: 0,
                what: format!("assigning vector of length {value} to length {target}"),
            });
        }
        Ok(())
    }

    /// Static vector length of a node; operands must match or be scalar.
    fn length_of(&self, node: &Node) -> ExprResult<usize> {
        match node {
            Node::Int(_) | Node::Float(_) => Ok(1),
            Node::Reduce { arg, .. } => self.length_of(arg).map(|_| 1),
            Node::Var { var, slice, .. } => Ok(match (slice, var) {
                (Some(s), _) => s.width(),
                (None, Var::X) => self.shape.src_length,
                (None, Var::Y) => self.shape.dst_length,
            }),
            Node::Vector(items) => items.iter().map(|i| self.length_of(i)).sum(),
            Node::Unary { operand, .. } => self.length_of(operand),
            Node::Binary { lhs, rhs, .. } => {
                broadcast_len(self.length_of(lhs)?, self.length_of(rhs)?)
            }
            Node::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let branches = broadcast_len(self.length_of(then)?, self.length_of(otherwise)?)?;
                broadcast_len(self.length_of(cond)?, branches)
            }
            Node::Fallback { value, fallback } => {
                broadcast_len(self.length_of(value)?, self.length_of(fallback)?)
            }
            Node::Call { args, .. } => args
                .iter()
                .try_fold(1, |acc, a| broadcast_len(acc, self.length_of(a)?)),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        &self.tokens[index]
    }

    fn expect(&mut self, kind: &TokenKind) -> ExprResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            let found = self.peek().kind.clone();
            Err(self.error(&format!("expected '{kind}', found '{found}'")))
        }
    }

    fn error(&self, what: &str) -> ExprError {
        ExprError::Parse {
            pos: self.peek().pos,
            what: what.to_string(),
        }
    }
}

fn broadcast_len(a: usize, b: usize) -> ExprResult<usize> {
    match (a, b) {
        (a, b) if a == b => Ok(a),
        (1, b) => Ok(b),
        (a, 1) => Ok(a),
        (a, b) => Err(ExprError::Parse {
            pos: 0,
            what: format!("vector length mismatch ({a} vs {b})"),
        }),
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::AmpAmp => BinaryOp::And,
        TokenKind::PipePipe => BinaryOp::Or,
        _ => return None,
    })
}
