//! sm-expr: the mapping expression language.
//!
//! Expressions look like `y=x*(0.001)+(0)` and may read past samples
//! (`x{-1}`, `y{-1}`), index vectors (`x[0]`, `x[1:2]`), call math functions
//! and seed past outputs (`y=y{-1}+x, y{-1}=0`).

pub mod ast;
pub mod error;
pub mod expression;
pub mod functions;
pub mod history;
pub mod lexer;
pub mod parser;

pub use error::{ExprError, ExprResult};
pub use expression::{Expression, Signature};
pub use history::History;
pub use parser::MAX_HISTORY;
