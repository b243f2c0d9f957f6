//! Abstract Syntax Tree for Marmot.

pub mod expr;
pub mod stmt;

pub use expr::{Expr, FunctionLiteral, InfixOp, PrefixOp};
pub use stmt::{BlockStatement, Program, Stmt};
