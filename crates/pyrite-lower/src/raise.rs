//! Conservative raise analysis over a statement suite.
//!
//! Determines whether a protected suite can perform any operation
//! capable of raising. The bias is strict: under-approximating would
//! silently drop required handler scaffolding, so anything not provably
//! safe counts as raising. Name reads count as raising since a missing
//! name traps at run time.

use crate::ast::{Expr, Stmt};

pub fn suite_can_raise(suite: &[Stmt]) -> bool {
    suite.iter().any(stmt_can_raise)
}

fn stmt_can_raise(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Pass { .. } | Stmt::Global { .. } => false,
        Stmt::Expr(expr) => expr_can_raise(expr),
        Stmt::Assign { value, .. } => expr_can_raise(value),
        Stmt::Return { .. }
        | Stmt::Raise { .. }
        | Stmt::FuncDef(_)
        | Stmt::Try(_) => true,
    }
}

fn expr_can_raise(expr: &Expr) -> bool {
    !matches!(expr, Expr::Literal { .. })
}
