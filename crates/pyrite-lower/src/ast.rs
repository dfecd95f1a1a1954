//! Syntax-tree types handed over by the external parser.
//!
//! Only the statement and expression shapes this stage lowers are
//! represented. Source positions ride along for diagnostics; lowering
//! itself never consumes them for anything else.

use num_bigint::BigInt;
use pyrite_core::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: SourceSpan,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(BigInt),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(Ident),
    Literal {
        value: Literal,
        span: SourceSpan,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: SourceSpan,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
        span: SourceSpan,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        span: SourceSpan,
    },
    Tuple {
        elements: Vec<Expr>,
        span: SourceSpan,
    },
    /// Assignment expression `target := value`; binds the target and
    /// evaluates to the assigned value.
    Named {
        target: Ident,
        value: Box<Expr>,
        span: SourceSpan,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        target: Ident,
        value: Expr,
    },
    Return {
        value: Option<Expr>,
        span: SourceSpan,
    },
    Raise {
        value: Option<Expr>,
        span: SourceSpan,
    },
    Global {
        names: Vec<Ident>,
        span: SourceSpan,
    },
    Pass {
        span: SourceSpan,
    },
    FuncDef(FuncDef),
    Try(TryStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

/// `try` with its except clauses. A bare `except:` is syntactically last
/// and carried separately as `catch_all`.
#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub catch_all: Option<Vec<Stmt>>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub matcher: Expr,
    pub name: Option<Ident>,
    pub body: Vec<Stmt>,
}
