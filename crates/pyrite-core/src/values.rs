use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// A dynamically typed language object.
    Object,
    /// An i1 produced by identity and subclass tests.
    Bool,
    /// Tuple-iteration counter.
    Index,
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Object => write!(f, "object"),
            Type::Bool => write!(f, "bool"),
            Type::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Temp(TempId),
    Param(ParamId),
    Capture(CaptureId),
    BlockParam(BlockParamId),
    Constant(Constant),
}

impl Value {
    pub fn as_temp(&self) -> Option<TempId> {
        match self {
            Value::Temp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Value::Constant(c) => Some(c),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Temp(t) => write!(f, "{}", t),
            Value::Param(p) => write!(f, "{}", p),
            Value::Capture(c) => write!(f, "{}", c),
            Value::BlockParam(bp) => write!(f, "{}", bp),
            Value::Constant(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TempId(pub u32);

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub u32);

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockParamId {
    pub block: crate::block::BlockId,
    pub index: u32,
}

impl std::fmt::Display for BlockParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:p{}", self.block, self.index)
    }
}

/// Handle into the module's global slot table. Identity is owned by
/// [`crate::module::Module`]; the same qualified name always yields the
/// same slot for the lifetime of a compile unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u32);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A typed immutable literal, materialized at its point of first need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Int(BigInt),
    Bool(bool),
    Str(String),
    None,
}

impl Constant {
    pub fn int(value: i64) -> Self {
        Constant::Int(BigInt::from(value))
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Constant::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => v.to_i64(),
            _ => None,
        }
    }

    pub fn ty(&self) -> Type {
        Type::Object
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "int<{}>", v),
            Constant::Bool(b) => write!(f, "bool<{}>", b),
            Constant::Str(s) => write!(f, "str<{:?}>", s),
            Constant::None => write!(f, "none"),
        }
    }
}

/// Source position attached to diagnostics. Lowering itself never prints;
/// the external reporter pairs these with error kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub line: u32,
    pub column: u32,
}

impl SourceSpan {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
