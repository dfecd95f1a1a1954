use crate::instructions::{Instruction, RaisingOp};
use crate::values::{Type, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// A maximal straight-line sequence of operations ending in exactly one
/// control transfer. Owned exclusively by the enclosing function and
/// referenced only by its [`BlockId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub params: Vec<BlockParam>,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            params: Vec::new(),
            instructions: Vec::new(),
            terminator: Terminator::Invalid,
        }
    }

    pub fn add_param(&mut self, param: BlockParam) {
        self.params.push(param);
    }

    pub fn add_instruction(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn set_terminator(&mut self, term: Terminator) {
        self.terminator = term;
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, Terminator::Invalid)
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator.successors()
    }
}

/// Block arguments are the sole mechanism for passing values produced in
/// one block to a successor; there is no implicit value visibility across
/// block boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockParam {
    pub name: String,
    pub ty: Type,
}

impl BlockParam {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Jump(BlockId, Vec<Value>),

    Branch {
        condition: Value,
        then_block: BlockId,
        then_args: Vec<Value>,
        else_block: BlockId,
        else_args: Vec<Value>,
    },

    Return(Value),

    /// A potentially-raising operation with two exits. `ok_block` receives
    /// the operation result as its leading block argument, `unwind_block`
    /// the raised exception object.
    Invoke {
        op: RaisingOp,
        ok_block: BlockId,
        unwind_block: BlockId,
    },

    /// Propagate an exception to the caller. Re-raise control flow is an
    /// explicit terminator so the IR's control flow stays enumerable.
    Raise(Value),

    /// Unterminated sentinel; illegal in any finished function.
    Invalid,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target, _) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Invoke {
                ok_block,
                unwind_block,
                ..
            } => vec![*ok_block, *unwind_block],
            Terminator::Return(_) | Terminator::Raise(_) | Terminator::Invalid => vec![],
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Terminator::Return(_))
    }

    pub fn is_raise(&self) -> bool {
        matches!(self, Terminator::Raise(_))
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Terminator::Jump(_, args) => args.iter().collect(),
            Terminator::Branch {
                condition,
                then_args,
                else_args,
                ..
            } => {
                let mut ops = vec![condition];
                ops.extend(then_args.iter());
                ops.extend(else_args.iter());
                ops
            }
            Terminator::Return(value) | Terminator::Raise(value) => vec![value],
            Terminator::Invoke { op, .. } => op.operands(),
            Terminator::Invalid => vec![],
        }
    }
}
