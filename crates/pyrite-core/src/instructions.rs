use crate::function::LocalId;
use crate::values::{SlotId, Value};
use serde::{Deserialize, Serialize};

/// Non-terminator operations. Every result is a fresh temp, so each value
/// has exactly one producing site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Materialize a literal at its point of use.
    Constant {
        result: Value,
        value: crate::values::Constant,
    },

    LoadGlobal {
        result: Value,
        slot: SlotId,
    },
    StoreGlobal {
        slot: SlotId,
        value: Value,
    },

    LoadLocal {
        result: Value,
        local: LocalId,
    },
    StoreLocal {
        local: LocalId,
        value: Value,
    },

    /// Allocate a fresh closure cell.
    MakeCell {
        result: Value,
    },
    CellGet {
        result: Value,
        cell: Value,
    },
    CellSet {
        cell: Value,
        value: Value,
    },

    /// Fetch the runtime type of a value.
    TypeOf {
        result: Value,
        value: Value,
    },
    /// Object identity test.
    Is {
        result: Value,
        left: Value,
        right: Value,
    },
    /// Direct-or-transitive subclass test; resolved at run time.
    IsSubclass {
        result: Value,
        ty: Value,
        of: Value,
    },
    /// Reference to an entry of the builtins namespace, e.g.
    /// `builtins.TypeError`.
    BuiltinRef {
        result: Value,
        name: String,
    },

    MakeTuple {
        result: Value,
        elements: Vec<Value>,
    },
    TupleLen {
        result: Value,
        tuple: Value,
    },
    TupleGet {
        result: Value,
        tuple: Value,
        index: Value,
    },

    /// Plain call; used when no exception handler is active, in which
    /// case a raise unwinds out of the function implicitly. Inside a
    /// protected region the same operation appears as
    /// [`crate::block::Terminator::Invoke`].
    Call {
        result: Value,
        callee: Value,
        args: Vec<Value>,
    },
    GetAttr {
        result: Value,
        object: Value,
        name: String,
    },
    GetItem {
        result: Value,
        object: Value,
        index: Value,
    },

    /// Closure object bound to a registered private function, capturing
    /// the given enclosing cells.
    MakeFunction {
        result: Value,
        function: String,
        captures: Vec<Value>,
    },

    IndexConst {
        result: Value,
        value: u64,
    },
    IndexAdd {
        result: Value,
        left: Value,
        right: Value,
    },
    IndexCmpLess {
        result: Value,
        left: Value,
        right: Value,
    },
}

impl Instruction {
    pub fn result(&self) -> Option<&Value> {
        match self {
            Instruction::Constant { result, .. }
            | Instruction::LoadGlobal { result, .. }
            | Instruction::LoadLocal { result, .. }
            | Instruction::MakeCell { result }
            | Instruction::CellGet { result, .. }
            | Instruction::TypeOf { result, .. }
            | Instruction::Is { result, .. }
            | Instruction::IsSubclass { result, .. }
            | Instruction::BuiltinRef { result, .. }
            | Instruction::MakeTuple { result, .. }
            | Instruction::TupleLen { result, .. }
            | Instruction::TupleGet { result, .. }
            | Instruction::Call { result, .. }
            | Instruction::GetAttr { result, .. }
            | Instruction::GetItem { result, .. }
            | Instruction::MakeFunction { result, .. }
            | Instruction::IndexConst { result, .. }
            | Instruction::IndexAdd { result, .. }
            | Instruction::IndexCmpLess { result, .. } => Some(result),
            Instruction::StoreGlobal { .. }
            | Instruction::StoreLocal { .. }
            | Instruction::CellSet { .. } => None,
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Constant { .. }
            | Instruction::LoadGlobal { .. }
            | Instruction::LoadLocal { .. }
            | Instruction::MakeCell { .. }
            | Instruction::BuiltinRef { .. }
            | Instruction::IndexConst { .. } => vec![],
            Instruction::StoreGlobal { value, .. }
            | Instruction::StoreLocal { value, .. }
            | Instruction::CellGet { cell: value, .. }
            | Instruction::TypeOf { value, .. }
            | Instruction::TupleLen { tuple: value, .. } => vec![value],
            Instruction::CellSet { cell, value } => vec![cell, value],
            Instruction::Is { left, right, .. }
            | Instruction::IndexAdd { left, right, .. }
            | Instruction::IndexCmpLess { left, right, .. } => vec![left, right],
            Instruction::IsSubclass { ty, of, .. } => vec![ty, of],
            Instruction::MakeTuple { elements, .. } => elements.iter().collect(),
            Instruction::TupleGet { tuple, index, .. } => vec![tuple, index],
            Instruction::Call { callee, args, .. } => {
                let mut ops = vec![callee];
                ops.extend(args.iter());
                ops
            }
            Instruction::GetAttr { object, .. } => vec![object],
            Instruction::GetItem { object, index, .. } => vec![object, index],
            Instruction::MakeFunction { captures, .. } => captures.iter().collect(),
        }
    }

    /// True for operations the lowering engine must route through an
    /// exception handler when one is active.
    pub fn can_raise(&self) -> bool {
        matches!(
            self,
            Instruction::Call { .. } | Instruction::GetAttr { .. } | Instruction::GetItem { .. }
        )
    }
}

/// A potentially-raising operation carried by an
/// [`crate::block::Terminator::Invoke`]. The result is delivered as the
/// leading block argument of the ok block; the raised exception as the
/// leading block argument of the unwind block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RaisingOp {
    Call { callee: Value, args: Vec<Value> },
    GetAttr { object: Value, name: String },
    GetItem { object: Value, index: Value },
}

impl RaisingOp {
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            RaisingOp::Call { callee, args } => {
                let mut ops = vec![callee];
                ops.extend(args.iter());
                ops
            }
            RaisingOp::GetAttr { object, .. } => vec![object],
            RaisingOp::GetItem { object, index } => vec![object, index],
        }
    }
}
