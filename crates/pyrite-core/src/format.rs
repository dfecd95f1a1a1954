use crate::{
    block::{BasicBlock, Terminator},
    function::Function,
    instructions::{Instruction, RaisingOp},
    module::Module,
};
use std::fmt::Write;

pub fn format_module(module: &Module) -> String {
    let mut output = String::new();

    writeln!(&mut output, "; Module: {}", module.name).unwrap();
    for (name, slot) in module.globals() {
        writeln!(&mut output, "global @{} = {}", name, slot).unwrap();
    }
    writeln!(&mut output).unwrap();

    for (_name, function) in module.functions() {
        write!(&mut output, "{}", format_function(function)).unwrap();
        writeln!(&mut output).unwrap();
    }

    output
}

pub fn format_function(function: &Function) -> String {
    let mut output = String::new();

    write!(&mut output, "func private @\"{}\"(", function.name).unwrap();
    for (i, param) in function.params.iter().enumerate() {
        if i > 0 {
            write!(&mut output, ", ").unwrap();
        }
        write!(&mut output, "{}", param.name).unwrap();
    }
    write!(&mut output, ")").unwrap();
    if !function.captures.is_empty() {
        write!(&mut output, " captures [").unwrap();
        for (i, capture) in function.captures.iter().enumerate() {
            if i > 0 {
                write!(&mut output, ", ").unwrap();
            }
            write!(&mut output, "{}", capture.name).unwrap();
        }
        write!(&mut output, "]").unwrap();
    }
    writeln!(&mut output, " {{").unwrap();

    for (_block_id, block) in &function.body.blocks {
        write!(&mut output, "{}", format_block(block)).unwrap();
    }

    writeln!(&mut output, "}}").unwrap();

    output
}

fn format_block(block: &BasicBlock) -> String {
    let mut output = String::new();

    write!(&mut output, "\n{}:", block.id).unwrap();
    if !block.params.is_empty() {
        write!(&mut output, "(").unwrap();
        for (i, param) in block.params.iter().enumerate() {
            if i > 0 {
                write!(&mut output, ", ").unwrap();
            }
            write!(&mut output, "{}: {}", param.name, param.ty).unwrap();
        }
        write!(&mut output, ")").unwrap();
    }
    writeln!(&mut output).unwrap();

    for inst in &block.instructions {
        writeln!(&mut output, "    {}", format_instruction(inst)).unwrap();
    }

    writeln!(&mut output, "    {}", format_terminator(&block.terminator)).unwrap();

    output
}

fn format_instruction(inst: &Instruction) -> String {
    match inst {
        Instruction::Constant { result, value } => format!("{} = constant {}", result, value),
        Instruction::LoadGlobal { result, slot } => format!("{} = load {}", result, slot),
        Instruction::StoreGlobal { slot, value } => format!("store {} into {}", value, slot),
        Instruction::LoadLocal { result, local } => format!("{} = load.local {}", result, local),
        Instruction::StoreLocal { local, value } => {
            format!("store.local {} into {}", value, local)
        }
        Instruction::MakeCell { result } => format!("{} = make_cell", result),
        Instruction::CellGet { result, cell } => format!("{} = cell_get {}", result, cell),
        Instruction::CellSet { cell, value } => format!("cell_set {} into {}", value, cell),
        Instruction::TypeOf { result, value } => format!("{} = type_of {}", result, value),
        Instruction::Is {
            result,
            left,
            right,
        } => format!("{} = is {}, {}", result, left, right),
        Instruction::IsSubclass { result, ty, of } => {
            format!("{} = is_subclass {}, {}", result, ty, of)
        }
        Instruction::BuiltinRef { result, name } => format!("{} = builtin @{}", result, name),
        Instruction::MakeTuple { result, elements } => {
            format!("{} = make_tuple [{}]", result, join(elements))
        }
        Instruction::TupleLen { result, tuple } => format!("{} = tuple_len {}", result, tuple),
        Instruction::TupleGet {
            result,
            tuple,
            index,
        } => format!("{} = tuple_get {}[{}]", result, tuple, index),
        Instruction::Call {
            result,
            callee,
            args,
        } => format!("{} = call {}({})", result, callee, join(args)),
        Instruction::GetAttr {
            result,
            object,
            name,
        } => format!("{} = get_attr {:?} from {}", result, name, object),
        Instruction::GetItem {
            result,
            object,
            index,
        } => format!("{} = get_item {}[{}]", result, object, index),
        Instruction::MakeFunction {
            result,
            function,
            captures,
        } => format!(
            "{} = make_function @\"{}\" [{}]",
            result,
            function,
            join(captures)
        ),
        Instruction::IndexConst { result, value } => format!("{} = index {}", result, value),
        Instruction::IndexAdd {
            result,
            left,
            right,
        } => format!("{} = index_add {}, {}", result, left, right),
        Instruction::IndexCmpLess {
            result,
            left,
            right,
        } => format!("{} = index_lt {}, {}", result, left, right),
    }
}

fn format_terminator(term: &Terminator) -> String {
    match term {
        Terminator::Jump(target, args) => {
            if args.is_empty() {
                format!("br {}", target)
            } else {
                format!("br {}({})", target, join(args))
            }
        }
        Terminator::Branch {
            condition,
            then_block,
            then_args,
            else_block,
            else_args,
        } => format!(
            "cond_br {}, {}({}), {}({})",
            condition,
            then_block,
            join(then_args),
            else_block,
            join(else_args)
        ),
        Terminator::Return(value) => format!("return {}", value),
        Terminator::Invoke {
            op,
            ok_block,
            unwind_block,
        } => format!(
            "invoke {} ok {} unwind {}",
            format_raising_op(op),
            ok_block,
            unwind_block
        ),
        Terminator::Raise(value) => format!("raise {}", value),
        Terminator::Invalid => "<invalid>".to_string(),
    }
}

fn format_raising_op(op: &RaisingOp) -> String {
    match op {
        RaisingOp::Call { callee, args } => format!("call {}({})", callee, join(args)),
        RaisingOp::GetAttr { object, name } => format!("get_attr {:?} from {}", name, object),
        RaisingOp::GetItem { object, index } => format!("get_item {}[{}]", object, index),
    }
}

fn join(values: &[crate::values::Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
