use crate::block::Terminator;
use crate::builder::FunctionBuilder;
use crate::instructions::RaisingOp;
use crate::values::{Constant, Type, Value};
use crate::IrError;

#[test]
fn straight_line_function() {
    let mut builder = FunctionBuilder::new("f");
    let value = builder.constant(Constant::int(2)).unwrap();
    builder.ret(value).unwrap();

    let function = builder.finish().unwrap();
    assert_eq!(function.body.blocks.len(), 1);
    let entry = &function.body.blocks[&function.entry_block()];
    assert_eq!(entry.instructions.len(), 1);
    assert!(entry.terminator.is_return());
}

#[test]
fn block_params_pass_values_across_blocks() {
    let mut builder = FunctionBuilder::new("f");
    let target = builder.create_block();
    let incoming = builder
        .append_block_param(target, "x", Type::Object)
        .unwrap();

    let value = builder.constant(Constant::None).unwrap();
    builder.jump(target, vec![value]).unwrap();

    builder.switch_to_block(target).unwrap();
    builder.ret(incoming).unwrap();

    let function = builder.finish().unwrap();
    assert_eq!(function.body.blocks.len(), 2);
    assert_eq!(function.body.blocks[&target].params.len(), 1);
}

#[test]
fn emit_after_terminator_is_an_error() {
    let mut builder = FunctionBuilder::new("f");
    let value = builder.constant(Constant::None).unwrap();
    builder.ret(value).unwrap();

    let err = builder.constant(Constant::int(1)).unwrap_err();
    assert!(matches!(err, IrError::NoInsertionPoint));
}

#[test]
fn second_terminator_is_an_error() {
    let mut builder = FunctionBuilder::new("f");
    let entry = builder.entry_block();
    let value = builder.constant(Constant::None).unwrap();
    builder.ret(value.clone()).unwrap();

    builder.switch_to_block(entry).unwrap();
    let err = builder.ret(value).unwrap_err();
    assert!(matches!(err, IrError::BlockTerminated(_)));
}

#[test]
fn every_block_has_exactly_one_trailing_terminator() {
    let mut builder = FunctionBuilder::new("f");
    let then_block = builder.create_block();
    let else_block = builder.create_block();

    let cond = builder.constant(Constant::Bool(true)).unwrap();
    builder
        .branch(cond, then_block, vec![], else_block, vec![])
        .unwrap();

    builder.switch_to_block(then_block).unwrap();
    let one = builder.constant(Constant::int(1)).unwrap();
    builder.ret(one).unwrap();

    builder.switch_to_block(else_block).unwrap();
    let zero = builder.constant(Constant::int(0)).unwrap();
    builder.ret(zero).unwrap();

    let function = builder.finish().unwrap();
    for block in function.body.blocks.values() {
        assert!(block.is_terminated(), "{} lacks a terminator", block.id);
    }
}

#[test]
fn invoke_moves_cursor_to_ok_block() {
    let mut builder = FunctionBuilder::new("f");
    let handler = builder.create_block();
    let exception = builder
        .append_block_param(handler, "exc", Type::Object)
        .unwrap();

    let callee = builder.constant(Constant::None).unwrap();
    let result = builder
        .invoke(
            RaisingOp::Call {
                callee,
                args: vec![],
            },
            handler,
        )
        .unwrap();
    assert!(matches!(result, Value::BlockParam(_)));
    builder.ret(result).unwrap();

    builder.switch_to_block(handler).unwrap();
    builder.raise(exception).unwrap();

    let function = builder.finish().unwrap();
    let entry = &function.body.blocks[&function.entry_block()];
    match &entry.terminator {
        Terminator::Invoke {
            ok_block,
            unwind_block,
            ..
        } => {
            assert_eq!(*unwind_block, handler);
            assert_eq!(function.body.blocks[ok_block].params.len(), 1);
        }
        other => panic!("expected invoke terminator, got {:?}", other),
    }
}

#[test]
fn untouched_blocks_never_enter_the_function() {
    let mut builder = FunctionBuilder::new("f");
    let _unused = builder.create_block();
    let value = builder.constant(Constant::None).unwrap();
    builder.ret(value).unwrap();

    let function = builder.finish().unwrap();
    assert_eq!(function.body.blocks.len(), 1);
}

#[test]
fn predecessor_count_sees_all_terminator_edges() {
    let mut builder = FunctionBuilder::new("f");
    let join = builder.create_block();
    let other = builder.create_block();

    let cond = builder.constant(Constant::Bool(false)).unwrap();
    builder.branch(cond, join, vec![], other, vec![]).unwrap();
    assert_eq!(builder.predecessor_count(join), 1);
    assert_eq!(builder.predecessor_count(other), 1);

    builder.switch_to_block(other).unwrap();
    builder.jump(join, vec![]).unwrap();
    assert_eq!(builder.predecessor_count(join), 2);

    builder.switch_to_block(join).unwrap();
    let value = builder.constant(Constant::None).unwrap();
    builder.ret(value).unwrap();
    builder.finish().unwrap();
}
