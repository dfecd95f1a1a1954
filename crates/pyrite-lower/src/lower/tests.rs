use super::lower_module;
use crate::ast::{Expr, ExceptHandler, FuncDef, Ident, Literal, Stmt, TryStmt};
use crate::errors::LowerError;
use pretty_assertions::assert_eq;
use pyrite_core::values::CaptureId;
use pyrite_core::{BlockId, Constant, Function, Instruction, Module, RaisingOp, Terminator, Value};

fn sp() -> pyrite_core::SourceSpan {
    pyrite_core::SourceSpan::default()
}

fn ident(name: &str) -> Ident {
    Ident::new(name, sp())
}

fn name(n: &str) -> Expr {
    Expr::Name(ident(n))
}

fn int(value: i64) -> Expr {
    Expr::Literal {
        value: Literal::Int(value.into()),
        span: sp(),
    }
}

fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
        span: sp(),
    }
}

fn assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: ident(target),
        value,
    }
}

fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return { value, span: sp() }
}

fn pass() -> Stmt {
    Stmt::Pass { span: sp() }
}

fn global(names: &[&str]) -> Stmt {
    Stmt::Global {
        names: names.iter().map(|n| ident(n)).collect(),
        span: sp(),
    }
}

fn def_stmt(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::FuncDef(FuncDef {
        name: ident(name),
        params: params.iter().map(|p| ident(p)).collect(),
        body,
        span: sp(),
    })
}

fn try_stmt(
    body: Vec<Stmt>,
    handlers: Vec<ExceptHandler>,
    catch_all: Option<Vec<Stmt>>,
) -> Stmt {
    Stmt::Try(TryStmt {
        body,
        handlers,
        catch_all,
        span: sp(),
    })
}

fn clause(matcher: Expr, name: Option<&str>, body: Vec<Stmt>) -> ExceptHandler {
    ExceptHandler {
        matcher,
        name: name.map(ident),
        body,
    }
}

fn lowered(body: Vec<Stmt>) -> Module {
    lower_module("m", &body).unwrap()
}

fn init(module: &Module) -> &Function {
    module.get_function("m.__init__").unwrap()
}

fn function<'m>(module: &'m Module, name: &str) -> &'m Function {
    module
        .get_function(name)
        .unwrap_or_else(|| panic!("function {} not registered", name))
}

fn all_instructions(function: &Function) -> Vec<&Instruction> {
    function
        .body
        .blocks
        .values()
        .flat_map(|block| block.instructions.iter())
        .collect()
}

fn invoke_unwind(function: &Function) -> Option<BlockId> {
    function.body.blocks.values().find_map(|block| match &block.terminator {
        Terminator::Invoke { unwind_block, .. } => Some(*unwind_block),
        _ => None,
    })
}

fn returned_constants(function: &Function) -> Vec<Constant> {
    let mut constants = Vec::new();
    for block in function.body.blocks.values() {
        if let Terminator::Return(Value::Temp(returned)) = &block.terminator {
            for b in function.body.blocks.values() {
                for inst in &b.instructions {
                    if let Instruction::Constant { result: Value::Temp(t), value } = inst {
                        if t == returned {
                            constants.push(value.clone());
                        }
                    }
                }
            }
        }
    }
    constants
}

#[test]
fn module_assignment_and_read_share_one_slot() {
    let module = lowered(vec![assign("x", int(2)), expr_stmt(name("x"))]);
    let slot = module.slot("m.x").unwrap();

    let instructions = all_instructions(init(&module));
    let stored = instructions.iter().find_map(|inst| match inst {
        Instruction::StoreGlobal { slot, .. } => Some(*slot),
        _ => None,
    });
    let loaded = instructions.iter().find_map(|inst| match inst {
        Instruction::LoadGlobal { slot, .. } => Some(*slot),
        _ => None,
    });
    assert_eq!(stored, Some(slot));
    assert_eq!(loaded, Some(slot));
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::Constant { value: Constant::Int(v), .. } if *v == 2.into())));
}

#[test]
fn global_declaration_targets_the_module_slot() {
    let module = lowered(vec![
        def_stmt("foo", &[], vec![global(&["y"]), assign("y", int(3))]),
        expr_stmt(name("y")),
    ]);
    let slot = module.slot("m.y").unwrap();

    let foo = function(&module, "m.foo$impl[0]");
    let stores: Vec<_> = all_instructions(foo)
        .into_iter()
        .filter_map(|inst| match inst {
            Instruction::StoreGlobal { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(stores, vec![slot]);
    assert!(all_instructions(foo)
        .iter()
        .all(|inst| !matches!(inst, Instruction::StoreLocal { .. })));

    let loads: Vec<_> = all_instructions(init(&module))
        .into_iter()
        .filter_map(|inst| match inst {
            Instruction::LoadGlobal { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec![slot]);
}

#[test]
fn assignment_expression_yields_the_assigned_value() {
    let module = lowered(vec![assign(
        "w",
        Expr::Named {
            target: ident("z"),
            value: Box::new(int(3)),
            span: sp(),
        },
    )]);
    let z = module.slot("m.z").unwrap();
    let w = module.slot("m.w").unwrap();

    let instructions = all_instructions(init(&module));
    let constant = instructions.iter().find_map(|inst| match inst {
        Instruction::Constant { result, value: Constant::Int(v) } if *v == 3.into() => {
            Some(result.clone())
        }
        _ => None,
    });
    let constant = constant.expect("constant 3 materialized");

    let mut stores = instructions.iter().filter_map(|inst| match inst {
        Instruction::StoreGlobal { slot, value } => Some((*slot, value.clone())),
        _ => None,
    });
    assert_eq!(stores.next(), Some((z, constant.clone())));
    assert_eq!(stores.next(), Some((w, constant)));
}

#[test]
fn unraising_try_drops_the_whole_apparatus() {
    let module = lowered(vec![def_stmt(
        "f",
        &[],
        vec![try_stmt(
            vec![pass()],
            vec![clause(int(0), None, vec![pass()])],
            None,
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");
    assert_eq!(f.body.blocks.len(), 1);
    let entry = &f.body.blocks[&f.entry_block()];
    assert_eq!(entry.instructions.len(), 1);
    assert!(matches!(
        entry.instructions[0],
        Instruction::Constant { value: Constant::None, .. }
    ));
    assert!(entry.terminator.is_return());
}

#[test]
fn handler_without_predecessors_is_discarded() {
    // The suite counts as raising for the analysis, but lowers to a plain
    // global load, so nothing ever targets the handler.
    let module = lowered(vec![try_stmt(
        vec![expr_stmt(name("x"))],
        vec![clause(name("TypeError"), None, vec![pass()])],
        None,
    )]);
    let f = init(&module);
    assert!(invoke_unwind(f).is_none());
    assert!(f.body.blocks.values().all(|block| block.params.is_empty()));
    assert!(all_instructions(f)
        .iter()
        .all(|inst| !matches!(inst, Instruction::IsSubclass { .. })));
}

#[test]
fn protected_call_dispatches_through_the_matcher_chain() {
    let module = lowered(vec![def_stmt(
        "f",
        &["param"],
        vec![try_stmt(
            vec![expr_stmt(call(name("param"), vec![]))],
            vec![clause(name("TypeError"), None, vec![ret(Some(int(1)))])],
            Some(vec![ret(Some(int(0)))]),
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");

    let handler = invoke_unwind(f).expect("protected call lowers to an invoke");
    assert_eq!(f.body.blocks[&handler].params.len(), 1);
    match &f.body.blocks[&f.entry_block()].terminator {
        Terminator::Invoke { op: RaisingOp::Call { .. }, .. } => {}
        other => panic!("expected protected call in the entry block, got {:?}", other),
    }

    // Matcher chain: tuple discriminator, validity check, subclass test.
    let instructions = all_instructions(f);
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::BuiltinRef { name, .. } if name == "TypeError")));
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::BuiltinRef { name, .. } if name == "tuple")));
    assert!(instructions.iter().any(|inst| matches!(inst, Instruction::Is { .. })));
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::IsSubclass { .. })));

    let returned = returned_constants(f);
    assert!(returned.contains(&Constant::int(1)));
    assert!(returned.contains(&Constant::int(0)));
    assert!(returned.contains(&Constant::None));
}

#[test]
fn clause_matchers_evaluate_in_source_order() {
    let module = lowered(vec![def_stmt(
        "f",
        &["param"],
        vec![try_stmt(
            vec![expr_stmt(call(name("param"), vec![]))],
            vec![
                clause(name("Exception"), None, vec![ret(Some(int(1)))]),
                clause(name("TypeError"), None, vec![ret(Some(int(2)))]),
            ],
            None,
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");

    let handler = invoke_unwind(f).expect("protected call lowers to an invoke");
    match &f.body.blocks[&handler].instructions[0] {
        Instruction::BuiltinRef { name, .. } => assert_eq!(name, "Exception"),
        other => panic!("expected the first matcher first, got {:?}", other),
    }
}

#[test]
fn tuple_matchers_get_validation_and_scan_loops() {
    let module = lowered(vec![def_stmt(
        "f",
        &["param"],
        vec![try_stmt(
            vec![expr_stmt(call(name("param"), vec![]))],
            vec![clause(
                Expr::Tuple {
                    elements: vec![name("TypeError"), name("ValueError")],
                    span: sp(),
                },
                None,
                vec![ret(Some(int(1)))],
            )],
            None,
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");

    let instructions = all_instructions(f);
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::MakeTuple { elements, .. } if elements.len() == 2)));
    assert!(instructions.iter().any(|inst| matches!(inst, Instruction::TupleLen { .. })));
    assert!(instructions.iter().any(|inst| matches!(inst, Instruction::TupleGet { .. })));
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::IndexCmpLess { .. })));
    assert!(instructions.iter().any(|inst| matches!(inst, Instruction::IndexAdd { .. })));

    // Scan loop shape: exhausting the tuple falls through to the
    // re-raise, a subclass hit branches straight to the clause suite,
    // and a miss loops back through the condition block.
    let handler = invoke_unwind(f).expect("protected call lowers to an invoke");
    let reraise = f
        .body
        .blocks
        .values()
        .find_map(|block| match &block.terminator {
            Terminator::Raise(Value::BlockParam(bp)) if bp.block == handler => Some(block.id),
            _ => None,
        })
        .expect("unmatched exception must re-raise");
    let (scan_cond, scan_body) = f
        .body
        .blocks
        .values()
        .find_map(|block| match &block.terminator {
            Terminator::Branch { then_block, else_block, .. }
                if *else_block == reraise
                    && block
                        .instructions
                        .iter()
                        .any(|inst| matches!(inst, Instruction::IndexCmpLess { .. })) =>
            {
                Some((block.id, *then_block))
            }
            _ => None,
        })
        .expect("scan condition must exit to the re-raise path");

    let body_block = &f.body.blocks[&scan_body];
    assert!(body_block
        .instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::TupleGet { .. })));
    let (hit, miss) = match &body_block.terminator {
        Terminator::Branch { then_block, else_block, .. } => (*then_block, *else_block),
        other => panic!("scan body must branch on the subclass test, got {:?}", other),
    };
    let suite = &f.body.blocks[&hit];
    assert!(suite.instructions.iter().any(|inst| matches!(
        inst,
        Instruction::Constant { value: Constant::Int(v), .. } if *v == 1.into()
    )));
    assert!(suite.terminator.is_return());
    assert!(matches!(
        &f.body.blocks[&miss].terminator,
        Terminator::Jump(target, args) if *target == scan_cond && args.len() == 1
    ));
}

#[test]
fn unmatched_exception_propagates_out_of_the_function() {
    let module = lowered(vec![def_stmt(
        "f",
        &["param"],
        vec![try_stmt(
            vec![expr_stmt(call(name("param"), vec![]))],
            vec![clause(name("TypeError"), None, vec![ret(Some(int(1)))])],
            None,
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");
    let handler = invoke_unwind(f).expect("protected call lowers to an invoke");
    let reraised = f.body.blocks.values().any(|block| matches!(
        &block.terminator,
        Terminator::Raise(Value::BlockParam(bp)) if bp.block == handler
    ));
    assert!(reraised, "no-match path must re-raise the original exception");
}

#[test]
fn inner_reraise_chains_to_the_enclosing_handler() {
    let inner = try_stmt(
        vec![expr_stmt(call(name("param"), vec![]))],
        vec![clause(name("ValueError"), None, vec![ret(Some(int(1)))])],
        None,
    );
    let module = lowered(vec![def_stmt(
        "f",
        &["param"],
        vec![try_stmt(
            vec![inner],
            vec![clause(name("TypeError"), None, vec![ret(Some(int(2)))])],
            None,
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");

    // The inner chain never raises out of the function; its no-match
    // path jumps to the outer handler with the exception as the block
    // argument. Only the outer chain propagates to the caller.
    let inner_handler = invoke_unwind(f).expect("inner call lowers to an invoke");
    let chained = f.body.blocks.values().any(|block| matches!(
        &block.terminator,
        Terminator::Jump(target, args)
            if *target != inner_handler
                && args.len() == 1
                && matches!(&args[0], Value::BlockParam(bp) if bp.block == inner_handler)
    ));
    assert!(chained, "inner no-match path must hand the exception to the outer handler");
    assert!(f
        .body
        .blocks
        .values()
        .any(|block| block.terminator.is_raise()));
}

#[test]
fn raise_statement_jumps_to_the_active_handler() {
    let module = lowered(vec![def_stmt(
        "f",
        &[],
        vec![try_stmt(
            vec![Stmt::Raise {
                value: Some(call(name("ValueError"), vec![])),
                span: sp(),
            }],
            vec![clause(name("TypeError"), Some("e"), vec![ret(Some(name("e")))])],
            None,
        )],
    )]);
    let f = function(&module, "m.f$impl[0]");

    // The handler variable is bound at the top of the clause suite.
    let instructions = all_instructions(f);
    assert!(instructions.iter().any(|inst| matches!(inst, Instruction::StoreLocal { .. })));
    assert!(instructions.iter().any(|inst| matches!(inst, Instruction::LoadLocal { .. })));
    assert!(f.body.blocks.values().any(|block| matches!(
        &block.terminator,
        Terminator::Jump(_, args) if args.len() == 1
    )));
}

#[test]
fn slot_identity_spans_independent_functions() {
    let module = lowered(vec![
        def_stmt("f", &[], vec![global(&["y"]), assign("y", int(3))]),
        def_stmt("g", &[], vec![ret(Some(name("y")))]),
    ]);
    let slot = module.slot("m.y").unwrap();

    let store = all_instructions(function(&module, "m.f$impl[0]"))
        .into_iter()
        .find_map(|inst| match inst {
            Instruction::StoreGlobal { slot, .. } => Some(*slot),
            _ => None,
        });
    let load = all_instructions(function(&module, "m.g$impl[0]"))
        .into_iter()
        .find_map(|inst| match inst {
            Instruction::LoadGlobal { slot, .. } => Some(*slot),
            _ => None,
        });
    assert_eq!(store, Some(slot));
    assert_eq!(load, Some(slot));
}

#[test]
fn redefinitions_get_strictly_increasing_ordinals() {
    let module = lowered(vec![
        def_stmt("foo", &[], vec![ret(Some(int(1)))]),
        def_stmt("foo", &[], vec![ret(Some(int(2)))]),
    ]);
    assert!(module.get_function("m.foo$impl[0]").is_some());
    assert!(module.get_function("m.foo$impl[1]").is_some());

    let targets: Vec<String> = all_instructions(init(&module))
        .into_iter()
        .filter_map(|inst| match inst {
            Instruction::MakeFunction { function, .. } => Some(function.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec!["m.foo$impl[0]", "m.foo$impl[1]"]);
}

#[test]
fn captured_locals_flow_through_cells() {
    let module = lowered(vec![def_stmt(
        "outer",
        &[],
        vec![
            assign("x", int(1)),
            def_stmt("inner", &[], vec![ret(Some(name("x")))]),
            ret(Some(name("inner"))),
        ],
    )]);

    let outer = function(&module, "m.outer$impl[0]");
    let outer_instructions = all_instructions(outer);
    assert!(outer_instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::MakeCell { .. })));
    assert!(outer_instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::CellSet { .. })));
    assert!(outer_instructions.iter().any(|inst| matches!(
        inst,
        Instruction::MakeFunction { function, captures, .. }
            if function == "m.outer.<locals>.inner$impl[0]" && captures.len() == 1
    )));

    let inner = function(&module, "m.outer.<locals>.inner$impl[0]");
    assert_eq!(inner.captures.len(), 1);
    assert_eq!(inner.captures[0].name, "x");
    assert!(all_instructions(inner).iter().any(|inst| matches!(
        inst,
        Instruction::CellGet { cell: Value::Capture(CaptureId(0)), .. }
    )));
}

#[test]
fn body_falling_off_the_end_returns_none() {
    let module = lowered(vec![def_stmt("f", &[], vec![pass()])]);
    let f = function(&module, "m.f$impl[0]");
    let entry = &f.body.blocks[&f.entry_block()];
    assert!(matches!(
        entry.instructions[0],
        Instruction::Constant { value: Constant::None, .. }
    ));
    assert!(entry.terminator.is_return());
}

#[test]
fn statements_after_return_are_dropped() {
    let module = lowered(vec![def_stmt(
        "f",
        &[],
        vec![ret(Some(int(1))), assign("x", int(2))],
    )]);
    let f = function(&module, "m.f$impl[0]");
    assert_eq!(f.body.blocks.len(), 1);
    let entry = &f.body.blocks[&f.entry_block()];
    assert_eq!(entry.instructions.len(), 1);
    assert!(entry.terminator.is_return());
}

#[test]
fn bare_reraise_is_unsupported() {
    let err = lower_module(
        "m",
        &[def_stmt("f", &[], vec![Stmt::Raise { value: None, span: sp() }])],
    )
    .unwrap_err();
    assert!(matches!(err, LowerError::UnsupportedConstruct { .. }));
}

#[test]
fn return_at_module_scope_is_rejected() {
    let err = lower_module("m", &[ret(None)]).unwrap_err();
    assert!(matches!(err, LowerError::UnsupportedConstruct { .. }));
}

#[test]
fn ambiguous_global_declaration_aborts_the_unit() {
    let err = lower_module(
        "m",
        &[def_stmt("f", &[], vec![assign("y", int(1)), global(&["y"])])],
    )
    .unwrap_err();
    assert!(matches!(err, LowerError::AmbiguousBinding { name, .. } if name == "y"));
}
