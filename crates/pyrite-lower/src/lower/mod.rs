//! Statement and expression lowering.
//!
//! The module body lowers into a synthetic `<module>.__init__` function;
//! each `def` lowers depth-first into a private function registered
//! under a synthetic name `<qualified>$impl[<ordinal>]`, with ordinals
//! assigned in source order so redefinitions of the same textual name
//! stay distinct.

mod except;
#[cfg(test)]
mod tests;

use crate::ast::{Expr, FuncDef, Ident, Literal, Stmt};
use crate::errors::{LowerError, Result};
use crate::scope::{module_global_names, resolve_function, resolve_module, ScopeKind, ScopeMap};
use indexmap::{IndexMap, IndexSet};
use pyrite_core::{
    BlockId, Constant, Function, FunctionBuilder, LocalId, Module, RaisingOp, Value,
};
use tracing::debug;

/// Names resolvable through the builtin namespace when not shadowed by a
/// module-level binding.
const BUILTIN_NAMES: &[&str] = &[
    "BaseException",
    "Exception",
    "TypeError",
    "ValueError",
    "NameError",
    "KeyError",
    "IndexError",
    "RuntimeError",
    "StopIteration",
    "bool",
    "int",
    "str",
    "tuple",
    "type",
    "object",
    "print",
    "len",
    "repr",
    "isinstance",
];

fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Lower one compile unit to a validated module. Fails wholesale on the
/// first error; never returns a partially built module.
pub fn lower_module(name: &str, body: &[Stmt]) -> Result<Module> {
    Lowering::new(name, body).run(body)
}

/// How an identifier reaches storage in the current unit.
#[derive(Debug, Clone)]
enum Binding {
    /// Module slot, resolved lazily by qualified name.
    Global,
    Local(LocalId),
    /// Heap cell allocated in this function's entry block.
    Cell(Value),
    /// Cell received through a capture slot.
    Closure(Value),
}

/// Per-function lowering state. A fresh one is created for every unit;
/// only the module-wide tables outlive it.
struct Unit {
    builder: FunctionBuilder,
    bindings: IndexMap<String, Binding>,
    /// Active exception handler block, if the cursor is inside a
    /// protected region.
    handler: Option<BlockId>,
    /// Prefix for the qualified names of nested definitions.
    qualifier: String,
    /// Enclosing function scopes plus this unit's own, innermost last.
    function_scopes: Vec<ScopeMap>,
    in_function: bool,
}

struct Lowering {
    module: Module,
    module_name: String,
    /// Names bound at module scope or declared `global` anywhere below;
    /// reads of anything else may fall back to the builtin namespace.
    module_globals: IndexSet<String>,
    /// Per-base-name ordinal counters for synthetic function names.
    impl_ordinals: IndexMap<String, u32>,
}

impl Lowering {
    fn new(name: &str, body: &[Stmt]) -> Self {
        Self {
            module: Module::new(name),
            module_name: name.to_string(),
            module_globals: module_global_names(body),
            impl_ordinals: IndexMap::new(),
        }
    }

    fn run(mut self, body: &[Stmt]) -> Result<Module> {
        let init_name = format!("{}.__init__", self.module_name);
        debug!(module = %self.module_name, "lowering module body");
        self.module.reserve_function(&init_name)?;

        let scope = resolve_module(body);
        let bindings = scope
            .entries()
            .map(|(name, _)| (name.to_string(), Binding::Global))
            .collect();

        let mut unit = Unit {
            builder: FunctionBuilder::new(&init_name),
            bindings,
            handler: None,
            qualifier: format!("{}.", self.module_name),
            function_scopes: Vec::new(),
            in_function: false,
        };
        self.lower_suite(&mut unit, body)?;
        if !unit.builder.is_terminated() {
            let none = unit.builder.constant(Constant::None)?;
            unit.builder.ret(none)?;
        }
        self.module.define_function(unit.builder.finish()?)?;

        self.module.validate()?;
        Ok(self.module)
    }

    fn lower_suite(&mut self, unit: &mut Unit, suite: &[Stmt]) -> Result<()> {
        for stmt in suite {
            if unit.builder.is_terminated() {
                debug!("dropping unreachable statement");
                break;
            }
            self.lower_stmt(unit, stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, unit: &mut Unit, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.lower_expr(unit, expr)?;
                Ok(())
            }
            Stmt::Assign { target, value } => {
                let value = self.lower_expr(unit, value)?;
                self.write_name(unit, target, value)
            }
            Stmt::Return { value, span } => {
                if !unit.in_function {
                    return Err(LowerError::UnsupportedConstruct {
                        construct: "return outside a function",
                        span: *span,
                    });
                }
                let value = match value {
                    Some(expr) => self.lower_expr(unit, expr)?,
                    None => unit.builder.constant(Constant::None)?,
                };
                unit.builder.ret(value)?;
                Ok(())
            }
            Stmt::Raise { value, span } => {
                let Some(expr) = value else {
                    return Err(LowerError::UnsupportedConstruct {
                        construct: "re-raise without an exception",
                        span: *span,
                    });
                };
                let exception = self.lower_expr(unit, expr)?;
                match unit.handler {
                    Some(handler) => unit.builder.jump(handler, vec![exception])?,
                    None => unit.builder.raise(exception)?,
                }
                Ok(())
            }
            // Consumed entirely by scope resolution.
            Stmt::Global { .. } | Stmt::Pass { .. } => Ok(()),
            Stmt::FuncDef(def) => self.lower_funcdef(unit, def),
            Stmt::Try(t) => self.lower_try(unit, t),
        }
    }

    fn lower_expr(&mut self, unit: &mut Unit, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Name(ident) => self.read_name(unit, ident),
            Expr::Literal { value, .. } => Ok(unit.builder.constant(materialize(value))?),
            Expr::Call { callee, args, .. } => {
                let callee = self.lower_expr(unit, callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.lower_expr(unit, arg))
                    .collect::<Result<Vec<_>>>()?;
                self.emit_call(unit, callee, args)
            }
            Expr::Attribute { object, name, .. } => {
                let object = self.lower_expr(unit, object)?;
                self.emit_get_attr(unit, object, name)
            }
            Expr::Subscript { object, index, .. } => {
                let object = self.lower_expr(unit, object)?;
                let index = self.lower_expr(unit, index)?;
                self.emit_get_item(unit, object, index)
            }
            Expr::Tuple { elements, .. } => {
                let elements = elements
                    .iter()
                    .map(|element| self.lower_expr(unit, element))
                    .collect::<Result<Vec<_>>>()?;
                Ok(unit.builder.make_tuple(elements)?)
            }
            Expr::Named { target, value, .. } => {
                let value = self.lower_expr(unit, value)?;
                self.write_name(unit, target, value.clone())?;
                Ok(value)
            }
        }
    }

    fn lower_funcdef(&mut self, unit: &mut Unit, def: &FuncDef) -> Result<()> {
        let scope = resolve_function(def, &unit.function_scopes)?;
        let base = format!("{}{}", unit.qualifier, def.name.name);
        let ordinal = self.next_ordinal(&base);
        let synthetic = format!("{}$impl[{}]", base, ordinal);
        debug!(function = %synthetic, "lowering function definition");

        let capture_names: Vec<String> = scope
            .entries()
            .filter(|(_, kind)| *kind == ScopeKind::Closure)
            .map(|(name, _)| name.to_string())
            .collect();

        self.module.reserve_function(&synthetic)?;
        let function = self.lower_unit(
            def,
            &base,
            &synthetic,
            &scope,
            &capture_names,
            &unit.function_scopes,
        )?;
        self.module.define_function(function)?;

        let mut captures = Vec::with_capacity(capture_names.len());
        for name in &capture_names {
            match unit.bindings.get(name) {
                Some(Binding::Cell(cell)) | Some(Binding::Closure(cell)) => {
                    captures.push(cell.clone())
                }
                _ => {
                    return Err(LowerError::InvariantViolation(format!(
                        "captured name '{}' has no cell in the enclosing function",
                        name
                    )))
                }
            }
        }
        let value = unit.builder.make_function(&synthetic, captures)?;
        self.write_name(unit, &def.name, value)
    }

    fn lower_unit(
        &mut self,
        def: &FuncDef,
        base: &str,
        synthetic: &str,
        scope: &ScopeMap,
        capture_names: &[String],
        enclosing_scopes: &[ScopeMap],
    ) -> Result<Function> {
        let mut builder = FunctionBuilder::new(synthetic);

        let mut param_values = IndexMap::new();
        for param in &def.params {
            param_values.insert(param.name.clone(), builder.param(&param.name));
        }
        let mut capture_values = IndexMap::new();
        for name in capture_names {
            capture_values.insert(name.clone(), builder.capture(name));
        }

        let mut bindings = IndexMap::new();
        for (name, kind) in scope.entries() {
            let binding = match kind {
                ScopeKind::Global => Binding::Global,
                ScopeKind::Local => {
                    let local = builder.declare_local(name);
                    if let Some(value) = param_values.get(name) {
                        builder.store_local(local, value.clone())?;
                    }
                    Binding::Local(local)
                }
                ScopeKind::Cell => {
                    let cell = builder.make_cell()?;
                    if let Some(value) = param_values.get(name) {
                        builder.cell_set(cell.clone(), value.clone())?;
                    }
                    Binding::Cell(cell)
                }
                ScopeKind::Closure => {
                    let value = capture_values.get(name).cloned().ok_or_else(|| {
                        LowerError::InvariantViolation(format!(
                            "captured name '{}' has no capture slot",
                            name
                        ))
                    })?;
                    Binding::Closure(value)
                }
            };
            bindings.insert(name.to_string(), binding);
        }

        let mut scopes = enclosing_scopes.to_vec();
        scopes.push(scope.clone());
        let mut unit = Unit {
            builder,
            bindings,
            handler: None,
            qualifier: format!("{}.<locals>.", base),
            function_scopes: scopes,
            in_function: true,
        };
        self.lower_suite(&mut unit, &def.body)?;
        if !unit.builder.is_terminated() {
            let none = unit.builder.constant(Constant::None)?;
            unit.builder.ret(none)?;
        }
        Ok(unit.builder.finish()?)
    }

    fn read_name(&mut self, unit: &mut Unit, ident: &Ident) -> Result<Value> {
        let binding = match unit.bindings.get(&ident.name) {
            Some(binding) => binding.clone(),
            None if !unit.in_function => Binding::Global,
            None => {
                return Err(LowerError::InvariantViolation(format!(
                    "name '{}' escaped scope resolution",
                    ident.name
                )))
            }
        };
        match binding {
            Binding::Global => {
                if !self.module_globals.contains(&ident.name) && is_builtin(&ident.name) {
                    return Ok(unit.builder.builtin_ref(&ident.name)?);
                }
                let key = self.global_key(&ident.name);
                let slot = self.module.get_or_create_slot(&key);
                Ok(unit.builder.load_global(slot)?)
            }
            Binding::Local(local) => Ok(unit.builder.load_local(local)?),
            Binding::Cell(cell) | Binding::Closure(cell) => Ok(unit.builder.cell_get(cell)?),
        }
    }

    fn write_name(&mut self, unit: &mut Unit, ident: &Ident, value: Value) -> Result<()> {
        let binding = match unit.bindings.get(&ident.name) {
            Some(binding) => binding.clone(),
            None if !unit.in_function => Binding::Global,
            None => {
                return Err(LowerError::InvariantViolation(format!(
                    "name '{}' escaped scope resolution",
                    ident.name
                )))
            }
        };
        match binding {
            Binding::Global => {
                let key = self.global_key(&ident.name);
                let slot = self.module.get_or_create_slot(&key);
                unit.builder.store_global(slot, value)?;
            }
            Binding::Local(local) => unit.builder.store_local(local, value)?,
            Binding::Cell(cell) | Binding::Closure(cell) => {
                unit.builder.cell_set(cell, value)?
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, unit: &mut Unit, callee: Value, args: Vec<Value>) -> Result<Value> {
        let value = match unit.handler {
            Some(handler) => unit
                .builder
                .invoke(RaisingOp::Call { callee, args }, handler)?,
            None => unit.builder.call(callee, args)?,
        };
        Ok(value)
    }

    fn emit_get_attr(&mut self, unit: &mut Unit, object: Value, name: &str) -> Result<Value> {
        let value = match unit.handler {
            Some(handler) => unit.builder.invoke(
                RaisingOp::GetAttr {
                    object,
                    name: name.to_string(),
                },
                handler,
            )?,
            None => unit.builder.get_attr(object, name)?,
        };
        Ok(value)
    }

    fn emit_get_item(&mut self, unit: &mut Unit, object: Value, index: Value) -> Result<Value> {
        let value = match unit.handler {
            Some(handler) => unit
                .builder
                .invoke(RaisingOp::GetItem { object, index }, handler)?,
            None => unit.builder.get_item(object, index)?,
        };
        Ok(value)
    }

    fn global_key(&self, name: &str) -> String {
        format!("{}.{}", self.module_name, name)
    }

    fn next_ordinal(&mut self, base: &str) -> u32 {
        let counter = self.impl_ordinals.entry(base.to_string()).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        ordinal
    }
}

fn materialize(literal: &Literal) -> Constant {
    match literal {
        Literal::Int(value) => Constant::Int(value.clone()),
        Literal::Str(value) => Constant::Str(value.clone()),
        Literal::Bool(value) => Constant::Bool(*value),
        Literal::None => Constant::None,
    }
}
