//! Static scope resolution.
//!
//! Classifies every identifier of a lexical unit before any IR is
//! emitted. Module-level binding targets are global; function-level
//! binding targets are local unless a `global` declaration covers them,
//! in which case every use in the unit resolves to the module slot,
//! including uses lexically before the declaration. Locals captured by a
//! nested function are promoted to cells; free names resolve to an
//! enclosing function's binding when one exists, otherwise fall back to
//! global lookup.

use crate::ast::{Expr, FuncDef, Stmt};
use crate::errors::{LowerError, Result};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Local,
    /// A local captured by a nested function; stored in a heap cell.
    Cell,
    /// Captured from an enclosing function's cell.
    Closure,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeMap {
    entries: IndexMap<String, ScopeKind>,
}

impl ScopeMap {
    pub fn kind(&self, name: &str) -> Option<ScopeKind> {
        self.entries.get(name).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, ScopeKind)> {
        self.entries.iter().map(|(name, &kind)| (name.as_str(), kind))
    }

    fn insert(&mut self, name: impl Into<String>, kind: ScopeKind) {
        self.entries.insert(name.into(), kind);
    }
}

/// At module scope every binding target is global.
pub fn resolve_module(body: &[Stmt]) -> ScopeMap {
    let mut bound = IndexSet::new();
    suite_bound_names(body, &mut bound);

    let mut map = ScopeMap::default();
    for name in bound {
        map.insert(name, ScopeKind::Global);
    }
    map
}

/// Resolve one function body. `enclosing` is the stack of enclosing
/// function scopes, innermost last; the module scope is not part of it
/// since module names are reached through global lookup, not capture.
pub fn resolve_function(def: &FuncDef, enclosing: &[ScopeMap]) -> Result<ScopeMap> {
    check_global_declarations(def)?;

    let mut globals = IndexSet::new();
    suite_global_decls(&def.body, &mut globals);

    let mut bound = IndexSet::new();
    for param in &def.params {
        bound.insert(param.name.clone());
    }
    suite_bound_names(&def.body, &mut bound);

    let mut reads = IndexSet::new();
    suite_read_names(&def.body, &mut reads);

    let mut map = ScopeMap::default();
    for name in &bound {
        if globals.contains(name) {
            continue;
        }
        let kind = if captured_by_nested(&def.body, name) {
            ScopeKind::Cell
        } else {
            ScopeKind::Local
        };
        map.insert(name.clone(), kind);
    }
    for name in &globals {
        map.insert(name.clone(), ScopeKind::Global);
    }
    for name in &reads {
        if bound.contains(name) || globals.contains(name) {
            continue;
        }
        map.insert(name.clone(), free_name_kind(name, enclosing));
    }

    // Names this unit never touches itself but a nested function captures
    // from further out still pass through here as captures, so the cell
    // can be threaded along at the definition site.
    let mut nested_reads = IndexSet::new();
    collect_nested_reads(&def.body, &mut nested_reads);
    for name in &nested_reads {
        if bound.contains(name) || globals.contains(name) || map.kind(name).is_some() {
            continue;
        }
        if captured_by_nested(&def.body, name)
            && free_name_kind(name, enclosing) == ScopeKind::Closure
        {
            map.insert(name.clone(), ScopeKind::Closure);
        }
    }
    Ok(map)
}

/// Binding targets of the unit's own qualified names: module-level
/// targets plus every name declared `global` anywhere beneath, since a
/// `global y; y = 3` in a nested function binds the module slot.
pub fn module_global_names(body: &[Stmt]) -> IndexSet<String> {
    let mut names = IndexSet::new();
    suite_bound_names(body, &mut names);
    collect_global_decls_deep(body, &mut names);
    names
}

fn free_name_kind(name: &str, enclosing: &[ScopeMap]) -> ScopeKind {
    for scope in enclosing.iter().rev() {
        match scope.kind(name) {
            Some(ScopeKind::Local) | Some(ScopeKind::Cell) | Some(ScopeKind::Closure) => {
                return ScopeKind::Closure
            }
            Some(ScopeKind::Global) | None => {}
        }
    }
    ScopeKind::Global
}

fn captured_by_nested(body: &[Stmt], name: &str) -> bool {
    nested_defs(body).iter().any(|def| def_captures(def, name))
}

fn def_captures(def: &FuncDef, name: &str) -> bool {
    let mut globals = IndexSet::new();
    suite_global_decls(&def.body, &mut globals);

    let mut bound = IndexSet::new();
    for param in &def.params {
        bound.insert(param.name.clone());
    }
    suite_bound_names(&def.body, &mut bound);

    // A local rebinding shadows the outer name for this def and
    // everything beneath it.
    if bound.contains(name) && !globals.contains(name) {
        return false;
    }
    if !globals.contains(name) {
        let mut reads = IndexSet::new();
        suite_read_names(&def.body, &mut reads);
        if reads.contains(name) {
            return true;
        }
    }
    nested_defs(&def.body).iter().any(|d| def_captures(d, name))
}

/// Linear scan rejecting `global NAME` after NAME was already bound as a
/// local target in the same unit. Parameters count as bound from entry.
/// Once a declaration is in effect, later targets of NAME bind the
/// module slot, so re-declaring it is legal.
fn check_global_declarations(def: &FuncDef) -> Result<()> {
    let mut bound: IndexSet<String> = def.params.iter().map(|p| p.name.clone()).collect();
    let mut declared = IndexSet::new();
    scan_suite(&def.body, &mut bound, &mut declared)
}

fn scan_suite(
    suite: &[Stmt],
    bound: &mut IndexSet<String>,
    declared: &mut IndexSet<String>,
) -> Result<()> {
    for stmt in suite {
        match stmt {
            Stmt::Global { names, .. } => {
                for name in names {
                    if bound.contains(&name.name) && !declared.contains(&name.name) {
                        return Err(LowerError::AmbiguousBinding {
                            name: name.name.clone(),
                            span: name.span,
                        });
                    }
                    declared.insert(name.name.clone());
                }
            }
            Stmt::Assign { target, value } => {
                expr_bound_names_into(value, bound);
                bound.insert(target.name.clone());
            }
            Stmt::Expr(expr) => expr_bound_names_into(expr, bound),
            Stmt::Return { value, .. } | Stmt::Raise { value, .. } => {
                if let Some(expr) = value {
                    expr_bound_names_into(expr, bound);
                }
            }
            Stmt::FuncDef(def) => {
                bound.insert(def.name.name.clone());
            }
            Stmt::Try(t) => {
                scan_suite(&t.body, bound, declared)?;
                for handler in &t.handlers {
                    expr_bound_names_into(&handler.matcher, bound);
                    if let Some(name) = &handler.name {
                        bound.insert(name.name.clone());
                    }
                    scan_suite(&handler.body, bound, declared)?;
                }
                if let Some(body) = &t.catch_all {
                    scan_suite(body, bound, declared)?;
                }
            }
            Stmt::Pass { .. } => {}
        }
    }
    Ok(())
}

/// Names bound within this unit: assignment and walrus targets, `def`
/// names, and handler variables. Does not descend into nested function
/// bodies; those are separate units.
fn suite_bound_names(suite: &[Stmt], out: &mut IndexSet<String>) {
    for stmt in suite {
        match stmt {
            Stmt::Assign { target, value } => {
                expr_bound_names_into(value, out);
                out.insert(target.name.clone());
            }
            Stmt::Expr(expr) => expr_bound_names_into(expr, out),
            Stmt::Return { value, .. } | Stmt::Raise { value, .. } => {
                if let Some(expr) = value {
                    expr_bound_names_into(expr, out);
                }
            }
            Stmt::FuncDef(def) => {
                out.insert(def.name.name.clone());
            }
            Stmt::Try(t) => {
                suite_bound_names(&t.body, out);
                for handler in &t.handlers {
                    expr_bound_names_into(&handler.matcher, out);
                    if let Some(name) = &handler.name {
                        out.insert(name.name.clone());
                    }
                    suite_bound_names(&handler.body, out);
                }
                if let Some(body) = &t.catch_all {
                    suite_bound_names(body, out);
                }
            }
            Stmt::Global { .. } | Stmt::Pass { .. } => {}
        }
    }
}

fn expr_bound_names_into(expr: &Expr, out: &mut IndexSet<String>) {
    match expr {
        Expr::Name(_) | Expr::Literal { .. } => {}
        Expr::Call { callee, args, .. } => {
            expr_bound_names_into(callee, out);
            for arg in args {
                expr_bound_names_into(arg, out);
            }
        }
        Expr::Attribute { object, .. } => expr_bound_names_into(object, out),
        Expr::Subscript { object, index, .. } => {
            expr_bound_names_into(object, out);
            expr_bound_names_into(index, out);
        }
        Expr::Tuple { elements, .. } => {
            for element in elements {
                expr_bound_names_into(element, out);
            }
        }
        Expr::Named { target, value, .. } => {
            expr_bound_names_into(value, out);
            out.insert(target.name.clone());
        }
    }
}

fn suite_read_names(suite: &[Stmt], out: &mut IndexSet<String>) {
    for stmt in suite {
        match stmt {
            Stmt::Expr(expr) => expr_read_names_into(expr, out),
            Stmt::Assign { value, .. } => expr_read_names_into(value, out),
            Stmt::Return { value, .. } | Stmt::Raise { value, .. } => {
                if let Some(expr) = value {
                    expr_read_names_into(expr, out);
                }
            }
            Stmt::Try(t) => {
                suite_read_names(&t.body, out);
                for handler in &t.handlers {
                    expr_read_names_into(&handler.matcher, out);
                    suite_read_names(&handler.body, out);
                }
                if let Some(body) = &t.catch_all {
                    suite_read_names(body, out);
                }
            }
            Stmt::Global { .. } | Stmt::Pass { .. } | Stmt::FuncDef(_) => {}
        }
    }
}

fn expr_read_names_into(expr: &Expr, out: &mut IndexSet<String>) {
    match expr {
        Expr::Name(ident) => {
            out.insert(ident.name.clone());
        }
        Expr::Literal { .. } => {}
        Expr::Call { callee, args, .. } => {
            expr_read_names_into(callee, out);
            for arg in args {
                expr_read_names_into(arg, out);
            }
        }
        Expr::Attribute { object, .. } => expr_read_names_into(object, out),
        Expr::Subscript { object, index, .. } => {
            expr_read_names_into(object, out);
            expr_read_names_into(index, out);
        }
        Expr::Tuple { elements, .. } => {
            for element in elements {
                expr_read_names_into(element, out);
            }
        }
        Expr::Named { value, .. } => expr_read_names_into(value, out),
    }
}

fn nested_defs(suite: &[Stmt]) -> Vec<&FuncDef> {
    let mut defs = Vec::new();
    collect_nested_defs(suite, &mut defs);
    defs
}

fn collect_nested_defs<'a>(suite: &'a [Stmt], out: &mut Vec<&'a FuncDef>) {
    for stmt in suite {
        match stmt {
            Stmt::FuncDef(def) => out.push(def),
            Stmt::Try(t) => {
                collect_nested_defs(&t.body, out);
                for handler in &t.handlers {
                    collect_nested_defs(&handler.body, out);
                }
                if let Some(body) = &t.catch_all {
                    collect_nested_defs(body, out);
                }
            }
            _ => {}
        }
    }
}

fn collect_nested_reads(suite: &[Stmt], out: &mut IndexSet<String>) {
    for def in nested_defs(suite) {
        suite_read_names(&def.body, out);
        collect_nested_reads(&def.body, out);
    }
}

fn collect_global_decls_deep(suite: &[Stmt], out: &mut IndexSet<String>) {
    for stmt in suite {
        match stmt {
            Stmt::Global { names, .. } => {
                for name in names {
                    out.insert(name.name.clone());
                }
            }
            Stmt::FuncDef(def) => collect_global_decls_deep(&def.body, out),
            Stmt::Try(t) => {
                collect_global_decls_deep(&t.body, out);
                for handler in &t.handlers {
                    collect_global_decls_deep(&handler.body, out);
                }
                if let Some(body) = &t.catch_all {
                    collect_global_decls_deep(body, out);
                }
            }
            _ => {}
        }
    }
}

fn suite_global_decls(suite: &[Stmt], out: &mut IndexSet<String>) {
    for stmt in suite {
        match stmt {
            Stmt::Global { names, .. } => {
                for name in names {
                    out.insert(name.name.clone());
                }
            }
            Stmt::Try(t) => {
                suite_global_decls(&t.body, out);
                for handler in &t.handlers {
                    suite_global_decls(&handler.body, out);
                }
                if let Some(body) = &t.catch_all {
                    suite_global_decls(body, out);
                }
            }
            _ => {}
        }
    }
}
