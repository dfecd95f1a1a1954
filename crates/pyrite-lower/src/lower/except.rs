//! try/except lowering.
//!
//! The protected suite runs with a handler block as its unwind target;
//! raising operations become `Invoke` terminators and explicit `raise`
//! jumps straight to the handler. The handler dispatches over the except
//! clauses in source order. Two elision layers keep trivial bodies
//! clean: a suite that cannot raise drops the whole apparatus up front,
//! and a handler that ends up with no predecessor is discarded after the
//! fact.

use super::{Lowering, Unit};
use crate::ast::{ExceptHandler, TryStmt};
use crate::errors::{LowerError, Result};
use crate::raise::suite_can_raise;
use pyrite_core::{BlockId, Type, Value};
use tracing::debug;

impl Lowering {
    pub(super) fn lower_try(&mut self, unit: &mut Unit, stmt: &TryStmt) -> Result<()> {
        if stmt.handlers.is_empty() && stmt.catch_all.is_none() {
            return Err(LowerError::InvariantViolation(
                "try statement without except clauses".to_string(),
            ));
        }
        if !suite_can_raise(&stmt.body) {
            debug!("protected suite cannot raise, except clauses dropped");
            return self.lower_suite(unit, &stmt.body);
        }

        let handler = unit.builder.create_block();
        let exception = unit.builder.append_block_param(handler, "exc", Type::Object)?;

        let previous = unit.handler.replace(handler);
        self.lower_suite(unit, &stmt.body)?;
        unit.handler = previous;

        let continuation = unit.builder.create_block();
        if !unit.builder.is_terminated() {
            unit.builder.jump(continuation, vec![])?;
        }

        if unit.builder.predecessor_count(handler) > 0 {
            unit.builder.switch_to_block(handler)?;
            self.lower_dispatch(unit, stmt, exception, continuation)?;
        } else {
            debug!("no protected operation reaches the handler, dispatch dropped");
        }

        if unit.builder.predecessor_count(continuation) > 0 {
            unit.builder.switch_to_block(continuation)?;
        }
        Ok(())
    }

    /// Build the matcher chain, clause suites, and the final re-raise
    /// path. The cursor sits at the handler block on entry. Matchers and
    /// clause suites run under the enclosing handler, not this
    /// statement's own.
    fn lower_dispatch(
        &mut self,
        unit: &mut Unit,
        stmt: &TryStmt,
        exception: Value,
        continuation: BlockId,
    ) -> Result<()> {
        if stmt.handlers.is_empty() {
            // Bare except only; it always matches.
            if let Some(body) = &stmt.catch_all {
                self.lower_suite(unit, body)?;
                if !unit.builder.is_terminated() {
                    unit.builder.jump(continuation, vec![])?;
                }
            }
            return Ok(());
        }

        let suite_blocks: Vec<BlockId> = stmt
            .handlers
            .iter()
            .map(|_| unit.builder.create_block())
            .collect();
        let test_blocks: Vec<BlockId> = stmt
            .handlers
            .iter()
            .skip(1)
            .map(|_| unit.builder.create_block())
            .collect();
        // Where the last clause falls through to: the bare-except suite
        // when present, otherwise a re-raise of the original exception.
        let fallback = unit.builder.create_block();

        // The first clause's tests go straight into the handler block.
        for (i, clause) in stmt.handlers.iter().enumerate() {
            if i > 0 {
                unit.builder.switch_to_block(test_blocks[i - 1])?;
            }
            let no_match = test_blocks.get(i).copied().unwrap_or(fallback);
            self.lower_clause_test(unit, clause, exception.clone(), suite_blocks[i], no_match)?;
        }

        for (i, clause) in stmt.handlers.iter().enumerate() {
            unit.builder.switch_to_block(suite_blocks[i])?;
            if let Some(name) = &clause.name {
                self.write_name(unit, name, exception.clone())?;
            }
            self.lower_suite(unit, &clause.body)?;
            if !unit.builder.is_terminated() {
                unit.builder.jump(continuation, vec![])?;
            }
        }

        unit.builder.switch_to_block(fallback)?;
        match &stmt.catch_all {
            Some(body) => {
                self.lower_suite(unit, body)?;
                if !unit.builder.is_terminated() {
                    unit.builder.jump(continuation, vec![])?;
                }
            }
            None => match unit.handler {
                Some(enclosing) => unit.builder.jump(enclosing, vec![exception])?,
                None => unit.builder.raise(exception)?,
            },
        }
        Ok(())
    }

    /// One clause's runtime test. A type discriminator picks between the
    /// tuple path and the single-matcher path, since the matcher's shape
    /// is only known at run time. Invalid matchers raise `TypeError`,
    /// matching the source language.
    fn lower_clause_test(
        &mut self,
        unit: &mut Unit,
        clause: &ExceptHandler,
        exception: Value,
        suite: BlockId,
        no_match: BlockId,
    ) -> Result<()> {
        let matcher = self.lower_expr(unit, &clause.matcher)?;
        let matcher_ty = unit.builder.type_of(matcher.clone())?;
        let tuple_ty = unit.builder.builtin_ref("tuple")?;
        let is_tuple = unit.builder.is(matcher_ty, tuple_ty)?;

        let tuple_path = unit.builder.create_block();
        let single_path = unit.builder.create_block();
        unit.builder
            .branch(is_tuple, tuple_path, vec![], single_path, vec![])?;

        let invalid = unit.builder.create_block();

        unit.builder.switch_to_block(single_path)?;
        let base = unit.builder.builtin_ref("BaseException")?;
        let valid = unit.builder.is_subclass(matcher.clone(), base)?;
        let single_test = unit.builder.create_block();
        unit.builder
            .branch(valid, single_test, vec![], invalid, vec![])?;

        unit.builder.switch_to_block(single_test)?;
        let exception_ty = unit.builder.type_of(exception.clone())?;
        let hit = unit.builder.is_subclass(exception_ty, matcher.clone())?;
        unit.builder.branch(hit, suite, vec![], no_match, vec![])?;

        self.lower_tuple_matcher(unit, matcher, exception, tuple_path, invalid, suite, no_match)?;

        unit.builder.switch_to_block(invalid)?;
        self.raise_type_error(unit)
    }

    /// Tuple matchers get two index loops: one validating that every
    /// element is an exception type, one scanning for a subclass hit.
    /// The scan short-circuits at the first matching element.
    #[allow(clippy::too_many_arguments)]
    fn lower_tuple_matcher(
        &mut self,
        unit: &mut Unit,
        matcher: Value,
        exception: Value,
        tuple_path: BlockId,
        invalid: BlockId,
        suite: BlockId,
        no_match: BlockId,
    ) -> Result<()> {
        unit.builder.switch_to_block(tuple_path)?;
        let len = unit.builder.tuple_len(matcher.clone())?;
        let zero = unit.builder.index_const(0)?;

        let check_cond = unit.builder.create_block();
        let check_idx = unit.builder.append_block_param(check_cond, "i", Type::Index)?;
        unit.builder.jump(check_cond, vec![zero])?;

        unit.builder.switch_to_block(check_cond)?;
        let more = unit.builder.index_cmp_less(check_idx.clone(), len.clone())?;
        let check_body = unit.builder.create_block();
        let scan_entry = unit.builder.create_block();
        unit.builder
            .branch(more, check_body, vec![], scan_entry, vec![])?;

        unit.builder.switch_to_block(check_body)?;
        let element = unit.builder.tuple_get(matcher.clone(), check_idx.clone())?;
        let base = unit.builder.builtin_ref("BaseException")?;
        let element_valid = unit.builder.is_subclass(element, base)?;
        let check_next = unit.builder.create_block();
        unit.builder
            .branch(element_valid, check_next, vec![], invalid, vec![])?;

        unit.builder.switch_to_block(check_next)?;
        let one = unit.builder.index_const(1)?;
        let next_idx = unit.builder.index_add(check_idx, one)?;
        unit.builder.jump(check_cond, vec![next_idx])?;

        unit.builder.switch_to_block(scan_entry)?;
        let scan_zero = unit.builder.index_const(0)?;
        let scan_cond = unit.builder.create_block();
        let scan_idx = unit.builder.append_block_param(scan_cond, "i", Type::Index)?;
        unit.builder.jump(scan_cond, vec![scan_zero])?;

        unit.builder.switch_to_block(scan_cond)?;
        let scan_more = unit.builder.index_cmp_less(scan_idx.clone(), len)?;
        let scan_body = unit.builder.create_block();
        unit.builder
            .branch(scan_more, scan_body, vec![], no_match, vec![])?;

        unit.builder.switch_to_block(scan_body)?;
        let candidate = unit.builder.tuple_get(matcher, scan_idx.clone())?;
        let exception_ty = unit.builder.type_of(exception)?;
        let hit = unit.builder.is_subclass(exception_ty, candidate)?;
        let scan_next = unit.builder.create_block();
        unit.builder.branch(hit, suite, vec![], scan_next, vec![])?;

        unit.builder.switch_to_block(scan_next)?;
        let scan_one = unit.builder.index_const(1)?;
        let scan_next_idx = unit.builder.index_add(scan_idx, scan_one)?;
        unit.builder.jump(scan_cond, vec![scan_next_idx])?;
        Ok(())
    }

    fn raise_type_error(&mut self, unit: &mut Unit) -> Result<()> {
        let type_error = unit.builder.builtin_ref("TypeError")?;
        let error = self.emit_call(unit, type_error, vec![])?;
        match unit.handler {
            Some(enclosing) => unit.builder.jump(enclosing, vec![error])?,
            None => unit.builder.raise(error)?,
        }
        Ok(())
    }
}
