/*! Core IR types and builders for the pyrite compiler.
 *
 * Lowering a dynamic language needs an IR where control flow is fully
 * explicit: basic blocks with block arguments, single-definition values,
 * and exception dispatch spelled out as ordinary branches. This crate
 * provides those building blocks plus the per-compile-unit module that
 * owns global slots and the function registry.
 */

pub mod block;
pub mod builder;
pub mod format;
pub mod function;
pub mod instructions;
pub mod module;
pub mod values;

pub use block::{BasicBlock, BlockId, BlockParam, Terminator};
pub use builder::FunctionBuilder;
pub use function::{Capture, Function, FunctionBody, Local, LocalId, Parameter};
pub use instructions::{Instruction, RaisingOp};
pub use module::Module;
pub use values::{Constant, SlotId, SourceSpan, Type, Value};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("{0} already has a terminator")]
    BlockTerminated(BlockId),
    #[error("no insertion point set")]
    NoInsertionPoint,
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("registry error: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests;
