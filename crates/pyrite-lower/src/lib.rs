/*! AST-to-CFG lowering for the pyrite compiler.
 *
 * Consumes the parsed syntax tree of one compile unit and produces a
 * validated [`pyrite_core::Module`]: global slots, a synthetic
 * `__init__` function for the module body, and a private function per
 * `def`. Scope resolution runs up front, exception dispatch is spelled
 * out as explicit control flow, and try statements whose bodies cannot
 * raise lose their handler apparatus entirely.
 */

pub mod ast;
mod errors;
mod lower;
pub mod raise;
pub mod scope;

pub use errors::{LowerError, Result};
pub use lower::lower_module;
