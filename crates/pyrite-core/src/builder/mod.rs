/*! Construction API for pyrite functions.
 *
 * The builder owns the in-progress function, an insertion cursor, and the
 * temp numbering. Structural correctness is enforced while building:
 * emitting past a terminator is an error, never a silent drop. Dead-block
 * elimination belongs to a later pass, not here.
 */

mod function_builder;

pub use function_builder::FunctionBuilder;
