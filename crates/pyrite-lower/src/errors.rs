use pyrite_core::{IrError, SourceSpan};
use thiserror::Error;

/// Errors reported while lowering one compile unit. Any of these aborts
/// the unit wholesale; a partially lowered module is never handed out.
#[derive(Error, Debug)]
pub enum LowerError {
    /// A name was bound as a local and later declared `global` in the
    /// same lexical unit.
    #[error("name '{name}' declared global after being bound as a local at {span}")]
    AmbiguousBinding { name: String, span: SourceSpan },

    /// An internal precondition failed. Indicates an engine defect, not
    /// a source-program defect.
    #[error("lowering invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unsupported construct '{construct}' at {span}")]
    UnsupportedConstruct {
        construct: &'static str,
        span: SourceSpan,
    },

    #[error(transparent)]
    Ir(#[from] IrError),
}

pub type Result<T> = std::result::Result<T, LowerError>;
