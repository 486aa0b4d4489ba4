//! Errors raised by the flattening engine.
//!
//! Every error aborts the whole run. The module may already be partially
//! rewritten when an error is returned, so callers must not emit it.

use squishy_ir::VerifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("no root function: the module has no designated entry and no function named `{name}`")]
    NoRoot { name: String },

    #[error("root function `{name}` is a declaration and has no body to flatten into")]
    RootIsDeclaration { name: String },

    #[error("cannot force-inline `{name}`: it matches the library routine of the same name")]
    LibraryRoutine { name: String },

    #[error("cannot force-inline `{name}`: it calls itself through {}", .path.join(" -> "))]
    RecursiveInline { name: String, path: Vec<String> },

    #[error("call to `{callee}` in `{caller}` passes {found} arguments, expected {expected}")]
    ArityMismatch {
        caller: String,
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("cannot inline variadic function `{callee}` into `{caller}`")]
    VarArgInline { caller: String, callee: String },

    #[error("global `{name}` has no owning function")]
    UnownedGlobal { name: String },

    #[error("global `{name}` is used by more than one function: {}", .owners.join(", "))]
    SharedGlobal { name: String, owners: Vec<String> },

    #[error(
        "global `{global}` is referenced from a constant aggregate operand in `{function}`; \
         only constant expressions can be rewritten to local storage"
    )]
    UnsupportedConstantUse { global: String, function: String },

    #[error(
        "input module is malformed ({} problems, first: {})",
        .errors.len(),
        .errors.first().map(ToString::to_string).unwrap_or_default()
    )]
    MalformedInput { errors: Vec<VerifyError> },

    #[error(
        "module is malformed after flattening ({} problems, first: {}). \
         Do not use the inline keyword in your input",
        .errors.len(),
        .errors.first().map(ToString::to_string).unwrap_or_default()
    )]
    MalformedModule {
        errors: Vec<VerifyError>,
        /// Textual dump of the broken module
        dump: String,
    },
}

pub type Result<T> = std::result::Result<T, FlattenError>;
