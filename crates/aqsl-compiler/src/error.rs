use aqsl_common::Diagnostic;
use thiserror::Error;

use crate::ast::NodeId;
use crate::semantic::symbols::{FuncRef, VarRef};

/// Errors that abandon the compilation of one shader.
///
/// Other shaders of the same run are unaffected; see
/// [`DriverError`](crate::driver::DriverError) for run-level failures.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("reference to {0} does not resolve to a definition")]
    UnresolvedVariable(VarRef),

    #[error("call to {0} does not resolve to a definition")]
    UnresolvedFunction(FuncRef),

    #[error("{0} does not exist in the syntax tree")]
    MissingNode(NodeId),

    #[error("{0} is not a shader definition")]
    NotAShader(NodeId),

    #[error("local function `{0}` has no body to inline")]
    MissingBody(String),

    #[error("local function `{0}` calls itself and cannot be inlined")]
    RecursiveInline(String),

    #[error("temp variable `{0}` clashes with an existing variable of another type")]
    TempNameClash(String),

    #[error("`{name}` expects {expected} argument(s) but {found} were supplied")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("shader has {} invalid reference(s)", .0.len())]
    InvalidReferences(Vec<Diagnostic>),
}

impl CompileError {
    /// The diagnostics to show for this error.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            CompileError::InvalidReferences(diags) => diags.clone(),
            other => vec![Diagnostic::error(other.to_string())],
        }
    }
}
