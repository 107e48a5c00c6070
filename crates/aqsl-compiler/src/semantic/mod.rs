pub mod symbols;
pub mod types;
pub mod validator;

use aqsl_common::DiagnosticBag;

use crate::session::CompilationSession;

/// Check that every reference reachable from the shader root resolves.
///
/// Runs before code generation so that every broken reference is reported
/// at once instead of the generator stopping at the first one.
pub fn validate(session: &CompilationSession) -> DiagnosticBag {
    validator::ReferenceValidator::new(session).validate()
}
