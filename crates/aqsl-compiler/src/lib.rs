pub mod ast;
pub mod codegen;
pub mod driver;
pub mod error;
pub mod semantic;
pub mod session;

use aqsl_common::{DiagnosticBag, SlxProgram};

pub use codegen::{CodeGenerator, GenContext, GenOptions};
pub use error::CompileError;
pub use session::{CompilationSession, ShaderUnit};

/// A successfully generated program and everything reported on the way.
///
/// `diagnostics` may still contain errors (an impossible `break` depth, for
/// instance); the program then carries `INVALID` lines.
#[derive(Debug)]
pub struct Compiled {
    pub program: SlxProgram,
    pub diagnostics: DiagnosticBag,
}

impl Compiled {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Validate and generate one shader.
pub fn compile(
    session: &mut CompilationSession,
    options: &GenOptions,
) -> Result<Compiled, CompileError> {
    session.shader_header()?;

    let mut diagnostics = semantic::validate(session);
    if diagnostics.has_errors() {
        return Err(CompileError::InvalidReferences(
            diagnostics.into_diagnostics(),
        ));
    }

    let mut ctx = GenContext::new();
    let program = CodeGenerator::new(session, options.clone()).generate(&mut ctx)?;
    diagnostics.extend(ctx.into_diagnostics());
    Ok(Compiled {
        program,
        diagnostics,
    })
}
