use aqsl_common::{DataDecl, Line, ShaderClass, SlxProgram, StorageClass};

use super::context::GenContext;
use crate::semantic::symbols::VariableDef;
use crate::semantic::types::TypeQualifiers;
use crate::session::CompilationSession;

/// `USES` mask: standard variables referenced during the walk plus any
/// standard variable with a nonzero use count.
pub fn uses_mask(session: &CompilationSession, ctx: &GenContext) -> u32 {
    session
        .standard_vars
        .iter()
        .enumerate()
        .filter(|(index, def)| def.use_count > 0 && *index < 32)
        .fold(ctx.uses(), |mask, (index, _)| mask | (1 << index))
}

/// Data segment: every local variable that is used or is a parameter, in
/// registry order.
pub fn data_segment(session: &CompilationSession) -> Vec<DataDecl> {
    session
        .variables
        .iter()
        .filter(|def| def.use_count > 0 || def.is_param())
        .map(data_decl)
        .collect()
}

pub fn data_decl(def: &VariableDef) -> DataDecl {
    let storage = if def.ty.is_varying() {
        Some(StorageClass::Varying)
    } else if def.ty.has(TypeQualifiers::UNIFORM) {
        Some(StorageClass::Uniform)
    } else {
        None
    };
    DataDecl {
        output: def.ty.has(TypeQualifiers::OUTPUT),
        param: def.is_param(),
        storage,
        type_name: def.ty.name().to_string(),
        name: def.vm_name.clone(),
        array_len: def.array_len,
    }
}

/// Put the generated segments together.
pub fn assemble(
    session: &CompilationSession,
    ctx: &GenContext,
    class: ShaderClass,
    version: &str,
    init: Vec<Line>,
    code: Vec<Line>,
) -> SlxProgram {
    SlxProgram {
        class,
        version: version.to_string(),
        uses: uses_mask(session, ctx),
        data: data_segment(session),
        init,
        code,
    }
}
