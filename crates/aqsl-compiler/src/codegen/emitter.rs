use std::collections::HashMap;

use aqsl_common::{Opcode, Operand, SlxProgram, DEFAULT_SLX_VERSION};
use tracing::debug;

use super::context::GenContext;
use super::output;
use super::running_state::LoopExit;
use super::translation::{qualified_temp_name, temp_name, TranslationTable};
use crate::ast::{BinaryOp, Cone, NodeId, NodeKind};
use crate::error::CompileError;
use crate::semantic::symbols::{FuncRef, FunctionDef, Linkage, RefKind, VarRef, VariableDef};
use crate::semantic::types::{BaseType, Type, TypeQualifiers};
use crate::session::CompilationSession;

/// Settings that affect the emitted program but not its semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOptions {
    /// Written after `AQSIS_V`.
    pub version: String,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_SLX_VERSION.to_string(),
        }
    }
}

// ============================================================================
// Code Generator
// ============================================================================

/// Lowers a shader tree to an SLX program.
///
/// Local function calls are expanded in place; use counts on the session's
/// variables are updated as references are emitted, which is what decides
/// the Data segment and the `USES` mask.
pub struct CodeGenerator<'s> {
    session: &'s mut CompilationSession,
    options: GenOptions,
}

impl<'s> CodeGenerator<'s> {
    pub fn new(session: &'s mut CompilationSession, options: GenOptions) -> Self {
        Self { session, options }
    }

    /// Generate the program for the session's shader root.
    ///
    /// Loop-exit errors are left in `ctx` as diagnostics with an `INVALID`
    /// line in the output; every other failure aborts with an error.
    pub fn generate(&mut self, ctx: &mut GenContext) -> Result<SlxProgram, CompileError> {
        let root = self.session.root;
        let (class, name, params, body) = match self.session.node(root)?.kind.clone() {
            NodeKind::Shader {
                class,
                name,
                params,
                body,
            } => (class, name, params, body),
            _ => return Err(CompileError::NotAShader(root)),
        };
        debug!(shader = %name, class = class.keyword(), "generating code");

        // Init segment: parameter defaults.
        for param in params {
            let Some(init) = self.session.variable(param)?.initializer else {
                continue;
            };
            self.gen_node(init, ctx)?;
            let target = self.access(param, ctx)?;
            ctx.emit_with(Opcode::Pop, Operand::Name(target));
        }
        let init = ctx.take_lines();

        self.gen_node(body, ctx)?;
        let code = ctx.take_lines();

        Ok(output::assemble(
            &*self.session,
            ctx,
            class,
            &self.options.version,
            init,
            code,
        ))
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn gen_node(&mut self, id: NodeId, ctx: &mut GenContext) -> Result<(), CompileError> {
        let node = self.session.node(id)?.clone();
        match node.kind {
            NodeKind::Shader { body, .. } => self.gen_node(body, ctx),
            NodeKind::StatementList { statements } => {
                for stmt in statements {
                    self.gen_node(stmt, ctx)?;
                }
                Ok(())
            }
            NodeKind::ExprStatement { expr } => {
                self.gen_node(expr, ctx)?;
                if self.leaves_value(expr)? {
                    ctx.emit_op(Opcode::Drop);
                }
                Ok(())
            }

            NodeKind::FloatConst { value } => {
                ctx.emit_with(Opcode::Pushif, Operand::Float(value));
                Ok(())
            }
            NodeKind::StringConst { value } => {
                ctx.emit_with(Opcode::Pushis, Operand::Str(value));
                Ok(())
            }
            // The VM constructors pop components last-first.
            NodeKind::Tuple { components } => {
                for component in components.into_iter().rev() {
                    self.gen_node(component, ctx)?;
                }
                Ok(())
            }

            NodeKind::Variable { var } => {
                let name = self.access(var, ctx)?;
                ctx.emit_with(Opcode::Pushv, Operand::Name(name));
                Ok(())
            }
            NodeKind::ArrayElement { var, index } => {
                self.gen_node(index, ctx)?;
                let name = self.access(var, ctx)?;
                ctx.emit_with(Opcode::Ipushv, Operand::Name(name));
                Ok(())
            }
            NodeKind::Assign {
                var,
                index,
                value,
                result_used,
            } => self.gen_assign(var, index, value, result_used, ctx),

            NodeKind::Unary { op, operand } => {
                self.gen_node(operand, ctx)?;
                ctx.emit_named(op.mnemonic());
                Ok(())
            }
            NodeKind::Binary { op, left, right } => self.gen_binary(op, left, right, ctx),
            NodeKind::Cast { operand } => self.gen_cast(operand, node.ty, ctx),
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.gen_ternary(cond, then, otherwise, ctx),
            NodeKind::Call { func, args } => self.gen_call(func, &args, ctx),

            NodeKind::If {
                cond,
                then,
                otherwise,
            } => self.gen_if(cond, then, otherwise, ctx),
            NodeKind::While { cond, body, step } => self.gen_while(cond, body, step, ctx),
            NodeKind::Break { depth } => {
                ctx.emit_loop_exit(LoopExit::Break, depth, node.span.as_ref());
                Ok(())
            }
            NodeKind::Continue { depth } => {
                ctx.emit_loop_exit(LoopExit::Continue, depth, node.span.as_ref());
                Ok(())
            }
            // Inside an inlined body the value stays on the stack as the
            // call's result.
            NodeKind::Return { value } => match value {
                Some(value) => self.gen_node(value, ctx),
                None => Ok(()),
            },

            NodeKind::Illuminate {
                position,
                cone,
                body,
            } => self.gen_illuminate(Some(position), cone, body, ctx),
            NodeKind::Solar { cone, body } => self.gen_illuminate(None, cone, body, ctx),
            NodeKind::Illuminance {
                category,
                position,
                cone,
                body,
            } => self.gen_illuminance(category, position, cone, body, ctx),
            NodeKind::Gather {
                args,
                body,
                otherwise,
            } => self.gen_gather(&args, body, otherwise, ctx),
        }
    }

    /// Whether evaluating `expr` as a statement leaves a value to discard.
    fn leaves_value(&self, expr: NodeId) -> Result<bool, CompileError> {
        let node = self.session.node(expr)?;
        Ok(match node.kind {
            NodeKind::Assign { result_used, .. } => result_used,
            _ => !matches!(node.ty.base, BaseType::Void | BaseType::Nil),
        })
    }

    fn node_type(&self, id: NodeId) -> Result<Type, CompileError> {
        Ok(self.session.node(id)?.ty)
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// Name to emit for an access to `var`, counting the use.
    ///
    /// Translation tables are applied first, then `extern` bindings, then
    /// temp substitution for the resolved variable.
    fn access(&mut self, var: VarRef, ctx: &mut GenContext) -> Result<String, CompileError> {
        let target = self.resolve_target(var, ctx)?;
        let vm_name = self.session.variable(target)?.vm_name.clone();

        if let Some(temp) = ctx.temps.lookup(target) {
            let temp = temp.to_string();
            if let Some(index) = self.session.variables.position(&temp) {
                if let Some(def) = self.session.variables.get_mut(index) {
                    def.use_count += 1;
                }
            }
            return Ok(temp);
        }

        self.session.variable_mut(target)?.use_count += 1;
        if target.kind == RefKind::Standard {
            ctx.mark_uses(target.index);
        }
        Ok(vm_name)
    }

    fn resolve_target(&self, var: VarRef, ctx: &GenContext) -> Result<VarRef, CompileError> {
        let mut target = ctx.translations.resolve(var);
        let limit = self.session.variables.len() + self.session.standard_vars.len();
        let mut hops = 0;
        while let Some(outer) = self.session.variable(target)?.extern_ref {
            hops += 1;
            if hops > limit {
                return Err(CompileError::UnresolvedVariable(var));
            }
            target = outer;
        }
        Ok(target)
    }

    fn gen_assign(
        &mut self,
        var: VarRef,
        index: Option<NodeId>,
        value: NodeId,
        result_used: bool,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        self.gen_node(value, ctx)?;
        if result_used {
            ctx.emit_op(Opcode::Dup);
        }
        match index {
            Some(index) => {
                self.gen_node(index, ctx)?;
                let name = self.access(var, ctx)?;
                ctx.emit_with(Opcode::Ipop, Operand::Name(name));
            }
            None => {
                let name = self.access(var, ctx)?;
                ctx.emit_with(Opcode::Pop, Operand::Name(name));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn gen_binary(
        &mut self,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        let left_ty = self.node_type(left)?;
        let right_ty = self.node_type(right)?;
        self.gen_node(left, ctx)?;
        self.gen_node(right, ctx)?;
        if op.is_logical() {
            ctx.emit_named(op.mnemonic());
        } else {
            ctx.emit_named(format!(
                "{}{}{}",
                op.mnemonic(),
                left_ty.identifier(),
                right_ty.identifier()
            ));
        }
        Ok(())
    }

    fn gen_cast(
        &mut self,
        operand: NodeId,
        to: Type,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        let from = self.node_type(operand)?;
        self.gen_node(operand, ctx)?;
        if needs_conversion(from.base, to.base) {
            ctx.emit_named(format!("set{}{}", from.identifier(), to.identifier()));
        }
        Ok(())
    }

    fn gen_ternary(
        &mut self,
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        let result_ty = self.node_type(then)?;
        ctx.emit_op(Opcode::SClear);
        self.gen_node(cond, ctx)?;
        ctx.emit_op(Opcode::Dup);
        ctx.push_condition();
        self.gen_node(then, ctx)?;
        ctx.emit_op(Opcode::RsInverse);
        self.gen_node(otherwise, ctx)?;
        ctx.rs_pop();
        ctx.emit_named(format!("merge{}", result_ty.identifier()));
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn gen_call(
        &mut self,
        func: FuncRef,
        args: &[NodeId],
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        let def = self.session.function(func)?.clone();
        match def.linkage {
            Linkage::Local => self.inline_call(func, &def, args, ctx)?,
            Linkage::Builtin | Linkage::External => self.builtin_call(&def, args, ctx)?,
        }
        self.session.function_mut(func)?.internal_usage += 1;
        Ok(())
    }

    fn builtin_call(
        &mut self,
        def: &FunctionDef,
        args: &[NodeId],
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        for arg in args.iter().rev() {
            self.gen_node(*arg, ctx)?;
        }
        if def.is_variadic() {
            let extra = (args.len() as i32 - def.var_length).max(0);
            ctx.emit_with(Opcode::Pushif, Operand::Float(extra as f32));
        }
        match def.linkage {
            Linkage::External => ctx.emit_with(
                Opcode::External,
                Operand::Raw(format!(
                    "\"{}\" \"{}\" \"{}\"",
                    def.vm_name,
                    def.ty.identifier(),
                    def.param_types
                )),
            ),
            _ => ctx.emit_named(def.vm_name.clone()),
        }
        Ok(())
    }

    /// Expand a local function at the call site.
    fn inline_call(
        &mut self,
        func: FuncRef,
        def: &FunctionDef,
        args: &[NodeId],
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        if ctx.inline_stack.contains(&func) {
            return Err(CompileError::RecursiveInline(def.name.clone()));
        }
        if args.len() != def.formals.len() {
            return Err(CompileError::ArityMismatch {
                name: def.name.clone(),
                expected: def.formals.len(),
                found: args.len(),
            });
        }
        let body = def
            .body
            .ok_or_else(|| CompileError::MissingBody(def.name.clone()))?;

        // Arguments are evaluated in the caller's scope, before the new
        // level is pushed.
        let depth = ctx.temps.depth() + 1;
        let mut table = TranslationTable::new();
        let mut temps = HashMap::new();
        for (&formal, &arg) in def.formals.iter().zip(args) {
            let bare = match self.session.node(arg)?.kind {
                NodeKind::Variable { var } => Some(var),
                _ => None,
            };
            match bare {
                Some(actual) => {
                    let target = self.resolve_target(actual, ctx)?;
                    table.push(formal, target);
                }
                None => {
                    self.gen_node(arg, ctx)?;
                    let (temp_ref, temp) = self.temp_variable(depth, formal)?;
                    self.session.variable_mut(temp_ref)?.use_count += 1;
                    ctx.emit_with(Opcode::Pop, Operand::Name(temp.clone()));
                    temps.insert(formal, temp);
                }
            }
        }

        debug!(
            function = %def.name,
            depth,
            redirected = table.len(),
            temps = temps.len(),
            "inlining call"
        );
        ctx.translations.push(table);
        ctx.temps.push(temps);
        ctx.inline_stack.push(func);

        let result = self.gen_node(body, ctx);

        ctx.inline_stack.pop();
        ctx.temps.pop();
        ctx.translations.pop();
        result
    }

    /// The temp holding the computed actual of `formal` at `depth`.
    ///
    /// An existing temp is reused only when its type and array length match
    /// the formal's; otherwise the formal's registry index is appended to the
    /// name.
    fn temp_variable(
        &mut self,
        depth: usize,
        formal: VarRef,
    ) -> Result<(VarRef, String), CompileError> {
        let formal_def = self.session.variable(formal)?.clone();
        let ty = formal_def
            .ty
            .without(TypeQualifiers::PARAM | TypeQualifiers::OUTPUT);

        let candidates = [
            temp_name(depth, &formal_def.name),
            qualified_temp_name(depth, &formal_def.name, formal.index),
        ];
        for name in candidates {
            match self.session.variables.position(&name) {
                Some(index) => {
                    let existing = &self.session.variables[index];
                    if existing.ty == ty && existing.array_len == formal_def.array_len {
                        return Ok((VarRef::local(index), name));
                    }
                }
                None => {
                    let mut def = VariableDef::new(name.clone(), ty);
                    def.array_len = formal_def.array_len;
                    def.use_count = formal_def.use_count;
                    return Ok((self.session.add_variable(def), name));
                }
            }
        }
        // The unit declares variables with temp-shaped names.
        Err(CompileError::TempNameClash(temp_name(depth, &formal_def.name)))
    }

    // ========================================================================
    // Conditionals & loops
    // ========================================================================

    fn gen_if(
        &mut self,
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        ctx.emit_op(Opcode::SClear);
        self.gen_node(cond, ctx)?;
        ctx.push_condition();

        let skip_then = ctx.new_label();
        ctx.emit_with(Opcode::RsJz, Operand::Label(skip_then));
        self.gen_node(then, ctx)?;
        ctx.place_label(skip_then);

        if let Some(otherwise) = otherwise {
            let skip_else = ctx.new_label();
            ctx.emit_op(Opcode::RsInverse);
            ctx.emit_with(Opcode::RsJz, Operand::Label(skip_else));
            self.gen_node(otherwise, ctx)?;
            ctx.place_label(skip_else);
        }

        ctx.rs_pop();
        Ok(())
    }

    /// `while` and `for`. The outer level holds the points still looping,
    /// the inner one the points that have not hit `continue` this pass.
    fn gen_while(
        &mut self,
        cond: NodeId,
        body: NodeId,
        step: Option<NodeId>,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        ctx.enter_breakable();
        ctx.rs_push();

        let top = ctx.new_label();
        let exit = ctx.new_label();
        ctx.place_label(top);
        ctx.emit_op(Opcode::SClear);
        self.gen_node(cond, ctx)?;
        ctx.emit_op(Opcode::SGet);
        ctx.emit_with(Opcode::SJz, Operand::Label(exit));
        ctx.emit_op(Opcode::RsGet);

        ctx.rs_push();
        self.gen_node(body, ctx)?;
        ctx.rs_pop();

        if let Some(step) = step {
            self.gen_node(step, ctx)?;
        }
        ctx.emit_with(Opcode::Jmp, Operand::Label(top));
        ctx.place_label(exit);

        ctx.rs_pop();
        ctx.leave_breakable();
        Ok(())
    }

    // ========================================================================
    // Light constructs
    // ========================================================================

    /// `illuminate` when `position` is given, `solar` otherwise.
    fn gen_illuminate(
        &mut self,
        position: Option<NodeId>,
        cone: Option<Cone>,
        body: NodeId,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        let mut args: Vec<NodeId> = position.into_iter().collect();
        args.extend(cone_args(cone));

        ctx.emit_op(Opcode::SClear);
        for arg in args.into_iter().rev() {
            self.gen_node(arg, ctx)?;
        }
        let op = match (position.is_some(), cone.is_some()) {
            (true, false) => Opcode::Illuminate,
            (true, true) => Opcode::Illuminate2,
            (false, false) => Opcode::Solar,
            (false, true) => Opcode::Solar2,
        };
        ctx.emit_op(op);
        ctx.push_condition();

        let skip = ctx.new_label();
        ctx.emit_with(Opcode::RsJz, Operand::Label(skip));
        self.gen_node(body, ctx)?;
        ctx.place_label(skip);
        ctx.rs_pop();
        Ok(())
    }

    /// Loops over the light sources visible from `position`.
    fn gen_illuminance(
        &mut self,
        category: Option<NodeId>,
        position: NodeId,
        cone: Option<Cone>,
        body: NodeId,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        ctx.enter_breakable();
        let top = ctx.new_label();
        let exit = ctx.new_label();
        let skip = ctx.new_label();

        ctx.emit_op(Opcode::InitIlluminance);
        ctx.emit_with(Opcode::Jz, Operand::Label(exit));
        ctx.place_label(top);
        ctx.emit_op(Opcode::SClear);

        let mut args = vec![position];
        args.extend(cone_args(cone));
        for arg in args.into_iter().rev() {
            self.gen_node(arg, ctx)?;
        }
        match category {
            Some(category) => self.gen_node(category, ctx)?,
            None => ctx.emit_with(Opcode::Pushis, Operand::Str(String::new())),
        }
        ctx.emit_op(if cone.is_some() {
            Opcode::Illuminance2
        } else {
            Opcode::Illuminance
        });
        ctx.push_condition();

        ctx.emit_with(Opcode::RsJz, Operand::Label(skip));
        self.gen_node(body, ctx)?;
        ctx.place_label(skip);
        ctx.rs_pop();

        ctx.emit_op(Opcode::AdvanceIlluminance);
        ctx.emit_with(Opcode::Jnz, Operand::Label(top));
        ctx.place_label(exit);
        ctx.leave_breakable();
        Ok(())
    }

    /// Loops over ray samples; the optional `else` runs for the misses.
    fn gen_gather(
        &mut self,
        args: &[NodeId],
        body: NodeId,
        otherwise: Option<NodeId>,
        ctx: &mut GenContext,
    ) -> Result<(), CompileError> {
        ctx.enter_breakable();
        for arg in args.iter().rev() {
            self.gen_node(*arg, ctx)?;
        }
        let extra = args.len().saturating_sub(GATHER_FIXED_ARGS);
        ctx.emit_with(Opcode::Pushif, Operand::Float(extra as f32));

        let top = ctx.new_label();
        let exit = ctx.new_label();
        ctx.emit_op(Opcode::InitGather);
        ctx.emit_with(Opcode::Jz, Operand::Label(exit));
        ctx.place_label(top);
        ctx.emit_op(Opcode::SClear);
        ctx.emit_op(Opcode::Gather);
        ctx.push_condition();

        self.gen_node(body, ctx)?;
        if let Some(otherwise) = otherwise {
            ctx.emit_op(Opcode::RsInverse);
            self.gen_node(otherwise, ctx)?;
        }
        ctx.rs_pop();

        ctx.emit_op(Opcode::AdvanceGather);
        ctx.emit_with(Opcode::Jnz, Operand::Label(top));
        ctx.place_label(exit);
        ctx.leave_breakable();
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `gather(category, P, dir, angle, samples, ...)`.
const GATHER_FIXED_ARGS: usize = 5;

fn cone_args(cone: Option<Cone>) -> Vec<NodeId> {
    cone.map(|c| vec![c.axis, c.angle]).unwrap_or_default()
}

/// Point, normal and vector share a representation.
fn needs_conversion(from: BaseType, to: BaseType) -> bool {
    from != to && !(from.is_point_family() && to.is_point_family())
}

// ============================================================================
// Tests
// ============================================================================
