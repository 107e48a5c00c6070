use std::collections::HashSet;

use aqsl_common::{Diagnostic, DiagnosticBag, Span};

use crate::ast::{Ast, NodeId, NodeKind, Visitor};
use crate::semantic::symbols::{FuncRef, VarRef};
use crate::session::CompilationSession;

/// Reference validation pass.
///
/// Walks everything the generator will walk and checks that it resolves:
///  - variable references, including `extern` bindings;
///  - function calls, and for local functions the formals, the body and
///    the argument count;
///  - shader parameter default expressions;
///  - child ids that point outside the arena.
///
/// Each local function body is visited once, however often it is called.
pub struct ReferenceValidator<'a> {
    session: &'a CompilationSession,
    diagnostics: DiagnosticBag,
    visited_bodies: HashSet<FuncRef>,
    pending: Vec<NodeId>,
}

impl<'a> ReferenceValidator<'a> {
    pub fn new(session: &'a CompilationSession) -> Self {
        Self {
            session,
            diagnostics: DiagnosticBag::new(),
            visited_bodies: HashSet::new(),
            pending: Vec::new(),
        }
    }

    pub fn validate(mut self) -> DiagnosticBag {
        let session = self.session;
        let ast = &session.ast;
        let root = session.root;

        match ast.get(root) {
            None => {
                self.diagnostics
                    .report(Diagnostic::error(format!("shader root {} is missing", root)));
                return self.diagnostics;
            }
            Some(node) if !matches!(node.kind, NodeKind::Shader { .. }) => {
                self.diagnostics.report(
                    Diagnostic::error(format!(
                        "shader root {} is a {}, not a shader definition",
                        root,
                        node.kind.describe()
                    ))
                    .at(node.span.as_ref()),
                );
                return self.diagnostics;
            }
            Some(_) => {}
        }

        self.visit_node(ast, root);
        while let Some(next) = self.pending.pop() {
            self.visit_node(ast, next);
        }
        self.diagnostics
    }

    fn span(&self, node: NodeId) -> Option<&'a Span> {
        let session = self.session;
        session.ast.get(node).and_then(|n| n.span.as_ref())
    }

    fn error_at(&mut self, node: NodeId, message: String) {
        let span = self.span(node);
        self.diagnostics.report(Diagnostic::error(message).at(span));
    }
}

impl Visitor for ReferenceValidator<'_> {
    fn visit_var_ref(&mut self, ast: &Ast, node: NodeId, var: VarRef) {
        let session = self.session;
        let def = match session.variable(var) {
            Ok(def) => def,
            Err(_) => {
                let what = ast.get(node).map_or("node", |n| n.kind.describe());
                self.error_at(node, format!("{} refers to unknown {}", what, var));
                return;
            }
        };

        if let Some(outer) = def.extern_ref {
            if session.variable(outer).is_err() {
                self.error_at(
                    node,
                    format!("extern `{}` is bound to unknown {}", def.name, outer),
                );
            }
        }

        let is_shader = ast
            .get(node)
            .is_some_and(|n| matches!(n.kind, NodeKind::Shader { .. }));
        if is_shader {
            if let Some(init) = def.initializer {
                self.pending.push(init);
            }
        }
    }

    fn visit_func_ref(&mut self, ast: &Ast, node: NodeId, func: FuncRef) {
        let session = self.session;
        let def = match session.function(func) {
            Ok(def) => def,
            Err(_) => {
                self.error_at(node, format!("call to unknown {}", func));
                return;
            }
        };
        if !def.is_local() {
            return;
        }

        let found = match ast.get(node).map(|n| &n.kind) {
            Some(NodeKind::Call { args, .. }) => args.len(),
            _ => 0,
        };
        if found != def.formals.len() {
            let span = self.span(node);
            self.diagnostics.report(
                Diagnostic::error(format!(
                    "`{}` expects {} argument(s) but {} were supplied",
                    def.name,
                    def.formals.len(),
                    found
                ))
                .at(span)
                .with_note("local functions are inlined, so every call must match the definition"),
            );
        }

        for formal in &def.formals {
            if session.variable(*formal).is_err() {
                self.error_at(
                    node,
                    format!("parameter of `{}` refers to unknown {}", def.name, formal),
                );
            }
        }

        match def.body {
            None => self.error_at(node, format!("local function `{}` has no body", def.name)),
            Some(body) => {
                if self.visited_bodies.insert(func) {
                    self.pending.push(body);
                }
            }
        }
    }

    fn visit_missing(&mut self, id: NodeId) {
        self.diagnostics
            .report(Diagnostic::error(format!("{} is referenced but missing", id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::symbols::{FunctionDef, VariableDef};
    use crate::semantic::types::{BaseType, Type};
    use aqsl_common::ShaderClass;

    fn float() -> Type {
        Type::varying(BaseType::Float)
    }

    fn shader_with(body: Vec<NodeId>, mut ast: Ast) -> CompilationSession {
        let block = ast.block(body);
        let root = ast.shader(ShaderClass::Surface, "test", vec![], block);
        CompilationSession::new(ast, root)
    }

    #[test]
    fn clean_shader_has_no_diagnostics() {
        let mut ast = Ast::new();
        let one = ast.float(1.0);
        let stmt = ast.assign(VarRef::standard(17), one);
        let session = shader_with(vec![stmt], ast);
        let diags = ReferenceValidator::new(&session).validate();
        assert!(diags.is_empty(), "{:?}", diags.diagnostics());
    }

    #[test]
    fn every_unresolved_reference_is_reported() {
        let mut ast = Ast::new();
        let x = ast.var(VarRef::local(7), float());
        let stmt = ast.assign(VarRef::local(9), x);
        let call = ast.call(FuncRef::standard(3), vec![], Type::VOID);
        let call_stmt = ast.expr_stmt(call);
        let session = shader_with(vec![stmt, call_stmt], ast);
        let diags = ReferenceValidator::new(&session).validate();
        assert_eq!(diags.error_count(), 3);
    }

    #[test]
    fn local_function_arity_and_body_are_checked_once() {
        let mut ast = Ast::new();
        let mut session = CompilationSession::new(Ast::new(), NodeId(0));
        let a = session.add_variable(VariableDef::new("a", float()));
        let a_read = ast.var(a, float());
        let ret = ast.return_stmt(Some(a_read));
        let body = ast.block(vec![ret]);
        let sq = session.add_function(FunctionDef::local("sq", float(), vec![a], body));

        let arg = ast.float(2.0);
        let good = ast.call(sq, vec![arg], float());
        let good_stmt = ast.expr_stmt(good);
        let bad = ast.call(sq, vec![], float());
        let bad_stmt = ast.expr_stmt(bad);
        let block = ast.block(vec![good_stmt, bad_stmt]);
        let root = ast.shader(ShaderClass::Surface, "test", vec![], block);
        session.ast = ast;
        session.set_root(root);

        let diags = ReferenceValidator::new(&session).validate();
        assert_eq!(diags.error_count(), 1);
        assert!(diags.diagnostics()[0].message.contains("expects 1 argument"));
    }

    #[test]
    fn parameter_defaults_are_walked() {
        let mut ast = Ast::new();
        let broken = ast.var(VarRef::local(40), float());
        let mut session = CompilationSession::new(Ast::new(), NodeId(0));
        let kd = session.add_variable(
            VariableDef::new("Kd", Type::uniform(BaseType::Float)).with_initializer(broken),
        );
        let body = ast.block(vec![]);
        let root = ast.shader(ShaderClass::Surface, "test", vec![kd], body);
        session.ast = ast;
        session.set_root(root);

        let diags = ReferenceValidator::new(&session).validate();
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn non_shader_root_is_rejected() {
        let mut ast = Ast::new();
        let root = ast.float(0.0);
        let session = CompilationSession::new(ast, root);
        let diags = ReferenceValidator::new(&session).validate();
        assert!(diags.has_errors());
    }
}
