use super::nodes::*;
use crate::semantic::symbols::{FuncRef, VarRef};

/// Visitor over an [`Ast`].
///
/// The default `visit_node` reports the references a node carries and then
/// walks its children left to right; override the hooks to observe
/// references, or `visit_node` to take over traversal.
pub trait Visitor {
    fn visit_node(&mut self, ast: &Ast, id: NodeId) {
        walk_node(self, ast, id);
    }

    /// A variable read or written by `node`. Shader parameters are reported
    /// with the shader node.
    fn visit_var_ref(&mut self, _ast: &Ast, _node: NodeId, _var: VarRef) {}

    /// A function called by `node`.
    fn visit_func_ref(&mut self, _ast: &Ast, _node: NodeId, _func: FuncRef) {}

    /// `id` does not exist in the arena.
    fn visit_missing(&mut self, _id: NodeId) {}
}

/// Report the references held by `id`, then visit each child.
pub fn walk_node<V: Visitor + ?Sized>(visitor: &mut V, ast: &Ast, id: NodeId) {
    let Some(node) = ast.get(id) else {
        visitor.visit_missing(id);
        return;
    };

    match &node.kind {
        NodeKind::Shader { params, .. } => {
            for param in params {
                visitor.visit_var_ref(ast, id, *param);
            }
        }
        NodeKind::Variable { var }
        | NodeKind::ArrayElement { var, .. }
        | NodeKind::Assign { var, .. } => visitor.visit_var_ref(ast, id, *var),
        NodeKind::Call { func, .. } => visitor.visit_func_ref(ast, id, *func),
        _ => {}
    }

    for child in node.kind.children() {
        visitor.visit_node(ast, child);
    }
}
