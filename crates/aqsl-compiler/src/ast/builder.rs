//! Shorthand constructors for assembling trees by hand, used by adapters
//! that translate a front end's tree and by tests.

use aqsl_common::ShaderClass;

use super::nodes::*;
use crate::semantic::symbols::{FuncRef, VarRef};
use crate::semantic::types::{BaseType, Type};

impl Ast {
    pub fn node(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        self.push(Node::new(kind, ty))
    }

    pub fn stmt(&mut self, kind: NodeKind) -> NodeId {
        self.push(Node::statement(kind))
    }

    pub fn shader(
        &mut self,
        class: ShaderClass,
        name: &str,
        params: Vec<VarRef>,
        body: NodeId,
    ) -> NodeId {
        self.stmt(NodeKind::Shader {
            class,
            name: name.to_string(),
            params,
            body,
        })
    }

    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        self.stmt(NodeKind::StatementList { statements })
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.stmt(NodeKind::ExprStatement { expr })
    }

    pub fn float(&mut self, value: f32) -> NodeId {
        self.node(NodeKind::FloatConst { value }, Type::uniform(BaseType::Float))
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.node(
            NodeKind::StringConst {
                value: value.to_string(),
            },
            Type::uniform(BaseType::String),
        )
    }

    pub fn tuple(&mut self, components: Vec<NodeId>, ty: Type) -> NodeId {
        self.node(NodeKind::Tuple { components }, ty)
    }

    pub fn var(&mut self, var: VarRef, ty: Type) -> NodeId {
        self.node(NodeKind::Variable { var }, ty)
    }

    pub fn element(&mut self, var: VarRef, index: NodeId, ty: Type) -> NodeId {
        self.node(NodeKind::ArrayElement { var, index }, ty)
    }

    /// Assignment statement whose value is discarded.
    pub fn assign(&mut self, var: VarRef, value: NodeId) -> NodeId {
        self.stmt(NodeKind::Assign {
            var,
            index: None,
            value,
            result_used: false,
        })
    }

    /// Assignment used as a value, e.g. `a = b = c`.
    pub fn assign_expr(&mut self, var: VarRef, value: NodeId, ty: Type) -> NodeId {
        self.node(
            NodeKind::Assign {
                var,
                index: None,
                value,
                result_used: true,
            },
            ty,
        )
    }

    pub fn assign_element(&mut self, var: VarRef, index: NodeId, value: NodeId) -> NodeId {
        self.stmt(NodeKind::Assign {
            var,
            index: Some(index),
            value,
            result_used: false,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId, ty: Type) -> NodeId {
        self.node(NodeKind::Unary { op, operand }, ty)
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId, ty: Type) -> NodeId {
        self.node(NodeKind::Binary { op, left, right }, ty)
    }

    pub fn cast(&mut self, operand: NodeId, to: Type) -> NodeId {
        self.node(NodeKind::Cast { operand }, to)
    }

    pub fn ternary(&mut self, cond: NodeId, then: NodeId, otherwise: NodeId, ty: Type) -> NodeId {
        self.node(
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            },
            ty,
        )
    }

    pub fn call(&mut self, func: FuncRef, args: Vec<NodeId>, ty: Type) -> NodeId {
        self.node(NodeKind::Call { func, args }, ty)
    }

    pub fn if_else(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
        self.stmt(NodeKind::If {
            cond,
            then,
            otherwise,
        })
    }

    pub fn while_loop(&mut self, cond: NodeId, body: NodeId, step: Option<NodeId>) -> NodeId {
        self.stmt(NodeKind::While { cond, body, step })
    }

    pub fn break_stmt(&mut self, depth: Option<u32>) -> NodeId {
        self.stmt(NodeKind::Break { depth })
    }

    pub fn continue_stmt(&mut self, depth: Option<u32>) -> NodeId {
        self.stmt(NodeKind::Continue { depth })
    }

    pub fn return_stmt(&mut self, value: Option<NodeId>) -> NodeId {
        self.stmt(NodeKind::Return { value })
    }
}
