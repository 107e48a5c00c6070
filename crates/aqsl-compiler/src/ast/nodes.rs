use aqsl_common::{ShaderClass, Span};
use serde::{Deserialize, Serialize};

use crate::semantic::symbols::{FuncRef, VarRef};
use crate::semantic::types::Type;

// ============================================================================
// Arena
// ============================================================================

/// Index of a node in an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node #{}", self.0)
    }
}

/// A semantically analyzed shader tree.
///
/// Nodes live in a flat arena and refer to their children by [`NodeId`];
/// there are no parent links. The tree is produced by the front end and only
/// read by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `id` in left-to-right source order. Unknown ids have none.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.get(id) {
            Some(node) => node.kind.children(),
            None => Vec::new(),
        }
    }
}

/// One AST node: what it is, what it evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Result type; `void` for statements.
    #[serde(rename = "type", default = "void_type")]
    pub ty: Type,
    /// Whether the result may differ per shading point.
    #[serde(default)]
    pub varying: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

fn void_type() -> Type {
    Type::VOID
}

impl Node {
    pub fn new(kind: NodeKind, ty: Type) -> Self {
        Self {
            kind,
            varying: ty.is_varying(),
            ty,
            span: None,
        }
    }

    pub fn statement(kind: NodeKind) -> Self {
        Self::new(kind, Type::VOID)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Dot,
    Cross,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Opcode stem; typed ops get operand identifiers appended.
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Dot => "dot",
            BinaryOp::Cross => "crs",
            BinaryOp::Lt => "ls",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::And => "land",
            BinaryOp::Or => "lor",
        }
    }

    /// Logical operators act on the boolean state and carry no type suffix.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "lnot",
        }
    }
}

/// Optional `(axis, angle)` restriction of a light construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cone {
    pub axis: NodeId,
    pub angle: NodeId,
}

// ============================================================================
// Node kinds
// ============================================================================

/// Every construct the code generator understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    /// Root: `surface plastic(params) { body }`.
    Shader {
        class: ShaderClass,
        name: String,
        #[serde(default)]
        params: Vec<VarRef>,
        body: NodeId,
    },
    StatementList {
        #[serde(default)]
        statements: Vec<NodeId>,
    },
    /// An expression evaluated for its side effects.
    ExprStatement {
        expr: NodeId,
    },

    // -- Literals --
    FloatConst {
        value: f32,
    },
    StringConst {
        value: String,
    },
    /// `(a, b, c)` or a sixteen-component matrix literal.
    Tuple {
        components: Vec<NodeId>,
    },

    // -- Variables --
    Variable {
        var: VarRef,
    },
    ArrayElement {
        var: VarRef,
        index: NodeId,
    },
    Assign {
        var: VarRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<NodeId>,
        value: NodeId,
        /// The enclosing expression consumes the assigned value.
        #[serde(default)]
        result_used: bool,
    },

    // -- Operators --
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    /// Conversion of `operand` to this node's type.
    Cast {
        operand: NodeId,
    },
    Ternary {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    Call {
        func: FuncRef,
        #[serde(default)]
        args: Vec<NodeId>,
    },

    // -- Control flow --
    If {
        cond: NodeId,
        then: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<NodeId>,
    },
    /// `while` and desugared `for` loops.
    While {
        cond: NodeId,
        body: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<NodeId>,
    },
    Break {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<u32>,
    },
    Continue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<u32>,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<NodeId>,
    },

    // -- Light constructs --
    Illuminate {
        position: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cone: Option<Cone>,
        body: NodeId,
    },
    Illuminance {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<NodeId>,
        position: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cone: Option<Cone>,
        body: NodeId,
    },
    Solar {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cone: Option<Cone>,
        body: NodeId,
    },
    /// `gather(category, P, dir, angle, samples, ...) hit [else miss]`.
    Gather {
        args: Vec<NodeId>,
        body: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<NodeId>,
    },
}

impl NodeKind {
    /// Direct children in left-to-right order.
    pub fn children(&self) -> Vec<NodeId> {
        fn cone_ids(cone: &Option<Cone>) -> Vec<NodeId> {
            cone.map(|c| vec![c.axis, c.angle]).unwrap_or_default()
        }

        match self {
            NodeKind::Shader { body, .. } => vec![*body],
            NodeKind::StatementList { statements } => statements.clone(),
            NodeKind::ExprStatement { expr } => vec![*expr],
            NodeKind::FloatConst { .. }
            | NodeKind::StringConst { .. }
            | NodeKind::Variable { .. }
            | NodeKind::Break { .. }
            | NodeKind::Continue { .. } => Vec::new(),
            NodeKind::Tuple { components } => components.clone(),
            NodeKind::ArrayElement { index, .. } => vec![*index],
            NodeKind::Assign { index, value, .. } => {
                let mut ids: Vec<NodeId> = index.iter().copied().collect();
                ids.push(*value);
                ids
            }
            NodeKind::Unary { operand, .. } | NodeKind::Cast { operand } => vec![*operand],
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            } => vec![*cond, *then, *otherwise],
            NodeKind::Call { args, .. } => args.clone(),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let mut ids = vec![*cond, *then];
                ids.extend(otherwise.iter().copied());
                ids
            }
            NodeKind::While { cond, body, step } => {
                let mut ids = vec![*cond, *body];
                ids.extend(step.iter().copied());
                ids
            }
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Illuminate {
                position,
                cone,
                body,
            } => {
                let mut ids = vec![*position];
                ids.extend(cone_ids(cone));
                ids.push(*body);
                ids
            }
            NodeKind::Illuminance {
                category,
                position,
                cone,
                body,
            } => {
                let mut ids: Vec<NodeId> = category.iter().copied().collect();
                ids.push(*position);
                ids.extend(cone_ids(cone));
                ids.push(*body);
                ids
            }
            NodeKind::Solar { cone, body } => {
                let mut ids = cone_ids(cone);
                ids.push(*body);
                ids
            }
            NodeKind::Gather {
                args,
                body,
                otherwise,
            } => {
                let mut ids = args.clone();
                ids.push(*body);
                ids.extend(otherwise.iter().copied());
                ids
            }
        }
    }

    /// Short name for diagnostics and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::Shader { .. } => "shader",
            NodeKind::StatementList { .. } => "statement list",
            NodeKind::ExprStatement { .. } => "expression statement",
            NodeKind::FloatConst { .. } => "float constant",
            NodeKind::StringConst { .. } => "string constant",
            NodeKind::Tuple { .. } => "tuple",
            NodeKind::Variable { .. } => "variable",
            NodeKind::ArrayElement { .. } => "array element",
            NodeKind::Assign { .. } => "assignment",
            NodeKind::Unary { .. } => "unary operator",
            NodeKind::Binary { .. } => "binary operator",
            NodeKind::Cast { .. } => "cast",
            NodeKind::Ternary { .. } => "conditional expression",
            NodeKind::Call { .. } => "function call",
            NodeKind::If { .. } => "if",
            NodeKind::While { .. } => "while",
            NodeKind::Break { .. } => "break",
            NodeKind::Continue { .. } => "continue",
            NodeKind::Return { .. } => "return",
            NodeKind::Illuminate { .. } => "illuminate",
            NodeKind::Illuminance { .. } => "illuminance",
            NodeKind::Solar { .. } => "solar",
            NodeKind::Gather { .. } => "gather",
        }
    }
}
