use aqsl_common::ShaderClass;
use serde::{Deserialize, Serialize};

use crate::ast::{Ast, Node, NodeId, NodeKind};
use crate::error::CompileError;
use crate::semantic::symbols::{
    standard_variables, FuncRef, FunctionDef, RefKind, Registry, VarRef, VariableDef,
};

/// A shader as handed over by the front end: the analyzed tree plus the
/// registries its references point into. Read from JSON by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderUnit {
    pub ast: Ast,
    pub root: NodeId,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub builtins: Vec<FunctionDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    /// Standard variables the front end already counted as used.
    #[serde(default)]
    pub standard_uses: Vec<String>,
    /// The shading-language file the tree was parsed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// Everything one shader compilation owns: the tree, the shader root and
/// the four registries. Build a fresh session per shader; generation
/// mutates use counts.
#[derive(Debug, Clone)]
pub struct CompilationSession {
    pub ast: Ast,
    pub root: NodeId,
    pub standard_vars: Registry<VariableDef>,
    pub variables: Registry<VariableDef>,
    pub builtins: Registry<FunctionDef>,
    pub functions: Registry<FunctionDef>,
    pub source_file: Option<String>,
}

impl CompilationSession {
    /// Session over `ast` with the standard environment and empty user
    /// registries. `root` may be set later with [`set_root`](Self::set_root).
    pub fn new(ast: Ast, root: NodeId) -> Self {
        Self {
            ast,
            root,
            standard_vars: standard_variables(),
            variables: Registry::new(),
            builtins: Registry::new(),
            functions: Registry::new(),
            source_file: None,
        }
    }

    pub fn from_unit(unit: ShaderUnit) -> Self {
        let mut session = Self::new(unit.ast, unit.root);
        session.variables = unit.variables.into_iter().collect();
        session.builtins = unit.builtins.into_iter().collect();
        session.functions = unit.functions.into_iter().collect();
        session.source_file = unit.source_file;
        for name in &unit.standard_uses {
            session.mark_standard_used(name);
        }
        session
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn add_variable(&mut self, def: VariableDef) -> VarRef {
        VarRef::local(self.variables.push(def))
    }

    pub fn add_builtin(&mut self, def: FunctionDef) -> FuncRef {
        FuncRef::standard(self.builtins.push(def))
    }

    pub fn add_function(&mut self, def: FunctionDef) -> FuncRef {
        FuncRef::local(self.functions.push(def))
    }

    /// Reference to a standard variable by name.
    pub fn standard(&self, name: &str) -> Option<VarRef> {
        self.standard_vars.position(name).map(VarRef::standard)
    }

    /// Record a use of a standard variable counted upstream. Unknown names
    /// are ignored.
    pub fn mark_standard_used(&mut self, name: &str) {
        if let Some(index) = self.standard_vars.position(name) {
            if let Some(def) = self.standard_vars.get_mut(index) {
                def.use_count += 1;
            }
        }
    }

    pub fn variable(&self, var: VarRef) -> Result<&VariableDef, CompileError> {
        let registry = match var.kind {
            RefKind::Standard => &self.standard_vars,
            RefKind::Local => &self.variables,
        };
        registry
            .get(var.index)
            .ok_or(CompileError::UnresolvedVariable(var))
    }

    pub fn variable_mut(&mut self, var: VarRef) -> Result<&mut VariableDef, CompileError> {
        let registry = match var.kind {
            RefKind::Standard => &mut self.standard_vars,
            RefKind::Local => &mut self.variables,
        };
        registry
            .get_mut(var.index)
            .ok_or(CompileError::UnresolvedVariable(var))
    }

    pub fn function(&self, func: FuncRef) -> Result<&FunctionDef, CompileError> {
        let registry = match func.kind {
            RefKind::Standard => &self.builtins,
            RefKind::Local => &self.functions,
        };
        registry
            .get(func.index)
            .ok_or(CompileError::UnresolvedFunction(func))
    }

    pub fn function_mut(&mut self, func: FuncRef) -> Result<&mut FunctionDef, CompileError> {
        let registry = match func.kind {
            RefKind::Standard => &mut self.builtins,
            RefKind::Local => &mut self.functions,
        };
        registry
            .get_mut(func.index)
            .ok_or(CompileError::UnresolvedFunction(func))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, CompileError> {
        self.ast.get(id).ok_or(CompileError::MissingNode(id))
    }

    /// Class and name of the shader at `root`.
    pub fn shader_header(&self) -> Result<(ShaderClass, &str), CompileError> {
        match &self.node(self.root)?.kind {
            NodeKind::Shader { class, name, .. } => Ok((*class, name.as_str())),
            _ => Err(CompileError::NotAShader(self.root)),
        }
    }
}
