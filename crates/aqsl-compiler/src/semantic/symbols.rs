use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{BaseType, Type, TypeQualifiers};
use crate::ast::NodeId;

/// Which registry a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// Predefined: standard environment variables, builtin functions.
    Standard,
    /// Declared by the shader source.
    Local,
}

/// Indirect handle to a variable definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub kind: RefKind,
    pub index: usize,
}

impl VarRef {
    pub fn standard(index: usize) -> Self {
        Self {
            kind: RefKind::Standard,
            index,
        }
    }

    pub fn local(index: usize) -> Self {
        Self {
            kind: RefKind::Local,
            index,
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RefKind::Standard => write!(f, "standard variable #{}", self.index),
            RefKind::Local => write!(f, "variable #{}", self.index),
        }
    }
}

/// Indirect handle to a function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncRef {
    pub kind: RefKind,
    pub index: usize,
}

impl FuncRef {
    pub fn standard(index: usize) -> Self {
        Self {
            kind: RefKind::Standard,
            index,
        }
    }

    pub fn local(index: usize) -> Self {
        Self {
            kind: RefKind::Local,
            index,
        }
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RefKind::Standard => write!(f, "builtin function #{}", self.index),
            RefKind::Local => write!(f, "function #{}", self.index),
        }
    }
}

/// A variable known to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    /// Name written into the program; defaults to `name`.
    #[serde(default)]
    pub vm_name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    /// 0 for scalars.
    #[serde(default)]
    pub array_len: u32,
    #[serde(default)]
    pub use_count: u32,
    /// Default value expression for shader parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<NodeId>,
    /// `extern` declarations inside functions bind to an outer variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extern_ref: Option<VarRef>,
}

impl VariableDef {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        let name = name.into();
        Self {
            vm_name: name.clone(),
            name,
            ty,
            array_len: 0,
            use_count: 0,
            initializer: None,
            extern_ref: None,
        }
    }

    pub fn with_vm_name(mut self, vm_name: impl Into<String>) -> Self {
        self.vm_name = vm_name.into();
        self
    }

    pub fn array(mut self, len: u32) -> Self {
        self.array_len = len;
        self.ty = self.ty.with(TypeQualifiers::ARRAY);
        self
    }

    pub fn with_initializer(mut self, init: NodeId) -> Self {
        self.initializer = Some(init);
        self
    }

    pub fn bound_to(mut self, outer: VarRef) -> Self {
        self.extern_ref = Some(outer);
        self
    }

    pub fn is_param(&self) -> bool {
        self.ty.has(TypeQualifiers::PARAM)
    }

    fn fill_vm_name(&mut self) {
        if self.vm_name.is_empty() {
            self.vm_name = self.name.clone();
        }
    }
}

/// How calls to a function are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// VM shadeop called by name.
    Builtin,
    /// Unknown arity, declared with `external` and bound by the VM loader.
    External,
    /// User-defined; always inlined.
    Local,
}

/// A function known to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub vm_name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    /// One type identifier per fixed parameter, e.g. `"fpp"`.
    #[serde(default)]
    pub param_types: String,
    pub linkage: Linkage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<NodeId>,
    #[serde(default)]
    pub formals: Vec<VarRef>,
    /// Number of fixed arguments of a variadic function, -1 when fixed arity.
    #[serde(default = "fixed_arity")]
    pub var_length: i32,
    #[serde(default)]
    pub varying: bool,
    #[serde(default)]
    pub internal_usage: u32,
}

fn fixed_arity() -> i32 {
    -1
}

impl FunctionDef {
    pub fn builtin(name: impl Into<String>, ty: Type, param_types: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            vm_name: name.clone(),
            name,
            ty,
            param_types: param_types.into(),
            linkage: Linkage::Builtin,
            body: None,
            formals: Vec::new(),
            var_length: fixed_arity(),
            varying: false,
            internal_usage: 0,
        }
    }

    pub fn external(name: impl Into<String>, ty: Type, param_types: impl Into<String>) -> Self {
        Self {
            linkage: Linkage::External,
            ..Self::builtin(name, ty, param_types)
        }
    }

    pub fn local(name: impl Into<String>, ty: Type, formals: Vec<VarRef>, body: NodeId) -> Self {
        Self {
            linkage: Linkage::Local,
            formals,
            body: Some(body),
            ..Self::builtin(name, ty, "")
        }
    }

    /// Mark as variadic after `fixed` leading arguments.
    pub fn variadic(mut self, fixed: i32) -> Self {
        self.var_length = fixed;
        self
    }

    pub fn is_local(&self) -> bool {
        self.linkage == Linkage::Local
    }

    pub fn is_variadic(&self) -> bool {
        self.var_length >= 0
    }

    fn fill_vm_name(&mut self) {
        if self.vm_name.is_empty() {
            self.vm_name = self.name.clone();
        }
    }
}

/// Definitions that can be looked up by name in a [`Registry`].
pub trait Named {
    fn registry_name(&self) -> &str;
    fn normalize(&mut self) {}
}

impl Named for VariableDef {
    fn registry_name(&self) -> &str {
        &self.vm_name
    }

    fn normalize(&mut self) {
        self.fill_vm_name();
    }
}

impl Named for FunctionDef {
    fn registry_name(&self) -> &str {
        &self.vm_name
    }

    fn normalize(&mut self) {
        self.fill_vm_name();
    }
}

/// Append-only arena of definitions addressed by position.
///
/// Indexing with `[]` past the end panics; it means a reference was built
/// against a different registry. Use [`Registry::get`] where a miss must be
/// reported instead.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    items: Vec<T>,
    by_name: HashMap<String, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<T: Named> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition, returning its index. The first definition of a
    /// name wins name lookups.
    pub fn push(&mut self, mut item: T) -> usize {
        item.normalize();
        let index = self.items.len();
        self.by_name
            .entry(item.registry_name().to_string())
            .or_insert(index);
        self.items.push(item);
        index
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Index of the definition emitted under `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Named> FromIterator<T> for Registry<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut registry = Registry::new();
        for item in iter {
            registry.push(item);
        }
        registry
    }
}

impl<T> std::ops::Index<usize> for Registry<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

/// The predefined shading environment. Position is the bit in `USES`.
pub const STANDARD_VARIABLES: [(&str, BaseType, bool); 26] = [
    ("Cs", BaseType::Color, true),
    ("Os", BaseType::Color, true),
    ("Ng", BaseType::Normal, true),
    ("du", BaseType::Float, true),
    ("dv", BaseType::Float, true),
    ("L", BaseType::Vector, true),
    ("Cl", BaseType::Color, true),
    ("Ol", BaseType::Color, true),
    ("P", BaseType::Point, true),
    ("dPdu", BaseType::Vector, true),
    ("dPdv", BaseType::Vector, true),
    ("N", BaseType::Normal, true),
    ("u", BaseType::Float, true),
    ("v", BaseType::Float, true),
    ("s", BaseType::Float, true),
    ("t", BaseType::Float, true),
    ("I", BaseType::Vector, true),
    ("Ci", BaseType::Color, true),
    ("Oi", BaseType::Color, true),
    ("Ps", BaseType::Point, true),
    ("E", BaseType::Point, false),
    ("ncomps", BaseType::Float, false),
    ("time", BaseType::Float, false),
    ("alpha", BaseType::Float, false),
    ("dtime", BaseType::Float, false),
    ("dPdtime", BaseType::Vector, true),
];

/// A fresh registry of the standard variables with zero use counts.
pub fn standard_variables() -> Registry<VariableDef> {
    STANDARD_VARIABLES
        .iter()
        .map(|&(name, base, varying)| {
            let ty = if varying {
                Type::varying(base)
            } else {
                Type::uniform(base)
            };
            VariableDef::new(name, ty)
        })
        .collect()
}
