//! Reference redirection for inlined local functions.
//!
//! Inlining `sq(x)` makes every read of the formal `a` inside the body read
//! `x` instead; that is a [`TranslationEntry`]. Inlining `sq(x + 1)` first
//! stores `x + 1` into a synthesized temporary and makes `a` read the
//! temporary; that is a [`TempVarStack`] entry. Both stacks grow by one level
//! per active inlined call.

use std::collections::HashMap;

use crate::semantic::symbols::VarRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    pub from: VarRef,
    pub to: VarRef,
}

/// Redirections for one inlined call site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    entries: Vec<TranslationEntry>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, from: VarRef, to: VarRef) {
        self.entries.push(TranslationEntry { from, to });
    }

    pub fn lookup(&self, from: VarRef) -> Option<VarRef> {
        self.entries.iter().find(|e| e.from == from).map(|e| e.to)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranslationStack {
    tables: Vec<TranslationTable>,
}

impl TranslationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: TranslationTable) {
        self.tables.push(table);
    }

    pub fn pop(&mut self) -> Option<TranslationTable> {
        self.tables.pop()
    }

    pub fn depth(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Follow the redirection of the innermost table that mentions `var`.
    ///
    /// Only one redirection is taken. Entries are resolved against the outer
    /// levels when a table is built, so one hop always reaches the target.
    pub fn resolve(&self, var: VarRef) -> VarRef {
        self.tables
            .iter()
            .rev()
            .find_map(|table| table.lookup(var))
            .unwrap_or(var)
    }
}

/// Temp name for the computed actual bound to `formal` at inline depth
/// `depth`, e.g. `_2$radius`.
pub fn temp_name(depth: usize, formal: &str) -> String {
    format!("_{}${}", depth, formal)
}

/// Fallback temp name when `temp_name` is already taken by a temp of a
/// different type: the formal's registry index keeps it unique, e.g.
/// `_1$a$4`.
pub fn qualified_temp_name(depth: usize, formal: &str, formal_index: usize) -> String {
    format!("{}${}", temp_name(depth, formal), formal_index)
}

/// Scoped `{formal -> temp name}` maps, innermost last.
///
/// Keyed by the formal's reference, not its name: nested callees often
/// reuse parameter names.
#[derive(Debug, Clone, Default)]
pub struct TempVarStack {
    scopes: Vec<HashMap<VarRef, String>>,
}

impl TempVarStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: HashMap<VarRef, String>) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) -> Option<HashMap<VarRef, String>> {
        self.scopes.pop()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Temp standing in for `formal`, searching innermost first.
    pub fn lookup(&self, formal: VarRef) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&formal))
            .map(String::as_str)
    }
}
