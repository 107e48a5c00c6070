use aqsl_common::{Diagnostic, DiagnosticBag, Instruction, Line, Opcode, Operand};

use super::translation::{TempVarStack, TranslationStack};
use crate::semantic::symbols::FuncRef;

// ============================================================================
// GenContext
// ============================================================================

/// Traversal state of one code generation pass.
///
/// Threaded through every visit rather than stored on the generator.
#[derive(Debug, Default)]
pub struct GenContext {
    lines: Vec<Line>,
    next_label: u32,
    /// One entry per open breakable construct: running-state levels pushed
    /// since the construct was entered.
    pub(crate) break_depths: Vec<u32>,
    /// Running-state levels currently pushed.
    pub(crate) rs_depth: u32,
    pub translations: TranslationStack,
    pub temps: TempVarStack,
    /// Local functions being inlined, outermost first.
    pub(crate) inline_stack: Vec<FuncRef>,
    uses: u32,
    diagnostics: DiagnosticBag,
}

impl GenContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, instr: Instruction) {
        self.lines.push(Line::Instr(instr));
    }

    pub fn emit_op(&mut self, op: Opcode) {
        self.emit(Instruction::op(op));
    }

    pub fn emit_with(&mut self, op: Opcode, operand: Operand) {
        self.emit(Instruction::op(op).with(operand));
    }

    /// Emit an opcode spelled at run time (typed arithmetic, casts, builtins).
    pub fn emit_named(&mut self, name: impl Into<String>) {
        self.emit(Instruction::named(name));
    }

    /// Allocate the next label number.
    pub fn new_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    pub fn place_label(&mut self, label: u32) {
        self.lines.push(Line::Label(label));
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Take everything emitted so far, leaving the sink empty.
    /// Labels keep counting across segments.
    pub fn take_lines(&mut self) -> Vec<Line> {
        std::mem::take(&mut self.lines)
    }

    /// Record a reference to the standard variable at `index`.
    pub fn mark_uses(&mut self, index: usize) {
        if index < 32 {
            self.uses |= 1 << index;
        }
    }

    pub fn uses(&self) -> u32 {
        self.uses
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }

    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> DiagnosticBag {
        self.diagnostics
    }

    pub fn rs_depth(&self) -> u32 {
        self.rs_depth
    }

    pub fn break_depths(&self) -> &[u32] {
        &self.break_depths
    }

    pub fn inline_depth(&self) -> usize {
        self.inline_stack.len()
    }

    /// True when no construct, inlined call or predicate level is open.
    pub fn is_quiescent(&self) -> bool {
        self.break_depths.is_empty()
            && self.rs_depth == 0
            && self.translations.is_empty()
            && self.temps.is_empty()
            && self.inline_stack.is_empty()
    }
}
