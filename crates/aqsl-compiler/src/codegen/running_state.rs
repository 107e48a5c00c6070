//! Running-state (predicate stack) bookkeeping.
//!
//! Every `RS_PUSH` the generator writes goes through [`GenContext::rs_push`]
//! and every `RS_POP` through [`GenContext::rs_pop`], so the innermost
//! breakable construct always knows how many levels a `break` has to drop.

use aqsl_common::{Diagnostic, Opcode, Operand, Span};
use tracing::error;

use super::context::GenContext;

/// Which loop-exit statement is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Break,
    Continue,
}

impl LoopExit {
    fn keyword(self) -> &'static str {
        match self {
            LoopExit::Break => "break",
            LoopExit::Continue => "continue",
        }
    }
}

impl GenContext {
    pub fn rs_push(&mut self) {
        self.emit_op(Opcode::RsPush);
        self.rs_depth += 1;
        if let Some(top) = self.break_depths.last_mut() {
            *top += 1;
        }
    }

    pub fn rs_pop(&mut self) {
        self.emit_op(Opcode::RsPop);
        self.rs_depth = self.rs_depth.saturating_sub(1);
        if let Some(top) = self.break_depths.last_mut() {
            *top = top.saturating_sub(1);
        }
    }

    /// `S_GET`, `RS_PUSH`, `RS_GET`: the evaluated condition becomes the
    /// running state of a new level.
    pub fn push_condition(&mut self) {
        self.emit_op(Opcode::SGet);
        self.rs_push();
        self.emit_op(Opcode::RsGet);
    }

    pub fn enter_breakable(&mut self) {
        self.break_depths.push(0);
    }

    pub fn leave_breakable(&mut self) {
        self.break_depths.pop();
    }

    /// Levels `RS_BREAK` must drop to leave `depth` constructs.
    ///
    /// `break n` drops every level pushed since the n-th enclosing construct
    /// was entered; `continue n` drops one fewer, keeping the innermost loop
    /// predicate alive.
    pub fn exit_count(&self, exit: LoopExit, depth: u32) -> Result<u32, String> {
        let open = self.break_depths.len();
        if depth == 0 {
            return Err(format!("`{} 0` does not name an enclosing loop", exit.keyword()));
        }
        if depth as usize > open {
            return Err(format!(
                "`{} {}` needs {} enclosing loops but only {} are open",
                exit.keyword(),
                depth,
                depth,
                open
            ));
        }

        let levels: u32 = self.break_depths[open - depth as usize..].iter().sum();
        Ok(match exit {
            LoopExit::Break => levels,
            LoopExit::Continue => levels.saturating_sub(1),
        })
    }

    /// Emit `RS_BREAK` for a `break`/`continue` statement.
    ///
    /// An impossible depth is an error for the shader: it is reported and an
    /// `INVALID` line takes the place of the `RS_BREAK`.
    pub fn emit_loop_exit(&mut self, exit: LoopExit, depth: Option<u32>, span: Option<&Span>) {
        match self.exit_count(exit, depth.unwrap_or(1)) {
            Ok(count) => self.emit_with(Opcode::RsBreak, Operand::Count(count)),
            Err(message) => {
                error!(%message, "invalid loop exit");
                self.report(Diagnostic::error(message.clone()).at(span));
                self.emit_with(Opcode::Invalid, Operand::Str(message));
            }
        }
    }
}
