pub mod context;
pub mod emitter;
pub mod output;
pub mod running_state;
pub mod translation;

pub use context::GenContext;
pub use emitter::{CodeGenerator, GenOptions};
pub use running_state::LoopExit;
pub use translation::{TempVarStack, TranslationEntry, TranslationStack, TranslationTable};
