pub mod config;
pub mod errors;
pub mod slx;
pub mod slx_opcodes;
pub mod span;

pub use config::{CompilerConfig, ConfigError};
pub use errors::{Diagnostic, DiagnosticBag, Severity};
pub use slx::{
    DataDecl, Instruction, Line, Mnemonic, Operand, ShaderClass, SlxProgram, StorageClass,
    DEFAULT_SLX_VERSION,
};
pub use slx_opcodes::Opcode;
pub use span::Span;
