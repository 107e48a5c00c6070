/// Fixed opcodes of the shader VM.
///
/// Type-suffixed arithmetic (`addff`, `mulpc`), conversions (`setfc`),
/// merges (`mergef`) and builtin calls are spelled at emission time and
/// carried as [`Mnemonic::Named`](crate::slx::Mnemonic::Named); everything the
/// generator needs for stack traffic and running-state control flow is here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // === Stack ===
    /// Push a variable (arg: name).
    Pushv,
    /// Pop an index, push an array element (arg: name).
    Ipushv,
    /// Pop into a variable (arg: name).
    Pop,
    /// Pop an index and a value, store into an array element (arg: name).
    Ipop,
    /// Duplicate the stack top.
    Dup,
    /// Discard the stack top.
    Drop,
    /// Push a float literal (arg: value).
    Pushif,
    /// Push a string literal (arg: quoted string).
    Pushis,

    // === State register ===
    /// Clear the current state.
    SClear,
    /// Pop a boolean into the current state.
    SGet,
    /// Jump if the current state is false for every point (arg: label).
    SJz,

    // === Running state (predicate stack) ===
    /// Push a copy of the running state.
    RsPush,
    /// Pop the running state.
    RsPop,
    /// Copy the current state into the running state.
    RsGet,
    /// Invert the running state against its parent.
    RsInverse,
    /// Jump if the running state is false for every point (arg: label).
    RsJz,
    /// Deactivate points in the given number of running-state levels.
    RsBreak,

    // === Jumps ===
    Jmp,
    Jz,
    Jnz,

    // === Light constructs ===
    Illuminate,
    Illuminate2,
    InitIlluminance,
    Illuminance,
    Illuminance2,
    AdvanceIlluminance,
    Solar,
    Solar2,
    InitGather,
    Gather,
    AdvanceGather,

    // === Linkage ===
    /// Late-bound call resolved by the VM loader
    /// (arg: `"name" "returnTypeId" "paramTypes"`).
    External,

    /// Poison marker written where a statement could not be compiled.
    /// The VM loader rejects it.
    Invalid,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Pushv => "pushv",
            Opcode::Ipushv => "ipushv",
            Opcode::Pop => "pop",
            Opcode::Ipop => "ipop",
            Opcode::Dup => "dup",
            Opcode::Drop => "drop",
            Opcode::Pushif => "pushif",
            Opcode::Pushis => "pushis",
            Opcode::SClear => "S_CLEAR",
            Opcode::SGet => "S_GET",
            Opcode::SJz => "S_JZ",
            Opcode::RsPush => "RS_PUSH",
            Opcode::RsPop => "RS_POP",
            Opcode::RsGet => "RS_GET",
            Opcode::RsInverse => "RS_INVERSE",
            Opcode::RsJz => "RS_JZ",
            Opcode::RsBreak => "RS_BREAK",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Illuminate => "illuminate",
            Opcode::Illuminate2 => "illuminate2",
            Opcode::InitIlluminance => "init_illuminance",
            Opcode::Illuminance => "illuminance",
            Opcode::Illuminance2 => "illuminance2",
            Opcode::AdvanceIlluminance => "advance_illuminance",
            Opcode::Solar => "solar",
            Opcode::Solar2 => "solar2",
            Opcode::InitGather => "init_gather",
            Opcode::Gather => "gather",
            Opcode::AdvanceGather => "advance_gather",
            Opcode::External => "external",
            Opcode::Invalid => "INVALID",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
