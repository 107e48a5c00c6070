use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::slx_opcodes::Opcode;

/// Version written after `AQSIS_V` when no configuration overrides it.
pub const DEFAULT_SLX_VERSION: &str = "1.8.2";

/// A compiled shader program, the output of code generation.
/// Serialized as the textual `.slx` file.
#[derive(Debug, Clone, PartialEq)]
pub struct SlxProgram {
    pub class: ShaderClass,
    pub version: String,
    /// Bitmask of the standard variables the shader touches.
    pub uses: u32,
    pub data: Vec<DataDecl>,
    pub init: Vec<Line>,
    pub code: Vec<Line>,
}

impl SlxProgram {
    /// Write the program in `.slx` text form.
    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self)
    }

    /// Every instruction of the Code segment, labels skipped.
    pub fn code_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.code.iter().filter_map(Line::instruction)
    }
}

impl fmt::Display for SlxProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.class.keyword())?;
        writeln!(f, "AQSIS_V {}", self.version)?;
        writeln!(f)?;
        writeln!(f, "segment Data")?;
        writeln!(f, "USES {}", self.uses)?;
        writeln!(f)?;
        for decl in &self.data {
            writeln!(f, "{}", decl)?;
        }
        writeln!(f, "segment Init")?;
        for line in &self.init {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, "segment Code")?;
        for line in &self.code {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// The shader class named on the first line of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderClass {
    Surface,
    Light,
    Volume,
    Displacement,
    Transformation,
    Imager,
}

impl ShaderClass {
    pub fn keyword(self) -> &'static str {
        match self {
            ShaderClass::Surface => "surface",
            ShaderClass::Light => "light",
            ShaderClass::Volume => "volume",
            ShaderClass::Displacement => "displacement",
            ShaderClass::Transformation => "transformation",
            ShaderClass::Imager => "imager",
        }
    }
}

/// Storage class written in a Data segment declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Uniform,
    Varying,
}

/// One variable declaration of the Data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDecl {
    pub output: bool,
    pub param: bool,
    pub storage: Option<StorageClass>,
    pub type_name: String,
    pub name: String,
    /// 0 for scalars.
    pub array_len: u32,
}

impl fmt::Display for DataDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.output {
            f.write_str("output ")?;
        }
        if self.param {
            f.write_str("param ")?;
        }
        match self.storage {
            Some(StorageClass::Uniform) => f.write_str("uniform ")?,
            Some(StorageClass::Varying) => f.write_str("varying ")?,
            None => {}
        }
        write!(f, "{} {}", self.type_name, self.name)?;
        if self.array_len > 0 {
            write!(f, "[{}]", self.array_len)?;
        }
        Ok(())
    }
}

/// A line of the Init or Code segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Instr(Instruction),
    Label(u32),
}

impl Line {
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            Line::Instr(instr) => Some(instr),
            Line::Label(_) => None,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Instr(instr) => write!(f, "\t{}", instr),
            Line::Label(n) => write!(f, ":{}", n),
        }
    }
}

/// The operation part of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mnemonic {
    Op(Opcode),
    /// Spelled at emission time: typed arithmetic, `set..`, `merge..`,
    /// builtin function names.
    Named(String),
}

impl Mnemonic {
    pub fn as_str(&self) -> &str {
        match self {
            Mnemonic::Op(op) => op.mnemonic(),
            Mnemonic::Named(name) => name,
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single optional operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Variable name.
    Name(String),
    /// Jump target.
    Label(u32),
    /// Predicate level count for `RS_BREAK`.
    Count(u32),
    Float(f32),
    /// String literal, written quoted.
    Str(String),
    /// Preformatted text, written as is.
    Raw(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Name(name) => f.write_str(name),
            Operand::Label(n) | Operand::Count(n) => write!(f, "{}", n),
            Operand::Float(v) => write_float(f, *v),
            Operand::Str(s) => write!(f, "\"{}\"", escape(s)),
            Operand::Raw(text) => f.write_str(text),
        }
    }
}

/// One emitted VM instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Mnemonic,
    pub operand: Option<Operand>,
}

impl Instruction {
    pub fn op(op: Opcode) -> Self {
        Self {
            op: Mnemonic::Op(op),
            operand: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            op: Mnemonic::Named(name.into()),
            operand: None,
        }
    }

    pub fn with(mut self, operand: Operand) -> Self {
        self.operand = Some(operand);
        self
    }

    pub fn is(&self, op: Opcode) -> bool {
        self.op == Mnemonic::Op(op)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if let Some(ref operand) = self.operand {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// Float literals: plain decimals for magnitudes in `[1e-4, 1e7)`, exponent
/// form (`1e20`, `2.5e-6`) outside it. Infinities are clamped to the largest
/// finite float and NaN is written as 0, so every operand parses as a number.
fn write_float(f: &mut fmt::Formatter<'_>, v: f32) -> fmt::Result {
    let v = if v.is_nan() {
        0.0
    } else if v.is_infinite() {
        f32::MAX.copysign(v)
    } else {
        v
    };
    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e7).contains(&magnitude) {
        write!(f, "{:e}", v)
    } else {
        write!(f, "{}", v)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SlxProgram {
        SlxProgram {
            class: ShaderClass::Surface,
            version: DEFAULT_SLX_VERSION.to_string(),
            uses: 3,
            data: vec![DataDecl {
                output: false,
                param: true,
                storage: Some(StorageClass::Uniform),
                type_name: "float".to_string(),
                name: "Kd".to_string(),
                array_len: 0,
            }],
            init: vec![
                Line::Instr(Instruction::op(Opcode::Pushif).with(Operand::Float(0.5))),
                Line::Instr(Instruction::op(Opcode::Pop).with(Operand::Name("Kd".into()))),
            ],
            code: vec![
                Line::Label(0),
                Line::Instr(Instruction::named("mulff")),
                Line::Instr(Instruction::op(Opcode::Jmp).with(Operand::Label(0))),
            ],
        }
    }

    #[test]
    fn writes_segments_in_fixed_order() {
        let text = sample().to_string();
        assert_eq!(
            text,
            "surface\nAQSIS_V 1.8.2\n\nsegment Data\nUSES 3\n\nparam uniform float Kd\n\
             segment Init\n\tpushif 0.5\n\tpop Kd\nsegment Code\n:0\n\tmulff\n\tjmp 0\n"
        );
    }

    #[test]
    fn array_declaration_carries_length() {
        let decl = DataDecl {
            output: true,
            param: true,
            storage: Some(StorageClass::Varying),
            type_name: "color".to_string(),
            name: "layers".to_string(),
            array_len: 4,
        };
        assert_eq!(decl.to_string(), "output param varying color layers[4]");
    }

    #[test]
    fn string_operands_are_quoted_and_escaped() {
        let instr = Instruction::op(Opcode::Pushis).with(Operand::Str("a \"b\"".into()));
        assert_eq!(instr.to_string(), "pushis \"a \\\"b\\\"\"");
    }

    #[test]
    fn float_operands_stay_short_and_finite() {
        let text = |v: f32| Operand::Float(v).to_string();
        assert_eq!(text(2.0), "2");
        assert_eq!(text(0.5), "0.5");
        assert_eq!(text(-0.25), "-0.25");
        assert_eq!(text(1234567.0), "1234567");
        assert_eq!(text(1e20), "1e20");
        assert_eq!(text(-2.5e-6), "-2.5e-6");
        assert_eq!(text(f32::INFINITY), "3.4028235e38");
        assert_eq!(text(f32::NEG_INFINITY), "-3.4028235e38");
        assert_eq!(text(f32::NAN), "0");
    }

    #[test]
    fn write_to_matches_display() {
        let program = sample();
        let mut buf = Vec::new();
        program.write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), program.to_string());
    }
}
