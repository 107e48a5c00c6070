//! Per-shader compile pipeline: load a shader unit, validate, generate,
//! write the `.slx` file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use aqsl_common::{CompilerConfig, ConfigError, DiagnosticBag, ShaderClass, SlxProgram};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::CompileError;
use crate::session::{CompilationSession, ShaderUnit};
use crate::{compile, GenOptions};

/// Failures of the compile pipeline.
///
/// Everything except [`DriverError::Output`] concerns one shader; an output
/// that cannot be created ends the run.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("'{}' is not a valid shader unit: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shader `{shader}` failed to compile: {source}")]
    Compile {
        shader: String,
        source: CompileError,
    },

    #[error("could not create '{}': {source}", .path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DriverError {
    /// Whether the remaining shaders of the run should be skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Output { .. })
    }
}

/// What compiling one unit produced.
#[derive(Debug)]
pub struct ShaderReport {
    pub shader: String,
    pub class: ShaderClass,
    pub program: SlxProgram,
    pub diagnostics: DiagnosticBag,
    /// The shading-language source the unit was parsed from, for rendering
    /// diagnostics.
    pub source_file: Option<String>,
}

/// Read a shader unit from a JSON file.
pub fn load_unit(path: &Path) -> Result<ShaderUnit, DriverError> {
    let text = fs::read_to_string(path).map_err(|source| DriverError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DriverError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Compile a unit against a fresh session.
pub fn compile_unit(unit: ShaderUnit, config: &CompilerConfig) -> Result<ShaderReport, DriverError> {
    let source_file = unit.source_file.clone();
    let mut session = CompilationSession::from_unit(unit);
    let (class, shader) = match session.shader_header() {
        Ok((class, name)) => (class, name.to_string()),
        Err(source) => {
            return Err(DriverError::Compile {
                shader: "<unknown>".to_string(),
                source,
            })
        }
    };

    let options = GenOptions {
        version: config.version.clone(),
    };
    debug!(shader = %shader, version = %options.version, "compiling unit");
    let compiled = compile(&mut session, &options).map_err(|source| DriverError::Compile {
        shader: shader.clone(),
        source,
    })?;

    Ok(ShaderReport {
        shader,
        class,
        program: compiled.program,
        diagnostics: compiled.diagnostics,
        source_file,
    })
}

/// Write `program` to `path`, creating parent directories. The file is
/// closed before returning.
pub fn write_program(program: &SlxProgram, path: &Path) -> Result<(), DriverError> {
    let output_error = |source: std::io::Error| DriverError::Output {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(output_error)?;
    }
    let file = File::create(path).map_err(output_error)?;
    let mut out = BufWriter::new(file);
    program.write_to(&mut out).map_err(output_error)?;
    out.flush().map_err(output_error)?;
    info!(path = %path.display(), "wrote program");
    Ok(())
}

/// Load, compile and optionally write one unit file.
///
/// `output` overrides the configured destination. With `write` false, or
/// when the program carries error diagnostics, no file is touched.
pub fn compile_file(
    input: &Path,
    config: &CompilerConfig,
    output: Option<&Path>,
    write: bool,
) -> Result<(ShaderReport, PathBuf), DriverError> {
    let unit = load_unit(input)?;
    let report = compile_unit(unit, config)?;
    let destination = match output {
        Some(path) => path.to_path_buf(),
        None => config.output_path(input, &report.shader),
    };
    if write && !report.diagnostics.has_errors() {
        write_program(&report.program, &destination)?;
    }
    Ok((report, destination))
}
