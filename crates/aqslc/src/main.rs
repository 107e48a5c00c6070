use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{ArgAction, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use aqsl_common::config::find_and_load_config;
use aqsl_common::{Diagnostic, Severity};
use aqsl_compiler::driver::{self, DriverError, ShaderReport};

/// Shading-language compiler backend.
///
/// Compiles analyzed shader units (JSON) into .slx programs.
#[derive(Parser)]
#[command(
    name = "aqslc",
    version,
    about,
    long_about = "Shading-language compiler backend.\n\nCompiles analyzed shader units (JSON) into textual .slx programs\nfor the shader virtual machine.\n\nExamples:\n  aqslc plastic.json               Compile to plastic.slx next to the input\n  aqslc *.json --out-dir shaders   Compile several units into shaders/\n  aqslc plastic.json --check       Check for errors only\n  aqslc plastic.json --emit-slx    Print the program to stdout"
)]
struct Cli {
    /// Input shader unit files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file path (single input only).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for generated programs (overrides aqsl.toml).
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Version written after AQSIS_V (overrides aqsl.toml).
    #[arg(long = "slx-version")]
    slx_version: Option<String>,

    /// Check for errors without writing programs.
    #[arg(long)]
    check: bool,

    /// Print programs to stdout instead of writing files.
    #[arg(long = "emit-slx")]
    emit_slx: bool,

    /// Suppress warning output.
    #[arg(short, long)]
    quiet: bool,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.output.is_some() && cli.inputs.len() > 1 {
        eprintln!("error: --output can only be used with a single input");
        process::exit(2);
    }

    let mut failures = 0usize;
    for input in &cli.inputs {
        match compile_one(&cli, input) {
            Ok(true) => {}
            Ok(false) => failures += 1,
            Err(e) => {
                report_driver_error(&e);
                if e.is_fatal() {
                    process::exit(1);
                }
                failures += 1;
            }
        }
    }

    if failures > 0 {
        eprintln!(
            "{} of {} shader(s) failed to compile",
            failures,
            cli.inputs.len()
        );
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Compile one input. `Ok(false)` means the program carried errors.
fn compile_one(cli: &Cli, input: &Path) -> Result<bool, DriverError> {
    // === Configuration ===
    let abs_input = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    let mut config = find_and_load_config(&abs_input)?;
    if let Some(ref dir) = cli.out_dir {
        config.output_dir = Some(dir.clone());
    }
    if let Some(ref version) = cli.slx_version {
        config.version = version.clone();
    }
    debug!(input = %input.display(), ?config, "resolved configuration");

    // === Compile ===
    let write = !(cli.check || cli.emit_slx);
    let (report, destination) =
        driver::compile_file(input, &config, cli.output.as_deref(), write)?;

    print_report_diagnostics(&report, cli.quiet);
    if report.diagnostics.has_errors() {
        return Ok(false);
    }

    if cli.emit_slx {
        print!("{}", report.program);
    } else if cli.check {
        println!("{}: no errors found", report.shader);
    } else {
        println!(
            "Compiled {} ({}) -> {}",
            report.shader,
            report.class.keyword(),
            destination.display()
        );
    }
    Ok(true)
}

fn print_report_diagnostics(report: &ShaderReport, quiet: bool) {
    let loaded = report
        .source_file
        .as_deref()
        .and_then(|path| fs::read_to_string(path).ok().map(|text| (path, text)));
    let source = loaded.as_ref().map(|(path, text)| (*path, text.as_str()));
    for diag in report.diagnostics.diagnostics() {
        if quiet && !diag.is_error() {
            continue;
        }
        print_diagnostic(diag, source);
    }
}

fn report_driver_error(e: &DriverError) {
    match e {
        DriverError::Compile { shader, source } => {
            eprintln!("error: shader `{}` failed to compile", shader);
            for diag in source.diagnostics() {
                let loaded = diag
                    .span
                    .as_ref()
                    .filter(|span| !span.file.is_empty())
                    .and_then(|span| fs::read_to_string(&span.file).ok().map(|t| (span, t)));
                let source = loaded
                    .as_ref()
                    .map(|(span, text)| (span.file.as_str(), text.as_str()));
                print_diagnostic(&diag, source);
            }
        }
        other => eprintln!("error: {}", other),
    }
}

/// Render a diagnostic against its source text when both a span and the
/// text are available; plain text otherwise.
fn print_diagnostic(diag: &Diagnostic, source: Option<(&str, &str)>) {
    let (kind, color) = match diag.severity {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::Info => (ReportKind::Advice, Color::Blue),
    };

    if let (Some(span), Some((file_name, text))) = (diag.span.as_ref(), source) {
        let range = span.byte_range();
        let mut report = Report::build(kind, file_name, range.start)
            .with_message(&diag.message)
            .with_label(
                Label::new((file_name, range))
                    .with_message(&diag.message)
                    .with_color(color),
            );
        for note in &diag.notes {
            report = report.with_note(note);
        }

        if let Err(e) = report.finish().eprint((file_name, Source::from(text))) {
            warn!(error = %e, "could not render diagnostic");
            eprintln!("{}", diag);
        }
    } else {
        eprintln!("{}", diag);
        eprintln!();
    }
}
