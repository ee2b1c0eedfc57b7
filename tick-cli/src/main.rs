//! Tick CLI: compile-and-run with a bytecode cache in front.
//!
//! Exit code is 0 on success, non-zero on any front-end, semantic or
//! runtime failure; when the program's `main` returns an integer, that
//! integer is the process exit code (truncated to the host range).

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tick_core::cache;
use tick_core::compiler::modules::ModuleLoader;
use tick_core::pipeline::{compile_source, run_compiled, PipelineError};
use tick_core::{CompiledProgram, Value};
use tracing::warn;

mod logging;

#[derive(Parser)]
#[command(
    name = "tick",
    about = "Tick programming language - event-driven parallel DSL",
    version
)]
struct Cli {
    /// Source file to compile and run
    source: PathBuf,

    /// Output path for the compiled bytecode image (with --compile-only)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Compile (and cache) without executing
    #[arg(long)]
    compile_only: bool,

    /// Keep the generated intermediate C file (native-backend
    /// toolchains only; this build always runs the VM)
    #[arg(long)]
    keep_c: bool,

    /// Print the disassembled bytecode before executing
    #[arg(long)]
    dump_bytecode: bool,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// Log format: compact or pretty
    #[arg(long, default_value = "compact", value_name = "FORMAT")]
    log_format: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(
        logging::parse_level(&cli.log_level),
        logging::LogFormat::from_str(&cli.log_format),
    );

    if cli.keep_c {
        warn!(target: "tick::cli", "--keep-c has no effect: this build executes bytecode directly");
    }

    let source = match std::fs::read_to_string(&cli.source) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: cannot read '{}': {}", cli.source.display(), err);
            return ExitCode::FAILURE;
        }
    };

    // A valid cache entry short-circuits the whole front end.
    let program = match cache::load_or_else(&cli.source, || front_end(&source, &cli.source)) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dump_bytecode {
        dump_bytecode(&program);
    }

    if cli.compile_only {
        if let Some(output) = &cli.output {
            if let Err(err) = write_image(&cli.source, output, &program) {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    match run_compiled(&program) {
        Ok(Value::Int(code)) => ExitCode::from(code as u8),
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Runtime error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn dump_bytecode(program: &CompiledProgram) {
    use tick_core::runtime::disasm::disassemble;
    use tick_core::runtime::strings::StringPool;

    let strings = StringPool::from_strings(program.strings.iter().cloned());
    if let Some(main) = &program.main {
        print!("{}", disassemble("main", main, &strings, &program.constants));
    }
    for (name, code) in &program.functions {
        print!("{}", disassemble(name, code, &strings, &program.constants));
    }
    for process in &program.processes {
        let label = format!("@{} process {}", process.event, process.name);
        print!(
            "{}",
            disassemble(&label, &process.code, &strings, &program.constants)
        );
    }
}

fn front_end(source: &str, path: &Path) -> Result<CompiledProgram, PipelineError> {
    let mut loader = ModuleLoader::native();
    compile_source(source, path, &mut loader)
}

/// Serialize the compiled program to an explicit path (same wire
/// format as the cache).
fn write_image(
    source_path: &Path,
    output: &Path,
    program: &CompiledProgram,
) -> Result<(), String> {
    let stamp = cache::store::source_stamp(source_path).map_err(|e| e.to_string())?;
    let data = cache::format::encode(program, stamp).map_err(|e| e.to_string())?;
    std::fs::write(output, data).map_err(|e| e.to_string())
}
