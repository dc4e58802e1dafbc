// File: src/main.rs
//
// CLI driver for Glint: `run` executes a script, bare invocation (or
// `repl`) starts an interactive session, `disassemble` compiles only
// and prints bytecode. This module, the disassembler, and source file
// I/O sit outside the compilation-and-execution core; they only
// consume its public `Vm`/`InterpretResult` surface.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use glint::repl;
use glint::value::StringInterner;
use glint::vm::{InterpretResult, Vm};
use glint::{compiler, debug};

#[derive(Parser)]
#[command(
    name = "glint",
    about = "Glint: a small bytecode-compiled scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print the stack and each instruction before it executes.
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Glint script file.
    Run { file: PathBuf },
    /// Start the interactive REPL (also the default with no subcommand).
    Repl,
    /// Compile a script and print its bytecode without running it.
    Disassemble { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match cli.command.unwrap_or(Commands::Repl) {
        Commands::Run { file } => {
            let mut vm = Vm::new();
            vm.trace = cli.trace;
            run_file(&mut vm, &file)
        }
        Commands::Repl => {
            let mut vm = Vm::new();
            vm.trace = cli.trace;
            repl::run(&mut vm)
        }
        Commands::Disassemble { file } => disassemble_file(&file),
    };

    ExitCode::from(code as u8)
}

/// Reads and runs one script file. Exit codes follow the embedding
/// contract: 0 success, 65 compile error, 70 runtime error, 74 I/O error.
fn run_file(vm: &mut Vm, path: &PathBuf) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}", format!("Error: {}: {}", path.display(), err).red());
            return 74;
        }
    };

    match vm.interpret(&source) {
        InterpretResult::Ok => 0,
        InterpretResult::CompileError => 65,
        InterpretResult::RuntimeError => 70,
    }
}

fn disassemble_file(path: &PathBuf) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}", format!("Error: {}: {}", path.display(), err).red());
            return 74;
        }
    };

    let mut strings = StringInterner::new();
    match compiler::compile(&source, &mut strings) {
        Some(function) => {
            let name = path.to_string_lossy().to_string();
            debug::disassemble_chunk(&function.chunk, &name);
            0
        }
        None => 65,
    }
}
