//! Command-line entry point.
//!
//! `pseudo -cr <path>` compiles and runs a source file, `-c` persists the
//! bytecode as `.pcbc`, `-r` executes a `.pcbc` file. A trailing `true`
//! turns on the stderr debug trace.

use std::fs;
use std::process::ExitCode;

use pseudovm::bytecode::BytecodeStream;
use pseudovm::{compile_source, engine, VmState};

fn print_help() {
    println!(
        "\nCambridge Pseudocode Compiler and Virtual Machine\n\
         \n\
         Commands:\n\
         -h -> Show help menu\n\
         -cr <file path> -> Compiles and runs pseudocode source.\n\
         -c <file path> <target name> -> Compiles pseudocode source and saves bytecode result as .pcbc.\n\
         -r <file path> -> Runs pseudocode bytecode (.pcbc file).\n\
         \n\
         A trailing 'true' after any command enables the debug trace.\n"
    );
}

fn read_source(path: &str) -> Result<String, ExitCode> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("Could not open file \"{path}\": {e}");
        ExitCode::from(1)
    })
}

fn compile_path(path: &str, trace: bool) -> Result<BytecodeStream, ExitCode> {
    let source = read_source(path)?;

    if trace {
        for token in pseudovm::lexer::Lexer::new(&source).scan() {
            eprintln!("{:?} \"{}\" at {}:{}", token.kind, token.lexeme, token.line, token.col);
        }
    }

    let stream = compile_source(&source).map_err(|e| {
        eprint!("{e}");
        ExitCode::from(1)
    })?;

    if trace {
        let mut listing = Vec::new();
        stream.disassemble(&mut listing).ok();
        eprint!("{}", String::from_utf8_lossy(&listing));
    }

    Ok(stream)
}

fn run_stream(stream: &BytecodeStream, trace: bool) -> ExitCode {
    let mut state = VmState::new(stream.as_bytes());
    state.trace = trace;
    match engine::run(&mut state) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(1)
        }
    }
}

fn compile_and_run(path: &str, trace: bool) -> ExitCode {
    match compile_path(path, trace) {
        Ok(stream) => run_stream(&stream, trace),
        Err(code) => code,
    }
}

fn compile_to_file(path: &str, target: &str, trace: bool) -> ExitCode {
    let stream = match compile_path(path, trace) {
        Ok(stream) => stream,
        Err(code) => return code,
    };
    match stream.write_to_file(target) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Problem writing bytecode file: {e}");
            ExitCode::from(1)
        }
    }
}

fn run_bytecode(path: &str, trace: bool) -> ExitCode {
    match BytecodeStream::read_from_file(path) {
        Ok(stream) => run_stream(&stream, trace),
        Err(e) => {
            eprintln!("Problem opening file: {e}");
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 || args.iter().any(|a| a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    let trace = args.last().is_some_and(|a| a == "true");

    match args[1].as_str() {
        "-cr" => {
            if args.len() != 3 && !(args.len() == 4 && trace) {
                eprintln!("Usage: pseudo -cr <file path>");
                return ExitCode::from(1);
            }
            compile_and_run(&args[2], trace)
        }
        "-c" => {
            if args.len() != 4 && !(args.len() == 5 && trace) {
                eprintln!("Usage: pseudo -c <file path> <target name>");
                return ExitCode::from(1);
            }
            compile_to_file(&args[2], &args[3], trace)
        }
        "-r" => {
            if args.len() != 3 && !(args.len() == 4 && trace) {
                eprintln!("Usage: pseudo -r <file path>");
                return ExitCode::from(1);
            }
            run_bytecode(&args[2], trace)
        }
        _ => {
            eprintln!("Unknown command.");
            print_help();
            ExitCode::from(1)
        }
    }
}
