//! Shared helpers: compile a source string and run it to completion in a
//! fresh VM with captured I/O.

use std::io::Cursor;

use pseudovm::{compile_source, engine, RuntimeError, VmState};

/// Compile and run, feeding `input` as stdin; returns captured stdout.
#[allow(dead_code)]
pub fn run_with_input(source: &str, input: &str) -> String {
    let stream = compile_source(source).expect("program should compile");
    let mut captured = Vec::new();
    let mut state = VmState::with_io(
        stream.as_bytes(),
        Box::new(Cursor::new(input.as_bytes().to_vec())),
        Box::new(&mut captured),
    );
    engine::run(&mut state).expect("program should run to completion");
    drop(state);
    String::from_utf8(captured).expect("program output should be UTF-8")
}

/// Compile and run with empty stdin.
#[allow(dead_code)]
pub fn run_program(source: &str) -> String {
    run_with_input(source, "")
}

/// Compile and run a program that is expected to die with a runtime error.
#[allow(dead_code)]
pub fn run_expecting_error(source: &str) -> RuntimeError {
    let stream = compile_source(source).expect("program should compile");
    let mut captured = Vec::new();
    let mut state = VmState::with_io(
        stream.as_bytes(),
        Box::new(Cursor::new(Vec::new())),
        Box::new(&mut captured),
    );
    engine::run(&mut state).expect_err("program should raise a runtime error")
}
