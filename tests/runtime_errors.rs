//! Runtime failures must latch at the raising instruction and halt the
//! machine with the documented message.

mod common;

use common::run_expecting_error;
use indoc::indoc;
use pretty_assertions::assert_eq;
use pseudovm::{VmError, VmState};

#[test]
fn division_by_zero_in_mod() {
    assert_eq!(
        run_expecting_error("OUTPUT 5 MOD 0\n").source,
        VmError::DivisionByZero
    );
}

#[test]
fn division_by_zero_in_floor_division() {
    assert_eq!(
        run_expecting_error("OUTPUT 5 DIV 0\n").source,
        VmError::DivisionByZero
    );
}

#[test]
fn runaway_recursion_overflows_a_stack() {
    let source = indoc! {"
        FUNCTION loop(n : INTEGER) RETURNS INTEGER
        RETURN loop(n)
        ENDFUNCTION
        OUTPUT loop(1)
    "};
    let error = run_expecting_error(source);
    assert!(matches!(
        error.source,
        VmError::CallStackOverflow | VmError::StackOverflow
    ));
}

#[test]
fn errors_report_the_failing_pc() {
    let error = run_expecting_error("OUTPUT 1 MOD 0\n");
    let message = error.to_string();
    assert!(message.starts_with(&format!("Runtime error at PC {}", error.pc)));
    assert!(message.ends_with("Division by zero."));
}

#[test]
fn the_machine_stops_at_the_first_error() {
    // nothing after the failing statement runs
    let source = indoc! {"
        DECLARE a : ARRAY[1:2] OF INTEGER
        OUTPUT \"before\"
        OUTPUT a[9]
        OUTPUT \"after\"
    "};
    let stream = pseudovm::compile_source(source).expect("compiles");
    let mut captured = Vec::new();
    let mut state = VmState::with_io(
        stream.as_bytes(),
        Box::new(std::io::Cursor::new(Vec::new())),
        Box::new(&mut captured),
    );
    let error = pseudovm::engine::run(&mut state).expect_err("must fail");
    drop(state);
    assert_eq!(error.source, VmError::ArrayOutOfBounds);
    let printed = String::from_utf8(captured).unwrap();
    assert!(printed.contains("before"));
    assert!(!printed.contains("after"));
}

#[test]
fn reading_past_stdin_is_an_io_error() {
    let source = indoc! {"
        DECLARE x : INTEGER
        INPUT x
    "};
    assert_eq!(run_expecting_error(source).source, VmError::Io);
}

#[test]
fn non_numeric_stdin_for_integer_is_an_io_error() {
    let source = indoc! {"
        DECLARE x : INTEGER
        INPUT x
    "};
    let stream = pseudovm::compile_source(source).expect("compiles");
    let mut state = VmState::with_io(
        stream.as_bytes(),
        Box::new(std::io::Cursor::new(b"not a number\n".to_vec())),
        Box::new(Vec::new()),
    );
    let error = pseudovm::engine::run(&mut state).expect_err("must fail");
    assert_eq!(error.source, VmError::Io);
}
