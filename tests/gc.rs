//! Garbage collection under pressure: unreachable objects must be
//! reclaimed, reachable ones must survive, and true exhaustion must
//! surface as a runtime error.

mod common;

use std::io::Cursor;

use indoc::indoc;
use pretty_assertions::assert_eq;
use pseudovm::heap::Heap;
use pseudovm::{compile_source, engine, VmError, VmState};

/// Compile and run against a deliberately tiny heap.
fn run_with_heap_cells(source: &str, cells: usize) -> Result<String, VmError> {
    let stream = compile_source(source).expect("program should compile");
    let mut captured = Vec::new();
    let mut state = VmState::with_io(
        stream.as_bytes(),
        Box::new(Cursor::new(Vec::new())),
        Box::new(&mut captured),
    );
    state.heap = Heap::new(cells);
    let outcome = engine::run(&mut state).map_err(|e| e.source);
    drop(state);
    outcome.map(|()| String::from_utf8(captured).expect("utf8 output"))
}

#[test]
fn unreachable_strings_are_collected() {
    // Hundreds of allocations, at most one kept reachable; a 32-cell
    // heap only survives this when mark-sweep actually reclaims garbage.
    let source = indoc! {"
        DECLARE s : STRING
        DECLARE i : INTEGER
        FOR i <- 1 TO 100
        s <- \"a\" & \"b\"
        NEXT i
        OUTPUT s
    "};
    assert_eq!(run_with_heap_cells(source, 32).unwrap(), "ab\n");
}

#[test]
fn reachable_strings_survive_collection() {
    let source = indoc! {"
        DECLARE keep : STRING
        DECLARE i : INTEGER
        keep <- \"kept\" & \"!\"
        FOR i <- 1 TO 100
        OUTPUT \"x\" & \"y\"
        NEXT i
        OUTPUT keep
    "};
    let output = run_with_heap_cells(source, 32).unwrap();
    assert!(output.ends_with("kept!\n"));
    assert_eq!(output.matches("xy").count(), 100);
}

#[test]
fn references_inside_arrays_are_roots_too() {
    // Strings stored in an array are reachable only through the array's
    // reference elements; a collector that misses them frees live data.
    let source = indoc! {"
        DECLARE names : ARRAY[1:3] OF STRING
        DECLARE i : INTEGER
        names[1] <- \"one\" & \"\"
        names[2] <- \"two\" & \"\"
        names[3] <- \"three\" & \"\"
        FOR i <- 1 TO 60
        OUTPUT \"pad\" & \"ding\"
        NEXT i
        OUTPUT names[1], names[2], names[3]
    "};
    let output = run_with_heap_cells(source, 32).unwrap();
    assert!(output.ends_with("onetwothree\n"));
}

#[test]
fn exhaustion_of_reachable_data_is_an_error() {
    // Everything allocated stays reachable through the array, so no
    // collection can help; the allocation that overruns the arena must
    // surface as a runtime error instead of looping forever.
    let source = indoc! {"
        DECLARE keep : ARRAY[1:100] OF STRING
        DECLARE i : INTEGER
        FOR i <- 1 TO 100
        keep[i] <- \"v\" & \"w\"
        NEXT i
        OUTPUT \"unreachable\"
    "};
    assert_eq!(run_with_heap_cells(source, 32).unwrap_err(), VmError::HeapExhausted);
}

#[test]
fn normal_heap_is_large_enough_for_all_of_this() {
    let source = indoc! {"
        DECLARE i : INTEGER
        FOR i <- 1 TO 100
        OUTPUT \"a\" & \"b\"
        NEXT i
    "};
    let output = run_with_heap_cells(source, 1024).unwrap();
    assert_eq!(output.matches("ab").count(), 100);
}
