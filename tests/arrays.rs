//! Array declaration, indexing and bounds behavior.

mod common;

use common::{run_expecting_error, run_program};
use indoc::indoc;
use pretty_assertions::assert_eq;
use pseudovm::VmError;

#[test]
fn one_dimensional_round_trip() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:5] OF INTEGER
        a[3] <- 99
        OUTPUT a[3]
    "};
    assert_eq!(run_program(source), "99\n");
}

#[test]
fn two_dimensional_round_trip() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:3, 1:2] OF INTEGER
        a[2,1] <- 42
        OUTPUT a[2,1]
    "};
    assert_eq!(run_program(source), "42\n");
}

#[test]
fn elements_start_zeroed() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:3] OF INTEGER
        OUTPUT a[2]
    "};
    assert_eq!(run_program(source), "0\n");
}

#[test]
fn distinct_cells_hold_distinct_values() {
    let source = indoc! {"
        DECLARE grid : ARRAY[0:2, 0:2] OF INTEGER
        DECLARE i : INTEGER
        DECLARE j : INTEGER
        FOR i <- 0 TO 2
        FOR j <- 0 TO 2
        grid[i,j] <- i * 3 + j
        NEXT j
        NEXT i
        OUTPUT grid[0,0], grid[1,2], grid[2,1]
    "};
    assert_eq!(run_program(source), "057\n");
}

#[test]
fn non_unit_lower_bounds() {
    let source = indoc! {"
        DECLARE a : ARRAY[5:7] OF INTEGER
        a[5] <- 1
        a[7] <- 3
        OUTPUT a[5] + a[7]
    "};
    assert_eq!(run_program(source), "4\n");
}

#[test]
fn real_element_arrays() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:2] OF REAL
        a[1] <- 1.5
        a[2] <- 2.5
        OUTPUT a[1] + a[2]
    "};
    assert_eq!(run_program(source), "4.000000\n");
}

#[test]
fn char_element_arrays_use_single_bytes() {
    let source = indoc! {"
        DECLARE word : ARRAY[1:3] OF CHAR
        word[1] <- 'h'
        word[2] <- 'i'
        word[3] <- '!'
        OUTPUT word[1], word[2], word[3]
    "};
    assert_eq!(run_program(source), "hi!\n");
}

#[test]
fn string_element_arrays_hold_references() {
    let source = indoc! {"
        DECLARE names : ARRAY[1:2] OF STRING
        names[1] <- \"ada\"
        names[2] <- \"alan\"
        OUTPUT names[1], ' ', names[2]
    "};
    assert_eq!(run_program(source), "ada alan\n");
}

#[test]
fn index_below_base_is_a_runtime_error() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:3] OF INTEGER
        a[0] <- 1
    "};
    assert_eq!(run_expecting_error(source).source, VmError::ArrayOutOfBounds);
}

#[test]
fn index_past_top_is_a_runtime_error() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:3] OF INTEGER
        OUTPUT a[4]
    "};
    assert_eq!(run_expecting_error(source).source, VmError::ArrayOutOfBounds);
}

#[test]
fn second_dimension_is_bounds_checked_too() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:3, 1:2] OF INTEGER
        OUTPUT a[1,3]
    "};
    assert_eq!(run_expecting_error(source).source, VmError::ArrayOutOfBounds);
}

#[test]
fn array_assignment_result_feeds_surrounding_expression() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:2] OF INTEGER
        DECLARE x : INTEGER
        x <- a[1] <- 5
        OUTPUT x
    "};
    assert_eq!(run_program(source), "5\n");
}

#[test]
fn bounds_may_be_expressions() {
    let source = indoc! {"
        CONSTANT N = 4
        DECLARE a : ARRAY[1:N] OF INTEGER
        a[4] <- 8
        OUTPUT a[4]
    "};
    assert_eq!(run_program(source), "8\n");
}
