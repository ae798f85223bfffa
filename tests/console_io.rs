//! INPUT/OUTPUT conventions against a scripted stdin.

mod common;

use common::{run_program, run_with_input};
use indoc::indoc;
use pretty_assertions::assert_eq;

#[test]
fn input_integer_round_trips() {
    let source = indoc! {"
        DECLARE x : INTEGER
        INPUT x
        OUTPUT x * 2
    "};
    assert_eq!(run_with_input(source, "21\n"), "42\n");
}

#[test]
fn input_parses_the_first_token_and_discards_the_rest() {
    let source = indoc! {"
        DECLARE x : INTEGER
        DECLARE y : INTEGER
        INPUT x
        INPUT y
        OUTPUT x + y
    "};
    assert_eq!(run_with_input(source, "1 trailing junk\n2\n"), "3\n");
}

#[test]
fn input_real() {
    let source = indoc! {"
        DECLARE r : REAL
        INPUT r
        OUTPUT r
    "};
    assert_eq!(run_with_input(source, "2.5\n"), "2.500000\n");
}

#[test]
fn input_char_takes_exactly_one_character() {
    let source = indoc! {"
        DECLARE c : CHAR
        INPUT c
        OUTPUT c
    "};
    assert_eq!(run_with_input(source, "xyz\n"), "x\n");
}

#[test]
fn input_bool_accepts_true_spellings() {
    let source = indoc! {"
        DECLARE b : BOOLEAN
        INPUT b
        OUTPUT b
    "};
    assert_eq!(run_with_input(source, "TRUE\n"), "TRUE\n");
    assert_eq!(run_with_input(source, "true\n"), "TRUE\n");
    assert_eq!(run_with_input(source, "True\n"), "TRUE\n");
    assert_eq!(run_with_input(source, "yes\n"), "FALSE\n");
    assert_eq!(run_with_input(source, "FALSE\n"), "FALSE\n");
}

#[test]
fn input_string_strips_the_newline() {
    let source = indoc! {"
        DECLARE s : STRING
        INPUT s
        OUTPUT LENGTH(s), ' ', s
    "};
    assert_eq!(run_with_input(source, "hello there\n"), "11 hello there\n");
}

#[test]
fn input_into_array_element() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:2] OF INTEGER
        INPUT a[2]
        OUTPUT a[2]
    "};
    assert_eq!(run_with_input(source, "7\n"), "7\n");
}

#[test]
fn outputs_format_by_type() {
    assert_eq!(
        run_program("OUTPUT 1, ' ', 1.5, ' ', 'c', ' ', TRUE, ' ', \"s\"\n"),
        "1 1.500000 c TRUE s\n"
    );
}

#[test]
fn output_real_uses_six_decimals() {
    assert_eq!(run_program("OUTPUT 1.0 / 3.0\n"), "0.333333\n");
}
