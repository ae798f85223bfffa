//! Strings: literals, concatenation, comparison and the builtin set.

mod common;

use common::{run_expecting_error, run_program};
use indoc::indoc;
use pretty_assertions::assert_eq;
use pseudovm::VmError;

#[test]
fn literals_print_verbatim() {
    assert_eq!(run_program("OUTPUT \"hello world\"\n"), "hello world\n");
}

#[test]
fn concatenation_allocates_a_new_string() {
    let source = indoc! {"
        DECLARE s : STRING
        s <- \"foo\" & \"bar\"
        OUTPUT s
    "};
    assert_eq!(run_program(source), "foobar\n");
}

#[test]
fn lexicographic_comparison() {
    let source = indoc! {"
        IF \"abc\" < \"abd\"
        THEN
        OUTPUT TRUE
        ELSE
        OUTPUT FALSE
        ENDIF
    "};
    assert_eq!(run_program(source), "TRUE\n");
}

#[test]
fn prefix_sorts_before_longer_string() {
    assert_eq!(run_program("OUTPUT \"ab\" < \"abc\"\n"), "TRUE\n");
    assert_eq!(run_program("OUTPUT \"abc\" <= \"ab\"\n"), "FALSE\n");
}

#[test]
fn equality_and_inequality() {
    assert_eq!(run_program("OUTPUT \"same\" = \"same\"\n"), "TRUE\n");
    assert_eq!(run_program("OUTPUT \"same\" <> \"same\"\n"), "FALSE\n");
    assert_eq!(run_program("OUTPUT \"a\" = \"b\"\n"), "FALSE\n");
}

#[test]
fn greater_orderings() {
    assert_eq!(run_program("OUTPUT \"b\" > \"a\", \"a\" >= \"a\"\n"), "TRUETRUE\n");
}

#[test]
fn substring_is_one_based() {
    assert_eq!(run_program("OUTPUT SUBSTRING(\"pseudocode\", 1, 6)\n"), "pseudo\n");
    assert_eq!(run_program("OUTPUT SUBSTRING(\"pseudocode\", 7, 4)\n"), "code\n");
}

#[test]
fn substring_past_the_end_is_a_runtime_error() {
    assert_eq!(
        run_expecting_error("OUTPUT SUBSTRING(\"abc\", 2, 5)\n").source,
        VmError::SubstringOverrun
    );
}

#[test]
fn substring_start_must_be_inside_the_string() {
    assert_eq!(
        run_expecting_error("OUTPUT SUBSTRING(\"abc\", 0, 1)\n").source,
        VmError::SubstringStart
    );
}

#[test]
fn length_counts_bytes() {
    assert_eq!(run_program("OUTPUT LENGTH(\"hello\")\n"), "5\n");
    assert_eq!(run_program("OUTPUT LENGTH(\"\")\n"), "0\n");
}

#[test]
fn case_mapping_is_ascii_only() {
    assert_eq!(run_program("OUTPUT UCASE(\"mixed Case 7\")\n"), "MIXED CASE 7\n");
    assert_eq!(run_program("OUTPUT LCASE(\"mixed Case 7\")\n"), "mixed case 7\n");
}

#[test]
fn charat_indexes_from_one() {
    assert_eq!(run_program("OUTPUT CHARAT(\"abc\", 2)\n"), "b\n");
}

#[test]
fn charat_out_of_range_is_a_runtime_error() {
    assert_eq!(
        run_expecting_error("OUTPUT CHARAT(\"abc\", 4)\n").source,
        VmError::StringIndex
    );
}

#[test]
fn builtins_compose() {
    assert_eq!(
        run_program("OUTPUT UCASE(SUBSTRING(\"pseudocode\", 7, 4))\n"),
        "CODE\n"
    );
    assert_eq!(
        run_program("OUTPUT LENGTH(\"ab\" & \"cde\")\n"),
        "5\n"
    );
}

#[test]
fn strings_pass_through_subroutines() {
    let source = indoc! {"
        FUNCTION shout(s : STRING) RETURNS STRING
        RETURN UCASE(s) & \"!\"
        ENDFUNCTION
        OUTPUT shout(\"quiet\")
    "};
    assert_eq!(run_program(source), "QUIET!\n");
}

#[test]
fn int_builtin_truncates_toward_zero() {
    assert_eq!(run_program("OUTPUT INT(3.9)\n"), "3\n");
    assert_eq!(run_program("OUTPUT INT(-3.9)\n"), "-3\n");
}

#[test]
fn randombetween_stays_inside_its_bounds() {
    let source = indoc! {"
        DECLARE i : INTEGER
        DECLARE n : INTEGER
        FOR i <- 1 TO 50
        n <- RANDOMBETWEEN(3, 5)
        IF n < 3 OR n > 5
        THEN
        OUTPUT n
        ENDIF
        NEXT i
        OUTPUT \"ok\"
    "};
    assert_eq!(run_program(source), "ok\n");
}

#[test]
fn rnd_is_a_real_below_one() {
    let source = indoc! {"
        DECLARE r : REAL
        DECLARE i : INTEGER
        FOR i <- 1 TO 50
        r <- RND()
        IF r < 0.0 OR r >= 1.0
        THEN
        OUTPUT \"bad\"
        ENDIF
        NEXT i
        OUTPUT \"ok\"
    "};
    assert_eq!(run_program(source), "ok\n");
}
