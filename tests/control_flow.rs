//! IF, CASE, FOR, WHILE and REPEAT through the whole pipeline.

mod common;

use common::run_program;
use indoc::indoc;
use pretty_assertions::assert_eq;

#[test]
fn if_takes_the_then_branch() {
    let source = indoc! {"
        IF 2 > 1
        THEN
        OUTPUT 'y'
        ELSE
        OUTPUT 'n'
        ENDIF
    "};
    assert_eq!(run_program(source), "y\n");
}

#[test]
fn if_takes_the_else_branch() {
    let source = indoc! {"
        IF 1 > 2
        THEN
        OUTPUT 'y'
        ELSE
        OUTPUT 'n'
        ENDIF
    "};
    assert_eq!(run_program(source), "n\n");
}

#[test]
fn if_without_else_falls_through() {
    let source = indoc! {"
        IF FALSE
        THEN
        OUTPUT 1
        ENDIF
        OUTPUT 2
    "};
    assert_eq!(run_program(source), "2\n");
}

#[test]
fn while_counts_up() {
    let source = indoc! {"
        DECLARE i : INTEGER
        i <- 0
        WHILE i < 3 DO
        i <- i + 1
        OUTPUT i
        ENDWHILE
    "};
    assert_eq!(run_program(source), "1\n2\n3\n");
}

#[test]
fn while_with_false_condition_never_runs() {
    let source = indoc! {"
        WHILE FALSE DO
        OUTPUT 1
        ENDWHILE
        OUTPUT 2
    "};
    assert_eq!(run_program(source), "2\n");
}

#[test]
fn repeat_runs_at_least_once() {
    let source = indoc! {"
        DECLARE i : INTEGER
        i <- 10
        REPEAT
        OUTPUT i
        i <- i + 1
        UNTIL i > 10
    "};
    assert_eq!(run_program(source), "10\n");
}

#[test]
fn for_counts_up_with_default_step() {
    assert_eq!(
        run_program("FOR i <- 1 TO 5\nOUTPUT i\nNEXT i\n"),
        "1\n2\n3\n4\n5\n"
    );
}

#[test]
fn for_with_negative_step_counts_down() {
    assert_eq!(
        run_program("FOR i <- 5 TO 1 STEP -1\nOUTPUT i\nNEXT i\n"),
        "5\n4\n3\n2\n1\n"
    );
}

#[test]
fn for_with_wide_step_skips() {
    assert_eq!(
        run_program("FOR i <- 0 TO 10 STEP 5\nOUTPUT i\nNEXT i\n"),
        "0\n5\n10\n"
    );
}

#[test]
fn for_over_an_empty_range_never_runs() {
    assert_eq!(run_program("FOR i <- 5 TO 1\nOUTPUT i\nNEXT i\nOUTPUT 9\n"), "9\n");
}

#[test]
fn for_reuses_a_declared_counter() {
    let source = indoc! {"
        DECLARE i : INTEGER
        FOR i <- 1 TO 3
        OUTPUT i
        NEXT i
        OUTPUT i
    "};
    // the declared variable keeps the value that ended the loop
    assert_eq!(run_program(source), "1\n2\n3\n4\n");
}

#[test]
fn nested_for_loops() {
    let source = indoc! {"
        FOR i <- 1 TO 2
        FOR j <- 1 TO 2
        OUTPUT i * 10 + j
        NEXT j
        NEXT i
    "};
    assert_eq!(run_program(source), "11\n12\n21\n22\n");
}

#[test]
fn case_selects_the_matching_line() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 2
        CASE x OF
        1 : OUTPUT 'a'
        2 : OUTPUT 'b'
        3 : OUTPUT 'c'
        OTHERWISE : OUTPUT '?'
        ENDCASE
    "};
    assert_eq!(run_program(source), "b\n");
}

#[test]
fn case_falls_back_to_otherwise() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 9
        CASE x OF
        1 : OUTPUT 'a'
        OTHERWISE : OUTPUT '?'
        ENDCASE
    "};
    assert_eq!(run_program(source), "?\n");
}

#[test]
fn case_without_otherwise_may_match_nothing() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 9
        CASE x OF
        1 : OUTPUT 'a'
        2 : OUTPUT 'b'
        ENDCASE
        OUTPUT 'z'
    "};
    assert_eq!(run_program(source), "z\n");
}

#[test]
fn case_without_otherwise_still_runs_a_match() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 1
        CASE x OF
        1 : OUTPUT 'a'
        2 : OUTPUT 'b'
        ENDCASE
        OUTPUT 'z'
    "};
    assert_eq!(run_program(source), "a\nz\n");
}

#[test]
fn case_on_char_scrutinee() {
    let source = indoc! {"
        DECLARE c : CHAR
        c <- 'b'
        CASE c OF
        'a' : OUTPUT 1
        'b' : OUTPUT 2
        OTHERWISE : OUTPUT 0
        ENDCASE
    "};
    assert_eq!(run_program(source), "2\n");
}

#[test]
fn case_line_with_multiple_statements() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 1
        CASE x OF
        1 : OUTPUT 'a'
        OUTPUT 'b'
        2 : OUTPUT 'c'
        OTHERWISE : OUTPUT '?'
        ENDCASE
    "};
    assert_eq!(run_program(source), "a\nb\n");
}
