//! Functions, procedures, recursion and by-reference parameters.

mod common;

use common::run_program;
use indoc::indoc;
use pretty_assertions::assert_eq;

#[test]
fn function_call_returns_a_value() {
    let source = indoc! {"
        FUNCTION double(n : INTEGER) RETURNS INTEGER
        RETURN n * 2
        ENDFUNCTION
        OUTPUT double(21)
    "};
    assert_eq!(run_program(source), "42\n");
}

#[test]
fn procedure_call_runs_its_body() {
    let source = indoc! {"
        PROCEDURE greet()
        OUTPUT \"hi\"
        ENDPROCEDURE
        CALL greet()
    "};
    assert_eq!(run_program(source), "hi\n");
}

#[test]
fn byref_parameter_mutates_the_caller() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 5
        PROCEDURE inc(BYREF n : INTEGER)
        n <- n + 1
        ENDPROCEDURE
        CALL inc(x)
        OUTPUT x
    "};
    assert_eq!(run_program(source), "6\n");
}

#[test]
fn byval_parameter_leaves_the_caller_alone() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 5
        PROCEDURE bump(n : INTEGER)
        n <- n + 1
        OUTPUT n
        ENDPROCEDURE
        CALL bump(x)
        OUTPUT x
    "};
    assert_eq!(run_program(source), "6\n5\n");
}

#[test]
fn byref_reads_go_through_the_reference() {
    let source = indoc! {"
        DECLARE x : INTEGER
        x <- 7
        PROCEDURE show(BYREF n : INTEGER)
        OUTPUT n
        ENDPROCEDURE
        CALL show(x)
    "};
    assert_eq!(run_program(source), "7\n");
}

#[test]
fn recursion_carries_separate_frames() {
    let source = indoc! {"
        FUNCTION fact(n : INTEGER) RETURNS INTEGER
        IF n <= 1
        THEN
        RETURN 1
        ENDIF
        RETURN n * fact(n - 1)
        ENDFUNCTION
        OUTPUT fact(6)
    "};
    assert_eq!(run_program(source), "720\n");
}

#[test]
fn fibonacci_with_two_recursive_calls() {
    let source = indoc! {"
        FUNCTION fib(n : INTEGER) RETURNS INTEGER
        IF n < 2
        THEN
        RETURN n
        ENDIF
        RETURN fib(n - 1) + fib(n - 2)
        ENDFUNCTION
        OUTPUT fib(10)
    "};
    assert_eq!(run_program(source), "55\n");
}

#[test]
fn locals_are_frame_relative_per_call() {
    let source = indoc! {"
        PROCEDURE p(n : INTEGER)
        DECLARE local : INTEGER
        local <- n * 10
        OUTPUT local
        ENDPROCEDURE
        CALL p(1)
        CALL p(2)
    "};
    assert_eq!(run_program(source), "10\n20\n");
}

#[test]
fn function_returning_string_keeps_the_reference_alive() {
    let source = indoc! {"
        FUNCTION tag(s : STRING) RETURNS STRING
        RETURN s & \"!\"
        ENDFUNCTION
        OUTPUT tag(\"done\")
    "};
    assert_eq!(run_program(source), "done!\n");
}

#[test]
fn integer_return_widens_to_declared_real() {
    let source = indoc! {"
        FUNCTION half(n : INTEGER) RETURNS REAL
        IF n MOD 2 = 0
        THEN
        RETURN n DIV 2
        ENDIF
        RETURN n / 2
        ENDFUNCTION
        OUTPUT half(4)
        OUTPUT half(5)
    "};
    assert_eq!(run_program(source), "2.000000\n2.500000\n");
}

#[test]
fn array_parameter_shares_the_backing_store() {
    let source = indoc! {"
        DECLARE a : ARRAY[1:3] OF INTEGER
        PROCEDURE fill(arr : ARRAY[] OF INTEGER)
        DECLARE i : INTEGER
        FOR i <- 1 TO 3
        arr[i] <- i * 2
        NEXT i
        ENDPROCEDURE
        CALL fill(a)
        OUTPUT a[1], a[2], a[3]
    "};
    assert_eq!(run_program(source), "246\n");
}

#[test]
fn procedures_may_call_earlier_procedures() {
    let source = indoc! {"
        PROCEDURE one()
        OUTPUT 1
        ENDPROCEDURE
        PROCEDURE both()
        CALL one()
        OUTPUT 2
        ENDPROCEDURE
        CALL both()
    "};
    assert_eq!(run_program(source), "1\n2\n");
}
