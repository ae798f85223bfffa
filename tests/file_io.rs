//! File statements end to end: write, append, read back, EOF.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use common::run_program;
use pretty_assertions::assert_eq;

static NEXT_FILE: AtomicU32 = AtomicU32::new(0);

/// Fresh scratch-file path for one test.
fn scratch_file(stem: &str) -> PathBuf {
    let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "pseudovm_{stem}_{}_{n}.txt",
        std::process::id()
    ))
}

#[test]
fn write_then_read_back() {
    let path = scratch_file("roundtrip");
    let path_str = path.to_string_lossy();

    let source = format!(
        "OPENFILE \"{path_str}\" FOR WRITE\n\
         WRITEFILE \"{path_str}\", \"alpha\"\n\
         WRITEFILE \"{path_str}\", 42, ' ', TRUE\n\
         CLOSEFILE \"{path_str}\"\n\
         OPENFILE \"{path_str}\" FOR READ\n\
         DECLARE line : STRING\n\
         READFILE \"{path_str}\", line\n\
         OUTPUT line\n\
         READFILE \"{path_str}\", line\n\
         OUTPUT line\n\
         CLOSEFILE \"{path_str}\"\n"
    );
    assert_eq!(run_program(&source), "alpha\n42 TRUE\n");
    fs::remove_file(&path).ok();
}

#[test]
fn write_mode_truncates_existing_content() {
    let path = scratch_file("truncate");
    let path_str = path.to_string_lossy();
    fs::write(&path, "old content\nmore\n").unwrap();

    let source = format!(
        "OPENFILE \"{path_str}\" FOR WRITE\n\
         WRITEFILE \"{path_str}\", \"new\"\n\
         CLOSEFILE \"{path_str}\"\n"
    );
    run_program(&source);
    assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    fs::remove_file(&path).ok();
}

#[test]
fn append_mode_keeps_existing_content() {
    let path = scratch_file("append");
    let path_str = path.to_string_lossy();
    fs::write(&path, "first\n").unwrap();

    let source = format!(
        "OPENFILE \"{path_str}\" FOR APPEND\n\
         WRITEFILE \"{path_str}\", \"second\"\n\
         CLOSEFILE \"{path_str}\"\n"
    );
    run_program(&source);
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    fs::remove_file(&path).ok();
}

#[test]
fn eof_goes_true_after_the_last_line() {
    let path = scratch_file("eof");
    let path_str = path.to_string_lossy();
    fs::write(&path, "one\ntwo\n").unwrap();

    let source = format!(
        "OPENFILE \"{path_str}\" FOR READ\n\
         DECLARE line : STRING\n\
         DECLARE count : INTEGER\n\
         count <- 0\n\
         READFILE \"{path_str}\", line\n\
         WHILE NOT EOF(\"{path_str}\") DO\n\
         count <- count + 1\n\
         OUTPUT line\n\
         READFILE \"{path_str}\", line\n\
         ENDWHILE\n\
         OUTPUT count\n\
         CLOSEFILE \"{path_str}\"\n"
    );
    assert_eq!(run_program(&source), "one\ntwo\n2\n");
    fs::remove_file(&path).ok();
}

#[test]
fn missing_file_surfaces_a_runtime_error() {
    let path = scratch_file("missing");
    let path_str = path.to_string_lossy();

    let source = format!(
        "OPENFILE \"{path_str}\" FOR READ\n\
         CLOSEFILE \"{path_str}\"\n"
    );
    let error = common::run_expecting_error(&source);
    assert_eq!(error.source, pseudovm::VmError::FileOpen);
}
