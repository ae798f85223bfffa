//! Persisted bytecode: .pcbc write/load round trips.

use std::fs;
use std::io::Cursor;

use pretty_assertions::assert_eq;
use pseudovm::bytecode::{BytecodeStream, BYTECODE_EXTENSION};
use pseudovm::{compile_source, engine, VmState};

fn scratch_target(stem: &str) -> String {
    std::env::temp_dir()
        .join(format!("pseudovm_{stem}_{}", std::process::id()))
        .to_string_lossy()
        .into_owned()
}

fn run_stream(stream: &BytecodeStream) -> String {
    let mut captured = Vec::new();
    let mut state = VmState::with_io(
        stream.as_bytes(),
        Box::new(Cursor::new(Vec::new())),
        Box::new(&mut captured),
    );
    engine::run(&mut state).unwrap();
    drop(state);
    String::from_utf8(captured).unwrap()
}

#[test]
fn compiled_program_survives_a_disk_round_trip() {
    let source = "OUTPUT 3 + 4 * 2\nOUTPUT \"persisted\"\n";
    let stream = compile_source(source).unwrap();
    let direct = run_stream(&stream);

    let target = scratch_target("roundtrip");
    stream.write_to_file(&target).unwrap();
    let loaded = BytecodeStream::read_from_file(&target).unwrap();

    assert_eq!(loaded.as_bytes(), stream.as_bytes());
    assert_eq!(run_stream(&loaded), direct);
    fs::remove_file(format!("{target}{BYTECODE_EXTENSION}")).ok();
}

#[test]
fn writer_appends_the_extension_and_loader_tolerates_both() {
    let stream = compile_source("OUTPUT 1\n").unwrap();
    let target = scratch_target("extension");
    stream.write_to_file(&target).unwrap();

    let on_disk = format!("{target}{BYTECODE_EXTENSION}");
    assert!(fs::metadata(&on_disk).is_ok());

    let bare = BytecodeStream::read_from_file(&target).unwrap();
    let explicit = BytecodeStream::read_from_file(&on_disk).unwrap();
    assert_eq!(bare.as_bytes(), explicit.as_bytes());
    fs::remove_file(&on_disk).ok();
}

#[test]
fn header_is_a_little_endian_byte_count() {
    let stream = compile_source("OUTPUT 1\n").unwrap();
    let target = scratch_target("header");
    stream.write_to_file(&target).unwrap();

    let on_disk = format!("{target}{BYTECODE_EXTENSION}");
    let bytes = fs::read(&on_disk).unwrap();
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    assert_eq!(count, stream.len());
    assert_eq!(bytes.len(), 4 + count);
    assert_eq!(&bytes[4..], stream.as_bytes());
    fs::remove_file(&on_disk).ok();
}

#[test]
fn truncated_file_fails_to_load() {
    let stream = compile_source("OUTPUT 1\n").unwrap();
    let target = scratch_target("truncated");
    stream.write_to_file(&target).unwrap();

    let on_disk = format!("{target}{BYTECODE_EXTENSION}");
    let mut bytes = fs::read(&on_disk).unwrap();
    bytes.truncate(bytes.len() - 2);
    fs::write(&on_disk, &bytes).unwrap();

    assert!(BytecodeStream::read_from_file(&target).is_err());
    fs::remove_file(&on_disk).ok();
}
