//! Builtin function dispatch
//!
//! CALL_BUILTIN carries a small integer index into a flat table; call
//! sites stay compact and adding a builtin means appending a handler
//! here and a row in `builtins`.

use crate::error::{VmError, VmResult};
use crate::heap::Obj;
use crate::state::VmState;

/// CALL_BUILTIN: dispatch on the operand index
pub fn handle_call_builtin(state: &mut VmState) -> VmResult<()> {
    let index = state.read_i32()?;
    match index {
        0 => substring(state),
        1 => length(state),
        2 => lcase(state),
        3 => ucase(state),
        4 => random_between(state),
        5 => rnd(state),
        6 => int(state),
        7 => eof(state),
        8 => char_at(state),
        _ => Err(VmError::InvalidOpcode),
    }
}

fn pop_string(state: &mut VmState) -> VmResult<Vec<u8>> {
    let word = state.pop_ref()?;
    match state.heap.get(word)? {
        Obj::Str(bytes) => Ok(bytes.clone()),
        _ => Err(VmError::SegmentationFault),
    }
}

/// SUBSTRING(s, start, length): 1-based start, allocates a new string
/// Stack: [sRef, start, length] -> [ref]
fn substring(state: &mut VmState) -> VmResult<()> {
    let length = state.pop_i32()?;
    let start = state.pop_i32()?;
    let bytes = pop_string(state)?;

    let total = bytes.len() as i32;
    if length < 0 || start + length - 1 > total {
        return Err(VmError::SubstringOverrun);
    }
    if start <= 0 || start > total {
        return Err(VmError::SubstringStart);
    }

    let from = (start - 1) as usize;
    let sub = bytes[from..from + length as usize].to_vec();
    let word = state.heap.alloc_string(sub)?;
    state.push_ref(word)
}

/// LENGTH(s): byte length
/// Stack: [sRef] -> [n]
fn length(state: &mut VmState) -> VmResult<()> {
    let bytes = pop_string(state)?;
    state.push_i32(bytes.len() as i32)
}

/// LCASE(s): ASCII lowercase, allocates
/// Stack: [sRef] -> [ref]
fn lcase(state: &mut VmState) -> VmResult<()> {
    let bytes = pop_string(state)?;
    let lowered: Vec<u8> = bytes.iter().map(|b| b.to_ascii_lowercase()).collect();
    let word = state.heap.alloc_string(lowered)?;
    state.push_ref(word)
}

/// UCASE(s): ASCII uppercase, allocates
/// Stack: [sRef] -> [ref]
fn ucase(state: &mut VmState) -> VmResult<()> {
    let bytes = pop_string(state)?;
    let raised: Vec<u8> = bytes.iter().map(|b| b.to_ascii_uppercase()).collect();
    let word = state.heap.alloc_string(raised)?;
    state.push_ref(word)
}

/// RANDOMBETWEEN(min, max): uniform, inclusive on both ends
/// Stack: [min, max] -> [n]
fn random_between(state: &mut VmState) -> VmResult<()> {
    let max = state.pop_i32()?;
    let min = state.pop_i32()?;
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    state.push_i32(fastrand::i32(lo..=hi))
}

/// RND(): uniform REAL in [0, 1)
/// Stack: [] -> [r]
fn rnd(state: &mut VmState) -> VmResult<()> {
    state.push_f64(fastrand::f64())
}

/// INT(r): truncation toward zero
/// Stack: [r] -> [n]
fn int(state: &mut VmState) -> VmResult<()> {
    let r = state.pop_f64()?;
    state.push_i32(r.trunc() as i32)
}

/// EOF(f): sticky end-of-file flag of the file stream
/// Stack: [fileRef] -> [b]
fn eof(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    let Obj::File(handle) = state.heap.get(word)? else {
        return Err(VmError::SegmentationFault);
    };
    let at_eof = handle.at_eof;
    state.push_bool(at_eof)
}

/// CHARAT(s, pos): 1-based index
/// Stack: [sRef, pos] -> [c]
fn char_at(state: &mut VmState) -> VmResult<()> {
    let pos = state.pop_i32()?;
    let bytes = pop_string(state)?;
    if pos <= 0 || pos as usize > bytes.len() {
        return Err(VmError::StringIndex);
    }
    state.push_byte(bytes[(pos - 1) as usize])
}
