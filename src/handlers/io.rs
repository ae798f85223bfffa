//! Console I/O handlers
//!
//! INPUT_* read from the VM's input stream (stdin when run from the CLI);
//! OUTPUT_* write to its output stream. Numeric and boolean reads consume
//! one whitespace-delimited token and discard the rest of the line;
//! INPUT_CHAR consumes exactly one byte before the flush.

use std::io::Write;

use crate::error::{VmError, VmResult};
use crate::heap::Obj;
use crate::state::VmState;

/// First whitespace-delimited token of the next non-blank input line.
fn read_token(state: &mut VmState) -> VmResult<String> {
    loop {
        let line = state.input_line()?.ok_or(VmError::Io)?;
        let text = String::from_utf8_lossy(&line).into_owned();
        if let Some(token) = text.split_whitespace().next() {
            return Ok(token.to_string());
        }
    }
}

/// INPUT_INT
/// Stack: [] -> [n]
pub fn handle_input_int(state: &mut VmState) -> VmResult<()> {
    state.out().flush().ok();
    let token = read_token(state)?;
    let n: i32 = token.parse().map_err(|_| VmError::Io)?;
    state.push_i32(n)
}

/// INPUT_REAL
/// Stack: [] -> [r]
pub fn handle_input_real(state: &mut VmState) -> VmResult<()> {
    state.out().flush().ok();
    let token = read_token(state)?;
    let r: f64 = token.parse().map_err(|_| VmError::Io)?;
    state.push_f64(r)
}

/// INPUT_CHAR: consumes exactly one byte, then the rest of the line
/// Stack: [] -> [c]
pub fn handle_input_char(state: &mut VmState) -> VmResult<()> {
    state.out().flush().ok();
    let byte = state.input_byte()?.ok_or(VmError::Io)?;
    state.discard_input_line()?;
    state.push_byte(byte)
}

/// INPUT_BOOL: TRUE/true/True (prefix match) reads as true, anything else
/// as false
/// Stack: [] -> [b]
pub fn handle_input_bool(state: &mut VmState) -> VmResult<()> {
    state.out().flush().ok();
    let token = read_token(state)?;
    let value =
        token.starts_with("TRUE") || token.starts_with("true") || token.starts_with("True");
    state.push_bool(value)
}

/// INPUT_STRING: one line, without its terminating newline
/// Stack: [] -> [ref]
pub fn handle_input_string(state: &mut VmState) -> VmResult<()> {
    state.out().flush().ok();
    let line = state.input_line()?.ok_or(VmError::Io)?;
    let word = state.heap.alloc_string(line)?;
    state.push_ref(word)
}

/// OUTPUT_INT
pub fn handle_output_int(state: &mut VmState) -> VmResult<()> {
    let n = state.pop_i32()?;
    write!(state.out(), "{n}").map_err(|_| VmError::Io)
}

/// OUTPUT_REAL: six decimal places
pub fn handle_output_real(state: &mut VmState) -> VmResult<()> {
    let r = state.pop_f64()?;
    write!(state.out(), "{r:.6}").map_err(|_| VmError::Io)
}

/// OUTPUT_CHAR
pub fn handle_output_char(state: &mut VmState) -> VmResult<()> {
    let c = state.pop_byte()?;
    state.out().write_all(&[c]).map_err(|_| VmError::Io)
}

/// OUTPUT_BOOL
pub fn handle_output_bool(state: &mut VmState) -> VmResult<()> {
    let b = state.pop_bool()?;
    write!(state.out(), "{}", if b { "TRUE" } else { "FALSE" }).map_err(|_| VmError::Io)
}

/// OUTPUT_REF: prints the raw reference word, for debugging
pub fn handle_output_ref(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    write!(state.out(), "[{word:#x}]").map_err(|_| VmError::Io)
}

/// OUTPUT_STRING
pub fn handle_output_string(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    let Obj::Str(bytes) = state.heap.get(word)? else {
        return Err(VmError::SegmentationFault);
    };
    let bytes = bytes.clone();
    state.out().write_all(&bytes).map_err(|_| VmError::Io)
}

/// OUTPUT_NL
pub fn handle_output_nl(state: &mut VmState) -> VmResult<()> {
    state.out().write_all(b"\n").map_err(|_| VmError::Io)
}
