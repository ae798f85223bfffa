//! Load-immediate handlers
//!
//! LOAD_INT, LOAD_REAL, LOAD_CHAR, LOAD_BOOL, LOAD_STRING

use crate::error::{VmError, VmResult};
use crate::state::VmState;

/// LOAD_INT: push a 4-byte literal
/// Stack: [] -> [n]
pub fn handle_load_int(state: &mut VmState) -> VmResult<()> {
    let value = state.read_i32()?;
    state.push_i32(value)
}

/// LOAD_REAL: push an 8-byte literal
/// Stack: [] -> [r]
pub fn handle_load_real(state: &mut VmState) -> VmResult<()> {
    let value = state.read_f64()?;
    state.push_f64(value)
}

/// LOAD_CHAR: push a 1-byte literal
/// Stack: [] -> [c]
pub fn handle_load_char(state: &mut VmState) -> VmResult<()> {
    let value = state.read_u8()?;
    state.push_byte(value)
}

/// LOAD_BOOL: push a 1-byte literal
/// Stack: [] -> [b]
pub fn handle_load_bool(state: &mut VmState) -> VmResult<()> {
    let value = state.read_u8()?;
    state.push_byte(u8::from(value != 0))
}

/// LOAD_STRING: allocate the inline string payload on the heap
/// Stack: [] -> [ref]
pub fn handle_load_string(state: &mut VmState) -> VmResult<()> {
    let length = state.read_i32()?;
    if length < 0 {
        return Err(VmError::TruncatedProgram);
    }
    let length = length as usize;
    let bytes = state
        .program
        .get(state.pc..state.pc + length)
        .ok_or(VmError::TruncatedProgram)?
        .to_vec();
    state.pc += length;

    let word = state.heap.alloc_string(bytes)?;
    state.push_ref(word)
}
