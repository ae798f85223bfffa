//! Slot store/fetch handlers
//!
//! STORE_*/FETCH_* address absolute stack offsets, the R* variants add the
//! current frame base, and the *_REF_* variants go through an 8-byte stack
//! reference taken earlier by GET_REF/RGET_REF (BYREF parameters).
//!
//! Every store re-pushes the stored value: assignment is an expression.

use crate::error::{VmError, VmResult};
use crate::heap::{as_stack_slot, stack_ref};
use crate::state::VmState;

/// Resolve a popped offset, adding the frame base for relative opcodes.
fn slot_pos(state: &mut VmState, relative: bool) -> VmResult<usize> {
    let offset = state.pop_i32()?;
    let base = if relative { state.frame_base()? as i64 } else { 0 };
    let pos = base + i64::from(offset);
    if pos < 0 {
        return Err(VmError::InvalidStackSlot);
    }
    Ok(pos as usize)
}

/// Stack: [value, offset] -> [value]
fn store(state: &mut VmState, relative: bool, width: usize, is_ref: bool) -> VmResult<()> {
    let pos = slot_pos(state, relative)?;
    let mut bytes = [0u8; 8];
    for i in (0..width).rev() {
        bytes[i] = state.pop_byte()?;
    }
    state.store_at(pos, &bytes[..width], is_ref)?;
    for (i, byte) in bytes[..width].iter().enumerate() {
        state.stack.push(*byte, is_ref && i == 0)?;
    }
    Ok(())
}

/// Stack: [offset] -> [value]
fn fetch(state: &mut VmState, relative: bool, width: usize, is_ref: bool) -> VmResult<()> {
    let pos = slot_pos(state, relative)?;
    for i in 0..width {
        let byte = state.stack.get(pos + i)?;
        state.stack.push(byte, is_ref && i == 0)?;
    }
    Ok(())
}

pub fn handle_store_int(state: &mut VmState) -> VmResult<()> {
    store(state, false, 4, false)
}

pub fn handle_store_real(state: &mut VmState) -> VmResult<()> {
    store(state, false, 8, false)
}

pub fn handle_store_char(state: &mut VmState) -> VmResult<()> {
    store(state, false, 1, false)
}

pub fn handle_store_bool(state: &mut VmState) -> VmResult<()> {
    store(state, false, 1, false)
}

pub fn handle_store_ref(state: &mut VmState) -> VmResult<()> {
    store(state, false, 8, true)
}

pub fn handle_fetch_int(state: &mut VmState) -> VmResult<()> {
    fetch(state, false, 4, false)
}

pub fn handle_fetch_real(state: &mut VmState) -> VmResult<()> {
    fetch(state, false, 8, false)
}

pub fn handle_fetch_char(state: &mut VmState) -> VmResult<()> {
    fetch(state, false, 1, false)
}

pub fn handle_fetch_bool(state: &mut VmState) -> VmResult<()> {
    fetch(state, false, 1, false)
}

pub fn handle_fetch_ref(state: &mut VmState) -> VmResult<()> {
    fetch(state, false, 8, true)
}

pub fn handle_rstore_int(state: &mut VmState) -> VmResult<()> {
    store(state, true, 4, false)
}

pub fn handle_rstore_real(state: &mut VmState) -> VmResult<()> {
    store(state, true, 8, false)
}

pub fn handle_rstore_char(state: &mut VmState) -> VmResult<()> {
    store(state, true, 1, false)
}

pub fn handle_rstore_bool(state: &mut VmState) -> VmResult<()> {
    store(state, true, 1, false)
}

pub fn handle_rstore_ref(state: &mut VmState) -> VmResult<()> {
    store(state, true, 8, true)
}

pub fn handle_rfetch_int(state: &mut VmState) -> VmResult<()> {
    fetch(state, true, 4, false)
}

pub fn handle_rfetch_real(state: &mut VmState) -> VmResult<()> {
    fetch(state, true, 8, false)
}

pub fn handle_rfetch_char(state: &mut VmState) -> VmResult<()> {
    fetch(state, true, 1, false)
}

pub fn handle_rfetch_bool(state: &mut VmState) -> VmResult<()> {
    fetch(state, true, 1, false)
}

pub fn handle_rfetch_ref(state: &mut VmState) -> VmResult<()> {
    fetch(state, true, 8, true)
}

/// Pop an 8-byte reference and require it to point into the stack array.
fn pop_stack_slot(state: &mut VmState) -> VmResult<usize> {
    let word = state.pop_ref()?;
    let slot = as_stack_slot(word).ok_or(VmError::SegmentationFault)?;
    if slot >= state.stack.capacity() {
        return Err(VmError::SegmentationFault);
    }
    Ok(slot)
}

/// Stack: [value, ref] -> [value]
fn store_through_ref(state: &mut VmState, width: usize) -> VmResult<()> {
    let slot = pop_stack_slot(state)?;
    let mut bytes = [0u8; 8];
    for i in (0..width).rev() {
        bytes[i] = state.pop_byte()?;
    }
    state.store_at(slot, &bytes[..width], false)?;
    for byte in &bytes[..width] {
        state.push_byte(*byte)?;
    }
    Ok(())
}

/// Stack: [ref] -> [value]
fn fetch_through_ref(state: &mut VmState, width: usize) -> VmResult<()> {
    let slot = pop_stack_slot(state)?;
    for i in 0..width {
        let byte = state.stack.get(slot + i)?;
        state.push_byte(byte)?;
    }
    Ok(())
}

pub fn handle_store_ref_int(state: &mut VmState) -> VmResult<()> {
    store_through_ref(state, 4)
}

pub fn handle_store_ref_real(state: &mut VmState) -> VmResult<()> {
    store_through_ref(state, 8)
}

pub fn handle_store_ref_char(state: &mut VmState) -> VmResult<()> {
    store_through_ref(state, 1)
}

pub fn handle_store_ref_bool(state: &mut VmState) -> VmResult<()> {
    store_through_ref(state, 1)
}

pub fn handle_fetch_ref_int(state: &mut VmState) -> VmResult<()> {
    fetch_through_ref(state, 4)
}

pub fn handle_fetch_ref_real(state: &mut VmState) -> VmResult<()> {
    fetch_through_ref(state, 8)
}

pub fn handle_fetch_ref_char(state: &mut VmState) -> VmResult<()> {
    fetch_through_ref(state, 1)
}

pub fn handle_fetch_ref_bool(state: &mut VmState) -> VmResult<()> {
    fetch_through_ref(state, 1)
}

/// GET_REF: take a tagged reference to an absolute stack slot
/// Stack: [offset] -> [ref]
pub fn handle_get_ref(state: &mut VmState) -> VmResult<()> {
    let pos = slot_pos(state, false)?;
    if pos >= state.stack.capacity() {
        return Err(VmError::InvalidStackSlot);
    }
    state.push_ref(stack_ref(pos))
}

/// RGET_REF: take a tagged reference to a frame-relative stack slot
/// Stack: [offset] -> [ref]
pub fn handle_rget_ref(state: &mut VmState) -> VmResult<()> {
    let pos = slot_pos(state, true)?;
    if pos >= state.stack.capacity() {
        return Err(VmError::InvalidStackSlot);
    }
    state.push_ref(stack_ref(pos))
}
