//! Array handlers
//!
//! CREATE_ARRAY, FETCH_ARRAY_ELEM, STORE_ARRAY_ELEM
//!
//! Element storage is column-major with little-endian elements:
//! `(i1 - base1) * len0 * elem_size + (i0 - base0) * elem_size`.

use crate::error::{VmError, VmResult};
use crate::heap::Obj;
use crate::state::VmState;

/// CREATE_ARRAY: allocate a heap array and push its reference.
/// A 1-D array is created with base1 = top1 = 0.
/// Stack: [base0, top0, base1, top1, elemSize] -> [ref]
pub fn handle_create_array(state: &mut VmState) -> VmResult<()> {
    let elem_size = state.pop_i32()?;
    let top1 = state.pop_i32()?;
    let base1 = state.pop_i32()?;
    let top0 = state.pop_i32()?;
    let base0 = state.pop_i32()?;

    let len0 = top0 - base0 + 1;
    let len1 = top1 - base1 + 1;
    if len0 <= 0 || len1 <= 0 || !matches!(elem_size, 1 | 4 | 8) {
        return Err(VmError::ArrayOutOfBounds);
    }

    let word = state
        .heap
        .alloc_array(base0, len0, base1, len1, elem_size as usize)?;
    state.push_ref(word)
}

struct ElemAddr {
    offset: usize,
    elem_size: usize,
}

/// Bounds-check `(i0, i1)` against the array behind `word` and return the
/// element's byte offset.
fn elem_addr(state: &VmState, word: u64, i0: i32, i1: i32) -> VmResult<ElemAddr> {
    let Obj::Array {
        base0,
        base1,
        len0,
        len1,
        elem_size,
        ..
    } = state.heap.get(word)?
    else {
        return Err(VmError::SegmentationFault);
    };

    if i0 < *base0 || i0 >= base0 + len0 || i1 < *base1 || i1 >= base1 + len1 {
        return Err(VmError::ArrayOutOfBounds);
    }

    let offset = ((i1 - base1) as usize * *len0 as usize + (i0 - base0) as usize) * elem_size;
    Ok(ElemAddr {
        offset,
        elem_size: *elem_size,
    })
}

/// FETCH_ARRAY_ELEM: push the element's bytes
/// Stack: [ref, i0, i1] -> [value]
pub fn handle_fetch_array_elem(state: &mut VmState) -> VmResult<()> {
    let i1 = state.pop_i32()?;
    let i0 = state.pop_i32()?;
    let word = state.pop_ref()?;

    let addr = elem_addr(state, word, i0, i1)?;
    let mut bytes = [0u8; 8];
    if let Obj::Array { data, .. } = state.heap.get(word)? {
        bytes[..addr.elem_size].copy_from_slice(&data[addr.offset..addr.offset + addr.elem_size]);
    }
    for byte in &bytes[..addr.elem_size] {
        state.push_byte(*byte)?;
    }
    Ok(())
}

/// STORE_ARRAY_ELEM: write the element, then re-push the stored value
/// Stack: [value, ref, i0, i1] -> [value]
pub fn handle_store_array_elem(state: &mut VmState) -> VmResult<()> {
    let i1 = state.pop_i32()?;
    let i0 = state.pop_i32()?;
    let word = state.pop_ref()?;

    let addr = elem_addr(state, word, i0, i1)?;
    let mut bytes = [0u8; 8];
    for i in (0..addr.elem_size).rev() {
        bytes[i] = state.pop_byte()?;
    }
    if let Obj::Array { data, .. } = state.heap.get_mut(word)? {
        data[addr.offset..addr.offset + addr.elem_size].copy_from_slice(&bytes[..addr.elem_size]);
    }
    for byte in &bytes[..addr.elem_size] {
        state.push_byte(*byte)?;
    }
    Ok(())
}
