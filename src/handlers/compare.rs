//! Comparison handlers
//!
//! Each comparison pops `a` then `b` and pushes BOOL(`b OP a`). STRING
//! comparisons are lexicographic byte comparisons; when one string is a
//! proper prefix of the other, the shorter sorts first. Multi-byte text
//! therefore compares by its encoding, consistent with the language's
//! byte-oriented CHAR semantics.

use std::cmp::Ordering;

use crate::error::{VmError, VmResult};
use crate::heap::Obj;
use crate::state::VmState;

fn pop_ints(state: &mut VmState) -> VmResult<(i32, i32)> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    Ok((a, b))
}

fn pop_reals(state: &mut VmState) -> VmResult<(f64, f64)> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    Ok((a, b))
}

fn pop_bytes(state: &mut VmState) -> VmResult<(u8, u8)> {
    let a = state.pop_byte()?;
    let b = state.pop_byte()?;
    Ok((a, b))
}

fn pop_refs(state: &mut VmState) -> VmResult<(u64, u64)> {
    let a = state.pop_ref()?;
    let b = state.pop_ref()?;
    Ok((a, b))
}

/// Pop two string references and compare the second-popped against the
/// first-popped (b against a).
fn pop_string_ordering(state: &mut VmState) -> VmResult<Ordering> {
    let a = state.pop_ref()?;
    let b = state.pop_ref()?;
    let Obj::Str(a_bytes) = state.heap.get(a)? else {
        return Err(VmError::SegmentationFault);
    };
    let Obj::Str(b_bytes) = state.heap.get(b)? else {
        return Err(VmError::SegmentationFault);
    };
    Ok(b_bytes.as_slice().cmp(a_bytes.as_slice()))
}

pub fn handle_eq_int(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_ints(state)?;
    state.push_bool(b == a)
}

pub fn handle_eq_real(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_reals(state)?;
    state.push_bool(b == a)
}

pub fn handle_eq_bool(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_bytes(state)?;
    state.push_bool(b == a)
}

/// EQ_REF: identity comparison on the raw reference words
pub fn handle_eq_ref(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_refs(state)?;
    state.push_bool(b == a)
}

pub fn handle_eq_string(state: &mut VmState) -> VmResult<()> {
    let ordering = pop_string_ordering(state)?;
    state.push_bool(ordering == Ordering::Equal)
}

pub fn handle_neq_int(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_ints(state)?;
    state.push_bool(b != a)
}

pub fn handle_neq_real(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_reals(state)?;
    state.push_bool(b != a)
}

pub fn handle_neq_bool(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_bytes(state)?;
    state.push_bool(b != a)
}

pub fn handle_neq_ref(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_refs(state)?;
    state.push_bool(b != a)
}

pub fn handle_neq_string(state: &mut VmState) -> VmResult<()> {
    let ordering = pop_string_ordering(state)?;
    state.push_bool(ordering != Ordering::Equal)
}

pub fn handle_less_int(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_ints(state)?;
    state.push_bool(b < a)
}

pub fn handle_less_real(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_reals(state)?;
    state.push_bool(b < a)
}

pub fn handle_less_bool(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_bytes(state)?;
    state.push_bool(b < a)
}

pub fn handle_less_ref(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_refs(state)?;
    state.push_bool(b < a)
}

pub fn handle_less_string(state: &mut VmState) -> VmResult<()> {
    let ordering = pop_string_ordering(state)?;
    state.push_bool(ordering == Ordering::Less)
}

pub fn handle_less_eq_int(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_ints(state)?;
    state.push_bool(b <= a)
}

pub fn handle_less_eq_real(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_reals(state)?;
    state.push_bool(b <= a)
}

pub fn handle_less_eq_bool(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_bytes(state)?;
    state.push_bool(b <= a)
}

pub fn handle_less_eq_ref(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_refs(state)?;
    state.push_bool(b <= a)
}

pub fn handle_less_eq_string(state: &mut VmState) -> VmResult<()> {
    let ordering = pop_string_ordering(state)?;
    state.push_bool(ordering != Ordering::Greater)
}

pub fn handle_greater_int(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_ints(state)?;
    state.push_bool(b > a)
}

pub fn handle_greater_real(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_reals(state)?;
    state.push_bool(b > a)
}

pub fn handle_greater_bool(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_bytes(state)?;
    state.push_bool(b > a)
}

pub fn handle_greater_ref(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_refs(state)?;
    state.push_bool(b > a)
}

pub fn handle_greater_string(state: &mut VmState) -> VmResult<()> {
    let ordering = pop_string_ordering(state)?;
    state.push_bool(ordering == Ordering::Greater)
}

pub fn handle_greater_eq_int(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_ints(state)?;
    state.push_bool(b >= a)
}

pub fn handle_greater_eq_real(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_reals(state)?;
    state.push_bool(b >= a)
}

pub fn handle_greater_eq_bool(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_bytes(state)?;
    state.push_bool(b >= a)
}

pub fn handle_greater_eq_ref(state: &mut VmState) -> VmResult<()> {
    let (a, b) = pop_refs(state)?;
    state.push_bool(b >= a)
}

pub fn handle_greater_eq_string(state: &mut VmState) -> VmResult<()> {
    let ordering = pop_string_ordering(state)?;
    state.push_bool(ordering != Ordering::Less)
}
