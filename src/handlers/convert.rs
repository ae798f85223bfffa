//! Coercion handlers
//!
//! CAST_INT_REAL, CAST_INT_CHAR, CAST_CHAR_INT — width-adjusting
//! conversions inserted by the lowering pass.

use crate::error::VmResult;
use crate::state::VmState;

/// Stack: [n:4] -> [r:8]
pub fn handle_cast_int_real(state: &mut VmState) -> VmResult<()> {
    let n = state.pop_i32()?;
    state.push_f64(f64::from(n))
}

/// Clamps to the byte range.
/// Stack: [n:4] -> [c:1]
pub fn handle_cast_int_char(state: &mut VmState) -> VmResult<()> {
    let n = state.pop_i32()?;
    state.push_byte(n.clamp(0, 255) as u8)
}

/// Stack: [c:1] -> [n:4]
pub fn handle_cast_char_int(state: &mut VmState) -> VmResult<()> {
    let c = state.pop_byte()?;
    state.push_i32(i32::from(c))
}
