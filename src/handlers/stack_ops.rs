//! Stack hygiene handlers
//!
//! POP_1B, POP_4B, POP_8B discard a statement-expression's value by width;
//! COPY_INT duplicates the CASE scrutinee ahead of each guard test.

use crate::error::VmResult;
use crate::state::VmState;

/// Stack: [v:1] -> []
pub fn handle_pop_1b(state: &mut VmState) -> VmResult<()> {
    state.pop_byte()?;
    Ok(())
}

/// Stack: [v:4] -> []
pub fn handle_pop_4b(state: &mut VmState) -> VmResult<()> {
    state.pop_i32()?;
    Ok(())
}

/// Stack: [v:8] -> []
pub fn handle_pop_8b(state: &mut VmState) -> VmResult<()> {
    state.pop_u64()?;
    Ok(())
}

/// Stack: [n] -> [n, n]
pub fn handle_copy_int(state: &mut VmState) -> VmResult<()> {
    let n = state.pop_i32()?;
    state.push_i32(n)?;
    state.push_i32(n)
}
