//! Logical handlers
//!
//! AND, OR, NOT — BOOL in, BOOL out. Both operands are always evaluated;
//! the language has no short-circuit forms.

use crate::error::VmResult;
use crate::state::VmState;

/// Stack: [b, a] -> [b AND a]
pub fn handle_and(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_bool()?;
    let b = state.pop_bool()?;
    state.push_bool(a && b)
}

/// Stack: [b, a] -> [b OR a]
pub fn handle_or(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_bool()?;
    let b = state.pop_bool()?;
    state.push_bool(a || b)
}

/// Stack: [a] -> [NOT a]
pub fn handle_not(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_bool()?;
    state.push_bool(!a)
}
