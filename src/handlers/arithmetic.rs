//! Arithmetic handlers
//!
//! Binary operators pop `a` then `b` and push `b OP a`. Both operands are
//! already of the opcode's exact type; widening casts were inserted at
//! lowering time. Integer arithmetic wraps.

use crate::error::{VmError, VmResult};
use crate::state::VmState;

/// ADD_INT
/// Stack: [b, a] -> [b + a]
pub fn handle_add_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    state.push_i32(b.wrapping_add(a))
}

/// ADD_REAL
pub fn handle_add_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_f64(b + a)
}

/// MINUS_INT
/// Stack: [b, a] -> [b - a]
pub fn handle_minus_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    state.push_i32(b.wrapping_sub(a))
}

/// MINUS_REAL
pub fn handle_minus_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_f64(b - a)
}

/// MULT_INT
pub fn handle_mult_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    state.push_i32(b.wrapping_mul(a))
}

/// MULT_REAL
pub fn handle_mult_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_f64(b * a)
}

/// DIV_INT: `/` on INTEGER operands still yields a REAL quotient
/// Stack: [b, a] -> [b / a as REAL]
pub fn handle_div_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    state.push_f64(f64::from(b) / f64::from(a))
}

/// DIV_REAL
pub fn handle_div_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_f64(b / a)
}

/// MOD_INT: truncated remainder, sign follows the dividend
pub fn handle_mod_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    if a == 0 {
        return Err(VmError::DivisionByZero);
    }
    state.push_i32(b.wrapping_rem(a))
}

/// MOD_REAL: b - trunc(b / a) * a
pub fn handle_mod_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_f64(b - (b / a).trunc() * a)
}

/// FDIV_INT: floor division truncating toward zero, yields INTEGER
pub fn handle_fdiv_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    if a == 0 {
        return Err(VmError::DivisionByZero);
    }
    state.push_i32(b.wrapping_div(a))
}

/// FDIV_REAL: REAL division truncated to INTEGER
pub fn handle_fdiv_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_i32((b / a) as i32)
}

/// POW_INT: exponentiation always yields REAL
pub fn handle_pow_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    let b = state.pop_i32()?;
    state.push_f64(f64::from(b).powf(f64::from(a)))
}

/// POW_REAL
pub fn handle_pow_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    let b = state.pop_f64()?;
    state.push_f64(b.powf(a))
}

/// NEG_INT
pub fn handle_neg_int(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_i32()?;
    state.push_i32(a.wrapping_neg())
}

/// NEG_REAL
pub fn handle_neg_real(state: &mut VmState) -> VmResult<()> {
    let a = state.pop_f64()?;
    state.push_f64(-a)
}
