//! Control-flow handlers
//!
//! BRANCH, B_FALSE, CALL_SUB, DO_CALL, RETURN, RETURN_NIL, EXIT
//!
//! Call convention: CALL_SUB latches the current stack top as the callee's
//! frame base, argument values (or GET_REF references) are pushed on top,
//! and DO_CALL records the frame and jumps to the entry address. RETURN
//! truncates the operand stack back to the frame base, leaving only the
//! returned bytes.

use crate::error::VmResult;
use crate::state::VmState;

/// BRANCH: unconditional jump to an absolute target
pub fn handle_branch(state: &mut VmState) -> VmResult<()> {
    let target = state.read_i32()?;
    state.jump(target)
}

/// B_FALSE: pop a BOOL, jump when it is false
/// Stack: [cond] -> []
pub fn handle_branch_false(state: &mut VmState) -> VmResult<()> {
    let target = state.read_i32()?;
    let condition = state.pop_bool()?;
    if !condition {
        state.jump(target)?;
    }
    Ok(())
}

/// CALL_SUB: latch the callee's frame base before arguments are pushed
pub fn handle_call_sub(state: &mut VmState) -> VmResult<()> {
    state.next_call_base = state.stack.len();
    Ok(())
}

/// DO_CALL: push (return PC, latched frame base), jump to the entry
pub fn handle_do_call(state: &mut VmState) -> VmResult<()> {
    let entry = state.read_i32()?;
    let return_pc = state.pc;
    state.call_stack.push(return_pc, state.next_call_base)?;
    state.jump(entry)
}

/// RETURN: pop the return value, tear down the frame, re-push the value.
/// Ref tags on the returned bytes survive, so a returned STRING or ARRAY
/// stays visible to the collector.
/// Stack: [frame..., value] -> [value]
pub fn handle_return(state: &mut VmState) -> VmResult<()> {
    let size = state.read_u8()? as usize;

    let mut saved = [(0u8, false); 8];
    for i in (0..size.min(8)).rev() {
        saved[i] = state.stack.pop_tagged()?;
    }

    let frame = state.call_stack.pop()?;
    state.pc = frame.return_pc;
    state.stack.truncate(frame.frame_base);

    for (value, is_ref) in &saved[..size.min(8)] {
        state.stack.push(*value, *is_ref)?;
    }
    Ok(())
}

/// RETURN_NIL: tear down a procedure frame, no value
/// Stack: [frame...] -> []
pub fn handle_return_nil(state: &mut VmState) -> VmResult<()> {
    let frame = state.call_stack.pop()?;
    state.pc = frame.return_pc;
    state.stack.truncate(frame.frame_base);
    Ok(())
}

/// EXIT: halt the VM cleanly
pub fn handle_exit(state: &mut VmState) -> VmResult<()> {
    state.halted = true;
    Ok(())
}
