//! VM execution engine.
//!
//! The fetch-execute loop runs one instruction at a time, strictly
//! sequentially. After every executed instruction the heap occupancy is
//! checked and, past the three-quarter mark, the collector runs: mark from
//! the operand stack's tagged reference bytes, then sweep. Any handler
//! error halts the machine; the error is surfaced latched to the PC of the
//! instruction that raised it.

use std::io::Write;

use crate::error::{RuntimeError, VmError, VmResult};
use crate::handlers;
use crate::opcodes::OpCode;
use crate::state::VmState;

/// Execute a program to completion in a fresh VM wired to stdio.
pub fn execute(program: &[u8]) -> Result<(), RuntimeError> {
    let mut state = VmState::new(program);
    run(&mut state)
}

/// Main execution loop.
pub fn run(state: &mut VmState) -> Result<(), RuntimeError> {
    while !state.halted && state.pc < state.program.len() {
        let at = state.pc;
        step(state).map_err(|source| RuntimeError { pc: at, source })?;

        if state.heap.wants_collection() {
            collect(state);
        }
    }
    state.out().flush().ok();
    Ok(())
}

/// Fetch and execute a single instruction.
fn step(state: &mut VmState) -> VmResult<()> {
    let byte = state.read_u8()?;
    let op = OpCode::try_from(byte).map_err(|_| VmError::InvalidOpcode)?;
    if state.trace {
        eprintln!("{:>6} | {}", state.pc - 1, op.name());
    }
    dispatch(state, op)
}

/// Run the garbage collector: mark every heap object reachable from the
/// operand stack, then sweep.
pub fn collect(state: &mut VmState) {
    mark_roots(state);
    let collected = state.heap.sweep();
    if state.trace {
        eprintln!(
            "    gc | reclaimed {collected} cells, {} in use",
            state.heap.in_use()
        );
    }
}

/// Root scan: every stack byte whose ref bit is set starts a candidate
/// 8-byte reference. Reconstruct it, and when it names a live heap cell,
/// mark the cell and skip past the reference's remaining bytes.
fn mark_roots(state: &mut VmState) {
    let mut i = 0;
    while i < state.stack.len() {
        if state.stack.is_ref_at(i) && i + 8 <= state.stack.len() {
            let mut bytes = [0u8; 8];
            for (k, byte) in bytes.iter_mut().enumerate() {
                *byte = state.stack.get(i + k).unwrap_or(0);
            }
            let word = u64::from_le_bytes(bytes);
            if state.heap.is_valid(word) {
                state.heap.mark(word);
                i += 8;
                continue;
            }
        }
        i += 1;
    }
}

/// Dispatch opcode to handler
fn dispatch(state: &mut VmState, op: OpCode) -> VmResult<()> {
    match op {
        OpCode::Nop => Ok(()),

        // ========== Load immediates ==========
        OpCode::LoadInt => handlers::handle_load_int(state),
        OpCode::LoadReal => handlers::handle_load_real(state),
        OpCode::LoadChar => handlers::handle_load_char(state),
        OpCode::LoadBool => handlers::handle_load_bool(state),
        OpCode::LoadString => handlers::handle_load_string(state),

        // ========== Arrays ==========
        OpCode::CreateArray => handlers::handle_create_array(state),
        OpCode::FetchArrayElem => handlers::handle_fetch_array_elem(state),
        OpCode::StoreArrayElem => handlers::handle_store_array_elem(state),

        // ========== Slot stores and fetches ==========
        OpCode::StoreInt => handlers::handle_store_int(state),
        OpCode::StoreReal => handlers::handle_store_real(state),
        OpCode::StoreChar => handlers::handle_store_char(state),
        OpCode::StoreBool => handlers::handle_store_bool(state),
        OpCode::StoreRef => handlers::handle_store_ref(state),
        OpCode::FetchInt => handlers::handle_fetch_int(state),
        OpCode::FetchReal => handlers::handle_fetch_real(state),
        OpCode::FetchChar => handlers::handle_fetch_char(state),
        OpCode::FetchBool => handlers::handle_fetch_bool(state),
        OpCode::FetchRef => handlers::handle_fetch_ref(state),
        OpCode::RStoreInt => handlers::handle_rstore_int(state),
        OpCode::RStoreReal => handlers::handle_rstore_real(state),
        OpCode::RStoreChar => handlers::handle_rstore_char(state),
        OpCode::RStoreBool => handlers::handle_rstore_bool(state),
        OpCode::RStoreRef => handlers::handle_rstore_ref(state),
        OpCode::RFetchInt => handlers::handle_rfetch_int(state),
        OpCode::RFetchReal => handlers::handle_rfetch_real(state),
        OpCode::RFetchChar => handlers::handle_rfetch_char(state),
        OpCode::RFetchBool => handlers::handle_rfetch_bool(state),
        OpCode::RFetchRef => handlers::handle_rfetch_ref(state),
        OpCode::StoreRefInt => handlers::handle_store_ref_int(state),
        OpCode::StoreRefReal => handlers::handle_store_ref_real(state),
        OpCode::StoreRefChar => handlers::handle_store_ref_char(state),
        OpCode::StoreRefBool => handlers::handle_store_ref_bool(state),
        OpCode::FetchRefInt => handlers::handle_fetch_ref_int(state),
        OpCode::FetchRefReal => handlers::handle_fetch_ref_real(state),
        OpCode::FetchRefChar => handlers::handle_fetch_ref_char(state),
        OpCode::FetchRefBool => handlers::handle_fetch_ref_bool(state),
        OpCode::GetRef => handlers::handle_get_ref(state),
        OpCode::RGetRef => handlers::handle_rget_ref(state),

        // ========== Coercions ==========
        OpCode::CastIntReal => handlers::handle_cast_int_real(state),
        OpCode::CastIntChar => handlers::handle_cast_int_char(state),
        OpCode::CastCharInt => handlers::handle_cast_char_int(state),

        // ========== Arithmetic ==========
        OpCode::AddInt => handlers::handle_add_int(state),
        OpCode::AddReal => handlers::handle_add_real(state),
        OpCode::MinusInt => handlers::handle_minus_int(state),
        OpCode::MinusReal => handlers::handle_minus_real(state),
        OpCode::MultInt => handlers::handle_mult_int(state),
        OpCode::MultReal => handlers::handle_mult_real(state),
        OpCode::DivInt => handlers::handle_div_int(state),
        OpCode::DivReal => handlers::handle_div_real(state),
        OpCode::ModInt => handlers::handle_mod_int(state),
        OpCode::ModReal => handlers::handle_mod_real(state),
        OpCode::FdivInt => handlers::handle_fdiv_int(state),
        OpCode::FdivReal => handlers::handle_fdiv_real(state),
        OpCode::PowInt => handlers::handle_pow_int(state),
        OpCode::PowReal => handlers::handle_pow_real(state),
        OpCode::NegInt => handlers::handle_neg_int(state),
        OpCode::NegReal => handlers::handle_neg_real(state),

        // ========== Strings ==========
        OpCode::Concat => handle_concat(state),

        // ========== Comparisons ==========
        OpCode::EqInt => handlers::handle_eq_int(state),
        OpCode::EqReal => handlers::handle_eq_real(state),
        OpCode::EqBool => handlers::handle_eq_bool(state),
        OpCode::EqRef => handlers::handle_eq_ref(state),
        OpCode::EqString => handlers::handle_eq_string(state),
        OpCode::NeqInt => handlers::handle_neq_int(state),
        OpCode::NeqReal => handlers::handle_neq_real(state),
        OpCode::NeqBool => handlers::handle_neq_bool(state),
        OpCode::NeqRef => handlers::handle_neq_ref(state),
        OpCode::NeqString => handlers::handle_neq_string(state),
        OpCode::LessInt => handlers::handle_less_int(state),
        OpCode::LessReal => handlers::handle_less_real(state),
        OpCode::LessBool => handlers::handle_less_bool(state),
        OpCode::LessRef => handlers::handle_less_ref(state),
        OpCode::LessString => handlers::handle_less_string(state),
        OpCode::LessEqInt => handlers::handle_less_eq_int(state),
        OpCode::LessEqReal => handlers::handle_less_eq_real(state),
        OpCode::LessEqBool => handlers::handle_less_eq_bool(state),
        OpCode::LessEqRef => handlers::handle_less_eq_ref(state),
        OpCode::LessEqString => handlers::handle_less_eq_string(state),
        OpCode::GreaterInt => handlers::handle_greater_int(state),
        OpCode::GreaterReal => handlers::handle_greater_real(state),
        OpCode::GreaterBool => handlers::handle_greater_bool(state),
        OpCode::GreaterRef => handlers::handle_greater_ref(state),
        OpCode::GreaterString => handlers::handle_greater_string(state),
        OpCode::GreaterEqInt => handlers::handle_greater_eq_int(state),
        OpCode::GreaterEqReal => handlers::handle_greater_eq_real(state),
        OpCode::GreaterEqBool => handlers::handle_greater_eq_bool(state),
        OpCode::GreaterEqRef => handlers::handle_greater_eq_ref(state),
        OpCode::GreaterEqString => handlers::handle_greater_eq_string(state),

        // ========== Logical ==========
        OpCode::And => handlers::handle_and(state),
        OpCode::Or => handlers::handle_or(state),
        OpCode::Not => handlers::handle_not(state),

        // ========== Stack hygiene ==========
        OpCode::Pop1B => handlers::handle_pop_1b(state),
        OpCode::Pop4B => handlers::handle_pop_4b(state),
        OpCode::Pop8B => handlers::handle_pop_8b(state),
        OpCode::CopyInt => handlers::handle_copy_int(state),

        // ========== Control flow ==========
        OpCode::Branch => handlers::handle_branch(state),
        OpCode::BranchFalse => handlers::handle_branch_false(state),
        OpCode::CallSub => handlers::handle_call_sub(state),
        OpCode::DoCall => handlers::handle_do_call(state),
        OpCode::Return => handlers::handle_return(state),
        OpCode::ReturnNil => handlers::handle_return_nil(state),
        OpCode::CallBuiltin => handlers::handle_call_builtin(state),

        // ========== Console I/O ==========
        OpCode::InputInt => handlers::handle_input_int(state),
        OpCode::InputReal => handlers::handle_input_real(state),
        OpCode::InputChar => handlers::handle_input_char(state),
        OpCode::InputBool => handlers::handle_input_bool(state),
        OpCode::InputString => handlers::handle_input_string(state),
        OpCode::OutputInt => handlers::handle_output_int(state),
        OpCode::OutputReal => handlers::handle_output_real(state),
        OpCode::OutputChar => handlers::handle_output_char(state),
        OpCode::OutputBool => handlers::handle_output_bool(state),
        OpCode::OutputRef => handlers::handle_output_ref(state),
        OpCode::OutputString => handlers::handle_output_string(state),
        OpCode::OutputNl => handlers::handle_output_nl(state),

        // ========== File I/O ==========
        OpCode::OpenFile => handlers::handle_open_file(state),
        OpCode::CloseFile => handlers::handle_close_file(state),
        OpCode::ReadLine => handlers::handle_read_line(state),
        OpCode::WriteInt => handlers::handle_write_int(state),
        OpCode::WriteReal => handlers::handle_write_real(state),
        OpCode::WriteChar => handlers::handle_write_char(state),
        OpCode::WriteBool => handlers::handle_write_bool(state),
        OpCode::WriteRef => handlers::handle_write_ref(state),
        OpCode::WriteString => handlers::handle_write_string(state),
        OpCode::WriteNl => handlers::handle_write_nl(state),

        OpCode::Exit => handlers::handle_exit(state),
    }
}

/// CONCAT: pop two string refs, allocate and push their concatenation
/// Stack: [fstRef, sndRef] -> [ref]
fn handle_concat(state: &mut VmState) -> VmResult<()> {
    use crate::heap::Obj;

    let snd = state.pop_ref()?;
    let fst = state.pop_ref()?;
    let Obj::Str(fst_bytes) = state.heap.get(fst)? else {
        return Err(VmError::SegmentationFault);
    };
    let Obj::Str(snd_bytes) = state.heap.get(snd)? else {
        return Err(VmError::SegmentationFault);
    };

    let mut joined = Vec::with_capacity(fst_bytes.len() + snd_bytes.len());
    joined.extend_from_slice(fst_bytes);
    joined.extend_from_slice(snd_bytes);

    let word = state.heap.alloc_string(joined)?;
    state.push_ref(word)
}
