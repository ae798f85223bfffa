//! File I/O handlers
//!
//! OPENFILE, CLOSEFILE, READ_LINE, WRITE_*
//!
//! File handles live in heap cells. CLOSEFILE closes the underlying
//! stream immediately and flags the cell force-free, so the next sweep
//! reclaims it even while references remain reachable; any later use of
//! the stale reference is a segmentation fault.

use crate::ast::FileMode;
use crate::error::{VmError, VmResult};
use crate::heap::Obj;
use crate::state::VmState;

/// OPENFILE: open the named file and push the handle's reference
/// Stack: [nameRef, mode] -> [fileRef]
pub fn handle_open_file(state: &mut VmState) -> VmResult<()> {
    let mode = state.pop_i32()?;
    let name_word = state.pop_ref()?;

    let Obj::Str(name) = state.heap.get(name_word)? else {
        return Err(VmError::SegmentationFault);
    };
    let name = String::from_utf8_lossy(name).into_owned();
    let mode = FileMode::from_i32(mode).ok_or(VmError::FileOpen)?;

    let word = state.heap.open_file(&name, mode)?;
    state.push_ref(word)
}

/// CLOSEFILE: close the stream now, reclaim the cell on the next sweep
/// Stack: [fileRef] -> []
pub fn handle_close_file(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.close_file(word)
}

/// READ_LINE: read one line from the file, push it as a new string
/// Stack: [fileRef] -> [strRef]
pub fn handle_read_line(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    let Obj::File(handle) = state.heap.get_mut(word)? else {
        return Err(VmError::SegmentationFault);
    };
    let line = handle.read_line()?;
    let str_word = state.heap.alloc_string(line)?;
    state.push_ref(str_word)
}

fn write_to_file(state: &mut VmState, word: u64, bytes: &[u8]) -> VmResult<()> {
    let Obj::File(handle) = state.heap.get_mut(word)? else {
        return Err(VmError::SegmentationFault);
    };
    handle.write_all(bytes)
}

/// WRITE_INT
/// Stack: [n, fileRef] -> []
pub fn handle_write_int(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.get(word)?;
    let n = state.pop_i32()?;
    write_to_file(state, word, format!("{n}").as_bytes())
}

/// WRITE_REAL
/// Stack: [r, fileRef] -> []
pub fn handle_write_real(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.get(word)?;
    let r = state.pop_f64()?;
    write_to_file(state, word, format!("{r:.6}").as_bytes())
}

/// WRITE_CHAR
/// Stack: [c, fileRef] -> []
pub fn handle_write_char(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.get(word)?;
    let c = state.pop_byte()?;
    write_to_file(state, word, &[c])
}

/// WRITE_BOOL
/// Stack: [b, fileRef] -> []
pub fn handle_write_bool(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.get(word)?;
    let b = state.pop_bool()?;
    write_to_file(state, word, if b { b"TRUE" } else { b"FALSE" })
}

/// WRITE_REF: writes the raw reference word, for debugging
/// Stack: [ref, fileRef] -> []
pub fn handle_write_ref(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.get(word)?;
    let value = state.pop_ref()?;
    write_to_file(state, word, format!("[{value:#x}]").as_bytes())
}

/// WRITE_STRING
/// Stack: [strRef, fileRef] -> []
pub fn handle_write_string(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    state.heap.get(word)?;
    let str_word = state.pop_ref()?;
    let Obj::Str(bytes) = state.heap.get(str_word)? else {
        return Err(VmError::SegmentationFault);
    };
    let bytes = bytes.clone();
    write_to_file(state, word, &bytes)
}

/// WRITE_NL
/// Stack: [fileRef] -> []
pub fn handle_write_nl(state: &mut VmState) -> VmResult<()> {
    let word = state.pop_ref()?;
    write_to_file(state, word, b"\n")
}
