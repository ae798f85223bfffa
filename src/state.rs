//! VM state management.

use std::io::{BufRead, Write};

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::stack::{CallStack, OperandStack};

/// Operand-stack size in byte slots.
pub const STACK_CAPACITY: usize = 1024;

/// Call-stack size in frames.
pub const CALL_STACK_CAPACITY: usize = 256;

/// Heap size in cells.
pub const HEAP_CELLS: usize = 1024;

/// VM execution state.
pub struct VmState<'a> {
    /// Bytecode being executed
    pub program: &'a [u8],

    /// Program counter: offset of the next byte to fetch
    pub pc: usize,

    /// Byte-addressable typed operand stack
    pub stack: OperandStack,

    /// Call stack: (return PC, frame base) records
    pub call_stack: CallStack,

    /// Program heap, owner of strings, arrays and open files
    pub heap: Heap,

    /// Stack top latched by CALL_SUB, consumed by the next DO_CALL
    pub next_call_base: usize,

    /// Set by EXIT
    pub halted: bool,

    /// Per-instruction and GC trace on stderr
    pub trace: bool,

    input: Box<dyn BufRead + 'a>,
    output: Box<dyn Write + 'a>,
}

impl<'a> VmState<'a> {
    /// State wired to the process's stdin and stdout.
    pub fn new(program: &'a [u8]) -> Self {
        Self::with_io(
            program,
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    /// State with injected I/O, used by tests to feed stdin and capture
    /// program output.
    pub fn with_io(
        program: &'a [u8],
        input: Box<dyn BufRead + 'a>,
        output: Box<dyn Write + 'a>,
    ) -> Self {
        VmState {
            program,
            pc: 0,
            stack: OperandStack::new(STACK_CAPACITY),
            call_stack: CallStack::new(CALL_STACK_CAPACITY),
            heap: Heap::new(HEAP_CELLS),
            next_call_base: 0,
            halted: false,
            trace: false,
            input,
            output,
        }
    }

    // ========== Bytecode reading ==========

    /// Read the byte at PC, advance PC.
    #[inline]
    pub fn read_u8(&mut self) -> VmResult<u8> {
        let byte = *self
            .program
            .get(self.pc)
            .ok_or(VmError::TruncatedProgram)?;
        self.pc += 1;
        Ok(byte)
    }

    /// Read a big-endian i32 immediate, advance PC.
    #[inline]
    pub fn read_i32(&mut self) -> VmResult<i32> {
        let bytes: [u8; 4] = self
            .program
            .get(self.pc..self.pc + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or(VmError::TruncatedProgram)?;
        self.pc += 4;
        Ok(i32::from_be_bytes(bytes))
    }

    /// Read a big-endian f64 immediate, advance PC.
    #[inline]
    pub fn read_f64(&mut self) -> VmResult<f64> {
        let bytes: [u8; 8] = self
            .program
            .get(self.pc..self.pc + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or(VmError::TruncatedProgram)?;
        self.pc += 8;
        Ok(f64::from_be_bytes(bytes))
    }

    /// Jump to an absolute bytecode position.
    #[inline]
    pub fn jump(&mut self, target: i32) -> VmResult<()> {
        if target < 0 || target as usize > self.program.len() {
            return Err(VmError::InvalidJumpTarget);
        }
        self.pc = target as usize;
        Ok(())
    }

    // ========== Typed stack operations ==========
    //
    // Multi-byte values are pushed little-endian, so the first byte popped
    // is the most significant. An 8-byte reference tags its lowest byte.

    #[inline]
    pub fn push_byte(&mut self, value: u8) -> VmResult<()> {
        self.stack.push(value, false)
    }

    #[inline]
    pub fn pop_byte(&mut self) -> VmResult<u8> {
        self.stack.pop()
    }

    pub fn push_i32(&mut self, value: i32) -> VmResult<()> {
        for byte in value.to_le_bytes() {
            self.stack.push(byte, false)?;
        }
        Ok(())
    }

    pub fn pop_i32(&mut self) -> VmResult<i32> {
        let mut bytes = [0u8; 4];
        for i in (0..4).rev() {
            bytes[i] = self.stack.pop()?;
        }
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn push_f64(&mut self, value: f64) -> VmResult<()> {
        for byte in value.to_bits().to_le_bytes() {
            self.stack.push(byte, false)?;
        }
        Ok(())
    }

    pub fn pop_f64(&mut self) -> VmResult<f64> {
        Ok(f64::from_bits(self.pop_u64()?))
    }

    pub fn push_u64(&mut self, value: u64) -> VmResult<()> {
        for byte in value.to_le_bytes() {
            self.stack.push(byte, false)?;
        }
        Ok(())
    }

    pub fn pop_u64(&mut self) -> VmResult<u64> {
        let mut bytes = [0u8; 8];
        for i in (0..8).rev() {
            bytes[i] = self.stack.pop()?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    /// Push an 8-byte reference word with the GC root tag on its low byte.
    pub fn push_ref(&mut self, word: u64) -> VmResult<()> {
        for (i, byte) in word.to_le_bytes().into_iter().enumerate() {
            self.stack.push(byte, i == 0)?;
        }
        Ok(())
    }

    /// References and plain 8-byte values pop identically.
    #[inline]
    pub fn pop_ref(&mut self) -> VmResult<u64> {
        self.pop_u64()
    }

    pub fn push_bool(&mut self, value: bool) -> VmResult<()> {
        self.push_byte(value as u8)
    }

    pub fn pop_bool(&mut self) -> VmResult<bool> {
        Ok(self.pop_byte()? != 0)
    }

    // ========== Slot addressing (STORE/FETCH families) ==========

    /// Write `bytes` little-endian into the slots at `pos`, tagging the
    /// first slot when the value is a reference.
    pub fn store_at(&mut self, pos: usize, bytes: &[u8], is_ref: bool) -> VmResult<()> {
        for (i, byte) in bytes.iter().enumerate() {
            self.stack.set(pos + i, *byte, is_ref && i == 0)?;
        }
        Ok(())
    }

    /// Read `width` bytes starting at `pos`, little-endian.
    pub fn fetch_at(&mut self, pos: usize, width: usize) -> VmResult<u64> {
        let mut value = 0u64;
        for i in (0..width).rev() {
            value = (value << 8) | u64::from(self.stack.get(pos + i)?);
        }
        Ok(value)
    }

    /// Frame base of the current call, for the `R*` opcodes.
    #[inline]
    pub fn frame_base(&self) -> VmResult<usize> {
        self.call_stack.frame_base()
    }

    // ========== I/O ==========

    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// Read one raw byte from program input.
    pub fn input_byte(&mut self) -> VmResult<Option<u8>> {
        let buf = self.input.fill_buf().map_err(|_| VmError::Io)?;
        if buf.is_empty() {
            return Ok(None);
        }
        let byte = buf[0];
        self.input.consume(1);
        Ok(Some(byte))
    }

    /// Read up to and including the next newline; `None` at end of input.
    pub fn input_line(&mut self) -> VmResult<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let n = self
            .input
            .read_until(b'\n', &mut line)
            .map_err(|_| VmError::Io)?;
        if n == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Discard the remainder of the current input line.
    pub fn discard_input_line(&mut self) -> VmResult<()> {
        loop {
            match self.input_byte()? {
                None | Some(b'\n') => return Ok(()),
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn state(program: &[u8]) -> VmState<'_> {
        VmState::with_io(program, Box::new(Cursor::new(Vec::new())), Box::new(Vec::new()))
    }

    #[test]
    fn immediates_read_big_endian() {
        let program = [0x01, 0x02, 0x03, 0x04];
        let mut vm = state(&program);
        assert_eq!(vm.read_i32().unwrap(), 0x0102_0304);
        assert_eq!(vm.pc, 4);
        assert_eq!(vm.read_u8(), Err(VmError::TruncatedProgram));
    }

    #[test]
    fn i32_round_trips_through_stack() {
        let mut vm = state(&[]);
        vm.push_i32(-123_456).unwrap();
        assert_eq!(vm.pop_i32().unwrap(), -123_456);
    }

    #[test]
    fn f64_round_trips_through_stack() {
        let mut vm = state(&[]);
        vm.push_f64(2.5).unwrap();
        assert_eq!(vm.pop_f64().unwrap(), 2.5);
    }

    #[test]
    fn reference_tags_only_low_byte() {
        let mut vm = state(&[]);
        vm.push_ref(crate::heap::heap_ref(7)).unwrap();
        assert!(vm.stack.is_ref_at(0));
        for slot in 1..8 {
            assert!(!vm.stack.is_ref_at(slot));
        }
    }

    #[test]
    fn store_then_fetch_round_trips() {
        let mut vm = state(&[]);
        vm.push_i32(0).unwrap(); // reserve 4 slots
        vm.store_at(0, &0x0A0B_0C0Di32.to_le_bytes(), false).unwrap();
        assert_eq!(vm.fetch_at(0, 4).unwrap() as i32, 0x0A0B_0C0D);
    }
}
