//! Opcode definitions for the VM.
//!
//! Instruction format:
//! - 1-byte opcode, optional immediate operands
//! - immediates are big-endian in the stream (`LOAD_STRING` is followed by
//!   a 4-byte length and that many raw bytes)
//! - operand-stack values are little-endian (see `stack`)
//!
//! The instruction set is typed: arithmetic, comparison, store and fetch
//! come in one variant per primitive kind, so every opcode has a fixed
//! stack-effect vector. That property is what makes frame truncation on
//! `RETURN` safe.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0x00,

    // Load immediate: push a literal operand
    LoadInt = 0x01,
    LoadReal = 0x02,
    LoadChar = 0x03,
    LoadBool = 0x04,
    /// Allocates the string on the heap and pushes the reference
    LoadString = 0x05,

    // Arrays: CREATE_ARRAY pops (elemSize, top1, base1, top0, base0)
    CreateArray = 0x06,
    FetchArrayElem = 0x07,
    StoreArrayElem = 0x08,

    // Store by absolute offset: pops (offset, value), writes value at
    // stack[offset], re-pushes value (assignment is an expression)
    StoreInt = 0x10,
    StoreReal = 0x11,
    StoreChar = 0x12,
    StoreBool = 0x13,
    StoreRef = 0x14,

    // Fetch by absolute offset: pops offset, pushes the slot's bytes
    FetchInt = 0x15,
    FetchReal = 0x16,
    FetchChar = 0x17,
    FetchBool = 0x18,
    FetchRef = 0x19,

    // Frame-relative variants: offset is added to the current frame base
    RStoreInt = 0x1A,
    RStoreReal = 0x1B,
    RStoreChar = 0x1C,
    RStoreBool = 0x1D,
    RStoreRef = 0x1E,
    RFetchInt = 0x1F,
    RFetchReal = 0x20,
    RFetchChar = 0x21,
    RFetchBool = 0x22,
    RFetchRef = 0x23,

    // Indirect through an 8-byte stack reference (BYREF parameters)
    StoreRefInt = 0x24,
    StoreRefReal = 0x25,
    StoreRefChar = 0x26,
    StoreRefBool = 0x27,
    FetchRefInt = 0x28,
    FetchRefReal = 0x29,
    FetchRefChar = 0x2A,
    FetchRefBool = 0x2B,

    // Reference taking: pop an offset, push a tagged stack-slot reference
    GetRef = 0x2C,
    RGetRef = 0x2D,

    // Coercions
    CastIntReal = 0x30,
    CastIntChar = 0x31,
    CastCharInt = 0x32,

    // Arithmetic: pops a then b, pushes b OP a
    AddInt = 0x40,
    AddReal = 0x41,
    MinusInt = 0x42,
    MinusReal = 0x43,
    MultInt = 0x44,
    MultReal = 0x45,
    /// INTEGER division still produces a REAL quotient
    DivInt = 0x46,
    DivReal = 0x47,
    ModInt = 0x48,
    ModReal = 0x49,
    /// Floor division truncates to INTEGER
    FdivInt = 0x4A,
    FdivReal = 0x4B,
    PowInt = 0x4C,
    PowReal = 0x4D,
    NegInt = 0x4E,
    NegReal = 0x4F,

    /// Pops two string refs, allocates the concatenation, pushes it
    Concat = 0x50,

    // Comparisons: pops a then b, pushes BOOL(b OP a)
    EqInt = 0x51,
    EqReal = 0x52,
    EqBool = 0x53,
    EqRef = 0x54,
    EqString = 0x55,
    NeqInt = 0x56,
    NeqReal = 0x57,
    NeqBool = 0x58,
    NeqRef = 0x59,
    NeqString = 0x5A,
    LessInt = 0x5B,
    LessReal = 0x5C,
    LessBool = 0x5D,
    LessRef = 0x5E,
    LessString = 0x5F,
    LessEqInt = 0x60,
    LessEqReal = 0x61,
    LessEqBool = 0x62,
    LessEqRef = 0x63,
    LessEqString = 0x64,
    GreaterInt = 0x65,
    GreaterReal = 0x66,
    GreaterBool = 0x67,
    GreaterRef = 0x68,
    GreaterString = 0x69,
    GreaterEqInt = 0x6A,
    GreaterEqReal = 0x6B,
    GreaterEqBool = 0x6C,
    GreaterEqRef = 0x6D,
    GreaterEqString = 0x6E,

    // Logical
    And = 0x70,
    Or = 0x71,
    Not = 0x72,

    // Stack hygiene
    Pop1B = 0x73,
    Pop4B = 0x74,
    Pop8B = 0x75,
    /// Duplicates the top i32
    CopyInt = 0x76,

    // Control flow: absolute 4-byte targets, back-patched by the compiler
    Branch = 0x80,
    BranchFalse = 0x81,

    // Calls
    /// Latches the current stack top as the next callee's frame base
    CallSub = 0x82,
    DoCall = 0x83,
    /// Operand is the return-value width in bytes (1, 4 or 8)
    Return = 0x84,
    ReturnNil = 0x85,
    CallBuiltin = 0x86,

    // Console I/O
    InputInt = 0x90,
    InputReal = 0x91,
    InputChar = 0x92,
    InputBool = 0x93,
    InputString = 0x94,
    OutputInt = 0x95,
    OutputReal = 0x96,
    OutputChar = 0x97,
    OutputBool = 0x98,
    OutputRef = 0x99,
    OutputString = 0x9A,
    OutputNl = 0x9B,

    // File I/O
    OpenFile = 0xA0,
    CloseFile = 0xA1,
    ReadLine = 0xA2,
    WriteInt = 0xA3,
    WriteReal = 0xA4,
    WriteChar = 0xA5,
    WriteBool = 0xA6,
    WriteRef = 0xA7,
    WriteString = 0xA8,
    WriteNl = 0xA9,

    /// Halts the VM cleanly
    Exit = 0xFF,
}

impl OpCode {
    /// Mnemonic used by the disassembler and the instruction tracer.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::LoadInt => "LOAD_INT",
            OpCode::LoadReal => "LOAD_REAL",
            OpCode::LoadChar => "LOAD_CHAR",
            OpCode::LoadBool => "LOAD_BOOL",
            OpCode::LoadString => "LOAD_STRING",
            OpCode::CreateArray => "CREATE_ARRAY",
            OpCode::FetchArrayElem => "FETCH_ARRAY_ELEM",
            OpCode::StoreArrayElem => "STORE_ARRAY_ELEM",
            OpCode::StoreInt => "STORE_INT",
            OpCode::StoreReal => "STORE_REAL",
            OpCode::StoreChar => "STORE_CHAR",
            OpCode::StoreBool => "STORE_BOOL",
            OpCode::StoreRef => "STORE_REF",
            OpCode::FetchInt => "FETCH_INT",
            OpCode::FetchReal => "FETCH_REAL",
            OpCode::FetchChar => "FETCH_CHAR",
            OpCode::FetchBool => "FETCH_BOOL",
            OpCode::FetchRef => "FETCH_REF",
            OpCode::RStoreInt => "RSTORE_INT",
            OpCode::RStoreReal => "RSTORE_REAL",
            OpCode::RStoreChar => "RSTORE_CHAR",
            OpCode::RStoreBool => "RSTORE_BOOL",
            OpCode::RStoreRef => "RSTORE_REF",
            OpCode::RFetchInt => "RFETCH_INT",
            OpCode::RFetchReal => "RFETCH_REAL",
            OpCode::RFetchChar => "RFETCH_CHAR",
            OpCode::RFetchBool => "RFETCH_BOOL",
            OpCode::RFetchRef => "RFETCH_REF",
            OpCode::StoreRefInt => "STORE_REF_INT",
            OpCode::StoreRefReal => "STORE_REF_REAL",
            OpCode::StoreRefChar => "STORE_REF_CHAR",
            OpCode::StoreRefBool => "STORE_REF_BOOL",
            OpCode::FetchRefInt => "FETCH_REF_INT",
            OpCode::FetchRefReal => "FETCH_REF_REAL",
            OpCode::FetchRefChar => "FETCH_REF_CHAR",
            OpCode::FetchRefBool => "FETCH_REF_BOOL",
            OpCode::GetRef => "GET_REF",
            OpCode::RGetRef => "RGET_REF",
            OpCode::CastIntReal => "CAST_INT_REAL",
            OpCode::CastIntChar => "CAST_INT_CHAR",
            OpCode::CastCharInt => "CAST_CHAR_INT",
            OpCode::AddInt => "ADD_INT",
            OpCode::AddReal => "ADD_REAL",
            OpCode::MinusInt => "MINUS_INT",
            OpCode::MinusReal => "MINUS_REAL",
            OpCode::MultInt => "MULT_INT",
            OpCode::MultReal => "MULT_REAL",
            OpCode::DivInt => "DIV_INT",
            OpCode::DivReal => "DIV_REAL",
            OpCode::ModInt => "MOD_INT",
            OpCode::ModReal => "MOD_REAL",
            OpCode::FdivInt => "FDIV_INT",
            OpCode::FdivReal => "FDIV_REAL",
            OpCode::PowInt => "POW_INT",
            OpCode::PowReal => "POW_REAL",
            OpCode::NegInt => "NEG_INT",
            OpCode::NegReal => "NEG_REAL",
            OpCode::Concat => "CONCAT",
            OpCode::EqInt => "EQ_INT",
            OpCode::EqReal => "EQ_REAL",
            OpCode::EqBool => "EQ_BOOL",
            OpCode::EqRef => "EQ_REF",
            OpCode::EqString => "EQ_STRING",
            OpCode::NeqInt => "NEQ_INT",
            OpCode::NeqReal => "NEQ_REAL",
            OpCode::NeqBool => "NEQ_BOOL",
            OpCode::NeqRef => "NEQ_REF",
            OpCode::NeqString => "NEQ_STRING",
            OpCode::LessInt => "LESS_INT",
            OpCode::LessReal => "LESS_REAL",
            OpCode::LessBool => "LESS_BOOL",
            OpCode::LessRef => "LESS_REF",
            OpCode::LessString => "LESS_STRING",
            OpCode::LessEqInt => "LESS_EQ_INT",
            OpCode::LessEqReal => "LESS_EQ_REAL",
            OpCode::LessEqBool => "LESS_EQ_BOOL",
            OpCode::LessEqRef => "LESS_EQ_REF",
            OpCode::LessEqString => "LESS_EQ_STRING",
            OpCode::GreaterInt => "GREATER_INT",
            OpCode::GreaterReal => "GREATER_REAL",
            OpCode::GreaterBool => "GREATER_BOOL",
            OpCode::GreaterRef => "GREATER_REF",
            OpCode::GreaterString => "GREATER_STRING",
            OpCode::GreaterEqInt => "GREATER_EQ_INT",
            OpCode::GreaterEqReal => "GREATER_EQ_REAL",
            OpCode::GreaterEqBool => "GREATER_EQ_BOOL",
            OpCode::GreaterEqRef => "GREATER_EQ_REF",
            OpCode::GreaterEqString => "GREATER_EQ_STRING",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Not => "NOT",
            OpCode::Pop1B => "POP_1B",
            OpCode::Pop4B => "POP_4B",
            OpCode::Pop8B => "POP_8B",
            OpCode::CopyInt => "COPY_INT",
            OpCode::Branch => "BRANCH",
            OpCode::BranchFalse => "B_FALSE",
            OpCode::CallSub => "CALL_SUB",
            OpCode::DoCall => "DO_CALL",
            OpCode::Return => "RETURN",
            OpCode::ReturnNil => "RETURN_NIL",
            OpCode::CallBuiltin => "CALL_BUILTIN",
            OpCode::InputInt => "INPUT_INT",
            OpCode::InputReal => "INPUT_REAL",
            OpCode::InputChar => "INPUT_CHAR",
            OpCode::InputBool => "INPUT_BOOL",
            OpCode::InputString => "INPUT_STRING",
            OpCode::OutputInt => "OUTPUT_INT",
            OpCode::OutputReal => "OUTPUT_REAL",
            OpCode::OutputChar => "OUTPUT_CHAR",
            OpCode::OutputBool => "OUTPUT_BOOL",
            OpCode::OutputRef => "OUTPUT_REF",
            OpCode::OutputString => "OUTPUT_STRING",
            OpCode::OutputNl => "OUTPUT_NL",
            OpCode::OpenFile => "OPENFILE",
            OpCode::CloseFile => "CLOSEFILE",
            OpCode::ReadLine => "READ_LINE",
            OpCode::WriteInt => "WRITE_INT",
            OpCode::WriteReal => "WRITE_REAL",
            OpCode::WriteChar => "WRITE_CHAR",
            OpCode::WriteBool => "WRITE_BOOL",
            OpCode::WriteRef => "WRITE_REF",
            OpCode::WriteString => "WRITE_STRING",
            OpCode::WriteNl => "WRITE_NL",
            OpCode::Exit => "EXIT",
        }
    }

    /// Immediate-operand width in bytes. `LOAD_STRING` reports the width
    /// of its length field; the payload length follows in the stream.
    pub fn operand_width(self) -> usize {
        match self {
            OpCode::LoadReal => 8,
            OpCode::LoadInt
            | OpCode::LoadString
            | OpCode::DoCall
            | OpCode::CallBuiltin
            | OpCode::Branch
            | OpCode::BranchFalse => 4,
            OpCode::LoadChar | OpCode::LoadBool | OpCode::Return => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for op in [OpCode::Nop, OpCode::LoadString, OpCode::GreaterEqString, OpCode::Exit] {
            let byte: u8 = op.into();
            assert_eq!(OpCode::try_from(byte), Ok(op));
        }
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert!(OpCode::try_from(0xEEu8).is_err());
    }
}
