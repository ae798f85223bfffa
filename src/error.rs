//! Error types for the compiler pipeline and the VM.

use thiserror::Error;

/// Diagnostic produced by the lexer or the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}, col {col}] Error{place}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub col: u32,
    /// ` at '<lexeme>'`, ` at end`, or empty for error tokens.
    pub place: String,
    pub message: String,
}

/// Diagnostic produced by the semantic analyser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}, col {col}] Error in {context}: {message}")]
pub struct SemanticError {
    pub line: u32,
    pub col: u32,
    /// What was being checked, e.g. `FOR statement` or `binary expression`.
    pub context: String,
    pub message: String,
}

/// Lowering-time failure. The analyser guarantees none of these can happen
/// for a tree it accepted; hitting one means an unchecked tree was lowered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("symbol '{0}' unresolved during lowering")]
    UnresolvedSymbol(String),
    #[error("malformed literal '{0}'")]
    MalformedLiteral(String),
    #[error("node left untyped by analysis")]
    UntypedNode,
}

/// VM execution errors.
///
/// One variant per runtime failure class; the display strings are the
/// messages surfaced on stderr as `Runtime error at PC <n>: <message>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmError {
    /// Invalid or unknown opcode byte
    #[error("Invalid opcode.")]
    InvalidOpcode,
    /// Instruction ran off the end of the bytecode stream
    #[error("Truncated instruction stream.")]
    TruncatedProgram,
    /// Push onto a full operand stack
    #[error("Stack overflow.")]
    StackOverflow,
    /// Pop from an empty operand stack
    #[error("Stack underflow.")]
    StackUnderflow,
    /// Store or fetch outside the operand stack array
    #[error("Invalid stack slot.")]
    InvalidStackSlot,
    /// Call stack exceeded its frame capacity
    #[error("Call stack overflow.")]
    CallStackOverflow,
    /// Return without a matching call frame
    #[error("Call stack underflow.")]
    CallStackUnderflow,
    /// Branch or call target outside the program
    #[error("Invalid jump target.")]
    InvalidJumpTarget,
    /// Dereference of an invalid, freed or foreign reference
    #[error("Segmentation fault.")]
    SegmentationFault,
    /// Heap arena has no free cell left
    #[error("Program memory exhausted.")]
    HeapExhausted,
    /// Array index outside the declared bounds
    #[error("Array out of bounds access.")]
    ArrayOutOfBounds,
    /// Integer division or remainder by zero
    #[error("Division by zero.")]
    DivisionByZero,
    /// SUBSTRING reaching past the end of the string
    #[error("Substring overextends string.")]
    SubstringOverrun,
    /// SUBSTRING start outside 1..=LENGTH(s)
    #[error("Initial pos must be between 1 and length of string.")]
    SubstringStart,
    /// CHARAT position outside 1..=LENGTH(s)
    #[error("Position must be between 1 and length of string.")]
    StringIndex,
    /// stdin or stdout failure
    #[error("I/O error.")]
    Io,
    /// OPENFILE could not open the underlying file
    #[error("Error opening file.")]
    FileOpen,
    /// Read from a file stream that is not readable
    #[error("Error reading file.")]
    FileRead,
    /// Write to a file stream that is not writable
    #[error("Error writing file.")]
    FileWrite,
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

/// A `VmError` latched together with the program counter of the
/// instruction that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Runtime error at PC {pc}: {source}")]
pub struct RuntimeError {
    pub pc: usize,
    #[source]
    pub source: VmError,
}
