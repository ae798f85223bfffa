//! # pseudovm
//!
//! Compiler and stack virtual machine for Cambridge-style educational
//! pseudocode. Source text is lexed, parsed into a syntax tree, checked
//! for semantic validity, lowered to a typed stack-oriented bytecode, and
//! executed on a VM with a byte-addressable operand stack, base-relative
//! call frames and a mark-sweep garbage-collected heap.
//!
//! ## Example
//!
//! ```rust
//! use pseudovm::{compile_source, VmState, engine};
//! use std::io::Cursor;
//!
//! let stream = compile_source("OUTPUT 3 + 4 * 2\n").unwrap();
//!
//! let mut captured = Vec::new();
//! let mut state = VmState::with_io(
//!     stream.as_bytes(),
//!     Box::new(Cursor::new(Vec::new())),
//!     Box::new(&mut captured),
//! );
//! engine::run(&mut state).unwrap();
//! drop(state);
//! assert_eq!(captured, b"11\n");
//! ```

use std::fmt;

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod heap;
pub mod lexer;
pub mod opcodes;
pub mod parser;
pub mod semantic;
pub mod stack;
pub mod state;
pub mod symbol;
pub mod token;

// Re-exports
pub use bytecode::BytecodeStream;
pub use error::{CompileError, RuntimeError, SemanticError, SyntaxError, VmError, VmResult};
pub use opcodes::OpCode;
pub use state::VmState;

/// Everything that can stop a source file from reaching bytecode.
#[derive(Debug)]
pub enum PipelineError {
    Syntax(Vec<SyntaxError>),
    Semantic(Vec<SemanticError>),
    Lowering(CompileError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Syntax(errors) => {
                for error in errors {
                    writeln!(f, "{error}")?;
                }
                Ok(())
            }
            PipelineError::Semantic(errors) => {
                for error in errors {
                    writeln!(f, "{error}")?;
                }
                Ok(())
            }
            PipelineError::Lowering(error) => writeln!(f, "{error}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Run the whole compile pipeline over a source string.
pub fn compile_source(source: &str) -> Result<BytecodeStream, PipelineError> {
    let tokens = lexer::Lexer::new(source).scan();
    let mut program = parser::parse(tokens).map_err(PipelineError::Syntax)?;
    semantic::analyse(&mut program).map_err(PipelineError::Semantic)?;
    compiler::compile(&program).map_err(PipelineError::Lowering)
}
