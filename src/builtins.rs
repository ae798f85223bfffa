//! The fixed builtin function table.
//!
//! Shared by the analyser (registration and call checking) and the VM
//! (the `CALL_BUILTIN` dispatcher indexes the same table). Adding a
//! builtin means appending a row here and implementing its handler.

use crate::ast::DataType;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub index: i32,
    pub name: &'static str,
    pub params: &'static [DataType],
    pub returns: DataType,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        index: 0,
        name: "SUBSTRING",
        params: &[DataType::String, DataType::Integer, DataType::Integer],
        returns: DataType::String,
    },
    Builtin {
        index: 1,
        name: "LENGTH",
        params: &[DataType::String],
        returns: DataType::Integer,
    },
    Builtin {
        index: 2,
        name: "LCASE",
        params: &[DataType::String],
        returns: DataType::String,
    },
    Builtin {
        index: 3,
        name: "UCASE",
        params: &[DataType::String],
        returns: DataType::String,
    },
    Builtin {
        index: 4,
        name: "RANDOMBETWEEN",
        params: &[DataType::Integer, DataType::Integer],
        returns: DataType::Integer,
    },
    Builtin {
        index: 5,
        name: "RND",
        params: &[],
        returns: DataType::Real,
    },
    Builtin {
        index: 6,
        name: "INT",
        params: &[DataType::Real],
        returns: DataType::Integer,
    },
    // EOF's argument is written as the file's name; the analyser rewrites
    // it to a file-variable reference before lowering.
    Builtin {
        index: 7,
        name: "EOF",
        params: &[DataType::String],
        returns: DataType::Boolean,
    },
    Builtin {
        index: 8,
        name: "CHARAT",
        params: &[DataType::String, DataType::Integer],
        returns: DataType::Char,
    },
];

/// Index of the EOF builtin, special-cased during analysis.
pub const BUILTIN_EOF: i32 = 7;

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}
