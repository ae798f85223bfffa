//! Lowering pass: checked syntax tree to bytecode.
//!
//! Walks the annotated tree once, assigning a stack offset to every data
//! symbol (absolute at global scope, frame-relative inside subroutines),
//! choosing typed opcodes from the analyser's annotations, and
//! back-patching every forward branch. The scoped symbol tables built here
//! are consumed in-pass; the emitted stream is self-contained.

use crate::ast::{
    BinOp, CaseLine, DataType, Expr, Program, Stmt, SubroutineDecl, SubroutineKind, UnaryOp,
};
use crate::bytecode::BytecodeStream;
use crate::error::CompileError;
use crate::opcodes::OpCode;
use crate::semantic::{register_builtins, step_literal};
use crate::symbol::{ParamSig, ScopeKind, Symbol, SymbolKind, SymbolTable};
use crate::token::Token;

pub struct Compiler {
    stream: BytecodeStream,
    table: SymbolTable,
}

/// Lower an analysed program to a bytecode stream ending in EXIT.
pub fn compile(program: &Program) -> Result<BytecodeStream, CompileError> {
    let mut compiler = Compiler {
        stream: BytecodeStream::new(),
        table: SymbolTable::new(),
    };
    register_builtins(&mut compiler.table);

    for stmt in &program.body {
        compiler.lower_stmt(stmt)?;
    }
    compiler.stream.emit_op(OpCode::Exit);
    Ok(compiler.stream)
}

/// Where a data symbol lives and what a read of it produces.
#[derive(Debug, Clone, Copy)]
struct SlotInfo {
    pos: i32,
    relative: bool,
    byref: bool,
    ty: DataType,
}

/// Typed opcode for a direct slot store.
fn store_op(ty: DataType, relative: bool) -> OpCode {
    match (ty, relative) {
        (DataType::Integer, false) => OpCode::StoreInt,
        (DataType::Integer, true) => OpCode::RStoreInt,
        (DataType::Real, false) => OpCode::StoreReal,
        (DataType::Real, true) => OpCode::RStoreReal,
        (DataType::Char, false) => OpCode::StoreChar,
        (DataType::Char, true) => OpCode::RStoreChar,
        (DataType::Boolean, false) => OpCode::StoreBool,
        (DataType::Boolean, true) => OpCode::RStoreBool,
        (_, false) => OpCode::StoreRef,
        (_, true) => OpCode::RStoreRef,
    }
}

/// Typed opcode for a direct slot fetch.
fn fetch_op(ty: DataType, relative: bool) -> OpCode {
    match (ty, relative) {
        (DataType::Integer, false) => OpCode::FetchInt,
        (DataType::Integer, true) => OpCode::RFetchInt,
        (DataType::Real, false) => OpCode::FetchReal,
        (DataType::Real, true) => OpCode::RFetchReal,
        (DataType::Char, false) => OpCode::FetchChar,
        (DataType::Char, true) => OpCode::RFetchChar,
        (DataType::Boolean, false) => OpCode::FetchBool,
        (DataType::Boolean, true) => OpCode::RFetchBool,
        (_, false) => OpCode::FetchRef,
        (_, true) => OpCode::RFetchRef,
    }
}

/// Typed opcode for a store through a BYREF stack reference.
fn store_ref_op(ty: DataType) -> OpCode {
    match ty {
        DataType::Integer => OpCode::StoreRefInt,
        DataType::Real => OpCode::StoreRefReal,
        DataType::Char => OpCode::StoreRefChar,
        _ => OpCode::StoreRefBool,
    }
}

/// Typed opcode for a fetch through a BYREF stack reference.
fn fetch_ref_op(ty: DataType) -> OpCode {
    match ty {
        DataType::Integer => OpCode::FetchRefInt,
        DataType::Real => OpCode::FetchRefReal,
        DataType::Char => OpCode::FetchRefChar,
        _ => OpCode::FetchRefBool,
    }
}

/// Fetch of the raw 8-byte reference held in a slot.
fn slot_ref_fetch(relative: bool) -> OpCode {
    if relative {
        OpCode::RFetchRef
    } else {
        OpCode::FetchRef
    }
}

/// Stack-hygiene pop matching a value's width.
fn pop_op(ty: DataType) -> Option<OpCode> {
    match ty.width() {
        1 => Some(OpCode::Pop1B),
        4 => Some(OpCode::Pop4B),
        8 => Some(OpCode::Pop8B),
        _ => None,
    }
}

impl Compiler {
    fn in_subroutine(&self) -> bool {
        self.table.depth() > 0
    }

    fn slot_info(&self, name: &str) -> Result<SlotInfo, CompileError> {
        let symbol = self
            .table
            .lookup(name)
            .ok_or_else(|| CompileError::UnresolvedSymbol(name.to_string()))?;
        Ok(SlotInfo {
            pos: symbol.pos,
            relative: symbol.relative,
            byref: symbol.byref,
            ty: symbol.value_type(),
        })
    }

    fn emit_load_int(&mut self, value: i32) {
        self.stream.emit_op(OpCode::LoadInt);
        self.stream.emit_i32(value);
    }

    fn emit_load_string(&mut self, bytes: &[u8]) {
        self.stream.emit_op(OpCode::LoadString);
        self.stream.emit_i32(bytes.len() as i32);
        self.stream.emit_bytes(bytes);
    }

    /// Fetch a slot's value: the reference indirection for BYREF
    /// parameters, the plain typed fetch otherwise.
    fn emit_fetch(&mut self, slot: SlotInfo) {
        self.emit_load_int(slot.pos);
        if slot.byref {
            self.stream.emit_op(slot_ref_fetch(slot.relative));
            self.stream.emit_op(fetch_ref_op(slot.ty));
        } else {
            self.stream.emit_op(fetch_op(slot.ty, slot.relative));
        }
    }

    /// Store the value on the stack top into a slot (value stays pushed).
    fn emit_store(&mut self, slot: SlotInfo) {
        self.emit_load_int(slot.pos);
        if slot.byref {
            self.stream.emit_op(slot_ref_fetch(slot.relative));
            self.stream.emit_op(store_ref_op(slot.ty));
        } else {
            self.stream.emit_op(store_op(slot.ty, slot.relative));
        }
    }

    /// Fetch just the 8-byte reference held in a slot (files, arrays).
    fn emit_fetch_slot_ref(&mut self, slot: SlotInfo) {
        self.emit_load_int(slot.pos);
        self.stream.emit_op(slot_ref_fetch(slot.relative));
    }

    fn patch_here(&mut self, placeholder: usize) {
        let target = self.stream.next_pos() as i32;
        self.stream.patch_i32(placeholder, target);
    }

    // ========== Expressions ==========

    fn lower_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal { value, ty } => self.lower_literal(value, *ty),
            Expr::Group { inner, .. } => self.lower_expr(inner),
            Expr::Variable { name, assigned, .. } => {
                let slot = self.slot_info(&name.lexeme)?;
                if *assigned {
                    self.emit_store(slot);
                } else {
                    self.emit_fetch(slot);
                }
                Ok(())
            }
            Expr::ArrayAccess {
                name,
                index0,
                index1,
                assigned,
                ..
            } => {
                let slot = self.slot_info(&name.lexeme)?;
                self.emit_fetch_slot_ref(slot);
                self.lower_expr(index0)?;
                match index1 {
                    Some(index1) => self.lower_expr(index1)?,
                    None => self.emit_load_int(0),
                }
                self.stream.emit_op(if *assigned {
                    OpCode::StoreArrayElem
                } else {
                    OpCode::FetchArrayElem
                });
                Ok(())
            }
            Expr::Call { name, args, .. } => self.lower_call(name, args),
            Expr::Unary { op, rhs, ty } => {
                self.lower_expr(rhs)?;
                match op {
                    UnaryOp::Not => self.stream.emit_op(OpCode::Not),
                    UnaryOp::Neg => self.stream.emit_op(if *ty == DataType::Real {
                        OpCode::NegReal
                    } else {
                        OpCode::NegInt
                    }),
                    UnaryOp::Plus => {}
                }
                Ok(())
            }
            Expr::Binary {
                op,
                lhs,
                rhs,
                lhs_ty,
                rhs_ty,
                ..
            } => self.lower_binary(*op, lhs, rhs, *lhs_ty, *rhs_ty),
            Expr::Assign { target, value, .. } => {
                self.lower_expr(value)?;
                if target.ty() == DataType::Real && value.ty() == DataType::Integer {
                    self.stream.emit_op(OpCode::CastIntReal);
                }
                self.lower_expr(target)
            }
        }
    }

    fn lower_literal(&mut self, value: &Token, ty: DataType) -> Result<(), CompileError> {
        match ty {
            DataType::Integer => {
                let n: i32 = value
                    .lexeme
                    .parse()
                    .map_err(|_| CompileError::MalformedLiteral(value.lexeme.clone()))?;
                self.emit_load_int(n);
            }
            DataType::Real => {
                let r: f64 = value
                    .lexeme
                    .parse()
                    .map_err(|_| CompileError::MalformedLiteral(value.lexeme.clone()))?;
                self.stream.emit_op(OpCode::LoadReal);
                self.stream.emit_f64(r);
            }
            DataType::Char => {
                self.stream.emit_op(OpCode::LoadChar);
                self.stream.emit_u8(value.char_value());
            }
            DataType::Boolean => {
                self.stream.emit_op(OpCode::LoadBool);
                self.stream.emit_u8(u8::from(value.lexeme.starts_with('T')));
            }
            DataType::String => {
                let content = value.string_content().as_bytes().to_vec();
                self.emit_load_string(&content);
            }
            _ => return Err(CompileError::UntypedNode),
        }
        Ok(())
    }

    /// Insert the widening casts the typed opcodes require: CHAR operands
    /// become INT, and the narrower side of a mixed INT/REAL pair widens.
    fn lower_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        lhs_ty: DataType,
        rhs_ty: DataType,
    ) -> Result<(), CompileError> {
        self.lower_expr(lhs)?;
        if lhs_ty == DataType::Integer && rhs_ty == DataType::Real {
            self.stream.emit_op(OpCode::CastIntReal);
        } else if lhs_ty == DataType::Char {
            self.stream.emit_op(OpCode::CastCharInt);
        }

        self.lower_expr(rhs)?;
        if lhs_ty == DataType::Real && rhs_ty == DataType::Integer {
            self.stream.emit_op(OpCode::CastIntReal);
        } else if rhs_ty == DataType::Char {
            self.stream.emit_op(OpCode::CastCharInt);
        }

        // Operand type both sides now share.
        let mut ty = lhs_ty;
        if ty == DataType::Integer && rhs_ty == DataType::Real {
            ty = DataType::Real;
        } else if ty == DataType::Char {
            ty = DataType::Integer;
        }

        let opcode = match op {
            BinOp::Concat => OpCode::Concat,
            BinOp::And => OpCode::And,
            BinOp::Or => OpCode::Or,
            BinOp::Equal => match ty {
                DataType::Real => OpCode::EqReal,
                DataType::Boolean => OpCode::EqBool,
                DataType::String => OpCode::EqString,
                DataType::Array | DataType::File => OpCode::EqRef,
                _ => OpCode::EqInt,
            },
            BinOp::NotEqual => match ty {
                DataType::Real => OpCode::NeqReal,
                DataType::Boolean => OpCode::NeqBool,
                DataType::String => OpCode::NeqString,
                DataType::Array | DataType::File => OpCode::NeqRef,
                _ => OpCode::NeqInt,
            },
            BinOp::Less => match ty {
                DataType::Real => OpCode::LessReal,
                DataType::Boolean => OpCode::LessBool,
                DataType::String => OpCode::LessString,
                DataType::Array | DataType::File => OpCode::LessRef,
                _ => OpCode::LessInt,
            },
            BinOp::LessEqual => match ty {
                DataType::Real => OpCode::LessEqReal,
                DataType::Boolean => OpCode::LessEqBool,
                DataType::String => OpCode::LessEqString,
                DataType::Array | DataType::File => OpCode::LessEqRef,
                _ => OpCode::LessEqInt,
            },
            BinOp::Greater => match ty {
                DataType::Real => OpCode::GreaterReal,
                DataType::Boolean => OpCode::GreaterBool,
                DataType::String => OpCode::GreaterString,
                DataType::Array | DataType::File => OpCode::GreaterRef,
                _ => OpCode::GreaterInt,
            },
            BinOp::GreaterEqual => match ty {
                DataType::Real => OpCode::GreaterEqReal,
                DataType::Boolean => OpCode::GreaterEqBool,
                DataType::String => OpCode::GreaterEqString,
                DataType::Array | DataType::File => OpCode::GreaterEqRef,
                _ => OpCode::GreaterEqInt,
            },
            BinOp::Add => pick_numeric(ty, OpCode::AddInt, OpCode::AddReal),
            BinOp::Minus => pick_numeric(ty, OpCode::MinusInt, OpCode::MinusReal),
            BinOp::Mult => pick_numeric(ty, OpCode::MultInt, OpCode::MultReal),
            BinOp::Div => pick_numeric(ty, OpCode::DivInt, OpCode::DivReal),
            BinOp::Mod => pick_numeric(ty, OpCode::ModInt, OpCode::ModReal),
            BinOp::Fdiv => pick_numeric(ty, OpCode::FdivInt, OpCode::FdivReal),
            BinOp::Power => pick_numeric(ty, OpCode::PowInt, OpCode::PowReal),
        };
        self.stream.emit_op(opcode);
        Ok(())
    }

    /// Shared by call expressions and CALL statements. BYREF arguments
    /// lower to a reference-taking sequence instead of a value.
    fn lower_call(&mut self, name: &Token, args: &[Expr]) -> Result<(), CompileError> {
        let symbol = self
            .table
            .lookup(&name.lexeme)
            .ok_or_else(|| CompileError::UnresolvedSymbol(name.lexeme.clone()))?;
        let entry = symbol.pos;
        let kind = symbol.kind.clone();

        match kind {
            SymbolKind::Builtin { index, .. } => {
                for arg in args {
                    self.lower_expr(arg)?;
                }
                self.stream.emit_op(OpCode::CallBuiltin);
                self.stream.emit_i32(index);
            }
            SymbolKind::Function { params, .. } | SymbolKind::Procedure { params } => {
                self.stream.emit_op(OpCode::CallSub);
                for (param, arg) in params.iter().zip(args) {
                    if param.byref {
                        self.lower_byref_argument(arg)?;
                    } else {
                        self.lower_expr(arg)?;
                    }
                }
                self.stream.emit_op(OpCode::DoCall);
                self.stream.emit_i32(entry);
            }
            _ => return Err(CompileError::UnresolvedSymbol(name.lexeme.clone())),
        }
        Ok(())
    }

    fn lower_byref_argument(&mut self, arg: &Expr) -> Result<(), CompileError> {
        let Expr::Variable { name, .. } = arg else {
            return Err(CompileError::UntypedNode);
        };
        let slot = self.slot_info(&name.lexeme)?;
        self.emit_load_int(slot.pos);
        self.stream.emit_op(if slot.relative {
            OpCode::RGetRef
        } else {
            OpCode::GetRef
        });
        Ok(())
    }

    // ========== Statements ==========

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr { expr, ty } => {
                self.lower_expr(expr)?;
                if let Some(op) = pop_op(*ty) {
                    self.stream.emit_op(op);
                }
                Ok(())
            }
            Stmt::Subroutine(decl) => self.lower_subroutine(decl),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.lower_expr(condition)?;
                self.stream.emit_op(OpCode::BranchFalse);
                let to_else = self.stream.emit_placeholder();

                for inner in then_branch {
                    self.lower_stmt(inner)?;
                }
                self.stream.emit_op(OpCode::Branch);
                let to_end = self.stream.emit_placeholder();
                self.patch_here(to_else);

                if let Some(else_branch) = else_branch {
                    for inner in else_branch {
                        self.lower_stmt(inner)?;
                    }
                }
                self.patch_here(to_end);
                Ok(())
            }
            Stmt::Output { values } => {
                for value in values {
                    self.lower_expr(value)?;
                    let opcode = match value.ty() {
                        DataType::Integer => OpCode::OutputInt,
                        DataType::Real => OpCode::OutputReal,
                        DataType::Char => OpCode::OutputChar,
                        DataType::Boolean => OpCode::OutputBool,
                        DataType::String => OpCode::OutputString,
                        _ => OpCode::OutputRef,
                    };
                    self.stream.emit_op(opcode);
                }
                self.stream.emit_op(OpCode::OutputNl);
                Ok(())
            }
            Stmt::Input { target, expected } => {
                let opcode = match expected {
                    DataType::Integer => OpCode::InputInt,
                    DataType::Real => OpCode::InputReal,
                    DataType::Char => OpCode::InputChar,
                    DataType::Boolean => OpCode::InputBool,
                    _ => OpCode::InputString,
                };
                self.stream.emit_op(opcode);
                self.lower_expr(target)?;
                if let Some(op) = pop_op(*expected) {
                    self.stream.emit_op(op);
                }
                Ok(())
            }
            Stmt::Return { value, ty } => {
                self.lower_expr(value)?;
                if *ty == DataType::Real && value.ty() == DataType::Integer {
                    self.stream.emit_op(OpCode::CastIntReal);
                }
                self.stream.emit_op(OpCode::Return);
                self.stream.emit_u8(ty.width());
                Ok(())
            }
            Stmt::While { condition, body } => {
                let cond_start = self.stream.next_pos() as i32;
                self.lower_expr(condition)?;
                self.stream.emit_op(OpCode::BranchFalse);
                let to_exit = self.stream.emit_placeholder();

                for inner in body {
                    self.lower_stmt(inner)?;
                }
                self.stream.emit_op(OpCode::Branch);
                self.stream.emit_i32(cond_start);
                self.patch_here(to_exit);
                Ok(())
            }
            Stmt::Repeat { body, condition } => {
                let start = self.stream.next_pos() as i32;
                for inner in body {
                    self.lower_stmt(inner)?;
                }
                self.lower_expr(condition)?;
                self.stream.emit_op(OpCode::BranchFalse);
                self.stream.emit_i32(start);
                Ok(())
            }
            Stmt::For { .. } => self.lower_for(stmt),
            Stmt::Case {
                scrutinee,
                scrutinee_ty,
                lines,
            } => self.lower_case(scrutinee, *scrutinee_ty, lines),
            Stmt::VarDecl { name, ty } => {
                match ty {
                    DataType::Integer => self.emit_load_int(0),
                    DataType::Boolean | DataType::Char => {
                        self.stream.emit_op(OpCode::LoadChar);
                        self.stream.emit_u8(0);
                    }
                    _ => {
                        self.stream.emit_op(OpCode::LoadReal);
                        self.stream.emit_f64(0.0);
                    }
                }
                let mut symbol = Symbol::new(SymbolKind::Var { ty: *ty });
                symbol.pos = self.table.reserve(i32::from(ty.width()));
                symbol.relative = self.in_subroutine();
                self.table.define(&name.lexeme, symbol);
                Ok(())
            }
            Stmt::ConstDecl { name, value, ty } => {
                let mut symbol = Symbol::new(SymbolKind::Const { ty: *ty });
                symbol.pos = self.table.reserve(i32::from(ty.width()));
                symbol.relative = self.in_subroutine();
                self.table.define(&name.lexeme, symbol);
                // The literal's value becomes the reserved slot's content.
                self.lower_literal(value, *ty)
            }
            Stmt::ArrayDecl {
                name,
                elem_ty,
                dims,
                ..
            } => {
                let mut symbol = Symbol::new(SymbolKind::Array {
                    elem_ty: *elem_ty,
                    is_2d: dims[2].is_some(),
                });
                symbol.pos = self.table.reserve(8);
                symbol.relative = self.in_subroutine();
                self.table.define(&name.lexeme, symbol);

                for dim in dims {
                    match dim {
                        Some(dim) => self.lower_expr(dim)?,
                        None => self.emit_load_int(0),
                    }
                }
                self.emit_load_int(i32::from(elem_ty.width()));
                self.stream.emit_op(OpCode::CreateArray);
                Ok(())
            }
            Stmt::Call { name, args } => self.lower_call(name, args),
            Stmt::OpenFile { filename, mode } => {
                let key = filename.string_content().to_string();
                let mut symbol = Symbol::new(SymbolKind::File { mode: *mode });
                symbol.pos = self.table.reserve(8);
                symbol.relative = self.in_subroutine();
                self.table.define(&key, symbol);

                self.emit_load_string(key.as_bytes());
                self.emit_load_int(*mode as i32);
                self.stream.emit_op(OpCode::OpenFile);
                Ok(())
            }
            Stmt::CloseFile { filename } => {
                let key = filename.string_content().to_string();
                let slot = self.slot_info(&key)?;
                self.emit_fetch_slot_ref(slot);
                self.table.remove(&key);
                self.stream.emit_op(OpCode::CloseFile);
                Ok(())
            }
            Stmt::ReadFile { filename, target } => {
                let key = filename.string_content().to_string();
                let slot = self.slot_info(&key)?;
                self.emit_fetch_slot_ref(slot);
                self.stream.emit_op(OpCode::ReadLine);
                self.lower_expr(target)?;
                self.stream.emit_op(OpCode::Pop8B);
                Ok(())
            }
            Stmt::WriteFile { filename, values } => {
                let key = filename.string_content().to_string();
                let slot = self.slot_info(&key)?;
                for value in values {
                    self.lower_expr(value)?;
                    self.emit_fetch_slot_ref(slot);
                    let opcode = match value.ty() {
                        DataType::Integer => OpCode::WriteInt,
                        DataType::Real => OpCode::WriteReal,
                        DataType::Char => OpCode::WriteChar,
                        DataType::Boolean => OpCode::WriteBool,
                        DataType::String => OpCode::WriteString,
                        _ => OpCode::WriteRef,
                    };
                    self.stream.emit_op(opcode);
                }
                self.emit_fetch_slot_ref(slot);
                self.stream.emit_op(OpCode::WriteNl);
                Ok(())
            }
        }
    }

    /// A subroutine body sits inline in the stream behind a branch that
    /// skips it; the position after the branch operand is the entry
    /// address recorded in the symbol table and burned into DO_CALL sites.
    fn lower_subroutine(&mut self, decl: &SubroutineDecl) -> Result<(), CompileError> {
        self.stream.emit_op(OpCode::Branch);
        let skip = self.stream.emit_placeholder();
        let entry = self.stream.next_pos() as i32;

        let sigs: Vec<ParamSig> = decl
            .params
            .iter()
            .map(|p| ParamSig {
                ty: p.ty,
                byref: p.byref,
                is_array: p.is_array,
                is_2d: p.is_2d,
            })
            .collect();
        let kind = match decl.kind {
            SubroutineKind::Function => SymbolKind::Function {
                params: sigs,
                returns: decl.returns,
            },
            SubroutineKind::Procedure => SymbolKind::Procedure { params: sigs },
        };
        let mut symbol = Symbol::new(kind);
        symbol.pos = entry;
        self.table.define(&decl.name.lexeme, symbol);

        self.table.push_scope(match decl.kind {
            SubroutineKind::Function => ScopeKind::Function,
            SubroutineKind::Procedure => ScopeKind::Procedure,
        });

        for param in &decl.params {
            let size = if param.byref || param.is_array {
                8
            } else {
                i32::from(param.ty.width())
            };
            let mut symbol = Symbol::new(SymbolKind::Param {
                ty: param.ty,
                is_array: param.is_array,
                is_2d: param.is_2d,
            });
            symbol.pos = self.table.reserve(size);
            symbol.relative = true;
            symbol.byref = param.byref;
            self.table.define(&param.name.lexeme, symbol);
        }

        for inner in &decl.body {
            self.lower_stmt(inner)?;
        }
        if decl.kind == SubroutineKind::Procedure {
            self.stream.emit_op(OpCode::ReturnNil);
        }

        self.patch_here(skip);
        self.table.pop_scope();
        Ok(())
    }

    /// The counter is a fresh 4-byte local unless the name is already
    /// bound; fresh counters are popped and their binding rolled back
    /// when the loop ends. The literal step's sign picks the comparison.
    fn lower_for(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let Stmt::For {
            counter,
            init,
            end,
            step,
            body,
        } = stmt
        else {
            return Err(CompileError::UntypedNode);
        };

        let saved_scope = self.table.snapshot();
        let existing = self.table.lookup(&counter.lexeme).cloned();

        let (slot, fresh) = match existing {
            Some(symbol) => (
                SlotInfo {
                    pos: symbol.pos,
                    relative: symbol.relative,
                    byref: symbol.byref,
                    ty: DataType::Integer,
                },
                false,
            ),
            None => {
                let mut symbol = Symbol::new(SymbolKind::ForCounter);
                symbol.pos = self.table.reserve(4);
                symbol.relative = self.in_subroutine();
                let slot = SlotInfo {
                    pos: symbol.pos,
                    relative: symbol.relative,
                    byref: false,
                    ty: DataType::Integer,
                };
                self.table.define(&counter.lexeme, symbol);
                self.emit_load_int(0);
                (slot, true)
            }
        };

        let step = step.as_ref().and_then(step_literal).unwrap_or(1);

        // counter <- init
        self.lower_expr(init)?;
        self.emit_store(slot);
        self.stream.emit_op(OpCode::Pop4B);

        // condition: counter <= end (>= for a negative step)
        let cond_start = self.stream.next_pos() as i32;
        self.emit_fetch(slot);
        self.lower_expr(end)?;
        self.stream.emit_op(if step < 0 {
            OpCode::GreaterEqInt
        } else {
            OpCode::LessEqInt
        });
        self.stream.emit_op(OpCode::BranchFalse);
        let to_exit = self.stream.emit_placeholder();

        for inner in body {
            self.lower_stmt(inner)?;
        }

        // counter <- counter + step
        self.emit_fetch(slot);
        self.emit_load_int(step);
        self.stream.emit_op(OpCode::AddInt);
        self.emit_store(slot);
        self.stream.emit_op(OpCode::Pop4B);

        self.stream.emit_op(OpCode::Branch);
        self.stream.emit_i32(cond_start);
        self.patch_here(to_exit);

        if fresh {
            self.stream.emit_op(OpCode::Pop4B);
        }
        self.table.restore(saved_scope);
        Ok(())
    }

    /// The scrutinee stays on the stack across the guard tests; each
    /// winning alternative pops it and branches forward through a rolling
    /// back-patch slot, converging past the last alternative. Without an
    /// OTHERWISE the fall-through path pops the scrutinee itself.
    fn lower_case(
        &mut self,
        scrutinee: &Expr,
        scrutinee_ty: DataType,
        lines: &[CaseLine],
    ) -> Result<(), CompileError> {
        self.lower_expr(scrutinee)?;
        if scrutinee_ty == DataType::Char {
            self.stream.emit_op(OpCode::CastCharInt);
        }

        let mut pending: Option<usize> = None;
        let mut has_otherwise = false;

        for line in lines {
            match &line.guard {
                Some(guard) => {
                    self.stream.emit_op(OpCode::CopyInt);
                    self.lower_expr(guard)?;
                    if guard.ty() == DataType::Char {
                        self.stream.emit_op(OpCode::CastCharInt);
                    }
                    self.stream.emit_op(OpCode::EqInt);
                    self.stream.emit_op(OpCode::BranchFalse);
                    let miss = self.stream.emit_placeholder();

                    self.stream.emit_op(OpCode::Pop4B);
                    for inner in &line.body {
                        self.lower_stmt(inner)?;
                    }

                    if let Some(previous) = pending {
                        self.patch_here(previous);
                    }
                    self.stream.emit_op(OpCode::Branch);
                    pending = Some(self.stream.emit_placeholder());
                    self.patch_here(miss);
                }
                None => {
                    has_otherwise = true;
                    self.stream.emit_op(OpCode::Pop4B);
                    for inner in &line.body {
                        self.lower_stmt(inner)?;
                    }
                    if let Some(previous) = pending.take() {
                        self.patch_here(previous);
                    }
                }
            }
        }

        if !has_otherwise {
            self.stream.emit_op(OpCode::Pop4B);
        }
        if let Some(previous) = pending {
            self.patch_here(previous);
        }
        Ok(())
    }
}

fn pick_numeric(ty: DataType, int_op: OpCode, real_op: OpCode) -> OpCode {
    if ty == DataType::Real {
        real_op
    } else {
        int_op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser;
    use crate::semantic;

    fn lower(source: &str) -> BytecodeStream {
        let mut program = parser::parse(Lexer::new(source).scan()).expect("parse");
        semantic::analyse(&mut program).expect("analyse");
        compile(&program).expect("compile")
    }

    fn ops(stream: &BytecodeStream) -> Vec<OpCode> {
        let mut ops = Vec::new();
        let bytes = stream.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let op = OpCode::try_from(bytes[pos]).expect("valid opcode");
            ops.push(op);
            pos += 1 + op.operand_width();
            if op == OpCode::LoadString {
                let len = i32::from_be_bytes(bytes[pos - 4..pos].try_into().unwrap());
                pos += len as usize;
            }
        }
        ops
    }

    #[test]
    fn program_ends_with_exit() {
        let stream = lower("OUTPUT 1\n");
        assert_eq!(ops(&stream).last(), Some(&OpCode::Exit));
    }

    #[test]
    fn arithmetic_selects_typed_opcodes() {
        let stream = lower("OUTPUT 3 + 4 * 2\n");
        let ops = ops(&stream);
        assert!(ops.contains(&OpCode::MultInt));
        assert!(ops.contains(&OpCode::AddInt));
        assert!(!ops.contains(&OpCode::AddReal));
    }

    #[test]
    fn mixed_operands_get_widening_cast() {
        let stream = lower("OUTPUT 1 + 2.5\n");
        let ops = ops(&stream);
        assert!(ops.contains(&OpCode::CastIntReal));
        assert!(ops.contains(&OpCode::AddReal));
    }

    #[test]
    fn assignment_stores_then_pops_by_width() {
        let stream = lower("DECLARE x : INTEGER\nx <- 7\n");
        let ops = ops(&stream);
        assert!(ops.contains(&OpCode::StoreInt));
        assert!(ops.contains(&OpCode::Pop4B));
    }

    #[test]
    fn locals_in_subroutines_are_frame_relative() {
        let source = "PROCEDURE p()\nDECLARE x : INTEGER\nx <- 1\nENDPROCEDURE\nCALL p()\n";
        let ops = ops(&lower(source));
        assert!(ops.contains(&OpCode::RStoreInt));
        assert!(!ops.contains(&OpCode::StoreInt));
    }

    #[test]
    fn subroutine_body_is_skipped_by_branch() {
        let source = "PROCEDURE p()\nOUTPUT 1\nENDPROCEDURE\nCALL p()\n";
        let stream = lower(source);
        let bytes = stream.as_bytes();
        assert_eq!(OpCode::try_from(bytes[0]).unwrap(), OpCode::Branch);
        let skip = i32::from_be_bytes(bytes[1..5].try_into().unwrap()) as usize;
        // the branch lands past the body, on an opcode boundary
        assert!(skip < bytes.len());
        assert!(OpCode::try_from(bytes[skip]).is_ok());
    }

    #[test]
    fn byref_arguments_take_references() {
        let source = "DECLARE x : INTEGER\nx <- 5\nPROCEDURE inc(BYREF n : INTEGER)\nn <- n + 1\nENDPROCEDURE\nCALL inc(x)\n";
        let ops = ops(&lower(source));
        assert!(ops.contains(&OpCode::GetRef));
        assert!(ops.contains(&OpCode::StoreRefInt));
        assert!(ops.contains(&OpCode::FetchRefInt));
    }

    #[test]
    fn builtin_calls_use_the_table_index() {
        let stream = lower("OUTPUT LENGTH(\"abc\")\n");
        let bytes = stream.as_bytes();
        let at = bytes
            .iter()
            .position(|b| *b == u8::from(OpCode::CallBuiltin))
            .expect("CALL_BUILTIN emitted");
        let index = i32::from_be_bytes(bytes[at + 1..at + 5].try_into().unwrap());
        assert_eq!(index, 1);
    }

    #[test]
    fn branch_targets_stay_inside_the_stream() {
        let source = "DECLARE x : INTEGER\nx <- 0\nWHILE x < 3 DO\nIF x = 1\nTHEN\nOUTPUT x\nELSE\nOUTPUT 0\nENDIF\nx <- x + 1\nENDWHILE\n";
        let stream = lower(source);
        let bytes = stream.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let op = OpCode::try_from(bytes[pos]).expect("valid opcode");
            if matches!(op, OpCode::Branch | OpCode::BranchFalse) {
                let target = i32::from_be_bytes(bytes[pos + 1..pos + 5].try_into().unwrap());
                assert!(target >= 0 && (target as usize) <= bytes.len());
            }
            pos += 1 + op.operand_width();
            if op == OpCode::LoadString {
                let len = i32::from_be_bytes(bytes[pos - 4..pos].try_into().unwrap());
                pos += len as usize;
            }
        }
    }

    #[test]
    fn for_loop_with_negative_step_compares_downward() {
        let ops = ops(&lower("FOR i <- 5 TO 1 STEP -1\nOUTPUT i\nNEXT i\n"));
        assert!(ops.contains(&OpCode::GreaterEqInt));
        assert!(!ops.contains(&OpCode::LessEqInt));
    }

    #[test]
    fn case_scrutinee_is_duplicated_per_guard() {
        let source = "DECLARE x : INTEGER\nx <- 2\nCASE x OF\n1 : OUTPUT 1\n2 : OUTPUT 2\nOTHERWISE : OUTPUT 0\nENDCASE\n";
        let ops = ops(&lower(source));
        assert_eq!(ops.iter().filter(|op| **op == OpCode::CopyInt).count(), 2);
    }
}
