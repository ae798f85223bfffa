//! Semantic analyser.
//!
//! Walks the tree once, resolving names against the scope chain, checking
//! types and annotating nodes in place: every expression gets its result
//! type, store targets get their `assigned` flag, binary nodes record both
//! operand types, and INPUT/RETURN/CASE learn the widths the lowering pass
//! needs. Errors are collected; warnings go straight to stderr.

use crate::ast::{
    BinOp, DataType, Expr, Program, Stmt, SubroutineDecl, SubroutineKind, UnaryOp,
};
use crate::builtins::{self, BUILTIN_EOF};
use crate::error::SemanticError;
use crate::symbol::{ParamSig, ScopeKind, Symbol, SymbolKind, SymbolTable};
use crate::token::{Token, TokenKind};

pub struct Analyser {
    table: SymbolTable,
    errors: Vec<SemanticError>,
    /// Declared return type of the enclosing function, when inside one.
    current_function: Option<DataType>,
    has_returned: bool,
    assigning: bool,
    has_default: bool,
    case_returns: bool,
}

/// Check and annotate a program. On success the tree is ready to lower.
pub fn analyse(program: &mut Program) -> Result<(), Vec<SemanticError>> {
    let mut analyser = Analyser::new();
    for stmt in &mut program.body {
        analyser.check_stmt(stmt);
    }
    if analyser.errors.is_empty() {
        Ok(())
    } else {
        Err(analyser.errors)
    }
}

/// Register the builtin signature table into a symbol table. The lowering
/// pass seeds its own table through this as well.
pub fn register_builtins(table: &mut SymbolTable) {
    for builtin in builtins::BUILTINS {
        let mut symbol = Symbol::new(SymbolKind::Builtin {
            index: builtin.index,
            params: builtin.params.to_vec(),
            returns: builtin.returns,
        });
        symbol.initialised = true;
        table.define(builtin.name, symbol);
    }
}

impl Analyser {
    fn new() -> Self {
        let mut table = SymbolTable::new();
        register_builtins(&mut table);
        Analyser {
            table,
            errors: Vec::new(),
            current_function: None,
            has_returned: false,
            assigning: false,
            has_default: false,
            case_returns: false,
        }
    }

    fn error(&mut self, position: (u32, u32), context: &str, message: String) {
        self.errors.push(SemanticError {
            line: position.0,
            col: position.1,
            context: context.to_string(),
            message,
        });
    }

    fn warn(position: (u32, u32), context: &str, message: &str) {
        eprintln!(
            "[line {}, col {}] Warning in {}: {}",
            position.0, position.1, context, message
        );
    }

    fn in_subroutine(&self) -> bool {
        self.table.depth() > 0
    }

    // ========== Expressions ==========

    fn check_expr(&mut self, expr: &mut Expr) -> DataType {
        match expr {
            Expr::Literal { ty, .. } => *ty,
            Expr::Group { inner, ty } => {
                *ty = self.check_expr(inner);
                *ty
            }
            Expr::Variable { .. } => self.check_variable(expr),
            Expr::ArrayAccess { .. } => self.check_array_access(expr),
            Expr::Call { .. } => self.check_call_expr(expr),
            Expr::Unary { op, rhs, ty } => {
                let op = *op;
                let sub = self.check_expr(rhs);
                if sub == DataType::Error {
                    *ty = sub;
                    return sub;
                }
                if op == UnaryOp::Not {
                    if sub != DataType::Boolean {
                        let position = rhs.position();
                        self.error(
                            position,
                            "unary expression",
                            "NOT unary operator expects BOOLEAN expression.".to_string(),
                        );
                        *ty = DataType::Error;
                        return *ty;
                    }
                } else if sub != DataType::Integer && sub != DataType::Real {
                    let position = rhs.position();
                    self.error(
                        position,
                        "unary expression",
                        "Operator expects either INTEGER or REAL expression.".to_string(),
                    );
                    *ty = DataType::Error;
                    return *ty;
                }
                *ty = sub;
                sub
            }
            Expr::Binary { .. } => self.check_binary(expr),
            Expr::Assign { .. } => self.check_assign(expr),
        }
    }

    fn check_variable(&mut self, expr: &mut Expr) -> DataType {
        let Expr::Variable { name, ty, assigned } = expr else {
            return DataType::Error;
        };
        *assigned = self.assigning;
        let position = (name.line, name.col);

        let Some(symbol) = self.table.lookup(&name.lexeme).cloned() else {
            self.error(
                position,
                "variable expression",
                format!("Symbol '{}' not in scope.", name.lexeme),
            );
            *ty = DataType::Error;
            return *ty;
        };

        match symbol.kind {
            SymbolKind::Function { .. }
            | SymbolKind::Procedure { .. }
            | SymbolKind::Builtin { .. } => {
                self.error(
                    position,
                    "variable expression",
                    "Expect variable. Subroutines are NOT first class.".to_string(),
                );
                *ty = DataType::Error;
                return *ty;
            }
            SymbolKind::Const { .. } if self.assigning => {
                self.error(
                    position,
                    "variable expression",
                    format!("Can't assign to constant '{}'.", name.lexeme),
                );
                *ty = DataType::Error;
                return *ty;
            }
            SymbolKind::ForCounter if self.assigning => {
                self.error(
                    position,
                    "variable expression",
                    format!("Can't assign to FOR loop counter '{}'.", name.lexeme),
                );
                *ty = DataType::Error;
                return *ty;
            }
            _ => {}
        }

        let initialised = symbol.initialised;
        let value_type = symbol.value_type();

        if self.assigning {
            self.table.mark_initialised(&name.lexeme);
        } else if !initialised {
            self.error(
                position,
                "variable expression",
                format!(
                    "Symbol '{}' is not initialised previously and therefore cannot be used.",
                    name.lexeme
                ),
            );
            *ty = DataType::Error;
            return *ty;
        }

        *ty = value_type;
        *ty
    }

    fn check_array_access(&mut self, expr: &mut Expr) -> DataType {
        let Expr::ArrayAccess {
            name,
            index0,
            index1,
            ty,
            assigned,
        } = expr
        else {
            return DataType::Error;
        };
        *assigned = self.assigning;
        let position = (name.line, name.col);

        let (elem_ty, is_2d) = match self.table.lookup(&name.lexeme).map(|s| s.kind.clone()) {
            Some(SymbolKind::Array { elem_ty, is_2d }) => (elem_ty, is_2d),
            Some(SymbolKind::Param {
                ty,
                is_array: true,
                is_2d,
            }) => (ty, is_2d),
            Some(_) => {
                self.error(
                    position,
                    "array access expression",
                    "Expected array. Other symbols are NOT indexable.".to_string(),
                );
                *ty = DataType::Error;
                return *ty;
            }
            None => {
                self.error(
                    position,
                    "array access expression",
                    format!("Array '{}' is not in scope.", name.lexeme),
                );
                *ty = DataType::Error;
                return *ty;
            }
        };

        let was_assigning = self.assigning;
        self.assigning = false;
        let first = self.check_expr(index0);
        let second = index1.as_mut().map(|index| self.check_expr(index));
        self.assigning = was_assigning;

        if first != DataType::Integer && first != DataType::Error {
            self.error(
                position,
                "array access expression",
                "First index should be an INTEGER value.".to_string(),
            );
            *ty = DataType::Error;
            return *ty;
        }

        if second.is_some() != is_2d {
            let message = if is_2d {
                "Wrong array dimensions. Expected two indices but got one."
            } else {
                "Wrong array dimensions. Expected one index but got two."
            };
            self.error(position, "array access expression", message.to_string());
            *ty = DataType::Error;
            return *ty;
        }

        if let Some(second) = second {
            if second != DataType::Integer && second != DataType::Error {
                self.error(
                    position,
                    "array access expression",
                    "Second index should be an INTEGER value.".to_string(),
                );
                *ty = DataType::Error;
                return *ty;
            }
        }

        *ty = elem_ty;
        *ty
    }

    fn check_binary(&mut self, expr: &mut Expr) -> DataType {
        let Expr::Binary {
            op,
            lhs,
            rhs,
            lhs_ty,
            rhs_ty,
            ty,
        } = expr
        else {
            return DataType::Error;
        };
        let op = *op;
        let left = self.check_expr(lhs);
        let right = self.check_expr(rhs);
        *lhs_ty = left;
        *rhs_ty = right;
        let position = lhs.position();

        if left == DataType::Error || right == DataType::Error {
            *ty = DataType::Error;
            return *ty;
        }

        if op == BinOp::Concat {
            if left != DataType::String || right != DataType::String {
                self.error(
                    position,
                    "binary expression",
                    "Concatenation operator '&' expects two string operands.".to_string(),
                );
                *ty = DataType::Error;
                return *ty;
            }
            *ty = DataType::String;
        } else if op.is_comparison() {
            let mixed_numeric = (left == DataType::Real && right == DataType::Integer)
                || (left == DataType::Integer && right == DataType::Real);
            if left != right && !mixed_numeric {
                Self::warn(
                    position,
                    "binary expression",
                    "Operands are of different types. This comparison always results in FALSE.",
                );
            }
            *ty = DataType::Boolean;
        } else if op.is_logical() {
            if left != DataType::Boolean || right != DataType::Boolean {
                self.error(
                    position,
                    "binary expression",
                    "Logical operators require BOOLEAN operands.".to_string(),
                );
                *ty = DataType::Error;
                return *ty;
            }
            *ty = DataType::Boolean;
        } else {
            let numeric = |t: DataType| t == DataType::Integer || t == DataType::Real;
            if !numeric(left) || !numeric(right) {
                self.error(
                    position,
                    "binary expression",
                    "Arithmetic binary operations expect two INTEGER or REAL operands."
                        .to_string(),
                );
                *ty = DataType::Error;
                return *ty;
            }
            *ty = if left == DataType::Real
                || right == DataType::Real
                || op == BinOp::Div
                || op == BinOp::Power
            {
                DataType::Real
            } else {
                DataType::Integer
            };
            if op == BinOp::Fdiv {
                *ty = DataType::Integer;
            }
        }

        *ty
    }

    fn check_assign(&mut self, expr: &mut Expr) -> DataType {
        let Expr::Assign { target, value, ty } = expr else {
            return DataType::Error;
        };

        self.assigning = true;
        let left = self.check_expr(target);
        self.assigning = false;
        let right = self.check_expr(value);

        if left == DataType::Error || right == DataType::Error {
            *ty = DataType::Error;
            return *ty;
        }

        if left != right && !(left == DataType::Real && right == DataType::Integer) {
            let position = target.position();
            self.error(
                position,
                "assignment expression",
                "Assignment expression expects both sides of '<-' to be the same type."
                    .to_string(),
            );
            *ty = DataType::Error;
            return *ty;
        }

        // The assignment's value on the stack has the target's width: an
        // INTEGER right side is widened during lowering when the target
        // is REAL.
        *ty = left;
        *ty
    }

    fn check_call_expr(&mut self, expr: &mut Expr) -> DataType {
        let Expr::Call { name, .. } = expr else {
            return DataType::Error;
        };
        let position = (name.line, name.col);
        let callee = name.lexeme.clone();

        let Some(symbol) = self.table.lookup(&callee) else {
            self.error(
                position,
                "call expression",
                format!("Callable symbol '{}' not in scope.", callee),
            );
            set_expr_ty(expr, DataType::Error);
            return DataType::Error;
        };
        let initialised = symbol.initialised;
        let kind = symbol.kind.clone();

        match kind {
            SymbolKind::Builtin {
                index,
                params,
                returns,
            } => self.check_builtin_call(expr, position, index, &params, returns),
            SymbolKind::Function { params, returns } => {
                if !initialised {
                    self.error(
                        position,
                        "call expression",
                        format!(
                            "Symbol '{}' is not initialised previously, and therefore, cannot be used.",
                            callee
                        ),
                    );
                    set_expr_ty(expr, DataType::Error);
                    return DataType::Error;
                }
                let mut args = match expr {
                    Expr::Call { args, .. } => std::mem::take(args),
                    _ => return DataType::Error,
                };
                let ok = self.check_call_args(position, "call expression", &params, &mut args);
                if let Expr::Call { args: slot, ty, .. } = expr {
                    *slot = args;
                    *ty = if ok { returns } else { DataType::Error };
                    return *ty;
                }
                DataType::Error
            }
            _ => {
                self.error(
                    position,
                    "call expression",
                    "Expected function in call expression, but got other.".to_string(),
                );
                set_expr_ty(expr, DataType::Error);
                DataType::Error
            }
        }
    }

    fn check_builtin_call(
        &mut self,
        expr: &mut Expr,
        position: (u32, u32),
        index: i32,
        params: &[DataType],
        returns: DataType,
    ) -> DataType {
        let Expr::Call { args, .. } = expr else {
            return DataType::Error;
        };

        if args.len() != params.len() {
            self.error(
                position,
                "call expression",
                format!(
                    "Expected {} arguments as per definition but got {}.",
                    params.len(),
                    args.len()
                ),
            );
            set_expr_ty(expr, DataType::Error);
            return DataType::Error;
        }

        // EOF names its file by string literal; resolve the name against
        // the open-file symbol and rewrite the argument into a variable
        // read of the file's slot.
        if index == BUILTIN_EOF {
            let rewritten = match &args[0] {
                Expr::Literal {
                    value,
                    ty: DataType::String,
                } => {
                    let filename = value.string_content().to_string();
                    let is_open_file = matches!(
                        self.table.lookup(&filename).map(|s| &s.kind),
                        Some(SymbolKind::File { .. })
                    );
                    if !is_open_file {
                        self.error(
                            position,
                            "call expression",
                            "Not a valid file path.".to_string(),
                        );
                        set_expr_ty(expr, DataType::Error);
                        return DataType::Error;
                    }
                    Expr::Variable {
                        name: Token::synthetic(
                            TokenKind::Identifier,
                            filename,
                            value.line,
                            value.col,
                        ),
                        ty: DataType::File,
                        assigned: false,
                    }
                }
                _ => {
                    self.error(
                        position,
                        "call expression",
                        "Argument number 1 is not correct type.".to_string(),
                    );
                    set_expr_ty(expr, DataType::Error);
                    return DataType::Error;
                }
            };
            if let Expr::Call { args, ty, .. } = expr {
                args[0] = rewritten;
                *ty = returns;
                return returns;
            }
            return DataType::Error;
        }

        let params = params.to_vec();
        let mut taken = std::mem::take(args);
        let mut ok = true;
        for (i, arg) in taken.iter_mut().enumerate() {
            let arg_ty = self.check_expr(arg);
            if arg_ty == DataType::Error {
                continue;
            }
            if arg_ty != params[i] {
                self.error(
                    position,
                    "call expression",
                    format!("Argument number {} is not correct type.", i + 1),
                );
                ok = false;
            }
        }
        if let Expr::Call { args, ty, .. } = expr {
            *args = taken;
            *ty = if ok { returns } else { DataType::Error };
            return *ty;
        }
        DataType::Error
    }

    /// Shared argument checking for function calls and CALL statements.
    fn check_call_args(
        &mut self,
        position: (u32, u32),
        context: &str,
        params: &[ParamSig],
        args: &mut [Expr],
    ) -> bool {
        if params.len() != args.len() {
            self.error(
                position,
                context,
                format!(
                    "Expected {} arguments as per definition but got {}.",
                    params.len(),
                    args.len()
                ),
            );
            return false;
        }

        let mut ok = true;
        for (i, (param, arg)) in params.iter().zip(args.iter_mut()).enumerate() {
            let arg_ty = self.check_expr(arg);
            if arg_ty == DataType::Error {
                continue;
            }

            if arg_ty != param.ty && !(arg_ty == DataType::Array && param.is_array) {
                self.error(
                    position,
                    context,
                    format!("Argument number {} is not correct type.", i + 1),
                );
                ok = false;
                continue;
            }

            if param.byref && !matches!(arg, Expr::Variable { .. }) {
                self.error(
                    position,
                    context,
                    "Subroutine expects reference to a variable, so argument must be a variable expression."
                        .to_string(),
                );
                ok = false;
                continue;
            }

            if arg_ty == DataType::Array {
                let base = self.array_base_type(arg);
                if base != param.ty {
                    self.error(
                        position,
                        context,
                        format!("Argument number {} is an array but not of the correct type.", i + 1),
                    );
                    ok = false;
                }
            }
        }
        ok
    }

    /// Element type of an array-valued expression, looking through groups.
    fn array_base_type(&self, expr: &Expr) -> DataType {
        match expr {
            Expr::Variable { name, .. } => match self.table.lookup(&name.lexeme).map(|s| &s.kind) {
                Some(SymbolKind::Array { elem_ty, .. }) => *elem_ty,
                Some(SymbolKind::Param {
                    ty, is_array: true, ..
                }) => *ty,
                _ => DataType::Error,
            },
            Expr::Group { inner, .. } => self.array_base_type(inner),
            Expr::Assign { value, .. } => self.array_base_type(value),
            _ => DataType::Error,
        }
    }

    // ========== Statements ==========

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expr { expr, ty } => {
                *ty = self.check_expr(expr);
            }
            Stmt::Subroutine(decl) => self.check_subroutine(decl),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.check_expr(condition);
                if cond_ty != DataType::Boolean && cond_ty != DataType::Error {
                    let position = condition.position();
                    self.error(
                        position,
                        "IF statement",
                        "IF statement condition must result in BOOLEAN.".to_string(),
                    );
                }

                let orig_returned = self.has_returned;

                self.has_returned = false;
                self.table.push_scope(ScopeKind::Conditional);
                for inner in then_branch.iter_mut() {
                    self.check_stmt(inner);
                }
                self.warn_unclosed_files(condition.position(), "IF statement");
                self.table.pop_scope();
                let then_returns = self.has_returned;

                let mut else_returns = false;
                if let Some(else_branch) = else_branch {
                    self.has_returned = false;
                    self.table.push_scope(ScopeKind::Conditional);
                    for inner in else_branch.iter_mut() {
                        self.check_stmt(inner);
                    }
                    self.warn_unclosed_files(condition.position(), "IF statement");
                    self.table.pop_scope();
                    else_returns = self.has_returned;
                }

                self.has_returned = orig_returned || (then_returns && else_returns);
            }
            Stmt::Output { values } => {
                for value in values {
                    self.check_expr(value);
                }
            }
            Stmt::Input { target, expected } => self.check_input(target, expected),
            Stmt::Return { value, ty } => {
                self.has_returned = true;
                let position = value.position();
                let Some(declared) = self.current_function else {
                    self.error(
                        position,
                        "RETURN statement",
                        "RETURN statement may only be used in FUNCTION context.".to_string(),
                    );
                    return;
                };

                let value_ty = self.check_expr(value);
                *ty = declared;

                if value_ty != DataType::Error
                    && value_ty != declared
                    && !(value_ty == DataType::Integer && declared == DataType::Real)
                {
                    self.error(
                        position,
                        "RETURN statement",
                        "Unexpected return type.".to_string(),
                    );
                }
            }
            Stmt::While { condition, body } => {
                let cond_ty = self.check_expr(condition);
                if cond_ty != DataType::Boolean && cond_ty != DataType::Error {
                    let position = condition.position();
                    self.error(
                        position,
                        "WHILE statement",
                        "WHILE loop condition must result in a boolean.".to_string(),
                    );
                }
                let orig_returned = self.has_returned;
                self.table.push_scope(ScopeKind::Loop);
                for inner in body.iter_mut() {
                    self.check_stmt(inner);
                }
                self.warn_unclosed_files(condition.position(), "WHILE statement");
                self.table.pop_scope();
                self.has_returned = orig_returned;
            }
            Stmt::Repeat { body, condition } => {
                let cond_ty = self.check_expr(condition);
                if cond_ty != DataType::Boolean && cond_ty != DataType::Error {
                    let position = condition.position();
                    self.error(
                        position,
                        "REPEAT-UNTIL statement",
                        "REPEAT-UNTIL condition must result in a BOOLEAN.".to_string(),
                    );
                }
                let orig_returned = self.has_returned;
                self.table.push_scope(ScopeKind::Loop);
                for inner in body.iter_mut() {
                    self.check_stmt(inner);
                }
                self.warn_unclosed_files(condition.position(), "REPEAT-UNTIL statement");
                self.table.pop_scope();
                self.has_returned = orig_returned;
            }
            Stmt::For { .. } => self.check_for(stmt),
            Stmt::Case { .. } => self.check_case(stmt),
            Stmt::VarDecl { name, ty } => {
                let position = (name.line, name.col);
                if self.table.lookup_current(&name.lexeme).is_some() {
                    self.error(
                        position,
                        "variable declaration statement",
                        format!("Symbol '{}' already exists.", name.lexeme),
                    );
                    return;
                }
                if self.table.lookup(&name.lexeme).is_some() {
                    Self::warn(
                        position,
                        "variable declaration statement",
                        &format!(
                            "Symbol '{}' redeclaration in inner scope shadows outer definition.",
                            name.lexeme
                        ),
                    );
                }
                self.table
                    .define(&name.lexeme, Symbol::new(SymbolKind::Var { ty: *ty }));
            }
            Stmt::ConstDecl { name, ty, .. } => {
                let position = (name.line, name.col);
                if self.table.lookup_current(&name.lexeme).is_some() {
                    self.error(
                        position,
                        "constant declaration statement",
                        format!("Symbol '{}' already exists.", name.lexeme),
                    );
                    return;
                }
                if self.table.lookup(&name.lexeme).is_some() {
                    Self::warn(
                        position,
                        "constant declaration statement",
                        &format!(
                            "Symbol '{}' redeclaration in inner scope shadows outer definition.",
                            name.lexeme
                        ),
                    );
                }
                let mut symbol = Symbol::new(SymbolKind::Const { ty: *ty });
                symbol.initialised = true;
                self.table.define(&name.lexeme, symbol);
            }
            Stmt::ArrayDecl {
                name,
                elem_ty,
                dims,
                is_2d,
            } => {
                let position = (name.line, name.col);
                if self.table.lookup_current(&name.lexeme).is_some() {
                    self.error(
                        position,
                        "array declaration statement",
                        format!("Symbol '{}' already exists.", name.lexeme),
                    );
                    return;
                }
                if self.table.lookup(&name.lexeme).is_some() {
                    Self::warn(
                        position,
                        "array declaration statement",
                        &format!(
                            "Symbol '{}' redeclaration in inner scope shadows outer definition.",
                            name.lexeme
                        ),
                    );
                }
                let mut bad_dims = false;
                for dim in dims.iter_mut().flatten() {
                    let dim_ty = self.check_expr(dim);
                    if dim_ty != DataType::Integer && dim_ty != DataType::Error {
                        bad_dims = true;
                    }
                }
                if bad_dims {
                    self.error(
                        position,
                        "array declaration statement",
                        "Dimensions of array must be INTEGER values.".to_string(),
                    );
                    return;
                }
                let mut symbol = Symbol::new(SymbolKind::Array {
                    elem_ty: *elem_ty,
                    is_2d: *is_2d,
                });
                symbol.initialised = true;
                self.table.define(&name.lexeme, symbol);
            }
            Stmt::Call { name, args } => {
                let position = (name.line, name.col);
                let Some(symbol) = self.table.lookup(&name.lexeme) else {
                    self.error(
                        position,
                        "CALL statement",
                        format!("Callable symbol '{}' not in scope.", name.lexeme),
                    );
                    return;
                };
                let initialised = symbol.initialised;
                let SymbolKind::Procedure { params } = symbol.kind.clone() else {
                    self.error(
                        position,
                        "CALL statement",
                        "Expected procedure in CALL statement, but got other.".to_string(),
                    );
                    return;
                };
                if !initialised {
                    self.error(
                        position,
                        "CALL statement",
                        format!(
                            "Symbol '{}' is not initialised previously and therefore cannot be used.",
                            name.lexeme
                        ),
                    );
                    return;
                }
                self.check_call_args(position, "CALL statement", &params, args);
            }
            Stmt::OpenFile { filename, mode } => {
                let key = filename.string_content().to_string();
                let position = (filename.line, filename.col);
                if self.table.lookup(&key).is_some() {
                    self.error(
                        position,
                        "OPENFILE statement",
                        format!("File {} is already open.", key),
                    );
                    return;
                }
                let mut symbol = Symbol::new(SymbolKind::File { mode: *mode });
                symbol.initialised = true;
                self.table.define(&key, symbol);
                self.table.current_mut().files_opened += 1;
            }
            Stmt::CloseFile { filename } => {
                let key = filename.string_content().to_string();
                let position = (filename.line, filename.col);
                if self.table.lookup_current(&key).is_none() {
                    self.error(
                        position,
                        "CLOSEFILE statement",
                        format!(
                            "File {} not found in current scope. Files may only be closed in the same scope in which they were opened.",
                            key
                        ),
                    );
                    return;
                }
                self.table.remove(&key);
                let scope = self.table.current_mut();
                scope.files_opened = scope.files_opened.saturating_sub(1);
            }
            Stmt::ReadFile { filename, target } => {
                let key = filename.string_content().to_string();
                let position = (filename.line, filename.col);
                match self.table.lookup(&key).map(|s| s.kind.clone()) {
                    Some(SymbolKind::File { mode: crate::ast::FileMode::Read }) => {}
                    Some(SymbolKind::File { .. }) => {
                        self.error(
                            position,
                            "READFILE statement",
                            format!("File {} is not open for READ, therefore it can't be read.", key),
                        );
                        return;
                    }
                    Some(_) => {
                        self.error(
                            position,
                            "READFILE statement",
                            format!("Symbol {} is not a file.", key),
                        );
                        return;
                    }
                    None => {
                        self.error(
                            position,
                            "READFILE statement",
                            format!("File {} is not open and therefore can't be read.", key),
                        );
                        return;
                    }
                }

                let mut expected = DataType::None;
                self.check_input(target, &mut expected);
                if expected != DataType::String && expected != DataType::Error {
                    self.error(
                        position,
                        "READFILE statement",
                        "Target variable in READFILE must be of type STRING.".to_string(),
                    );
                }
            }
            Stmt::WriteFile { filename, values } => {
                let key = filename.string_content().to_string();
                let position = (filename.line, filename.col);
                match self.table.lookup(&key).map(|s| s.kind.clone()) {
                    Some(SymbolKind::File {
                        mode: crate::ast::FileMode::Write | crate::ast::FileMode::Append,
                    }) => {}
                    Some(SymbolKind::File { .. }) => {
                        self.error(
                            position,
                            "WRITEFILE statement",
                            format!(
                                "File {} is not open for WRITE nor APPEND, therefore it can't be written to.",
                                key
                            ),
                        );
                        return;
                    }
                    Some(_) => {
                        self.error(
                            position,
                            "WRITEFILE statement",
                            format!("Symbol {} is not a file.", key),
                        );
                        return;
                    }
                    None => {
                        self.error(
                            position,
                            "WRITEFILE statement",
                            format!("File {} is not open and therefore can't be written to.", key),
                        );
                        return;
                    }
                }
                for value in values {
                    self.check_expr(value);
                }
            }
        }
    }

    fn check_subroutine(&mut self, decl: &mut SubroutineDecl) {
        let position = (decl.name.line, decl.name.col);
        let context = match decl.kind {
            SubroutineKind::Function => "FUNCTION statement",
            SubroutineKind::Procedure => "PROCEDURE statement",
        };

        if self.in_subroutine() {
            self.error(
                position,
                context,
                "Subroutines are only allowed at top level as they live in global namespace."
                    .to_string(),
            );
            return;
        }
        if self.table.lookup(&decl.name.lexeme).is_some() {
            self.error(
                position,
                context,
                format!("Symbol '{}' already exists.", decl.name.lexeme),
            );
            return;
        }

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

        let (kind, scope_kind) = match decl.kind {
            SubroutineKind::Function => (
                SymbolKind::Function {
                    params: sigs,
                    returns: decl.returns,
                },
                ScopeKind::Function,
            ),
            SubroutineKind::Procedure => {
                (SymbolKind::Procedure { params: sigs }, ScopeKind::Procedure)
            }
        };
        let mut symbol = Symbol::new(kind);
        symbol.initialised = true;
        self.table.define(&decl.name.lexeme, symbol);

        let prev_function = self.current_function;
        self.current_function = match decl.kind {
            SubroutineKind::Function => Some(decl.returns),
            SubroutineKind::Procedure => None,
        };

        self.has_returned = false;
        self.table.push_scope(scope_kind);

        for param in &decl.params {
            if param.byref
                && !matches!(
                    param.ty,
                    DataType::Integer | DataType::Real | DataType::Char | DataType::Boolean
                )
            {
                self.error(
                    (param.name.line, param.name.col),
                    "parameter",
                    "Parameter may only be passed BYREF if it expects a primitive type."
                        .to_string(),
                );
            }
            let mut symbol = Symbol::new(SymbolKind::Param {
                ty: param.ty,
                is_array: param.is_array,
                is_2d: param.is_2d,
            });
            symbol.byref = param.byref;
            symbol.initialised = true;
            self.table.define(&param.name.lexeme, symbol);
        }

        for inner in decl.body.iter_mut() {
            self.check_stmt(inner);
        }

        self.warn_unclosed_files(position, context);
        self.table.pop_scope();
        self.current_function = prev_function;

        if decl.kind == SubroutineKind::Function && !self.has_returned {
            self.error(
                position,
                context,
                "Not all FUNCTION paths RETURN a value.".to_string(),
            );
        }
        self.has_returned = false;
    }

    fn check_input(&mut self, target: &mut Expr, expected: &mut DataType) {
        let (name, is_array_access) = match target {
            Expr::Variable { name, .. } => (name.clone(), false),
            Expr::ArrayAccess { name, .. } => (name.clone(), true),
            _ => {
                let position = target.position();
                self.error(position, "INPUT statement", "Expression not assignable.".to_string());
                *expected = DataType::Error;
                return;
            }
        };
        let position = (name.line, name.col);

        let Some(symbol) = self.table.lookup(&name.lexeme).cloned() else {
            self.error(
                position,
                "INPUT statement",
                format!("Target variable '{}' not in scope.", name.lexeme),
            );
            *expected = DataType::Error;
            return;
        };

        match &symbol.kind {
            SymbolKind::ForCounter => {
                self.error(
                    position,
                    "INPUT statement",
                    format!(
                        "Symbol '{}' is a counter in a FOR loop. It can't be inputted to.",
                        name.lexeme
                    ),
                );
                *expected = DataType::Error;
                return;
            }
            SymbolKind::Param {
                is_array: true, ..
            } if !is_array_access => {
                self.error(
                    position,
                    "INPUT statement",
                    format!(
                        "Symbol '{}' is not a variable, but an ARRAY reference. It can't be inputted to.",
                        name.lexeme
                    ),
                );
                *expected = DataType::Error;
                return;
            }
            SymbolKind::Var { .. } | SymbolKind::Param { .. } => {}
            SymbolKind::Array { .. } if is_array_access => {}
            _ => {
                self.error(
                    position,
                    "INPUT statement",
                    format!(
                        "Symbol '{}' is not a variable. Array references, constants and subroutines can't be inputted to.",
                        name.lexeme
                    ),
                );
                *expected = DataType::Error;
                return;
            }
        }

        self.assigning = true;
        *expected = self.check_expr(target);
        self.assigning = false;
        self.table.mark_initialised(&name.lexeme);
    }

    fn check_for(&mut self, stmt: &mut Stmt) {
        let Stmt::For {
            counter,
            init,
            end,
            step,
            body,
        } = stmt
        else {
            return;
        };
        let position = (counter.line, counter.col);

        if self.check_expr(init) != DataType::Integer {
            self.error(
                position,
                "FOR statement",
                "Initial value in FOR loop must be of type INTEGER.".to_string(),
            );
            return;
        }
        if self.check_expr(end) != DataType::Integer {
            self.error(
                position,
                "FOR statement",
                "Final value in FOR loop must be of type INTEGER.".to_string(),
            );
            return;
        }
        if let Some(step) = step {
            if step_literal(step).is_none() {
                self.error(
                    position,
                    "FOR statement",
                    "STEP value in FOR loop must be an INTEGER literal.".to_string(),
                );
                return;
            }
        }

        let existing = self.table.lookup(&counter.lexeme).map(|s| s.kind.clone());
        match existing {
            Some(SymbolKind::ForCounter) => {
                self.error(
                    position,
                    "FOR statement",
                    format!(
                        "'{}' is already a counter variable for another FOR loop. It can't be used.",
                        counter.lexeme
                    ),
                );
                return;
            }
            Some(SymbolKind::Var { ty }) | Some(SymbolKind::Param { ty, is_array: false, .. }) => {
                if ty != DataType::Integer {
                    self.error(
                        position,
                        "FOR statement",
                        format!(
                            "Symbol '{}' already exists and is not type INTEGER.",
                            counter.lexeme
                        ),
                    );
                    return;
                }
                Self::warn(
                    position,
                    "FOR statement",
                    &format!(
                        "Symbol '{}' already exists. It is not recommended as it may lead to infinite loops, as only FOR loop variable counters are protected from assignment.",
                        counter.lexeme
                    ),
                );
                self.table.mark_initialised(&counter.lexeme);
                self.table.push_scope(ScopeKind::Loop);
            }
            Some(_) => {
                self.error(
                    position,
                    "FOR statement",
                    format!(
                        "Symbol '{}' already exists and is not a valid counter symbol.",
                        counter.lexeme
                    ),
                );
                return;
            }
            None => {
                self.table.push_scope(ScopeKind::Loop);
                let mut symbol = Symbol::new(SymbolKind::ForCounter);
                symbol.initialised = true;
                self.table.define(&counter.lexeme, symbol);
            }
        }

        let orig_returned = self.has_returned;
        for inner in body.iter_mut() {
            self.check_stmt(inner);
        }
        self.warn_unclosed_files(position, "FOR statement");
        self.table.pop_scope();
        self.has_returned = orig_returned;
    }

    fn check_case(&mut self, stmt: &mut Stmt) {
        let Stmt::Case {
            scrutinee,
            scrutinee_ty,
            lines,
        } = stmt
        else {
            return;
        };
        let position = scrutinee.position();

        let ty = self.check_expr(scrutinee);
        *scrutinee_ty = ty;

        if ty != DataType::Integer && ty != DataType::Char && ty != DataType::Error {
            self.error(
                position,
                "CASE statement",
                "CASE statements may only handle expressions that result in INTEGER or CHAR values."
                    .to_string(),
            );
            return;
        }

        self.case_returns = true;
        self.table.push_scope(ScopeKind::Conditional);
        self.has_default = false;

        for line in lines.iter_mut() {
            if self.has_default {
                self.error(
                    position,
                    "CASE line statement",
                    "CASE line after OTHERWISE. Place it before OTHERWISE.".to_string(),
                );
                break;
            }
            match line.guard.as_mut() {
                None => self.has_default = true,
                Some(guard) => {
                    let guard_ty = self.check_expr(guard);
                    if guard_ty != DataType::Integer
                        && guard_ty != DataType::Char
                        && guard_ty != DataType::Error
                    {
                        self.error(
                            position,
                            "CASE line statement",
                            "Value in CASE line must result in INTEGER or CHAR value.".to_string(),
                        );
                    }
                }
            }

            let orig_returned = self.has_returned;
            self.has_returned = false;
            for inner in line.body.iter_mut() {
                self.check_stmt(inner);
            }
            self.case_returns &= self.has_returned;
            self.has_returned = orig_returned;
        }

        if !self.has_default {
            Self::warn(
                position,
                "CASE statement",
                "There exists unhandled cases as CASE block doesn't have OTHERWISE.",
            );
            self.case_returns = false;
        }

        self.warn_unclosed_files(position, "CASE statement");
        self.table.pop_scope();

        if self.case_returns {
            self.has_returned = true;
        }
    }

    fn warn_unclosed_files(&mut self, position: (u32, u32), context: &str) {
        if self.table.current().files_opened > 0 {
            Self::warn(
                position,
                context,
                "Not all file streams have been closed properly in this scope.",
            );
        }
    }
}

fn set_expr_ty(expr: &mut Expr, new_ty: DataType) {
    if let Expr::Call { ty, .. } = expr {
        *ty = new_ty;
    }
}

/// The literal value of a FOR step: a plain integer literal or a negated
/// one. Returns the signed value.
pub fn step_literal(step: &Expr) -> Option<i32> {
    match step {
        Expr::Literal {
            value,
            ty: DataType::Integer,
        } => value.lexeme.parse().ok(),
        Expr::Unary {
            op: UnaryOp::Neg,
            rhs,
            ..
        } => step_literal(rhs).map(|v| -v),
        Expr::Unary {
            op: UnaryOp::Plus,
            rhs,
            ..
        } => step_literal(rhs),
        _ => None,
    }
}
