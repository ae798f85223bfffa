//! Recursive-descent parser.
//!
//! Statements are newline-terminated. On a syntax error the parser enters
//! panic mode, suppresses follow-on diagnostics and resynchronises at the
//! next newline or statement keyword, so one mistake produces one message.

use crate::ast::{
    BinOp, CaseLine, DataType, Expr, FileMode, Parameter, Program, Stmt, SubroutineDecl,
    SubroutineKind, UnaryOp,
};
use crate::error::SyntaxError;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    panic_mode: bool,
    produce_errors: bool,
}

/// Parse a token stream into a program, or the list of everything wrong
/// with it.
pub fn parse(tokens: Vec<Token>) -> Result<Program, Vec<SyntaxError>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        errors: Vec::new(),
        panic_mode: false,
        produce_errors: true,
    };
    let program = parser.program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) {
        loop {
            if self.check(TokenKind::Eof) {
                return;
            }
            self.pos += 1;
            if !self.check(TokenKind::Error) {
                return;
            }
            let message = self.current().lexeme.clone();
            self.error_at_current(&message);
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        // A file may end without a final newline.
        if self.check(TokenKind::Eof) && kind == TokenKind::NewLine {
            return true;
        }
        self.error_at_current(message);
        false
    }

    fn error_at(&mut self, index: usize, message: &str) {
        if self.panic_mode || !self.produce_errors {
            return;
        }
        self.panic_mode = true;
        let token = &self.tokens[index.min(self.tokens.len() - 1)];
        let place = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        self.errors.push(SyntaxError {
            line: token.line,
            col: token.col,
            place,
            message: message.to_string(),
        });
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.pos, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.pos.saturating_sub(1), message);
    }

    fn synchronise(&mut self) {
        self.panic_mode = false;
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::NewLine) {
                self.advance();
                return;
            }
            match self.current().kind {
                TokenKind::Declare
                | TokenKind::Function
                | TokenKind::Procedure
                | TokenKind::Call
                | TokenKind::Input
                | TokenKind::Output
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::For
                | TokenKind::Repeat => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ========== Expressions ==========

    fn expression(&mut self) -> Option<Expr> {
        self.assignment_expression()
    }

    fn assignment_expression(&mut self) -> Option<Expr> {
        if self.check(TokenKind::Identifier) {
            return self.assignment();
        }
        self.or_expression()
    }

    /// `name <- expr` / `name[i] <- expr`, or any other expression when no
    /// `<-` follows the left side (backtracking on failure).
    fn assignment(&mut self) -> Option<Expr> {
        let saved = self.pos;
        let target = self.assignment_left_side()?;

        if !self.matches(TokenKind::Assign) {
            self.pos = saved;
            return self.or_expression();
        }

        let value = self.assignment_expression()?;
        Some(Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
            ty: DataType::None,
        })
    }

    fn assignment_left_side(&mut self) -> Option<Expr> {
        let name = self.current().clone();
        self.advance();

        if self.matches(TokenKind::LeftBracket) {
            let index0 = Box::new(self.expression()?);
            let index1 = if self.matches(TokenKind::Comma) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            if !self.consume(TokenKind::RightBracket, "Expected ']' after array indices.") {
                return None;
            }
            return Some(Expr::ArrayAccess {
                name,
                index0,
                index1,
                ty: DataType::None,
                assigned: false,
            });
        }

        Some(Expr::Variable {
            name,
            ty: DataType::None,
            assigned: false,
        })
    }

    fn or_expression(&mut self) -> Option<Expr> {
        let mut expr = self.and_expression()?;
        while self.matches(TokenKind::Or) {
            let rhs = self.and_expression()?;
            expr = binary(BinOp::Or, expr, rhs);
        }
        Some(expr)
    }

    fn and_expression(&mut self) -> Option<Expr> {
        let mut expr = self.equality()?;
        while self.matches(TokenKind::And) {
            let rhs = self.equality()?;
            expr = binary(BinOp::And, expr, rhs);
        }
        Some(expr)
    }

    fn equality(&mut self) -> Option<Expr> {
        let mut expr = self.relational()?;
        loop {
            let op = if self.matches(TokenKind::Equal) {
                BinOp::Equal
            } else if self.matches(TokenKind::NotEqual) {
                BinOp::NotEqual
            } else {
                break;
            };
            let rhs = self.relational()?;
            expr = binary(op, expr, rhs);
        }
        Some(expr)
    }

    fn relational(&mut self) -> Option<Expr> {
        let mut expr = self.additive()?;
        loop {
            let op = if self.matches(TokenKind::Less) {
                BinOp::Less
            } else if self.matches(TokenKind::LessEqual) {
                BinOp::LessEqual
            } else if self.matches(TokenKind::Greater) {
                BinOp::Greater
            } else if self.matches(TokenKind::GreaterEqual) {
                BinOp::GreaterEqual
            } else {
                break;
            };
            let rhs = self.additive()?;
            expr = binary(op, expr, rhs);
        }
        Some(expr)
    }

    fn additive(&mut self) -> Option<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.matches(TokenKind::Plus) {
                BinOp::Add
            } else if self.matches(TokenKind::Minus) {
                BinOp::Minus
            } else {
                break;
            };
            let rhs = self.factor()?;
            expr = binary(op, expr, rhs);
        }
        Some(expr)
    }

    fn factor(&mut self) -> Option<Expr> {
        let mut expr = self.power()?;
        loop {
            let op = if self.matches(TokenKind::Star) {
                BinOp::Mult
            } else if self.matches(TokenKind::Slash) {
                BinOp::Div
            } else if self.matches(TokenKind::Mod) {
                BinOp::Mod
            } else if self.matches(TokenKind::Div) {
                BinOp::Fdiv
            } else {
                break;
            };
            let rhs = self.power()?;
            expr = binary(op, expr, rhs);
        }
        Some(expr)
    }

    /// `^` is right-associative.
    fn power(&mut self) -> Option<Expr> {
        let base = self.unary()?;
        if self.matches(TokenKind::Caret) {
            let exponent = self.power()?;
            return Some(binary(BinOp::Power, base, exponent));
        }
        Some(base)
    }

    fn unary(&mut self) -> Option<Expr> {
        let op = if self.matches(TokenKind::Plus) {
            UnaryOp::Plus
        } else if self.matches(TokenKind::Minus) {
            UnaryOp::Neg
        } else if self.matches(TokenKind::Not) {
            UnaryOp::Not
        } else {
            return self.concat();
        };
        let rhs = self.unary()?;
        Some(Expr::Unary {
            op,
            rhs: Box::new(rhs),
            ty: DataType::None,
        })
    }

    fn concat(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        while self.matches(TokenKind::Ampersand) {
            let rhs = self.primary()?;
            expr = binary(BinOp::Concat, expr, rhs);
        }
        Some(expr)
    }

    fn primary(&mut self) -> Option<Expr> {
        if self.matches(TokenKind::LeftParen) {
            let inner = self.expression()?;
            if !self.consume(
                TokenKind::RightParen,
                "Expect closing parenthesis ')' after group expression.",
            ) {
                return None;
            }
            return Some(Expr::Group {
                inner: Box::new(inner),
                ty: DataType::None,
            });
        }

        if self.matches(TokenKind::Identifier) {
            return self.symbol_expression();
        }

        let ty = match self.current().kind {
            TokenKind::IntLit => DataType::Integer,
            TokenKind::RealLit => DataType::Real,
            TokenKind::CharLit => DataType::Char,
            TokenKind::StringLit => DataType::String,
            TokenKind::True | TokenKind::False => DataType::Boolean,
            _ => {
                self.error_at_current("Expected primary literal or identifier.");
                return None;
            }
        };
        let value = self.current().clone();
        self.advance();
        Some(Expr::Literal { value, ty })
    }

    /// Identifier continuation: indexing, call, or a plain variable.
    fn symbol_expression(&mut self) -> Option<Expr> {
        let name = self.previous().clone();

        if self.matches(TokenKind::LeftBracket) {
            let index0 = Box::new(self.expression()?);
            let index1 = if self.matches(TokenKind::Comma) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            if !self.consume(TokenKind::RightBracket, "Expected ']' after array indices.") {
                return None;
            }
            return Some(Expr::ArrayAccess {
                name,
                index0,
                index1,
                ty: DataType::None,
                assigned: false,
            });
        }

        if self.matches(TokenKind::LeftParen) {
            let mut args = Vec::new();
            if !self.check(TokenKind::RightParen) {
                loop {
                    args.push(self.expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            if !self.consume(
                TokenKind::RightParen,
                "Expect closing ')' after arguments in call expression.",
            ) {
                return None;
            }
            return Some(Expr::Call {
                name,
                args,
                ty: DataType::None,
            });
        }

        Some(Expr::Variable {
            name,
            ty: DataType::None,
            assigned: false,
        })
    }

    // ========== Statements ==========

    fn program(&mut self) -> Program {
        let mut body = Vec::new();
        while !self.matches(TokenKind::Eof) {
            match self.declaration() {
                Some(stmt) if !self.panic_mode => body.push(stmt),
                _ => self.synchronise(),
            }
        }
        Program { body }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        if self.matches(TokenKind::NewLine) {
            return self.declaration();
        }
        if self.matches(TokenKind::Function) {
            return self.function();
        }
        if self.matches(TokenKind::Procedure) {
            return self.procedure();
        }
        if self.matches(TokenKind::Declare) {
            return self.symbol_declaration();
        }
        if self.matches(TokenKind::Constant) {
            return self.constant_declaration();
        }
        self.statement()
    }

    fn statement(&mut self) -> Option<Stmt> {
        if self.matches(TokenKind::If) {
            self.if_statement()
        } else if self.matches(TokenKind::Case) {
            self.case_statement()
        } else if self.matches(TokenKind::For) {
            self.for_statement()
        } else if self.matches(TokenKind::While) {
            self.while_statement()
        } else if self.matches(TokenKind::Repeat) {
            self.repeat_statement()
        } else if self.matches(TokenKind::Return) {
            self.return_statement()
        } else if self.matches(TokenKind::Call) {
            self.call_statement()
        } else if self.matches(TokenKind::Input) {
            self.input_statement()
        } else if self.matches(TokenKind::Output) {
            self.output_statement()
        } else if self.matches(TokenKind::Openfile) {
            self.openfile_statement()
        } else if self.matches(TokenKind::Closefile) {
            self.closefile_statement()
        } else if self.matches(TokenKind::Readfile) {
            self.readfile_statement()
        } else if self.matches(TokenKind::Writefile) {
            self.writefile_statement()
        } else {
            self.expression_statement()
        }
    }

    /// Statement list running up to (not consuming) `end`.
    fn block(&mut self, end: TokenKind) -> Option<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.check(end) && !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::NewLine) {
                continue;
            }
            body.push(self.declaration()?);
        }
        Some(body)
    }

    /// IF bodies additionally stop at ELSE.
    fn if_body(&mut self) -> Option<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.check(TokenKind::Else)
            && !self.check(TokenKind::Endif)
            && !self.check(TokenKind::Eof)
        {
            if self.matches(TokenKind::NewLine) {
                continue;
            }
            body.push(self.declaration()?);
        }
        Some(body)
    }

    fn data_type(&mut self, message: &str) -> Option<DataType> {
        let ty = match self.current().kind {
            TokenKind::Integer => DataType::Integer,
            TokenKind::Real => DataType::Real,
            TokenKind::Boolean => DataType::Boolean,
            TokenKind::Char => DataType::Char,
            TokenKind::Str => DataType::String,
            _ => {
                self.error_at_current(message);
                return None;
            }
        };
        self.advance();
        Some(ty)
    }

    fn parameter(&mut self) -> Option<Parameter> {
        let byref = self.matches(TokenKind::Byref);

        if !self.consume(TokenKind::Identifier, "Expected parameter name.") {
            return None;
        }
        let name = self.previous().clone();

        if !self.consume(
            TokenKind::Colon,
            "Expect ':' between parameter name and datatype.",
        ) {
            return None;
        }

        if self.matches(TokenKind::Array) {
            let mut is_2d = false;
            self.consume(
                TokenKind::LeftBracket,
                "Expect '[]', or '[,]' after ARRAY keyword.",
            );
            if self.matches(TokenKind::Comma) {
                is_2d = true;
            }
            self.consume(TokenKind::RightBracket, "Expect closing ']'.");
            self.consume(
                TokenKind::Of,
                "Expect keyword 'OF' between ARRAY specification and primitive type.",
            );
            let ty = self.data_type("Expected valid primitive type for ARRAY.")?;
            return Some(Parameter {
                name,
                ty,
                byref,
                is_array: true,
                is_2d,
            });
        }

        let ty = self.data_type("Expected valid parameter datatype.")?;
        Some(Parameter {
            name,
            ty,
            byref,
            is_array: false,
            is_2d: false,
        })
    }

    fn parameter_list(&mut self) -> Option<Vec<Parameter>> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.parameter()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        Some(params)
    }

    fn function(&mut self) -> Option<Stmt> {
        if !self.consume(TokenKind::Identifier, "Expect function name.") {
            return None;
        }
        let name = self.previous().clone();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        let params = self.parameter_list()?;
        self.consume(TokenKind::RightParen, "Expect ')' after parameter declarations.");
        self.consume(TokenKind::Returns, "Expect 'RETURNS' keyword.");
        let returns = self.data_type("Expected valid primitive return datatype.")?;
        self.consume(TokenKind::NewLine, "Expect new line after function header.");

        let body = self.block(TokenKind::Endfunction)?;
        self.consume(
            TokenKind::Endfunction,
            "Expect 'ENDFUNCTION' keyword to close function body.",
        );
        self.consume(TokenKind::NewLine, "Expect new line after function declaration.");

        Some(Stmt::Subroutine(Box::new(SubroutineDecl {
            name,
            kind: SubroutineKind::Function,
            params,
            returns,
            body,
        })))
    }

    fn procedure(&mut self) -> Option<Stmt> {
        if !self.consume(TokenKind::Identifier, "Expect procedure name.") {
            return None;
        }
        let name = self.previous().clone();

        self.consume(TokenKind::LeftParen, "Expect '(' after procedure name.");
        let params = self.parameter_list()?;
        self.consume(TokenKind::RightParen, "Expect ')' after parameter declarations.");
        self.consume(TokenKind::NewLine, "Expect new line after procedure header.");

        let body = self.block(TokenKind::Endprocedure)?;
        self.consume(
            TokenKind::Endprocedure,
            "Expect 'ENDPROCEDURE' keyword to close procedure body.",
        );
        self.consume(TokenKind::NewLine, "Expect new line after procedure declaration.");

        Some(Stmt::Subroutine(Box::new(SubroutineDecl {
            name,
            kind: SubroutineKind::Procedure,
            params,
            returns: DataType::None,
            body,
        })))
    }

    /// `DECLARE name : TYPE` or `DECLARE name : ARRAY[l:u (, l:u)] OF TYPE`
    fn symbol_declaration(&mut self) -> Option<Stmt> {
        if !self.consume(TokenKind::Identifier, "Expected variable name") {
            return None;
        }
        let name = self.previous().clone();

        if !self.consume(TokenKind::Colon, "Expected ':' after variable name.") {
            return None;
        }

        if self.matches(TokenKind::Array) {
            self.consume(TokenKind::LeftBracket, "Expected '[' before array dimensions.");

            let base0 = self.expression()?;
            self.consume(
                TokenKind::Colon,
                "Expected ':' delimiter between array dimensions.",
            );
            let top0 = self.expression()?;

            let mut dims = [Some(base0), Some(top0), None, None];
            let mut is_2d = false;
            if self.matches(TokenKind::Comma) {
                let base1 = self.expression()?;
                self.consume(
                    TokenKind::Colon,
                    "Expected delimiter between array dimensions.",
                );
                let top1 = self.expression()?;
                dims[2] = Some(base1);
                dims[3] = Some(top1);
                is_2d = true;
            }

            self.consume(
                TokenKind::RightBracket,
                "Expected closing ']' after array dimensions.",
            );
            self.consume(TokenKind::Of, "Expected 'OF' after array dimensions.");

            if self.check(TokenKind::Array) {
                self.error_at_current(
                    "Not possible to create nested array. Try bi-dimensional array notation instead.",
                );
                return None;
            }
            let elem_ty = self.data_type("Not valid datatype for array.")?;
            self.consume(TokenKind::NewLine, "Expected new line after array declaration.");

            return Some(Stmt::ArrayDecl {
                name,
                elem_ty,
                dims,
                is_2d,
            });
        }

        let ty = self.data_type("Expected valid primitive datatype.")?;
        self.consume(TokenKind::NewLine, "Expected new line after variable declaration.");
        Some(Stmt::VarDecl { name, ty })
    }

    /// `CONSTANT name = literal`
    fn constant_declaration(&mut self) -> Option<Stmt> {
        if !self.consume(TokenKind::Identifier, "Expected identifier for constant.") {
            return None;
        }
        let name = self.previous().clone();

        self.consume(
            TokenKind::Equal,
            "Expected assignment of constant value using '='.",
        );

        let ty = match self.current().kind {
            TokenKind::IntLit => DataType::Integer,
            TokenKind::RealLit => DataType::Real,
            TokenKind::CharLit => DataType::Char,
            TokenKind::StringLit => DataType::String,
            TokenKind::True | TokenKind::False => DataType::Boolean,
            _ => {
                self.error_at_current("Not a valid literal for CONSTANT value.");
                return None;
            }
        };
        let value = self.current().clone();
        self.advance();

        self.consume(TokenKind::NewLine, "Expected new line after constant literal.");
        Some(Stmt::ConstDecl { name, value, ty })
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let condition = self.expression()?;
        self.matches(TokenKind::NewLine);
        self.consume(TokenKind::Then, "Expected 'THEN' keyword before IF-THEN branch.");
        self.consume(TokenKind::NewLine, "Expect new line before IF-THEN branch.");

        let then_branch = self.if_body()?;

        let else_branch = if self.matches(TokenKind::Else) {
            self.consume(TokenKind::NewLine, "Expect new line after ELSE.");
            Some(self.block(TokenKind::Endif)?)
        } else {
            None
        };

        self.consume(
            TokenKind::Endif,
            "Unterminated IF statement. Expected ENDIF keyword.",
        );
        self.consume(TokenKind::NewLine, "Expect new line after ENDIF keyword.");

        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// One `guard : stmts` or `OTHERWISE : stmts` alternative. The body
    /// runs until something that reads as the next guard (`expr :`),
    /// OTHERWISE, or ENDCASE.
    fn case_line(&mut self) -> Option<CaseLine> {
        let guard = if self.matches(TokenKind::Otherwise) {
            None
        } else {
            Some(self.expression()?)
        };

        self.consume(TokenKind::Colon, "Expected ':' after CASE line value.");
        self.matches(TokenKind::NewLine);

        let mut body = vec![self.declaration()?];

        loop {
            if self.check(TokenKind::Otherwise)
                || self.check(TokenKind::Endcase)
                || self.check(TokenKind::Eof)
            {
                break;
            }
            if self.looks_like_case_guard() {
                break;
            }
            body.push(self.declaration()?);
        }

        Some(CaseLine { guard, body })
    }

    /// Lookahead: does the upcoming text parse as `expr :`? Runs with
    /// diagnostics off and rewinds unconditionally.
    fn looks_like_case_guard(&mut self) -> bool {
        let saved_pos = self.pos;
        let saved_panic = self.panic_mode;
        self.produce_errors = false;
        let parsed = self.expression();
        let is_guard = parsed.is_some() && self.check(TokenKind::Colon);
        self.produce_errors = true;
        self.panic_mode = saved_panic;
        self.pos = saved_pos;
        is_guard
    }

    fn case_statement(&mut self) -> Option<Stmt> {
        let scrutinee = self.expression()?;
        self.consume(TokenKind::Of, "Expected OF keyword after CASE expression.");
        self.consume(TokenKind::NewLine, "Expect new line after CASE header.");

        let mut lines = Vec::new();
        while !self.check(TokenKind::Endcase) && !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::NewLine) {
                continue;
            }
            lines.push(self.case_line()?);
        }

        self.consume(TokenKind::Endcase, "Expected ENDCASE after CASE body.");
        self.consume(TokenKind::NewLine, "Expected new line after CASE statement.");

        Some(Stmt::Case {
            scrutinee,
            scrutinee_ty: DataType::None,
            lines,
        })
    }

    fn for_statement(&mut self) -> Option<Stmt> {
        if !self.consume(TokenKind::Identifier, "Expected counter identifier.") {
            return None;
        }
        let counter = self.previous().clone();

        self.consume(TokenKind::Assign, "Expected assignment operator '<-'.");
        let init = self.expression()?;
        self.consume(TokenKind::To, "Expected 'TO' keyword.");
        let end = self.expression()?;

        let step = if self.matches(TokenKind::Step) {
            Some(self.unary()?)
        } else {
            None
        };

        self.consume(TokenKind::NewLine, "Expected new line after FOR loop header.");
        let body = self.block(TokenKind::Next)?;
        self.advance(); // NEXT

        if !self.consume(TokenKind::Identifier, "Expected counter name but got none.") {
            return None;
        }
        if self.previous().lexeme != counter.lexeme {
            let message = format!(
                "Expected counter name '{}' after NEXT, but got '{}'.",
                counter.lexeme,
                self.previous().lexeme
            );
            self.error(&message);
        }
        self.consume(TokenKind::NewLine, "Expected new line after FOR statement.");

        Some(Stmt::For {
            counter,
            init,
            end,
            step,
            body,
        })
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        let condition = self.expression()?;
        self.matches(TokenKind::NewLine);
        self.consume(
            TokenKind::Do,
            "Expected 'DO' keyword after WHILE statement condition.",
        );
        self.consume(
            TokenKind::NewLine,
            "Expect new line after 'DO' keyword in WHILE loop header.",
        );

        let body = self.block(TokenKind::Endwhile)?;
        self.consume(
            TokenKind::Endwhile,
            "Expected 'ENDWHILE' keyword to close WHILE loop body.",
        );
        self.consume(TokenKind::NewLine, "Expected new line after WHILE statement.");

        Some(Stmt::While { condition, body })
    }

    fn repeat_statement(&mut self) -> Option<Stmt> {
        self.consume(TokenKind::NewLine, "Expect new line after 'REPEAT' keyword.");
        let body = self.block(TokenKind::Until)?;
        self.consume(
            TokenKind::Until,
            "Expected 'UNTIL' keyword closing REPEAT-UNTIL loop body.",
        );
        let condition = self.expression()?;
        self.consume(TokenKind::NewLine, "Expected new line after REPEAT statement.");

        Some(Stmt::Repeat { body, condition })
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let value = self.expression()?;
        self.consume(TokenKind::NewLine, "Expected new line after return statement.");
        Some(Stmt::Return {
            value,
            ty: DataType::None,
        })
    }

    fn call_statement(&mut self) -> Option<Stmt> {
        if !self.consume(
            TokenKind::Identifier,
            "Expected procedure name after 'CALL' keyword.",
        ) {
            return None;
        }
        let name = self.previous().clone();

        self.consume(TokenKind::LeftParen, "Expected '(' after procedure name.");
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(
            TokenKind::RightParen,
            "Expected ')' after arguments in CALL statement.",
        );
        self.consume(TokenKind::NewLine, "Expect new line after CALL statement.");

        Some(Stmt::Call { name, args })
    }

    fn input_statement(&mut self) -> Option<Stmt> {
        if !self.consume(
            TokenKind::Identifier,
            "Expect identifier name after 'INPUT' keyword.",
        ) {
            return None;
        }
        let target = self.symbol_expression()?;
        self.consume(TokenKind::NewLine, "Expect new line after INPUT statement.");

        Some(Stmt::Input {
            target,
            expected: DataType::None,
        })
    }

    fn output_statement(&mut self) -> Option<Stmt> {
        let mut values = Vec::new();
        loop {
            values.push(self.expression()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::NewLine, "Expect new line after OUTPUT statement.");
        Some(Stmt::Output { values })
    }

    fn openfile_statement(&mut self) -> Option<Stmt> {
        if !self.consume(
            TokenKind::StringLit,
            "Expected string literal referring to file name.",
        ) {
            return None;
        }
        let filename = self.previous().clone();

        self.consume(TokenKind::For, "Expected FOR keyword after file name.");

        let mode = match self.current().kind {
            TokenKind::Read => FileMode::Read,
            TokenKind::Write => FileMode::Write,
            TokenKind::Append => FileMode::Append,
            _ => {
                self.error_at_current("Not a valid file access specifier.");
                return None;
            }
        };
        self.advance();

        self.consume(TokenKind::NewLine, "Expect new line after OPENFILE statement.");
        Some(Stmt::OpenFile { filename, mode })
    }

    fn closefile_statement(&mut self) -> Option<Stmt> {
        if !self.consume(
            TokenKind::StringLit,
            "Expected string literal referring to file name.",
        ) {
            return None;
        }
        let filename = self.previous().clone();
        self.consume(TokenKind::NewLine, "Expected new line after CLOSEFILE statement.");
        Some(Stmt::CloseFile { filename })
    }

    fn readfile_statement(&mut self) -> Option<Stmt> {
        if !self.consume(
            TokenKind::StringLit,
            "Expected string literal referring to file name.",
        ) {
            return None;
        }
        let filename = self.previous().clone();

        self.consume(
            TokenKind::Comma,
            "Expected comma separator between file name and target variable access.",
        );
        if !self.consume(TokenKind::Identifier, "Expect target variable name.") {
            return None;
        }
        let target = self.symbol_expression()?;
        self.consume(TokenKind::NewLine, "Expected new line after READFILE statement.");

        Some(Stmt::ReadFile { filename, target })
    }

    fn writefile_statement(&mut self) -> Option<Stmt> {
        if !self.consume(
            TokenKind::StringLit,
            "Expected string literal referring to file name.",
        ) {
            return None;
        }
        let filename = self.previous().clone();

        self.consume(
            TokenKind::Comma,
            "Expected comma separator between file name and expression list.",
        );

        let mut values = Vec::new();
        loop {
            values.push(self.expression()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::NewLine, "Expected new line after WRITEFILE statement.");

        Some(Stmt::WriteFile { filename, values })
    }

    fn expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.expression()?;
        if !self.consume(TokenKind::NewLine, "Expect new line after statement.") {
            return None;
        }
        Some(Stmt::Expr {
            expr,
            ty: DataType::None,
        })
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        lhs_ty: DataType::None,
        rhs_ty: DataType::None,
        ty: DataType::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(source: &str) -> Result<Program, Vec<SyntaxError>> {
        parse(Lexer::new(source).scan())
    }

    #[test]
    fn parses_declaration_and_assignment() {
        let program = parse_source("DECLARE x : INTEGER\nx <- 1 + 2\n").unwrap();
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0], Stmt::VarDecl { .. }));
        assert!(matches!(program.body[1], Stmt::Expr { .. }));
    }

    #[test]
    fn power_is_right_associative() {
        let program = parse_source("OUTPUT 2 ^ 3 ^ 2\n").unwrap();
        let Stmt::Output { values } = &program.body[0] else {
            panic!("expected OUTPUT");
        };
        let Expr::Binary { op, rhs, .. } = &values[0] else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Power);
        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Power, .. }));
    }

    #[test]
    fn for_requires_matching_next() {
        let err = parse_source("FOR i <- 1 TO 3\nOUTPUT i\nNEXT j\n").unwrap_err();
        assert!(err[0].message.contains("after NEXT"));
    }

    #[test]
    fn parses_case_lines() {
        let source = "CASE x OF\n1 : OUTPUT 1\n2 : OUTPUT 2\nOTHERWISE : OUTPUT 0\nENDCASE\n";
        let program = parse_source(source).unwrap();
        let Stmt::Case { lines, .. } = &program.body[0] else {
            panic!("expected CASE");
        };
        assert_eq!(lines.len(), 3);
        assert!(lines[0].guard.is_some());
        assert!(lines[2].guard.is_none());
    }

    #[test]
    fn case_body_may_span_lines() {
        let source = "CASE x OF\n1 : OUTPUT 1\nOUTPUT 10\n2 : OUTPUT 2\nENDCASE\n";
        let program = parse_source(source).unwrap();
        let Stmt::Case { lines, .. } = &program.body[0] else {
            panic!("expected CASE");
        };
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].body.len(), 2);
    }

    #[test]
    fn missing_endif_is_reported() {
        let err = parse_source("IF TRUE THEN\nOUTPUT 1\n").unwrap_err();
        assert!(err.iter().any(|e| e.message.contains("ENDIF")));
    }

    #[test]
    fn recovers_and_reports_later_errors() {
        let err = parse_source("OUTPUT +\nDECLARE : INTEGER\n").unwrap_err();
        assert!(err.len() >= 2);
    }

    #[test]
    fn byref_array_parameters() {
        let source =
            "PROCEDURE p(BYREF n : INTEGER, a : ARRAY[,] OF REAL)\nOUTPUT n\nENDPROCEDURE\n";
        let program = parse_source(source).unwrap();
        let Stmt::Subroutine(decl) = &program.body[0] else {
            panic!("expected subroutine");
        };
        assert!(decl.params[0].byref);
        assert!(decl.params[1].is_array && decl.params[1].is_2d);
    }
}
