//! Recursive-descent parser with the type checker woven into construction.
//!
//! Each grammar level returns a typed [`Expr`]; type rules are enforced while
//! nodes are built, never in a separate pass. Identifier references are
//! resolved against the symbol table before their AST node exists, so the
//! tree never contains an unresolved name. The first violation of any rule
//! aborts parsing with the offending token's position.

use crate::ast::{BinOp, Expr, ExprKind, Stmt, UnaryOp};
use crate::lexer::{Token, TokenKind};
use crate::symtab::{SymbolTable, ValueType};
use crate::{CompileError, ErrorKind};

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    symbols: &'a mut SymbolTable,
}

impl<'a> Parser<'a> {
    /// `tokens` must end with an Eof token (the lexer guarantees this).
    pub fn new(tokens: &'a [Token], symbols: &'a mut SymbolTable) -> Self {
        Self {
            tokens,
            idx: 0,
            symbols,
        }
    }

    /// Parse statements until end of file.
    pub fn parse_program(mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    // ------------------------------
    // Statements
    // ------------------------------

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek().kind {
            TokenKind::Int4 => self.parse_declaration(),
            TokenKind::Ident => self.parse_assignment(),
            TokenKind::Print => self.parse_print(),
            TokenKind::Read => self.parse_read(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::LBrace => self.parse_block(),
            _ => {
                let t = self.peek().clone();
                Err(self.syntax_error(
                    &t,
                    format!("expected a statement, found {}", t.kind.describe()),
                ))
            }
        }
    }

    fn parse_declaration(&mut self) -> Result<Stmt, CompileError> {
        self.advance(); // int4
        let name_tok = self.expect(TokenKind::Ident)?.clone();
        let Some(slot) = self.symbols.insert(&name_tok.text, ValueType::Int4) else {
            return Err(CompileError::new(
                ErrorKind::Symbol,
                name_tok.line,
                name_tok.col,
                format!("duplicate declaration of '{}'", name_tok.text),
            ));
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Declare {
            name: name_tok.text,
            slot,
        })
    }

    fn parse_assignment(&mut self) -> Result<Stmt, CompileError> {
        let name_tok = self.advance().clone();
        let slot = self.resolve(&name_tok)?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression()?;
        let target_ty = self
            .symbols
            .get(slot)
            .map(|s| s.ty)
            .unwrap_or(ValueType::None);
        if value.ty != target_ty {
            return Err(CompileError::new(
                ErrorKind::Type,
                value.line,
                value.col,
                format!(
                    "cannot assign {} to {} variable '{}'",
                    value.ty, target_ty, name_tok.text
                ),
            ));
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Assign {
            name: name_tok.text,
            slot,
            value,
        })
    }

    fn parse_print(&mut self) -> Result<Stmt, CompileError> {
        self.advance(); // print
        self.expect(TokenKind::LParen)?;
        let mut args = vec![self.parse_expression()?];
        while self.eat(TokenKind::Comma) {
            args.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Print(args))
    }

    fn parse_read(&mut self) -> Result<Stmt, CompileError> {
        self.advance(); // read
        self.expect(TokenKind::LParen)?;
        let name_tok = self.expect(TokenKind::Ident)?.clone();
        let slot = self.resolve(&name_tok)?;
        let ty = self
            .symbols
            .get(slot)
            .map(|s| s.ty)
            .unwrap_or(ValueType::None);
        if ty != ValueType::Int4 {
            return Err(CompileError::new(
                ErrorKind::Type,
                name_tok.line,
                name_tok.col,
                format!("read target '{}' must be an int4 variable", name_tok.text),
            ));
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Read {
            name: name_tok.text,
            slot,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.advance(); // if
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        if cond.ty != ValueType::Bool {
            return Err(CompileError::new(
                ErrorKind::Type,
                cond.line,
                cond.col,
                format!("if condition must be bool, found {}", cond.ty),
            ));
        }
        self.expect(TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        self.advance(); // while
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        if cond.ty != ValueType::Bool {
            return Err(CompileError::new(
                ErrorKind::Type,
                cond.line,
                cond.col,
                format!("while condition must be bool, found {}", cond.ty),
            ));
        }
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_block(&mut self) -> Result<Stmt, CompileError> {
        self.advance(); // {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Block(stmts))
    }

    // ------------------------------
    // Expressions, lowest to highest precedence
    // ------------------------------

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let op_tok = self.advance().clone();
            let right = self.parse_and()?;
            left = self.logical_node(BinOp::Or, &op_tok, left, right)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_not()?;
        while self.check(TokenKind::And) {
            let op_tok = self.advance().clone();
            let right = self.parse_not()?;
            left = self.logical_node(BinOp::And, &op_tok, left, right)?;
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, CompileError> {
        if self.check(TokenKind::Not) {
            let op_tok = self.advance().clone();
            let operand = self.parse_not()?;
            if operand.ty != ValueType::Bool {
                return Err(CompileError::new(
                    ErrorKind::Type,
                    op_tok.line,
                    op_tok.col,
                    format!("operator '!' requires a bool operand, found {}", operand.ty),
                ));
            }
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                ty: ValueType::Bool,
                line: op_tok.line,
                col: op_tok.col,
            });
        }
        self.parse_relational()
    }

    fn parse_relational(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_arith()?;
        let op = match self.peek().kind {
            TokenKind::Less => BinOp::Less,
            TokenKind::LessEq => BinOp::LessEq,
            TokenKind::Greater => BinOp::Greater,
            TokenKind::GreaterEq => BinOp::GreaterEq,
            TokenKind::Equal => BinOp::Equal,
            TokenKind::NotEqual => BinOp::NotEqual,
            _ => return Ok(left),
        };
        // Relational operators do not chain: exactly one comparison.
        let op_tok = self.advance().clone();
        let right = self.parse_arith()?;
        if left.ty != ValueType::Int4 || right.ty != ValueType::Int4 {
            return Err(CompileError::new(
                ErrorKind::Type,
                op_tok.line,
                op_tok.col,
                format!(
                    "operator '{}' requires int4 operands, found {} and {}",
                    op_tok.text, left.ty, right.ty
                ),
            ));
        }
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty: ValueType::Bool,
            line: op_tok.line,
            col: op_tok.col,
        })
    }

    fn parse_arith(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            let op_tok = self.advance().clone();
            let right = self.parse_term()?;
            left = self.arith_node(op, &op_tok, left, right)?;
        }
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => return Ok(left),
            };
            let op_tok = self.advance().clone();
            let right = self.parse_factor()?;
            left = self.arith_node(op, &op_tok, left, right)?;
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, CompileError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value: i32 = t.text.parse().map_err(|_| {
                    CompileError::new(
                        ErrorKind::Syntax,
                        t.line,
                        t.col,
                        format!("integer literal '{}' out of range", t.text),
                    )
                })?;
                Ok(Expr {
                    kind: ExprKind::IntLiteral(value),
                    ty: ValueType::Int4,
                    line: t.line,
                    col: t.col,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::BoolLiteral(t.kind == TokenKind::True),
                    ty: ValueType::Bool,
                    line: t.line,
                    col: t.col,
                })
            }
            TokenKind::StrLiteral => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::StrLiteral(t.text),
                    ty: ValueType::Str,
                    line: t.line,
                    col: t.col,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_factor()?;
                if operand.ty != ValueType::Int4 {
                    return Err(CompileError::new(
                        ErrorKind::Type,
                        t.line,
                        t.col,
                        format!("unary '-' requires an int4 operand, found {}", operand.ty),
                    ));
                }
                Ok(Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    ty: ValueType::Int4,
                    line: t.line,
                    col: t.col,
                })
            }
            TokenKind::Ident => {
                self.advance();
                let slot = self.resolve(&t)?;
                let ty = self
                    .symbols
                    .get(slot)
                    .map(|s| s.ty)
                    .unwrap_or(ValueType::None);
                Ok(Expr {
                    kind: ExprKind::Var { name: t.text, slot },
                    ty,
                    line: t.line,
                    col: t.col,
                })
            }
            _ => Err(self.syntax_error(
                &t,
                format!("expected an expression, found {}", t.kind.describe()),
            )),
        }
    }

    // ------------------------------
    // Node builders with inline type checks
    // ------------------------------

    fn arith_node(
        &self,
        op: BinOp,
        op_tok: &Token,
        left: Expr,
        right: Expr,
    ) -> Result<Expr, CompileError> {
        if left.ty != ValueType::Int4 || right.ty != ValueType::Int4 {
            return Err(CompileError::new(
                ErrorKind::Type,
                op_tok.line,
                op_tok.col,
                format!(
                    "operator '{}' requires int4 operands, found {} and {}",
                    op_tok.text, left.ty, right.ty
                ),
            ));
        }
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty: ValueType::Int4,
            line: op_tok.line,
            col: op_tok.col,
        })
    }

    fn logical_node(
        &self,
        op: BinOp,
        op_tok: &Token,
        left: Expr,
        right: Expr,
    ) -> Result<Expr, CompileError> {
        if left.ty != ValueType::Bool || right.ty != ValueType::Bool {
            return Err(CompileError::new(
                ErrorKind::Type,
                op_tok.line,
                op_tok.col,
                format!(
                    "operator '{}' requires bool operands, found {} and {}",
                    op_tok.text, left.ty, right.ty
                ),
            ));
        }
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty: ValueType::Bool,
            line: op_tok.line,
            col: op_tok.col,
        })
    }

    // ------------------------------
    // Token helpers
    // ------------------------------

    fn peek(&self) -> &Token {
        // The stream always ends with Eof; clamp instead of indexing past it.
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let i = self.idx.min(self.tokens.len() - 1);
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        &self.tokens[i]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let t = self.peek().clone();
            Err(self.syntax_error(
                &t,
                format!("expected {}, found {}", kind.describe(), t.kind.describe()),
            ))
        }
    }

    /// Resolve an identifier token to its slot; declare-before-use.
    fn resolve(&self, tok: &Token) -> Result<usize, CompileError> {
        self.symbols.find(&tok.text).ok_or_else(|| {
            CompileError::new(
                ErrorKind::Symbol,
                tok.line,
                tok.col,
                format!("undeclared identifier '{}'", tok.text),
            )
        })
    }

    fn syntax_error(&self, tok: &Token, message: String) -> CompileError {
        CompileError::new(ErrorKind::Syntax, tok.line, tok.col, message)
    }
}
