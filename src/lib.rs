//! ncc — reference toolchain for a small imperative mini-language.
//!
//! A single-pass front end (lexer + type-checking recursive-descent parser +
//! symbol table) produces a statically-typed AST consumed by two independent
//! backends: a tree-walking evaluator that defines the language's operational
//! semantics, and an x86-32 code generator that emits a byte buffer and
//! resolves jump targets with a two-phase label/patch pass.
//!
//! Pipeline: source bytes -> [`lexer::Lexer`] -> token stream ->
//! [`parser::Parser`] (consulting the [`symtab::SymbolTable`]) -> typed AST ->
//! [`interp::Interp`] or [`codegen::generate_program`].
//!
//! Every error path is "report and stop": the first lexical, syntax, type or
//! symbol error aborts the compilation with a [`CompileError`] carrying the
//! offending position.

use std::fmt;

pub mod ast;
pub mod codegen;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod symtab;

use crate::ast::Stmt;
use crate::codegen::{generate_program, CodeArtifact, CodegenError};
use crate::symtab::SymbolTable;

// ------------------------------
// Compile-time error channel
// ------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Syntax,
    Type,
    Symbol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Lex => write!(f, "lexical error"),
            ErrorKind::Syntax => write!(f, "syntax error"),
            ErrorKind::Type => write!(f, "type error"),
            ErrorKind::Symbol => write!(f, "symbol error"),
        }
    }
}

/// A fatal front-end error with the offending source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, line: u32, col: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            col,
            message: message.into(),
        }
    }

    /// Render the error with the offending source line and a caret pointing
    /// at the column.
    pub fn render(&self, source: &str) -> String {
        let mut out = format!("{}: {}", self.kind, self);
        if let Some(line) = source::line_text(source.as_bytes(), self.line) {
            out.push('\n');
            out.push_str(line);
            out.push('\n');
            for _ in 1..self.col {
                out.push(' ');
            }
            out.push('^');
        }
        out
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.col)
    }
}

impl std::error::Error for CompileError {}

/// Any failure on the source-to-binary path.
#[derive(Debug)]
pub enum BuildError {
    Compile(CompileError),
    Codegen(CodegenError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Compile(e) => write!(f, "{}", e),
            BuildError::Codegen(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<CompileError> for BuildError {
    fn from(e: CompileError) -> Self {
        BuildError::Compile(e)
    }
}

impl From<CodegenError> for BuildError {
    fn from(e: CodegenError) -> Self {
        BuildError::Codegen(e)
    }
}

// ------------------------------
// Pipeline entry points
// ------------------------------

/// Front-end output: the typed statement list plus the symbol table both
/// backends share.
pub struct ParsedProgram {
    pub stmts: Vec<Stmt>,
    pub symbols: SymbolTable,
}

/// Lex and parse one source unit, enforcing the static type rules inline.
pub fn parse_source(source: &str) -> Result<ParsedProgram, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let mut symbols = SymbolTable::new();
    let stmts = parser::Parser::new(&tokens, &mut symbols).parse_program()?;
    Ok(ParsedProgram { stmts, symbols })
}

/// Compile one source unit down to the relocated machine-code buffer.
pub fn compile_source(source: &str) -> Result<CodeArtifact, BuildError> {
    let parsed = parse_source(source)?;
    let artifact = generate_program(&parsed.stmts, &parsed.symbols)?;
    Ok(artifact)
}
