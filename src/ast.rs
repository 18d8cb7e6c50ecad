//! Typed abstract syntax tree shared by the evaluator and the code generator.
//!
//! Nodes are built by the parser with their value type already inferred and
//! every variable reference already resolved to a symbol slot; neither is ever
//! recomputed downstream. Statement sequence is an ordered `Vec`, as is a
//! `print` argument list.

use crate::symtab::ValueType;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "mod",
            BinOp::Less => "<",
            BinOp::LessEq => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEq => ">=",
            BinOp::Equal => "=",
            BinOp::NotEqual => "!=",
            BinOp::And => "&",
            BinOp::Or => "|",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i32),
    BoolLiteral(bool),
    StrLiteral(String),
    /// A variable reference with its slot resolved at parse time.
    Var { name: String, slot: usize },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// An expression node. `ty` is inferred at construction and never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: ValueType,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `int4 name;` — storage was reserved in the symbol table at parse time.
    Declare { name: String, slot: usize },
    Assign {
        name: String,
        slot: usize,
        value: Expr,
    },
    Print(Vec<Expr>),
    Read { name: String, slot: usize },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
}

/// Debug dump of a statement list, one node per line with indentation.
pub fn dump_program(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    out.push_str("statement block\n");
    for s in stmts {
        dump_stmt(s, 1, &mut out);
    }
    out
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_stmt(stmt: &Stmt, depth: usize, out: &mut String) {
    indent(depth, out);
    match stmt {
        Stmt::Declare { name, slot } => {
            out.push_str(&format!("declare {} (slot {})\n", name, slot));
        }
        Stmt::Assign { name, value, .. } => {
            out.push_str(&format!("assign {}\n", name));
            dump_expr(value, depth + 1, out);
        }
        Stmt::Print(args) => {
            out.push_str("print\n");
            for a in args {
                dump_expr(a, depth + 1, out);
            }
        }
        Stmt::Read { name, .. } => {
            out.push_str(&format!("read {}\n", name));
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str("if\n");
            dump_expr(cond, depth + 1, out);
            dump_stmt(then_branch, depth + 1, out);
            if let Some(e) = else_branch {
                indent(depth, out);
                out.push_str("else\n");
                dump_stmt(e, depth + 1, out);
            }
        }
        Stmt::While { cond, body } => {
            out.push_str("while\n");
            dump_expr(cond, depth + 1, out);
            dump_stmt(body, depth + 1, out);
        }
        Stmt::Block(stmts) => {
            out.push_str("block\n");
            for s in stmts {
                dump_stmt(s, depth + 1, out);
            }
        }
    }
}

fn dump_expr(expr: &Expr, depth: usize, out: &mut String) {
    indent(depth, out);
    match &expr.kind {
        ExprKind::IntLiteral(n) => out.push_str(&format!("{} : {}\n", n, expr.ty)),
        ExprKind::BoolLiteral(b) => out.push_str(&format!("{} : {}\n", b, expr.ty)),
        ExprKind::StrLiteral(s) => out.push_str(&format!("{:?} : {}\n", s, expr.ty)),
        ExprKind::Var { name, slot } => {
            out.push_str(&format!("{} (slot {}) : {}\n", name, slot, expr.ty));
        }
        ExprKind::Unary { op, operand } => {
            out.push_str(match op {
                UnaryOp::Neg => "neg\n",
                UnaryOp::Not => "not\n",
            });
            dump_expr(operand, depth + 1, out);
        }
        ExprKind::Binary { op, left, right } => {
            out.push_str(&format!("{} : {}\n", op, expr.ty));
            dump_expr(left, depth + 1, out);
            dump_expr(right, depth + 1, out);
        }
    }
}
