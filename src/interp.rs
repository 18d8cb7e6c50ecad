//! Tree-walking evaluator. This is the reference semantics of the language;
//! the code generator is checked against it.
//!
//! Evaluation order mirrors the generated code: a binary arithmetic or
//! relational node evaluates its RIGHT subtree first, then the left. Logical
//! `&` and `|` are the exception; they evaluate left first and short-circuit.
//! `print` evaluates every argument before emitting anything, so a runtime
//! error in any argument produces no partial output.
//!
//! I/O is injected (`BufRead` in, `Write` out) so tests can drive the
//! evaluator with in-memory buffers.

use crate::ast::{BinOp, Expr, ExprKind, Stmt, UnaryOp};
use std::fmt;
use std::io::{BufRead, Write};

/// A fatal error during program execution. Execution stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// A computed value. Variables only ever hold `Int`; `Bool` and `Str` exist
/// transiently inside expressions and `print` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Str(String),
}

impl Value {
    fn as_int(&self) -> Result<i32, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(RuntimeError::new(format!(
                "expected an integer value, got {}",
                other
            ))),
        }
    }

    fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::new(format!(
                "expected a boolean value, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

pub struct Interp<R, W> {
    input: R,
    output: W,
    /// Variable store indexed by slot. Grows on demand, never shrinks.
    vars: Vec<i32>,
}

impl<R: BufRead, W: Write> Interp<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            vars: Vec::new(),
        }
    }

    /// Execute a statement list to completion, then flush the output.
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<(), RuntimeError> {
        for s in stmts {
            self.exec(s)?;
        }
        self.output
            .flush()
            .map_err(|e| RuntimeError::new(format!("output flush failed: {}", e)))
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Declare { slot, .. } => {
                self.ensure_slot(*slot);
                Ok(())
            }
            Stmt::Assign { slot, value, .. } => {
                let v = self.eval(value)?.as_int()?;
                self.ensure_slot(*slot);
                self.vars[*slot] = v;
                Ok(())
            }
            Stmt::Print(args) => {
                // All arguments first, output second.
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(a)?);
                }
                for v in &values {
                    write!(self.output, "{}", v)
                        .map_err(|e| RuntimeError::new(format!("write failed: {}", e)))?;
                }
                Ok(())
            }
            Stmt::Read { slot, .. } => {
                let v = self.read_int()?;
                self.ensure_slot(*slot);
                self.vars[*slot] = v;
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond)?.as_bool()? {
                    self.exec(then_branch)
                } else if let Some(e) = else_branch {
                    self.exec(e)
                } else {
                    Ok(())
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.as_bool()? {
                    self.exec(body)?;
                }
                Ok(())
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.exec(s)?;
                }
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => Ok(Value::Int(*n)),
            ExprKind::BoolLiteral(b) => Ok(Value::Bool(*b)),
            ExprKind::StrLiteral(s) => Ok(Value::Str(s.clone())),
            ExprKind::Var { slot, .. } => {
                Ok(Value::Int(self.vars.get(*slot).copied().unwrap_or(0)))
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Neg => Ok(Value::Int(self.eval(operand)?.as_int()?.wrapping_neg())),
                UnaryOp::Not => Ok(Value::Bool(!self.eval(operand)?.as_bool()?)),
            },
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
        }
    }

    fn eval_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value, RuntimeError> {
        if op.is_logical() {
            // Left first, short-circuit.
            let l = self.eval(left)?.as_bool()?;
            return match op {
                BinOp::And if !l => Ok(Value::Bool(false)),
                BinOp::Or if l => Ok(Value::Bool(true)),
                _ => Ok(Value::Bool(self.eval(right)?.as_bool()?)),
            };
        }

        // Right subtree first, matching the generated code's stack discipline.
        let r = self.eval(right)?.as_int()?;
        let l = self.eval(left)?.as_int()?;
        let v = match op {
            BinOp::Add => Value::Int(l.wrapping_add(r)),
            BinOp::Sub => Value::Int(l.wrapping_sub(r)),
            BinOp::Mul => Value::Int(l.wrapping_mul(r)),
            BinOp::Div => {
                if r == 0 {
                    return Err(RuntimeError::new("division by zero"));
                }
                // i32::MIN / -1 faults in hardware; the oracle agrees.
                match l.checked_div(r) {
                    Some(v) => Value::Int(v),
                    None => return Err(RuntimeError::new("division overflow")),
                }
            }
            BinOp::Mod => {
                if r == 0 {
                    return Err(RuntimeError::new("modulo by zero"));
                }
                match l.checked_rem(r) {
                    Some(v) => Value::Int(v),
                    None => return Err(RuntimeError::new("division overflow")),
                }
            }
            BinOp::Less => Value::Bool(l < r),
            BinOp::LessEq => Value::Bool(l <= r),
            BinOp::Greater => Value::Bool(l > r),
            BinOp::GreaterEq => Value::Bool(l >= r),
            BinOp::Equal => Value::Bool(l == r),
            BinOp::NotEqual => Value::Bool(l != r),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        };
        Ok(v)
    }

    fn ensure_slot(&mut self, slot: usize) {
        if self.vars.len() <= slot {
            self.vars.resize(slot + 1, 0);
        }
    }

    /// Read one whitespace-delimited integer. Anything else is fatal.
    fn read_int(&mut self) -> Result<i32, RuntimeError> {
        let io_err = |e: std::io::Error| RuntimeError::new(format!("read failed: {}", e));

        loop {
            let chunk = self.input.fill_buf().map_err(io_err)?;
            if chunk.is_empty() {
                return Err(RuntimeError::new("end of input while reading an integer"));
            }
            let skip = chunk.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let found = skip < chunk.len();
            self.input.consume(skip);
            if found {
                break;
            }
        }

        let mut word = Vec::new();
        loop {
            let chunk = self.input.fill_buf().map_err(io_err)?;
            if chunk.is_empty() {
                break;
            }
            let take = chunk
                .iter()
                .take_while(|b| !b.is_ascii_whitespace())
                .count();
            word.extend_from_slice(&chunk[..take]);
            let done = take < chunk.len();
            self.input.consume(take);
            if done {
                break;
            }
        }

        let text = String::from_utf8_lossy(&word);
        text.parse::<i32>()
            .map_err(|_| RuntimeError::new(format!("invalid integer input '{}'", text)))
    }
}

/// Run a parsed program over the given streams.
pub fn run_program<R: BufRead, W: Write>(
    stmts: &[Stmt],
    input: R,
    output: W,
) -> Result<(), RuntimeError> {
    Interp::new(input, output).run(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;
    use std::io::Cursor;

    fn run(src: &str, input: &str) -> Result<String, RuntimeError> {
        let parsed = parse_source(src).expect("parse");
        let mut out = Vec::new();
        run_program(&parsed.stmts, Cursor::new(input.as_bytes()), &mut out)?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn arithmetic_and_print() {
        let out = run("int4 x; x <- 3; int4 y; y <- 4; print(x + y);", "").expect("run");
        assert_eq!(out, "7");
    }

    #[test]
    fn while_loop_counts() {
        let src = "int4 i; i <- 0; while (i < 3) { print(i); i <- i + 1; }";
        assert_eq!(run(src, "").expect("run"), "012");
    }

    #[test]
    fn if_else_picks_a_branch() {
        let src = "int4 x; x <- 5; if (x > 3) { print(1); } else { print(0); }";
        assert_eq!(run(src, "").expect("run"), "1");
        let src = "int4 x; x <- 2; if (x > 3) { print(1); } else { print(0); }";
        assert_eq!(run(src, "").expect("run"), "0");
    }

    #[test]
    fn logical_ops_short_circuit() {
        // The divisions by zero are never reached.
        let src = "if (true | (1 / 0 = 1)) { print(1); }";
        assert_eq!(run(src, "").expect("run"), "1");
        let src = "if (false & (1 / 0 = 1)) { print(1); } else { print(0); }";
        assert_eq!(run(src, "").expect("run"), "0");
    }

    #[test]
    fn right_operand_evaluates_first() {
        let err = run("print((1 / 0) + (1 mod 0));", "").expect_err("must fail");
        assert_eq!(err.message, "modulo by zero");
    }

    #[test]
    fn failing_print_emits_nothing() {
        let parsed = parse_source("print(\"a\", 1 / 0);").expect("parse");
        let mut out = Vec::new();
        let err = run_program(&parsed.stmts, Cursor::new(&b""[..]), &mut out)
            .expect_err("must fail");
        assert_eq!(err.message, "division by zero");
        assert!(out.is_empty());
    }

    #[test]
    fn prints_non_ascii_strings_unchanged() {
        assert_eq!(run("print(\"héllo\");", "").expect("run"), "héllo");
    }

    #[test]
    fn division_truncates_toward_zero() {
        let src = "print(-7 / 2, \" \", -7 mod 2, \" \", 7 / -2);";
        assert_eq!(run(src, "").expect("run"), "-3 -1 -3");
    }

    #[test]
    fn quotient_overflow_is_fatal() {
        // i32::MIN spelled as an expression; the literal alone would not fit.
        let err = run("print((-2147483647 - 1) / -1);", "").expect_err("must fail");
        assert_eq!(err.message, "division overflow");
        let err = run("print((-2147483647 - 1) mod -1);", "").expect_err("must fail");
        assert_eq!(err.message, "division overflow");
    }

    #[test]
    fn read_parses_whitespace_delimited_integers() {
        let src = "int4 a; int4 b; read(a); read(b); print(a + b);";
        assert_eq!(run(src, "  40\n\t2 ").expect("run"), "42");
    }

    #[test]
    fn read_rejects_malformed_input() {
        let err = run("int4 a; read(a);", "forty").expect_err("must fail");
        assert!(err.message.contains("'forty'"));
    }

    #[test]
    fn read_at_end_of_input_is_fatal() {
        let err = run("int4 a; read(a);", "   ").expect_err("must fail");
        assert!(err.message.contains("end of input"));
    }

    #[test]
    fn unassigned_variable_reads_as_zero() {
        assert_eq!(run("int4 x; print(x);", "").expect("run"), "0");
    }

    #[test]
    fn not_and_negation() {
        let src = "int4 x; x <- -5; if (! (x > 0)) { print(-x); }";
        assert_eq!(run(src, "").expect("run"), "5");
    }
}
