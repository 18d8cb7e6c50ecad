//! x86-32 code generator with two-phase jump relocation.
//!
//! The generator walks the typed AST once and appends raw instruction bytes
//! to a flat buffer. Forward control transfers cannot know their target yet,
//! so every jump is emitted with a 4-byte placeholder displacement and a
//! patch record (field offset, label id). After the walk, `resolve_patches`
//! closes every record against the label placement map. A label referenced
//! but never placed aborts code generation; no buffer with unresolved
//! displacements ever leaves this module.
//!
//! Value protocol: integer expressions leave their result in eax, boolean
//! expressions leave 0 or 1 in al. Binary operands are computed right subtree
//! first, with the right value parked on the machine stack while the left is
//! computed into eax and then popped into ebx.

use crate::ast::{BinOp, Expr, ExprKind, Stmt, UnaryOp};
use crate::symtab::SymbolTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenError {
    pub message: String,
}

impl CodegenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codegen error: {}", self.message)
    }
}

impl std::error::Error for CodegenError {}

pub type LabelId = u32;

/// The finished buffer plus the relocation bookkeeping that produced it.
/// `code` is fully patched; `labels` and `patches` are kept for inspection.
#[derive(Debug, Clone)]
pub struct CodeArtifact {
    pub code: Vec<u8>,
    pub labels: BTreeMap<LabelId, usize>,
    /// Patched displacement fields: byte offset of the field, label it closed
    /// against.
    pub patches: Vec<(usize, LabelId)>,
    pub warnings: Vec<String>,
}

/// JSON-serializable view of the relocation bookkeeping.
#[derive(Debug, Serialize)]
pub struct RelocationReport {
    pub code_len: usize,
    pub labels: BTreeMap<LabelId, usize>,
    pub patches: BTreeMap<usize, LabelId>,
    pub warnings: Vec<String>,
}

impl CodeArtifact {
    pub fn relocation_report(&self) -> RelocationReport {
        RelocationReport {
            code_len: self.code.len(),
            labels: self.labels.clone(),
            patches: self.patches.iter().copied().collect(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Generate the machine-code buffer for a whole program.
pub fn generate_program(
    stmts: &[Stmt],
    symbols: &SymbolTable,
) -> Result<CodeArtifact, CodegenError> {
    let mut gen = CodeGen::new(symbols);
    gen.emit_prologue();
    for s in stmts {
        gen.emit_stmt(s)?;
    }
    gen.emit_epilogue();
    gen.finish()
}

struct CodeGen<'a> {
    symbols: &'a SymbolTable,
    code: Vec<u8>,
    labels: BTreeMap<LabelId, usize>,
    patches: Vec<(usize, LabelId)>,
    next_label: LabelId,
    warnings: Vec<String>,
}

impl<'a> CodeGen<'a> {
    fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            code: Vec::new(),
            labels: BTreeMap::new(),
            patches: Vec::new(),
            next_label: 0,
            warnings: Vec::new(),
        }
    }

    // ------------------------------
    // Labels and patches
    // ------------------------------

    fn new_label(&mut self) -> LabelId {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    /// Bind a label to the current buffer position. A second placement is
    /// ignored with a warning; the first one wins.
    fn place_label(&mut self, label: LabelId) {
        let here = self.code.len();
        if let Some(&first) = self.labels.get(&label) {
            self.warnings.push(format!(
                "label L{} placed twice, at {:#06x} and {:#06x}; keeping the first",
                label, first, here
            ));
            return;
        }
        self.labels.insert(label, here);
    }

    /// Emit `jmp rel32` to a label, displacement patched later.
    fn emit_jmp(&mut self, target: LabelId) {
        self.code.push(0xE9);
        self.record_patch(target);
    }

    /// Emit `jcc rel32` (`0F xx`) to a label, displacement patched later.
    fn emit_jcc(&mut self, cc: u8, target: LabelId) {
        self.code.push(0x0F);
        self.code.push(cc);
        self.record_patch(target);
    }

    fn record_patch(&mut self, target: LabelId) {
        self.patches.push((self.code.len(), target));
        self.code.extend_from_slice(&[0, 0, 0, 0]);
    }

    fn finish(mut self) -> Result<CodeArtifact, CodegenError> {
        resolve_patches(&mut self.code, &self.patches, &self.labels)?;
        Ok(CodeArtifact {
            code: self.code,
            labels: self.labels,
            patches: self.patches,
            warnings: self.warnings,
        })
    }

    // ------------------------------
    // Frame
    // ------------------------------

    fn emit_prologue(&mut self) {
        let frame = 4 * self.symbols.len() as u32;
        self.code.push(0x53); // push ebx
        self.code.push(0x55); // push ebp
        self.code.extend_from_slice(&[0x89, 0xE5]); // mov ebp, esp
        self.code.extend_from_slice(&[0x81, 0xEC]); // sub esp, imm32
        self.code.extend_from_slice(&frame.to_le_bytes());
    }

    fn emit_epilogue(&mut self) {
        self.code.extend_from_slice(&[0x89, 0xEC]); // mov esp, ebp
        self.code.push(0x5D); // pop ebp
        self.code.push(0x5B); // pop ebx
        self.code.push(0xC3); // ret
    }

    fn slot_offset(&self, slot: usize) -> Result<i32, CodegenError> {
        self.symbols
            .get(slot)
            .map(|s| s.offset)
            .ok_or_else(|| CodegenError::new(format!("no symbol for slot {}", slot)))
    }

    // ------------------------------
    // Statements
    // ------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            // Storage is part of the frame; declarations and reads emit
            // nothing.
            Stmt::Declare { .. } | Stmt::Read { .. } => Ok(()),
            Stmt::Assign { slot, value, .. } => {
                self.emit_expr(value)?;
                let off = self.slot_offset(*slot)?;
                self.code.extend_from_slice(&[0x89, 0x85]); // mov [ebp+disp], eax
                self.code.extend_from_slice(&off.to_le_bytes());
                Ok(())
            }
            Stmt::Print(args) => {
                // Arguments are evaluated in order for their side effects;
                // string literals have no machine representation and are
                // skipped.
                for a in args {
                    if !matches!(a.kind, ExprKind::StrLiteral(_)) {
                        self.emit_expr(a)?;
                    }
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let skip = self.new_label();
                self.emit_branch_if(cond, false, skip)?;
                self.emit_stmt(then_branch)?;
                if let Some(e) = else_branch {
                    let end = self.new_label();
                    self.emit_jmp(end);
                    self.place_label(skip);
                    self.emit_stmt(e)?;
                    self.place_label(end);
                } else {
                    self.place_label(skip);
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                // Bottom-tested loop: one conditional branch per iteration.
                let test = self.new_label();
                let top = self.new_label();
                self.emit_jmp(test);
                self.place_label(top);
                self.emit_stmt(body)?;
                self.place_label(test);
                self.emit_branch_if(cond, true, top)?;
                Ok(())
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.emit_stmt(s)?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------
    // Expressions
    // ------------------------------

    fn emit_expr(&mut self, expr: &Expr) -> Result<(), CodegenError> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                self.code.push(0xB8); // mov eax, imm32
                self.code.extend_from_slice(&n.to_le_bytes());
                Ok(())
            }
            ExprKind::BoolLiteral(b) => {
                self.code.push(0xB0); // mov al, imm8
                self.code.push(u8::from(*b));
                Ok(())
            }
            ExprKind::StrLiteral(_) => Err(CodegenError::new(
                "string value cannot be materialized in a register",
            )),
            ExprKind::Var { slot, .. } => {
                let off = self.slot_offset(*slot)?;
                self.code.extend_from_slice(&[0x8B, 0x85]); // mov eax, [ebp+disp]
                self.code.extend_from_slice(&off.to_le_bytes());
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                self.emit_expr(operand)?;
                match op {
                    UnaryOp::Neg => self.code.extend_from_slice(&[0xF7, 0xD8]), // neg eax
                    UnaryOp::Not => self.code.extend_from_slice(&[0x34, 0x01]), // xor al, 1
                }
                Ok(())
            }
            ExprKind::Binary { op, left, right } => self.emit_binary(*op, left, right),
        }
    }

    fn emit_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<(), CodegenError> {
        match op {
            BinOp::And => {
                // Left value stays in al when the right side is skipped.
                let end = self.new_label();
                self.emit_expr(left)?;
                self.code.extend_from_slice(&[0x84, 0xC0]); // test al, al
                self.emit_jcc(0x84, end); // jz
                self.emit_expr(right)?;
                self.place_label(end);
                Ok(())
            }
            BinOp::Or => {
                let end = self.new_label();
                self.emit_expr(left)?;
                self.code.extend_from_slice(&[0x84, 0xC0]); // test al, al
                self.emit_jcc(0x85, end); // jnz
                self.emit_expr(right)?;
                self.place_label(end);
                Ok(())
            }
            BinOp::Add => {
                self.emit_operand_pair(left, right)?;
                self.code.extend_from_slice(&[0x01, 0xD8]); // add eax, ebx
                Ok(())
            }
            BinOp::Sub => {
                self.emit_operand_pair(left, right)?;
                self.code.extend_from_slice(&[0x29, 0xD8]); // sub eax, ebx
                Ok(())
            }
            BinOp::Mul => {
                self.emit_operand_pair(left, right)?;
                self.code.extend_from_slice(&[0x0F, 0xAF, 0xC3]); // imul eax, ebx
                Ok(())
            }
            BinOp::Div => {
                self.emit_operand_pair(left, right)?;
                self.code.push(0x99); // cdq
                self.code.extend_from_slice(&[0xF7, 0xFB]); // idiv ebx
                Ok(())
            }
            BinOp::Mod => {
                self.emit_operand_pair(left, right)?;
                self.code.push(0x99); // cdq
                self.code.extend_from_slice(&[0xF7, 0xFB]); // idiv ebx
                self.code.extend_from_slice(&[0x89, 0xD0]); // mov eax, edx
                Ok(())
            }
            BinOp::Less
            | BinOp::LessEq
            | BinOp::Greater
            | BinOp::GreaterEq
            | BinOp::Equal
            | BinOp::NotEqual => {
                self.emit_operand_pair(left, right)?;
                self.code.extend_from_slice(&[0x39, 0xD8]); // cmp eax, ebx
                self.code.push(0x0F); // setcc al
                self.code.push(setcc_opcode(op));
                self.code.push(0xC0);
                Ok(())
            }
        }
    }

    /// Right subtree into eax, parked on the stack; left subtree into eax;
    /// right popped into ebx.
    fn emit_operand_pair(&mut self, left: &Expr, right: &Expr) -> Result<(), CodegenError> {
        self.emit_expr(right)?;
        self.code.push(0x50); // push eax
        self.emit_expr(left)?;
        self.code.push(0x5B); // pop ebx
        Ok(())
    }

    /// Branch to `target` on the condition's truth (or falsity). A bare
    /// relational condition compiles to cmp plus a direct jcc; anything else
    /// is computed into al and tested.
    fn emit_branch_if(
        &mut self,
        cond: &Expr,
        jump_if_true: bool,
        target: LabelId,
    ) -> Result<(), CodegenError> {
        if let ExprKind::Binary { op, left, right } = &cond.kind {
            let cc = match op {
                BinOp::Equal => Some((0x84, 0x85)),
                BinOp::NotEqual => Some((0x85, 0x84)),
                BinOp::Less => Some((0x8C, 0x8D)),
                BinOp::LessEq => Some((0x8E, 0x8F)),
                BinOp::Greater => Some((0x8F, 0x8E)),
                BinOp::GreaterEq => Some((0x8D, 0x8C)),
                _ => None,
            };
            if let Some((taken, inverted)) = cc {
                self.emit_operand_pair(left, right)?;
                self.code.extend_from_slice(&[0x39, 0xD8]); // cmp eax, ebx
                self.emit_jcc(if jump_if_true { taken } else { inverted }, target);
                return Ok(());
            }
        }
        self.emit_expr(cond)?;
        self.code.extend_from_slice(&[0x84, 0xC0]); // test al, al
        self.emit_jcc(if jump_if_true { 0x85 } else { 0x84 }, target);
        Ok(())
    }
}

/// Close every patch record against the label map, in place. Displacements
/// are relative to the end of the 4-byte field. Pure with respect to
/// emission; callable on any (buffer, patches, labels) triple.
pub fn resolve_patches(
    code: &mut [u8],
    patches: &[(usize, LabelId)],
    labels: &BTreeMap<LabelId, usize>,
) -> Result<(), CodegenError> {
    for &(field, label) in patches {
        let Some(&target) = labels.get(&label) else {
            return Err(CodegenError::new(format!(
                "label L{} referenced at {:#06x} but never placed",
                label, field
            )));
        };
        let diff = target as i64 - (field as i64 + 4);
        let disp = i32::try_from(diff).map_err(|_| {
            CodegenError::new(format!("jump displacement to L{} out of range", label))
        })?;
        let len = code.len();
        let Some(slot) = code.get_mut(field..field + 4) else {
            return Err(CodegenError::new(format!(
                "patch field at {:#06x} falls outside the {}-byte buffer",
                field, len
            )));
        };
        slot.copy_from_slice(&disp.to_le_bytes());
    }
    Ok(())
}

fn setcc_opcode(op: BinOp) -> u8 {
    match op {
        BinOp::Equal => 0x94,
        BinOp::NotEqual => 0x95,
        BinOp::Less => 0x9C,
        BinOp::LessEq => 0x9E,
        BinOp::Greater => 0x9F,
        BinOp::GreaterEq => 0x9D,
        _ => 0x90, // never reached; relational callers only
    }
}
