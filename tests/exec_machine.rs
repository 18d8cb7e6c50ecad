//! Executes compiled buffers on a tiny interpreter for the exact x86-32
//! subset the code generator emits, then inspects the variable slots in the
//! frame. This pins down the runtime behavior of the generated code, not
//! just its byte shape.

use ncc::interp::run_program;
use ncc::{compile_source, parse_source};
use std::io::Cursor;

const MEM_SIZE: u32 = 4096;
const STEP_LIMIT: u64 = 1_000_000;

struct Machine {
    code: Vec<u8>,
    pc: usize,
    eax: i32,
    ebx: i32,
    edx: i32,
    ebp: u32,
    esp: u32,
    mem: Vec<u8>,
    frame_base: u32,
    zf: bool,
    sf: bool,
    of: bool,
}

impl Machine {
    fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            pc: 0,
            eax: 0,
            ebx: 0,
            edx: 0,
            ebp: 0,
            esp: MEM_SIZE,
            mem: vec![0; MEM_SIZE as usize],
            frame_base: 0,
            zf: false,
            sf: false,
            of: false,
        }
    }

    fn run(&mut self) -> Result<(), String> {
        let mut steps = 0u64;
        loop {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err("step limit exceeded".into());
            }
            let op = self.fetch_u8()?;
            match op {
                0x50 => self.push(self.eax)?,
                0x53 => self.push(self.ebx)?,
                0x55 => self.push(self.ebp as i32)?,
                0x58 => self.eax = self.pop()?,
                0x5B => self.ebx = self.pop()?,
                0x5D => self.ebp = self.pop()? as u32,
                0x89 => match self.fetch_u8()? {
                    0xE5 => {
                        self.ebp = self.esp;
                        self.frame_base = self.ebp;
                    }
                    0xEC => self.esp = self.ebp,
                    0xD0 => self.eax = self.edx,
                    0x85 => {
                        let disp = self.fetch_i32()?;
                        self.store(disp, self.eax)?;
                    }
                    other => return Err(format!("bad 89 modrm {:02x}", other)),
                },
                0x8B => match self.fetch_u8()? {
                    0x85 => {
                        let disp = self.fetch_i32()?;
                        self.eax = self.load(disp)?;
                    }
                    other => return Err(format!("bad 8b modrm {:02x}", other)),
                },
                0x81 => match self.fetch_u8()? {
                    0xEC => {
                        let imm = self.fetch_i32()? as u32;
                        self.esp = self.esp.wrapping_sub(imm);
                    }
                    other => return Err(format!("bad 81 modrm {:02x}", other)),
                },
                0xB8 => self.eax = self.fetch_i32()?,
                0xB0 => {
                    let imm = self.fetch_u8()?;
                    self.set_al(imm);
                }
                0x34 => {
                    let imm = self.fetch_u8()?;
                    self.set_al(self.al() ^ imm);
                }
                0x01 => {
                    self.expect(0xD8)?;
                    self.eax = self.eax.wrapping_add(self.ebx);
                }
                0x29 => {
                    self.expect(0xD8)?;
                    self.eax = self.eax.wrapping_sub(self.ebx);
                }
                0x99 => self.edx = if self.eax < 0 { -1 } else { 0 },
                0xF7 => match self.fetch_u8()? {
                    0xD8 => self.eax = self.eax.wrapping_neg(),
                    0xFB => self.idiv()?,
                    other => return Err(format!("bad f7 modrm {:02x}", other)),
                },
                0x39 => {
                    self.expect(0xD8)?;
                    let (res, of) = self.eax.overflowing_sub(self.ebx);
                    self.zf = res == 0;
                    self.sf = res < 0;
                    self.of = of;
                }
                0x84 => {
                    self.expect(0xC0)?;
                    let al = self.al();
                    self.zf = al == 0;
                    self.sf = (al as i8) < 0;
                    self.of = false;
                }
                0x0F => {
                    let sub = self.fetch_u8()?;
                    match sub {
                        0xAF => {
                            self.expect(0xC3)?;
                            self.eax = self.eax.wrapping_mul(self.ebx);
                        }
                        0x84 | 0x85 | 0x8C | 0x8D | 0x8E | 0x8F => {
                            let disp = self.fetch_i32()?;
                            if self.cond(sub & 0x0F)? {
                                self.jump(disp)?;
                            }
                        }
                        0x94 | 0x95 | 0x9C | 0x9D | 0x9E | 0x9F => {
                            self.expect(0xC0)?;
                            let v = self.cond(sub & 0x0F)?;
                            self.set_al(u8::from(v));
                        }
                        other => return Err(format!("bad 0f opcode {:02x}", other)),
                    }
                }
                0xE9 => {
                    let disp = self.fetch_i32()?;
                    self.jump(disp)?;
                }
                0xC3 => return Ok(()),
                other => return Err(format!("unknown opcode {:02x} at {:#06x}", other, self.pc - 1)),
            }
        }
    }

    /// Value of the variable at the given slot in the (possibly torn down)
    /// frame.
    fn slot(&self, slot: usize) -> i32 {
        let addr = self.frame_base.wrapping_sub(4 * (slot as u32 + 1)) as usize;
        i32::from_le_bytes([
            self.mem[addr],
            self.mem[addr + 1],
            self.mem[addr + 2],
            self.mem[addr + 3],
        ])
    }

    fn al(&self) -> u8 {
        self.eax as u8
    }

    fn set_al(&mut self, v: u8) {
        self.eax = (self.eax & !0xFF) | i32::from(v);
    }

    fn cond(&self, low: u8) -> Result<bool, String> {
        let v = match low {
            0x4 => self.zf,
            0x5 => !self.zf,
            0xC => self.sf != self.of,
            0xD => self.sf == self.of,
            0xE => self.zf || self.sf != self.of,
            0xF => !self.zf && self.sf == self.of,
            other => return Err(format!("bad condition code {:x}", other)),
        };
        Ok(v)
    }

    fn idiv(&mut self) -> Result<(), String> {
        if self.ebx == 0 {
            return Err("divide error".into());
        }
        let dividend = (i64::from(self.edx) << 32) | i64::from(self.eax as u32);
        let q = dividend / i64::from(self.ebx);
        let r = dividend % i64::from(self.ebx);
        self.eax = i32::try_from(q).map_err(|_| "divide overflow".to_string())?;
        self.edx = r as i32;
        Ok(())
    }

    fn fetch_u8(&mut self) -> Result<u8, String> {
        let b = *self
            .code
            .get(self.pc)
            .ok_or_else(|| "pc out of bounds".to_string())?;
        self.pc += 1;
        Ok(b)
    }

    fn fetch_i32(&mut self) -> Result<i32, String> {
        let bytes = self
            .code
            .get(self.pc..self.pc + 4)
            .ok_or_else(|| "truncated immediate".to_string())?;
        let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.pc += 4;
        Ok(v)
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        let got = self.fetch_u8()?;
        if got != byte {
            return Err(format!("expected byte {:02x}, got {:02x}", byte, got));
        }
        Ok(())
    }

    fn jump(&mut self, disp: i32) -> Result<(), String> {
        let target = self.pc as i64 + i64::from(disp);
        if target < 0 || target as usize > self.code.len() {
            return Err(format!("jump out of bounds to {}", target));
        }
        self.pc = target as usize;
        Ok(())
    }

    fn push(&mut self, v: i32) -> Result<(), String> {
        self.esp = self.esp.wrapping_sub(4);
        let esp = self.esp;
        self.write_mem(esp, v)
    }

    fn pop(&mut self) -> Result<i32, String> {
        let v = self.read_mem(self.esp)?;
        self.esp = self.esp.wrapping_add(4);
        Ok(v)
    }

    fn store(&mut self, disp: i32, v: i32) -> Result<(), String> {
        let addr = self.ebp.wrapping_add_signed(disp);
        self.write_mem(addr, v)
    }

    fn load(&mut self, disp: i32) -> Result<i32, String> {
        let addr = self.ebp.wrapping_add_signed(disp);
        self.read_mem(addr)
    }

    fn write_mem(&mut self, addr: u32, v: i32) -> Result<(), String> {
        let a = addr as usize;
        if a + 4 > self.mem.len() {
            return Err(format!("store out of bounds at {:#x}", addr));
        }
        self.mem[a..a + 4].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn read_mem(&mut self, addr: u32) -> Result<i32, String> {
        let a = addr as usize;
        if a + 4 > self.mem.len() {
            return Err(format!("load out of bounds at {:#x}", addr));
        }
        Ok(i32::from_le_bytes([
            self.mem[a],
            self.mem[a + 1],
            self.mem[a + 2],
            self.mem[a + 3],
        ]))
    }
}

fn execute(src: &str) -> Machine {
    let artifact = compile_source(src).expect("compile");
    let mut m = Machine::new(artifact.code);
    m.run().expect("execute");
    m
}

#[test]
fn straight_line_arithmetic() {
    let m = execute("int4 x; x <- 3; int4 y; y <- 4; x <- x + y;");
    assert_eq!(m.slot(0), 7);
    assert_eq!(m.slot(1), 4);
}

#[test]
fn printed_sum_ends_in_the_accumulator() {
    // The print argument is the last value computed into eax.
    let m = execute("int4 x; x <- 3; int4 y; y <- 4; print(x + y);");
    assert_eq!(m.eax, 7);
    assert_eq!(m.slot(0), 3);
    assert_eq!(m.slot(1), 4);
}

#[test]
fn loop_counts_down_to_zero() {
    let m = execute("int4 i; i <- 5; while (i > 0) { i <- i - 1; }");
    assert_eq!(m.slot(0), 0);
}

#[test]
fn else_branch_is_taken() {
    let m = execute("int4 x; if (1 = 2) { x <- 1; } else { x <- 2; }");
    assert_eq!(m.slot(0), 2);
}

#[test]
fn signed_division_and_modulo() {
    let m = execute("int4 q; int4 r; int4 n; q <- -7 / 2; r <- 17 mod 5; n <- -(3 * 4);");
    assert_eq!(m.slot(0), -3);
    assert_eq!(m.slot(1), 2);
    assert_eq!(m.slot(2), -12);
}

#[test]
fn or_skips_its_right_operand() {
    // The division by zero would fault the machine if it were reached.
    let m = execute("int4 x; x <- 1; if ((x = 1) | (x / 0 = 1)) { x <- 5; }");
    assert_eq!(m.slot(0), 5);
}

#[test]
fn and_skips_its_right_operand() {
    let m = execute("int4 x; x <- 1; if ((x = 2) & (x / 0 = 1)) { x <- 5; } else { x <- 9; }");
    assert_eq!(m.slot(0), 9);
}

#[test]
fn division_by_zero_faults() {
    let artifact = compile_source("int4 x; x <- 1 / 0;").expect("compile");
    let mut m = Machine::new(artifact.code);
    let err = m.run().expect_err("must fault");
    assert_eq!(err, "divide error");
}

#[test]
fn generated_code_agrees_with_the_evaluator() {
    // Each program leaves its result in slot 0 and prints the same variable.
    let programs = [
        "int4 a; a <- 6 * 7; print(a);",
        "int4 a; int4 b; b <- 9; a <- b - 12; print(a);",
        "int4 a; a <- 0; while (a < 10) { a <- a + 3; } print(a);",
        "int4 a; if (2 >= 2) { a <- 1; } else { a <- -1; } print(a);",
        "int4 a; a <- 100 mod 7 + 2 * -3; print(a);",
    ];
    for src in programs {
        let parsed = parse_source(src).expect("parse");
        let mut out = Vec::new();
        run_program(&parsed.stmts, Cursor::new(&b""[..]), &mut out).expect("evaluate");
        let printed: i32 = String::from_utf8(out)
            .expect("utf8")
            .trim()
            .parse()
            .expect("integer output");

        let m = execute(src);
        assert_eq!(m.slot(0), printed, "program: {}", src);
    }
}
