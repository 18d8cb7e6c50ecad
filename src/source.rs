//! Byte-addressable source reader.
//!
//! Owns the raw bytes of one compilation unit and tracks a 1-based
//! line/column cursor. The lexer drives it through `peek`/`bump`/`retreat`;
//! diagnostics fetch whole lines through `line_text`.

/// Reader over the raw bytes of one source unit.
#[derive(Debug, Clone)]
pub struct SourceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> SourceReader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Current byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume the current byte and advance the line/column cursor.
    pub fn bump(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    /// Step back one byte, restoring the cursor. No-op at offset zero.
    pub fn retreat(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.pos -= 1;
        let b = self.bytes[self.pos];
        if b == b'\n' {
            self.line -= 1;
            // Recount the column of the line we stepped back onto.
            let start = self.bytes[..self.pos]
                .iter()
                .rposition(|&c| c == b'\n')
                .map(|i| i + 1)
                .unwrap_or(0);
            self.col = (self.pos - start) as u32 + 1;
        } else {
            self.col -= 1;
        }
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// 1-based line of the current cursor position.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column of the current cursor position.
    pub fn col(&self) -> u32 {
        self.col
    }

    /// Full text of line `line_no` (1-based), without its trailing newline.
    pub fn line_text(&self, line_no: u32) -> Option<&'a str> {
        line_text(self.bytes, line_no)
    }
}

/// Fetch line `line_no` (1-based) out of raw source bytes.
pub fn line_text(bytes: &[u8], line_no: u32) -> Option<&str> {
    if line_no == 0 {
        return None;
    }
    let mut current = 1u32;
    let mut start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        if current == line_no {
            start = i;
            break;
        }
        if b == b'\n' {
            current += 1;
            start = i + 1;
        }
    }
    if current != line_no || start > bytes.len() {
        return None;
    }
    let end = bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| start + i)
        .unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[start..end]).ok()
}
