//! Lexer for the ncc mini-language.
//!
//! `next_token` consumes whitespace and `#`-to-end-of-line comments, then
//! classifies exactly one token. Multi-character operators (`<=`, `>=`, `<-`,
//! `!=`, `~=`) are matched with one byte of lookahead. A `-` is always its own
//! token, even before a digit; negative literals are the parser's business.

use crate::source::SourceReader;
use crate::{CompileError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Plus,
    Minus,
    Star,
    Slash,
    Mod,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equal,
    NotEqual,
    Assign,
    Not,
    And,
    Or,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Ident,
    IntLiteral,
    StrLiteral,
    True,
    False,
    If,
    Else,
    While,
    Print,
    Read,
    Int4,
    Eof,
}

impl TokenKind {
    /// Human-readable name used in "expected X" diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Mod => "'mod'",
            TokenKind::Less => "'<'",
            TokenKind::LessEq => "'<='",
            TokenKind::Greater => "'>'",
            TokenKind::GreaterEq => "'>='",
            TokenKind::Equal => "'='",
            TokenKind::NotEqual => "'!='",
            TokenKind::Assign => "'<-'",
            TokenKind::Not => "'!'",
            TokenKind::And => "'&'",
            TokenKind::Or => "'|'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Ident => "identifier",
            TokenKind::IntLiteral => "integer literal",
            TokenKind::StrLiteral => "string literal",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::Print => "'print'",
            TokenKind::Read => "'read'",
            TokenKind::Int4 => "'int4'",
            TokenKind::Eof => "end of file",
        }
    }
}

/// One classified token. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub col: u32,
}

pub struct Lexer<'a> {
    src: SourceReader<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: SourceReader::new(source),
        }
    }

    /// Lex the whole unit. The returned stream always ends with one Eof token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut out = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t.kind == TokenKind::Eof;
            out.push(t);
            if done {
                return Ok(out);
            }
        }
    }

    /// Classify exactly one token, advancing past it.
    pub fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_trivia();

        let line = self.src.line();
        let col = self.src.col();
        let tok = |kind: TokenKind, text: &str| Token {
            kind,
            text: text.to_string(),
            line,
            col,
        };

        let Some(c) = self.src.bump() else {
            return Ok(tok(TokenKind::Eof, ""));
        };

        match c {
            b'+' => Ok(tok(TokenKind::Plus, "+")),
            b'-' => Ok(tok(TokenKind::Minus, "-")),
            b'*' => Ok(tok(TokenKind::Star, "*")),
            b'/' => Ok(tok(TokenKind::Slash, "/")),
            b'(' => Ok(tok(TokenKind::LParen, "(")),
            b')' => Ok(tok(TokenKind::RParen, ")")),
            b'{' => Ok(tok(TokenKind::LBrace, "{")),
            b'}' => Ok(tok(TokenKind::RBrace, "}")),
            b',' => Ok(tok(TokenKind::Comma, ",")),
            b';' => Ok(tok(TokenKind::Semicolon, ";")),
            b'&' => Ok(tok(TokenKind::And, "&")),
            b'|' => Ok(tok(TokenKind::Or, "|")),
            b'=' => Ok(tok(TokenKind::Equal, "=")),
            b'<' => {
                if self.eat(b'=') {
                    Ok(tok(TokenKind::LessEq, "<="))
                } else if self.eat(b'-') {
                    Ok(tok(TokenKind::Assign, "<-"))
                } else {
                    Ok(tok(TokenKind::Less, "<"))
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Ok(tok(TokenKind::GreaterEq, ">="))
                } else {
                    Ok(tok(TokenKind::Greater, ">"))
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    Ok(tok(TokenKind::NotEqual, "!="))
                } else {
                    Ok(tok(TokenKind::Not, "!"))
                }
            }
            b'~' => {
                if self.eat(b'=') {
                    Ok(tok(TokenKind::NotEqual, "~="))
                } else {
                    Err(CompileError::new(
                        ErrorKind::Lex,
                        line,
                        col,
                        "expected '~=' after '~'",
                    ))
                }
            }
            b'"' => self.scan_string(line, col),
            d if d.is_ascii_digit() => {
                let mut text = String::new();
                text.push(d as char);
                while let Some(b) = self.src.bump() {
                    if b.is_ascii_digit() {
                        text.push(b as char);
                    } else {
                        self.src.retreat();
                        break;
                    }
                }
                Ok(tok(TokenKind::IntLiteral, &text))
            }
            a if a.is_ascii_alphabetic() || a == b'_' => {
                let mut text = String::new();
                text.push(a as char);
                while let Some(b) = self.src.bump() {
                    if b.is_ascii_alphanumeric() || b == b'_' {
                        text.push(b as char);
                    } else {
                        self.src.retreat();
                        break;
                    }
                }
                let kind = match text.as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "mod" => TokenKind::Mod,
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "while" => TokenKind::While,
                    "print" => TokenKind::Print,
                    "read" => TokenKind::Read,
                    "int4" => TokenKind::Int4,
                    _ => TokenKind::Ident,
                };
                Ok(tok(kind, &text))
            }
            other => Err(CompileError::new(
                ErrorKind::Lex,
                line,
                col,
                format!("unexpected character '{}'", other as char),
            )),
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.src.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.src.bump();
                }
                b'#' => {
                    // Comment runs to end of line.
                    while let Some(c) = self.src.bump() {
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.src.peek() == Some(expected) {
            self.src.bump();
            true
        } else {
            false
        }
    }

    fn scan_string(&mut self, line: u32, col: u32) -> Result<Token, CompileError> {
        // Bytes pass through untouched so multi-byte UTF-8 sequences survive;
        // the delimiters and escape introducer are all ASCII and cannot occur
        // inside a continuation byte.
        let mut bytes = Vec::new();
        loop {
            let Some(b) = self.src.bump() else {
                return Err(CompileError::new(
                    ErrorKind::Lex,
                    line,
                    col,
                    "unterminated string literal",
                ));
            };
            match b {
                b'"' => {
                    let text = String::from_utf8(bytes).map_err(|_| {
                        CompileError::new(
                            ErrorKind::Lex,
                            line,
                            col,
                            "string literal is not valid UTF-8",
                        )
                    })?;
                    return Ok(Token {
                        kind: TokenKind::StrLiteral,
                        text,
                        line,
                        col,
                    });
                }
                b'\\' => {
                    let Some(esc) = self.src.bump() else {
                        return Err(CompileError::new(
                            ErrorKind::Lex,
                            line,
                            col,
                            "escape sequence at end of file in string literal",
                        ));
                    };
                    match esc {
                        b'n' => bytes.push(b'\n'),
                        b't' => bytes.push(b'\t'),
                        b'\\' => bytes.push(b'\\'),
                        b'"' => bytes.push(b'"'),
                        other => {
                            return Err(CompileError::new(
                                ErrorKind::Lex,
                                line,
                                col,
                                format!(
                                    "unknown escape sequence '\\{}' in string literal",
                                    other as char
                                ),
                            ));
                        }
                    }
                }
                b'\n' => {
                    return Err(CompileError::new(
                        ErrorKind::Lex,
                        line,
                        col,
                        "unterminated string literal",
                    ));
                }
                other => bytes.push(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .expect("lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn classifies_operators_and_keywords() {
        assert_eq!(
            kinds("int4 x; x <- 1 + 2 * 3;"),
            vec![
                TokenKind::Int4,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::IntLiteral,
                TokenKind::Plus,
                TokenKind::IntLiteral,
                TokenKind::Star,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators_need_one_lookahead() {
        assert_eq!(
            kinds("< <= > >= = != ~= <- ! & |"),
            vec![
                TokenKind::Less,
                TokenKind::LessEq,
                TokenKind::Greater,
                TokenKind::GreaterEq,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::NotEqual,
                TokenKind::Assign,
                TokenKind::Not,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn minus_before_digit_stays_separate() {
        assert_eq!(
            kinds("-5"),
            vec![TokenKind::Minus, TokenKind::IntLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn comments_skip_to_end_of_line() {
        assert_eq!(
            kinds("1 # the rest is ignored ; while\n2"),
            vec![TokenKind::IntLiteral, TokenKind::IntLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn tracks_positions() {
        let toks = Lexer::new("int4 x;\nx <- 3;").tokenize().expect("lex");
        assert_eq!((toks[0].line, toks[0].col), (1, 1));
        assert_eq!((toks[1].line, toks[1].col), (1, 6));
        assert_eq!((toks[3].line, toks[3].col), (2, 1));
        assert_eq!((toks[4].line, toks[4].col), (2, 3));
    }

    #[test]
    fn string_escapes() {
        let toks = Lexer::new(r#""a\tb\nc\\d\"e""#).tokenize().expect("lex");
        assert_eq!(toks[0].kind, TokenKind::StrLiteral);
        assert_eq!(toks[0].text, "a\tb\nc\\d\"e");
    }

    #[test]
    fn non_ascii_string_literal_round_trips() {
        let toks = Lexer::new("\"héllo — ∑\"").tokenize().expect("lex");
        assert_eq!(toks[0].kind, TokenKind::StrLiteral);
        assert_eq!(toks[0].text, "héllo — ∑");
    }

    #[test]
    fn bad_escape_is_a_lex_error() {
        let err = Lexer::new(r#""a\qb""#).tokenize().expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::Lex);
        assert!(err.message.contains("\\q"));
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let err = Lexer::new("\"abc").tokenize().expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::Lex);
        assert_eq!((err.line, err.col), (1, 1));
    }

    #[test]
    fn invalid_character_reports_position() {
        let err = Lexer::new("int4 x;\n  $").tokenize().expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::Lex);
        assert_eq!((err.line, err.col), (2, 3));
    }

    #[test]
    fn underscore_starts_identifier() {
        let toks = Lexer::new("_tmp1").tokenize().expect("lex");
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(toks[0].text, "_tmp1");
    }

    #[test]
    fn lone_tilde_is_rejected() {
        let err = Lexer::new("a ~ b").tokenize().expect_err("must fail");
        assert_eq!((err.line, err.col), (1, 3));
    }
}
