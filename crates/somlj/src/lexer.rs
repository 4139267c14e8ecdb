//! The token source: a byte stream in, a positioned token stream out.
//!
//! Tokens come out strictly ordered by increasing byte offset; the stream
//! ends with [`TokenKind::Eof`] and every peek past the end keeps returning
//! it. A small ring buffer supports look-ahead of at least two tokens
//! without consuming.

use std::collections::VecDeque;

use crate::ast::{Loc, SourceId};

/// The closed token set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum TokenKind {
    Invalid,
    Error,
    Eof,
    Colon,
    Hat,
    /// `#` opening an array literal; plain symbols come out as [`TokenKind::Symbol`].
    Hash,
    Assign,
    Tilde,
    At,
    Percent,
    Amp,
    Star,
    Minus,
    Plus,
    Eq,
    Bar,
    Backslash,
    Lt,
    Gt,
    Comma,
    Qmark,
    Slash,
    Dot,
    Semi,
    Lpar,
    Rpar,
    Lbrack,
    Rbrack,
    Str,
    Char,
    Ident,
    Integer,
    Real,
    Comment,
    Symbol,
    BinSelector,
    /// A run of four or more `-`, splitting instance and class sides.
    Separator,
    /// An identifier immediately followed by `:`; the value includes the colon.
    Keyword,
}

impl TokenKind {
    /// True for the single-character binary-operator tokens.
    #[must_use]
    pub fn is_binary_char(self) -> bool {
        matches!(
            self,
            Self::Minus
                | Self::Amp
                | Self::Star
                | Self::Plus
                | Self::Comma
                | Self::Slash
                | Self::Lt
                | Self::Gt
                | Self::Eq
                | Self::Qmark
                | Self::At
                | Self::Backslash
                | Self::Tilde
                | Self::Bar
                | Self::Percent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub val: String,
    pub loc: Loc,
}

impl Token {
    /// Neither end-of-stream nor a placeholder; error tokens are not valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self.kind, TokenKind::Invalid | TokenKind::Eof | TokenKind::Error)
    }
}

/// True for the characters that form binary selectors.
#[must_use]
pub fn is_binary_char(ch: u8) -> bool {
    matches!(
        ch,
        b'-' | b'!'
            | b'&'
            | b'*'
            | b'+'
            | b','
            | b'/'
            | b'<'
            | b'>'
            | b'='
            | b'?'
            | b'@'
            | b'\\'
            | b'~'
            | b'|'
            | b'%'
    )
}

pub struct Lexer<'a> {
    src: &'a [u8],
    source: SourceId,
    /// Index of the next byte to read.
    pos: usize,
    /// Index of the most recently read byte.
    cur_pos: usize,
    line: u32,
    col: u16,
    start_pos: usize,
    start_line: u32,
    start_col: u16,
    buffer: VecDeque<Token>,
    eat_comments: bool,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str, source: SourceId) -> Self {
        Self {
            src: src.as_bytes(),
            source,
            pos: 0,
            cur_pos: 0,
            line: 0,
            col: 0,
            start_pos: 0,
            start_line: 1,
            start_col: 0,
            buffer: VecDeque::new(),
            eat_comments: true,
        }
    }

    pub fn set_eat_comments(&mut self, on: bool) {
        self.eat_comments = on;
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Token {
        if let Some(t) = self.buffer.pop_front() {
            return t;
        }
        self.next_filtered()
    }

    /// Look-ahead without consuming; `la` is 1-based.
    pub fn peek(&mut self, la: usize) -> Token {
        debug_assert!(la > 0);
        while self.buffer.len() < la {
            let t = self.next_filtered();
            self.buffer.push_back(t);
        }
        self.buffer[la - 1].clone()
    }

    /// Lexes everything, stopping at the first non-valid token.
    pub fn tokens(src: &str) -> Vec<Token> {
        let mut lex = Lexer::new(src, SourceId::default());
        let mut res = Vec::new();
        let mut t = lex.next_token();
        while t.is_valid() {
            res.push(t);
            t = lex.next_token();
        }
        res
    }

    fn next_filtered(&mut self) -> Token {
        let mut t = self.next_imp();
        while self.eat_comments && t.kind == TokenKind::Comment {
            t = self.next_imp();
        }
        t
    }

    fn next_imp(&mut self) -> Token {
        self.skip_white();
        if self.pos >= self.src.len() {
            self.begin_at_cursor();
            return self.commit(TokenKind::Eof, String::new());
        }

        let ch = self.get();
        self.begin();

        match ch {
            // a couple of trailing \0 bytes are tolerated like end of file
            0 => self.commit(TokenKind::Eof, String::new()),
            b'\'' => self.string(),
            b'"' => self.comment(),
            b':' => {
                if self.peek_char(1) == b'=' {
                    self.get();
                    self.commit(TokenKind::Assign, ":=".to_owned())
                } else {
                    self.commit(TokenKind::Colon, ":".to_owned())
                }
            }
            b';' => self.commit(TokenKind::Semi, ";".to_owned()),
            b'#' => self.symbol(),
            b'^' => self.commit(TokenKind::Hat, "^".to_owned()),
            b'.' => self.commit(TokenKind::Dot, ".".to_owned()),
            b'(' => self.commit(TokenKind::Lpar, "(".to_owned()),
            b')' => self.commit(TokenKind::Rpar, ")".to_owned()),
            b'[' => self.commit(TokenKind::Lbrack, "[".to_owned()),
            b']' => self.commit(TokenKind::Rbrack, "]".to_owned()),
            b'$' => {
                let c = self.get();
                self.commit(TokenKind::Char, (c as char).to_string())
            }
            b'_' => self.ident(ch),
            _ if is_binary_char(ch) => self.selector(ch),
            _ if ch.is_ascii_alphabetic() => self.ident(ch),
            _ if ch.is_ascii_digit() => self.number(ch),
            _ => self.commit(TokenKind::Error, "unexpected character".to_owned()),
        }
    }

    /// Reads one byte; 0 at end of input. Advances line/column accounting.
    fn get(&mut self) -> u8 {
        self.cur_pos = self.pos;
        let Some(&ch) = self.src.get(self.pos) else {
            return 0;
        };
        self.pos += 1;
        self.col += 1;
        if ch == b'\r' || ch == b'\n' || ch == 0x0c {
            self.line += 1;
            self.col = 0;
        }
        ch
    }

    /// 1-based look-ahead into the raw bytes; 0 past the end.
    fn peek_char(&self, n: usize) -> u8 {
        debug_assert!(n >= 1);
        self.src.get(self.pos + n - 1).copied().unwrap_or(0)
    }

    fn skip_white(&mut self) {
        while self.peek_char(1).is_ascii_whitespace() {
            self.get();
        }
    }

    /// Marks the most recently read byte as the token start.
    fn begin(&mut self) {
        self.start_pos = self.cur_pos;
        self.start_line = self.line + 1;
        self.start_col = self.col;
    }

    /// Marks the read cursor itself as the start (used for eof).
    fn begin_at_cursor(&mut self) {
        self.start_pos = self.pos;
        self.start_line = self.line + 1;
        self.start_col = self.col;
    }

    fn commit(&mut self, kind: TokenKind, val: String) -> Token {
        let len = self.pos.saturating_sub(self.start_pos);
        Token {
            kind,
            val,
            loc: Loc {
                pos: u32::try_from(self.start_pos).unwrap_or(u32::MAX),
                line: self.start_line,
                col: self.start_col,
                len: u16::try_from(len).unwrap_or(u16::MAX),
                source: self.source,
            },
        }
    }

    /// Reads the remainder of a `'…'` string; the opening quote is consumed.
    /// A backslash escapes the following byte; escapes are preserved
    /// literally in the token value.
    fn read_string(&mut self) -> (String, bool) {
        let mut out = Vec::new();
        let mut escape = false;
        let mut ch = self.get();
        while ch != 0 {
            if escape {
                escape = false;
            } else if ch == b'\\' {
                escape = true;
            } else if ch == b'\'' {
                return (String::from_utf8_lossy(&out).into_owned(), true);
            }
            out.push(ch);
            ch = self.get();
        }
        (String::from_utf8_lossy(&out).into_owned(), false)
    }

    fn string(&mut self) -> Token {
        let (val, terminated) = self.read_string();
        if terminated {
            self.commit(TokenKind::Str, val)
        } else {
            self.commit(TokenKind::Error, "non-terminated string".to_owned())
        }
    }

    fn comment(&mut self) -> Token {
        let mut out = Vec::new();
        let mut ch = self.get();
        while ch != 0 {
            if ch == b'"' {
                return self.commit(TokenKind::Comment, String::from_utf8_lossy(&out).into_owned());
            }
            out.push(ch);
            ch = self.get();
        }
        self.commit(TokenKind::Error, "non-terminated comment".to_owned())
    }

    fn symbol(&mut self) -> Token {
        let ch = self.peek_char(1);
        if ch == b'(' {
            // `#(` opens an array literal; the paren stays in the stream
            return self.commit(TokenKind::Hash, "#".to_owned());
        }
        if is_binary_char(ch) {
            let mut s = String::new();
            s.push(self.get() as char);
            while is_binary_char(self.peek_char(1)) {
                s.push(self.get() as char);
            }
            return self.commit(TokenKind::Symbol, s);
        }
        if ch.is_ascii_alphabetic() {
            let mut s = String::new();
            s.push(self.get() as char);
            loop {
                let c = self.peek_char(1);
                if !c.is_ascii_alphanumeric() && c != b'_' && c != b':' {
                    break;
                }
                s.push(self.get() as char);
            }
            if s.contains(':') && !s.ends_with(':') {
                return self.commit(TokenKind::Error, "invalid symbol".to_owned());
            }
            return self.commit(TokenKind::Symbol, s);
        }
        if ch == b'\'' {
            self.get();
            let (val, terminated) = self.read_string();
            if terminated {
                return self.commit(TokenKind::Symbol, val);
            }
        }
        self.commit(TokenKind::Error, "invalid symbol".to_owned())
    }

    fn ident(&mut self, first: u8) -> Token {
        let mut s = String::new();
        s.push(first as char);
        loop {
            let c = self.peek_char(1);
            if !c.is_ascii_alphanumeric() && c != b'_' {
                break;
            }
            s.push(self.get() as char);
        }
        // `a:` is a keyword token, but `a := 1` keeps the plain identifier
        if self.peek_char(1) == b':' && self.peek_char(2) != b'=' {
            self.get();
            s.push(':');
            return self.commit(TokenKind::Keyword, s);
        }
        self.commit(TokenKind::Ident, s)
    }

    fn selector(&mut self, first: u8) -> Token {
        let mut s = String::new();
        s.push(first as char);
        while is_binary_char(self.peek_char(1)) {
            s.push(self.get() as char);
        }
        if s.len() > 1 {
            if s.len() >= 4 && s.bytes().all(|c| c == b'-') {
                return self.commit(TokenKind::Separator, s);
            }
            return self.commit(TokenKind::BinSelector, s);
        }
        let kind = match first {
            b'-' => TokenKind::Minus,
            b'&' => TokenKind::Amp,
            b'*' => TokenKind::Star,
            b'+' => TokenKind::Plus,
            b',' => TokenKind::Comma,
            b'/' => TokenKind::Slash,
            b'<' => TokenKind::Lt,
            b'>' => TokenKind::Gt,
            b'=' => TokenKind::Eq,
            b'?' => TokenKind::Qmark,
            b'@' => TokenKind::At,
            b'\\' => TokenKind::Backslash,
            b'~' => TokenKind::Tilde,
            b'|' => TokenKind::Bar,
            b'%' => TokenKind::Percent,
            // `!` only occurs inside longer binary selectors
            _ => return self.commit(TokenKind::Error, "unexpected character".to_owned()),
        };
        self.commit(kind, s)
    }

    fn number(&mut self, first: u8) -> Token {
        let mut s = String::new();
        s.push(first as char);
        while self.peek_char(1).is_ascii_digit() {
            s.push(self.get() as char);
        }

        let mut radix: u32 = 10;
        if self.peek_char(1) == b'r' {
            radix = match s.parse::<u32>() {
                Ok(r @ (2 | 8 | 10 | 16)) => r,
                _ => return self.commit(TokenKind::Error, "invalid number format".to_owned()),
            };
            s.push(self.get() as char);
            let mut ch = self.peek_char(1);
            if ch == b'-' {
                s.push(self.get() as char);
                ch = self.peek_char(1);
            }
            if !check_digit(radix, ch) {
                return self.commit(TokenKind::Error, "invalid number format".to_owned());
            }
            while check_digit(radix, self.peek_char(1)) {
                s.push(self.get() as char);
            }
        }

        let mut real = false;
        // a `.` is only fractional when a digit follows; otherwise it
        // terminates the statement and stays in the stream
        if self.peek_char(1) == b'.' && check_digit(radix, self.peek_char(2)) {
            real = true;
            s.push(self.get() as char);
            while check_digit(radix, self.peek_char(1)) {
                s.push(self.get() as char);
            }
        }

        if self.peek_char(1) == b'e' {
            real = true;
            s.push(self.get() as char);
            let mut ch = self.peek_char(1);
            if ch == b'-' {
                s.push(self.get() as char);
                ch = self.peek_char(1);
            }
            if !ch.is_ascii_digit() {
                return self.commit(TokenKind::Error, "invalid number format".to_owned());
            }
            while self.peek_char(1).is_ascii_digit() {
                s.push(self.get() as char);
            }
        }

        let kind = if real { TokenKind::Real } else { TokenKind::Integer };
        self.commit(kind, s)
    }
}

fn check_digit(radix: u32, ch: u8) -> bool {
    match ch {
        b'0'..=b'9' => u32::from(ch - b'0') < radix,
        b'A'..=b'F' => radix == 16,
        _ => false,
    }
}
