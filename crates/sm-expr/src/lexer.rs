//! Lexer: tokenizes mapping expressions such as `y=x*(0.001)+(0)`.

use crate::error::{ExprError, ExprResult};

/// A token with the byte offset where it starts.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    NotEq,
    Amp,
    AmpAmp,
    Caret,
    Pipe,
    PipePipe,
    Bang,
    Question,
    /// `?:`, the "value or fallback" operator.
    QuestionColon,
    Colon,
    Assign,
    Comma,
    OpenParen,
    CloseParen,
    OpenSquare,
    CloseSquare,
    OpenCurly,
    CloseCurly,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Percent => write!(f, "%"),
            Self::Shl => write!(f, "<<"),
            Self::Shr => write!(f, ">>"),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Amp => write!(f, "&"),
            Self::AmpAmp => write!(f, "&&"),
            Self::Caret => write!(f, "^"),
            Self::Pipe => write!(f, "|"),
            Self::PipePipe => write!(f, "||"),
            Self::Bang => write!(f, "!"),
            Self::Question => write!(f, "?"),
            Self::QuestionColon => write!(f, "?:"),
            Self::Colon => write!(f, ":"),
            Self::Assign => write!(f, "="),
            Self::Comma => write!(f, ","),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::OpenSquare => write!(f, "["),
            Self::CloseSquare => write!(f, "]"),
            Self::OpenCurly => write!(f, "{{"),
            Self::CloseCurly => write!(f, "}}"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the entire input; the last token is always `Eof`.
    pub fn tokenize(&mut self) -> ExprResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.input.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos: self.pos,
                });
                return Ok(tokens);
            }
            tokens.push(self.next_token()?);
        }
    }

    fn next_token(&mut self) -> ExprResult<Token> {
        let start = self.pos;
        let ch = self.input[self.pos];

        if ch.is_ascii_digit() || (ch == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            return self.read_number();
        }
        if ch.is_ascii_alphabetic() || ch == b'_' {
            return Ok(self.read_identifier());
        }

        let next = self.peek_at(1);
        let (kind, width) = match (ch, next) {
            (b'<', Some(b'<')) => (TokenKind::Shl, 2),
            (b'>', Some(b'>')) => (TokenKind::Shr, 2),
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'&', Some(b'&')) => (TokenKind::AmpAmp, 2),
            (b'|', Some(b'|')) => (TokenKind::PipePipe, 2),
            (b'?', Some(b':')) => (TokenKind::QuestionColon, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'&', _) => (TokenKind::Amp, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'?', _) => (TokenKind::Question, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'(', _) => (TokenKind::OpenParen, 1),
            (b')', _) => (TokenKind::CloseParen, 1),
            (b'[', _) => (TokenKind::OpenSquare, 1),
            (b']', _) => (TokenKind::CloseSquare, 1),
            (b'{', _) => (TokenKind::OpenCurly, 1),
            (b'}', _) => (TokenKind::CloseCurly, 1),
            _ => {
                return Err(ExprError::Lex {
                    pos: start,
                    what: format!("unexpected character '{}'", ch as char),
                });
            }
        };
        self.pos += width;
        Ok(Token { kind, pos: start })
    }

    fn read_number(&mut self) -> ExprResult<Token> {
        let start = self.pos;
        let mut is_float = false;

        self.consume_digits();
        if self.peek_at(0) == Some(b'.') {
            is_float = true;
            self.pos += 1;
            self.consume_digits();
        }

        // Exponent only when digits follow; otherwise `e` starts an identifier.
        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            let digits_at = match self.peek_at(1) {
                Some(b'+' | b'-') => 2,
                _ => 1,
            };
            if self.peek_at(digits_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += digits_at;
                self.consume_digits();
            }
        }

        let text = std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| ExprError::Lex {
            pos: start,
            what: "invalid utf-8 in number".to_string(),
        })?;

        let kind = if is_float {
            let value: f64 = text.parse().map_err(|_| ExprError::Lex {
                pos: start,
                what: format!("malformed number '{text}'"),
            })?;
            TokenKind::Float(value)
        } else {
            let value: i64 = text.parse().map_err(|_| ExprError::Lex {
                pos: start,
                what: format!("integer literal '{text}' too large"),
            })?;
            TokenKind::Int(value)
        };
        Ok(Token { kind, pos: start })
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        Token {
            kind: TokenKind::Ident(text),
            pos: start,
        }
    }

    fn consume_digits(&mut self) {
        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_at(0).is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }
}
