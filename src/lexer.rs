use log::debug;
use thiserror::Error;

use crate::ast::{Span, Token};
use crate::LexedProgram;

/// A malformed piece of source text. Scanning continues past these so one
/// bad character does not hide the rest of the report.
#[derive(Debug, Error)]
pub enum LexError {
    /// (line, ch)
    #[error("[line {0}] lex error: unrecognized character '{1}'")]
    UnrecognizedChar(usize, char),
    /// (line)
    #[error("[line {0}] lex error: unterminated string")]
    UnterminatedString(usize),
    /// (line, text)
    #[error("[line {0}] lex error: cannot parse as number '{1}'")]
    BadNumber(usize, String),
}

pub struct Lexer {
    src: Vec<char>,
    idx: usize,
    line: usize,
    errors: Vec<LexError>,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Self {
            src: src.chars().collect(),
            idx: 0,
            line: 1,
            errors: Vec::new(),
        }
    }

    pub fn scan(mut self) -> LexedProgram {
        let mut spans: Vec<Span> = Vec::new();

        while !self.is_at_end() {
            let line = self.line;
            if let Some(token) = self.scan_token() {
                spans.push(Span::new(token, line));
            }
        }

        spans.push(Span::new(Token::Eof, self.line));
        debug!("scanned {} tokens, {} errors", spans.len(), self.errors.len());
        LexedProgram {
            spans,
            errors: self.errors,
        }
    }

    fn scan_token(&mut self) -> Option<Token> {
        let curr = self.advance();
        let token = match curr {
            '(' => Token::Lparen,
            ')' => Token::Rparen,
            '{' => Token::Lbrace,
            '}' => Token::Rbrace,
            ',' => Token::Comma,
            ';' => Token::Semi,
            '.' => Token::Dot,

            ' ' | '\t' | '\r' => return None,
            '\n' => {
                if !self.is_at_end() {
                    self.advance_line();
                }
                return None;
            }

            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,

            '/' => {
                if self.matches('/') {
                    self.finish_line_comment();
                    return None;
                } else {
                    Token::Slash
                }
            }

            '!' => {
                if self.matches('=') {
                    Token::BangEq
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.matches('=') {
                    Token::EqEq
                } else {
                    Token::Eq
                }
            }
            '<' => {
                if self.matches('=') {
                    Token::LtEq
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.matches('=') {
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }

            'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier(),
            '0'..='9' => return self.scan_number(),
            '"' => return self.scan_string(),

            _ => {
                self.errors.push(LexError::UnrecognizedChar(self.line, curr));
                return None;
            }
        };
        Some(token)
    }

    fn is_at_end(&self) -> bool {
        self.idx >= self.src.len()
    }

    fn has_lookahead(&self) -> bool {
        self.idx + 1 < self.src.len()
    }

    fn advance(&mut self) -> char {
        let curr = self.src[self.idx];
        self.idx += 1;
        curr
    }

    fn advance_line(&mut self) {
        self.line += 1;
    }

    fn consume(&mut self) {
        self.idx += 1;
    }

    fn peek(&self) -> char {
        self.src[self.idx]
    }

    fn peek_next(&self) -> char {
        self.src[self.idx + 1]
    }

    fn matches(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.consume();
            true
        } else {
            false
        }
    }

    fn finish_line_comment(&mut self) {
        while !self.is_at_end() {
            let next = self.advance();
            if next == '\n' {
                self.advance_line();
                return;
            }
        }
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.idx - 1;
        while !self.is_at_end() && is_alphanumeric(self.peek()) {
            self.consume();
        }
        let name = self.src[start..self.idx].iter().collect::<String>();
        Token::get_keyword(&name).unwrap_or(Token::Ident(name))
    }

    fn scan_number(&mut self) -> Option<Token> {
        let start = self.idx - 1;

        while !self.is_at_end() && is_digit(self.peek()) {
            self.consume();
        }

        if self.has_lookahead() && self.peek() == '.' && is_digit(self.peek_next()) {
            self.consume();
            while !self.is_at_end() && is_digit(self.peek()) {
                self.consume();
            }
        }

        let rep = self.src[start..self.idx].iter().collect::<String>();
        match rep.parse::<f64>() {
            Ok(num) => Some(Token::Num(num)),
            Err(_) => {
                self.errors.push(LexError::BadNumber(self.line, rep));
                None
            }
        }
    }

    fn scan_string(&mut self) -> Option<Token> {
        let start = self.idx;
        let open_line = self.line;
        while !self.is_at_end() && self.peek() != '"' {
            let next = self.advance();
            if next == '\n' && !self.is_at_end() {
                self.advance_line();
            }
        }

        let end = self.idx;
        if self.is_at_end() {
            self.errors.push(LexError::UnterminatedString(open_line));
            return None;
        }
        self.consume();

        let inner = self.src[start..end].iter().collect::<String>();
        Some(Token::Str(inner))
    }
}

fn is_alphanumeric(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}
