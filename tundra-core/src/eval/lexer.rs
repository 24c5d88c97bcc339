//! Tokenizer for cell source.
//!
//! Produces a flat token list terminated by [`Tok::Eof`]. Every token carries
//! the byte offset where it starts so syntax errors can point into the cell.
//! Template strings are split into literal text and embedded source pieces
//! here; the parser tokenizes the embedded pieces again at their own offsets.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::CellError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePiece>),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Eof,
}

/// A piece of a template string: literal text or an embedded `${...}`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePiece {
    Text(String),
    Code { source: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: Tok,
    pub offset: usize,
}

/// Tokenize `source`, reporting offsets relative to `base`.
pub(crate) fn tokenize(source: &str, base: usize) -> Result<Vec<Token>, CellError> {
    Lexer {
        source,
        base,
        chars: source.char_indices().peekable(),
    }
    .run()
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

pub(crate) fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Lexer<'a> {
    source: &'a str,
    base: usize,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, CellError> {
        let mut tokens = Vec::new();

        while let Some(&(offset, c)) = self.chars.peek() {
            let kind = match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                '/' if self.peek_second() == Some('/') => {
                    self.skip_line_comment();
                    continue;
                }
                '/' if self.peek_second() == Some('*') => {
                    self.skip_block_comment(offset)?;
                    continue;
                }
                '0'..='9' => self.number(offset)?,
                '"' | '\'' => self.string(c, offset)?,
                '`' => self.template(offset)?,
                c if is_ident_start(c) => self.ident(),
                _ => self.punct(c, offset)?,
            };
            tokens.push(Token {
                kind,
                offset: self.base + offset,
            });
        }

        tokens.push(Token {
            kind: Tok::Eof,
            offset: self.base + self.source.len(),
        });
        Ok(tokens)
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> CellError {
        CellError::Syntax {
            message: message.into(),
            offset: self.base + offset,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.peek().map(|&(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.source.len())
    }

    fn skip_line_comment(&mut self) {
        while let Some((_, c)) = self.chars.next() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self, start: usize) -> Result<(), CellError> {
        self.chars.next();
        self.chars.next();
        let mut previous = '\0';
        for (_, c) in self.chars.by_ref() {
            if previous == '*' && c == '/' {
                return Ok(());
            }
            previous = c;
        }
        Err(self.error("unterminated comment", start))
    }

    fn number(&mut self, start: usize) -> Result<Tok, CellError> {
        self.digits();
        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.chars.next();
            self.digits();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mut ahead = self.chars.clone();
            ahead.next();
            if matches!(ahead.peek(), Some(&(_, '+' | '-'))) {
                ahead.next();
            }
            if ahead.peek().is_some_and(|&(_, c)| c.is_ascii_digit()) {
                self.chars = ahead;
                self.digits();
            }
        }

        let end = self.position();
        let text = &self.source[start..end];
        text.parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| self.error(format!("invalid number `{text}`"), start))
    }

    fn digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.chars.next();
        }
    }

    fn escape(&mut self, start: usize) -> Result<char, CellError> {
        match self.chars.next() {
            Some((_, 'n')) => Ok('\n'),
            Some((_, 't')) => Ok('\t'),
            Some((_, 'r')) => Ok('\r'),
            Some((_, '0')) => Ok('\0'),
            Some((_, c)) => Ok(c),
            None => Err(self.error("unterminated string literal", start)),
        }
    }

    fn string(&mut self, quote: char, start: usize) -> Result<Tok, CellError> {
        self.chars.next();
        let mut text = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => text.push(self.escape(start)?),
                Some((_, c)) if c == quote => return Ok(Tok::Str(text)),
                Some((_, '\n')) | None => {
                    return Err(self.error("unterminated string literal", start))
                }
                Some((_, c)) => text.push(c),
            }
        }
    }

    fn template(&mut self, start: usize) -> Result<Tok, CellError> {
        self.chars.next();
        let mut pieces = Vec::new();
        let mut text = String::new();

        loop {
            match self.chars.next() {
                Some((_, '`')) => break,
                Some((_, '\\')) => text.push(self.escape(start)?),
                Some((_, '$')) if self.peek_char() == Some('{') => {
                    self.chars.next();
                    if !text.is_empty() {
                        pieces.push(TemplatePiece::Text(std::mem::take(&mut text)));
                    }
                    let offset = self.base + self.position();
                    let source = self.embedded(start)?;
                    pieces.push(TemplatePiece::Code { source, offset });
                }
                Some((_, c)) => text.push(c),
                None => return Err(self.error("unterminated template literal", start)),
            }
        }

        if !text.is_empty() {
            pieces.push(TemplatePiece::Text(text));
        }
        Ok(Tok::Template(pieces))
    }

    /// Collect the source of a `${...}` up to its matching brace.
    fn embedded(&mut self, start: usize) -> Result<String, CellError> {
        let mut source = String::new();
        let mut depth = 1usize;

        while let Some((_, c)) = self.chars.next() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(source);
                    }
                }
                '"' | '\'' => {
                    source.push(c);
                    while let Some((_, inner)) = self.chars.next() {
                        source.push(inner);
                        if inner == '\\' {
                            if let Some((_, escaped)) = self.chars.next() {
                                source.push(escaped);
                            }
                        } else if inner == c {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            source.push(c);
        }

        Err(self.error("unterminated template substitution", start))
    }

    fn ident(&mut self) -> Tok {
        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if !is_ident_continue(c) {
                break;
            }
            name.push(c);
            self.chars.next();
        }
        Tok::Ident(name)
    }

    fn punct(&mut self, c: char, offset: usize) -> Result<Tok, CellError> {
        self.chars.next();
        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            ':' => Tok::Colon,
            ';' => Tok::Semicolon,
            '?' => Tok::Question,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' => {
                if self.eat('=') {
                    self.eat('=');
                    Tok::EqEq
                } else if self.eat('>') {
                    Tok::Arrow
                } else {
                    Tok::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    Tok::NotEq
                } else {
                    Tok::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    Tok::LtEq
                } else {
                    Tok::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Tok::GtEq
                } else {
                    Tok::Gt
                }
            }
            '&' if self.eat('&') => Tok::AndAnd,
            '|' if self.eat('|') => Tok::OrOr,
            other => return Err(self.error(format!("unexpected character `{other}`"), offset)),
        };
        Ok(tok)
    }
}
