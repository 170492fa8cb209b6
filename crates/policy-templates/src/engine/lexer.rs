//! Template lexer
//!
//! Splits template text into text runs and action tokens. Trim markers
//! (`{{- ` and ` -}}`) are applied here so the parser only sees the trimmed
//! text, and comments (`{{/* ... */}}`) never reach the parser.

use crate::config::Delimiters;
use crate::error::{TemplateError, TemplateResult};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TokenKind {
    Text(String),
    LeftDelim,
    RightDelim,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    /// `.`
    Dot,
    /// `.Name`
    Field(String),
    /// `$` or `$name`
    Variable(String),
    Ident(String),
    Pipe,
    LeftParen,
    RightParen,
    Comma,
    /// `:=`
    Declare,
    /// `=`
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    /// Whitespace separates this token from the previous one
    pub spaced: bool,
}

pub(super) fn tokenize(input: &str, delims: &Delimiters) -> TemplateResult<Vec<Token>> {
    Lexer {
        input,
        start: delims.start(),
        stop: delims.stop(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        trim_next_text: false,
    }
    .run()
}

struct Lexer<'a> {
    input: &'a str,
    start: &'a str,
    stop: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    trim_next_text: bool,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> TemplateResult<Vec<Token>> {
        while self.pos < self.input.len() {
            let rest = &self.input[self.pos..];
            let Some(offset) = rest.find(self.start) else {
                self.push_text(rest);
                self.advance(rest.len());
                break;
            };

            let mut text = &rest[..offset];
            let after_delim = &rest[offset + self.start.len()..];
            let trim_left = has_trim_marker(after_delim);
            if trim_left {
                text = text.trim_end();
            }
            self.push_text(text);
            self.advance(offset + self.start.len() + if trim_left { 1 } else { 0 });

            if self.comment_ahead() {
                self.lex_comment()?;
            } else {
                self.lex_action()?;
            }
        }
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn advance(&mut self, bytes: usize) {
        let consumed = &self.input[self.pos..self.pos + bytes];
        self.line += consumed.matches('\n').count();
        self.pos += bytes;
    }

    fn push(&mut self, kind: TokenKind, line: usize, spaced: bool) {
        self.tokens.push(Token { kind, line, spaced });
    }

    fn push_text(&mut self, text: &str) {
        let text = if std::mem::take(&mut self.trim_next_text) {
            text.trim_start()
        } else {
            text
        };
        if !text.is_empty() {
            let line = self.line;
            self.push(TokenKind::Text(text.to_string()), line, false);
        }
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::parse(self.line, message)
    }

    fn comment_ahead(&self) -> bool {
        self.rest().trim_start_matches([' ', '\t', '\r', '\n']).starts_with("/*")
    }

    fn lex_comment(&mut self) -> TemplateResult<()> {
        let skip = self.rest().len()
            - self
                .rest()
                .trim_start_matches([' ', '\t', '\r', '\n'])
                .len();
        self.advance(skip);
        let Some(end) = self.rest().find("*/") else {
            return Err(self.error("unclosed comment"));
        };
        self.advance(end + 2);

        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        let spaces = rest.len() - trimmed.len();
        if spaces > 0 && trimmed.starts_with('-') && trimmed[1..].starts_with(self.stop) {
            self.advance(spaces + 1 + self.stop.len());
            self.trim_next_text = true;
            Ok(())
        } else if rest.starts_with(self.stop) {
            self.advance(self.stop.len());
            Ok(())
        } else {
            Err(self.error("comment ends before closing delimiter"))
        }
    }

    fn lex_action(&mut self) -> TemplateResult<()> {
        let line = self.line;
        self.push(TokenKind::LeftDelim, line, false);

        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
            let spaces = rest.len() - trimmed.len();
            self.advance(spaces);
            let spaced = spaces > 0;

            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error("unclosed action"));
            }

            if spaced && rest.starts_with('-') && rest[1..].starts_with(self.stop) {
                let line = self.line;
                self.advance(1 + self.stop.len());
                self.push(TokenKind::RightDelim, line, spaced);
                self.trim_next_text = true;
                return Ok(());
            }
            if rest.starts_with(self.stop) {
                let line = self.line;
                self.advance(self.stop.len());
                self.push(TokenKind::RightDelim, line, spaced);
                return Ok(());
            }

            self.lex_token(spaced)?;
        }
    }

    fn lex_token(&mut self, spaced: bool) -> TemplateResult<()> {
        let rest = self.rest();
        let line = self.line;
        let mut chars = rest.chars();
        let Some(c) = chars.next() else {
            return Err(self.error("unclosed action"));
        };
        let next = chars.next();

        match c {
            '"' => {
                let (value, len) = self.quoted_string(rest)?;
                self.advance(len);
                self.push(TokenKind::String(value), line, spaced);
            }
            '`' => {
                let Some(end) = rest[1..].find('`') else {
                    return Err(self.error("unterminated raw quoted string"));
                };
                let value = rest[1..1 + end].to_string();
                self.advance(end + 2);
                self.push(TokenKind::String(value), line, spaced);
            }
            '|' => {
                self.advance(1);
                self.push(TokenKind::Pipe, line, spaced);
            }
            '(' => {
                self.advance(1);
                self.push(TokenKind::LeftParen, line, spaced);
            }
            ')' => {
                self.advance(1);
                self.push(TokenKind::RightParen, line, spaced);
            }
            ',' => {
                self.advance(1);
                self.push(TokenKind::Comma, line, spaced);
            }
            ':' if next == Some('=') => {
                self.advance(2);
                self.push(TokenKind::Declare, line, spaced);
            }
            '=' => {
                self.advance(1);
                self.push(TokenKind::Assign, line, spaced);
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => self.lex_number(spaced)?,
            '.' => {
                let name = identifier(&rest[1..]);
                self.advance(1 + name.len());
                if name.is_empty() {
                    self.push(TokenKind::Dot, line, spaced);
                } else {
                    self.push(TokenKind::Field(name.to_string()), line, spaced);
                }
            }
            '$' => {
                let name = identifier(&rest[1..]);
                self.advance(1 + name.len());
                self.push(TokenKind::Variable(format!("${}", name)), line, spaced);
            }
            '-' | '+' if next.is_some_and(|n| n.is_ascii_digit() || n == '.') => {
                self.lex_number(spaced)?
            }
            c if c.is_ascii_digit() => self.lex_number(spaced)?,
            c if c.is_alphabetic() || c == '_' => {
                let name = identifier(rest);
                self.advance(name.len());
                let kind = match name {
                    "true" => TokenKind::Bool(true),
                    "false" => TokenKind::Bool(false),
                    "nil" => TokenKind::Nil,
                    _ => TokenKind::Ident(name.to_string()),
                };
                self.push(kind, line, spaced);
            }
            other => {
                return Err(self.error(format!("unexpected {:?} in command", other)));
            }
        }
        Ok(())
    }

    fn lex_number(&mut self, spaced: bool) -> TemplateResult<()> {
        let rest = self.rest();
        let line = self.line;
        let mut len = 0;
        let mut prev = '\0';
        for (i, c) in rest.char_indices() {
            let sign_ok = i == 0 || matches!(prev, 'e' | 'E' | 'p' | 'P');
            if c.is_ascii_alphanumeric()
                || c == '.'
                || c == '_'
                || ((c == '-' || c == '+') && sign_ok)
            {
                len = i + c.len_utf8();
                prev = c;
            } else {
                break;
            }
        }

        let text = &rest[..len];
        let kind = match parse_int(text) {
            Some(i) => TokenKind::Int(i),
            None => match text.replace('_', "").parse::<f64>() {
                Ok(f) => TokenKind::Float(f),
                Err(_) => return Err(self.error("bad number syntax")),
            },
        };
        self.advance(len);
        self.push(kind, line, spaced);
        Ok(())
    }

    /// Parse a double-quoted string starting at `rest`; returns the value and
    /// the number of bytes consumed.
    fn quoted_string(&self, rest: &str) -> TemplateResult<(String, usize)> {
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Ok((value, i + 1)),
                '\n' => break,
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        '\'' => value.push('\''),
                        'u' => {
                            let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                            let decoded = u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| self.error(format!("invalid escape \\u{}", hex)))?;
                            value.push(decoded);
                        }
                        other => {
                            return Err(self.error(format!("unknown escape sequence \\{}", other)));
                        }
                    }
                }
                c => value.push(c),
            }
        }

        Err(self.error("unterminated quoted string"))
    }
}

/// `{{-` followed by whitespace trims the text before the action.
fn has_trim_marker(after_delim: &str) -> bool {
    let mut chars = after_delim.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_whitespace())
}

fn identifier(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "");
    let (negative, digits) = match cleaned.as_bytes().first() {
        Some(b'-') => (true, &cleaned[1..]),
        Some(b'+') => (false, &cleaned[1..]),
        _ => (false, cleaned.as_str()),
    };

    let lower = digits.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    }?;

    Some(if negative { -parsed } else { parsed })
}
