// src/parser.rs
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::errors::EvaluationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The token where parsing could not continue.
    #[error("Expression error at: {0}")]
    UnexpectedInput(String),

    /// Input ended before the expression was complete.
    #[error("Expression is invalid")]
    Incomplete,

    /// Nesting went past the given depth.
    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),
}

impl From<ParseError> for EvaluationError {
    fn from(err: ParseError) -> Self {
        let subject = match &err {
            ParseError::UnexpectedInput(token) => Some(token.clone()),
            ParseError::Incomplete | ParseError::TooDeep(_) => None,
        };
        let converted = EvaluationError::invalid_expression(err.to_string());
        match subject {
            Some(token) => converted.with_subject(token),
            None => converted,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Character cursor over an expression body.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    /// A name such as `contact.first_name`. Dots are kept only between
    /// word characters.
    pub fn parse_name(&mut self) -> Result<&'a str, ParseError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            let rest = &self.s[self.i + c.len_utf8()..];
            let continues = is_word_char(c) || (c == '.' && self.i > start && rest.starts_with(is_word_char));
            if !continues {
                break;
            }
            self.i += c.len_utf8();
        }
        if self.i == start {
            return Err(self.unexpected());
        }
        Ok(&self.s[start..self.i])
    }

    /// Digits with an optional fractional part, e.g. `12` or `0.5`.
    pub fn parse_number_literal(&mut self) -> Result<Decimal, ParseError> {
        let start = self.i;
        self.skip_while(|c| c.is_ascii_digit());
        if self.peek_char() == Some('.') && self.s[self.i + 1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.i += 1;
            self.skip_while(|c| c.is_ascii_digit());
        }
        let literal = &self.s[start..self.i];
        if literal.is_empty() {
            return Err(self.unexpected());
        }
        Decimal::from_str(literal).map_err(|_| ParseError::UnexpectedInput(literal.to_string()))
    }

    /// A `"` delimited literal where `""` stands for one quote.
    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        self.expect('"')?;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == '"' && !self.consume_char('"') {
                return Ok(out);
            }
            out.push(c);
        }
        Err(ParseError::Incomplete)
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    /// The character after the next word, skipping whitespace, without
    /// consuming anything. Tells a call from a reference.
    pub fn peek_after_name(&self) -> Option<char> {
        let rest = self.s[self.i..].trim_start_matches(|c: char| is_word_char(c) || c == '.');
        rest.trim_start().chars().next()
    }

    pub fn skip_ws(&mut self) {
        self.skip_while(char::is_whitespace);
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    /// Error for whatever token starts at the cursor.
    pub fn unexpected(&self) -> ParseError {
        let rest = &self.s[self.i..];
        match rest.chars().next() {
            None => ParseError::Incomplete,
            Some(c) if is_word_char(c) => {
                let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
                ParseError::UnexpectedInput(rest[..end].to_string())
            }
            Some(c) => ParseError::UnexpectedInput(c.to_string()),
        }
    }

    fn skip_while(&mut self, keep: impl Fn(char) -> bool) {
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.i += c.len_utf8();
        }
    }
}
