//! Cursor over a single log line, used by the event grammars.
//!
//! The scanner distinguishes two ways a grammar can fail. A `Structure`
//! mismatch means the line simply is not of that shape. A `Numeric` mismatch
//! means the shape matched up to a numeric-looking token that does not parse;
//! the extractor drops both but counts the latter separately.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    Structure,
    Numeric(&'static str),
}

pub type Scan<T> = Result<T, Mismatch>;

pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M:%S";
const TIMESTAMP_LEN: usize = 19;

pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Moves past the first occurrence of `marker`.
    pub fn seek(&mut self, marker: &str) -> Scan<()> {
        match self.remaining().find(marker) {
            Some(offset) => {
                self.pos += offset + marker.len();
                Ok(())
            }
            None => Err(Mismatch::Structure),
        }
    }

    /// Skips whitespace, then consumes `literal` if it is next.
    pub fn consume(&mut self, literal: &str) -> bool {
        let checkpoint = self.pos;
        self.skip_whitespace();
        if self.remaining().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            self.pos = checkpoint;
            false
        }
    }

    pub fn expect(&mut self, literal: &str) -> Scan<()> {
        if self.consume(literal) {
            Ok(())
        } else {
            Err(Mismatch::Structure)
        }
    }

    /// Consumes the first of `alternatives` that is next.
    pub fn expect_any(&mut self, alternatives: &[&str]) -> Scan<()> {
        if alternatives.iter().any(|alt| self.consume(alt)) {
            Ok(())
        } else {
            Err(Mismatch::Structure)
        }
    }

    /// Skips whitespace and returns the following alphanumeric word.
    pub fn word(&mut self) -> Scan<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            Err(Mismatch::Structure)
        } else {
            Ok(&self.input[start..self.pos])
        }
    }

    /// Skips whitespace and returns the following run of non-whitespace.
    pub fn token(&mut self) -> Scan<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                break;
            }
            self.advance();
        }
        if self.pos == start {
            Err(Mismatch::Structure)
        } else {
            Ok(&self.input[start..self.pos])
        }
    }

    /// Returns the maximal run of sign, digit and dot characters.
    ///
    /// The run must contain at least one digit to count as a numeric token at
    /// all; whether it actually parses is decided by the caller.
    fn numeric_token(&mut self) -> Scan<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.advance();
        }
        let mut digits = 0;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' || ch == '-' {
                self.advance();
            } else {
                break;
            }
        }
        if digits == 0 {
            self.pos = start;
            return Err(Mismatch::Structure);
        }
        Ok(&self.input[start..self.pos])
    }

    pub fn float(&mut self, field: &'static str) -> Scan<f64> {
        let token = self.numeric_token()?;
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(Mismatch::Numeric(field))
    }

    pub fn integer(&mut self, field: &'static str) -> Scan<i64> {
        let token = self.numeric_token()?;
        token.parse::<i64>().map_err(|_| Mismatch::Numeric(field))
    }

    /// Parses an optional `#<n>` ticket reference.
    pub fn ticket(&mut self) -> Scan<Option<u64>> {
        if !self.consume("#") {
            return Ok(None);
        }
        let token = self.numeric_token()?;
        token
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Mismatch::Numeric("ticket"))
    }

    /// Consumes and returns the rest of the line, trimmed.
    pub fn rest(&mut self) -> &'a str {
        let rest = self.remaining();
        self.pos = self.input.len();
        rest.trim()
    }
}

/// Finds the first valid `YYYY.MM.DD HH:MM:SS` timestamp anywhere in `line`.
///
/// Returns the parsed instant and the byte offset just past it.
pub fn find_timestamp(line: &str) -> Option<(NaiveDateTime, usize)> {
    let bytes = line.as_bytes();
    if bytes.len() < TIMESTAMP_LEN {
        return None;
    }
    (0..=bytes.len() - TIMESTAMP_LEN).find_map(|start| {
        let window = &bytes[start..start + TIMESTAMP_LEN];
        if !has_timestamp_shape(window) {
            return None;
        }
        // The window is pure ASCII, so these are char boundaries.
        let text = &line[start..start + TIMESTAMP_LEN];
        NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .ok()
            .map(|ts| (ts, start + TIMESTAMP_LEN))
    })
}

fn has_timestamp_shape(window: &[u8]) -> bool {
    const SHAPE: &[u8; TIMESTAMP_LEN] = b"dddd.dd.dd dd:dd:dd";
    window.iter().zip(SHAPE.iter()).all(|(&b, &s)| match s {
        b'd' => b.is_ascii_digit(),
        other => b == other,
    })
}
