//! Raw log bytes to text lines.
//!
//! Strategy tester logs arrive as UTF-16 (usually little-endian with a BOM),
//! UTF-8, or some legacy single-byte code page. Decoding is total: every byte
//! buffer yields a line sequence, possibly empty.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf16Le,
    Utf16Be,
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Latin1 => "Latin-1",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub encoding: TextEncoding,
    pub lines: Vec<String>,
}

const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Minimum share of zero bytes in the high-byte lane for a BOM-less buffer
/// to be taken as UTF-16.
const UTF16_ZERO_LANE_RATIO: f64 = 0.9;

pub fn decode(bytes: &[u8]) -> DecodedLog {
    let (encoding, text) = decode_text(bytes);
    DecodedLog {
        encoding,
        lines: split_lines(&text),
    }
}

fn decode_text(bytes: &[u8]) -> (TextEncoding, String) {
    if let Some(body) = bytes.strip_prefix(&UTF16_LE_BOM) {
        return (TextEncoding::Utf16Le, decode_utf16(body, u16::from_le_bytes));
    }
    if let Some(body) = bytes.strip_prefix(&UTF16_BE_BOM) {
        return (TextEncoding::Utf16Be, decode_utf16(body, u16::from_be_bytes));
    }
    if let Some(encoding) = sniff_utf16(bytes) {
        let text = match encoding {
            TextEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            _ => decode_utf16(bytes, u16::from_le_bytes),
        };
        return (encoding, text);
    }

    let body = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(text) => (TextEncoding::Utf8, text.to_string()),
        Err(_) => (TextEncoding::Latin1, body.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Undecodable units (lone surrogates) are skipped and a dangling odd byte is
/// ignored.
fn decode_utf16(body: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = body.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units).filter_map(Result::ok).collect()
}

/// Detects BOM-less UTF-16 from the zero-byte pattern that ASCII-heavy text
/// leaves in the high-byte lane.
fn sniff_utf16(bytes: &[u8]) -> Option<TextEncoding> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }

    let pairs = bytes.len() / 2;
    let mut even_zeros = 0usize;
    let mut odd_zeros = 0usize;
    for pair in bytes.chunks_exact(2) {
        if pair[0] == 0 {
            even_zeros += 1;
        }
        if pair[1] == 0 {
            odd_zeros += 1;
        }
    }

    let ratio = |zeros: usize| zeros as f64 / pairs as f64;
    if even_zeros == 0 && ratio(odd_zeros) >= UTF16_ZERO_LANE_RATIO {
        Some(TextEncoding::Utf16Le)
    } else if odd_zeros == 0 && ratio(even_zeros) >= UTF16_ZERO_LANE_RATIO {
        Some(TextEncoding::Utf16Be)
    } else {
        None
    }
}

/// Splits on `\n`, `\r\n` and lone `\r`. A trailing terminator does not
/// produce an empty final line.
fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\n' => lines.push(std::mem::take(&mut current)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
