//! Decimal-text rate fields (bps / pps).
//!
//! Switches report byte and packet rates as NUL-terminated decimal ASCII in
//! a fixed 32-byte field. Callers get either the text (at most 31
//! characters) or its numeric value with C `atof` semantics: the longest
//! leading numeric prefix is used and anything unparsable is zero.

use serde::{Serialize, Serializer};
use std::fmt;

/// Size of a rate field on the wire, terminator included.
pub const RATE_TEXT_LEN: usize = 32;

/// Longest text a rate field can carry.
pub const RATE_TEXT_MAX_CHARS: usize = RATE_TEXT_LEN - 1;

/// A raw rate field, kept byte-for-byte as received.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateText([u8; RATE_TEXT_LEN]);

impl RateText {
    /// An empty field (all zero bytes).
    pub const EMPTY: RateText = RateText([0; RATE_TEXT_LEN]);

    /// Copies a wire field. Short input is zero-padded, long input is cut
    /// at [`RATE_TEXT_LEN`] bytes.
    pub fn from_wire(raw: &[u8]) -> Self {
        let mut buf = [0u8; RATE_TEXT_LEN];
        let n = raw.len().min(RATE_TEXT_LEN);
        buf[..n].copy_from_slice(&raw[..n]);
        RateText(buf)
    }

    /// Builds a field from text, truncated to [`RATE_TEXT_MAX_CHARS`] bytes.
    pub fn from_text(text: &str) -> Self {
        let bytes = text.as_bytes();
        let n = bytes.len().min(RATE_TEXT_MAX_CHARS);
        Self::from_wire(&bytes[..n])
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; RATE_TEXT_LEN] {
        &self.0
    }

    /// The text up to the first NUL, never more than 31 characters.
    pub fn text(&self) -> String {
        rate_to_string(&self.0)
    }

    /// The numeric value of the text, zero if it is not a number.
    pub fn value(&self) -> f64 {
        parse_rate(&self.text())
    }
}

impl Default for RateText {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for RateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RateText({:?})", self.text())
    }
}

impl fmt::Display for RateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl Serialize for RateText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}

/// Converts a raw rate buffer to a string.
///
/// Copies up to the first NUL byte and at most [`RATE_TEXT_MAX_CHARS`]
/// bytes, so an unterminated buffer never reads past the field. Invalid
/// UTF-8 is replaced rather than rejected.
pub fn rate_to_string(raw: &[u8]) -> String {
    let limit = raw.len().min(RATE_TEXT_MAX_CHARS);
    let end = raw[..limit]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(limit);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Parses rate text the way C `atof` does.
///
/// Leading whitespace is skipped, then the longest prefix of the form
/// `[+-]digits[.digits][(e|E)[+-]digits]` is converted. Empty or
/// non-numeric text yields `0.0`.
pub fn parse_rate(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }

    if mantissa_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rate_to_string_stops_at_nul() {
        let mut raw = [0u8; RATE_TEXT_LEN];
        raw[..3].copy_from_slice(b"100");
        raw[4] = b'9';
        assert_eq!(rate_to_string(&raw), "100");
    }

    #[test]
    fn test_rate_to_string_truncates_unterminated() {
        let raw = [b'7'; RATE_TEXT_LEN];
        let text = rate_to_string(&raw);
        assert_eq!(text.len(), RATE_TEXT_MAX_CHARS);
    }

    #[test]
    fn test_rate_to_string_empty() {
        assert_eq!(rate_to_string(&[]), "");
        assert_eq!(rate_to_string(&[0u8; RATE_TEXT_LEN]), "");
    }

    #[test]
    fn test_parse_rate_plain_numbers() {
        assert_eq!(parse_rate("100"), 100.0);
        assert_eq!(parse_rate("12.5"), 12.5);
        assert_eq!(parse_rate("  -3"), -3.0);
        assert_eq!(parse_rate("1e3"), 1000.0);
        assert_eq!(parse_rate(".5"), 0.5);
    }

    #[test]
    fn test_parse_rate_uses_numeric_prefix() {
        assert_eq!(parse_rate("42kbps"), 42.0);
        assert_eq!(parse_rate("7.25.1"), 7.25);
        assert_eq!(parse_rate("3e"), 3.0);
        assert_eq!(parse_rate("3e+x"), 3.0);
    }

    #[test]
    fn test_parse_rate_non_numeric_is_zero() {
        assert_eq!(parse_rate(""), 0.0);
        assert_eq!(parse_rate("n/a"), 0.0);
        assert_eq!(parse_rate("."), 0.0);
        assert_eq!(parse_rate("-"), 0.0);
    }

    #[test]
    fn test_rate_text_from_text_truncates() {
        let long = "9".repeat(40);
        let rate = RateText::from_text(&long);
        assert_eq!(rate.text().len(), RATE_TEXT_MAX_CHARS);
        assert_eq!(rate.as_bytes()[RATE_TEXT_MAX_CHARS], 0);
    }

    #[test]
    fn test_rate_text_value() {
        assert_eq!(RateText::from_text("150").value(), 150.0);
        assert_eq!(RateText::EMPTY.value(), 0.0);
    }
}
