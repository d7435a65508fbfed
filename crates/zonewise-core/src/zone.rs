//! Zone code parsing.
//!
//! Zoning tables mark districts with footnotes: "R-1¹", "R-20²", sometimes
//! "R-20(1)" once OCR or the model has flattened the superscript. The marker
//! is not part of the zone's identity, but it matters downstream because the
//! model tends to glue it onto the adjacent lot-area number (see
//! [`crate::contamination`]).
//!
//! Recognised markers, all trailing:
//!
//! - Unicode superscript digits: `R-1¹`, `C-2¹²`
//! - Parenthesised or bracketed digits: `R-20(1)`, `R-20[2]`
//!
//! Plain trailing digits are part of the code ("R-201" stays "R-201").

use std::fmt;

use serde::{Deserialize, Serialize};

/// Footnote marker digits stripped from a zone code, e.g. `"1"` for `R-1¹`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footnote(String);

impl Footnote {
    /// Build from ASCII digits. Returns `None` for empty or non-digit input
    /// and for an all-zero marker.
    pub fn new(digits: &str) -> Option<Self> {
        let digits = digits.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.bytes().all(|b| b == b'0') {
            return None;
        }
        Some(Self(digits.to_string()))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Footnote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed zone code with any footnote marker split off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneCode {
    code: String,
    footnote: Option<Footnote>,
}

impl ZoneCode {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();

        // Trailing superscript digits.
        let mut sup = String::new();
        let mut cut = s.len();
        for (i, c) in s.char_indices().rev() {
            match superscript_digit(c) {
                Some(d) => {
                    sup.insert(0, d);
                    cut = i;
                }
                None => break,
            }
        }
        if !sup.is_empty() {
            return Self {
                code: s[..cut].trim_end().to_string(),
                footnote: Footnote::new(&sup),
            };
        }

        // Trailing "(n)" / "[n]".
        for (open, close) in [('(', ')'), ('[', ']')] {
            if let Some(body) = s.strip_suffix(close)
                && let Some(idx) = body.rfind(open)
            {
                let inner = &body[idx + open.len_utf8()..];
                let head = body[..idx].trim_end();
                if !head.is_empty()
                    && (1..=2).contains(&inner.len())
                    && inner.bytes().all(|b| b.is_ascii_digit())
                {
                    return Self {
                        code: head.to_string(),
                        footnote: Footnote::new(inner),
                    };
                }
            }
        }

        Self {
            code: s.to_string(),
            footnote: None,
        }
    }

    /// Attach an explicitly supplied footnote when the code carried none.
    pub fn with_footnote(mut self, footnote: Option<Footnote>) -> Self {
        if self.footnote.is_none() {
            self.footnote = footnote;
        }
        self
    }

    /// Footnote-stripped code as it is stored.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn footnote(&self) -> Option<&Footnote> {
        self.footnote.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Comparison key: uppercase, whitespace removed.
    pub fn match_key(&self) -> String {
        match_key(&self.code)
    }

    /// Trailing number of the code: 20 for "R-20", `None` for "C-B".
    ///
    /// Many ordinances name residential districts after their minimum lot size
    /// in thousands of square feet.
    pub fn numeric_suffix(&self) -> Option<u32> {
        let digits: String = self
            .code
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    }
}

impl fmt::Display for ZoneCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Comparison key for a zone code string, footnote already stripped.
pub fn match_key(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn superscript_digit(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴' => Some('4'),
        '⁵' => Some('5'),
        '⁶' => Some('6'),
        '⁷' => Some('7'),
        '⁸' => Some('8'),
        '⁹' => Some('9'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superscript_footnote_stripped() {
        let z = ZoneCode::parse("R-20¹");
        assert_eq!(z.code(), "R-20");
        assert_eq!(z.footnote().map(Footnote::digits), Some("1"));
    }

    #[test]
    fn multi_digit_superscript() {
        let z = ZoneCode::parse("C-2¹²");
        assert_eq!(z.code(), "C-2");
        assert_eq!(z.footnote().map(Footnote::digits), Some("12"));
    }

    #[test]
    fn parenthesised_footnote() {
        let z = ZoneCode::parse("R-20(2)");
        assert_eq!(z.code(), "R-20");
        assert_eq!(z.footnote().map(Footnote::digits), Some("2"));

        let z = ZoneCode::parse("R-20 [3]");
        assert_eq!(z.code(), "R-20");
        assert_eq!(z.footnote().map(Footnote::digits), Some("3"));
    }

    #[test]
    fn plain_digits_are_identity() {
        let z = ZoneCode::parse("R-201");
        assert_eq!(z.code(), "R-201");
        assert!(z.footnote().is_none());
    }

    #[test]
    fn parenthesised_words_are_identity() {
        let z = ZoneCode::parse("R-1 (Residential)");
        assert_eq!(z.code(), "R-1 (Residential)");
        assert!(z.footnote().is_none());
        // A lone "(1)" is not a zone with a footnote.
        assert_eq!(ZoneCode::parse("(1)").code(), "(1)");
    }

    #[test]
    fn whitespace_trimmed_and_empty_detected() {
        assert_eq!(ZoneCode::parse("  R-1  ").code(), "R-1");
        assert!(ZoneCode::parse("   ").is_empty());
        assert!(ZoneCode::parse("¹").is_empty());
    }

    #[test]
    fn explicit_footnote_only_fills_gap() {
        let z = ZoneCode::parse("R-1").with_footnote(Footnote::new("4"));
        assert_eq!(z.footnote().map(Footnote::digits), Some("4"));
        let z = ZoneCode::parse("R-1¹").with_footnote(Footnote::new("4"));
        assert_eq!(z.footnote().map(Footnote::digits), Some("1"));
    }

    #[test]
    fn zero_footnote_is_none() {
        assert!(Footnote::new("0").is_none());
        assert!(Footnote::new("").is_none());
        assert!(Footnote::new("a").is_none());
    }

    #[test]
    fn match_key_ignores_case_and_spaces() {
        assert_eq!(ZoneCode::parse("r - 1a").match_key(), "R-1A");
        assert_eq!(match_key(" R-1A "), "R-1A");
    }

    #[test]
    fn numeric_suffix() {
        assert_eq!(ZoneCode::parse("R-20¹").numeric_suffix(), Some(20));
        assert_eq!(ZoneCode::parse("R-1A").numeric_suffix(), None);
        assert_eq!(ZoneCode::parse("C-B").numeric_suffix(), None);
    }
}
