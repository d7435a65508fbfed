//! Numeric field normalisation.
//!
//! Turns a raw extracted token ("10,000 sq ft", "2½", "30%", 35) into a
//! finite non-negative number or null, given the field's [`FieldKind`].
//!
//! Rules:
//!
//! 1. Thousands separators are removed before anything else, so
//!    `normalize("10,000") == normalize("10000")` for every token.
//! 2. A trailing unit is accepted only if it fits the kind ("ft" on a setback,
//!    "%" on a coverage); a unit of another kind is rejected.
//! 3. Fractions: glyphs (`2½`), mixed numbers (`2 1/2`) and bare fractions
//!    (`1/2`) become decimals.
//! 4. Ranges, lists and free text are rejected. No midpoints.
//! 5. Percentages stay on the 0–100 scale and are rejected (not clamped)
//!    outside it. Stories keep one decimal place.
//!
//! A rejection is an `Err`; absence markers ("", "null", "N/A") are `Ok(None)`.

use serde::Deserialize;

use crate::error::NormalizeError;
use crate::fields::FieldKind;

/// Raw value for one field as it came out of the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum RawValue {
    Null,
    Number(f64),
    Text(String),
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Text(n.to_string()),
            },
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Tokens that mean "not specified".
const ABSENT: &[&str] = &["", "null", "none", "n/a", "na", "-", "—", "–", "not specified"];

const AREA_UNITS: &[&str] = &[
    "sq ft",
    "sq. ft",
    "sq.ft",
    "sqft",
    "sf",
    "s.f",
    "ft2",
    "ft²",
    "square feet",
    "square foot",
];
const FEET_UNITS: &[&str] = &["ft", "feet", "foot", "'"];
const PERCENT_UNITS: &[&str] = &["%", "percent", "pct"];
const STORIES_UNITS: &[&str] = &["stories", "story", "storeys", "storey"];
const RATIO_UNITS: &[&str] = &[
    "units/acre",
    "units per acre",
    "du/ac",
    "du/acre",
    "dwelling units per acre",
    "per acre",
];
const COUNT_UNITS: &[&str] = &["units", "unit"];

/// Qualifiers that may trail a value without changing it.
const QUALIFIERS: &[&str] = &["minimum", "maximum", "min", "max", "each", "per side", "total"];

fn units_for(kind: FieldKind) -> &'static [&'static str] {
    match kind {
        FieldKind::Area => AREA_UNITS,
        FieldKind::LinearFeet => FEET_UNITS,
        FieldKind::Percent => PERCENT_UNITS,
        FieldKind::Stories => STORIES_UNITS,
        FieldKind::Ratio => RATIO_UNITS,
        FieldKind::Count => COUNT_UNITS,
    }
}

const ALL_UNITS: &[&[&str]] = &[
    AREA_UNITS,
    FEET_UNITS,
    PERCENT_UNITS,
    STORIES_UNITS,
    RATIO_UNITS,
    COUNT_UNITS,
];

/// Normalise one raw value for a field of the given kind.
pub fn normalize(raw: &RawValue, kind: FieldKind) -> Result<Option<f64>, NormalizeError> {
    let value = match raw {
        RawValue::Null => return Ok(None),
        RawValue::Number(n) => *n,
        RawValue::Text(s) => match parse_text(s, kind)? {
            Some(v) => v,
            None => return Ok(None),
        },
    };
    check_kind(value, kind).map(Some)
}

/// Remove thousands separators.
pub fn strip_commas(token: &str) -> String {
    token.chars().filter(|&c| c != ',').collect()
}

fn check_kind(value: f64, kind: FieldKind) -> Result<f64, NormalizeError> {
    if !value.is_finite() {
        return Err(NormalizeError::NonFinite);
    }
    if value < 0.0 {
        return Err(NormalizeError::Negative(value));
    }
    match kind {
        FieldKind::Percent if value > 100.0 => Err(NormalizeError::OutOfRange {
            value,
            min: 0.0,
            max: 100.0,
        }),
        FieldKind::Stories => Ok((value * 10.0).round() / 10.0),
        FieldKind::Count if value.fract() != 0.0 => Err(NormalizeError::Fractional(value)),
        _ => Ok(value),
    }
}

fn parse_text(token: &str, kind: FieldKind) -> Result<Option<f64>, NormalizeError> {
    let cleaned = strip_commas(token.trim());
    let lower = cleaned.to_lowercase();
    let s = lower.trim();
    if ABSENT.contains(&s) {
        return Ok(None);
    }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit() || c == '.') => (true, rest),
        _ => (false, s),
    };

    let (value, rest) = match leading_number(body) {
        Some(parsed) => parsed,
        None => return Err(NormalizeError::NotNumeric(cleaned)),
    };
    let (value, rest) = fraction_tail(value, rest, &cleaned)?;

    if negative {
        return Err(NormalizeError::Negative(-value));
    }

    classify_remainder(rest, kind, &cleaned)?;
    Ok(Some(value))
}

/// Parse a leading decimal number, or a lone fraction glyph.
fn leading_number(s: &str) -> Option<(f64, &str)> {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() {
            seen_digit = true;
            end = i + 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            end = i + 1;
        } else {
            break;
        }
    }
    if seen_digit {
        let number = s[..end].trim_end_matches('.');
        return number.parse().ok().map(|v| (v, &s[end..]));
    }
    let glyph = s.chars().next()?;
    fraction_glyph(glyph).map(|v| (v, &s[glyph.len_utf8()..]))
}

/// Fold a trailing fraction into `whole`: "2½", "2 ½", "2 1/2", and a bare
/// "1/2" whose numerator was already consumed as `whole`.
fn fraction_tail<'a>(
    whole: f64,
    rest: &'a str,
    token: &str,
) -> Result<(f64, &'a str), NormalizeError> {
    let trimmed = rest.trim_start();

    if let Some(c) = trimmed.chars().next()
        && let Some(frac) = fraction_glyph(c)
    {
        return Ok((whole + frac, &trimmed[c.len_utf8()..]));
    }

    // Bare fraction: the numerator is `whole`.
    if let Some(after_slash) = rest.strip_prefix('/') {
        let (den, tail) = split_digits(after_slash);
        return match simple_fraction(whole, den) {
            Some(v) => Ok((v, tail)),
            None => Err(NormalizeError::Range(token.to_string())),
        };
    }

    // Mixed number: whitespace, then "a/b".
    if trimmed.len() < rest.len() && whole.fract() == 0.0 {
        let (num, tail) = split_digits(trimmed);
        if let Some(after_slash) = tail.strip_prefix('/') {
            let (den, tail) = split_digits(after_slash);
            let frac = num
                .parse::<f64>()
                .ok()
                .and_then(|n| simple_fraction(n, den));
            return match frac {
                Some(f) if f < 1.0 => Ok((whole + f, tail)),
                _ => Err(NormalizeError::Range(token.to_string())),
            };
        }
    }

    Ok((whole, rest))
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.split_at(end)
}

/// `num/den` for proper fractions with a small denominator; anything else
/// ("20/30") reads as a pair of values.
fn simple_fraction(num: f64, den: &str) -> Option<f64> {
    let den: f64 = den.parse().ok()?;
    let small_denominator = [2.0, 3.0, 4.0, 8.0, 16.0].contains(&den);
    if num.fract() == 0.0 && num < den && small_denominator {
        Some(num / den)
    } else {
        None
    }
}

fn fraction_glyph(c: char) -> Option<f64> {
    match c {
        '½' => Some(0.5),
        '⅓' => Some(1.0 / 3.0),
        '⅔' => Some(2.0 / 3.0),
        '¼' => Some(0.25),
        '¾' => Some(0.75),
        '⅛' => Some(0.125),
        '⅜' => Some(0.375),
        '⅝' => Some(0.625),
        '⅞' => Some(0.875),
        _ => None,
    }
}

/// Accept an empty remainder or a unit that fits `kind`; reject everything
/// else with the most specific reason.
fn classify_remainder(rest: &str, kind: FieldKind, token: &str) -> Result<(), NormalizeError> {
    let mut unit = rest.trim().trim_end_matches('.').trim();
    if unit.is_empty() {
        return Ok(());
    }

    if unit.starts_with(['-', '–', '—', '/', '&', '+'])
        || ["to ", "or ", "and ", "to", "or"]
            .iter()
            .any(|w| unit.starts_with(w) && unit[w.len()..].trim_start().starts_with(|c: char| c.is_ascii_digit()))
    {
        return Err(NormalizeError::Range(token.to_string()));
    }

    // Drop "(min)" / "minimum" style qualifiers.
    loop {
        let before = unit;
        for q in QUALIFIERS {
            if let Some(stripped) = unit.strip_suffix(q) {
                unit = stripped
                    .trim_end()
                    .trim_end_matches(['(', ')', ','])
                    .trim_end()
                    .trim_end_matches('.');
            }
        }
        unit = unit.trim_end_matches(['(', ')']).trim();
        if unit == before {
            break;
        }
    }
    if unit.is_empty() {
        return Ok(());
    }

    if units_for(kind).contains(&unit) {
        return Ok(());
    }
    if ALL_UNITS.iter().any(|units| units.contains(&unit)) {
        return Err(NormalizeError::UnexpectedUnit {
            unit: unit.to_string(),
        });
    }
    if unit.chars().any(|c| c.is_ascii_digit()) {
        return Err(NormalizeError::Range(token.to_string()));
    }
    Err(NormalizeError::NotNumeric(token.to_string()))
}
