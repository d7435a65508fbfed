//! Footnote-digit contamination repair for lot-area fields.
//!
//! When a zone is written "R-1¹" and the adjacent cell reads "5,000", the
//! model regularly returns 15000: the footnote digit is prepended to the area.
//! Repair proceeds in this order and stops at the first hit:
//!
//! 1. **Known footnote.** The zone code carried a marker `d` and the value's
//!    decimal digits are `d` followed by a plausible area with no leading
//!    zero: strip the marker (`15000` with `¹` → `5000`).
//! 2. **Confirmed table.** A versioned [`CorrectionTable`] of previously
//!    confirmed `(contaminated, corrected)` pairs, optionally scoped to one
//!    footnote marker.
//! 3. **Heuristic (no footnote known).** A value inside the suspicious band
//!    (five digits starting 1–3) or above the implausibility threshold, whose
//!    tail is itself a plausible area, is *flagged* as a
//!    [`CorrectionAmbiguity`] and left unchanged.
//!
//! This is best-effort. Anything that matches none of the above passes
//! through untouched, including genuinely contaminated values with no marker
//! and no table entry. The heuristic never rewrites a value: false negatives
//! are preferred over corrupting a legitimately large lot.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CorrectionAmbiguity;
use crate::fields::Field;
use crate::zone::{Footnote, ZoneCode};

/// Numeric bounds for the repair rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionPolicy {
    /// Smallest area a stripped value may have (sq ft).
    pub plausible_min: f64,
    /// Largest area a stripped value may have (sq ft).
    pub plausible_max: f64,
    /// Lot areas above this are suspicious regardless of leading digit.
    pub implausible_above: f64,
    /// Suspicious band for values with no known footnote.
    pub heuristic_min: f64,
    pub heuristic_max: f64,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            plausible_min: 1_000.0,
            plausible_max: 50_000.0,
            implausible_above: 99_999.0,
            heuristic_min: 10_000.0,
            heuristic_max: 39_999.0,
        }
    }
}

/// One confirmed contamination case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub contaminated: f64,
    pub corrected: f64,
    /// Restrict the entry to zones carrying this footnote marker.
    #[serde(default)]
    pub footnote: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Versioned table of confirmed `(contaminated, corrected)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionTable {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub entries: Vec<CorrectionEntry>,
}

impl CorrectionTable {
    pub fn lookup(&self, value: f64, footnote: Option<&Footnote>) -> Option<&CorrectionEntry> {
        self.entries.iter().find(|e| {
            e.contaminated == value
                && match (&e.footnote, footnote) {
                    (None, _) => true,
                    (Some(want), Some(have)) => want == have.digits(),
                    (Some(_), None) => false,
                }
        })
    }
}

/// Which rule produced a correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CorrectionRule {
    FootnoteDigit { footnote: String },
    ConfirmedTable { version: String },
}

/// A value rewritten by the corrector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub field: Field,
    pub from: f64,
    pub to: f64,
    #[serde(flatten)]
    pub rule: CorrectionRule,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    Unchanged,
    Corrected(AppliedCorrection),
    Ambiguous(CorrectionAmbiguity),
}

impl Correction {
    /// The value to keep after this outcome.
    pub fn value_or(&self, original: f64) -> f64 {
        match self {
            Self::Corrected(c) => c.to,
            Self::Unchanged | Self::Ambiguous(_) => original,
        }
    }
}

/// Read-only corrector; safe to share across concurrent pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct ContaminationCorrector {
    policy: CorrectionPolicy,
    table: CorrectionTable,
}

impl ContaminationCorrector {
    pub fn new(policy: CorrectionPolicy, table: CorrectionTable) -> Self {
        Self { policy, table }
    }

    pub fn table_version(&self) -> &str {
        &self.table.version
    }

    /// Inspect one field value of `zone`.
    pub fn correct(&self, field: Field, value: f64, zone: &ZoneCode) -> Correction {
        if !field.is_lot_area() || value.fract() != 0.0 || !(0.0..1e12).contains(&value) {
            return Correction::Unchanged;
        }
        let footnote = zone.footnote();
        // A zone named for its lot size ("R-15¹" with 15,000 sq ft) explains the value.
        let named_for_value = zone
            .numeric_suffix()
            .is_some_and(|n| f64::from(n) * 1_000.0 == value);

        if !named_for_value
            && let Some(marker) = footnote
            && let Some(stripped) = strip_marker(value, marker.digits())
            && self.plausible(stripped)
        {
            info!(
                zone = %zone,
                field = %field,
                from = value,
                to = stripped,
                footnote = %marker,
                "stripped footnote digit from lot area"
            );
            return Correction::Corrected(AppliedCorrection {
                field,
                from: value,
                to: stripped,
                rule: CorrectionRule::FootnoteDigit {
                    footnote: marker.digits().to_string(),
                },
            });
        }

        if let Some(entry) = self.table.lookup(value, footnote) {
            info!(
                zone = %zone,
                field = %field,
                from = value,
                to = entry.corrected,
                table_version = %self.table.version,
                "applied confirmed contamination correction"
            );
            return Correction::Corrected(AppliedCorrection {
                field,
                from: value,
                to: entry.corrected,
                rule: CorrectionRule::ConfirmedTable {
                    version: self.table.version.clone(),
                },
            });
        }

        if footnote.is_some() || named_for_value {
            return Correction::Unchanged;
        }

        let in_band = (self.policy.heuristic_min..=self.policy.heuristic_max).contains(&value)
            && leading_digit(value).is_some_and(|d| (1..=3).contains(&d));
        if !in_band && value <= self.policy.implausible_above {
            return Correction::Unchanged;
        }

        let lead = leading_digit(value).map(|d| d.to_string()).unwrap_or_default();
        match strip_marker(value, &lead) {
            Some(suspected) if self.plausible(suspected) => {
                warn!(
                    zone = %zone,
                    field = %field,
                    value,
                    suspected,
                    "lot area matches contamination pattern but no footnote or table entry confirms it"
                );
                Correction::Ambiguous(CorrectionAmbiguity {
                    field,
                    value,
                    suspected,
                })
            }
            _ => Correction::Unchanged,
        }
    }

    fn plausible(&self, area: f64) -> bool {
        (self.policy.plausible_min..=self.policy.plausible_max).contains(&area)
    }
}

/// Remove `marker` from the front of `value`'s decimal digits. The remainder
/// must be non-empty and must not start with zero ("20000" minus "2" is not
/// an area).
fn strip_marker(value: f64, marker: &str) -> Option<f64> {
    if marker.is_empty() {
        return None;
    }
    let digits = format!("{}", value as u64);
    let rest = digits.strip_prefix(marker)?;
    if rest.is_empty() || rest.starts_with('0') {
        return None;
    }
    rest.parse().ok()
}

fn leading_digit(value: f64) -> Option<u32> {
    format!("{}", value as u64).chars().next()?.to_digit(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> ContaminationCorrector {
        ContaminationCorrector::default()
    }

    fn area(c: &ContaminationCorrector, value: f64, zone: &str) -> Correction {
        c.correct(Field::InteriorMinLotAreaSqft, value, &ZoneCode::parse(zone))
    }

    #[test]
    fn footnote_one_strips_leading_one() {
        let c = corrector();
        assert_eq!(area(&c, 15000.0, "R-1¹").value_or(15000.0), 5000.0);
    }

    #[test]
    fn footnote_two_strips_leading_two() {
        let c = corrector();
        let out = area(&c, 28000.0, "R-2²");
        assert!(matches!(
            &out,
            Correction::Corrected(AppliedCorrection { to, rule: CorrectionRule::FootnoteDigit { .. }, .. }) if *to == 8000.0
        ));
    }

    #[test]
    fn large_legitimate_lot_untouched() {
        let c = corrector();
        assert_eq!(area(&c, 45000.0, "R-45"), Correction::Unchanged);
        assert_eq!(area(&c, 45000.0, "R-A"), Correction::Unchanged);
    }

    #[test]
    fn footnote_that_does_not_prefix_value_is_ignored() {
        let c = corrector();
        // "R-20¹" with 20,000: leading digit is 2, marker is 1.
        assert_eq!(area(&c, 20000.0, "R-20¹"), Correction::Unchanged);
    }

    #[test]
    fn footnoted_zone_named_for_its_area_keeps_value() {
        let c = corrector();
        // Marker and leading digit agree, but the code names the lot size.
        assert_eq!(area(&c, 12000.0, "R-12¹"), Correction::Unchanged);
        assert_eq!(area(&c, 15000.0, "R-15¹"), Correction::Unchanged);
        assert_eq!(area(&c, 25000.0, "R-25(2)"), Correction::Unchanged);
        // Same marker on a zone not named for the value still strips.
        assert_eq!(area(&c, 15000.0, "R-1¹").value_or(15000.0), 5000.0);
    }

    #[test]
    fn stripped_remainder_must_be_plausible() {
        let c = corrector();
        // "20000" minus "2" leaves "0000".
        assert_eq!(area(&c, 20000.0, "R-2²"), Correction::Unchanged);
        // "1500" minus "1" leaves 500, below the plausible minimum.
        assert_eq!(area(&c, 1500.0, "R-1¹"), Correction::Unchanged);
    }

    #[test]
    fn six_digit_value_with_five_digit_area() {
        let c = corrector();
        assert_eq!(area(&c, 120000.0, "R-12¹").value_or(120000.0), 20000.0);
    }

    #[test]
    fn only_lot_area_fields_are_touched() {
        let c = corrector();
        let zone = ZoneCode::parse("R-1¹");
        assert_eq!(
            c.correct(Field::MinGrossFloorAreaFirstFloorSqft, 15000.0, &zone),
            Correction::Unchanged
        );
        assert_eq!(
            c.correct(Field::PrincipalFrontYardFt, 125.0, &zone),
            Correction::Unchanged
        );
        assert!(matches!(
            c.correct(Field::CornerMinLotAreaSqft, 17500.0, &zone),
            Correction::Corrected(_)
        ));
    }

    #[test]
    fn table_entry_applies_without_footnote() {
        let table = CorrectionTable {
            version: "2024-06".into(),
            entries: vec![CorrectionEntry {
                contaminated: 37500.0,
                corrected: 7500.0,
                footnote: None,
                note: Some("Township X schedule A".into()),
            }],
        };
        let c = ContaminationCorrector::new(CorrectionPolicy::default(), table);
        let out = area(&c, 37500.0, "R-3");
        match out {
            Correction::Corrected(applied) => {
                assert_eq!(applied.to, 7500.0);
                assert_eq!(
                    applied.rule,
                    CorrectionRule::ConfirmedTable {
                        version: "2024-06".into()
                    }
                );
            }
            other => panic!("expected correction, got {other:?}"),
        }
    }

    #[test]
    fn scoped_table_entry_needs_matching_footnote() {
        let table = CorrectionTable {
            version: "1".into(),
            entries: vec![CorrectionEntry {
                contaminated: 42000.0,
                corrected: 2000.0,
                footnote: Some("4".into()),
                note: None,
            }],
        };
        let c = ContaminationCorrector::new(CorrectionPolicy::default(), table);
        // Footnote rule already handles 42000 with ⁴, so use a different marker.
        assert_eq!(area(&c, 42000.0, "B-1³"), Correction::Unchanged);
        assert!(matches!(area(&c, 42000.0, "B-1⁴"), Correction::Corrected(_)));
    }

    #[test]
    fn heuristic_flags_but_never_rewrites() {
        let c = corrector();
        match area(&c, 15000.0, "R-A") {
            Correction::Ambiguous(amb) => {
                assert_eq!(amb.value, 15000.0);
                assert_eq!(amb.suspected, 5000.0);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert_eq!(area(&c, 15000.0, "R-A").value_or(15000.0), 15000.0);
    }

    #[test]
    fn zone_named_for_area_is_not_suspicious() {
        let c = corrector();
        assert_eq!(area(&c, 15000.0, "R-15"), Correction::Unchanged);
        assert_eq!(area(&c, 20000.0, "R-20"), Correction::Unchanged);
    }

    #[test]
    fn implausibly_large_value_flagged() {
        let c = corrector();
        assert!(matches!(area(&c, 512000.0, "R-A"), Correction::Ambiguous(_)));
        // Tail "089000" is not an area: a genuine 25-acre lot.
        assert_eq!(area(&c, 1_089_000.0, "R-25A"), Correction::Unchanged);
    }

    #[test]
    fn table_roundtrips_as_json() {
        let json = r#"{"version":"v3","entries":[{"contaminated":15000,"corrected":5000,"footnote":"1"}]}"#;
        let table: CorrectionTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.entries.len(), 1);
        assert!(table.lookup(15000.0, Footnote::new("1").as_ref()).is_some());
        assert!(table.lookup(15000.0, None).is_none());
    }
}
