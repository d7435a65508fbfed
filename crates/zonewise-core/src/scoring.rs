//! Predicted-vs-truth accuracy.
//!
//! All functions here are pure; nothing touches storage.
//!
//! Per field, with tolerance `t` percent:
//!
//! | predicted | actual | score |
//! |---|---|---|
//! | null | null | 1.0 |
//! | one null | | 0.0 |
//! | p | 0 | 1.0 if p == 0 else 0.0 |
//! | p | a | 1.0 if diff ≤ t, else max(0, 1 − diff/100), diff = \|p − a\| / \|a\| × 100 |
//!
//! Overall accuracy is the unweighted mean of zone, field and location
//! accuracy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::builder::RawJurisdiction;
use crate::error::ScoringError;
use crate::fields::Field;
use crate::record::RequirementRecord;
use crate::truth::GroundTruthDocument;
use crate::zone::ZoneCode;

/// Relative tolerance in percent, in (0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tolerance(f64);

impl Tolerance {
    pub fn new(percent: f64) -> Result<Self, ScoringError> {
        if percent > 0.0 && percent <= 100.0 {
            Ok(Self(percent))
        } else {
            Err(ScoringError::InvalidTolerance(percent))
        }
    }

    pub fn percent(self) -> f64 {
        self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(5.0)
    }
}

impl TryFrom<f64> for Tolerance {
    type Error = ScoringError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tolerance> for f64 {
    fn from(t: Tolerance) -> f64 {
        t.0
    }
}

pub fn score_field(predicted: Option<f64>, actual: Option<f64>, tolerance: Tolerance) -> f64 {
    match (predicted, actual) {
        (None, None) => 1.0,
        (None, Some(_)) | (Some(_), None) => 0.0,
        (Some(p), Some(a)) if a == 0.0 => {
            if p == 0.0 {
                1.0
            } else {
                0.0
            }
        }
        (Some(p), Some(a)) => {
            let diff = (p - a).abs() / a.abs() * 100.0;
            if diff <= tolerance.percent() {
                1.0
            } else {
                (1.0 - diff / 100.0).max(0.0)
            }
        }
    }
}

/// Exact match of footnote-stripped codes, ignoring case and whitespace.
pub fn zone_matches(predicted: &str, truth: &str) -> bool {
    ZoneCode::parse(predicted).match_key() == ZoneCode::parse(truth).match_key()
}

/// Resolve the canonical fields to compare. `None` selects every field.
pub fn select_fields(names: Option<&[String]>) -> Result<Vec<Field>, ScoringError> {
    let Some(names) = names else {
        return Ok(Field::ALL.to_vec());
    };
    if names.is_empty() {
        return Err(ScoringError::EmptyFieldSet);
    }
    names
        .iter()
        .map(|n| Field::from_name(n.trim()).ok_or_else(|| ScoringError::UnknownField(n.clone())))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
    pub field: Field,
    pub predicted: Option<f64>,
    pub actual: Option<f64>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordScore {
    pub zone_accuracy: f64,
    pub field_accuracy: f64,
    pub location_accuracy: f64,
    pub overall_accuracy: f64,
    pub fields: Vec<FieldScore>,
}

fn boolean(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn mean(xs: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = xs.into_iter().fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn overall(zone: f64, field: f64, location: f64) -> f64 {
    (zone + field + location) / 3.0
}

/// Compare one predicted record with one ground-truth record.
pub fn score_record(
    predicted: &RequirementRecord,
    truth: &RequirementRecord,
    fields: &[Field],
    tolerance: Tolerance,
) -> Result<RecordScore, ScoringError> {
    if fields.is_empty() {
        return Err(ScoringError::EmptyFieldSet);
    }
    let scores: Vec<FieldScore> = fields
        .iter()
        .map(|&field| {
            let (p, a) = (predicted.fields.get(field), truth.fields.get(field));
            FieldScore {
                field,
                predicted: p,
                actual: a,
                score: score_field(p, a, tolerance),
            }
        })
        .collect();
    let field_accuracy = mean(scores.iter().map(|s| s.score)).unwrap_or(0.0);
    let zone_accuracy = boolean(zone_matches(&predicted.zone, &truth.zone));
    let location_accuracy = boolean(predicted.jurisdiction.matches(&truth.jurisdiction));
    Ok(RecordScore {
        zone_accuracy,
        field_accuracy,
        location_accuracy,
        overall_accuracy: overall(zone_accuracy, field_accuracy, location_accuracy),
        fields: scores,
    })
}

/// Per-zone breakdown inside a document score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneScore {
    /// Ground-truth zone code.
    pub zone: String,
    pub found: bool,
    /// Mean field score; `None` when the zone was not predicted.
    pub field_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    pub zone_accuracy: f64,
    pub field_accuracy: f64,
    pub location_accuracy: f64,
    pub overall_accuracy: f64,
    /// Mean score per field name over matched zones.
    pub per_field: BTreeMap<String, f64>,
    pub per_zone: Vec<ZoneScore>,
}

impl DocumentScore {
    /// Scores recorded for a run that produced nothing usable.
    pub fn zero() -> Self {
        Self {
            zone_accuracy: 0.0,
            field_accuracy: 0.0,
            location_accuracy: 0.0,
            overall_accuracy: 0.0,
            per_field: BTreeMap::new(),
            per_zone: Vec::new(),
        }
    }
}

/// Score a document's predicted records against its ground truth.
///
/// - zone accuracy: share of distinct ground-truth zones that were predicted
/// - field accuracy: mean field score over ground-truth zones that were
///   predicted (0 when none were)
/// - location accuracy: exact match of `predicted_location` with the
///   document's jurisdiction; 1.0 when the run reported no location. The
///   reported strings are compared as given, so a location that would fail
///   validation scores 0.0
pub fn score_document(
    predicted_location: Option<&RawJurisdiction>,
    predicted: &[RequirementRecord],
    truth: &GroundTruthDocument,
    tolerance: Tolerance,
) -> Result<DocumentScore, ScoringError> {
    if truth.requirements.is_empty() {
        return Err(ScoringError::EmptyGroundTruth);
    }
    let fields = select_fields(truth.scored_fields.as_deref())?;

    let by_key: BTreeMap<String, &RequirementRecord> = predicted
        .iter()
        .map(|r| (ZoneCode::parse(&r.zone).match_key(), r))
        .collect();

    let truth_records = truth.records();
    let truth_keys: BTreeSet<String> = truth_records
        .iter()
        .map(|r| ZoneCode::parse(&r.zone).match_key())
        .collect();
    let found = truth_keys.iter().filter(|k| by_key.contains_key(*k)).count();
    let zone_accuracy = found as f64 / truth_keys.len() as f64;

    let mut all_scores = Vec::new();
    let mut per_field: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut per_zone = Vec::with_capacity(truth_records.len());

    for t in &truth_records {
        let key = ZoneCode::parse(&t.zone).match_key();
        let Some(p) = by_key.get(&key) else {
            per_zone.push(ZoneScore {
                zone: t.zone.clone(),
                found: false,
                field_accuracy: None,
            });
            continue;
        };
        let rs = score_record(p, t, &fields, tolerance)?;
        for s in &rs.fields {
            let slot = per_field.entry(s.field.name().to_string()).or_insert((0.0, 0));
            slot.0 += s.score;
            slot.1 += 1;
            all_scores.push(s.score);
        }
        per_zone.push(ZoneScore {
            zone: t.zone.clone(),
            found: true,
            field_accuracy: Some(rs.field_accuracy),
        });
    }

    let field_accuracy = mean(all_scores).unwrap_or(0.0);
    let location_accuracy = match predicted_location {
        Some(loc) => boolean(loc.matches(&truth.jurisdiction)),
        None => 1.0,
    };
    Ok(DocumentScore {
        zone_accuracy,
        field_accuracy,
        location_accuracy,
        overall_accuracy: overall(zone_accuracy, field_accuracy, location_accuracy),
        per_field: per_field
            .into_iter()
            .map(|(k, (sum, n))| (k, sum / n as f64))
            .collect(),
        per_zone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValues;
    use crate::record::Jurisdiction;
    use crate::truth::{Complexity, GroundTruthRequirement};

    fn tol() -> Tolerance {
        Tolerance::default()
    }

    fn linwood() -> Jurisdiction {
        Jurisdiction::new("Linwood", None, "NJ").unwrap()
    }

    fn rec(zone: &str, fields: FieldValues) -> RequirementRecord {
        RequirementRecord {
            jurisdiction: linwood(),
            zone: zone.into(),
            data_source: "AI_Extracted".into(),
            extraction_confidence: 0.7,
            fields,
        }
    }

    #[test]
    fn field_score_table() {
        assert_eq!(score_field(Some(100.0), Some(100.0), tol()), 1.0);
        // 6% off with a 5% band: linear decay, not a full match.
        assert!((score_field(Some(94.0), Some(100.0), tol()) - 0.94).abs() < 1e-9);
        assert_eq!(score_field(Some(96.0), Some(100.0), tol()), 1.0);
        assert_eq!(score_field(Some(50.0), Some(100.0), tol()), 0.5);
        assert_eq!(score_field(None, None, tol()), 1.0);
        assert_eq!(score_field(Some(5.0), None, tol()), 0.0);
        assert_eq!(score_field(None, Some(5.0), tol()), 0.0);
        assert_eq!(score_field(Some(0.0), Some(0.0), tol()), 1.0);
        assert_eq!(score_field(Some(1.0), Some(0.0), tol()), 0.0);
        assert_eq!(score_field(Some(300.0), Some(100.0), tol()), 0.0);
    }

    #[test]
    fn ninety_four_within_a_six_percent_band() {
        let t = Tolerance::new(6.0).unwrap();
        assert_eq!(score_field(Some(94.0), Some(100.0), t), 1.0);
        assert_eq!(score_field(Some(106.0), Some(100.0), t), 1.0);
    }

    #[test]
    fn tolerance_bounds() {
        assert!(Tolerance::new(100.0).is_ok());
        assert_eq!(Tolerance::new(0.0), Err(ScoringError::InvalidTolerance(0.0)));
        assert!(Tolerance::new(100.5).is_err());
        assert!(Tolerance::new(f64::NAN).is_err());
        assert!(serde_json::from_str::<Tolerance>("-1").is_err());
    }

    #[test]
    fn zone_match_strips_footnote_and_case() {
        assert!(zone_matches("r-20¹", "R-20"));
        assert!(zone_matches("R 1", "r1"));
        assert!(!zone_matches("R-1", "R-1A"));
    }

    #[test]
    fn record_overall_is_mean_of_three() {
        let p = rec(
            "R-1",
            FieldValues {
                principal_front_yard_ft: Some(25.0),
                max_height_feet_total: Some(17.5),
                ..Default::default()
            },
        );
        let t = rec(
            "R-1",
            FieldValues {
                principal_front_yard_ft: Some(25.0),
                max_height_feet_total: Some(35.0),
                ..Default::default()
            },
        );
        let fields = [Field::PrincipalFrontYardFt, Field::MaxHeightFeetTotal];
        let s = score_record(&p, &t, &fields, tol()).unwrap();
        assert_eq!(s.field_accuracy, 0.75);
        assert_eq!(s.zone_accuracy, 1.0);
        assert_eq!(s.location_accuracy, 1.0);
        assert!((s.overall_accuracy - 2.75 / 3.0).abs() < 1e-12);

        assert_eq!(
            score_record(&p, &t, &[], tol()),
            Err(ScoringError::EmptyFieldSet)
        );
    }

    fn truth_doc() -> GroundTruthDocument {
        GroundTruthDocument {
            id: None,
            name: "Linwood".into(),
            original_filename: None,
            jurisdiction: linwood(),
            verified_by: None,
            expected_zone_count: 2,
            complexity: Complexity::Simple,
            notes: None,
            scored_fields: Some(vec![
                "principal_front_yard_ft".into(),
                "interior_min_lot_area_sqft".into(),
            ]),
            requirements: vec![
                GroundTruthRequirement {
                    zone: "R-20¹".into(),
                    zone_description: None,
                    fields: FieldValues {
                        interior_min_lot_area_sqft: Some(20000.0),
                        principal_front_yard_ft: Some(30.0),
                        ..Default::default()
                    },
                },
                GroundTruthRequirement {
                    zone: "C-1".into(),
                    zone_description: None,
                    fields: FieldValues::default(),
                },
            ],
        }
    }

    #[test]
    fn document_score_counts_matched_zones_only() {
        let predicted = vec![rec(
            "r-20",
            FieldValues {
                interior_min_lot_area_sqft: Some(20000.0),
                principal_front_yard_ft: Some(15.0),
                ..Default::default()
            },
        )];
        let s = score_document(None, &predicted, &truth_doc(), tol()).unwrap();
        assert_eq!(s.zone_accuracy, 0.5);
        assert_eq!(s.field_accuracy, 0.75);
        assert_eq!(s.location_accuracy, 1.0);
        assert_eq!(s.per_field["principal_front_yard_ft"], 0.5);
        assert_eq!(s.per_zone.len(), 2);
        assert!(!s.per_zone[1].found);
        assert!((s.overall_accuracy - 2.25 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_location_costs_a_third() {
        let other = reported("Somers Point", "NJ");
        let s = score_document(Some(&other), &[], &truth_doc(), tol()).unwrap();
        assert_eq!(s.location_accuracy, 0.0);
        assert_eq!(s.zone_accuracy, 0.0);
        assert_eq!(s.field_accuracy, 0.0);
        assert_eq!(s.overall_accuracy, 0.0);
    }

    #[test]
    fn unvalidated_location_still_scored() {
        for other in [reported("Somers Point", "New Jersey"), reported("Linwood", "New Jersey")] {
            let s = score_document(Some(&other), &[], &truth_doc(), tol()).unwrap();
            assert_eq!(s.location_accuracy, 0.0, "{other:?}");
        }
        let s = score_document(Some(&reported("LINWOOD", "nj")), &[], &truth_doc(), tol()).unwrap();
        assert_eq!(s.location_accuracy, 1.0);
    }

    fn reported(town: &str, state: &str) -> RawJurisdiction {
        RawJurisdiction {
            town: town.into(),
            county: None,
            state: Some(state.into()),
        }
    }

    #[test]
    fn document_errors() {
        let mut doc = truth_doc();
        doc.scored_fields = Some(vec!["lot_size".into()]);
        assert_eq!(
            score_document(None, &[], &doc, tol()),
            Err(ScoringError::UnknownField("lot_size".into()))
        );
        doc.scored_fields = Some(vec![]);
        assert_eq!(
            score_document(None, &[], &doc, tol()),
            Err(ScoringError::EmptyFieldSet)
        );
        doc.requirements.clear();
        assert_eq!(
            score_document(None, &[], &doc, tol()),
            Err(ScoringError::EmptyGroundTruth)
        );
    }
}
