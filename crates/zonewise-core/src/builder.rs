//! Assemble one requirement record per zone.
//!
//! A raw zone runs through: identity validation, normalisation of every
//! canonical field, contamination repair of lot areas, then the fallback
//! chain. Failures of individual fields are warnings; only identity and
//! metadata problems fail the zone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::contamination::{AppliedCorrection, ContaminationCorrector, Correction};
use crate::error::{CorrectionAmbiguity, NormalizationWarning, NormalizeError, ValidationError};
use crate::fallback::{self, Fill};
use crate::fields::{Field, FieldKind, FieldValues};
use crate::normalize::{RawValue, normalize};
use crate::record::{Jurisdiction, RequirementRecord};
use crate::zone::{Footnote, ZoneCode};

/// Jurisdiction strings as extracted from the document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawJurisdiction {
    pub town: String,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl RawJurisdiction {
    /// Case-insensitive, trimmed comparison with `other`. Nothing is
    /// validated: a spelled-out state ("New Jersey") simply fails to match
    /// "NJ". A missing county equals an empty one.
    pub fn matches(&self, other: &Jurisdiction) -> bool {
        fn same(a: &str, b: &str) -> bool {
            a.trim().eq_ignore_ascii_case(b.trim())
        }
        same(&self.town, &other.town)
            && same(
                self.county.as_deref().unwrap_or(""),
                other.county.as_deref().unwrap_or(""),
            )
            && same(self.state.as_deref().unwrap_or(""), &other.state)
    }
}

/// One zone as parsed out of the model response, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawZone {
    pub zone: String,
    /// Footnote marker reported separately from the code.
    #[serde(default)]
    pub footnote: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, RawValue>,
}

impl RawZone {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<RawValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractedDocument {
    pub jurisdiction: RawJurisdiction,
    #[serde(default)]
    pub zones: Vec<RawZone>,
    #[serde(default)]
    pub extraction_confidence: Option<f64>,
    #[serde(default)]
    pub data_source: Option<String>,
}

/// What happened to one zone on its way to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneReport {
    #[serde(serialize_with = "serialize_display")]
    pub warnings: Vec<NormalizationWarning>,
    pub corrections: Vec<AppliedCorrection>,
    #[serde(serialize_with = "serialize_display")]
    pub ambiguities: Vec<CorrectionAmbiguity>,
    pub fills: Vec<Fill>,
    pub confidence_capped: bool,
}

impl ZoneReport {
    pub fn extend(&mut self, other: ZoneReport) {
        self.warnings.extend(other.warnings);
        self.corrections.extend(other.corrections);
        self.ambiguities.extend(other.ambiguities);
        self.fills.extend(other.fills);
        self.confidence_capped |= other.confidence_capped;
    }
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(
    items: &[T],
    ser: S,
) -> Result<S::Ok, S::Error> {
    ser.collect_seq(items.iter().map(ToString::to_string))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltZone {
    pub record: RequirementRecord,
    /// Footnote found on the raw code, if any.
    pub footnote: Option<Footnote>,
    pub report: ZoneReport,
}

/// Builds records with one configuration. Holds no mutable state and can be
/// shared between concurrent document runs.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    config: PipelineConfig,
    corrector: ContaminationCorrector,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl RecordBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        let corrector = config.corrector();
        Self { config, corrector }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// `raw` with a missing or blank state replaced by the configured default.
    pub fn with_default_state(&self, mut raw: RawJurisdiction) -> RawJurisdiction {
        if raw.state.as_deref().is_none_or(|s| s.trim().is_empty()) {
            raw.state = Some(self.config.default_state.clone());
        }
        raw
    }

    /// Validate the document's jurisdiction, defaulting a missing state.
    pub fn jurisdiction(&self, raw: &RawJurisdiction) -> Result<Jurisdiction, ValidationError> {
        let state = raw
            .state
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.config.default_state);
        Jurisdiction::new(&raw.town, raw.county.as_deref(), state)
    }

    /// Build the record for one zone.
    ///
    /// `confidence` outside [0, 1] is an error, never clamped. `None` takes
    /// the configured default, as does a missing `data_source`.
    pub fn build(
        &self,
        jurisdiction: &Jurisdiction,
        raw: &RawZone,
        confidence: Option<f64>,
        data_source: Option<&str>,
    ) -> Result<BuiltZone, ValidationError> {
        let zone = ZoneCode::parse(&raw.zone)
            .with_footnote(raw.footnote.as_deref().and_then(Footnote::new));
        if zone.is_empty() {
            return Err(ValidationError::MissingZone);
        }
        let confidence = confidence.unwrap_or(self.config.default_confidence);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }

        let mut report = ZoneReport::default();
        let mut values = FieldValues::default();
        let mut side_yards = Vec::new();

        for (key, token) in &raw.fields {
            let field = Field::from_name(key);
            let kind = match field {
                Some(f) => f.kind(),
                None if is_side_yard_alias(key) => FieldKind::LinearFeet,
                None => {
                    if !matches!(token, RawValue::Null) {
                        report.warnings.push(self.warning(&zone, key, token, NormalizeError::UnknownField));
                    }
                    continue;
                }
            };
            let value = match normalize(token, kind) {
                Ok(v) => v,
                Err(reason) => {
                    report.warnings.push(self.warning(&zone, key, token, reason));
                    None
                }
            };
            match (field, value) {
                (Some(f), v) => values.set(f, v),
                (None, Some(v)) => side_yards.push(v),
                (None, None) => {}
            }
        }

        for field in Field::ALL.iter().copied().filter(|f| f.is_lot_area()) {
            let Some(value) = values.get(field) else {
                continue;
            };
            match self.corrector.correct(field, value, &zone) {
                Correction::Unchanged => {}
                Correction::Corrected(applied) => {
                    values.set(field, Some(applied.to));
                    report.corrections.push(applied);
                }
                Correction::Ambiguous(amb) => report.ambiguities.push(amb),
            }
        }

        report.fills = fallback::resolve(&mut values, &side_yards);

        let mut confidence = confidence;
        if !report.ambiguities.is_empty() && confidence > self.config.ambiguity_confidence_ceiling {
            confidence = self.config.ambiguity_confidence_ceiling;
            report.confidence_capped = true;
            debug!(zone = %zone, confidence, "confidence capped after contamination ambiguity");
        }

        let data_source = data_source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.config.default_data_source);

        Ok(BuiltZone {
            record: RequirementRecord {
                jurisdiction: jurisdiction.clone(),
                zone: zone.code().to_string(),
                data_source: data_source.to_string(),
                extraction_confidence: confidence,
                fields: values,
            },
            footnote: zone.footnote().cloned(),
            report,
        })
    }

    fn warning(
        &self,
        zone: &ZoneCode,
        key: &str,
        token: &RawValue,
        reason: NormalizeError,
    ) -> NormalizationWarning {
        warn!(zone = %zone, field = key, raw = %token, reason = %reason, "field value rejected");
        NormalizationWarning {
            field: key.to_string(),
            raw: token.to_string(),
            reason,
        }
    }
}

/// Non-canonical keys that carry a single "each side" side-yard figure.
fn is_side_yard_alias(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("side_yard")
        && !["street", "accessory", "combined", "total", "aggregate", "both"]
            .iter()
            .any(|w| key.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contamination::CorrectionRule;

    fn linwood() -> Jurisdiction {
        Jurisdiction::new("Linwood", None, "NJ").unwrap()
    }

    #[test]
    fn linwood_r20_end_to_end() {
        let builder = RecordBuilder::default();
        let raw = RawZone::new("R-20¹").with("interior_min_lot_area_sqft", "20,000");
        let built = builder.build(&linwood(), &raw, None, None).unwrap();

        assert_eq!(built.record.zone, "R-20");
        assert_eq!(built.record.jurisdiction.town, "Linwood");
        assert_eq!(built.record.fields.interior_min_lot_area_sqft, Some(20000.0));
        assert_eq!(built.record.data_source, "AI_Extracted");
        assert_eq!(built.record.extraction_confidence, 0.7);
        assert_eq!(built.footnote, Footnote::new("1"));
        assert!(built.report.corrections.is_empty());
    }

    #[test]
    fn raw_location_matching_skips_validation() {
        let builder = RecordBuilder::default();
        let reported = |town: &str, state: Option<&str>| {
            builder.with_default_state(RawJurisdiction {
                town: town.into(),
                county: None,
                state: state.map(str::to_string),
            })
        };
        assert!(reported(" linwood ", None).matches(&linwood()));
        assert!(reported("Linwood", Some("nj")).matches(&linwood()));
        assert!(!reported("Linwood", Some("New Jersey")).matches(&linwood()));
        assert!(!reported("Somers Point", Some("New Jersey")).matches(&linwood()));
        assert!(!reported("", Some("NJ")).matches(&linwood()));
    }

    #[test]
    fn footnoted_zone_keeps_area_it_is_named_for() {
        let builder = RecordBuilder::default();
        for (zone, area, expected) in [
            ("R-12¹", "12,000", 12000.0),
            ("R-15¹", "15,000", 15000.0),
            ("R-20¹", "20,000", 20000.0),
        ] {
            let raw = RawZone::new(zone).with("interior_min_lot_area_sqft", area);
            let built = builder.build(&linwood(), &raw, None, None).unwrap();
            assert_eq!(
                built.record.fields.interior_min_lot_area_sqft,
                Some(expected),
                "{zone}"
            );
            assert!(built.report.corrections.is_empty(), "{zone}");
        }
    }

    #[test]
    fn contaminated_area_is_repaired_then_filled() {
        let builder = RecordBuilder::default();
        let raw = RawZone::new("R-1¹")
            .with("interior_min_lot_area_sqft", 15000.0)
            .with("interior_min_lot_frontage_ft", "80 ft")
            .with("principal_front_yard_ft", 25.0);
        let built = builder.build(&linwood(), &raw, Some(0.9), Some("Manual")).unwrap();
        let f = &built.record.fields;

        assert_eq!(f.interior_min_lot_area_sqft, Some(5000.0));
        assert_eq!(f.interior_min_lot_width_ft, Some(80.0));
        assert_eq!(f.interior_min_lot_depth_ft, Some(80.0));
        assert_eq!(f.accessory_front_yard_ft, Some(25.0));
        assert_eq!(built.report.corrections.len(), 1);
        assert!(matches!(
            built.report.corrections[0].rule,
            CorrectionRule::FootnoteDigit { .. }
        ));
        assert_eq!(built.record.data_source, "Manual");
        assert_eq!(built.record.extraction_confidence, 0.9);
    }

    #[test]
    fn ambiguity_caps_confidence() {
        let builder = RecordBuilder::default();
        let raw = RawZone::new("R-A").with("interior_min_lot_area_sqft", 15000.0);
        let built = builder.build(&linwood(), &raw, Some(0.95), None).unwrap();
        assert_eq!(built.record.fields.interior_min_lot_area_sqft, Some(15000.0));
        assert_eq!(built.report.ambiguities.len(), 1);
        assert!(built.report.confidence_capped);
        assert_eq!(built.record.extraction_confidence, 0.7);

        // Already below the ceiling: left alone.
        let built = builder.build(&linwood(), &raw, Some(0.4), None).unwrap();
        assert_eq!(built.record.extraction_confidence, 0.4);
        assert!(!built.report.confidence_capped);
    }

    #[test]
    fn bad_tokens_become_warnings() {
        let builder = RecordBuilder::default();
        let raw = RawZone::new("B-2")
            .with("max_lot_coverage_percent", "130%")
            .with("max_height_stories", "2½")
            .with("principal_rear_yard_ft", "20-30")
            .with("parking_spaces", "2 per unit")
            .with("maximum_far", RawValue::Null);
        let built = builder.build(&linwood(), &raw, None, None).unwrap();

        assert_eq!(built.record.fields.max_height_stories, Some(2.5));
        assert_eq!(built.record.fields.max_lot_coverage_percent, None);
        assert_eq!(built.record.fields.principal_rear_yard_ft, None);
        let fields: Vec<_> = built.report.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(
            fields,
            ["max_lot_coverage_percent", "parking_spaces", "principal_rear_yard_ft"]
        );
        assert_eq!(built.report.warnings[1].reason, NormalizeError::UnknownField);
    }

    #[test]
    fn side_yard_alias_fills_principal_and_accessory() {
        let builder = RecordBuilder::default();
        let raw = RawZone::new("R-1").with("side_yard_each_side_ft", "10 ft");
        let built = builder.build(&linwood(), &raw, None, None).unwrap();
        assert_eq!(built.record.fields.principal_side_yard_ft, Some(10.0));
        assert_eq!(built.record.fields.accessory_side_yard_ft, Some(10.0));
        assert!(built.report.warnings.is_empty());

        let raw = RawZone::new("R-1").with("combined_side_yards_ft", 25.0);
        let built = builder.build(&linwood(), &raw, None, None).unwrap();
        assert_eq!(built.record.fields.principal_side_yard_ft, None);
    }

    #[test]
    fn identity_and_confidence_validated() {
        let builder = RecordBuilder::default();
        assert_eq!(
            builder.build(&linwood(), &RawZone::new("  "), None, None),
            Err(ValidationError::MissingZone)
        );
        assert_eq!(
            builder.build(&linwood(), &RawZone::new("R-1"), Some(1.2), None),
            Err(ValidationError::ConfidenceOutOfRange(1.2))
        );
        assert!(matches!(
            builder.build(&linwood(), &RawZone::new("R-1"), Some(f64::NAN), None),
            Err(ValidationError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn missing_state_defaults() {
        let builder = RecordBuilder::default();
        let j = builder
            .jurisdiction(&RawJurisdiction {
                town: "Linwood".into(),
                county: Some("Atlantic".into()),
                state: None,
            })
            .unwrap();
        assert_eq!(j.state, "NJ");
        assert_eq!(
            builder.jurisdiction(&RawJurisdiction::default()),
            Err(ValidationError::MissingTown)
        );
    }

    #[test]
    fn separate_footnote_field_used() {
        let builder = RecordBuilder::default();
        let mut raw = RawZone::new("R-2").with("interior_min_lot_area_sqft", 28000.0);
        raw.footnote = Some("2".into());
        let built = builder.build(&linwood(), &raw, None, None).unwrap();
        assert_eq!(built.record.fields.interior_min_lot_area_sqft, Some(8000.0));
    }

    #[test]
    fn fully_specified_zone_round_trips_through_names() {
        let builder = RecordBuilder::default();
        let mut raw = RawZone::new("R-3");
        for (i, field) in Field::ALL.iter().enumerate() {
            let value = match field.kind() {
                FieldKind::Percent => 30.0,
                FieldKind::Stories => 2.5,
                _ => 10.0 + i as f64,
            };
            raw = raw.with(field.name(), value);
        }
        let built = builder.build(&linwood(), &raw, None, None).unwrap();
        assert!(built.report.fills.is_empty());
        for field in Field::ALL {
            let expected = match &raw.fields[field.name()] {
                RawValue::Number(n) => *n,
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(built.record.fields.get(*field), Some(expected), "{field}");
        }
    }
}
