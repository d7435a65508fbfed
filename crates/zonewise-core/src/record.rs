//! Jurisdictions, requirement records and the field-level merge policy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fields::FieldValues;

/// Two-letter codes accepted for `state`: the 50 states, DC and the
/// inhabited territories.
pub const STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC", "PR", "GU", "VI", "AS", "MP",
];

pub fn is_state_code(s: &str) -> bool {
    STATE_CODES.contains(&s)
}

/// (town, county, state). County is optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub town: String,
    #[serde(default)]
    pub county: Option<String>,
    pub state: String,
}

impl Jurisdiction {
    /// Trim, uppercase the state, map an empty county to `None`, and validate.
    pub fn new(town: &str, county: Option<&str>, state: &str) -> Result<Self, ValidationError> {
        let town = town.trim();
        if town.is_empty() {
            return Err(ValidationError::MissingTown);
        }
        let state = state.trim().to_ascii_uppercase();
        if !is_state_code(&state) {
            return Err(ValidationError::InvalidState(state));
        }
        let county = county
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Ok(Self {
            town: town.to_string(),
            county,
            state,
        })
    }

    /// Case-insensitive, trimmed comparison of all three parts. A missing
    /// county equals an empty one.
    pub fn matches(&self, other: &Jurisdiction) -> bool {
        fn same(a: &str, b: &str) -> bool {
            a.trim().eq_ignore_ascii_case(b.trim())
        }
        same(&self.town, &other.town)
            && same(
                self.county.as_deref().unwrap_or(""),
                other.county.as_deref().unwrap_or(""),
            )
            && same(&self.state, &other.state)
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.county {
            Some(county) => write!(f, "{}, {}, {}", self.town, county, self.state),
            None => write!(f, "{}, {}", self.town, self.state),
        }
    }
}

/// Upsert key: unique per (town, county, state, zone).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub town: String,
    pub county: Option<String>,
    pub state: String,
    pub zone: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.state,
            self.county.as_deref().unwrap_or("-"),
            self.town,
            self.zone
        )
    }
}

/// One normalised requirement record per (jurisdiction, zone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRecord {
    #[serde(flatten)]
    pub jurisdiction: Jurisdiction,
    /// Footnote-stripped zone code.
    pub zone: String,
    pub data_source: String,
    /// In [0, 1].
    pub extraction_confidence: f64,
    #[serde(flatten)]
    pub fields: FieldValues,
}

impl RequirementRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            town: self.jurisdiction.town.clone(),
            county: self.jurisdiction.county.clone(),
            state: self.jurisdiction.state.clone(),
            zone: self.zone.clone(),
        }
    }
}

/// Merge an incoming extraction into the stored record for the same key.
///
/// Per field the incoming non-null value wins and a null keeps the existing
/// value; metadata (`data_source`, `extraction_confidence`) is always taken
/// from `incoming`. Storage must apply the result atomically per key.
pub fn merge(
    existing: &RequirementRecord,
    incoming: &RequirementRecord,
) -> Result<RequirementRecord, ValidationError> {
    let (a, b) = (existing.key(), incoming.key());
    if a != b {
        return Err(ValidationError::KeyMismatch {
            existing: a.to_string(),
            incoming: b.to_string(),
        });
    }
    Ok(merge_same_key(existing, incoming))
}

/// [`merge`] for records the caller has already matched by key.
pub(crate) fn merge_same_key(
    existing: &RequirementRecord,
    incoming: &RequirementRecord,
) -> RequirementRecord {
    RequirementRecord {
        jurisdiction: incoming.jurisdiction.clone(),
        zone: incoming.zone.clone(),
        data_source: incoming.data_source.clone(),
        extraction_confidence: incoming.extraction_confidence,
        fields: existing.fields.merged_with(&incoming.fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;

    fn record(zone: &str, fields: FieldValues) -> RequirementRecord {
        RequirementRecord {
            jurisdiction: Jurisdiction::new("Linwood", None, "NJ").unwrap(),
            zone: zone.into(),
            data_source: "AI_Extracted".into(),
            extraction_confidence: 0.8,
            fields,
        }
    }

    #[test]
    fn jurisdiction_normalised() {
        let j = Jurisdiction::new("  Linwood ", Some("  "), "nj").unwrap();
        assert_eq!(j.town, "Linwood");
        assert_eq!(j.county, None);
        assert_eq!(j.state, "NJ");
        assert_eq!(j.to_string(), "Linwood, NJ");
    }

    #[test]
    fn jurisdiction_rejects_bad_state_and_empty_town() {
        assert_eq!(
            Jurisdiction::new("Linwood", None, "New Jersey"),
            Err(ValidationError::InvalidState("NEW JERSEY".into()))
        );
        assert_eq!(
            Jurisdiction::new("   ", None, "NJ"),
            Err(ValidationError::MissingTown)
        );
    }

    #[test]
    fn jurisdiction_match_is_case_insensitive() {
        let a = Jurisdiction::new("Linwood", Some("Atlantic"), "NJ").unwrap();
        let mut b = a.clone();
        b.town = " LINWOOD".into();
        b.county = Some("atlantic ".into());
        assert!(a.matches(&b));
        b.county = None;
        assert!(!a.matches(&b));
    }

    #[test]
    fn merge_keeps_existing_when_incoming_null() {
        let existing = record(
            "R-1",
            FieldValues {
                principal_front_yard_ft: Some(25.0),
                ..Default::default()
            },
        );
        let mut incoming = record(
            "R-1",
            FieldValues {
                max_height_feet_total: Some(35.0),
                ..Default::default()
            },
        );
        incoming.extraction_confidence = 0.6;
        incoming.data_source = "Manual".into();

        let merged = merge(&existing, &incoming).unwrap();
        assert_eq!(merged.fields.principal_front_yard_ft, Some(25.0));
        assert_eq!(merged.fields.max_height_feet_total, Some(35.0));
        assert_eq!(merged.fields.present_count(), 2);
        assert_eq!(merged.extraction_confidence, 0.6);
        assert_eq!(merged.data_source, "Manual");
    }

    #[test]
    fn merge_rejects_different_keys() {
        let a = record("R-1", FieldValues::default());
        let b = record("R-2", FieldValues::default());
        assert!(matches!(merge(&a, &b), Err(ValidationError::KeyMismatch { .. })));
    }

    #[test]
    fn record_json_is_flat() {
        let mut fields = FieldValues::default();
        fields.set(Field::MaxHeightStories, Some(2.5));
        let rec = record("R-1", fields);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["town"], "Linwood");
        assert_eq!(json["zone"], "R-1");
        assert_eq!(json["max_height_stories"], 2.5);

        let back: RequirementRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }
}
