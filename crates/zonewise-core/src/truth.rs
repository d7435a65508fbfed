//! Human-verified reference documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fields::FieldValues;
use crate::record::{Jurisdiction, RequirementRecord};
use crate::zone::ZoneCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown complexity `{other}` (simple, medium, complex)")),
        }
    }
}

/// One authoritative zone record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRequirement {
    pub zone: String,
    #[serde(default)]
    pub zone_description: Option<String>,
    #[serde(flatten)]
    pub fields: FieldValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthDocument {
    /// Assigned by storage.
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(flatten)]
    pub jurisdiction: Jurisdiction,
    #[serde(default)]
    pub verified_by: Option<String>,
    pub expected_zone_count: u32,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub notes: Option<String>,
    /// Restrict scoring to these canonical field names. `None` scores all.
    #[serde(default)]
    pub scored_fields: Option<Vec<String>>,
    #[serde(default)]
    pub requirements: Vec<GroundTruthRequirement>,
}

impl GroundTruthDocument {
    /// Zones actually entered, as opposed to `expected_zone_count`.
    pub fn verified_zone_count(&self) -> usize {
        self.requirements.len()
    }

    /// Requirements as plain records, zone codes footnote-stripped.
    pub fn records(&self) -> Vec<RequirementRecord> {
        self.requirements
            .iter()
            .map(|r| RequirementRecord {
                jurisdiction: self.jurisdiction.clone(),
                zone: ZoneCode::parse(&r.zone).code().to_string(),
                data_source: "ground_truth".into(),
                extraction_confidence: 1.0,
                fields: r.fields.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_json() {
        let doc: GroundTruthDocument = serde_json::from_str(
            r#"{
                "name": "Linwood Schedule",
                "town": "Linwood",
                "state": "NJ",
                "expected_zone_count": 2,
                "complexity": "simple",
                "requirements": [
                    {"zone": "R-20¹", "interior_min_lot_area_sqft": 20000},
                    {"zone": "C-1", "zone_description": "Commercial", "max_height_feet_total": 35}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.complexity, Complexity::Simple);
        assert_eq!(doc.jurisdiction.county, None);
        assert_eq!(doc.verified_zone_count(), 2);

        let recs = doc.records();
        assert_eq!(recs[0].zone, "R-20");
        assert_eq!(recs[0].fields.interior_min_lot_area_sqft, Some(20000.0));
        assert_eq!(recs[1].fields.max_height_feet_total, Some(35.0));
    }

    #[test]
    fn complexity_from_str() {
        assert_eq!("Complex".parse::<Complexity>(), Ok(Complexity::Complex));
        assert!("hard".parse::<Complexity>().is_err());
    }
}
