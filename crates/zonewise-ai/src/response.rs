//! Raw model text to zone objects.
//!
//! Models wrap their JSON in prose or markdown fences, nest fields in
//! grouped sections, and drift between key spellings across prompt
//! versions. Everything here maps that variety onto flat zones keyed by
//! canonical field name; the values stay raw for the normaliser.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use zonewise_core::{ExtractedDocument, FieldGroup, RawJurisdiction, RawValue, RawZone};

use crate::ParseError;

/// Top-level keys that may hold the zone list, in lookup order.
const ZONE_LIST_KEYS: [&str; 4] = ["zones", "zoning_requirements", "requirements", "extracted_zones"];

const ZONE_NAME_KEYS: [&str; 2] = ["zone", "zone_name"];

/// Descriptive keys that carry no field value.
const ANNOTATION_KEYS: [&str; 3] = ["zone_description", "description", "notes"];

/// Older key spellings still produced by some prompts.
const ALIASES: [(&str, &str); 10] = [
    ("principal_min_front_yard_ft", "principal_front_yard_ft"),
    ("principal_min_side_yard_ft", "principal_side_yard_ft"),
    ("principal_min_rear_yard_ft", "principal_rear_yard_ft"),
    ("accessory_min_front_yard_ft", "accessory_front_yard_ft"),
    ("accessory_min_side_yard_ft", "accessory_side_yard_ft"),
    ("accessory_min_rear_yard_ft", "accessory_rear_yard_ft"),
    ("principal_max_height_feet", "max_height_feet_total"),
    ("max_height_feet", "max_height_feet_total"),
    ("principal_max_height_stories", "max_height_stories"),
    ("max_far", "maximum_far"),
];

/// Values prompts ask the model to echo when it should search the document.
const LOCATION_PLACEHOLDERS: [&str; 5] = [
    "EXTRACT_FROM_DOCUMENT",
    "SEARCH_DOCUMENT",
    "N/A",
    "unknown",
    "null",
];

/// What one model response contained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub zones: Vec<RawZone>,
    pub extraction_confidence: Option<f64>,
    pub extracted_town: Option<String>,
    pub extracted_county: Option<String>,
    pub extracted_state: Option<String>,
}

impl ParsedResponse {
    /// Location the model reported, when it named a town.
    pub fn extracted_jurisdiction(&self) -> Option<RawJurisdiction> {
        let town = self.extracted_town.clone()?;
        Some(RawJurisdiction {
            town,
            county: self.extracted_county.clone(),
            state: self.extracted_state.clone(),
        })
    }

    /// Input for the record pipeline. Each part of `known` that is present
    /// wins over what the model extracted.
    pub fn into_document(self, known: &RawJurisdiction) -> ExtractedDocument {
        let town = if known.town.trim().is_empty() {
            self.extracted_town.unwrap_or_default()
        } else {
            known.town.clone()
        };
        ExtractedDocument {
            jurisdiction: RawJurisdiction {
                town,
                county: known.county.clone().or(self.extracted_county),
                state: known.state.clone().or(self.extracted_state),
            },
            zones: self.zones,
            extraction_confidence: self.extraction_confidence,
            data_source: None,
        }
    }
}

/// Parse raw model text into zones.
///
/// A response with no recognisable zone list parses to zero zones; only a
/// missing or malformed JSON body is an error.
pub fn parse_response(text: &str) -> Result<ParsedResponse, ParseError> {
    let body = strip_fences(text).trim();
    let value: Value = if body.starts_with('[') {
        serde_json::from_str(body)?
    } else {
        serde_json::from_str(json_object(body).ok_or(ParseError::NoJsonObject)?)?
    };

    let parsed = match value {
        Value::Array(items) => ParsedResponse {
            zones: zones_from(&items),
            ..Default::default()
        },
        Value::Object(root) => from_object(&root),
        _ => return Err(ParseError::NoJsonObject),
    };
    if parsed.zones.is_empty() {
        warn!("model response contained no zones");
    } else {
        debug!(zones = parsed.zones.len(), "parsed model response");
    }
    Ok(parsed)
}

// ── Locating the JSON ──

/// Contents of the first markdown code fence, or the whole text.
fn strip_fences(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    // Skip the language tag.
    let after = after.find('\n').map_or(after, |nl| &after[nl + 1..]);
    after.find("```").map_or(after, |end| &after[..end])
}

/// From the first `{` to the last `}`.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ── Zone objects ──

fn from_object(root: &Map<String, Value>) -> ParsedResponse {
    let zones = match ZONE_LIST_KEYS
        .iter()
        .find_map(|k| root.get(*k).and_then(Value::as_array))
    {
        Some(items) => zones_from(items),
        None if ZONE_NAME_KEYS.iter().any(|k| root.contains_key(*k)) => vec![parse_zone(root)],
        None => Vec::new(),
    };
    ParsedResponse {
        zones,
        extraction_confidence: root.get("extraction_confidence").and_then(number),
        extracted_town: root.get("extracted_town").and_then(location),
        extracted_county: root.get("extracted_county").and_then(location),
        extracted_state: root.get("extracted_state").and_then(location),
    }
}

fn zones_from(items: &[Value]) -> Vec<RawZone> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(parse_zone(map)),
            other => {
                debug!(item = %other, "skipping non-object zone entry");
                None
            }
        })
        .collect()
}

fn parse_zone(map: &Map<String, Value>) -> RawZone {
    let name = ZONE_NAME_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(text))
        .unwrap_or_default();
    let mut zone = RawZone::new(name);

    for (key, value) in map {
        let key = key.as_str();
        if ZONE_NAME_KEYS.contains(&key) || ANNOTATION_KEYS.contains(&key) {
            continue;
        }
        if key == "footnote" {
            zone.footnote = text(value);
            continue;
        }
        match value {
            Value::Object(group) => match group_prefix(key) {
                Some(prefix) => {
                    for (k, v) in group {
                        insert(&mut zone, &format!("{prefix}{k}"), v);
                    }
                }
                None => debug!(key, "skipping unrecognised nested object"),
            },
            Value::Array(_) => debug!(key, "skipping array value"),
            _ => insert(&mut zone, key, value),
        }
    }
    zone
}

/// Prefix for keys inside a grouped response section.
fn group_prefix(key: &str) -> Option<&'static str> {
    FieldGroup::ALL
        .iter()
        .find(|g| g.response_key() == key)
        .map(|g| g.response_prefix())
}

fn canonical_key(key: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(key, |(_, canonical)| canonical)
}

/// A null never replaces a value already collected under the same key.
fn insert(zone: &mut RawZone, key: &str, value: &Value) {
    if value.is_object() || value.is_array() {
        debug!(key, "skipping nested value");
        return;
    }
    let key = canonical_key(key);
    if value.is_null() && zone.fields.get(key).is_some_and(|v| *v != RawValue::Null) {
        return;
    }
    zone.fields.insert(key.to_string(), RawValue::from(value.clone()));
}

// ── Scalars ──

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn location(value: &Value) -> Option<String> {
    text(value).filter(|s| !LOCATION_PLACEHOLDERS.iter().any(|p| p.eq_ignore_ascii_case(s)))
}
