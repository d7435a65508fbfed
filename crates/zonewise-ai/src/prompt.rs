//! Prompt templates.
//!
//! A template is plain text with `{text_content}`, `{municipality}`,
//! `{county}` and `{state}` placeholders. Any other braces are left alone,
//! so templates can show literal JSON.

use zonewise_core::RawJurisdiction;

/// Characters of document text handed to the model.
pub const DEFAULT_MAX_CHARS: usize = 10_000;

/// Echoed back for location parts the caller does not know.
const UNKNOWN_LOCATION: &str = "SEARCH_DOCUMENT";

pub const DEFAULT_PROMPT: &str = "\
You are an expert zoning analyst. Extract the dimensional requirements of every zoning \
district in the ordinance below.

Location: {municipality}, {county}, {state}
If a location part reads SEARCH_DOCUMENT, find it in the document text.

Find ALL districts (R-1, R-2, C-1, I-1, ...) in tables, headings and schedules. \
Keep footnote markers out of numbers: \"20,000¹\" is 20000 with footnote 1.

Respond ONLY with a JSON object. No markdown fences, no explanation:
{
  \"extracted_town\": \"town name from the document\",
  \"extracted_county\": \"county name from the document\",
  \"extraction_confidence\": 0.0 to 1.0,
  \"zoning_requirements\": [
    {
      \"zone_name\": \"R-1\",
      \"footnote\": null,
      \"interior_min_lot_area_sqft\": 8000,
      \"interior_min_lot_frontage_ft\": 75,
      \"interior_min_lot_width_ft\": 75,
      \"interior_min_lot_depth_ft\": 100,
      \"corner_min_lot_area_sqft\": null,
      \"corner_min_lot_frontage_ft\": null,
      \"corner_min_lot_width_ft\": null,
      \"corner_min_lot_depth_ft\": null,
      \"min_circle_diameter_ft\": null,
      \"buildable_lot_area_sqft\": null,
      \"principal_front_yard_ft\": 25,
      \"principal_side_yard_ft\": 10,
      \"principal_street_side_yard_ft\": null,
      \"principal_rear_yard_ft\": 30,
      \"principal_street_rear_yard_ft\": null,
      \"accessory_front_yard_ft\": null,
      \"accessory_side_yard_ft\": 5,
      \"accessory_street_side_yard_ft\": null,
      \"accessory_rear_yard_ft\": 5,
      \"accessory_street_rear_yard_ft\": null,
      \"max_building_coverage_percent\": 30,
      \"max_lot_coverage_percent\": 40,
      \"max_height_stories\": 2.5,
      \"max_height_feet_total\": 35,
      \"min_gross_floor_area_first_floor_sqft\": null,
      \"min_gross_floor_area_multistory_sqft\": null,
      \"max_gross_floor_area_all_structures_sqft\": null,
      \"maximum_far\": null,
      \"maximum_density_units_per_acre\": null
    }
  ]
}

Use null for anything the document does not state. Give ONE side yard value, not a pair. \
Convert fractional stories exactly: \"2½\" and \"two and one-half\" are 2.5.

Document text:
{text_content}";

/// Fill a template for one document. Text beyond `max_chars` characters is
/// cut off.
pub fn render(template: &str, text: &str, location: &RawJurisdiction, max_chars: usize) -> String {
    let known = |part: Option<&str>| {
        part.map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_LOCATION)
            .to_string()
    };
    template
        .replace("{municipality}", &known(Some(&location.town)))
        .replace("{county}", &known(location.county.as_deref()))
        .replace("{state}", &known(location.state.as_deref()))
        // Last, so placeholders inside the document text stay literal.
        .replace("{text_content}", truncate(text, max_chars))
}

/// At most `max_chars` characters, cut on a char boundary.
fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(i, _)| &text[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linwood() -> RawJurisdiction {
        RawJurisdiction {
            town: "Linwood".into(),
            county: Some("Atlantic".into()),
            state: Some("NJ".into()),
        }
    }

    #[test]
    fn fills_every_placeholder() {
        let out = render(
            "{municipality} / {county} / {state}: {text_content}",
            "Schedule A",
            &linwood(),
            DEFAULT_MAX_CHARS,
        );
        assert_eq!(out, "Linwood / Atlantic / NJ: Schedule A");
    }

    #[test]
    fn unknown_parts_ask_the_model_to_search() {
        let out = render("{municipality}, {county}", "", &RawJurisdiction::default(), 10);
        assert_eq!(out, "SEARCH_DOCUMENT, SEARCH_DOCUMENT");
    }

    #[test]
    fn document_text_is_truncated_on_char_boundaries() {
        let out = render("{text_content}", "R-20¹ zone text", &linwood(), 5);
        assert_eq!(out, "R-20¹");
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn placeholders_in_document_text_stay_literal() {
        let out = render("{text_content} {state}", "see {county}", &linwood(), 100);
        assert_eq!(out, "see {county} NJ");
    }

    #[test]
    fn default_prompt_names_every_canonical_field() {
        for field in zonewise_core::Field::ALL {
            assert!(DEFAULT_PROMPT.contains(field.name()), "{}", field.name());
        }
        assert!(DEFAULT_PROMPT.contains("{text_content}"));
    }
}
