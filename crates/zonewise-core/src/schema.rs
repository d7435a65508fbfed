//! Arrow schema of requirement records.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::fields::Field;
use crate::record::RequirementRecord;

/// Identity and metadata columns, in order. The canonical fields follow.
pub const IDENTITY_COLUMNS: [&str; 6] = [
    "town",
    "county",
    "state",
    "zone",
    "data_source",
    "extraction_confidence",
];

pub fn requirement_schema() -> Schema {
    let mut fields = vec![
        ArrowField::new("town", DataType::Utf8, false),
        ArrowField::new("county", DataType::Utf8, true),
        ArrowField::new("state", DataType::Utf8, false),
        ArrowField::new("zone", DataType::Utf8, false),
        ArrowField::new("data_source", DataType::Utf8, false),
        ArrowField::new("extraction_confidence", DataType::Float64, false),
    ];
    fields.extend(
        Field::ALL
            .iter()
            .map(|f| ArrowField::new(f.name(), DataType::Float64, true)),
    );
    Schema::new(fields)
}

pub fn to_record_batch(records: &[RequirementRecord]) -> Result<RecordBatch, ArrowError> {
    let schema: SchemaRef = Arc::new(requirement_schema());
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.jurisdiction.town.as_str()),
        )),
        Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| r.jurisdiction.county.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.jurisdiction.state.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.zone.as_str()))),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.data_source.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.extraction_confidence),
        )),
    ];
    for &field in Field::ALL {
        columns.push(Arc::new(Float64Array::from(
            records.iter().map(|r| r.fields.get(field)).collect::<Vec<_>>(),
        )));
    }
    RecordBatch::try_new(schema, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValues;
    use crate::record::Jurisdiction;
    use arrow::array::Array;

    #[test]
    fn schema_has_identity_then_fields() {
        let schema = requirement_schema();
        assert_eq!(schema.fields().len(), IDENTITY_COLUMNS.len() + Field::ALL.len());
        assert_eq!(schema.field(0).name(), "town");
        assert!(schema.field_with_name("county").unwrap().is_nullable());
        assert!(schema.field_with_name("maximum_density_units_per_acre").is_ok());
    }

    #[test]
    fn batch_preserves_nulls() {
        let rec = RequirementRecord {
            jurisdiction: Jurisdiction::new("Linwood", None, "NJ").unwrap(),
            zone: "R-20".into(),
            data_source: "AI_Extracted".into(),
            extraction_confidence: 0.7,
            fields: FieldValues {
                interior_min_lot_area_sqft: Some(20000.0),
                ..Default::default()
            },
        };
        let batch = to_record_batch(&[rec]).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column_by_name("county").unwrap().is_null(0));
        let area = batch
            .column_by_name("interior_min_lot_area_sqft")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(area.value(0), 20000.0);
        assert!(batch.column_by_name("maximum_far").unwrap().is_null(0));
    }
}
