//! Ground-truth documents and their verified requirement rows.

use arrow::record_batch::RecordBatch;
use duckdb::params_from_iter;
use duckdb::types::Value;
use serde::Serialize;
use tracing::info;
use zonewise_core::{
    Complexity, Field, GroundTruthDocument, GroundTruthRequirement, Jurisdiction, ZoneCode,
};

use crate::StoreError;
use crate::columns::{field_column_list, field_values, i64_or_zero, opt_string, string};
use crate::duck::{DuckStore, now};

/// One line of the ground-truth listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundTruthSummary {
    pub id: i64,
    pub name: String,
    pub jurisdiction: Jurisdiction,
    pub complexity: Complexity,
    pub expected_zone_count: u32,
    pub verified_zone_count: u32,
    pub verified_by: Option<String>,
    pub created_at: String,
}

fn text(v: &Option<String>) -> Value {
    v.as_ref().map_or(Value::Null, |s| Value::Text(s.clone()))
}

fn complexity(batch: &RecordBatch, row: usize) -> Result<Complexity, StoreError> {
    string(batch, "complexity", row)?
        .parse()
        .map_err(|_| StoreError::Column("complexity".into()))
}

fn jurisdiction(batch: &RecordBatch, row: usize) -> Result<Jurisdiction, StoreError> {
    Ok(Jurisdiction {
        town: string(batch, "town", row)?,
        county: opt_string(batch, "county", row)?,
        state: string(batch, "state", row)?,
    })
}

impl DuckStore {
    /// Store a document with all its requirement rows. Returns the new id.
    ///
    /// Zone codes are stored footnote-stripped; two rows for the same zone
    /// fail the whole insert.
    pub fn create_ground_truth(&self, doc: &GroundTruthDocument) -> Result<i64, StoreError> {
        let scored_fields = doc
            .scored_fields
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let id = self.in_transaction(|conn| {
            let id: i64 = conn.query_row(
                "INSERT INTO ground_truth_documents (name, original_filename, town, county, state,
                 verified_by, expected_zone_count, complexity, notes, scored_fields, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                params_from_iter([
                    Value::Text(doc.name.trim().to_string()),
                    text(&doc.original_filename),
                    Value::Text(doc.jurisdiction.town.clone()),
                    text(&doc.jurisdiction.county),
                    Value::Text(doc.jurisdiction.state.clone()),
                    text(&doc.verified_by),
                    Value::BigInt(i64::from(doc.expected_zone_count)),
                    Value::Text(doc.complexity.as_str().to_string()),
                    text(&doc.notes),
                    text(&scored_fields),
                    Value::Text(now()),
                ]),
                |row| row.get(0),
            )?;

            let placeholders = vec!["?"; Field::ALL.len()].join(", ");
            let sql = format!(
                "INSERT INTO ground_truth_requirements (document_id, zone, zone_description, {})
                 VALUES (?, ?, ?, {placeholders})",
                field_column_list()
            );
            for req in &doc.requirements {
                let mut params = vec![
                    Value::BigInt(id),
                    Value::Text(ZoneCode::parse(&req.zone).code().to_string()),
                    text(&req.zone_description),
                ];
                params.extend(
                    Field::ALL
                        .iter()
                        .map(|&f| req.fields.get(f).map_or(Value::Null, Value::Double)),
                );
                conn.execute(&sql, params_from_iter(params))?;
            }
            Ok(id)
        })?;
        info!(
            id,
            name = %doc.name,
            jurisdiction = %doc.jurisdiction,
            zones = doc.requirements.len(),
            "ground truth document stored"
        );
        Ok(id)
    }

    /// All documents with their verified zone counts, oldest first.
    pub fn list_ground_truth(&self) -> Result<Vec<GroundTruthSummary>, StoreError> {
        let batches = self.query_arrow(
            "SELECT d.*,
                (SELECT count(*) FROM ground_truth_requirements r
                 WHERE r.document_id = d.id)::BIGINT AS verified_zone_count
             FROM ground_truth_documents d
             ORDER BY d.id",
        )?;
        let mut out = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                out.push(GroundTruthSummary {
                    id: i64_or_zero(batch, "id", row)?,
                    name: string(batch, "name", row)?,
                    jurisdiction: jurisdiction(batch, row)?,
                    complexity: complexity(batch, row)?,
                    expected_zone_count: i64_or_zero(batch, "expected_zone_count", row)? as u32,
                    verified_zone_count: i64_or_zero(batch, "verified_zone_count", row)? as u32,
                    verified_by: opt_string(batch, "verified_by", row)?,
                    created_at: string(batch, "created_at", row)?,
                });
            }
        }
        Ok(out)
    }

    /// One document with its requirement rows ordered by zone.
    pub fn get_ground_truth(&self, id: i64) -> Result<GroundTruthDocument, StoreError> {
        let mut stmt = self
            .connection()
            .prepare("SELECT * FROM ground_truth_documents WHERE id = ?")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([id])?.collect();
        let batch = batches
            .iter()
            .find(|b| b.num_rows() > 0)
            .ok_or_else(|| StoreError::NotFound {
                kind: "ground truth document",
                id: id.to_string(),
            })?;

        let scored_fields = opt_string(batch, "scored_fields", 0)?
            .map(|s| serde_json::from_str::<Vec<String>>(&s))
            .transpose()?;

        let mut stmt = self.connection().prepare(
            "SELECT * FROM ground_truth_requirements WHERE document_id = ? ORDER BY zone",
        )?;
        let req_batches: Vec<RecordBatch> = stmt.query_arrow([id])?.collect();
        let mut requirements = Vec::new();
        for b in &req_batches {
            for row in 0..b.num_rows() {
                requirements.push(GroundTruthRequirement {
                    zone: string(b, "zone", row)?,
                    zone_description: opt_string(b, "zone_description", row)?,
                    fields: field_values(b, row)?,
                });
            }
        }

        Ok(GroundTruthDocument {
            id: Some(id),
            name: string(batch, "name", 0)?,
            original_filename: opt_string(batch, "original_filename", 0)?,
            jurisdiction: jurisdiction(batch, 0)?,
            verified_by: opt_string(batch, "verified_by", 0)?,
            expected_zone_count: i64_or_zero(batch, "expected_zone_count", 0)? as u32,
            complexity: complexity(batch, 0)?,
            notes: opt_string(batch, "notes", 0)?,
            scored_fields,
            requirements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonewise_core::FieldValues;

    fn doc() -> GroundTruthDocument {
        GroundTruthDocument {
            id: None,
            name: "Linwood Schedule A".into(),
            original_filename: Some("linwood.pdf".into()),
            jurisdiction: Jurisdiction::new("Linwood", Some("Atlantic"), "NJ").unwrap(),
            verified_by: Some("planner".into()),
            expected_zone_count: 3,
            complexity: Complexity::Medium,
            notes: None,
            scored_fields: Some(vec!["interior_min_lot_area_sqft".into()]),
            requirements: vec![
                GroundTruthRequirement {
                    zone: "R-20¹".into(),
                    zone_description: Some("Residential".into()),
                    fields: FieldValues {
                        interior_min_lot_area_sqft: Some(20000.0),
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
    fn create_and_get_round_trip() {
        let store = DuckStore::open().unwrap();
        let id = store.create_ground_truth(&doc()).unwrap();
        let back = store.get_ground_truth(id).unwrap();

        assert_eq!(back.id, Some(id));
        assert_eq!(back.jurisdiction, doc().jurisdiction);
        assert_eq!(back.scored_fields, doc().scored_fields);
        assert_eq!(back.requirements.len(), 2);
        assert_eq!(back.requirements[1].zone, "R-20");
        assert_eq!(
            back.requirements[1].fields.interior_min_lot_area_sqft,
            Some(20000.0)
        );
    }

    #[test]
    fn listing_reports_verified_counts() {
        let store = DuckStore::open().unwrap();
        store.create_ground_truth(&doc()).unwrap();
        let list = store.list_ground_truth().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].expected_zone_count, 3);
        assert_eq!(list[0].verified_zone_count, 2);
        assert_eq!(list[0].complexity, Complexity::Medium);
    }

    #[test]
    fn duplicate_zone_rolls_back_document() {
        let store = DuckStore::open().unwrap();
        let mut d = doc();
        d.requirements.push(d.requirements[0].clone());
        assert!(store.create_ground_truth(&d).is_err());
        assert_eq!(store.count_table("ground_truth_documents").unwrap(), 0);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = DuckStore::open().unwrap();
        assert!(matches!(
            store.get_ground_truth(42),
            Err(StoreError::NotFound { .. })
        ));
    }
}
