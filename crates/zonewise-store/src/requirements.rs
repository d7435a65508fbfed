//! `requirements` table: upsert with the field-level merge policy, lookups.

use arrow::record_batch::RecordBatch;
use duckdb::types::Value;
use duckdb::{Connection, params_from_iter};
use tracing::info;
use zonewise_core::{Field, Jurisdiction, RecordKey, RequirementRecord, merge};

use crate::StoreError;
use crate::columns::{f64_or_zero, field_column_list, field_values, opt_string, string};
use crate::duck::{DuckStore, now};

/// Filter for requirement listings. `None` matches anything; text matches
/// ignore case.
#[derive(Debug, Clone, Default)]
pub struct RequirementQuery {
    pub town: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
}

impl RequirementQuery {
    pub fn jurisdiction(j: &Jurisdiction) -> Self {
        Self {
            town: Some(j.town.clone()),
            county: j.county.clone(),
            state: Some(j.state.clone()),
        }
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for (column, value) in [
            ("town", &self.town),
            ("county", &self.county),
            ("state", &self.state),
        ] {
            if let Some(v) = value {
                clauses.push(format!("lower({column}) = lower(?)"));
                params.push(Value::Text(v.trim().to_string()));
            }
        }
        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

fn select_sql() -> String {
    format!(
        "SELECT town, county, state, zone, data_source, extraction_confidence, {} FROM requirements",
        field_column_list()
    )
}

fn key_params(key: &RecordKey) -> Vec<Value> {
    vec![
        Value::Text(key.town.clone()),
        Value::Text(key.county.clone().unwrap_or_default()),
        Value::Text(key.state.clone()),
        Value::Text(key.zone.clone()),
    ]
}

fn select_by_key(conn: &Connection, key: &RecordKey) -> Result<Option<RequirementRecord>, StoreError> {
    let sql = format!("{} WHERE town = ? AND county = ? AND state = ? AND zone = ?", select_sql());
    let mut stmt = conn.prepare(&sql)?;
    let batches: Vec<RecordBatch> = stmt.query_arrow(params_from_iter(key_params(key)))?.collect();
    Ok(records_from_batches(&batches)?.into_iter().next())
}

fn write(conn: &Connection, record: &RequirementRecord) -> Result<(), StoreError> {
    let names = field_column_list();
    let placeholders = vec!["?"; Field::ALL.len()].join(", ");
    let updates = Field::ALL
        .iter()
        .map(|f| format!("{0} = excluded.{0}", f.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO requirements (town, county, state, zone, data_source, extraction_confidence, \
         {names}, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, {placeholders}, ?, ?)
         ON CONFLICT (town, county, state, zone) DO UPDATE SET
         data_source = excluded.data_source,
         extraction_confidence = excluded.extraction_confidence,
         {updates},
         updated_at = excluded.updated_at"
    );
    let mut params = key_params(&record.key());
    params.push(Value::Text(record.data_source.clone()));
    params.push(Value::Double(record.extraction_confidence));
    params.extend(
        Field::ALL
            .iter()
            .map(|&f| record.fields.get(f).map_or(Value::Null, Value::Double)),
    );
    let ts = now();
    params.push(Value::Text(ts.clone()));
    params.push(Value::Text(ts));
    conn.execute(&sql, params_from_iter(params))?;
    Ok(())
}

/// Convert `requirements` rows back into records.
pub(crate) fn records_from_batches(batches: &[RecordBatch]) -> Result<Vec<RequirementRecord>, StoreError> {
    let mut out = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            let county = opt_string(batch, "county", row)?.filter(|c| !c.is_empty());
            out.push(RequirementRecord {
                jurisdiction: Jurisdiction {
                    town: string(batch, "town", row)?,
                    county,
                    state: string(batch, "state", row)?,
                },
                zone: string(batch, "zone", row)?,
                data_source: string(batch, "data_source", row)?,
                extraction_confidence: f64_or_zero(batch, "extraction_confidence", row)?,
                fields: field_values(batch, row)?,
            });
        }
    }
    Ok(out)
}

impl DuckStore {
    /// Insert a record, or merge it into the stored record with the same key.
    ///
    /// Read, merge and write happen in one transaction so two extractions of
    /// the same zone cannot interleave field by field. Returns the stored
    /// record.
    pub fn upsert_requirement(&self, record: &RequirementRecord) -> Result<RequirementRecord, StoreError> {
        let key = record.key();
        let (stored, created) = self.in_transaction(|conn| {
            let existing = select_by_key(conn, &key)?;
            let created = existing.is_none();
            let stored = match existing {
                Some(existing) => merge(&existing, record)?,
                None => record.clone(),
            };
            write(conn, &stored)?;
            Ok((stored, created))
        })?;
        info!(
            key = %key,
            created,
            fields = stored.fields.present_count(),
            "requirement stored"
        );
        Ok(stored)
    }

    pub fn get_requirement(&self, key: &RecordKey) -> Result<RequirementRecord, StoreError> {
        select_by_key(self.connection(), key)?.ok_or_else(|| StoreError::NotFound {
            kind: "requirement",
            id: key.to_string(),
        })
    }

    /// Records matching `query`, ordered by jurisdiction then zone.
    pub fn requirements(&self, query: &RequirementQuery) -> Result<Vec<RequirementRecord>, StoreError> {
        let (clause, params) = query.where_clause();
        let sql = format!("{} {clause} ORDER BY state, county, town, zone", select_sql());
        let mut stmt = self.connection().prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow(params_from_iter(params))?.collect();
        records_from_batches(&batches)
    }

    /// Distinct zone codes matching `query`, sorted.
    pub fn distinct_zones(&self, query: &RequirementQuery) -> Result<Vec<String>, StoreError> {
        let (clause, params) = query.where_clause();
        let sql = format!("SELECT DISTINCT zone FROM requirements {clause} ORDER BY zone");
        let mut stmt = self.connection().prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow(params_from_iter(params))?.collect();
        let mut zones = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                zones.push(string(batch, "zone", row)?);
            }
        }
        Ok(zones)
    }
}
