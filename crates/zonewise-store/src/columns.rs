//! Typed cell access on DuckDB Arrow batches.

use arrow::array::{
    Array, BooleanArray, Float64Array, Int32Array, Int64Array, LargeStringArray, StringArray,
};
use arrow::record_batch::RecordBatch;
use zonewise_core::{Field, FieldValues};

use crate::StoreError;

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn Array, StoreError> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| StoreError::Column(name.to_string()))
}

pub(crate) fn opt_string(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<String>, StoreError> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(None);
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|a| a.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|a| a.value(row).to_string())
        })
        .map(Some)
        .ok_or_else(|| StoreError::Column(name.to_string()))
}

pub(crate) fn string(batch: &RecordBatch, name: &str, row: usize) -> Result<String, StoreError> {
    opt_string(batch, name, row)?.ok_or_else(|| StoreError::Column(name.to_string()))
}

pub(crate) fn opt_f64(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<f64>, StoreError> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(None);
    }
    col.as_any()
        .downcast_ref::<Float64Array>()
        .map(|a| Some(a.value(row)))
        .ok_or_else(|| StoreError::Column(name.to_string()))
}

pub(crate) fn f64_or_zero(batch: &RecordBatch, name: &str, row: usize) -> Result<f64, StoreError> {
    Ok(opt_f64(batch, name, row)?.unwrap_or(0.0))
}

/// INTEGER and BIGINT columns.
pub(crate) fn opt_i64(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<i64>, StoreError> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(None);
    }
    col.as_any()
        .downcast_ref::<Int64Array>()
        .map(|a| a.value(row))
        .or_else(|| {
            col.as_any()
                .downcast_ref::<Int32Array>()
                .map(|a| i64::from(a.value(row)))
        })
        .map(Some)
        .ok_or_else(|| StoreError::Column(name.to_string()))
}

pub(crate) fn i64_or_zero(batch: &RecordBatch, name: &str, row: usize) -> Result<i64, StoreError> {
    Ok(opt_i64(batch, name, row)?.unwrap_or(0))
}

pub(crate) fn boolean(batch: &RecordBatch, name: &str, row: usize) -> Result<bool, StoreError> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(false);
    }
    col.as_any()
        .downcast_ref::<BooleanArray>()
        .map(|a| a.value(row))
        .ok_or_else(|| StoreError::Column(name.to_string()))
}

/// Every canonical field column of one row.
pub(crate) fn field_values(batch: &RecordBatch, row: usize) -> Result<FieldValues, StoreError> {
    let mut values = FieldValues::default();
    for &field in Field::ALL {
        values.set(field, opt_f64(batch, field.name(), row)?);
    }
    Ok(values)
}

/// `<field> DOUBLE` for every canonical field.
pub(crate) fn field_columns_ddl() -> String {
    Field::ALL
        .iter()
        .map(|f| format!("    {} DOUBLE", f.name()))
        .collect::<Vec<_>>()
        .join(",\n")
}

pub(crate) fn field_column_list() -> String {
    Field::ALL
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ")
}
