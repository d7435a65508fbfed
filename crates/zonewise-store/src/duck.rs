//! DuckDB store for requirement records and the prompt-testing log.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use tracing::{info, warn};

use crate::StoreError;
use crate::columns::field_columns_ddl;

/// DuckDB store.
///
/// Tables:
///
/// - `requirements`: one row per (town, county, state, zone), upserted with
///   the field-level merge policy. A missing county is stored as `''` so the
///   primary key holds.
/// - `ground_truth_documents` / `ground_truth_requirements`: verified
///   reference data.
/// - `prompt_experiments`: prompt configurations plus statistics recomputed
///   from `test_results`.
/// - `test_results`: append-only log of scored runs.
///
/// Supports both in-memory and persistent (file-backed) modes. All methods
/// take `&self`; writes that must be atomic run inside an explicit
/// transaction on the single connection.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory database with the schema in place.
    pub fn open() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open or create a persistent database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.ensure_schema()?;
        info!(path = %path.display(), "opened zonewise database");
        Ok(store)
    }

    /// Create sequences and tables that do not exist yet.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let fields = field_columns_ddl();
        let sql = format!(
            "CREATE SEQUENCE IF NOT EXISTS ground_truth_id_seq START 1;
            CREATE SEQUENCE IF NOT EXISTS prompt_id_seq START 1;
            CREATE SEQUENCE IF NOT EXISTS test_result_id_seq START 1;

            CREATE TABLE IF NOT EXISTS requirements (
                town VARCHAR NOT NULL,
                county VARCHAR NOT NULL DEFAULT '',
                state VARCHAR NOT NULL,
                zone VARCHAR NOT NULL,
                data_source VARCHAR NOT NULL,
                extraction_confidence DOUBLE NOT NULL,
            {fields},
                created_at VARCHAR NOT NULL,
                updated_at VARCHAR NOT NULL,
                PRIMARY KEY (town, county, state, zone)
            );

            CREATE TABLE IF NOT EXISTS ground_truth_documents (
                id BIGINT PRIMARY KEY DEFAULT nextval('ground_truth_id_seq'),
                name VARCHAR NOT NULL,
                original_filename VARCHAR,
                town VARCHAR NOT NULL,
                county VARCHAR,
                state VARCHAR NOT NULL,
                verified_by VARCHAR,
                expected_zone_count INTEGER NOT NULL,
                complexity VARCHAR NOT NULL,
                notes VARCHAR,
                scored_fields VARCHAR,
                created_at VARCHAR NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ground_truth_requirements (
                document_id BIGINT NOT NULL,
                zone VARCHAR NOT NULL,
                zone_description VARCHAR,
            {fields},
                PRIMARY KEY (document_id, zone)
            );

            CREATE TABLE IF NOT EXISTS prompt_experiments (
                id BIGINT PRIMARY KEY DEFAULT nextval('prompt_id_seq'),
                name VARCHAR NOT NULL,
                version VARCHAR NOT NULL,
                text VARCHAR NOT NULL,
                model VARCHAR NOT NULL,
                description VARCHAR,
                hypothesis VARCHAR,
                is_baseline BOOLEAN NOT NULL DEFAULT false,
                temperature DOUBLE NOT NULL,
                max_tokens INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT true,
                total_tests INTEGER NOT NULL DEFAULT 0,
                successful_tests INTEGER NOT NULL DEFAULT 0,
                failed_tests INTEGER NOT NULL DEFAULT 0,
                avg_overall_accuracy DOUBLE NOT NULL DEFAULT 0,
                avg_field_accuracy DOUBLE NOT NULL DEFAULT 0,
                avg_zone_accuracy DOUBLE NOT NULL DEFAULT 0,
                created_at VARCHAR NOT NULL,
                UNIQUE (name, version)
            );

            CREATE TABLE IF NOT EXISTS test_results (
                id BIGINT PRIMARY KEY DEFAULT nextval('test_result_id_seq'),
                prompt_id BIGINT NOT NULL,
                ground_truth_id BIGINT NOT NULL,
                epoch INTEGER NOT NULL,
                batch_id VARCHAR,
                raw_response VARCHAR NOT NULL,
                parsed_zones_count INTEGER NOT NULL,
                extraction_success BOOLEAN NOT NULL,
                error_message VARCHAR,
                overall_accuracy DOUBLE NOT NULL,
                zone_accuracy DOUBLE NOT NULL,
                field_accuracy DOUBLE NOT NULL,
                location_accuracy DOUBLE NOT NULL,
                per_field VARCHAR NOT NULL,
                per_zone VARCHAR NOT NULL,
                processing_time_ms BIGINT NOT NULL,
                tokens_used BIGINT,
                created_at VARCHAR NOT NULL
            );"
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    // ── Counts ──

    /// Number of rows in `table`.
    pub fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let batches = self.query_arrow(&sql)?;
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Column("cnt".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── Transactions ──

    /// Run `f` between BEGIN and COMMIT; roll back if it fails.
    pub(crate) fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    // ── Export ──

    /// Write the `requirements` table to a Parquet file.
    pub fn export_parquet(&self, path: &Path) -> Result<usize, StoreError> {
        let target = path.display().to_string().replace('\'', "''");
        let sql = format!(
            "COPY (SELECT * FROM requirements ORDER BY state, county, town, zone) \
             TO '{target}' (FORMAT PARQUET)"
        );
        self.conn.execute_batch(&sql)?;
        let count = self.count_table("requirements")?;
        info!(count, path = %path.display(), "exported requirements to parquet");
        Ok(count)
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
