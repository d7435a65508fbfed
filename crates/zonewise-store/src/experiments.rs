//! Prompt experiments and the append-only test-result log.
//!
//! `prompt_experiments` statistics are derived data: every write to
//! `test_results` is followed by a full recompute from the log in the same
//! transaction.

use arrow::record_batch::RecordBatch;
use duckdb::types::Value;
use duckdb::{Connection, params_from_iter};
use tracing::info;
use zonewise_core::{
    PromptExperiment, PromptStats, RankingQuery, TestResult, ValidationError, aggregate, rank,
};

use crate::StoreError;
use crate::columns::{boolean, f64_or_zero, i64_or_zero, opt_i64, opt_string, string};
use crate::duck::{DuckStore, now};

fn text(v: &Option<String>) -> Value {
    v.as_ref().map_or(Value::Null, |s| Value::Text(s.clone()))
}

fn experiments_from_batches(batches: &[RecordBatch]) -> Result<Vec<PromptExperiment>, StoreError> {
    let mut out = Vec::new();
    for b in batches {
        for row in 0..b.num_rows() {
            out.push(PromptExperiment {
                id: opt_i64(b, "id", row)?,
                name: string(b, "name", row)?,
                version: string(b, "version", row)?,
                text: string(b, "text", row)?,
                model: string(b, "model", row)?,
                description: opt_string(b, "description", row)?,
                hypothesis: opt_string(b, "hypothesis", row)?,
                is_baseline: boolean(b, "is_baseline", row)?,
                temperature: f64_or_zero(b, "temperature", row)?,
                max_tokens: i64_or_zero(b, "max_tokens", row)? as u32,
                is_active: boolean(b, "is_active", row)?,
                stats: PromptStats {
                    total_tests: i64_or_zero(b, "total_tests", row)? as u32,
                    successful_tests: i64_or_zero(b, "successful_tests", row)? as u32,
                    failed_tests: i64_or_zero(b, "failed_tests", row)? as u32,
                    avg_overall_accuracy: f64_or_zero(b, "avg_overall_accuracy", row)?,
                    avg_field_accuracy: f64_or_zero(b, "avg_field_accuracy", row)?,
                    avg_zone_accuracy: f64_or_zero(b, "avg_zone_accuracy", row)?,
                },
                created_at: opt_string(b, "created_at", row)?,
            });
        }
    }
    Ok(out)
}

fn results_from_batches(batches: &[RecordBatch]) -> Result<Vec<TestResult>, StoreError> {
    let mut out = Vec::new();
    for b in batches {
        for row in 0..b.num_rows() {
            out.push(TestResult {
                id: opt_i64(b, "id", row)?,
                prompt_id: i64_or_zero(b, "prompt_id", row)?,
                ground_truth_id: i64_or_zero(b, "ground_truth_id", row)?,
                epoch: i64_or_zero(b, "epoch", row)? as u32,
                batch_id: opt_string(b, "batch_id", row)?,
                raw_response: string(b, "raw_response", row)?,
                parsed_zones_count: i64_or_zero(b, "parsed_zones_count", row)? as u32,
                extraction_success: boolean(b, "extraction_success", row)?,
                error_message: opt_string(b, "error_message", row)?,
                overall_accuracy: f64_or_zero(b, "overall_accuracy", row)?,
                zone_accuracy: f64_or_zero(b, "zone_accuracy", row)?,
                field_accuracy: f64_or_zero(b, "field_accuracy", row)?,
                location_accuracy: f64_or_zero(b, "location_accuracy", row)?,
                per_field: serde_json::from_str(&string(b, "per_field", row)?)?,
                per_zone: serde_json::from_str(&string(b, "per_zone", row)?)?,
                processing_time_ms: i64_or_zero(b, "processing_time_ms", row)? as u64,
                tokens_used: opt_i64(b, "tokens_used", row)?.map(|t| t as u64),
                created_at: opt_string(b, "created_at", row)?,
            });
        }
    }
    Ok(out)
}

fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool, StoreError> {
    let n: i64 = conn.query_row(
        &format!("SELECT count(*)::BIGINT FROM {table} WHERE id = ?"),
        [id],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn load_results(conn: &Connection, prompt_id: i64) -> Result<Vec<TestResult>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT * FROM test_results WHERE prompt_id = ? ORDER BY id")?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([prompt_id])?.collect();
    results_from_batches(&batches)
}

fn recompute(conn: &Connection, prompt_id: i64) -> Result<PromptStats, StoreError> {
    let results = load_results(conn, prompt_id)?;
    let stats = aggregate(&results);
    conn.execute(
        "UPDATE prompt_experiments SET total_tests = ?, successful_tests = ?, failed_tests = ?,
         avg_overall_accuracy = ?, avg_field_accuracy = ?, avg_zone_accuracy = ?
         WHERE id = ?",
        params_from_iter([
            Value::BigInt(i64::from(stats.total_tests)),
            Value::BigInt(i64::from(stats.successful_tests)),
            Value::BigInt(i64::from(stats.failed_tests)),
            Value::Double(stats.avg_overall_accuracy),
            Value::Double(stats.avg_field_accuracy),
            Value::Double(stats.avg_zone_accuracy),
            Value::BigInt(prompt_id),
        ]),
    )?;
    Ok(stats)
}

impl DuckStore {
    /// Store a new experiment. Returns its id. Name and version must be
    /// unique together.
    pub fn create_experiment(&self, exp: &PromptExperiment) -> Result<i64, StoreError> {
        let name = exp.name.trim();
        if name.chars().count() < 2 {
            return Err(ValidationError::PromptName(name.to_string()).into());
        }
        let id: i64 = self.connection().query_row(
            "INSERT INTO prompt_experiments (name, version, text, model, description, hypothesis,
             is_baseline, temperature, max_tokens, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            params_from_iter([
                Value::Text(name.to_string()),
                Value::Text(exp.version.clone()),
                Value::Text(exp.text.clone()),
                Value::Text(exp.model.clone()),
                text(&exp.description),
                text(&exp.hypothesis),
                Value::Boolean(exp.is_baseline),
                Value::Double(exp.temperature),
                Value::BigInt(i64::from(exp.max_tokens)),
                Value::Boolean(exp.is_active),
                Value::Text(now()),
            ]),
            |row| row.get(0),
        )?;
        info!(id, name, version = %exp.version, "prompt experiment created");
        Ok(id)
    }

    pub fn get_experiment(&self, id: i64) -> Result<PromptExperiment, StoreError> {
        let mut stmt = self
            .connection()
            .prepare("SELECT * FROM prompt_experiments WHERE id = ?")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([id])?.collect();
        experiments_from_batches(&batches)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound {
                kind: "prompt experiment",
                id: id.to_string(),
            })
    }

    pub fn list_experiments(&self, active_only: bool) -> Result<Vec<PromptExperiment>, StoreError> {
        let sql = if active_only {
            "SELECT * FROM prompt_experiments WHERE is_active ORDER BY id"
        } else {
            "SELECT * FROM prompt_experiments ORDER BY id"
        };
        experiments_from_batches(&self.query_arrow(sql)?)
    }

    /// Experiments are never deleted, only deactivated.
    pub fn set_experiment_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let changed = self.connection().execute(
            "UPDATE prompt_experiments SET is_active = ? WHERE id = ?",
            params_from_iter([Value::Boolean(active), Value::BigInt(id)]),
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "prompt experiment",
                id: id.to_string(),
            });
        }
        info!(id, active, "prompt experiment toggled");
        Ok(())
    }

    /// Append a scored run and recompute the prompt's statistics. Returns
    /// the new result id.
    pub fn record_test_result(&self, result: &TestResult) -> Result<i64, StoreError> {
        let per_field = serde_json::to_string(&result.per_field)?;
        let per_zone = serde_json::to_string(&result.per_zone)?;
        let (id, stats) = self.in_transaction(|conn| {
            if !exists(conn, "prompt_experiments", result.prompt_id)? {
                return Err(StoreError::NotFound {
                    kind: "prompt experiment",
                    id: result.prompt_id.to_string(),
                });
            }
            if !exists(conn, "ground_truth_documents", result.ground_truth_id)? {
                return Err(StoreError::NotFound {
                    kind: "ground truth document",
                    id: result.ground_truth_id.to_string(),
                });
            }
            let id: i64 = conn.query_row(
                "INSERT INTO test_results (prompt_id, ground_truth_id, epoch, batch_id,
                 raw_response, parsed_zones_count, extraction_success, error_message,
                 overall_accuracy, zone_accuracy, field_accuracy, location_accuracy,
                 per_field, per_zone, processing_time_ms, tokens_used, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                params_from_iter([
                    Value::BigInt(result.prompt_id),
                    Value::BigInt(result.ground_truth_id),
                    Value::BigInt(i64::from(result.epoch)),
                    text(&result.batch_id),
                    Value::Text(result.raw_response.clone()),
                    Value::BigInt(i64::from(result.parsed_zones_count)),
                    Value::Boolean(result.extraction_success),
                    text(&result.error_message),
                    Value::Double(result.overall_accuracy),
                    Value::Double(result.zone_accuracy),
                    Value::Double(result.field_accuracy),
                    Value::Double(result.location_accuracy),
                    Value::Text(per_field.clone()),
                    Value::Text(per_zone.clone()),
                    Value::BigInt(result.processing_time_ms as i64),
                    result.tokens_used.map_or(Value::Null, |t| Value::BigInt(t as i64)),
                    Value::Text(now()),
                ]),
                |row| row.get(0),
            )?;
            let stats = recompute(conn, result.prompt_id)?;
            Ok((id, stats))
        })?;
        info!(
            id,
            prompt_id = result.prompt_id,
            epoch = result.epoch,
            success = result.is_success(),
            overall = result.overall_accuracy,
            total_tests = stats.total_tests,
            "test result recorded"
        );
        Ok(id)
    }

    /// Every result of one prompt, oldest first.
    pub fn test_results_for_prompt(&self, prompt_id: i64) -> Result<Vec<TestResult>, StoreError> {
        load_results(self.connection(), prompt_id)
    }

    /// Recompute one prompt's statistics from the full log.
    pub fn refresh_prompt_stats(&self, prompt_id: i64) -> Result<PromptStats, StoreError> {
        self.in_transaction(|conn| recompute(conn, prompt_id))
    }

    /// Ranked prompts, best first.
    pub fn best_prompts(&self, query: &RankingQuery) -> Result<Vec<PromptExperiment>, StoreError> {
        Ok(rank(self.list_experiments(query.active_only)?, query))
    }
}
