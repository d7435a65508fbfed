use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("no results for query")]
    NoResults,

    #[error("column `{0}` missing or of unexpected type")]
    Column(String),

    #[error(transparent)]
    Core(#[from] zonewise_core::ValidationError),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
