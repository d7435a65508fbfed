//! Storage layer: DuckDB tables for requirement records, ground truth,
//! prompt experiments and the test-result log.

mod error;
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod columns;
#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
mod experiments;
#[cfg(feature = "duckdb")]
mod ground_truth;
#[cfg(feature = "duckdb")]
mod requirements;

#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
#[cfg(feature = "duckdb")]
pub use ground_truth::GroundTruthSummary;
#[cfg(feature = "duckdb")]
pub use requirements::RequirementQuery;
