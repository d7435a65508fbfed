use thiserror::Error;

use crate::fields::Field;

/// A zone record could not be built. Aborts that zone only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("town is empty")]
    MissingTown,

    #[error("zone code is empty")]
    MissingZone,

    #[error("`{0}` is not a recognised two-letter state code")]
    InvalidState(String),

    #[error("extraction confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("cannot merge record for {incoming} into record for {existing}")]
    KeyMismatch { existing: String, incoming: String },

    #[error("prompt name {0:?} must be at least 2 characters")]
    PromptName(String),
}

/// Why a raw token was turned into null.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("not a number: {0:?}")]
    NotNumeric(String),

    #[error("range or list, refusing to pick a value: {0:?}")]
    Range(String),

    #[error("negative value {0}")]
    Negative(f64),

    #[error("non-finite value")]
    NonFinite,

    #[error("{value} is outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("unit {unit:?} does not fit this field")]
    UnexpectedUnit { unit: String },

    #[error("count must be a whole number, got {0}")]
    Fractional(f64),

    #[error("not a canonical field name")]
    UnknownField,
}

/// Non-fatal: a field token could not be parsed and the field became null.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {reason} (raw {raw})")]
pub struct NormalizationWarning {
    /// Canonical field name, or the raw key when it is not canonical.
    pub field: String,
    pub raw: String,
    pub reason: NormalizeError,
}

/// Non-fatal: a lot area looks contaminated but no confirmed pattern matched.
/// The value is left as-is and the record's confidence is capped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} = {value} may carry a footnote digit (suspected true value {suspected})")]
pub struct CorrectionAmbiguity {
    pub field: Field,
    pub value: f64,
    pub suspected: f64,
}

/// A single predicted-vs-truth comparison failed. Other comparisons in the
/// batch continue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("tolerance {0}% is outside (0, 100]")]
    InvalidTolerance(f64),

    #[error("no fields selected for comparison")]
    EmptyFieldSet,

    #[error("ground truth names unknown field `{0}`")]
    UnknownField(String),

    #[error("ground truth document has no requirement records")]
    EmptyGroundTruth,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
