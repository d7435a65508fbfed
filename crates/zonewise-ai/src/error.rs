use thiserror::Error;
use zonewise_core::ScoringError;

#[derive(Error, Debug)]
pub enum LlmError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("completion has no content")]
    EmptyCompletion,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no JSON object in model response")]
    NoJsonObject,
    #[error("invalid JSON in model response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Problems that stop a test run before any epoch is attempted.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{0} has not been stored yet")]
    Unsaved(&'static str),
    #[error("ground truth cannot be scored: {0}")]
    Scoring(#[from] ScoringError),
}
