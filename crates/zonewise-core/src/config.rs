//! Pipeline and scoring configuration.
//!
//! Every key is optional; a missing key takes the default below. Loaded from
//! JSON so the correction table can grow without a rebuild.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::contamination::{ContaminationCorrector, CorrectionPolicy, CorrectionTable};
use crate::error::{ConfigError, ScoringError};
use crate::record::is_state_code;
use crate::scoring::Tolerance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// State used when the document carries none.
    pub default_state: String,
    pub default_data_source: String,
    /// Confidence used when the model reports none.
    pub default_confidence: f64,
    /// Records with any contamination ambiguity are capped at this confidence.
    pub ambiguity_confidence_ceiling: f64,
    pub correction: CorrectionPolicy,
    pub corrections: CorrectionTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_state: "NJ".into(),
            default_data_source: "AI_Extracted".into(),
            default_confidence: 0.7,
            ambiguity_confidence_ceiling: 0.7,
            correction: CorrectionPolicy::default(),
            corrections: CorrectionTable::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would produce out-of-range records or switch
    /// repair off without saying so.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let state = self.default_state.trim().to_ascii_uppercase();
        if !is_state_code(&state) {
            return Err(invalid("default_state", format!("{state:?} is not a state code")));
        }
        unit_interval("default_confidence", self.default_confidence)?;
        unit_interval("ambiguity_confidence_ceiling", self.ambiguity_confidence_ceiling)?;

        let p = &self.correction;
        for (key, v) in [
            ("correction.plausible_min", p.plausible_min),
            ("correction.plausible_max", p.plausible_max),
            ("correction.implausible_above", p.implausible_above),
            ("correction.heuristic_min", p.heuristic_min),
            ("correction.heuristic_max", p.heuristic_max),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(key, format!("{v} is not a non-negative number")));
            }
        }
        if p.plausible_min > p.plausible_max {
            return Err(invalid(
                "correction.plausible_min",
                format!("{} exceeds plausible_max {}", p.plausible_min, p.plausible_max),
            ));
        }
        if p.heuristic_min > p.heuristic_max {
            return Err(invalid(
                "correction.heuristic_min",
                format!("{} exceeds heuristic_max {}", p.heuristic_min, p.heuristic_max),
            ));
        }
        Ok(())
    }

    pub fn corrector(&self) -> ContaminationCorrector {
        ContaminationCorrector::new(self.correction.clone(), self.corrections.clone())
    }
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

fn unit_interval(key: &'static str, v: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(invalid(key, format!("{v} is outside [0, 1]")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Relative tolerance in percent.
    pub tolerance_percent: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: 5.0,
        }
    }
}

impl ScoringConfig {
    pub fn tolerance(&self) -> Result<Tolerance, ScoringError> {
        Tolerance::new(self.tolerance_percent)
    }
}
