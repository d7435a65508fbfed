//! Prompt experiments, their immutable test log, and ranking.
//!
//! Statistics are always recomputed from the full log. There are no
//! incremental counters.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::scoring::{DocumentScore, ZoneScore};

pub const DEFAULT_MODEL: &str = "grok-4-fast-reasoning";
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 8000;

/// One scored LLM run. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(default)]
    pub id: Option<i64>,
    pub prompt_id: i64,
    pub ground_truth_id: i64,
    pub epoch: u32,
    #[serde(default)]
    pub batch_id: Option<String>,
    pub raw_response: String,
    pub parsed_zones_count: u32,
    pub extraction_success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    pub overall_accuracy: f64,
    pub zone_accuracy: f64,
    pub field_accuracy: f64,
    pub location_accuracy: f64,
    #[serde(default)]
    pub per_field: BTreeMap<String, f64>,
    #[serde(default)]
    pub per_zone: Vec<ZoneScore>,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    /// RFC 3339, set by storage.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl TestResult {
    /// A run succeeds when it parsed at least one zone and did not error.
    pub fn is_success(&self) -> bool {
        self.extraction_success && self.parsed_zones_count > 0 && self.error_message.is_none()
    }

    pub fn apply_score(&mut self, score: DocumentScore) {
        self.overall_accuracy = score.overall_accuracy;
        self.zone_accuracy = score.zone_accuracy;
        self.field_accuracy = score.field_accuracy;
        self.location_accuracy = score.location_accuracy;
        self.per_field = score.per_field;
        self.per_zone = score.per_zone;
    }
}

/// Aggregate statistics of one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptStats {
    pub total_tests: u32,
    pub successful_tests: u32,
    pub failed_tests: u32,
    pub avg_overall_accuracy: f64,
    pub avg_field_accuracy: f64,
    pub avg_zone_accuracy: f64,
}

impl PromptStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            f64::from(self.successful_tests) / f64::from(self.total_tests)
        }
    }
}

/// Recompute statistics from every result of one prompt. Failed runs count
/// towards the means with their zero scores.
pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> PromptStats {
    let mut stats = PromptStats::default();
    let (mut overall, mut field, mut zone) = (0.0, 0.0, 0.0);
    for r in results {
        stats.total_tests += 1;
        if r.is_success() {
            stats.successful_tests += 1;
        } else {
            stats.failed_tests += 1;
        }
        overall += r.overall_accuracy;
        field += r.field_accuracy;
        zone += r.zone_accuracy;
    }
    if stats.total_tests > 0 {
        let n = f64::from(stats.total_tests);
        stats.avg_overall_accuracy = overall / n;
        stats.avg_field_accuracy = field / n;
        stats.avg_zone_accuracy = zone / n;
    }
    stats
}

/// A named, versioned prompt configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExperiment {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub version: String,
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub is_baseline: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    pub is_active: bool,
    #[serde(default)]
    pub stats: PromptStats,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PromptExperiment {
    /// New active experiment with default model and sampling.
    pub fn new(name: &str, version: &str, text: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.chars().count() < 2 {
            return Err(ValidationError::PromptName(name.to_string()));
        }
        Ok(Self {
            id: None,
            name: name.to_string(),
            version: version.trim().to_string(),
            text: text.to_string(),
            model: DEFAULT_MODEL.to_string(),
            description: None,
            hypothesis: None,
            is_baseline: false,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            is_active: true,
            stats: PromptStats::default(),
            created_at: None,
        })
    }

    pub fn label(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingQuery {
    pub min_tests: u32,
    pub limit: Option<usize>,
    pub active_only: bool,
}

impl Default for RankingQuery {
    fn default() -> Self {
        Self {
            min_tests: 5,
            limit: Some(10),
            active_only: true,
        }
    }
}

fn by_rank(a: &PromptExperiment, b: &PromptExperiment) -> Ordering {
    b.stats
        .avg_overall_accuracy
        .total_cmp(&a.stats.avg_overall_accuracy)
        .then_with(|| b.stats.total_tests.cmp(&a.stats.total_tests))
        .then_with(|| a.name.cmp(&b.name))
}

/// Order prompts best first: mean overall accuracy, then test count. Prompts
/// with fewer than `min_tests` results are left out.
pub fn rank(prompts: Vec<PromptExperiment>, query: &RankingQuery) -> Vec<PromptExperiment> {
    let mut ranked: Vec<_> = prompts
        .into_iter()
        .filter(|p| p.stats.total_tests >= query.min_tests)
        .filter(|p| !query.active_only || p.is_active)
        .collect();
    ranked.sort_by(by_rank);
    if let Some(limit) = query.limit {
        ranked.truncate(limit);
    }
    ranked
}
