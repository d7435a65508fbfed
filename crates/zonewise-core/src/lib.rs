pub mod builder;
pub mod config;
pub mod contamination;
pub mod error;
pub mod fallback;
pub mod fields;
pub mod normalize;
pub mod pipeline;
pub mod ranking;
pub mod record;
pub mod schema;
pub mod scoring;
pub mod truth;
pub mod zone;

pub use builder::{BuiltZone, ExtractedDocument, RawJurisdiction, RawZone, RecordBuilder, ZoneReport};
pub use config::{PipelineConfig, ScoringConfig};
pub use contamination::{
    AppliedCorrection, ContaminationCorrector, Correction, CorrectionEntry, CorrectionPolicy,
    CorrectionRule, CorrectionTable,
};
pub use error::{
    ConfigError, CorrectionAmbiguity, NormalizationWarning, NormalizeError, ScoringError,
    ValidationError,
};
pub use fallback::{Fill, FillSource};
pub use fields::{Field, FieldGroup, FieldKind, FieldValues};
pub use normalize::{RawValue, normalize};
pub use pipeline::{DocumentOutcome, ZoneFailure, process_document};
pub use ranking::{PromptExperiment, PromptStats, RankingQuery, TestResult, aggregate, rank};
pub use record::{Jurisdiction, RecordKey, RequirementRecord, merge};
pub use scoring::{DocumentScore, RecordScore, Tolerance, score_document, score_field, score_record};
pub use truth::{Complexity, GroundTruthDocument, GroundTruthRequirement};
pub use zone::{Footnote, ZoneCode};
