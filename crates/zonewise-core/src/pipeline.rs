//! Run a whole extracted document through the record builder.
//!
//! Zones fail independently: a bad zone is reported and the rest of the
//! document still produces records. Two raw zones that resolve to the same
//! stripped code ("R-1¹" and "R-1") are merged in document order with the
//! same policy storage applies.

use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{BuiltZone, ExtractedDocument, RecordBuilder};
use crate::error::ValidationError;
use crate::record::{self, RequirementRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneFailure {
    /// Raw zone code as extracted.
    pub zone: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: ValidationError,
}

fn serialize_error<S: serde::Serializer>(err: &ValidationError, ser: S) -> Result<S::Ok, S::Error> {
    ser.collect_str(err)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentOutcome {
    /// One entry per distinct zone key, in first-seen order.
    pub zones: Vec<BuiltZone>,
    pub failures: Vec<ZoneFailure>,
}

impl DocumentOutcome {
    pub fn records(&self) -> impl Iterator<Item = &RequirementRecord> {
        self.zones.iter().map(|z| &z.record)
    }

    pub fn into_records(self) -> Vec<RequirementRecord> {
        self.zones.into_iter().map(|z| z.record).collect()
    }

    pub fn warning_count(&self) -> usize {
        self.zones.iter().map(|z| z.report.warnings.len()).sum()
    }

    pub fn correction_count(&self) -> usize {
        self.zones.iter().map(|z| z.report.corrections.len()).sum()
    }

    pub fn ambiguity_count(&self) -> usize {
        self.zones.iter().map(|z| z.report.ambiguities.len()).sum()
    }
}

pub fn process_document(builder: &RecordBuilder, doc: &ExtractedDocument) -> DocumentOutcome {
    let mut outcome = DocumentOutcome::default();

    let jurisdiction = match builder.jurisdiction(&doc.jurisdiction) {
        Ok(j) => j,
        Err(error) => {
            warn!(town = %doc.jurisdiction.town, %error, "document jurisdiction invalid, no zone can be built");
            outcome.failures = doc
                .zones
                .iter()
                .map(|z| ZoneFailure {
                    zone: z.zone.clone(),
                    error: error.clone(),
                })
                .collect();
            return outcome;
        }
    };

    for raw in &doc.zones {
        let built = builder.build(
            &jurisdiction,
            raw,
            doc.extraction_confidence,
            doc.data_source.as_deref(),
        );
        let built = match built {
            Ok(b) => b,
            Err(error) => {
                warn!(zone = %raw.zone, %error, "zone skipped");
                outcome.failures.push(ZoneFailure {
                    zone: raw.zone.clone(),
                    error,
                });
                continue;
            }
        };

        let key = built.record.key();
        match outcome.zones.iter_mut().find(|z| z.record.key() == key) {
            Some(existing) => {
                existing.record = record::merge_same_key(&existing.record, &built.record);
                existing.report.extend(built.report);
                if existing.footnote.is_none() {
                    existing.footnote = built.footnote;
                }
            }
            None => outcome.zones.push(built),
        }
    }

    info!(
        jurisdiction = %jurisdiction,
        zones = outcome.zones.len(),
        failures = outcome.failures.len(),
        warnings = outcome.warning_count(),
        corrections = outcome.correction_count(),
        ambiguities = outcome.ambiguity_count(),
        "document processed"
    );
    outcome
}
