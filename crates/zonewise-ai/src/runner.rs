//! Scored prompt test runs against ground truth.

use std::collections::BTreeMap;

use tokio::time::Instant;
use tracing::{info, warn};
use zonewise_core::scoring::select_fields;
use zonewise_core::{
    DocumentScore, GroundTruthDocument, PromptExperiment, RawJurisdiction, RecordBuilder,
    ScoringError, TestResult, Tolerance, process_document, score_document,
};

use crate::client::{CompletionRequest, Llm};
use crate::prompt::{DEFAULT_MAX_CHARS, render};
use crate::response::parse_response;
use crate::RunError;

/// One prompt tried against one ground-truth document.
#[derive(Debug, Clone)]
pub struct TestRun<'a> {
    pub experiment: &'a PromptExperiment,
    pub truth: &'a GroundTruthDocument,
    /// Text of the source document the ground truth was verified from.
    pub document_text: &'a str,
    pub epochs: u32,
    pub batch_id: Option<String>,
    pub tolerance: Tolerance,
    pub max_chars: usize,
}

impl<'a> TestRun<'a> {
    /// A single epoch at the default tolerance and text budget.
    pub fn new(
        experiment: &'a PromptExperiment,
        truth: &'a GroundTruthDocument,
        document_text: &'a str,
    ) -> Self {
        Self {
            experiment,
            truth,
            document_text,
            epochs: 1,
            batch_id: None,
            tolerance: Tolerance::default(),
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Run every epoch of `run` and return one result per epoch.
///
/// The prompt is rendered with the ground truth's own location, and records
/// are built under it. Location accuracy comes from what the model echoed
/// back in `extracted_town`. A failed call or an unparseable response still
/// yields a result: zero scores, `extraction_success` false and the error
/// text in both `error_message` and `raw_response`.
pub async fn run_prompt_test<L: Llm>(
    llm: &L,
    builder: &RecordBuilder,
    run: &TestRun<'_>,
) -> Result<Vec<TestResult>, RunError> {
    let prompt_id = run.experiment.id.ok_or(RunError::Unsaved("prompt experiment"))?;
    let ground_truth_id = run.truth.id.ok_or(RunError::Unsaved("ground truth document"))?;
    if run.truth.requirements.is_empty() {
        return Err(ScoringError::EmptyGroundTruth.into());
    }
    select_fields(run.truth.scored_fields.as_deref())?;

    let known = RawJurisdiction {
        town: run.truth.jurisdiction.town.clone(),
        county: run.truth.jurisdiction.county.clone(),
        state: Some(run.truth.jurisdiction.state.clone()),
    };
    let prompt = render(&run.experiment.text, run.document_text, &known, run.max_chars);
    let request = CompletionRequest::for_experiment(run.experiment, prompt);

    info!(
        prompt = %run.experiment.label(),
        ground_truth = %run.truth.name,
        epochs = run.epochs,
        "starting prompt test"
    );

    let mut results = Vec::new();
    for epoch in 1..=run.epochs.max(1) {
        let started = Instant::now();
        let mut result = blank_result(prompt_id, ground_truth_id, epoch, run.batch_id.clone());

        match llm.complete(&request).await {
            Ok(completion) => {
                result.tokens_used = completion.tokens_used;
                match evaluate(builder, run, &known, &completion.text) {
                    Ok((zones, score)) => {
                        result.parsed_zones_count = zones;
                        result.extraction_success = true;
                        result.apply_score(score);
                    }
                    Err(message) => result.error_message = Some(message),
                }
                result.raw_response = completion.text;
            }
            Err(err) => {
                let message = err.to_string();
                result.raw_response = message.clone();
                result.error_message = Some(message);
            }
        }
        result.processing_time_ms = started.elapsed().as_millis() as u64;

        match &result.error_message {
            Some(error) => warn!(epoch, error = %error, "prompt test epoch failed"),
            None => info!(
                epoch,
                zones = result.parsed_zones_count,
                overall = result.overall_accuracy,
                ms = result.processing_time_ms,
                "prompt test epoch scored"
            ),
        }
        results.push(result);
    }
    Ok(results)
}

/// Parse, build and score one response. Returns the parsed zone count.
fn evaluate(
    builder: &RecordBuilder,
    run: &TestRun<'_>,
    known: &RawJurisdiction,
    text: &str,
) -> Result<(u32, DocumentScore), String> {
    let parsed = parse_response(text).map_err(|e| e.to_string())?;
    let zones = parsed.zones.len() as u32;
    let location = parsed
        .extracted_jurisdiction()
        .map(|raw| builder.with_default_state(raw));

    let records = process_document(builder, &parsed.into_document(known)).into_records();
    let score = score_document(location.as_ref(), &records, run.truth, run.tolerance)
        .map_err(|e| e.to_string())?;
    Ok((zones, score))
}

fn blank_result(prompt_id: i64, ground_truth_id: i64, epoch: u32, batch_id: Option<String>) -> TestResult {
    let zero = DocumentScore::zero();
    TestResult {
        id: None,
        prompt_id,
        ground_truth_id,
        epoch,
        batch_id,
        raw_response: String::new(),
        parsed_zones_count: 0,
        extraction_success: false,
        error_message: None,
        overall_accuracy: zero.overall_accuracy,
        zone_accuracy: zero.zone_accuracy,
        field_accuracy: zero.field_accuracy,
        location_accuracy: zero.location_accuracy,
        per_field: BTreeMap::new(),
        per_zone: Vec::new(),
        processing_time_ms: 0,
        tokens_used: None,
        created_at: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use zonewise_core::{Complexity, FieldValues, GroundTruthRequirement, Jurisdiction, aggregate};

    use super::*;
    use crate::{Completion, LlmError};

    /// Replays canned completions in order and records the prompts it saw.
    struct Canned {
        replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Canned {
        fn new(replies: Vec<Result<Completion, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Llm for Canned {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyCompletion))
        }
    }

    fn reply(text: &str) -> Result<Completion, LlmError> {
        Ok(Completion {
            text: text.to_string(),
            tokens_used: Some(900),
        })
    }

    fn experiment() -> PromptExperiment {
        let mut exp = PromptExperiment::new(
            "table-focus",
            "1",
            "Extract zones for {municipality}, {state}.\n{text_content}",
        )
        .unwrap();
        exp.id = Some(7);
        exp
    }

    fn truth() -> GroundTruthDocument {
        GroundTruthDocument {
            id: Some(3),
            name: "Linwood Schedule A".into(),
            original_filename: None,
            jurisdiction: Jurisdiction::new("Linwood", None, "NJ").unwrap(),
            verified_by: None,
            expected_zone_count: 2,
            complexity: Complexity::Simple,
            notes: None,
            scored_fields: Some(vec![
                "interior_min_lot_area_sqft".into(),
                "principal_front_yard_ft".into(),
            ]),
            requirements: vec![
                GroundTruthRequirement {
                    zone: "R-20".into(),
                    zone_description: None,
                    fields: FieldValues {
                        interior_min_lot_area_sqft: Some(20000.0),
                        principal_front_yard_ft: Some(30.0),
                        ..Default::default()
                    },
                },
                GroundTruthRequirement {
                    zone: "C-1".into(),
                    zone_description: None,
                    fields: FieldValues {
                        interior_min_lot_area_sqft: Some(10000.0),
                        principal_front_yard_ft: Some(20.0),
                        ..Default::default()
                    },
                },
            ],
        }
    }

    const PERFECT: &str = r#"{"extracted_town": "Linwood", "zoning_requirements": [
        {"zone_name": "R-20", "interior_min_lot_area_sqft": "20,000", "principal_min_front_yard_ft": 30},
        {"zone_name": "C-1", "interior_min_lot_area_sqft": 10000, "principal_front_yard_ft": "20 ft"}
    ]}"#;

    #[tokio::test]
    async fn perfect_response_scores_one() {
        let llm = Canned::new(vec![reply(PERFECT)]);
        let exp = experiment();
        let gt = truth();
        let results = run_prompt_test(&llm, &RecordBuilder::default(), &TestRun::new(&exp, &gt, "Schedule A"))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.is_success());
        assert_eq!((r.prompt_id, r.ground_truth_id, r.epoch), (7, 3, 1));
        assert_eq!(r.parsed_zones_count, 2);
        assert_eq!(r.tokens_used, Some(900));
        assert_eq!(r.zone_accuracy, 1.0);
        assert_eq!(r.field_accuracy, 1.0);
        assert_eq!(r.location_accuracy, 1.0);
        assert_eq!(r.overall_accuracy, 1.0);
        assert_eq!(r.raw_response, PERFECT);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0].prompt, "Extract zones for Linwood, NJ.\nSchedule A");
        assert_eq!(seen[0].model, exp.model);
    }

    #[tokio::test]
    async fn failures_still_produce_results() {
        let llm = Canned::new(vec![
            Err(LlmError::Server {
                status: 429,
                body: "rate limited".into(),
            }),
            reply("Sorry, I cannot help with that."),
            reply(PERFECT),
        ]);
        let exp = experiment();
        let gt = truth();
        let mut run = TestRun::new(&exp, &gt, "text");
        run.epochs = 3;
        run.batch_id = Some("batch-1".into());
        let results = run_prompt_test(&llm, &RecordBuilder::default(), &run).await.unwrap();

        assert_eq!(results.iter().map(|r| r.epoch).collect::<Vec<_>>(), [1, 2, 3]);
        assert!(results.iter().all(|r| r.batch_id.as_deref() == Some("batch-1")));

        assert!(!results[0].is_success());
        assert!(results[0].raw_response.contains("429"));
        assert_eq!(results[0].overall_accuracy, 0.0);

        assert!(!results[1].extraction_success);
        assert_eq!(results[1].error_message.as_deref(), Some("no JSON object in model response"));
        assert_eq!(results[1].raw_response, "Sorry, I cannot help with that.");

        assert!(results[2].is_success());

        let stats = aggregate(&results);
        assert_eq!(stats.total_tests, 3);
        assert_eq!(stats.successful_tests, 1);
        assert_eq!(stats.failed_tests, 2);
    }

    #[tokio::test]
    async fn wrong_town_and_missing_zone_lower_the_score() {
        let text = r#"{"extracted_town": "Somers Point", "zones": [
            {"zone": "R-20", "interior_min_lot_area_sqft": 20000, "principal_front_yard_ft": 30}
        ]}"#;
        let llm = Canned::new(vec![reply(text)]);
        let exp = experiment();
        let gt = truth();
        let results = run_prompt_test(&llm, &RecordBuilder::default(), &TestRun::new(&exp, &gt, ""))
            .await
            .unwrap();

        let r = &results[0];
        assert_eq!(r.zone_accuracy, 0.5);
        assert_eq!(r.field_accuracy, 1.0);
        assert_eq!(r.location_accuracy, 0.0);
        assert!((r.overall_accuracy - 0.5).abs() < 1e-9);
        assert_eq!(r.per_zone.iter().filter(|z| z.found).count(), 1);
    }

    #[tokio::test]
    async fn spelled_out_state_does_not_hide_wrong_town() {
        let text = r#"{"extracted_town": "Somers Point", "extracted_state": "New Jersey", "zones": [
            {"zone": "R-20", "interior_min_lot_area_sqft": 20000, "principal_front_yard_ft": 30},
            {"zone": "C-1", "interior_min_lot_area_sqft": 10000, "principal_front_yard_ft": 20}
        ]}"#;
        let llm = Canned::new(vec![reply(text)]);
        let exp = experiment();
        let gt = truth();
        let results = run_prompt_test(&llm, &RecordBuilder::default(), &TestRun::new(&exp, &gt, ""))
            .await
            .unwrap();

        let r = &results[0];
        assert_eq!(r.zone_accuracy, 1.0);
        assert_eq!(r.field_accuracy, 1.0);
        assert_eq!(r.location_accuracy, 0.0);
        assert!((r.overall_accuracy - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unsaved_or_empty_inputs_are_rejected() {
        let llm = Canned::new(Vec::new());
        let builder = RecordBuilder::default();

        let mut exp = experiment();
        exp.id = None;
        let gt = truth();
        assert!(matches!(
            run_prompt_test(&llm, &builder, &TestRun::new(&exp, &gt, "")).await,
            Err(RunError::Unsaved(_))
        ));

        let exp = experiment();
        let mut gt = truth();
        gt.requirements.clear();
        assert!(matches!(
            run_prompt_test(&llm, &builder, &TestRun::new(&exp, &gt, "")).await,
            Err(RunError::Scoring(ScoringError::EmptyGroundTruth))
        ));

        let mut gt = truth();
        gt.scored_fields = Some(vec!["lot_vibes".into()]);
        assert!(matches!(
            run_prompt_test(&llm, &builder, &TestRun::new(&exp, &gt, "")).await,
            Err(RunError::Scoring(ScoringError::UnknownField(_)))
        ));
        assert!(llm.seen.lock().unwrap().is_empty());
    }
}
