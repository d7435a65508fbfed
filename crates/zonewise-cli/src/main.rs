mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zonewise_ai::{
    ChatClient, CompletionRequest, DEFAULT_MAX_CHARS, DEFAULT_PROMPT, Llm, TestRun, parse_response,
    render, run_prompt_test,
};
use zonewise_core::ranking::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use zonewise_core::schema::to_record_batch;
use zonewise_core::{
    DocumentOutcome, GroundTruthDocument, PipelineConfig, PromptExperiment, RankingQuery,
    RawJurisdiction, RecordBuilder, ScoringConfig, Tolerance, process_document, score_document,
};
use zonewise_store::{DuckStore, RequirementQuery};

#[derive(Parser)]
#[command(name = "zonewise", version, about = "Zoning ordinance extraction, storage and prompt scoring")]
struct Cli {
    /// DuckDB database file.
    #[arg(long, env = "ZONEWISE_DB", default_value = "zonewise.duckdb", global = true)]
    db: PathBuf,

    /// Pipeline configuration (JSON). Built-in defaults when absent.
    #[arg(long, env = "ZONEWISE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a saved model response through the pipeline and store the records.
    Process {
        /// Raw model response (JSON, possibly wrapped in prose or fences).
        response: PathBuf,
        #[command(flatten)]
        location: LocationArgs,
        /// Print the records instead of storing them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a document's text to the model, then process and store the result.
    Extract {
        /// Plain text of the ordinance.
        document: PathBuf,
        #[command(flatten)]
        location: LocationArgs,
        /// Prompt template; the built-in extraction prompt when absent.
        #[arg(long)]
        prompt_file: Option<PathBuf>,
        #[arg(long, env = "XAI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
        #[command(flatten)]
        api: ApiArgs,
        #[arg(long)]
        dry_run: bool,
    },
    /// Query stored requirement records.
    #[command(subcommand)]
    Requirements(RequirementsCommand),
    /// Manage verified ground-truth documents.
    #[command(subcommand)]
    GroundTruth(GroundTruthCommand),
    /// Manage prompt experiments.
    #[command(subcommand)]
    Prompt(PromptCommand),
    /// Run a prompt against a ground-truth document and record the results.
    Test {
        #[arg(long)]
        prompt: i64,
        #[arg(long)]
        ground_truth: i64,
        /// Plain text of the document the ground truth was verified from.
        #[arg(long)]
        document: PathBuf,
        #[arg(long, default_value_t = 1)]
        epochs: u32,
        #[arg(long)]
        batch_id: Option<String>,
        /// Relative tolerance in percent.
        #[arg(long)]
        tolerance: Option<f64>,
        #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
        max_chars: usize,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Score the stored records of a ground truth's jurisdiction against it.
    Score {
        ground_truth: i64,
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Rank prompt experiments by mean overall accuracy.
    Rank {
        #[arg(long, default_value_t = 5)]
        min_tests: u32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Include deactivated prompts.
        #[arg(long)]
        all: bool,
    },
    /// Write the requirements table to a Parquet file.
    Export { path: PathBuf },
}

#[derive(Args)]
struct LocationArgs {
    /// Town; taken from the model response when absent.
    #[arg(long)]
    town: Option<String>,
    #[arg(long)]
    county: Option<String>,
    /// Two-letter state code; the configured default when absent.
    #[arg(long)]
    state: Option<String>,
}

impl LocationArgs {
    fn raw(&self) -> RawJurisdiction {
        RawJurisdiction {
            town: self.town.clone().unwrap_or_default(),
            county: self.county.clone(),
            state: self.state.clone(),
        }
    }

    fn query(&self) -> RequirementQuery {
        RequirementQuery {
            town: self.town.clone(),
            county: self.county.clone(),
            state: self.state.clone(),
        }
    }
}

#[derive(Args)]
struct ApiArgs {
    #[arg(long, env = "XAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "XAI_BASE_URL", default_value = ChatClient::DEFAULT_BASE_URL)]
    base_url: String,
}

impl ApiArgs {
    fn client(&self) -> anyhow::Result<ChatClient> {
        let key = self
            .api_key
            .as_deref()
            .context("no API key: pass --api-key or set XAI_API_KEY")?;
        Ok(ChatClient::new(&self.base_url, key)?)
    }
}

#[derive(Subcommand)]
enum RequirementsCommand {
    /// Records of a jurisdiction as a table.
    List {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Distinct zone codes.
    Zones {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Full record cards.
    Show {
        #[command(flatten)]
        location: LocationArgs,
        /// Only this zone.
        #[arg(long)]
        zone: Option<String>,
    },
}

#[derive(Subcommand)]
enum GroundTruthCommand {
    /// Store a document and its requirements from a JSON file.
    Add { file: PathBuf },
    List,
    /// A document's verified requirements.
    Show { id: i64 },
}

#[derive(Subcommand)]
enum PromptCommand {
    /// Register a new prompt variant.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        /// Template with {text_content}, {municipality}, {county}, {state}.
        #[arg(long)]
        text_file: PathBuf,
        #[arg(long, env = "XAI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f64,
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        hypothesis: Option<String>,
        #[arg(long)]
        baseline: bool,
    },
    /// Prompts with their statistics.
    List {
        /// Include deactivated prompts.
        #[arg(long)]
        all: bool,
    },
    /// One prompt with every recorded test result.
    Show { id: i64 },
    Activate { id: i64 },
    Deactivate { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let builder = RecordBuilder::new(config);

    match cli.command {
        Command::Process {
            response,
            location,
            dry_run,
        } => {
            let text = read_text(&response)?;
            let outcome = run_pipeline(&builder, &text, &location.raw())?;
            finish(&cli.db, outcome, dry_run)
        }
        Command::Extract {
            document,
            location,
            prompt_file,
            model,
            api,
            dry_run,
        } => {
            let text = read_text(&document)?;
            let template = match &prompt_file {
                Some(path) => read_text(path)?,
                None => DEFAULT_PROMPT.to_string(),
            };
            let raw = location.raw();
            let request = CompletionRequest {
                model,
                prompt: render(&template, &text, &raw, DEFAULT_MAX_CHARS),
                temperature: DEFAULT_TEMPERATURE,
                max_tokens: DEFAULT_MAX_TOKENS,
            };
            let completion = api
                .client()?
                .complete(&request)
                .await
                .context("model request failed")?;
            info!(tokens_used = completion.tokens_used, "model responded");
            let outcome = run_pipeline(&builder, &completion.text, &raw)?;
            finish(&cli.db, outcome, dry_run)
        }
        Command::Requirements(cmd) => requirements(&open_store(&cli.db)?, cmd),
        Command::GroundTruth(cmd) => ground_truth(&open_store(&cli.db)?, cmd),
        Command::Prompt(cmd) => prompt(&open_store(&cli.db)?, cmd),
        Command::Test {
            prompt,
            ground_truth,
            document,
            epochs,
            batch_id,
            tolerance,
            max_chars,
            api,
        } => {
            let store = open_store(&cli.db)?;
            let experiment = store.get_experiment(prompt)?;
            if !experiment.is_active {
                warn!(prompt = %experiment.label(), "testing a deactivated prompt");
            }
            let truth = store.get_ground_truth(ground_truth)?;
            let text = read_text(&document)?;

            let mut run = TestRun::new(&experiment, &truth, &text);
            run.epochs = epochs;
            run.batch_id = Some(batch_id.unwrap_or_else(|| {
                format!("batch-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"))
            }));
            run.tolerance = scoring_tolerance(tolerance)?;
            run.max_chars = max_chars;

            let results = run_prompt_test(&api.client()?, &builder, &run).await?;
            for result in &results {
                store.record_test_result(result)?;
            }
            println!("{} on {}", experiment.label(), truth.name);
            display::print_test_results(&results);
            println!();
            display::print_experiment(&store.get_experiment(prompt)?);
            Ok(())
        }
        Command::Score {
            ground_truth,
            tolerance,
        } => {
            let store = open_store(&cli.db)?;
            let truth = store.get_ground_truth(ground_truth)?;
            let predicted = store.requirements(&RequirementQuery::jurisdiction(&truth.jurisdiction))?;
            // Selected by the truth's own location, so location is not under test.
            let score = score_document(None, &predicted, &truth, scoring_tolerance(tolerance)?)?;
            println!("{} against {} stored records", truth.name, predicted.len());
            println!();
            display::print_score(&score);
            Ok(())
        }
        Command::Rank {
            min_tests,
            limit,
            all,
        } => {
            let query = RankingQuery {
                min_tests,
                limit: Some(limit),
                active_only: !all,
            };
            display::print_ranking(&open_store(&cli.db)?.best_prompts(&query)?);
            Ok(())
        }
        Command::Export { path } => {
            let count = open_store(&cli.db)?.export_parquet(&path)?;
            println!("exported {count} requirements to {}", path.display());
            Ok(())
        }
    }
}

fn requirements(store: &DuckStore, cmd: RequirementsCommand) -> anyhow::Result<()> {
    match cmd {
        RequirementsCommand::List { location } => {
            display::print_requirement_table(&store.requirements(&location.query())?)
        }
        RequirementsCommand::Zones { location } => {
            for zone in store.distinct_zones(&location.query())? {
                println!("{zone}");
            }
            Ok(())
        }
        RequirementsCommand::Show { location, zone } => {
            let mut records = store.requirements(&location.query())?;
            if let Some(zone) = &zone {
                records.retain(|r| r.zone.eq_ignore_ascii_case(zone.trim()));
            }
            if records.is_empty() {
                bail!("no matching requirements");
            }
            display::print_requirement_cards(&records)
        }
    }
}

fn ground_truth(store: &DuckStore, cmd: GroundTruthCommand) -> anyhow::Result<()> {
    match cmd {
        GroundTruthCommand::Add { file } => {
            let doc: GroundTruthDocument = serde_json::from_str(&read_text(&file)?)
                .with_context(|| format!("parsing ground truth {}", file.display()))?;
            let id = store.create_ground_truth(&doc)?;
            println!(
                "ground truth {id}: {} ({} of {} zones)",
                doc.name,
                doc.verified_zone_count(),
                doc.expected_zone_count
            );
            Ok(())
        }
        GroundTruthCommand::List => {
            display::print_ground_truth_list(&store.list_ground_truth()?);
            Ok(())
        }
        GroundTruthCommand::Show { id } => {
            let doc = store.get_ground_truth(id)?;
            println!("=== {} ===", doc.name);
            println!("{}  complexity: {}", doc.jurisdiction, doc.complexity);
            if let Some(notes) = &doc.notes {
                println!("{notes}");
            }
            println!();
            display::print_requirement_cards(&doc.records())
        }
    }
}

fn prompt(store: &DuckStore, cmd: PromptCommand) -> anyhow::Result<()> {
    match cmd {
        PromptCommand::Add {
            name,
            version,
            text_file,
            model,
            temperature,
            max_tokens,
            description,
            hypothesis,
            baseline,
        } => {
            let mut exp = PromptExperiment::new(&name, &version, &read_text(&text_file)?)?;
            exp.model = model;
            exp.temperature = temperature;
            exp.max_tokens = max_tokens;
            exp.description = description;
            exp.hypothesis = hypothesis;
            exp.is_baseline = baseline;
            let id = store.create_experiment(&exp)?;
            println!("prompt {id}: {}", exp.label());
            Ok(())
        }
        PromptCommand::List { all } => {
            for exp in store.list_experiments(!all)? {
                display::print_experiment(&exp);
            }
            Ok(())
        }
        PromptCommand::Show { id } => {
            display::print_experiment(&store.get_experiment(id)?);
            let results = store.test_results_for_prompt(id)?;
            if !results.is_empty() {
                println!("Test results");
                display::print_test_results(&results);
            }
            Ok(())
        }
        PromptCommand::Activate { id } => Ok(store.set_experiment_active(id, true)?),
        PromptCommand::Deactivate { id } => Ok(store.set_experiment_active(id, false)?),
    }
}

// ── Helpers ──

fn open_store(path: &Path) -> anyhow::Result<DuckStore> {
    DuckStore::open_persistent(path).with_context(|| format!("opening database {}", path.display()))
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn scoring_tolerance(percent: Option<f64>) -> anyhow::Result<Tolerance> {
    let config = percent.map_or_else(ScoringConfig::default, |tolerance_percent| ScoringConfig {
        tolerance_percent,
    });
    Ok(config.tolerance()?)
}

/// Parse model text and build records under the known location.
fn run_pipeline(
    builder: &RecordBuilder,
    text: &str,
    known: &RawJurisdiction,
) -> anyhow::Result<DocumentOutcome> {
    let parsed = parse_response(text).context("reading model response")?;
    Ok(process_document(builder, &parsed.into_document(known)))
}

fn finish(db: &Path, outcome: DocumentOutcome, dry_run: bool) -> anyhow::Result<()> {
    if outcome.zones.is_empty() {
        bail!("no zone produced a record ({} rejected)", outcome.failures.len());
    }
    let records = outcome.into_records();
    if dry_run {
        arrow::util::pretty::print_batches(&[to_record_batch(&records)?])?;
        return Ok(());
    }
    let store = open_store(db)?;
    for record in &records {
        store.upsert_requirement(record)?;
    }
    println!("stored {} requirements", records.len());
    Ok(())
}
