//! Terminal output: requirement cards and tables, scores, prompt rankings.
//!
//! Requirement records go through their Arrow batch so the card and the
//! table read exactly the columns that get stored and exported.

use arrow::array::{Array, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use zonewise_core::schema::{IDENTITY_COLUMNS, to_record_batch};
use zonewise_core::{DocumentScore, FieldGroup, PromptExperiment, RequirementRecord, TestResult};
use zonewise_store::GroundTruthSummary;

/// Columns of the compact requirement table.
const SUMMARY_COLUMNS: &[&str] = &[
    "town",
    "zone",
    "interior_min_lot_area_sqft",
    "interior_min_lot_width_ft",
    "principal_front_yard_ft",
    "principal_side_yard_ft",
    "principal_rear_yard_ft",
    "max_height_feet_total",
    "max_lot_coverage_percent",
];

// ── Requirements ──

/// Print each record as a vertical card grouped by schema section.
pub fn print_requirement_cards(records: &[RequirementRecord]) -> anyhow::Result<()> {
    let batch = to_record_batch(records)?;
    for row in 0..batch.num_rows() {
        print_card(&batch, row);
    }
    Ok(())
}

fn print_card(batch: &RecordBatch, row: usize) {
    let zone = get_utf8(batch, "zone", row).unwrap_or_default();
    let town = get_utf8(batch, "town", row).unwrap_or_default();
    let state = get_utf8(batch, "state", row).unwrap_or_default();

    println!("=== {zone} ===");
    match get_utf8(batch, "county", row) {
        Some(county) => println!("{town}, {county}, {state}"),
        None => println!("{town}, {state}"),
    }
    println!();

    print_section(batch, row, "Identity", &IDENTITY_COLUMNS);
    for group in FieldGroup::ALL {
        let names: Vec<&str> = group.fields().map(|f| f.name()).collect();
        print_section(batch, row, group.title(), &names);
    }
}

fn print_section(batch: &RecordBatch, row: usize, header: &str, cols: &[&str]) {
    let has_data = cols.iter().any(|&col| {
        batch
            .schema()
            .index_of(col)
            .ok()
            .is_some_and(|i| !batch.column(i).is_null(row))
    });
    if !has_data {
        return;
    }

    println!("{header}");
    for &col_name in cols {
        let Ok(idx) = batch.schema().index_of(col_name) else {
            continue;
        };
        let col = batch.column(idx);
        if col.is_null(row) {
            continue;
        }
        if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
            println!("  {:<42} {}", col_name, arr.value(row));
        } else if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
            println!("  {:<42} {}", col_name, format_number(arr.value(row)));
        }
    }
    println!();
}

/// Compact table of the most-read columns.
pub fn print_requirement_table(records: &[RequirementRecord]) -> anyhow::Result<()> {
    if records.is_empty() {
        println!("no requirements");
        return Ok(());
    }
    let batch = to_record_batch(records)?;
    let schema = batch.schema();
    let indices = SUMMARY_COLUMNS
        .iter()
        .map(|c| schema.index_of(c))
        .collect::<Result<Vec<_>, _>>()?;
    arrow::util::pretty::print_batches(&[batch.project(&indices)?])?;
    Ok(())
}

// ── Ground truth ──

pub fn print_ground_truth_list(docs: &[GroundTruthSummary]) {
    if docs.is_empty() {
        println!("no ground truth documents");
        return;
    }
    println!(
        "{:>4}  {:<32} {:<28} {:<8} {:>6}",
        "id", "name", "jurisdiction", "level", "zones"
    );
    for d in docs {
        println!(
            "{:>4}  {:<32} {:<28} {:<8} {:>3}/{:<3}",
            d.id,
            truncate(&d.name, 32),
            truncate(&d.jurisdiction.to_string(), 28),
            d.complexity,
            d.verified_zone_count,
            d.expected_zone_count,
        );
    }
}

// ── Scores ──

pub fn print_score(score: &DocumentScore) {
    println!("Overall   {}", percent(score.overall_accuracy));
    println!("Zones     {}", percent(score.zone_accuracy));
    println!("Fields    {}", percent(score.field_accuracy));
    println!("Location  {}", percent(score.location_accuracy));

    if !score.per_zone.is_empty() {
        println!();
        println!("Per zone");
        for z in &score.per_zone {
            match z.field_accuracy {
                Some(acc) => println!("  {:<12} {}", z.zone, percent(acc)),
                None => println!("  {:<12} missing", z.zone),
            }
        }
    }
    if !score.per_field.is_empty() {
        println!();
        println!("Per field");
        for (field, acc) in &score.per_field {
            println!("  {:<42} {}", field, percent(*acc));
        }
    }
}

pub fn print_test_results(results: &[TestResult]) {
    for r in results {
        let status = match &r.error_message {
            Some(err) => format!("failed: {}", truncate(err, 60)),
            None if r.is_success() => "ok".to_string(),
            None => "no zones".to_string(),
        };
        let tokens = r.tokens_used.map_or_else(|| "-".to_string(), |t| t.to_string());
        println!(
            "  epoch {:>2}  overall {}  zones {:>3}  {:>6} ms  {:>6} tokens  {status}",
            r.epoch,
            percent(r.overall_accuracy),
            r.parsed_zones_count,
            r.processing_time_ms,
            tokens,
        );
    }
}

// ── Prompts ──

pub fn print_experiment(exp: &PromptExperiment) {
    println!("=== {} ===", exp.label());
    if let Some(desc) = &exp.description {
        println!("{desc}");
    }
    println!();
    println!("  {:<20} {}", "id", exp.id.map_or_else(|| "-".to_string(), |id| id.to_string()));
    println!("  {:<20} {}", "model", exp.model);
    println!("  {:<20} {}", "temperature", exp.temperature);
    println!("  {:<20} {}", "max_tokens", exp.max_tokens);
    println!("  {:<20} {}", "active", yes_no(exp.is_active));
    println!("  {:<20} {}", "baseline", yes_no(exp.is_baseline));
    if let Some(h) = &exp.hypothesis {
        println!("  {:<20} {}", "hypothesis", h);
    }
    if let Some(created) = &exp.created_at {
        println!("  {:<20} {}", "created_at", created);
    }
    println!();
    println!("Statistics");
    let s = &exp.stats;
    println!("  {:<20} {}", "tests", s.total_tests);
    println!(
        "  {:<20} {} ok / {} failed ({})",
        "outcomes",
        s.successful_tests,
        s.failed_tests,
        percent(s.success_rate())
    );
    println!("  {:<20} {}", "avg overall", percent(s.avg_overall_accuracy));
    println!("  {:<20} {}", "avg field", percent(s.avg_field_accuracy));
    println!("  {:<20} {}", "avg zone", percent(s.avg_zone_accuracy));
    println!();
}

pub fn print_ranking(prompts: &[PromptExperiment]) {
    if prompts.is_empty() {
        println!("no prompts meet the ranking threshold");
        return;
    }
    println!(
        "{:>4}  {:>4}  {:<36} {:>8} {:>6} {:>8}",
        "rank", "id", "prompt", "overall", "tests", "success"
    );
    for (i, p) in prompts.iter().enumerate() {
        let baseline = if p.is_baseline { " *" } else { "" };
        println!(
            "{:>4}  {:>4}  {:<36} {:>8} {:>6} {:>8}",
            i + 1,
            p.id.unwrap_or_default(),
            format!("{}{baseline}", truncate(&p.label(), 34)),
            percent(p.stats.avg_overall_accuracy),
            p.stats.total_tests,
            percent(p.stats.success_rate()),
        );
    }
}

// ── Helpers ──

fn get_utf8(batch: &RecordBatch, col_name: &str, row: usize) -> Option<String> {
    let idx = batch.schema().index_of(col_name).ok()?;
    let col = batch.column(idx);
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
}

/// Whole numbers without a trailing `.0`.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn percent(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
