use crate::core::models::{CostReport, ModelUsage};
use crate::core::settings::Settings;
use crate::cost::Aggregator;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

pub fn run(settings: &Settings, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    tracing::info!(%date, ?json, "Building cost report");

    let aggregator = Aggregator::new(settings.aggregator_config());
    let result = aggregator
        .aggregate(date)
        .context("Failed to aggregate session logs")?;

    if !result.failed_files.is_empty() {
        tracing::warn!(count = result.failed_files.len(), "Some session logs could not be read");
    }

    let report = CostReport::from_aggregate(&result, settings.daily_budget);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text_output(&report, result.active_sessions());
    }

    Ok(())
}

fn format_tokens(tokens: u64) -> String {
    match tokens {
        t if t >= 1_000_000 => format!("{:.1}M", t as f64 / 1_000_000.0),
        t if t >= 1_000 => format!("{:.1}K", t as f64 / 1_000.0),
        t => t.to_string(),
    }
}

fn print_text_output(report: &CostReport, active_sessions: usize) {
    let summary = &report.summary;

    println!("Usage for {}", report.date);
    println!(
        "  Cost:     ${:.4} of ${:.2} ({:.1}% used, ${:.4} left)",
        summary.total_cost, summary.daily_budget, summary.budget_used, summary.budget_remaining
    );
    println!(
        "  Tokens:   {} ({} in, {} out, {} cache read, {} cache write)",
        format_tokens(summary.total_tokens),
        format_tokens(summary.input_tokens),
        format_tokens(summary.output_tokens),
        format_tokens(summary.cache_read_tokens),
        format_tokens(summary.cache_write_tokens)
    );
    println!("  Messages: {} across {} sessions", summary.total_messages, active_sessions);

    if report.model_usage.is_empty() {
        return;
    }

    println!();
    for usage in &report.model_usage {
        print_model_line(usage);
    }
}

fn print_model_line(usage: &ModelUsage) {
    println!(
        "  {:<8} ${:>9.4}  {:>8} tokens  {:>5} messages",
        format!("{}:", usage.model),
        usage.total_cost,
        format_tokens(usage.total_tokens),
        usage.message_count
    );
}
