use crate::core::models::{CostReport, ModelUsage, ReportSummary, TodayUsage};
use crate::cost::aggregator::{AggregateResult, ModelStats};
use crate::cost::classifier::ModelClass;
use std::collections::BTreeMap;

const CURRENCY_PLACES: i32 = 4;
const PERCENT_PLACES: i32 = 1;

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn currency(value: f64) -> f64 {
    round_to(value, CURRENCY_PLACES)
}

fn model_usage(model: ModelClass, stats: &ModelStats) -> ModelUsage {
    ModelUsage {
        model,
        input_tokens: stats.tokens.input_tokens,
        output_tokens: stats.tokens.output_tokens,
        cache_read_tokens: stats.tokens.cache_read_tokens,
        cache_write_tokens: stats.tokens.cache_write_tokens,
        total_tokens: stats.total_tokens(),
        cost_input: currency(stats.cost.input),
        cost_output: currency(stats.cost.output),
        cost_cache_read: currency(stats.cost.cache_read),
        cost_cache_write: currency(stats.cost.cache_write),
        total_cost: currency(stats.total_cost()),
        message_count: stats.message_count,
    }
}

impl CostReport {
    /// The only place rounding happens.
    pub fn from_aggregate(result: &AggregateResult, daily_budget: f64) -> Self {
        let mut by_class: BTreeMap<ModelClass, ModelStats> = BTreeMap::new();
        for (key, stats) in &result.models {
            by_class.entry(key.class).or_default().merge(stats);
        }

        let mut ranked: Vec<(ModelClass, ModelStats)> = by_class.into_iter().collect();
        ranked.sort_by(|(a_class, a), (b_class, b)| {
            b.total_cost()
                .total_cmp(&a.total_cost())
                .then_with(|| a_class.as_str().cmp(b_class.as_str()))
        });

        let model_usage = ranked
            .iter()
            .map(|(class, stats)| model_usage(*class, stats))
            .collect();

        let totals = &result.totals;
        let total_cost = totals.total_cost();
        let budget_used = if daily_budget > 0.0 {
            total_cost / daily_budget * 100.0
        } else {
            0.0
        };

        let summary = ReportSummary {
            total_cost: currency(total_cost),
            total_tokens: totals.total_tokens(),
            total_messages: totals.message_count,
            input_tokens: totals.tokens.input_tokens,
            output_tokens: totals.tokens.output_tokens,
            cache_read_tokens: totals.tokens.cache_read_tokens,
            cache_write_tokens: totals.tokens.cache_write_tokens,
            input_cost: currency(totals.cost.input),
            output_cost: currency(totals.cost.output),
            cache_read_cost: currency(totals.cost.cache_read),
            cache_write_cost: currency(totals.cost.cache_write),
            daily_budget,
            budget_used: round_to(budget_used, PERCENT_PLACES),
            budget_remaining: currency((daily_budget - total_cost).max(0.0)),
        };

        CostReport {
            date: result.date,
            model_usage,
            summary,
        }
    }
}

impl TodayUsage {
    pub fn from_report(report: &CostReport, active_sessions: usize) -> Self {
        Self {
            date: report.date,
            total_cost: report.summary.total_cost,
            total_input_tokens: report.summary.input_tokens,
            total_output_tokens: report.summary.output_tokens,
            daily_budget: report.summary.daily_budget,
            budget_used_percent: report.summary.budget_used,
            active_sessions,
            model_usage: report.model_usage.clone(),
        }
    }
}
