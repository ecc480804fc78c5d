use crate::error::{ReportError, ReportResult};
use crate::query::category::{Category, CategoryKind};
use crate::query::grouping::OrderedGroups;
use crate::query::period::PeriodFilter;
use crate::storage::records::{self, KeyedStat, StatValue};
use duckdb::Connection;
use serde::Serialize;
use std::cmp::Reverse;

/// Totals metrics that are summed across periods (and shown as integers).
const SUMMED_METRICS: [&str; 2] = ["Bounces", "Total pageviews"];

/// Totals metrics that are rounded to two decimals and flagged with ` *`.
const ROUNDED_METRICS: [&str; 3] = ["Average time on site", "Pages per visit", "Percent new visits"];

const TIME_ON_SITE: &str = "Average time on site";

/// A displayed statistic value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(i64),
    Text(String),
}

/// One row of an aggregated category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatEntry {
    pub label: String,
    pub value: MetricValue,
}

impl StatEntry {
    fn count(label: String, value: i64) -> Self {
        Self {
            label,
            value: MetricValue::Count(value),
        }
    }
}

/// Aggregate one category for a period filter.
pub fn aggregate_category(
    conn: &Connection,
    category: Category,
    filter: PeriodFilter,
) -> ReportResult<Vec<StatEntry>> {
    let rows = records::keyed_stats(conn, category.stat_name(), filter)?;
    let entries = aggregate_rows(category, &rows, filter)?;
    tracing::debug!(
        %category,
        period = ?filter.code(),
        rows = rows.len(),
        entries = entries.len(),
        "Aggregated category"
    );
    Ok(entries)
}

/// Aggregate already-loaded rows of `category`.
pub fn aggregate_rows(
    category: Category,
    rows: &[KeyedStat],
    filter: PeriodFilter,
) -> ReportResult<Vec<StatEntry>> {
    match category.kind() {
        CategoryKind::Totals => Ok(aggregate_totals(rows, filter)),
        CategoryKind::Breakdown => aggregate_breakdown(category, rows, filter),
    }
}

/// Totals-style aggregation: one cleaned entry per metric, sorted by label.
///
/// For a single period each row is cleaned as is, and metrics without a
/// display rule keep their stored text. Across periods, values are summed
/// for [`SUMMED_METRICS`] and averaged otherwise.
pub fn aggregate_totals(rows: &[KeyedStat], filter: PeriodFilter) -> Vec<StatEntry> {
    let mut entries: Vec<StatEntry> = if filter.is_all() {
        let mut groups: OrderedGroups<Vec<StatValue>> = OrderedGroups::new();
        for row in rows {
            groups.entry(&row.key).push(row.value);
        }
        groups
            .into_entries()
            .into_iter()
            .map(|(metric, values)| {
                let combined = if SUMMED_METRICS.contains(&metric.as_str()) {
                    sum_values(&values)
                } else {
                    mean_values(&values)
                };
                clean_metric(&metric, combined)
            })
            .collect()
    } else {
        rows.iter()
            .map(|row| {
                if has_display_rule(&row.key) {
                    clean_metric(&row.key, row.value)
                } else {
                    StatEntry {
                        label: row.key.clone(),
                        value: MetricValue::Text(row.raw_value.clone()),
                    }
                }
            })
            .collect()
    };
    entries.sort_by(|a, b| a.label.cmp(&b.label));
    entries
}

/// Exact integer sum while every value is an integer, float otherwise.
fn sum_values(values: &[StatValue]) -> StatValue {
    values
        .iter()
        .fold(StatValue::Integer(0), |acc, v| match (acc, *v) {
            (StatValue::Integer(a), StatValue::Integer(b)) => a
                .checked_add(b)
                .map_or_else(|| StatValue::Decimal(acc.as_f64() + v.as_f64()), StatValue::Integer),
            _ => StatValue::Decimal(acc.as_f64() + v.as_f64()),
        })
}

#[allow(clippy::cast_precision_loss)]
fn mean_values(values: &[StatValue]) -> StatValue {
    if values.is_empty() {
        return StatValue::Decimal(0.0);
    }
    let total: f64 = values.iter().map(|v| v.as_f64()).sum();
    StatValue::Decimal(total / values.len() as f64)
}

fn has_display_rule(metric: &str) -> bool {
    ROUNDED_METRICS.contains(&metric) || SUMMED_METRICS.contains(&metric)
}

/// Apply the per-metric display rules to an aggregated value.
///
/// Metrics without a rule are printed through [`StatValue`]'s `Display`:
/// an integer as is, a decimal in its shortest form. A whole-number mean
/// therefore reads `12`, not `12.0`.
pub fn clean_metric(metric: &str, value: StatValue) -> StatEntry {
    if ROUNDED_METRICS.contains(&metric) {
        let seconds = round2(value.as_f64());
        let rounded = format!("{seconds:.2}");
        let text = if metric == TIME_ON_SITE {
            // The clock is derived from the rounded figure, not the raw one
            format!("{} ({rounded} seconds) ", format_clock(seconds))
        } else {
            rounded
        };
        return StatEntry {
            label: format!("{metric} *"),
            value: MetricValue::Text(text),
        };
    }
    if SUMMED_METRICS.contains(&metric) {
        return StatEntry::count(metric.to_string(), truncate(value));
    }
    StatEntry {
        label: metric.to_string(),
        value: MetricValue::Text(value.to_string()),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[allow(clippy::cast_possible_truncation)]
const fn truncate(value: StatValue) -> i64 {
    match value {
        StatValue::Integer(i) => i,
        StatValue::Decimal(d) => d as i64,
    }
}

/// `HH:MM:SS` for a duration in seconds, each field truncated.
#[allow(clippy::cast_possible_truncation)]
pub fn format_clock(seconds: f64) -> String {
    let total_minutes = (seconds / 60.0).floor();
    let secs = seconds - total_minutes * 60.0;
    let hours = (total_minutes / 60.0).floor();
    let mins = total_minutes - hours * 60.0;
    format!(
        "{:02}:{:02}:{:02}",
        hours as i64, mins as i64, secs as i64
    )
}

/// Breakdown-style aggregation: group by normalized key, sum, rank.
///
/// For a single period the candidates are first ordered by raw value
/// descending, so equal sums keep the order of their largest contributor.
pub fn aggregate_breakdown(
    category: Category,
    rows: &[KeyedStat],
    filter: PeriodFilter,
) -> ReportResult<Vec<StatEntry>> {
    let mut candidates = rows
        .iter()
        .map(|row| {
            let value = row.value.as_integer().map_err(|_| ReportError::MalformedValue {
                field: "breakdown count",
                value: row.value.to_string(),
            })?;
            Ok((row.key.as_str(), value))
        })
        .collect::<ReportResult<Vec<_>>>()?;
    if !filter.is_all() {
        candidates.sort_by_key(|&(_, value)| Reverse(value));
    }

    let mut groups: OrderedGroups<i64> = OrderedGroups::new();
    for (key, value) in candidates {
        let bucket = category.normalize_key(key)?;
        let total = groups.entry(&bucket);
        *total = total
            .checked_add(value)
            .ok_or_else(|| ReportError::MalformedValue {
                field: "breakdown total",
                value: bucket.into_owned(),
            })?;
    }

    let mut ranked = groups.into_entries();
    ranked.sort_by_key(|&(_, total)| Reverse(total));
    Ok(ranked
        .into_iter()
        .map(|(label, total)| StatEntry::count(label, total))
        .collect())
}
