use std::fmt::Write as _;
use std::time::UNIX_EPOCH;

use loadmix_core::{MetricValues, RunReport, TrendSnapshot, metrics::names};

use super::format::*;

const TREND_PERCENTILES: [f64; 3] = [90.0, 95.0, 99.0];

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(out, "scenario: {}", report.scenario).ok();
    writeln!(out, "  seed: {}", report.seed).ok();
    if let Ok(started) = report.started_at.duration_since(UNIX_EPOCH) {
        writeln!(out, "  started_at: {} (unix seconds)", started.as_secs()).ok();
    }
    writeln!(
        out,
        "  elapsed: {}",
        format_millis(report.elapsed.as_secs_f64() * 1000.0)
    )
    .ok();
    writeln!(out, "  peak_vus: {}", report.peak_vus).ok();
    writeln!(out, "  iterations: {}", report.iterations).ok();
    if report.aborted_workers > 0 {
        writeln!(out, "  aborted_workers: {}", report.aborted_workers).ok();
    }
    out.push('\n');

    if report.metrics.is_empty() {
        out.push_str("metrics: none recorded\n");
    } else {
        out.push_str("metrics\n");
        let width = report
            .metrics
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);
        for (name, values) in report.metrics.iter() {
            writeln!(out, "  {name:<width$} {}", render_values(name, values)).ok();
        }
    }
    out.push('\n');

    let verdict = &report.verdict;
    if verdict.passed {
        writeln!(out, "thresholds: passed ({} evaluated)", verdict.evaluated).ok();
    } else {
        writeln!(
            out,
            "thresholds: FAILED ({} of {} crossed)",
            verdict.violations.len(),
            verdict.evaluated
        )
        .ok();
    }

    out
}

fn render_values(name: &str, values: &MetricValues) -> String {
    match values {
        MetricValues::Counter { value } => match name {
            names::DATA_SENT | names::DATA_RECEIVED | names::UPLOADED_BYTES => {
                format_bytes(*value as u64)
            }
            _ => format!("{value}"),
        },
        MetricValues::Rate { total, trues, rate } => match rate {
            Some(r) => format!("{} ({trues} of {total})", format_percent(*r)),
            None => "n/a (no samples)".to_string(),
        },
        MetricValues::Trend(t) => render_trend(t),
    }
}

/// Trends are recorded in milliseconds.
fn render_trend(t: &TrendSnapshot) -> String {
    let fmt = format_millis_opt;

    let mut line = format!(
        "avg={} min={} med={} max={}",
        fmt(t.avg()),
        fmt(t.min()),
        fmt(t.median()),
        fmt(t.max())
    );
    for p in TREND_PERCENTILES {
        write!(line, " p({p})={}", fmt(t.percentile(p))).ok();
    }
    write!(line, " (n={})", t.count()).ok();
    line
}
