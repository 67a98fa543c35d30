use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::Context as _;
use loadmix_core::{
    MetricValues, ProgressFn, ProgressUpdate, RunReport, ScenarioDefinition, TrendSnapshot,
};
use serde::Serialize;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario: &ScenarioDefinition, _base_url: &str) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine<'a> {
    pub kind: &'static str,
    pub tick: u64,
    pub scenario: &'a str,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    pub active_vus: u64,
    pub target_vus: u64,
    pub iterations: u64,
    pub requests: u64,
    pub failed_requests: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JsonStage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed_secs: f64,
    pub stage_remaining_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine<'_> {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        scenario: &u.scenario,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total.as_secs_f64(),
        active_vus: u.active_vus,
        target_vus: u.target_vus,
        iterations: u.iterations,
        requests: u.requests,
        failed_requests: u.failed_requests,
        stage: u.stage.as_ref().map(|s| JsonStage {
            stage: s.stage,
            stages: s.stages,
            stage_elapsed_secs: s.stage_elapsed.as_secs_f64(),
            stage_remaining_secs: s.stage_remaining.as_secs_f64(),
        }),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub seed: u64,
    pub started_at_unix_ms: u64,
    pub elapsed_secs: f64,
    pub peak_vus: u64,
    pub iterations: u64,
    pub aborted_workers: u64,
    pub metrics: BTreeMap<&'a str, JsonMetric>,
    pub thresholds: JsonVerdict,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonMetric {
    Counter {
        value: f64,
    },
    Rate {
        total: u64,
        trues: u64,
        rate: Option<f64>,
    },
    Trend {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonVerdict {
    pub passed: bool,
    pub evaluated: usize,
    pub violations: Vec<JsonViolation>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonViolation {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
}

fn metric_line(values: &MetricValues) -> JsonMetric {
    match values {
        MetricValues::Counter { value } => JsonMetric::Counter { value: *value },
        MetricValues::Rate { total, trues, rate } => JsonMetric::Rate {
            total: *total,
            trues: *trues,
            rate: *rate,
        },
        MetricValues::Trend(t) => trend_line(t),
    }
}

fn trend_line(t: &TrendSnapshot) -> JsonMetric {
    JsonMetric::Trend {
        count: t.count(),
        avg: t.avg(),
        min: t.min(),
        med: t.median(),
        max: t.max(),
        p90: t.percentile(90.0),
        p95: t.percentile(95.0),
        p99: t.percentile(99.0),
    }
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine<'_> {
    let started_at_unix_ms = report
        .started_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    JsonSummaryLine {
        kind: "summary",
        scenario: &report.scenario,
        seed: report.seed,
        started_at_unix_ms,
        elapsed_secs: report.elapsed.as_secs_f64(),
        peak_vus: report.peak_vus,
        iterations: report.iterations,
        aborted_workers: report.aborted_workers,
        metrics: report
            .metrics
            .iter()
            .map(|(name, values)| (name, metric_line(values)))
            .collect(),
        thresholds: JsonVerdict {
            passed: report.verdict.passed,
            evaluated: report.verdict.evaluated,
            violations: report
                .verdict
                .violations
                .iter()
                .map(|v| JsonViolation {
                    metric: v.condition.metric.clone(),
                    expression: v.condition.to_string(),
                    observed: v.observed,
                })
                .collect(),
        },
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

/// Writes the summary document (same shape as the `summary` line) to `path`.
pub(crate) async fn write_summary_export(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(&build_summary_line(report))
        .context("failed to encode summary")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write summary export: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use loadmix_core::{
        MetricsSnapshot, ThresholdCondition, ThresholdViolation, Verdict, metrics::names,
    };
    use serde_json::Value;

    use super::*;

    fn report() -> anyhow::Result<RunReport> {
        let mut metrics = MetricsSnapshot::default();
        metrics.insert(names::HTTP_REQS, MetricValues::Counter { value: 3.0 });
        metrics.insert(names::SUCCESS_RATE, MetricValues::rate(2, 3));
        metrics.insert(
            names::HTTP_REQ_DURATION,
            MetricValues::Trend(TrendSnapshot::from_samples([5.0, 1.0, 3.0])),
        );

        let condition = ThresholdCondition::parse(names::SUCCESS_RATE, "rate>0.95")?;
        Ok(RunReport {
            scenario: "pdf_only_upload".to_string(),
            seed: 7,
            started_at: SystemTime::now(),
            elapsed: Duration::from_millis(1500),
            peak_vus: 5,
            iterations: 3,
            aborted_workers: 0,
            metrics,
            verdict: Verdict {
                passed: false,
                evaluated: 1,
                violations: vec![ThresholdViolation {
                    condition,
                    observed: Some(2.0 / 3.0),
                }],
            },
        })
    }

    #[test]
    fn progress_line_has_kind_and_optional_stage() -> anyhow::Result<()> {
        let u = ProgressUpdate {
            tick: 3,
            scenario: "s1".to_string(),
            elapsed: Duration::from_secs(3),
            total: Duration::from_secs(10),
            active_vus: 2,
            target_vus: 2,
            iterations: 9,
            requests: 9,
            failed_requests: 1,
            stage: None,
        };

        let v = serde_json::to_value(build_progress_line(&u))?;
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("failed_requests").and_then(Value::as_u64), Some(1));
        assert!(v.get("stage").is_none());
        Ok(())
    }

    #[test]
    fn summary_line_carries_metrics_and_verdict() -> anyhow::Result<()> {
        let report = report()?;
        let v = serde_json::to_value(build_summary_line(&report))?;

        assert_eq!(v["kind"], "summary");
        assert_eq!(v["seed"], 7);
        assert_eq!(v["metrics"]["http_reqs"]["type"], "counter");
        assert_eq!(v["metrics"]["success_rate"]["trues"], 2);
        assert_eq!(v["metrics"]["http_req_duration"]["max"], 5.0);
        assert_eq!(v["metrics"]["http_req_duration"]["med"], 3.0);
        assert_eq!(v["thresholds"]["passed"], false);
        assert_eq!(
            v["thresholds"]["violations"][0]["expression"],
            "rate>0.95"
        );
        Ok(())
    }

    #[tokio::test]
    async fn summary_export_writes_pretty_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("summary.json");
        write_summary_export(&path, &report()?).await?;

        let v: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(v["scenario"], "pdf_only_upload");
        Ok(())
    }
}
