use std::sync::Arc;

use loadmix_core::{ProgressFn, RunReport, ScenarioDefinition, SchedulePolicy};

mod format;
mod progress;
mod summary;

use format::{format_duration, format_millis, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario: &ScenarioDefinition, base_url: &str) {
        println!("target: {base_url}");
        println!("scenario: {} ({})", scenario.name, scenario.description);
        match &scenario.policy {
            SchedulePolicy::Fixed { vus, duration } => {
                println!("  vus={vus} duration={}", format_duration(*duration));
            }
            SchedulePolicy::Staged { stages } => {
                let stages = stages
                    .iter()
                    .map(|s| format!("{}->{}", format_duration(s.duration), s.target_vus))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("  stages: {stages}");
            }
        }
        let generators = scenario
            .mix
            .generators()
            .map(|g| &*g.name)
            .collect::<Vec<_>>()
            .join(", ");
        println!("  mix: {} ({generators})", scenario.mix.name());
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let secs = u.elapsed.as_secs_f64().max(1e-9);
            let mut message = format!(
                "vus={}/{} elapsed={} iters={} reqs={} ({}/s) failed={}",
                u.active_vus,
                u.target_vus,
                format_duration(u.elapsed),
                u.iterations,
                u.requests,
                format_rate(u.requests as f64 / secs),
                u.failed_requests,
            );
            if let Some(stage) = &u.stage {
                message.push_str(&format!(
                    " stage={}/{} stage_remaining={}",
                    stage.stage,
                    stage.stages,
                    format_duration(stage.stage_remaining)
                ));
            }

            progress.update(&u.scenario, u.total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        if !report.verdict.violations.is_empty() {
            eprintln!("thresholds failed:");
            for v in &report.verdict.violations {
                match v.observed {
                    Some(obs) => eprintln!(
                        "  {}: {} (observed {})",
                        v.condition.metric,
                        v.condition,
                        observed(&v.condition.metric, obs)
                    ),
                    None => eprintln!(
                        "  {}: {} (no samples)",
                        v.condition.metric, v.condition
                    ),
                }
            }
        }

        Ok(())
    }
}

fn observed(metric: &str, value: f64) -> String {
    match metric {
        loadmix_core::metrics::names::HTTP_REQ_DURATION
        | loadmix_core::metrics::names::CHAT_RESPONSE_TIME
        | loadmix_core::metrics::names::UPLOAD_DURATION => format_millis(value),
        _ => format!("{value}"),
    }
}
