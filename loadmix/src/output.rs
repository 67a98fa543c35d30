use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) use json::write_summary_export;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, scenario: &loadmix_core::ScenarioDefinition, base_url: &str);
    fn progress(&self) -> Option<loadmix_core::ProgressFn>;
    fn print_summary(&self, report: &loadmix_core::RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
