use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use loadmix_core::{
    DebugLog, FileCatalog, RunSettings, ScenarioDefinition, ScenarioDriver, ScenarioRegistry,
};
use loadmix_http::{FileStore, HttpTransport, HttpTransportConfig};

use crate::cli::{ListArgs, RunArgs};
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::{output, presets, scenario_yaml};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let registry = registry(args.scenario_file.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;
    let scenario = select(&registry, args.scenario.as_deref(), args.scenario_file.is_some())
        .map_err(RunError::InvalidInput)?
        .clone()
        .with_overrides(args.vus, args.duration);

    let settings = run_settings(&args);
    let files = file_store(args.files_dir.as_deref(), &settings.catalog)
        .await
        .map_err(RunError::InvalidInput)?;

    let transport = HttpTransport::new(
        HttpTransportConfig {
            request_timeout: settings.request_timeout,
            ..HttpTransportConfig::new(&args.base_url, settings.credentials.clone())
        },
        files,
    )
    .context("invalid target configuration")
    .map_err(RunError::InvalidInput)?;

    let debug_log = DebugLog::default();
    let driver = ScenarioDriver::new(scenario.clone(), settings, Arc::new(transport))
        .with_debug_log(debug_log.clone());
    driver
        .validate()
        .with_context(|| format!("invalid scenario `{}`", scenario.name))
        .map_err(RunError::InvalidInput)?;

    out.print_header(&scenario, &args.base_url);
    tracing::info!(scenario = %scenario.name, base_url = %args.base_url, "run starting");

    let result = driver.with_progress(out.progress()).run().await;

    // The retained trail is most useful when the run itself failed.
    if let Some(path) = &args.debug_log {
        write_debug_log(path, &debug_log)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    let report = result.map_err(|e| RunError::classify("scenario run failed", e))?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.summary_export {
        output::write_summary_export(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_verdict(report.verdict.passed))
}

pub async fn list(args: ListArgs) -> anyhow::Result<()> {
    let registry = registry(args.scenario_file.as_deref()).await?;
    let width = registry.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for s in registry.iter() {
        println!("{:<width$}  {}", s.name, s.description);
    }
    Ok(())
}

async fn registry(scenario_file: Option<&Path>) -> anyhow::Result<ScenarioRegistry> {
    let Some(path) = scenario_file else {
        return presets::builtin().context("built-in scenario catalog is inconsistent");
    };

    let mut registry = ScenarioRegistry::new();
    for scenario in scenario_yaml::load_scenarios(path).await? {
        registry
            .register(scenario)
            .with_context(|| format!("invalid scenario file: {}", path.display()))?;
    }
    Ok(registry)
}

fn select<'a>(
    registry: &'a ScenarioRegistry,
    name: Option<&str>,
    from_file: bool,
) -> anyhow::Result<&'a ScenarioDefinition> {
    match name {
        Some(name) => registry
            .get(name)
            .with_context(|| format!("available scenarios: {}", available(registry))),
        None if from_file && registry.len() == 1 => registry
            .iter()
            .next()
            .context("scenario file holds no scenarios"),
        None => anyhow::bail!(
            "--scenario is required; available scenarios: {}",
            available(registry)
        ),
    }
}

fn available(registry: &ScenarioRegistry) -> String {
    registry
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_settings(args: &RunArgs) -> RunSettings {
    let defaults = RunSettings::default();
    RunSettings {
        credentials: args.tokens.clone(),
        models: if args.models.is_empty() {
            defaults.models.clone()
        } else {
            args.models.clone()
        },
        request_timeout: args.request_timeout.unwrap_or(defaults.request_timeout),
        grace_period: args.grace_period,
        health_latency_bound: args
            .health_latency_bound
            .unwrap_or(defaults.health_latency_bound),
        seed: args.seed,
        ..defaults
    }
}

async fn file_store(dir: Option<&Path>, catalog: &FileCatalog) -> anyhow::Result<FileStore> {
    match dir {
        Some(dir) => FileStore::load(dir, catalog)
            .await
            .with_context(|| format!("failed to load upload files from {}", dir.display())),
        None => {
            tracing::debug!("no files directory given, sending synthesized content");
            Ok(FileStore::synthesized(catalog))
        }
    }
}

async fn write_debug_log(path: &Path, debug_log: &DebugLog) -> anyhow::Result<()> {
    let mut text = debug_log.render();
    if debug_log.dropped() > 0 {
        text.insert_str(
            0,
            &format!("# {} older entries dropped\n", debug_log.dropped()),
        );
    }
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("failed to write debug log: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn builtin_selection_requires_a_name() -> anyhow::Result<()> {
        let registry = registry(None).await?;
        let err = match select(&registry, None, false) {
            Ok(s) => panic!("expected an error, got {}", s.name),
            Err(e) => e,
        };
        assert!(err.to_string().contains("basic_chat_completion"));

        let err = match select(&registry, Some("nope"), false) {
            Ok(s) => panic!("expected an error, got {}", s.name),
            Err(e) => e,
        };
        assert!(format!("{err:#}").contains("available scenarios"));
        Ok(())
    }

    #[tokio::test]
    async fn single_scenario_file_needs_no_name() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("smoke.yaml");
        std::fs::write(
            &path,
            "vus: 1\nduration: 1s\nmix:\n  cycle:\n    - { kind: browse }\n",
        )?;

        let registry = registry(Some(&path)).await?;
        let s = select(&registry, None, true)?;
        assert_eq!(s.name, "smoke");

        let s = s.clone().with_overrides(Some(4), None);
        assert_eq!(s.policy.max_vus(), 4);
        assert_eq!(s.policy.total_duration(), Duration::from_secs(1));
        Ok(())
    }
}
