use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress bar and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a JSON summary to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "loadmix",
    author,
    version,
    about = "Virtual-user load generator for file-upload and chat-completion APIs",
    long_about = "loadmix drives a pool of virtual users against a document/chat API.\n\nEach virtual user repeatedly picks a workload item from the scenario's mix (uploads, chat completions, health checks), waits a simulated think time, sends the request and records latency, success and size metrics. At the end of the run the scenario's thresholds are evaluated and the process exit code reflects the verdict.",
    after_help = "Examples:\n  loadmix list\n  loadmix run --scenario basic_concurrent_upload --base-url https://chat.example.com/api/v1 --token $TOKEN\n  loadmix run --scenario gradual_user_scaling --vus 3 --duration 30s --output json\n  loadmix run --scenario-file scenarios.yaml --scenario nightly --summary-export summary.json\n\nExit codes: 0 passed, 11 thresholds failed, 30 invalid input, 40 runtime error."
)]
pub struct Cli {
    /// Log debug events to stderr (otherwise RUST_LOG or `warn`)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one scenario against the target API
    #[command(
        long_about = "Run a built-in scenario (--scenario) or one from a YAML file (--scenario-file).\n\n--vus/--duration replace the scenario's scheduling policy with a fixed one."
    )]
    Run(RunArgs),

    /// List the built-in scenarios (or the ones in a YAML file)
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// List the scenarios of this YAML file instead of the built-in catalog
    #[arg(long, value_name = "PATH")]
    pub scenario_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario name (built-in, or one of the documents in --scenario-file)
    #[arg(long, short)]
    pub scenario: Option<String>,

    /// YAML file holding one or more scenario documents
    #[arg(long, value_name = "PATH")]
    pub scenario_file: Option<PathBuf>,

    /// API base URL, e.g. https://chat.example.com/api/v1
    #[arg(long, env = "LOADMIX_BASE_URL")]
    pub base_url: String,

    /// Bearer token (repeatable, or comma-separated in LOADMIX_TOKENS). VU n uses token (n-1) mod len
    #[arg(
        long = "token",
        value_name = "TOKEN",
        env = "LOADMIX_TOKENS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub tokens: Vec<String>,

    /// Chat model (repeatable, or comma-separated in LOADMIX_MODELS)
    #[arg(long = "model", value_name = "MODEL", env = "LOADMIX_MODELS", value_delimiter = ',')]
    pub models: Vec<String>,

    /// Number of virtual users (turns the scenario into a fixed policy)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m; turns the scenario into a fixed policy)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Seed for workload selection and think times (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory holding the catalog files; synthetic content of nominal size is sent otherwise
    #[arg(long, value_name = "DIR", env = "LOADMIX_FILES_DIR")]
    pub files_dir: Option<PathBuf>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// How long in-flight iterations may drain after the deadline (defaults to the request timeout)
    #[arg(long, value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// Latency bound for the health check's latency check
    #[arg(long, value_parser = parse_duration)]
    pub health_latency_bound: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Also write the JSON summary to this file
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,

    /// Write the retained debug log to this file at the end of the run
    #[arg(long, value_name = "PATH")]
    pub debug_log: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn parse_duration_accepts_humantime_values() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m 30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let cli = parse(&[
            "loadmix",
            "run",
            "--scenario",
            "basic_chat_completion",
            "--base-url",
            "http://127.0.0.1:8080/api/v1",
            "--token",
            "a",
            "--token",
            "b,c",
            "--model",
            "gpt-4o",
            "--vus",
            "2",
            "--duration",
            "250ms",
            "--seed",
            "42",
            "--output",
            "json",
            "-v",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.scenario.as_deref(), Some("basic_chat_completion"));
                assert_eq!(args.base_url, "http://127.0.0.1:8080/api/v1");
                assert_eq!(args.tokens, vec!["a", "b", "c"]);
                assert_eq!(args.models, vec!["gpt-4o"]);
                assert_eq!(args.vus, Some(2));
                assert_eq!(args.duration, Some(Duration::from_millis(250)));
                assert_eq!(args.seed, Some(42));
                assert_eq!(args.output, OutputFormat::Json);
                assert_eq!(args.grace_period, None);
            }
            Command::List(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_list() {
        let cli = parse(&["loadmix", "list"]);
        match cli.command {
            Command::List(args) => assert_eq!(args.scenario_file, None),
            Command::Run(_) => panic!("expected list command"),
        }
    }

    #[test]
    fn run_rejects_bad_durations() {
        let parsed = Cli::try_parse_from([
            "loadmix",
            "run",
            "--scenario",
            "x",
            "--base-url",
            "http://localhost",
            "--duration",
            "10x",
        ]);
        assert!(parsed.is_err());
    }
}
