//! The built-in scenario catalog.

use std::time::Duration;

use loadmix_core::{
    ChatShape, ConfigError, ContentKind, DelayRange, FilePick, Partition, RampStage,
    ScenarioDefinition, ScenarioRegistry, SchedulePolicy, ThresholdSet, WorkloadGenerator,
    WorkloadMix, metrics::names,
};

const SMALL_TEXT: &str = "very-small-10KB.txt";
const MEDIUM_TEXT: &str = "small-100KB.txt";
const LARGE_TEXT: &str = "medium-1MB.txt";

const TEXT: &[ContentKind] = &[ContentKind::Text];
const OFFICE: &[ContentKind] = &[ContentKind::Word, ContentKind::Slide, ContentKind::Sheet];
const NON_PDF: &[ContentKind] = &[
    ContentKind::Text,
    ContentKind::Word,
    ContentKind::Slide,
    ContentKind::Sheet,
];
const PDF: &[ContentKind] = &[ContentKind::Pdf];

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn fixed(vus: u64, duration: Duration) -> SchedulePolicy {
    SchedulePolicy::Fixed { vus, duration }
}

fn staged(stages: &[(u64, u64)]) -> SchedulePolicy {
    SchedulePolicy::Staged {
        stages: stages
            .iter()
            .map(|&(s, target)| RampStage::new(secs(s), target))
            .collect(),
    }
}

fn delay(min_ms: u64, max_ms: u64) -> DelayRange {
    DelayRange::new(min_ms, max_ms)
}

fn named(file: &str) -> FilePick {
    FilePick::Named(file.to_string())
}

fn kinds(kinds: &[ContentKind]) -> FilePick {
    FilePick::Kinds(kinds.to_vec())
}

/// `http_req_duration` p95, `http_req_failed` and `success_rate` bounds shared by the upload
/// scenarios.
fn upload_thresholds(p95_ms: u64, max_failed: f64, min_success: f64) -> Vec<ThresholdSet> {
    vec![
        ThresholdSet::new(names::HTTP_REQ_DURATION, [format!("p(95)<{p95_ms}")]),
        ThresholdSet::new(names::HTTP_REQ_FAILED, [format!("rate<{max_failed}")]),
        ThresholdSet::new(names::SUCCESS_RATE, [format!("rate>{min_success}")]),
    ]
}

fn chat_thresholds(p95_ms: u64, max_failed: f64, min_success: f64) -> Vec<ThresholdSet> {
    vec![
        ThresholdSet::new(names::CHAT_RESPONSE_TIME, [format!("p(95)<{p95_ms}")]),
        ThresholdSet::new(names::HTTP_REQ_FAILED, [format!("rate<{max_failed}")]),
        ThresholdSet::new(names::CHAT_SUCCESS_RATE, [format!("rate>{min_success}")]),
    ]
}

fn scenario(
    name: &str,
    description: &str,
    policy: SchedulePolicy,
    mix: WorkloadMix,
    thresholds: Vec<ThresholdSet>,
) -> ScenarioDefinition {
    ScenarioDefinition {
        name: name.to_string(),
        description: description.to_string(),
        policy,
        mix,
        thresholds,
    }
}

fn chat_scenario(
    name: &str,
    description: &str,
    vus: u64,
    duration: Duration,
    shape: ChatShape,
    think: DelayRange,
    thresholds: Vec<ThresholdSet>,
) -> ScenarioDefinition {
    scenario(
        name,
        description,
        fixed(vus, duration),
        WorkloadMix::single(WorkloadGenerator::chat(&shape.to_string(), shape, think)),
        thresholds,
    )
}

fn upload_scenarios() -> Vec<ScenarioDefinition> {
    vec![
        scenario(
            "basic_concurrent_upload",
            "5 users uploading a 100 KB text file",
            fixed(5, secs(60)),
            WorkloadMix::single(WorkloadGenerator::upload(
                "medium_text",
                named(MEDIUM_TEXT),
                delay(1000, 3000),
            )),
            upload_thresholds(3000, 0.05, 0.95),
        ),
        scenario(
            "gradual_user_scaling",
            "ramp 0 to 5 users uploading random text files, hold, ramp down",
            staged(&[(30, 2), (60, 5), (120, 5), (30, 0)]),
            WorkloadMix::single(WorkloadGenerator::upload(
                "text",
                kinds(TEXT),
                delay(2000, 5000),
            )),
            upload_thresholds(20000, 0.30, 0.70),
        ),
        scenario(
            "realistic_office_pattern",
            "2 users upload large, 5 medium and the rest small text files",
            fixed(10, secs(120)),
            WorkloadMix::Partitioned(vec![
                Partition {
                    first_vu: 1,
                    last_vu: Some(2),
                    generator: WorkloadGenerator::upload(
                        "large_text",
                        named(LARGE_TEXT),
                        delay(3000, 10000),
                    ),
                },
                Partition {
                    first_vu: 3,
                    last_vu: Some(7),
                    generator: WorkloadGenerator::upload(
                        "medium_text",
                        named(MEDIUM_TEXT),
                        delay(3000, 10000),
                    ),
                },
                Partition {
                    first_vu: 8,
                    last_vu: None,
                    generator: WorkloadGenerator::upload(
                        "small_text",
                        named(SMALL_TEXT),
                        delay(3000, 10000),
                    ),
                },
            ]),
            upload_thresholds(20000, 0.30, 0.70),
        ),
        scenario(
            "burst_upload_activity",
            "10 users uploading 1 MB files with short think times",
            fixed(10, secs(120)),
            WorkloadMix::single(WorkloadGenerator::upload(
                "large_text",
                named(LARGE_TEXT),
                delay(1000, 3000),
            )),
            upload_thresholds(15000, 0.05, 0.95),
        ),
        scenario(
            "large_file_handling",
            "3 users uploading 1 MB files with long think times",
            fixed(3, secs(60)),
            WorkloadMix::single(WorkloadGenerator::upload(
                "large_text",
                named(LARGE_TEXT),
                delay(5000, 10000),
            )),
            upload_thresholds(60000, 0.10, 0.90),
        ),
        scenario(
            "mixed_operations",
            "5 users upload, 2 download and the rest browse (health checks)",
            fixed(10, secs(180)),
            WorkloadMix::Partitioned(vec![
                Partition {
                    first_vu: 1,
                    last_vu: Some(5),
                    generator: WorkloadGenerator::upload("upload", FilePick::Any, delay(2000, 6000)),
                },
                Partition {
                    first_vu: 6,
                    last_vu: Some(7),
                    generator: WorkloadGenerator::browse("download", delay(1000, 1000)),
                },
                Partition {
                    first_vu: 8,
                    last_vu: None,
                    generator: WorkloadGenerator::browse("browse", delay(4000, 9000)),
                },
            ]),
            upload_thresholds(10000, 0.05, 0.95),
        ),
        scenario(
            "network_variance",
            "100 KB uploads with fast, average and slow client think times by VU",
            fixed(10, secs(180)),
            WorkloadMix::Partitioned(vec![
                Partition {
                    first_vu: 1,
                    last_vu: Some(3),
                    generator: WorkloadGenerator::upload(
                        "fast_network",
                        named(MEDIUM_TEXT),
                        delay(500, 1500),
                    ),
                },
                Partition {
                    first_vu: 4,
                    last_vu: Some(7),
                    generator: WorkloadGenerator::upload(
                        "average_network",
                        named(MEDIUM_TEXT),
                        delay(2000, 5000),
                    ),
                },
                Partition {
                    first_vu: 8,
                    last_vu: None,
                    generator: WorkloadGenerator::upload(
                        "slow_network",
                        named(MEDIUM_TEXT),
                        delay(8000, 15000),
                    ),
                },
            ]),
            upload_thresholds(20000, 0.05, 0.95),
        ),
        scenario(
            "maximum_capacity",
            "step up to 20 users uploading 1 MB files",
            staged(&[(60, 5), (60, 10), (60, 15), (60, 20), (60, 0)]),
            WorkloadMix::single(WorkloadGenerator::upload(
                "large_text",
                named(LARGE_TEXT),
                delay(1000, 2000),
            )),
            upload_thresholds(30000, 0.40, 0.60),
        ),
        scenario(
            "mixed_file_types_longer_delays",
            "half PDF, half text/office uploads with long think times",
            fixed(5, secs(120)),
            WorkloadMix::weighted([
                (
                    0.5,
                    WorkloadGenerator::upload("pdf", kinds(PDF), delay(8000, 12000)),
                ),
                (
                    0.25,
                    WorkloadGenerator::upload("text", kinds(TEXT), delay(8000, 12000)),
                ),
                (
                    0.25,
                    WorkloadGenerator::upload("office", kinds(OFFICE), delay(8000, 12000)),
                ),
            ]),
            upload_thresholds(20000, 0.30, 0.70),
        ),
        scenario(
            "document_upload_stress_test",
            "alternate PDF and non-PDF uploads per iteration while ramping to 10 users",
            staged(&[(30, 5), (60, 5), (30, 10), (60, 10), (30, 0)]),
            WorkloadMix::IterationCycle(vec![
                WorkloadGenerator::upload("pdf", kinds(PDF), delay(4000, 8000)),
                WorkloadGenerator::upload("non_pdf", kinds(NON_PDF), delay(4000, 8000)),
            ]),
            upload_thresholds(20000, 0.30, 0.70),
        ),
        scenario(
            "pdf_only_upload",
            "5 users uploading PDFs (no conversion)",
            fixed(5, secs(30)),
            WorkloadMix::single(WorkloadGenerator::upload(
                "pdf",
                kinds(PDF),
                delay(500, 1500),
            )),
            upload_thresholds(2000, 0.02, 0.98),
        ),
        scenario(
            "sequential_pdf_upload",
            "a single user uploading one PDF at a time",
            fixed(1, secs(60)),
            WorkloadMix::single(WorkloadGenerator::upload(
                "pdf",
                kinds(PDF),
                delay(1500, 2500),
            )),
            upload_thresholds(3000, 0.01, 0.99),
        ),
    ]
}

fn chat_scenarios() -> Vec<ScenarioDefinition> {
    vec![
        chat_scenario(
            "basic_chat_completion",
            "single-question chat completions",
            5,
            secs(120),
            ChatShape::Basic,
            delay(1000, 3000),
            chat_thresholds(5000, 0.05, 0.95),
        ),
        chat_scenario(
            "multi_turn_conversation",
            "four-message conversations with a follow-up question",
            8,
            secs(180),
            ChatShape::MultiTurn,
            delay(2000, 5000),
            chat_thresholds(8000, 0.1, 0.9),
        ),
        chat_scenario(
            "concurrent_chat_load",
            "15 users sending short chat requests",
            15,
            secs(120),
            ChatShape::Concurrent,
            delay(500, 1500),
            chat_thresholds(6000, 0.15, 0.85),
        ),
        chat_scenario(
            "streaming_chat_test",
            "streaming chat completions",
            6,
            secs(180),
            ChatShape::Streaming,
            delay(1000, 4000),
            chat_thresholds(10000, 0.1, 0.9),
        ),
        chat_scenario(
            "mixed_model_chat",
            "random model, temperature, token budget and streaming per request",
            10,
            secs(240),
            ChatShape::MixedModel,
            delay(1000, 4000),
            chat_thresholds(7000, 0.12, 0.88),
        ),
        chat_scenario(
            "long_conversation_test",
            "twelve-message conversations",
            4,
            secs(300),
            ChatShape::LongConversation,
            delay(3000, 8000),
            chat_thresholds(15000, 0.1, 0.9),
        ),
    ]
}

/// Registers every built-in scenario. Fails only if two presets share a name.
pub(crate) fn builtin() -> Result<ScenarioRegistry, ConfigError> {
    let mut registry = ScenarioRegistry::new();
    for s in upload_scenarios().into_iter().chain(chat_scenarios()) {
        registry.register(s)?;
    }
    Ok(registry)
}
