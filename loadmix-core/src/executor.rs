use std::future::Future;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::time::Instant;

use crate::contract::{Contract, ContractCheck};
use crate::debug_log::DebugLog;
use crate::error::{ConfigError, ProtocolError, TransportError};
use crate::metrics::{Counter, MetricsRegistry, Rate, Trend, names};
use crate::mix::Action;
use crate::vu::VirtualUser;
use crate::workload::{Payload, WorkloadItem};

/// What the transport hands back for one request.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
    /// Time from issuing the request to the response head.
    pub ttfb: Duration,
    /// Zero when an existing connection was reused.
    pub connect: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Opens per-VU sessions against the target service.
pub trait Transport: Send + Sync + 'static {
    type Session: TransportSession;

    /// The session authenticates as `vu`'s assigned credential for its whole lifetime.
    fn session(&self, vu: &VirtualUser) -> Self::Session;
}

pub trait TransportSession: Send + 'static {
    fn send(
        &mut self,
        item: &WorkloadItem,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub issued_at: SystemTime,
    pub latency: Duration,
    pub ttfb: Option<Duration>,
    pub connect: Option<Duration>,
    /// `0` when no response was received.
    pub status: u16,
    pub success: bool,
    pub bytes_transferred: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A failed call. Its metrics were already recorded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct FailedRequest {
    pub outcome: RequestOutcome,
    #[source]
    pub error: ExecuteError,
}

/// Metric handles resolved once per run.
#[derive(Debug, Clone)]
pub struct StandardMetrics {
    pub http_reqs: Counter,
    pub http_req_duration: Trend,
    pub http_req_failed: Rate,
    pub ttfb: Trend,
    pub connect: Trend,
    pub data_sent: Counter,
    pub data_received: Counter,
    pub iterations: Counter,
    pub iteration_duration: Trend,

    pub upload_duration: Trend,
    pub uploaded_bytes: Counter,
    pub upload_success: Rate,

    pub chat_response_time: Trend,
    pub chat_messages: Counter,
    pub chat_tokens: Counter,
    pub chat_success: Rate,

    pub checks: Rate,
    pub health_duration: Trend,
}

impl StandardMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self, ConfigError> {
        Ok(Self {
            http_reqs: registry.counter(names::HTTP_REQS)?,
            http_req_duration: registry.trend(names::HTTP_REQ_DURATION)?,
            http_req_failed: registry.rate(names::HTTP_REQ_FAILED)?,
            ttfb: registry.trend(names::TIME_TO_FIRST_BYTE)?,
            connect: registry.trend(names::CONNECTION_TIME)?,
            data_sent: registry.counter(names::DATA_SENT)?,
            data_received: registry.counter(names::DATA_RECEIVED)?,
            iterations: registry.counter(names::ITERATIONS)?,
            iteration_duration: registry.trend(names::ITERATION_DURATION)?,

            upload_duration: registry.trend(names::UPLOAD_DURATION)?,
            uploaded_bytes: registry.counter(names::UPLOADED_BYTES)?,
            upload_success: registry.rate(names::SUCCESS_RATE)?,

            chat_response_time: registry.trend(names::CHAT_RESPONSE_TIME)?,
            chat_messages: registry.counter(names::CHAT_MESSAGES_PROCESSED)?,
            chat_tokens: registry.counter(names::CHAT_TOKENS_GENERATED)?,
            chat_success: registry.rate(names::CHAT_SUCCESS_RATE)?,

            checks: registry.rate(names::CHECKS)?,
            health_duration: registry.trend(names::HEALTH_CHECK_DURATION)?,
        })
    }
}

/// Runs one action against a session and records its metrics exactly once.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    metrics: StandardMetrics,
    debug_log: DebugLog,
    health_latency_bound: Duration,
}

impl RequestExecutor {
    pub fn new(
        registry: &MetricsRegistry,
        debug_log: DebugLog,
        health_latency_bound: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            metrics: StandardMetrics::register(registry)?,
            debug_log,
            health_latency_bound,
        })
    }

    #[must_use]
    pub fn metrics(&self) -> &StandardMetrics {
        &self.metrics
    }

    /// Sleeps the action's think time, then sends. Errors never escape without their metrics.
    pub async fn execute<S: TransportSession>(
        &self,
        session: &mut S,
        vu: &VirtualUser,
        action: &Action,
    ) -> Result<RequestOutcome, FailedRequest> {
        if !action.delay.is_zero() {
            tokio::time::sleep(action.delay).await;
        }

        let item = &action.item;
        let contract = Contract::for_payload(&item.payload, self.health_latency_bound);
        let issued_at = SystemTime::now();
        let started = Instant::now();
        let sent = session.send(item).await;
        let latency = started.elapsed();

        let (outcome, check, error) = match sent {
            Ok(res) => {
                let checked = contract.check(res.status, &res.body, latency);
                let (check, error) = match checked {
                    Ok(check) => (check, None),
                    Err(e) => (ContractCheck::default(), Some(ExecuteError::Protocol(e))),
                };
                let outcome = RequestOutcome {
                    issued_at,
                    latency,
                    ttfb: Some(res.ttfb),
                    connect: Some(res.connect),
                    status: res.status,
                    success: check.success,
                    bytes_transferred: res.bytes_sent.saturating_add(res.bytes_received),
                };
                self.metrics.data_sent.add(res.bytes_sent as f64);
                self.metrics.data_received.add(res.bytes_received as f64);
                (outcome, check, error)
            }
            Err(e) => {
                let outcome = RequestOutcome {
                    issued_at,
                    latency,
                    ttfb: None,
                    connect: None,
                    status: 0,
                    success: false,
                    bytes_transferred: 0,
                };
                let check = match contract {
                    Contract::Health { .. } => ContractCheck {
                        checks: vec![
                            ("health status is 200", false),
                            ("health latency within bound", false),
                        ],
                        ..ContractCheck::default()
                    },
                    _ => ContractCheck::default(),
                };
                (outcome, check, Some(ExecuteError::Transport(e)))
            }
        };

        self.record(item, &outcome, &check);
        self.log(vu, item, &outcome, &check, error.as_ref());

        match error {
            None => Ok(outcome),
            Some(error) => Err(FailedRequest { outcome, error }),
        }
    }

    fn record(&self, item: &WorkloadItem, outcome: &RequestOutcome, check: &ContractCheck) {
        let m = &self.metrics;
        let latency_ms = as_millis(outcome.latency);

        m.http_reqs.add(1.0);
        m.http_req_duration.add(latency_ms);
        m.http_req_failed.add(!outcome.success);
        if let Some(ttfb) = outcome.ttfb {
            m.ttfb.add(as_millis(ttfb));
        }
        if let Some(connect) = outcome.connect {
            m.connect.add(as_millis(connect));
        }

        match &item.payload {
            Payload::Upload { .. } => {
                m.upload_duration.add(latency_ms);
                m.uploaded_bytes.add(item.size_bytes as f64);
                m.upload_success.add(outcome.success);
            }
            Payload::Chat { request, .. } => {
                m.chat_response_time.add(latency_ms);
                m.chat_messages.add(request.messages.len() as f64);
                m.chat_tokens.add(check.estimated_tokens as f64);
                m.chat_success.add(outcome.success);
            }
            Payload::Browse => {
                m.health_duration.add(latency_ms);
            }
        }

        for (_, passed) in &check.checks {
            m.checks.add(*passed);
        }
    }

    fn log(
        &self,
        vu: &VirtualUser,
        item: &WorkloadItem,
        outcome: &RequestOutcome,
        check: &ContractCheck,
        error: Option<&ExecuteError>,
    ) {
        let ms = outcome.latency.as_millis();
        match error {
            Some(ExecuteError::Protocol(e)) => self.debug_log.record(format!(
                "vu={} {} FAILED status={} took {ms}ms: {}; body: {}",
                vu.id, item.name, outcome.status, e.reason, e.body
            )),
            Some(ExecuteError::Transport(e)) => self.debug_log.record(format!(
                "vu={} {} ERROR after {ms}ms: {e}",
                vu.id, item.name
            )),
            None if outcome.success => {
                let id = check
                    .file_id
                    .as_deref()
                    .map(|id| format!(", file id {id}"))
                    .unwrap_or_default();
                self.debug_log.record(format!(
                    "vu={} {} ok in {ms}ms{id}",
                    vu.id, item.name
                ));
            }
            None => self.debug_log.record(format!(
                "vu={} {} FAILED status={} took {ms}ms",
                vu.id, item.name, outcome.status
            )),
        }
    }
}

/// Milliseconds with sub-millisecond precision.
pub(crate) fn as_millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FilePick;
    use crate::chat::ChatShape;
    use crate::error::TransportErrorKind;
    use crate::metrics::MetricValues;
    use crate::workload::{DelayRange, GeneratorContext, WorkloadGenerator};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::VecDeque;

    struct ScriptedSession {
        replies: VecDeque<Result<RawResponse, TransportError>>,
        latency: Duration,
    }

    impl TransportSession for ScriptedSession {
        async fn send(&mut self, _item: &WorkloadItem) -> Result<RawResponse, TransportError> {
            tokio::time::sleep(self.latency).await;
            self.replies
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted reply left"))
        }
    }

    fn ok(status: u16, body: &'static str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            body: Bytes::from_static(body.as_bytes()),
            ttfb: Duration::from_millis(5),
            connect: Duration::from_millis(1),
            bytes_sent: 100,
            bytes_received: body.len() as u64,
        })
    }

    fn action(generator: &WorkloadGenerator, delay: Duration) -> Action {
        let item = generator
            .generate(&GeneratorContext::default(), &mut StdRng::seed_from_u64(1))
            .unwrap_or_else(|| panic!("expected an item"));
        Action {
            generator: generator.name.clone(),
            item,
            delay,
        }
    }

    fn counter(registry: &MetricsRegistry, name: &str) -> f64 {
        match registry.snapshot().get(name) {
            Some(MetricValues::Counter { value }) => *value,
            other => panic!("expected counter {name}, got {other:?}"),
        }
    }

    fn rate(registry: &MetricsRegistry, name: &str) -> (u64, u64) {
        match registry.snapshot().get(name) {
            Some(MetricValues::Rate { trues, total, .. }) => (*trues, *total),
            other => panic!("expected rate {name}, got {other:?}"),
        }
    }

    fn upload() -> WorkloadGenerator {
        WorkloadGenerator::upload(
            "small",
            FilePick::Named("very-small-10KB.txt".to_string()),
            DelayRange::none(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_applied_before_the_request() {
        let registry = MetricsRegistry::default();
        let exec = RequestExecutor::new(&registry, DebugLog::disabled(), Duration::from_secs(3))
            .unwrap_or_else(|e| panic!("{e}"));
        let mut session = ScriptedSession {
            replies: VecDeque::from([ok(200, r#"[{"id":"f1"}]"#)]),
            latency: Duration::from_millis(100),
        };

        let started = Instant::now();
        let outcome = exec
            .execute(
                &mut session,
                &VirtualUser::new(1, 1),
                &action(&upload(), Duration::from_millis(400)),
            )
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        assert!(outcome.success);
        assert_eq!(outcome.latency, Duration::from_millis(100));
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(counter(&registry, names::UPLOADED_BYTES), 10.0 * 1024.0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_still_record_every_metric() {
        let registry = MetricsRegistry::default();
        let exec = RequestExecutor::new(&registry, DebugLog::default(), Duration::from_secs(3))
            .unwrap_or_else(|e| panic!("{e}"));
        let mut session = ScriptedSession {
            replies: VecDeque::from([
                Err(TransportError::new(
                    TransportErrorKind::Connect,
                    "connection refused",
                )),
                ok(200, r#"{"unexpected":true}"#),
                ok(500, "boom"),
            ]),
            latency: Duration::from_millis(10),
        };
        let vu = VirtualUser::new(3, 2);
        let act = action(&upload(), Duration::ZERO);

        let err = exec
            .execute(&mut session, &vu, &act)
            .await
            .err()
            .unwrap_or_else(|| panic!("expected a transport failure"));
        assert!(matches!(err.error, ExecuteError::Transport(_)));
        assert_eq!(err.outcome.status, 0);

        let err = exec
            .execute(&mut session, &vu, &act)
            .await
            .err()
            .unwrap_or_else(|| panic!("expected a protocol failure"));
        assert!(matches!(err.error, ExecuteError::Protocol(_)));

        let outcome = exec
            .execute(&mut session, &vu, &act)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(!outcome.success);

        assert_eq!(counter(&registry, names::HTTP_REQS), 3.0);
        assert_eq!(rate(&registry, names::HTTP_REQ_FAILED), (3, 3));
        assert_eq!(rate(&registry, names::SUCCESS_RATE), (0, 3));
        match registry.snapshot().get(names::TIME_TO_FIRST_BYTE) {
            Some(MetricValues::Trend(t)) => assert_eq!(t.count(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chat_records_messages_and_tokens() {
        let registry = MetricsRegistry::default();
        let exec = RequestExecutor::new(&registry, DebugLog::disabled(), Duration::from_secs(3))
            .unwrap_or_else(|e| panic!("{e}"));
        let mut session = ScriptedSession {
            replies: VecDeque::from([ok(
                200,
                r#"{"choices":[{"message":{"content":"12345678"}}]}"#,
            )]),
            latency: Duration::from_millis(20),
        };
        let generator =
            WorkloadGenerator::chat("multi", ChatShape::MultiTurn, DelayRange::none());

        exec.execute(
            &mut session,
            &VirtualUser::new(1, 1),
            &action(&generator, Duration::ZERO),
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(counter(&registry, names::CHAT_MESSAGES_PROCESSED), 4.0);
        assert_eq!(counter(&registry, names::CHAT_TOKENS_GENERATED), 2.0);
        assert_eq!(rate(&registry, names::CHAT_SUCCESS_RATE), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn browse_records_two_checks_per_call() {
        let registry = MetricsRegistry::default();
        let exec = RequestExecutor::new(&registry, DebugLog::disabled(), Duration::from_secs(3))
            .unwrap_or_else(|e| panic!("{e}"));
        let mut session = ScriptedSession {
            replies: VecDeque::from([ok(200, "[]"), ok(503, "")]),
            latency: Duration::from_millis(50),
        };
        let act = action(
            &WorkloadGenerator::browse("health", DelayRange::none()),
            Duration::ZERO,
        );
        let vu = VirtualUser::new(1, 1);

        for _ in 0..2 {
            let _ = exec.execute(&mut session, &vu, &act).await;
        }
        assert_eq!(rate(&registry, names::CHECKS), (3, 4));
    }
}
