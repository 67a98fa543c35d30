use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Invalid scenario/run configuration. Always fatal, raised before any worker is spawned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("credential pool must not be empty")]
    EmptyCredentials,

    #[error("model list must not be empty when chat workloads are configured")]
    EmptyModels,

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("stage {index} has a zero duration")]
    ZeroStageDuration { index: usize },

    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("mix `{mix}` has no generators")]
    EmptyMix { mix: String },

    #[error("weights of mix `{mix}` must be non-negative and sum to 1.0 (got {sum})")]
    InvalidWeights { mix: String, sum: f64 },

    #[error("generator `{generator}` has weight {weight}; weights must be finite and non-negative")]
    InvalidWeight { generator: String, weight: f64 },

    #[error("partitions of mix `{mix}` must cover VU ids contiguously from 1: {reason}")]
    InvalidPartitions { mix: String, reason: String },

    #[error("generator `{generator}` has an invalid delay range {min_ms}..={max_ms} ms")]
    InvalidDelayRange {
        generator: String,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("generator `{generator}` references unknown file `{file}`")]
    UnknownFile { generator: String, file: String },

    #[error("generator `{generator}` has an empty file selection")]
    EmptyFilePick { generator: String },

    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),

    #[error("metric `{name}` is already registered as a {existing}")]
    MetricKindMismatch { name: String, existing: String },

    #[error("`grace_period` must not exceed one hour (got {0:?})")]
    InvalidGracePeriod(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Tls,
    Request,
    BodyRead,
    Payload,
}

/// The request never produced a response. Counted as a failed outcome, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Longest body excerpt kept on a [`ProtocolError`].
pub const PROTOCOL_BODY_EXCERPT: usize = 2048;

/// A response arrived but does not satisfy the operation's success contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} response rejected: {reason}")]
pub struct ProtocolError {
    pub operation: &'static str,
    pub reason: String,
    /// Raw body, truncated to [`PROTOCOL_BODY_EXCERPT`] bytes.
    pub body: String,
}

impl ProtocolError {
    pub fn new(operation: &'static str, reason: impl Into<String>, body: &[u8]) -> Self {
        let cut = body.len().min(PROTOCOL_BODY_EXCERPT);
        Self {
            operation,
            reason: reason.into(),
            body: String::from_utf8_lossy(&body[..cut]).into_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
