use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;

use crate::catalog::{ContentKind, FileCatalog, FilePick};
use crate::chat::{ChatRequest, ChatShape};
use crate::error::ConfigError;

/// Inclusive range the pre-request think time is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// What a worker asks the transport to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Upload {
        file_name: Arc<str>,
        content_type: &'static str,
    },
    Chat {
        request: Arc<ChatRequest>,
        /// Pre-encoded JSON body.
        body: Bytes,
    },
    Browse,
}

/// One unit of work, consumed by a single executor call.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadItem {
    pub name: Arc<str>,
    pub kind: ContentKind,
    pub payload: Payload,
    pub size_bytes: u64,
}

impl WorkloadItem {
    #[must_use]
    pub fn chat_message_count(&self) -> usize {
        match &self.payload {
            Payload::Chat { request, .. } => request.messages.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Upload(FilePick),
    Chat(ChatShape),
    Browse,
}

impl Operation {
    #[must_use]
    pub fn is_chat(&self) -> bool {
        matches!(self, Self::Chat(_))
    }
}

/// Named producer of workload items, the unit a mix selects between.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadGenerator {
    pub name: Arc<str>,
    pub operation: Operation,
    pub delay: DelayRange,
}

/// Inputs shared by every generator of a run.
#[derive(Debug, Clone)]
pub struct GeneratorContext {
    pub catalog: FileCatalog,
    pub models: Arc<[String]>,
}

impl Default for GeneratorContext {
    fn default() -> Self {
        Self {
            catalog: FileCatalog::standard(),
            models: Arc::from(vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]),
        }
    }
}

impl WorkloadGenerator {
    pub fn new(name: &str, operation: Operation, delay: DelayRange) -> Self {
        Self {
            name: Arc::from(name),
            operation,
            delay,
        }
    }

    pub fn upload(name: &str, pick: FilePick, delay: DelayRange) -> Self {
        Self::new(name, Operation::Upload(pick), delay)
    }

    pub fn chat(name: &str, shape: ChatShape, delay: DelayRange) -> Self {
        Self::new(name, Operation::Chat(shape), delay)
    }

    pub fn browse(name: &str, delay: DelayRange) -> Self {
        Self::new(name, Operation::Browse, delay)
    }

    pub fn validate(&self, ctx: &GeneratorContext) -> Result<(), ConfigError> {
        if self.delay.min_ms > self.delay.max_ms {
            return Err(ConfigError::InvalidDelayRange {
                generator: self.name.to_string(),
                min_ms: self.delay.min_ms,
                max_ms: self.delay.max_ms,
            });
        }

        match &self.operation {
            Operation::Upload(FilePick::Named(file)) if ctx.catalog.get(file).is_none() => {
                Err(ConfigError::UnknownFile {
                    generator: self.name.to_string(),
                    file: file.clone(),
                })
            }
            Operation::Upload(FilePick::Kinds(kinds))
                if kinds.is_empty()
                    || kinds
                        .iter()
                        .any(|k| ctx.catalog.of_kind(*k).next().is_none()) =>
            {
                Err(ConfigError::EmptyFilePick {
                    generator: self.name.to_string(),
                })
            }
            Operation::Upload(pick) if pick.candidates(&ctx.catalog).is_empty() => {
                Err(ConfigError::EmptyFilePick {
                    generator: self.name.to_string(),
                })
            }
            Operation::Chat(_) if ctx.models.is_empty() => Err(ConfigError::EmptyModels),
            _ => Ok(()),
        }
    }

    /// Produces the next item. Generators are validated before the run, so `None` only
    /// happens for a context that changed after validation.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        ctx: &GeneratorContext,
        rng: &mut R,
    ) -> Option<WorkloadItem> {
        match &self.operation {
            Operation::Upload(pick) => {
                let file = pick.pick(&ctx.catalog, rng)?;
                Some(WorkloadItem {
                    name: file.name.clone(),
                    kind: file.kind,
                    payload: Payload::Upload {
                        file_name: file.name.clone(),
                        content_type: file.content_type,
                    },
                    size_bytes: file.size_bytes,
                })
            }
            Operation::Chat(shape) => {
                let request = shape.build(&ctx.models, rng);
                let body = Bytes::from(serde_json::to_vec(&request).ok()?);
                Some(WorkloadItem {
                    name: Arc::from(format!("chat {}", request.model)),
                    kind: ContentKind::ChatTurn,
                    size_bytes: body.len() as u64,
                    payload: Payload::Chat {
                        request: Arc::new(request),
                        body,
                    },
                })
            }
            Operation::Browse => Some(WorkloadItem {
                name: self.name.clone(),
                kind: ContentKind::Browse,
                payload: Payload::Browse,
                size_bytes: 0,
            }),
        }
    }
}
