use std::time::Duration;

use serde::Deserialize;

use crate::error::ProtocolError;
use crate::workload::Payload;

pub const DEFAULT_HEALTH_LATENCY_BOUND: Duration = Duration::from_millis(3000);

/// What makes a response count as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contract {
    /// 200 with a JSON array whose first element carries an `id`.
    Upload,
    /// 200 with `choices[0].message.content`.
    Chat,
    /// 200 within the latency bound.
    Health { latency_bound: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractCheck {
    pub success: bool,
    /// Server-assigned id of an uploaded file.
    pub file_id: Option<String>,
    /// `ceil(chars / 4)` of the reply content.
    pub estimated_tokens: u64,
    /// Named boolean checks, recorded into the `checks` rate.
    pub checks: Vec<(&'static str, bool)>,
}

#[derive(Deserialize)]
struct UploadedFile {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl Contract {
    #[must_use]
    pub fn for_payload(payload: &Payload, latency_bound: Duration) -> Self {
        match payload {
            Payload::Upload { .. } => Self::Upload,
            Payload::Chat { .. } => Self::Chat,
            Payload::Browse => Self::Health { latency_bound },
        }
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Chat => "chat",
            Self::Health { .. } => "health",
        }
    }

    /// A non-200 status is an unsuccessful outcome, not an error. A 200 whose body breaks the
    /// contract is a [`ProtocolError`].
    pub fn check(
        &self,
        status: u16,
        body: &[u8],
        latency: Duration,
    ) -> Result<ContractCheck, ProtocolError> {
        match self {
            Self::Health { latency_bound } => {
                let status_ok = status == 200;
                let fast_enough = latency < *latency_bound;
                Ok(ContractCheck {
                    success: status_ok && fast_enough,
                    checks: vec![
                        ("health status is 200", status_ok),
                        ("health latency within bound", fast_enough),
                    ],
                    ..ContractCheck::default()
                })
            }
            _ if status != 200 => Ok(ContractCheck::default()),
            Self::Upload => check_upload(body),
            Self::Chat => check_chat(body),
        }
    }
}

fn check_upload(body: &[u8]) -> Result<ContractCheck, ProtocolError> {
    let files: Vec<UploadedFile> = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::new("upload", format!("expected a JSON array: {e}"), body))?;

    let id = files
        .first()
        .ok_or_else(|| ProtocolError::new("upload", "empty file list", body))?
        .id
        .as_ref()
        .filter(|id| !id.is_null())
        .ok_or_else(|| ProtocolError::new("upload", "first element has no `id`", body))?;

    let file_id = match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok(ContractCheck {
        success: true,
        file_id: Some(file_id),
        ..ContractCheck::default()
    })
}

fn check_chat(body: &[u8]) -> Result<ContractCheck, ProtocolError> {
    let completion: ChatCompletion = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::new("chat", format!("invalid completion JSON: {e}"), body))?;

    let content = completion
        .choices
        .first()
        .ok_or_else(|| ProtocolError::new("chat", "no choices", body))?
        .message
        .as_ref()
        .and_then(|m| m.content.as_deref())
        .ok_or_else(|| ProtocolError::new("chat", "choices[0] has no message.content", body))?;

    Ok(ContractCheck {
        success: true,
        estimated_tokens: estimate_tokens(content),
        ..ContractCheck::default()
    })
}

/// Rough token count: one token per four characters, rounded up.
#[must_use]
pub fn estimate_tokens(content: &str) -> u64 {
    (content.chars().count() as u64).div_ceil(4)
}
