// Transcription relay data models
//
// This module contains the wire types exchanged with the upstream transcription
// service and the request/response bodies of the relay endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message returned in place of a failed status check
pub const PENDING_MESSAGE: &str = "Status check temporarily unavailable, continuing to poll";

/// Audio payload handed to an upload client
#[derive(Debug, Clone)]
pub struct AudioFile {
    /// File name forwarded in the multipart part
    pub name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl AudioFile {
    pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Response of `POST /api/upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Opaque job identifier assigned by upstream
    pub file_id: String,
}

/// Body of `POST /api/transcribe/{file_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// Language hint, `None` for automatic detection
    #[serde(default)]
    pub language: Option<String>,
}

/// Upstream job status vocabulary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Any status string upstream may add later
    #[serde(other)]
    Unknown,
}

impl UpstreamStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpstreamStatus::Completed | UpstreamStatus::Failed)
    }
}

/// Response of `GET /api/transcribe/{file_id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: UpstreamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Informational message, set by the relay on synthetic responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    /// Synthetic response the relay returns when upstream is unreachable
    pub fn pending() -> Self {
        Self {
            status: UpstreamStatus::Pending,
            progress: None,
            result: None,
            error: None,
            message: Some(PENDING_MESSAGE.to_string()),
        }
    }
}

/// Response of the relay's `POST ?path=transcribe/{file_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionStarted {
    pub status: UpstreamStatus,
    pub message: String,
    pub file_id: String,
}

/// Error response for the relay
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Upstream body or other detail, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
