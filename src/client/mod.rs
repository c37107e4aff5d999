//! Clients of the transcription service
//!
//! [`TranscriptionBackend`] is the contract the poller and the session are
//! written against. [`UpstreamClient`] talks to the upstream service directly,
//! [`RelayClient`] goes through the relay's `/api/transcription-proxy` route.

pub mod relay;
pub mod upstream;

use async_trait::async_trait;
use log::warn;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ClientError;
use crate::models::{AudioFile, StatusResponse};

pub use self::relay::RelayClient;
pub use self::upstream::UpstreamClient;

/// Header carrying the upstream API key
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the upstream endpoint, understood by the relay
pub const API_ENDPOINT_HEADER: &str = "x-api-endpoint";

/// Upload, start and status operations of a transcription service
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Upload a file and return the job identifier assigned to it
    ///
    /// Failures are returned as is; retrying is the caller's decision.
    async fn upload(&self, file: &AudioFile) -> Result<String, ClientError>;

    /// Ask the service to transcribe an uploaded file
    ///
    /// Returns the raw acknowledgement, which may already hold the result for
    /// short files.
    async fn start_transcription(
        &self,
        file_id: &str,
        language: Option<&str>,
    ) -> Result<Value, ClientError>;

    /// Current status of a job
    async fn check_status(&self, file_id: &str) -> Result<StatusResponse, ClientError>;
}

/// Read a JSON body, turning non-success statuses into transport errors
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let body = if text.is_empty() { None } else { Some(text) };
        return Err(ClientError::http_status(status.as_u16(), body));
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| ClientError::Transport {
        status: Some(status.as_u16()),
        message: format!("invalid JSON response: {}", e),
        body: Some(text),
    })
}

/// Decode a JSON value into a typed response
pub(crate) fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ClientError> {
    serde_json::from_value(value.clone()).map_err(|e| ClientError::Transport {
        status: None,
        message: format!("unexpected {} response: {}", what, e),
        body: Some(value.to_string()),
    })
}

/// Multipart form holding the file under the `file` field
pub(crate) fn file_form(file: &AudioFile) -> Form {
    let part = || Part::bytes(file.data.clone()).file_name(file.name.clone());

    let part = match &file.content_type {
        Some(content_type) => part().mime_str(content_type).unwrap_or_else(|e| {
            warn!("Ignoring invalid content type {}: {}", content_type, e);
            part()
        }),
        None => part(),
    };

    Form::new().part("file", part)
}

/// Path of the status route for a job
pub(crate) fn status_path(file_id: &str) -> String {
    format!("transcribe/{}/status", file_id)
}

/// Path of the transcribe route for a job
pub(crate) fn transcribe_path(file_id: &str) -> String {
    format!("transcribe/{}", file_id)
}
