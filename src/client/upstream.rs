// Direct client of the upstream transcription service
//
// Routes:
// - POST {endpoint}/api/upload                  (multipart `file`)
// - POST {endpoint}/api/transcribe/{file_id}    (JSON `{language}`)
// - GET  {endpoint}/api/transcribe/{file_id}/status

use async_trait::async_trait;
use log::{debug, error, info};
use serde_json::Value;

use super::{decode, file_form, read_json, status_path, transcribe_path};
use super::{TranscriptionBackend, API_KEY_HEADER};
use crate::config::{ApiCredentials, Timeouts};
use crate::error::ClientError;
use crate::models::{AudioFile, StatusResponse, TranscribeRequest, UploadResponse};

/// Client of the upstream `/api` routes
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: reqwest::Client,
    credentials: ApiCredentials,
    timeouts: Timeouts,
}

impl UpstreamClient {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self::with_client(reqwest::Client::new(), credentials, Timeouts::default())
    }

    /// Build a client sharing an existing connection pool
    pub fn with_client(
        http: reqwest::Client,
        credentials: ApiCredentials,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            http,
            credentials,
            timeouts,
        }
    }

    /// Full URL of an upstream subpath
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/api/{}",
            self.credentials.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Upload a file and return upstream's JSON answer untouched
    pub async fn upload_json(&self, file: &AudioFile) -> Result<Value, ClientError> {
        let url = self.url("upload");
        info!("Uploading {} ({} bytes) to {}", file.name, file.size(), url);

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .multipart(file_form(file))
            .timeout(self.timeouts.upload)
            .send()
            .await?;

        read_json(response).await.inspect_err(|e| {
            error!("Upload to {} failed: {}", url, e);
        })
    }

    /// GET an upstream subpath
    pub async fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .timeout(self.timeouts.status)
            .send()
            .await?;

        read_json(response).await
    }

    /// Request transcription of an uploaded file
    pub async fn transcribe(
        &self,
        file_id: &str,
        language: Option<&str>,
    ) -> Result<Value, ClientError> {
        let url = self.url(&transcribe_path(file_id));
        info!("Starting transcription of {}", file_id);

        let body = TranscribeRequest {
            language: language.map(str::to_string),
        };

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .json(&body)
            .timeout(self.timeouts.transcribe)
            .send()
            .await?;

        read_json(response).await
    }
}

#[async_trait]
impl TranscriptionBackend for UpstreamClient {
    async fn upload(&self, file: &AudioFile) -> Result<String, ClientError> {
        let response: UploadResponse = decode(self.upload_json(file).await?, "upload")?;
        Ok(response.file_id)
    }

    async fn start_transcription(
        &self,
        file_id: &str,
        language: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.transcribe(file_id, language).await
    }

    async fn check_status(&self, file_id: &str) -> Result<StatusResponse, ClientError> {
        decode(self.get_json(&status_path(file_id)).await?, "status")
    }
}
