// Client of the relay's `/api/transcription-proxy` route
//
// The relay resolves upstream credentials from the `x-api-endpoint` and
// `x-api-key` headers, falling back to its own defaults when they are absent.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;

use super::{decode, file_form, read_json, status_path, transcribe_path};
use super::{TranscriptionBackend, API_ENDPOINT_HEADER, API_KEY_HEADER};
use crate::config::Timeouts;
use crate::error::ClientError;
use crate::models::{AudioFile, StatusResponse, TranscribeRequest, UploadResponse};

/// Route served by the relay
pub const PROXY_ROUTE: &str = "/api/transcription-proxy";

/// Client going through the relay
#[derive(Clone, Debug)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    api_endpoint: Option<String>,
    api_key: Option<String>,
    timeouts: Timeouts,
}

impl RelayClient {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_endpoint: None,
            api_key: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Upstream endpoint forwarded to the relay
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    /// Upstream key forwarded to the relay
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), PROXY_ROUTE);
        debug!("{} {}?path={}", method, url, path);

        let mut request = self.http.request(method, url).query(&[("path", path)]);
        if let Some(endpoint) = &self.api_endpoint {
            request = request.header(API_ENDPOINT_HEADER, endpoint);
        }
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        request
    }
}

#[async_trait]
impl TranscriptionBackend for RelayClient {
    async fn upload(&self, file: &AudioFile) -> Result<String, ClientError> {
        info!("Uploading {} ({} bytes) through relay", file.name, file.size());

        let response = self
            .request(Method::POST, "upload")
            .multipart(file_form(file))
            .timeout(self.timeouts.upload)
            .send()
            .await?;

        let response: UploadResponse = decode(read_json(response).await?, "upload")?;
        Ok(response.file_id)
    }

    async fn start_transcription(
        &self,
        file_id: &str,
        language: Option<&str>,
    ) -> Result<Value, ClientError> {
        let body = TranscribeRequest {
            language: language.map(str::to_string),
        };

        let response = self
            .request(Method::POST, &transcribe_path(file_id))
            .json(&body)
            .timeout(self.timeouts.status)
            .send()
            .await?;

        read_json(response).await
    }

    async fn check_status(&self, file_id: &str) -> Result<StatusResponse, ClientError> {
        let response = self
            .request(Method::GET, &status_path(file_id))
            .timeout(self.timeouts.status)
            .send()
            .await?;

        decode(read_json(response).await?, "status")
    }
}
