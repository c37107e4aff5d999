// Error handling for the transcription relay
//
// This module defines the error types of the client workflow and of the relay
// HTTP handlers, with the conversions between them and the HTTP mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::job::JobStatus;
use crate::models::ErrorResponse;

/// Errors raised by the client side of the workflow
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Endpoint or key missing; raised before any network activity
    #[error("API not configured: {0}")]
    Configuration(String),

    /// Network failure, timeout or non-success HTTP status
    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    /// Upstream reported the job as failed
    #[error("{0}")]
    UpstreamFailure(String),

    /// State machine misuse
    #[error("Invalid job transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// The session was reset while the operation was in flight
    #[error("Operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Create a transport error for a non-success HTTP status
    pub fn http_status(status: u16, body: Option<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: format!("upstream returned HTTP {}", status),
            body,
        }
    }

    /// HTTP status carried by a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        ClientError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message,
            body: None,
        }
    }
}

/// Errors returned by the relay handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Neither headers nor defaults provide endpoint and key
    #[error("API configuration missing")]
    MissingConfiguration,

    /// Upload request without a `file` field
    #[error("No file provided")]
    NoFile,

    /// Error when processing multipart form data
    #[error("Form error: {0}")]
    FormError(String),

    /// Unsupported `path` query parameter
    #[error("Invalid path")]
    InvalidPath(String),

    /// Error when a file is too large
    #[error("File too large: {0} bytes exceeds limit of {1} bytes")]
    FileTooLarge(usize, usize),

    /// Non-file request body over its limit
    #[error("Request body exceeds limit of {0} bytes")]
    BodyTooLarge(usize),

    /// Upstream rejected or never answered the upload
    #[error("Upload failed")]
    UploadFailed {
        status: Option<u16>,
        body: Option<String>,
    },
}

impl HandlerError {
    /// Create a new FormError
    pub fn form_error<S: Into<String>>(msg: S) -> Self {
        Self::FormError(msg.into())
    }
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::MissingConfiguration
            | HandlerError::NoFile
            | HandlerError::FormError(_)
            | HandlerError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            HandlerError::FileTooLarge(_, _) | HandlerError::BodyTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            HandlerError::UploadFailed { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            HandlerError::UploadFailed { body, .. } => body.clone(),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            details,
        })
    }
}

/// Convert an upload ClientError to HandlerError
impl From<ClientError> for HandlerError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Configuration(_) => HandlerError::MissingConfiguration,
            ClientError::Transport { status, body, message } => HandlerError::UploadFailed {
                status,
                body: body.or(Some(message)),
            },
            other => HandlerError::UploadFailed {
                status: None,
                body: Some(other.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_failure_propagates_upstream_status() {
        let err = HandlerError::from(ClientError::http_status(413, Some("too big".into())));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_upload_failure_without_status_is_bad_gateway() {
        let err = HandlerError::from(ClientError::Transport {
            status: None,
            message: "connection refused".into(),
            body: None,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_client_errors_map_to_bad_request() {
        assert_eq!(HandlerError::NoFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HandlerError::MissingConfiguration.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::InvalidPath("foo".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_transport_error_exposes_status() {
        assert_eq!(ClientError::http_status(503, None).status(), Some(503));
        assert_eq!(ClientError::Cancelled.status(), None);
    }
}
