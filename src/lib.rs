// Transcription Relay Library
//
// This crate drives audio files through an external transcription service
// (upload, start, poll) and provides an HTTP relay that forwards browser
// requests to that service while estimating progress for long jobs.

pub mod backoff;
pub mod client;
pub mod config;
pub mod config_loader;
pub mod config_validator;
pub mod error;
pub mod file_utils;
pub mod handlers;
pub mod job;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod progress;
pub mod session;
pub mod transcript;

// Re-export common types for easier access
pub use backoff::BackoffStrategy;
pub use client::{RelayClient, TranscriptionBackend, UpstreamClient};
pub use config::{ApiCredentials, PollingConfig, RelayConfig, Timeouts};
pub use error::{ClientError, HandlerError};
pub use job::{Job, JobStatus};
pub use metrics::metrics::Metrics;
pub use models::{AudioFile, ErrorResponse, StatusResponse, UpstreamStatus};
pub use poller::poll_transcription_status;
pub use progress::ProgressEstimator;
pub use session::TranscriptionSession;
pub use transcript::{Segment, Transcript};
