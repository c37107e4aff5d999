//! Status polling
//!
//! [`classify`] turns one status response into a [`PollOutcome`];
//! [`poll_transcription_status`] is the standalone helper that keeps checking
//! a job until it reaches a terminal state.

use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::backoff::{BackoffStrategy, STATUS_RETRY_DELAY};
use crate::client::TranscriptionBackend;
use crate::error::ClientError;
use crate::job::{next_progress, DEFAULT_FAILURE_MESSAGE, INITIAL_PROGRESS};
use crate::models::{StatusResponse, UpstreamStatus};
use crate::transcript::Transcript;

/// What a status response means for the job
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(Transcript),
    Failed(String),
    /// Still running; `progress` is the value upstream reported, if any
    Pending { progress: Option<f64> },
}

/// Interpret a well-formed status response
///
/// A `completed` status without a result is treated as still running.
pub fn classify(response: StatusResponse) -> PollOutcome {
    match response.status {
        UpstreamStatus::Completed => match response.result {
            Some(result) => PollOutcome::Completed(Transcript::from_result(&result)),
            None => {
                debug!("Completed status without result, continuing to poll");
                PollOutcome::Pending {
                    progress: response.progress,
                }
            }
        },
        UpstreamStatus::Failed => PollOutcome::Failed(
            response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        ),
        _ => PollOutcome::Pending {
            progress: response.progress,
        },
    }
}

/// Poll a job until it completes or fails
///
/// Failed status requests are retried after a fixed delay, without limit.
/// `on_progress` receives the job progress after every non-terminal response.
pub async fn poll_transcription_status<B, F>(
    backend: &B,
    file_id: &str,
    strategy: BackoffStrategy,
    mut on_progress: F,
    cancel: &CancellationToken,
) -> Result<Transcript, ClientError>
where
    B: TranscriptionBackend + ?Sized,
    F: FnMut(u8) + Send,
{
    let mut attempt: u32 = 0;
    let mut progress = INITIAL_PROGRESS;

    loop {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = backend.check_status(file_id) => response,
        };

        let delay = match response {
            Ok(response) => match classify(response) {
                PollOutcome::Completed(transcript) => {
                    info!("Transcription {} completed", file_id);
                    return Ok(transcript);
                }
                PollOutcome::Failed(message) => {
                    warn!("Transcription {} failed: {}", file_id, message);
                    return Err(ClientError::UpstreamFailure(message));
                }
                PollOutcome::Pending { progress: reported } => {
                    progress = next_progress(progress, reported);
                    on_progress(progress);
                    attempt = attempt.saturating_add(1);
                    strategy.delay(attempt)
                }
            },
            Err(e) => {
                warn!("Status check for {} failed, retrying: {}", file_id, e);
                STATUS_RETRY_DELAY
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioFile;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    fn status(value: Value) -> StatusResponse {
        serde_json::from_value(value).unwrap()
    }

    /// Backend replaying scripted status responses, then `processing` forever
    struct ScriptedBackend {
        statuses: Mutex<VecDeque<Result<StatusResponse, ClientError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(statuses: Vec<Result<StatusResponse, ClientError>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TranscriptionBackend for ScriptedBackend {
        async fn upload(&self, _file: &AudioFile) -> Result<String, ClientError> {
            Ok("abc".into())
        }

        async fn start_transcription(
            &self,
            _file_id: &str,
            _language: Option<&str>,
        ) -> Result<Value, ClientError> {
            Ok(Value::Null)
        }

        async fn check_status(&self, _file_id: &str) -> Result<StatusResponse, ClientError> {
            self.calls.lock().push(Instant::now());
            self.statuses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(status(json!({"status": "processing"}))))
        }
    }

    #[test]
    fn test_failed_status_carries_upstream_message() {
        let outcome = classify(status(json!({"status": "failed", "error": "boom"})));
        assert_eq!(outcome, PollOutcome::Failed("boom".into()));
    }

    #[test]
    fn test_failed_status_without_message_uses_default() {
        let outcome = classify(status(json!({"status": "failed"})));
        assert_eq!(outcome, PollOutcome::Failed(DEFAULT_FAILURE_MESSAGE.into()));
    }

    #[test]
    fn test_completed_without_result_is_pending() {
        let outcome = classify(status(json!({"status": "completed"})));
        assert_eq!(outcome, PollOutcome::Pending { progress: None });
    }

    #[test]
    fn test_completed_with_result_is_normalized() {
        let outcome = classify(status(json!({
            "status": "completed",
            "result": {"text": "hello", "segments": []}
        })));
        match outcome {
            PollOutcome::Completed(transcript) => assert_eq!(transcript.text, "hello"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_processing_keeps_reported_progress() {
        let outcome = classify(status(json!({"status": "processing", "progress": 42.0})));
        assert_eq!(outcome, PollOutcome::Pending { progress: Some(42.0) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_between_checks() {
        let backend = ScriptedBackend::new(vec![
            Ok(status(json!({"status": "pending"}))),
            Ok(status(json!({"status": "processing"}))),
            Ok(status(json!({"status": "completed", "result": {"text": "done"}}))),
        ]);
        let mut seen = Vec::new();

        let transcript = poll_transcription_status(
            &backend,
            "abc",
            BackoffStrategy::exponential(),
            |p| seen.push(p),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(transcript.text, "done");
        assert_eq!(seen, vec![7, 9]);

        let calls = backend.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(first_gap >= Duration::from_millis(7500));
        assert!(first_gap < Duration::from_millis(7600));
        assert!(second_gap >= Duration::from_millis(11250));
        assert!(second_gap < Duration::from_millis(11350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried_after_fixed_delay() {
        let backend = ScriptedBackend::new(vec![
            Err(ClientError::http_status(503, None)),
            Ok(status(json!({"status": "failed", "error": "boom"}))),
        ]);

        let err = poll_transcription_status(
            &backend,
            "abc",
            BackoffStrategy::exponential(),
            |_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::UpstreamFailure(ref m) if m == "boom"));
        let calls = backend.calls.lock().clone();
        assert!(calls[1] - calls[0] >= STATUS_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let backend = ScriptedBackend::new(Vec::new());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let err = poll_transcription_status(
            &backend,
            "abc",
            BackoffStrategy::fixed(),
            |_| {},
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::Cancelled));
        assert!(backend.calls.lock().len() <= 5);
    }
}
