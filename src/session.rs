//! Client-side transcription workflow
//!
//! A [`TranscriptionSession`] drives one job at a time through upload, start
//! and polling. Its state is published on a `watch` channel; every update is
//! applied only while the session's cancellation token is live, so a poll
//! task that resolves after [`TranscriptionSession::reset`] cannot touch the
//! fresh job.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::client::TranscriptionBackend;
use crate::config::PollingConfig;
use crate::error::ClientError;
use crate::job::{Job, JobStatus, DEFAULT_FAILURE_MESSAGE};
use crate::models::{AudioFile, UpstreamStatus};
use crate::poller::{classify, PollOutcome};
use crate::transcript::{Transcript, TranscriptPayload};

pub struct TranscriptionSession {
    backend: Arc<dyn TranscriptionBackend>,
    config: PollingConfig,
    state: Arc<watch::Sender<Job>>,
    cancel: Mutex<CancellationToken>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionSession {
    pub fn new(backend: Arc<dyn TranscriptionBackend>, config: PollingConfig) -> Self {
        let (state, _) = watch::channel(Job::default());
        Self {
            backend,
            config,
            state: Arc::new(state),
            cancel: Mutex::new(CancellationToken::new()),
            poll_task: Mutex::new(None),
        }
    }

    /// Receiver notified on every job update
    pub fn subscribe(&self) -> watch::Receiver<Job> {
        self.state.subscribe()
    }

    /// Copy of the current job
    pub fn snapshot(&self) -> Job {
        self.state.borrow().clone()
    }

    fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Stop polling and return to `idle`
    ///
    /// Upstream keeps working on the abandoned job.
    pub fn reset(&self) {
        {
            let mut token = self.cancel.lock();
            token.cancel();
            *token = CancellationToken::new();
        }
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
        self.state.send_replace(Job::default());
        debug!("Transcription session reset");
    }

    /// Upload a file as a new job, superseding the current one
    pub async fn upload_file(&self, file: &AudioFile) -> Result<String, ClientError> {
        self.reset();
        let token = self.token();
        let is_long_file = self.config.is_long_file(file.size());

        apply_if_live(&self.state, &token, |job| job.begin_upload(is_long_file))?;

        let uploaded = tokio::select! {
            _ = token.cancelled() => return Err(ClientError::Cancelled),
            uploaded = self.backend.upload(file) => uploaded,
        };

        match uploaded {
            Ok(job_id) => {
                info!("Uploaded {} as job {}", file.name, job_id);
                apply_if_live(&self.state, &token, |job| job.assign_id(job_id.clone()))?;
                Ok(job_id)
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", file.name, e);
                apply_if_live(&self.state, &token, |job| {
                    job.fail(format!("Upload failed: {}", e))
                })?;
                Err(e)
            }
        }
    }

    /// Request transcription of the uploaded file and start polling
    ///
    /// The start request runs in a detached task and polling begins at once.
    /// A failed start request is logged only.
    pub async fn start_transcription(&self, language: Option<&str>) -> Result<(), ClientError> {
        let token = self.token();
        let job_id = self.uploaded_job_id()?;

        apply_if_live(&self.state, &token, |job| {
            job.begin_transcription(false, Utc::now())
        })?;

        tokio::spawn(request_start(
            self.backend.clone(),
            token.clone(),
            job_id.clone(),
            language.map(str::to_string),
        ));

        self.schedule_polling(job_id, token)
    }

    /// Upload a file and drive it to a result or to polling
    ///
    /// Long files are started asynchronously. Short files are transcribed in
    /// a single request, falling back to polling when the answer holds no
    /// transcript.
    pub async fn process_audio_file(
        &self,
        file: &AudioFile,
        language: Option<&str>,
    ) -> Result<(), ClientError> {
        let job_id = self.upload_file(file).await?;

        if self.snapshot().is_long_file {
            debug!("Job {} is a long file, transcribing asynchronously", job_id);
            return self.start_transcription(language).await;
        }

        let token = self.token();
        apply_if_live(&self.state, &token, |job| {
            job.begin_transcription(true, Utc::now())
        })?;

        let acknowledged = tokio::select! {
            _ = token.cancelled() => return Err(ClientError::Cancelled),
            acknowledged = self.backend.start_transcription(&job_id, language) => acknowledged,
        };

        match acknowledged {
            Ok(ack) => {
                if let Some(transcript) = immediate_transcript(&ack) {
                    info!("Job {} transcribed in a single request", job_id);
                    return apply_if_live(&self.state, &token, |job| job.complete(transcript));
                }
            }
            Err(e) => warn!("Direct transcription of {} failed, polling: {}", job_id, e),
        }

        self.schedule_polling(job_id, token)
    }

    /// Wait until the current job completes or fails
    pub async fn wait_until_terminal(&self) -> Result<Transcript, ClientError> {
        let token = self.token();
        let mut receiver = self.subscribe();

        let job = tokio::select! {
            _ = token.cancelled() => return Err(ClientError::Cancelled),
            job = receiver.wait_for(|job| job.status.is_terminal()) => {
                job.map(|job| (*job).clone()).map_err(|_| ClientError::Cancelled)?
            }
        };

        match job.status {
            JobStatus::Completed => job.result.ok_or_else(|| {
                ClientError::UpstreamFailure(DEFAULT_FAILURE_MESSAGE.to_string())
            }),
            _ => Err(ClientError::UpstreamFailure(
                job.error
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            )),
        }
    }

    fn uploaded_job_id(&self) -> Result<String, ClientError> {
        let job = self.state.borrow();
        match (&job.job_id, job.status) {
            (Some(id), JobStatus::Uploading) => Ok(id.clone()),
            _ => Err(ClientError::InvalidTransition {
                from: job.status,
                to: JobStatus::Starting,
            }),
        }
    }

    fn schedule_polling(
        &self,
        job_id: String,
        token: CancellationToken,
    ) -> Result<(), ClientError> {
        apply_if_live(&self.state, &token, |job| job.begin_polling())?;

        let task = tokio::spawn(poll_until_terminal(
            self.backend.clone(),
            self.state.clone(),
            token,
            job_id,
            self.config.clone(),
        ));

        if let Some(previous) = self.poll_task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
    }
}

/// Apply `update` to the job unless the token was cancelled
fn apply_if_live<F>(
    state: &watch::Sender<Job>,
    token: &CancellationToken,
    update: F,
) -> Result<(), ClientError>
where
    F: FnOnce(&mut Job) -> Result<(), ClientError>,
{
    let mut outcome = Ok(());
    state.send_if_modified(|job| {
        if token.is_cancelled() {
            outcome = Err(ClientError::Cancelled);
            return false;
        }
        match update(job) {
            Ok(()) => true,
            Err(e) => {
                outcome = Err(e);
                false
            }
        }
    });
    outcome
}

/// Ask upstream to start a job, giving up when the session is reset
async fn request_start(
    backend: Arc<dyn TranscriptionBackend>,
    token: CancellationToken,
    job_id: String,
    language: Option<String>,
) {
    let started = tokio::select! {
        _ = token.cancelled() => return,
        started = backend.start_transcription(&job_id, language.as_deref()) => started,
    };
    match started {
        Ok(_) => info!("Transcription of {} requested", job_id),
        Err(e) => warn!(
            "Start request for {} failed, polling anyway: {}",
            job_id, e
        ),
    }
}

/// Transcript carried by a transcribe acknowledgement, if any
fn immediate_transcript(ack: &Value) -> Option<Transcript> {
    let status = ack
        .get("status")
        .cloned()
        .and_then(|s| serde_json::from_value::<UpstreamStatus>(s).ok());

    let payload = match (status, ack.get("result")) {
        (Some(UpstreamStatus::Completed), Some(result)) if !result.is_null() => {
            TranscriptPayload::detect(result)
        }
        _ => TranscriptPayload::detect(ack),
    };

    payload
        .is_recognized()
        .then(|| payload.into_transcript())
}

async fn poll_until_terminal(
    backend: Arc<dyn TranscriptionBackend>,
    state: Arc<watch::Sender<Job>>,
    token: CancellationToken,
    job_id: String,
    config: PollingConfig,
) {
    let mut attempt: u32 = 0;

    loop {
        let response = tokio::select! {
            _ = token.cancelled() => return,
            response = backend.check_status(&job_id) => response,
        };

        let delay = match response {
            Ok(response) => match classify(response) {
                PollOutcome::Completed(transcript) => {
                    info!("Transcription {} completed", job_id);
                    if let Err(e) = apply_if_live(&state, &token, |job| job.complete(transcript)) {
                        debug!("Dropping completion of {}: {}", job_id, e);
                    }
                    return;
                }
                PollOutcome::Failed(message) => {
                    warn!("Transcription {} failed: {}", job_id, message);
                    if let Err(e) = apply_if_live(&state, &token, |job| job.fail(message)) {
                        debug!("Dropping failure of {}: {}", job_id, e);
                    }
                    return;
                }
                PollOutcome::Pending { progress } => {
                    let recorded = apply_if_live(&state, &token, |job| {
                        job.record_progress(progress);
                        Ok(())
                    });
                    if recorded.is_err() {
                        return;
                    }
                    attempt = attempt.saturating_add(1);
                    config.strategy.delay(attempt)
                }
            },
            Err(e) => {
                debug!("Status check for {} failed, retrying: {}", job_id, e);
                config.status_retry_delay
            }
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = sleep(delay) => {}
        }
    }
}
