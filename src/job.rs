//! Client-side job state machine
//!
//! A [`Job`] tracks one upload-to-result transcription as the caller sees it.
//! Transitions are validated against a fixed table; terminal states only leave
//! through an explicit reset, which replaces the job with [`Job::default`].

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::progress::ESTIMATE_CEILING;
use crate::transcript::Transcript;

/// Progress shown once the transcription request has been issued
pub const INITIAL_PROGRESS: u8 = 5;

/// Step applied when a status response carries no progress
pub const PROGRESS_STEP: u8 = 2;

/// Message used when upstream fails a job without explanation
pub const DEFAULT_FAILURE_MESSAGE: &str = "Transcription failed";

/// Progress after a non-terminal status response, given the current value
pub fn next_progress(current: u8, reported: Option<f64>) -> u8 {
    let next = match reported {
        Some(p) if p.is_finite() && p > 0.0 => p.round().clamp(0.0, 100.0) as u8,
        _ => current.saturating_add(PROGRESS_STEP).min(ESTIMATE_CEILING),
    };
    next.max(current)
}

/// Client-observed job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Uploading,
    /// Transcription request issued, polling not started yet
    Starting,
    /// Short file transcribed within a single request
    Transcribing,
    Polling,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States in which upstream is working on the job
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            JobStatus::Starting | JobStatus::Transcribing | JobStatus::Polling
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, Starting | Transcribing | Polling | Failed)
                | (Starting, Polling | Failed)
                | (Transcribing, Polling | Completed | Failed)
                | (Polling, Polling | Completed | Failed)
        )
    }
}

/// One transcription task as observed by the caller
#[derive(Debug, Clone, Default, Serialize)]
pub struct Job {
    /// Identifier assigned by upstream at upload time
    pub job_id: Option<String>,
    pub status: JobStatus,
    /// 0 to 100, never decreasing within a session
    pub progress: u8,
    /// When transcription was requested
    pub started_at: Option<DateTime<Utc>>,
    pub is_long_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    fn transition(&mut self, next: JobStatus) -> Result<(), ClientError> {
        if !self.status.can_transition_to(next) {
            return Err(ClientError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if self.status != next {
            debug!(
                "Job {} moving from {:?} to {:?}",
                self.job_id.as_deref().unwrap_or("<none>"),
                self.status,
                next
            );
        }
        self.status = next;
        Ok(())
    }

    /// Upload started
    pub fn begin_upload(&mut self, is_long_file: bool) -> Result<(), ClientError> {
        self.transition(JobStatus::Uploading)?;
        self.is_long_file = is_long_file;
        Ok(())
    }

    /// Upload succeeded; the identifier is fixed from now on
    pub fn assign_id(&mut self, job_id: String) -> Result<(), ClientError> {
        if self.status != JobStatus::Uploading || self.job_id.is_some() {
            return Err(ClientError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        self.job_id = Some(job_id);
        Ok(())
    }

    /// Transcription requested, either asynchronously or in a single request
    pub fn begin_transcription(
        &mut self,
        direct: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let next = if direct {
            JobStatus::Transcribing
        } else {
            JobStatus::Starting
        };
        self.transition(next)?;
        self.started_at = Some(now);
        self.raise_progress(INITIAL_PROGRESS);
        Ok(())
    }

    pub fn begin_polling(&mut self) -> Result<(), ClientError> {
        self.transition(JobStatus::Polling)
    }

    /// Apply the progress of a non-terminal status response
    ///
    /// A positive upstream value is taken as is; otherwise the job creeps
    /// forward by a small step, never beyond the estimate ceiling.
    pub fn record_progress(&mut self, reported: Option<f64>) {
        if !self.status.is_processing() {
            return;
        }
        self.raise_progress(next_progress(self.progress, reported));
    }

    fn raise_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }

    pub fn complete(&mut self, transcript: Transcript) -> Result<(), ClientError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.result = Some(transcript);
        self.error = None;
        Ok(())
    }

    pub fn fail<S: Into<String>>(&mut self, message: S) -> Result<(), ClientError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(message.into());
        self.result = None;
        Ok(())
    }
}
