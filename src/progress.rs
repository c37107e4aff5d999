//! Progress estimation for jobs whose upstream status carries no progress
//!
//! The estimate is a deterministic function of the job identifier, the time
//! the job was first seen processing, and the current time. A coarse 30 second
//! bucket combined with a per-job seed adds a small jitter so that concurrent
//! jobs do not move in lockstep, while repeated calls inside one bucket return
//! the same value.
//!
//! Start times live in a side-table owned by [`ProgressEstimator`]. Entries are
//! inserted once per job, removed when the job reaches a terminal status, and
//! purged by a periodic cleanup task after a retention period.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use log::{debug, info};
use serde_json::Value;

use crate::models::UpstreamStatus;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound of any estimate; only upstream may report completion
pub const ESTIMATE_CEILING: u8 = 95;

const BUCKET_MILLIS: i64 = 30_000;

/// Sum of the UTF-16 code units of the job identifier
pub fn progress_seed(job_id: &str) -> u64 {
    job_id.encode_utf16().map(u64::from).sum()
}

/// Coarse time bucket that changes every 30 seconds
pub fn time_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().div_euclid(BUCKET_MILLIS)
}

/// Per-job jitter in [0, 0.9]
pub fn jitter(job_id: &str, now: DateTime<Utc>) -> f64 {
    let bucket = time_bucket(now).rem_euclid(10) as u64;
    ((progress_seed(job_id) % 10 + bucket) % 10) as f64 / 10.0
}

/// Piecewise linear progress curve, before jitter
///
/// * 0 to 2 minutes: 0 to 30%
/// * 2 to 7 minutes: 30 to 70%
/// * beyond: 70% plus 25 points per 10 minutes, capped at 95%
pub fn baseline_progress(elapsed_minutes: f64) -> f64 {
    let minutes = if elapsed_minutes.is_finite() {
        elapsed_minutes.max(0.0)
    } else {
        0.0
    };

    let progress = if minutes < 2.0 {
        (minutes / 2.0) * 30.0
    } else if minutes < 7.0 {
        30.0 + ((minutes - 2.0) / 5.0) * 40.0
    } else {
        70.0 + ((minutes - 7.0) / 10.0) * 25.0
    };

    progress.min(ESTIMATE_CEILING as f64)
}

/// Estimated progress of a job started at `started_at`, observed at `now`
pub fn estimate_progress(job_id: &str, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u8 {
    let elapsed_minutes = (now - started_at).num_milliseconds() as f64 / 60_000.0;
    let dampened = baseline_progress(elapsed_minutes) * (0.95 + jitter(job_id, now) * 0.1);
    dampened.round().clamp(0.0, ESTIMATE_CEILING as f64) as u8
}

/// Extract the job identifier from a relayed subpath such as
/// `transcribe/{file_id}/status`
pub fn job_id_from_path(path: &str) -> Option<&str> {
    let mut segments = path.trim_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("transcribe"), Some(id)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Process-wide estimator with its start-time side-table
#[derive(Debug, Default)]
pub struct ProgressEstimator {
    start_times: DashMap<String, DateTime<Utc>>,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start time of a job, keeping the first recorded value
    pub fn mark_started(&self, job_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        *self
            .start_times
            .entry(job_id.to_string())
            .or_insert_with(|| {
                debug!("Recording start time for job {}", job_id);
                now
            })
    }

    /// Recorded start time of a job
    pub fn started_at(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.start_times.get(job_id).map(|entry| *entry)
    }

    /// Estimate the progress of a job, recording its start time on first use
    pub fn estimate(&self, job_id: &str, now: DateTime<Utc>) -> u8 {
        let started_at = self.mark_started(job_id, now);
        estimate_progress(job_id, started_at, now)
    }

    /// Drop the start time of a job
    pub fn forget(&self, job_id: &str) -> bool {
        self.start_times.remove(job_id).is_some()
    }

    /// Number of jobs currently tracked
    pub fn tracked_jobs(&self) -> usize {
        self.start_times.len()
    }

    /// Remove entries recorded before `cutoff`, returning how many were removed
    pub fn purge_started_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.start_times.len();
        self.start_times.retain(|_, started_at| *started_at >= cutoff);
        before.saturating_sub(self.start_times.len())
    }

    /// Fill in a missing progress value on a relayed status payload
    ///
    /// Only `processing` responses without a `progress` key are touched.
    /// Terminal responses release the job's start time. Returns the injected
    /// estimate, if any.
    pub fn annotate_status(
        &self,
        path: &str,
        data: &mut Value,
        now: DateTime<Utc>,
    ) -> Option<u8> {
        let job_id = job_id_from_path(path)?;
        let status = data
            .get("status")
            .cloned()
            .and_then(|status| serde_json::from_value::<UpstreamStatus>(status).ok())?;

        if status.is_terminal() {
            if self.forget(job_id) {
                debug!("Released start time of finished job {}", job_id);
            }
            return None;
        }
        // Any `progress` key, even null, is upstream's
        if status != UpstreamStatus::Processing || data.get("progress").is_some() {
            return None;
        }

        let progress = self.estimate(job_id, now);
        data.as_object_mut()?
            .insert("progress".to_string(), Value::from(progress));
        Some(progress)
    }

    /// Periodically purge start times older than `retention`
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration, retention: Duration) {
        info!(
            "Starting progress cleanup task: retention {:?}, interval {:?}",
            retention, interval
        );

        let retention = ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::hours(24));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                let removed = self.purge_started_before(Utc::now() - retention);
                if removed > 0 {
                    info!("Purged {} stale progress entries", removed);
                } else {
                    debug!("No stale progress entries to purge");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_seed_sums_char_codes() {
        assert_eq!(progress_seed("ab"), 97 + 98);
        assert_eq!(progress_seed(""), 0);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for secs in (0..600).step_by(7) {
            let j = jitter("file-123", at(secs));
            assert!((0.0..=0.9).contains(&j));
        }
    }

    #[test]
    fn test_estimate_is_bounded() {
        let ids = ["a", "file-123", "ff00aa", "日本語", ""];
        for id in ids {
            for minutes in [0i64, 1, 2, 5, 7, 12, 17, 30, 600] {
                let start = at(0);
                let now = at(minutes * 60 + 13);
                let value = estimate_progress(id, start, now);
                assert!(value <= ESTIMATE_CEILING, "{} at {}m gave {}", id, minutes, value);
            }
        }
    }

    #[test]
    fn test_estimate_before_start_is_zero() {
        assert_eq!(estimate_progress("job", at(100), at(0)), 0);
    }

    #[test]
    fn test_same_bucket_gives_same_value() {
        let estimator = ProgressEstimator::new();
        estimator.mark_started("job-42", at(-600));
        let first = estimator.estimate("job-42", at(12));
        let second = estimator.estimate("job-42", at(12));
        assert_eq!(first, second);
        // 1_700_000_010 opens a 30s bucket
        assert_eq!(time_bucket(at(10)), time_bucket(at(39)));
        assert_eq!(jitter("job-42", at(10)), jitter("job-42", at(39)));
        assert_ne!(time_bucket(at(9)), time_bucket(at(10)));
    }

    #[test]
    fn test_baseline_is_non_decreasing() {
        let mut previous = 0.0;
        let mut minutes = 0.0;
        while minutes < 40.0 {
            let value = baseline_progress(minutes);
            assert!(value >= previous);
            previous = value;
            minutes += 0.25;
        }
        assert_eq!(baseline_progress(2.0), 30.0);
        assert_eq!(baseline_progress(7.0), 70.0);
        assert_eq!(baseline_progress(17.0), 95.0);
        assert_eq!(baseline_progress(100.0), 95.0);
    }

    #[test]
    fn test_job_id_from_path() {
        assert_eq!(job_id_from_path("transcribe/abc/status"), Some("abc"));
        assert_eq!(job_id_from_path("/transcribe/abc/status"), Some("abc"));
        assert_eq!(job_id_from_path("upload"), None);
        assert_eq!(job_id_from_path("transcribe/"), None);
    }

    #[test]
    fn test_start_time_recorded_once() {
        let estimator = ProgressEstimator::new();
        let first = estimator.mark_started("job", at(0));
        let second = estimator.mark_started("job", at(300));
        assert_eq!(first, second);
        assert_eq!(estimator.started_at("job"), Some(at(0)));
    }

    #[test]
    fn test_start_times_are_per_job() {
        let estimator = ProgressEstimator::new();
        estimator.mark_started("a", at(0));
        estimator.mark_started("b", at(600));
        assert_eq!(estimator.started_at("a"), Some(at(0)));
        assert_eq!(estimator.started_at("b"), Some(at(600)));
        assert!(estimator.forget("a"));
        assert_eq!(estimator.started_at("a"), None);
        assert_eq!(estimator.tracked_jobs(), 1);
    }

    #[test]
    fn test_annotate_injects_missing_progress() {
        let estimator = ProgressEstimator::new();
        estimator.mark_started("abc", at(0));
        let mut data = json!({"status": "processing"});

        let injected = estimator.annotate_status("transcribe/abc/status", &mut data, at(300));
        let expected = estimate_progress("abc", at(0), at(300));
        assert_eq!(injected, Some(expected));
        assert_eq!(data["progress"], json!(expected));
    }

    #[test]
    fn test_annotate_keeps_explicit_progress() {
        let estimator = ProgressEstimator::new();
        let mut data = json!({"status": "processing", "progress": 12});
        assert_eq!(estimator.annotate_status("transcribe/abc/status", &mut data, at(0)), None);
        assert_eq!(data["progress"], json!(12));
        assert_eq!(estimator.tracked_jobs(), 0);
    }

    #[test]
    fn test_annotate_ignores_pending() {
        let estimator = ProgressEstimator::new();
        let mut data = json!({"status": "pending"});
        assert_eq!(estimator.annotate_status("transcribe/abc/status", &mut data, at(0)), None);
        assert!(data.get("progress").is_none());
    }

    #[test]
    fn test_annotate_keeps_null_progress() {
        let estimator = ProgressEstimator::new();
        let mut data = json!({"status": "processing", "progress": null});
        assert_eq!(estimator.annotate_status("transcribe/abc/status", &mut data, at(0)), None);
        assert_eq!(data["progress"], Value::Null);
        assert_eq!(estimator.tracked_jobs(), 0);
    }

    #[test]
    fn test_failed_status_releases_start_time() {
        let estimator = ProgressEstimator::new();
        estimator.mark_started("abc", at(0));
        let mut data = json!({"status": "failed", "error": "boom"});
        assert_eq!(estimator.annotate_status("transcribe/abc/status", &mut data, at(60)), None);
        assert!(estimator.started_at("abc").is_none());
    }

    #[test]
    fn test_terminal_status_releases_start_time() {
        let estimator = ProgressEstimator::new();
        estimator.mark_started("abc", at(0));
        let mut data = json!({"status": "completed", "result": {"text": "x"}});
        estimator.annotate_status("transcribe/abc/status", &mut data, at(60));
        assert_eq!(estimator.tracked_jobs(), 0);
    }

    #[test]
    fn test_purge_removes_old_entries() {
        let estimator = ProgressEstimator::new();
        estimator.mark_started("old", at(0));
        estimator.mark_started("new", at(3600));
        assert_eq!(estimator.purge_started_before(at(1800)), 1);
        assert_eq!(estimator.started_at("old"), None);
        assert!(estimator.started_at("new").is_some());
    }
}
