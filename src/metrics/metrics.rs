//! Metrics for the transcription relay
//!
//! A pluggable exporter ([`MetricsExporter`]) sits behind the [`Metrics`]
//! facade. The facade's recording methods never fail: exporter errors are
//! logged and dropped so that request handling is never affected.
//!
//! ```rust,no_run
//! use transcription_relay::metrics::{create_metrics_exporter, Metrics};
//!
//! #[tokio::main]
//! async fn main() {
//!     let metrics = Metrics::new(create_metrics_exporter("prometheus"));
//!     metrics.record_proxy_request("GET", "status", 200, 0.042).await;
//!     metrics.set_tracked_jobs(3).await;
//!
//!     let text = metrics.export().await.unwrap_or_default();
//!     println!("{}", String::from_utf8_lossy(&text));
//! }
//! ```

use crate::metrics::error::MetricsError;
use crate::metrics::null::NullExporter;
use crate::metrics::prometheus::PrometheusExporter;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

/// Interface of a monitoring backend
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Increment a counter by 1
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError>;

    /// Set a gauge to a value
    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Record one observation in a histogram
    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Render all metrics in the backend's exposition format
    async fn export(&self) -> Result<Vec<u8>, MetricsError>;
}

/// Metrics facade for the application
#[derive(Clone)]
pub struct Metrics {
    exporter: Arc<dyn MetricsExporter>,
}

impl Metrics {
    pub fn new(exporter: Arc<dyn MetricsExporter>) -> Self {
        Self { exporter }
    }

    /// Facade discarding everything
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullExporter))
    }

    pub async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        self.exporter.export().await
    }

    /// Record one request served by the proxy route
    pub async fn record_proxy_request(
        &self,
        method: &str,
        route: &str,
        status: u16,
        duration: f64,
    ) {
        let status = status.to_string();
        let labels = [("method", method), ("route", route), ("status", status.as_str())];

        self.increment("relay_proxy_requests_total", &labels).await;
        self.observe_histogram("relay_proxy_request_duration_seconds", duration, &labels)
            .await;
    }

    /// Record an upstream call that failed or timed out
    pub async fn record_upstream_failure(&self, route: &str, kind: &str) {
        self.increment(
            "relay_upstream_failures_total",
            &[("route", route), ("kind", kind)],
        )
        .await;
    }

    /// Record a progress value injected by the estimator
    pub async fn record_progress_estimate(&self, progress: u8) {
        self.observe_histogram("relay_estimated_progress_percent", f64::from(progress), &[])
            .await;
    }

    /// Number of jobs whose start time is tracked
    pub async fn set_tracked_jobs(&self, count: usize) {
        self.set_gauge("relay_tracked_jobs", count as f64, &[]).await;
    }

    pub async fn record_upload_size(&self, bytes: usize) {
        self.observe_histogram("relay_upload_bytes", bytes as f64, &[])
            .await;
    }

    async fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        if let Err(e) = self.exporter.increment(name, labels).await {
            warn!("Failed to increment counter '{}': {}", name, e);
        }
    }

    async fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.exporter.set_gauge(name, value, labels).await {
            warn!("Failed to set gauge '{}': {}", name, e);
        }
    }

    async fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.exporter.observe_histogram(name, value, labels).await {
            warn!("Failed to observe histogram '{}': {}", name, e);
        }
    }
}

/// Factory function to create metrics exporter based on configuration
pub fn create_metrics_exporter(exporter_type: &str) -> Arc<dyn MetricsExporter> {
    match exporter_type.trim().to_lowercase().as_str() {
        "prometheus" => {
            debug!("Initializing Prometheus metrics exporter");
            Arc::new(PrometheusExporter::new())
        }
        "none" | "null" | "disabled" => {
            debug!("Metrics disabled, using null exporter");
            Arc::new(NullExporter)
        }
        other => {
            warn!(
                "Unknown metrics exporter type '{}', using null exporter",
                other
            );
            Arc::new(NullExporter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_domain_helpers_reach_prometheus() {
        let metrics = Metrics::new(create_metrics_exporter("prometheus"));
        metrics.record_proxy_request("GET", "status", 200, 0.01).await;
        metrics.record_upstream_failure("status", "timeout").await;
        metrics.record_progress_estimate(42).await;
        metrics.set_tracked_jobs(2).await;
        metrics.record_upload_size(5_000_000).await;

        let text = String::from_utf8(metrics.export().await.unwrap()).unwrap();
        assert!(text.contains("relay_proxy_requests_total"));
        assert!(
            text.contains("relay_upstream_failures_total{kind=\"timeout\",route=\"status\"} 1")
        );
        assert!(text.contains("relay_estimated_progress_percent_count 1"));
        assert!(text.contains("relay_tracked_jobs 2"));
        assert!(text.contains("relay_upload_bytes_sum 5000000"));
    }

    #[tokio::test]
    async fn test_disabled_metrics_export_nothing() {
        let metrics = Metrics::disabled();
        metrics.record_proxy_request("POST", "upload", 413, 0.2).await;
        assert!(metrics.export().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_backend_falls_back_to_null() {
        let metrics = Metrics::new(create_metrics_exporter("statsd"));
        metrics.set_tracked_jobs(1).await;
        assert!(metrics.export().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exporter_errors_are_swallowed() {
        let metrics = Metrics::new(create_metrics_exporter("prometheus"));
        metrics.set_gauge("relay_tracked_jobs", f64::NAN, &[]).await;
        metrics.increment("relay_tracked_jobs", &[]).await;
        assert!(metrics.export().await.is_ok());
    }
}
