// Transcription relay metrics
//
// This module contains the metrics for the relay.
// It provides a pluggable exporter and a facade with relay-specific helpers.

pub mod error;
#[allow(clippy::module_inception)]
pub mod metrics;
pub mod null;
pub mod prometheus;

pub use self::error::MetricsError;
pub use self::metrics::{create_metrics_exporter, Metrics, MetricsExporter};
