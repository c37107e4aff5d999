//! Prometheus metrics exporter
//!
//! Metric families are created lazily on first use and registered in a
//! private registry, which `export` renders in the text exposition format.

use crate::metrics::error::{validation, MetricsError};
use crate::metrics::metrics::MetricsExporter;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Prometheus implementation of MetricsExporter
pub struct PrometheusExporter {
    registry: Registry,
    counters: DashMap<String, CounterVec>,
    gauges: DashMap<String, GaugeVec>,
    histograms: DashMap<String, HistogramVec>,
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusExporter {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
        }
    }

    fn help_text(name: &str) -> String {
        name.split('_')
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Bucket layout picked from the metric name
    fn histogram_buckets(name: &str) -> Vec<f64> {
        if name.contains("bytes") || name.contains("size") {
            vec![
                65536.0, 262144.0, 1048576.0, 4194304.0, 16777216.0, 67108864.0, 268435456.0,
            ]
        } else if name.contains("percent") || name.contains("progress") {
            vec![5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0]
        } else {
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        }
    }

    /// Sort labels by key so the same metric always sees the same label order
    fn split_labels<'a>(labels: &'a [(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut sorted = labels.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        sorted.into_iter().unzip()
    }

    fn check_type_conflict(&self, name: &str, metric_type: &str) -> Result<(), MetricsError> {
        let existing = [
            (self.counters.contains_key(name), "counter"),
            (self.gauges.contains_key(name), "gauge"),
            (self.histograms.contains_key(name), "histogram"),
        ];
        match existing
            .iter()
            .find(|(exists, kind)| *exists && *kind != metric_type)
        {
            Some((_, kind)) => Err(MetricsError::registration_failed(
                name,
                format!("already registered as {}", kind),
            )),
            None => Ok(()),
        }
    }

    fn register<C>(&self, name: &str, collector: &C) -> Result<(), MetricsError>
    where
        C: prometheus::core::Collector + Clone + 'static,
    {
        self.registry
            .register(Box::new(collector.clone()))
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))
    }

    fn counter(&self, name: &str, label_names: &[&str]) -> Result<CounterVec, MetricsError> {
        let full_name = name.to_string();
        self.check_type_conflict(&full_name, "counter")?;

        match self.counters.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let counter =
                    CounterVec::new(Opts::new(&full_name, Self::help_text(name)), label_names)
                        .map_err(|err| MetricsError::registration_failed(name, err.to_string()))?;
                self.register(name, &counter)?;
                Ok(e.insert(counter).clone())
            }
        }
    }

    fn gauge(&self, name: &str, label_names: &[&str]) -> Result<GaugeVec, MetricsError> {
        let full_name = name.to_string();
        self.check_type_conflict(&full_name, "gauge")?;

        match self.gauges.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let gauge =
                    GaugeVec::new(Opts::new(&full_name, Self::help_text(name)), label_names)
                        .map_err(|err| MetricsError::registration_failed(name, err.to_string()))?;
                self.register(name, &gauge)?;
                Ok(e.insert(gauge).clone())
            }
        }
    }

    fn histogram(&self, name: &str, label_names: &[&str]) -> Result<HistogramVec, MetricsError> {
        let full_name = name.to_string();
        self.check_type_conflict(&full_name, "histogram")?;

        match self.histograms.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let opts = HistogramOpts::new(&full_name, Self::help_text(name))
                    .buckets(Self::histogram_buckets(name));
                let histogram = HistogramVec::new(opts, label_names)
                    .map_err(|err| MetricsError::registration_failed(name, err.to_string()))?;
                self.register(name, &histogram)?;
                Ok(e.insert(histogram).clone())
            }
        }
    }
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        let (label_names, label_values) = Self::split_labels(labels);

        let counter = self.counter(name, &label_names)?;
        counter
            .get_metric_with_label_values(&label_values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .inc();
        debug!("Incremented counter {} with labels {:?}", name, labels);
        Ok(())
    }

    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        validation::validate_numeric_value(value)?;
        let (label_names, label_values) = Self::split_labels(labels);

        let gauge = self.gauge(name, &label_names)?;
        gauge
            .get_metric_with_label_values(&label_values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .set(value);
        Ok(())
    }

    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        validation::validate_numeric_value(value)?;
        let (label_names, label_values) = Self::split_labels(labels);

        let histogram = self.histogram(name, &label_names)?;
        histogram
            .get_metric_with_label_values(&label_values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .observe(value);
        Ok(())
    }

    async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::export_failed(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_export_contains_recorded_metrics() {
        let exporter = PrometheusExporter::new();
        exporter
            .increment("proxy_requests_total", &[("route", "status"), ("method", "GET")])
            .await
            .unwrap();
        exporter
            .increment("proxy_requests_total", &[("method", "GET"), ("route", "status")])
            .await
            .unwrap();
        exporter.set_gauge("tracked_jobs", 3.0, &[]).await.unwrap();
        exporter
            .observe_histogram("upload_bytes", 1024.0, &[])
            .await
            .unwrap();

        let text = String::from_utf8(exporter.export().await.unwrap()).unwrap();
        assert!(text.contains("proxy_requests_total{method=\"GET\",route=\"status\"} 2"));
        assert!(text.contains("tracked_jobs 3"));
        assert!(text.contains("upload_bytes_count 1"));
    }

    #[tokio::test]
    async fn test_type_conflict_is_rejected() {
        let exporter = PrometheusExporter::new();
        exporter.increment("jobs", &[]).await.unwrap();
        let result = exporter.set_gauge("jobs", 1.0, &[]).await;
        assert!(matches!(result, Err(MetricsError::RegistrationFailed { .. })));
    }

    #[tokio::test]
    async fn test_invalid_inputs_are_rejected() {
        let exporter = PrometheusExporter::new();
        assert!(matches!(
            exporter.increment("", &[]).await,
            Err(MetricsError::InvalidName { .. })
        ));
        assert!(matches!(
            exporter.set_gauge("valid", f64::INFINITY, &[]).await,
            Err(MetricsError::InvalidValue { .. })
        ));
        assert!(matches!(
            exporter.increment("valid", &[("", "x")]).await,
            Err(MetricsError::InvalidLabel { .. })
        ));
    }
}
