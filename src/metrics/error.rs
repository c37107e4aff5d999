//! Error types for the metrics system
//!
//! Metric operations never panic; every failure surfaces as a [`MetricsError`]
//! which the [`Metrics`](super::Metrics) facade logs and swallows.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MetricsError {
    /// Invalid metric name (empty, invalid characters)
    #[error("Invalid metric name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid label name or value
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    /// Metric registration failed (duplicate registration, type conflict)
    #[error("Failed to register metric '{name}': {reason}")]
    RegistrationFailed { name: String, reason: String },

    #[error("Failed to export metrics: {reason}")]
    ExportFailed { reason: String },

    /// Value is NaN, infinite or too large for an f64 counter
    #[error("Invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },
}

impl MetricsError {
    pub fn invalid_name<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_label<L: Into<String>, R: Into<String>>(label: L, reason: R) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub fn registration_failed<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::RegistrationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn export_failed<R: Into<String>>(reason: R) -> Self {
        Self::ExportFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_value<V: fmt::Display, R: Into<String>>(value: V, reason: R) -> Self {
        Self::InvalidValue {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Validation of metric names, labels and values against Prometheus rules
pub mod validation {
    use super::MetricsError;
    use std::collections::HashSet;

    const RESERVED_LABELS: &[&str] = &["__name__", "__value__"];
    const MAX_LABEL_VALUE_LENGTH: usize = 1024;
    const MAX_LABELS_PER_METRIC: usize = 16;

    /// Names start with a letter or underscore and contain only
    /// alphanumerics, underscores and colons
    pub fn validate_metric_name(name: &str) -> Result<(), MetricsError> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(MetricsError::invalid_name(name, "Metric name cannot be empty")),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
                return Err(MetricsError::invalid_name(
                    name,
                    "Metric name must start with a letter or underscore",
                ))
            }
            Some(_) => {}
        }

        if let Some((i, ch)) = name
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '_' && *ch != ':')
        {
            return Err(MetricsError::invalid_name(
                name,
                format!("Invalid character '{}' at position {}", ch, i),
            ));
        }

        Ok(())
    }

    pub fn validate_label_key(key: &str) -> Result<(), MetricsError> {
        if RESERVED_LABELS.contains(&key) {
            return Err(MetricsError::invalid_label(key, "Label key is reserved"));
        }
        match key.chars().next() {
            None => Err(MetricsError::invalid_label(key, "Label key cannot be empty")),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
                Err(MetricsError::invalid_label(
                    key,
                    "Label key must start with a letter or underscore",
                ))
            }
            Some(_) if key.chars().any(|ch| !ch.is_ascii_alphanumeric() && ch != '_') => Err(
                MetricsError::invalid_label(key, "Label key contains invalid characters"),
            ),
            Some(_) => Ok(()),
        }
    }

    pub fn validate_label_value(value: &str) -> Result<(), MetricsError> {
        if value.len() > MAX_LABEL_VALUE_LENGTH {
            return Err(MetricsError::invalid_label(
                value,
                format!(
                    "Label value too long (max {} characters)",
                    MAX_LABEL_VALUE_LENGTH
                ),
            ));
        }
        if value.chars().any(char::is_control) {
            return Err(MetricsError::invalid_label(
                value,
                "Label value contains control characters",
            ));
        }
        Ok(())
    }

    pub fn validate_labels(labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        if labels.len() > MAX_LABELS_PER_METRIC {
            return Err(MetricsError::invalid_label(
                "",
                format!("Too many labels (max {} allowed)", MAX_LABELS_PER_METRIC),
            ));
        }

        let mut seen = HashSet::new();
        for (key, value) in labels {
            validate_label_key(key)?;
            validate_label_value(value)?;
            if !seen.insert(*key) {
                return Err(MetricsError::invalid_label(*key, "Duplicate label key"));
            }
        }
        Ok(())
    }

    pub fn validate_numeric_value(value: f64) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::invalid_value(
                value,
                "Value must be finite (not NaN or infinite)",
            ));
        }
        if value.abs() > (1u64 << 53) as f64 {
            return Err(MetricsError::invalid_value(
                value,
                "Value too large, may lose precision in f64",
            ));
        }
        Ok(())
    }
}
