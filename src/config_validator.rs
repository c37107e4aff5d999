// Configuration validation module for the transcription relay
//
// This module validates the relay's environment variables at start-up, so that
// configuration mistakes are reported with clear messages before the server
// binds. The validation is schema-driven: every known variable is described
// once in `CONFIG_PARAMS` with its type, default and constraints.

use std::env;
use std::net::IpAddr;

use log::{error, info, warn};

use crate::config::{defaults, env_vars};

/// Configuration parameter types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigType {
    /// IP address or host name
    Host,
    Port,
    UnsignedInteger,
    /// Absolute http(s) URL
    Url,
    String,
    Enum(&'static [&'static str]),
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must be valid for application to start
    Standard, // Important but application can start with defaults
    Warning,  // Optional, generates warnings only
}

/// Configuration parameter definition
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: &'static str,
    pub description: &'static str,
    pub param_type: ConfigType,
    pub default_value: Option<&'static str>,
    pub validation_level: ValidationLevel,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
}

const METRICS_BACKENDS: &[&str] = &["prometheus", "none", "null", "disabled"];

/// Centralized configuration parameter registry
pub const CONFIG_PARAMS: &[ConfigParam] = &[
    // Upstream defaults
    ConfigParam {
        name: env_vars::API_ENDPOINT,
        description: "Default upstream endpoint, used when requests carry no x-api-endpoint header",
        param_type: ConfigType::Url,
        default_value: None,
        validation_level: ValidationLevel::Standard,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: env_vars::API_KEY,
        description: "Default upstream API key, used when requests carry no x-api-key header",
        param_type: ConfigType::String,
        default_value: None,
        validation_level: ValidationLevel::Warning,
        min_value: None,
        max_value: None,
    },
    // Server Configuration
    ConfigParam {
        name: env_vars::HOST,
        description: "Host the relay binds to",
        param_type: ConfigType::Host,
        default_value: Some(defaults::HOST),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: env_vars::PORT,
        description: "Port the relay binds to",
        param_type: ConfigType::Port,
        default_value: Some("8080"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: env_vars::WORKERS,
        description: "Number of HTTP workers (0 for one per CPU)",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("0"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(0),
        max_value: Some(256),
    },
    // Upstream timeouts
    ConfigParam {
        name: env_vars::UPLOAD_TIMEOUT,
        description: "Timeout of upload requests in seconds",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("60"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(3600),
    },
    ConfigParam {
        name: env_vars::STATUS_TIMEOUT,
        description: "Timeout of status requests in seconds",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("30"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(600),
    },
    ConfigParam {
        name: env_vars::TRANSCRIBE_TIMEOUT,
        description: "Timeout of transcription requests in seconds",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("1800"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(86400),
    },
    ConfigParam {
        name: env_vars::MAX_UPLOAD_SIZE,
        description: "Maximum upload size accepted by the relay, in bytes",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("536870912"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1024),
        max_value: None,
    },
    // Progress estimation
    ConfigParam {
        name: env_vars::PROGRESS_RETENTION,
        description: "Hours a job start time is kept for progress estimation",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("24"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(720),
    },
    ConfigParam {
        name: env_vars::PROGRESS_CLEANUP_INTERVAL,
        description: "Hours between purges of stale start times",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("1"),
        validation_level: ValidationLevel::Warning,
        min_value: Some(1),
        max_value: Some(168),
    },
    // Metrics Configuration
    ConfigParam {
        name: env_vars::METRICS_BACKEND,
        description: "Metrics exporter",
        param_type: ConfigType::Enum(METRICS_BACKENDS),
        default_value: Some(defaults::METRICS_BACKEND),
        validation_level: ValidationLevel::Warning,
        min_value: None,
        max_value: None,
    },
    // Client workflow
    ConfigParam {
        name: env_vars::STATUS_RETRY_DELAY,
        description: "Seconds before retrying a failed status check",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("5"),
        validation_level: ValidationLevel::Warning,
        min_value: Some(1),
        max_value: Some(300),
    },
    ConfigParam {
        name: env_vars::LONG_FILE_THRESHOLD,
        description: "Files above this size in bytes are transcribed asynchronously",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("4194304"),
        validation_level: ValidationLevel::Warning,
        min_value: Some(0),
        max_value: None,
    },
];

/// Configuration validation errors with detailed context
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub error_type: ConfigErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErrorType {
    InvalidValue,
    InvalidFormat,
    InvalidRange,
    Incomplete,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Configuration error in '{}' ({:?}): {} (value: '{}')",
            self.field, self.error_type, self.message, self.value
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " - Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Configuration validation results
#[derive(Debug)]
pub struct ValidationResults {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
    /// False when a critical parameter is invalid
    pub is_valid: bool,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    fn add(&mut self, level: ValidationLevel, error: ConfigValidationError) {
        match level {
            ValidationLevel::Critical => {
                self.is_valid = false;
                self.errors.push(error);
            }
            ValidationLevel::Standard => self.errors.push(error),
            ValidationLevel::Warning => self.warnings.push(error),
        }
    }

    pub fn print_summary(&self) {
        if !self.errors.is_empty() {
            error!(
                "Configuration validation found {} error(s):",
                self.errors.len()
            );
            for (i, err) in self.errors.iter().enumerate() {
                error!("  {}. {}", i + 1, err);
            }
        }

        if !self.warnings.is_empty() {
            warn!(
                "Configuration validation found {} warning(s):",
                self.warnings.len()
            );
            for (i, warning) in self.warnings.iter().enumerate() {
                warn!("  {}. {}", i + 1, warning);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            info!("Configuration validation passed successfully");
        } else if self.is_valid {
            info!(
                "Configuration validation passed with {} issue(s), falling back to defaults",
                self.errors.len() + self.warnings.len()
            );
        }
    }
}

pub mod validators {
    use super::*;

    fn invalid(
        field: &str,
        value: &str,
        error_type: ConfigErrorType,
        message: String,
        suggestion: String,
    ) -> ConfigValidationError {
        ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            error_type,
            message,
            suggestion: Some(suggestion),
        }
    }

    /// Validate unsigned integer values with optional range
    pub fn validate_unsigned(
        field: &str,
        value: &str,
        min: Option<u64>,
        max: Option<u64>,
    ) -> ValidationResult<u64> {
        let parsed = value.trim().parse::<u64>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid unsigned integer format".to_string(),
                "Use a valid positive integer number".to_string(),
            )
        })?;

        if let Some(min) = min.filter(|min| parsed < *min) {
            return Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                format!("Value {} is below minimum {}", parsed, min),
                format!("Use a value >= {}", min),
            ));
        }

        if let Some(max) = max.filter(|max| parsed > *max) {
            return Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                format!("Value {} is above maximum {}", parsed, max),
                format!("Use a value <= {}", max),
            ));
        }

        Ok(parsed)
    }

    /// Validate port numbers
    pub fn validate_port(field: &str, value: &str) -> ValidationResult<u16> {
        match value.trim().parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                "Invalid port number".to_string(),
                "Use a port between 1 and 65535".to_string(),
            )),
        }
    }

    /// Validate an IP address or a plain host name
    pub fn validate_host(field: &str, value: &str) -> ValidationResult<()> {
        let value_trimmed = value.trim();
        if value_trimmed.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let is_hostname = !value_trimmed.is_empty()
            && value_trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if is_hostname {
            Ok(())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid host".to_string(),
                "Use an IP address such as 127.0.0.1 or a host name".to_string(),
            ))
        }
    }

    /// Validate an absolute http(s) URL
    pub fn validate_url(field: &str, value: &str) -> ValidationResult<()> {
        let value_trimmed = value.trim();
        let rest = value_trimmed
            .strip_prefix("https://")
            .or_else(|| value_trimmed.strip_prefix("http://"));

        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
            _ => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid URL".to_string(),
                "Use an absolute http:// or https:// URL".to_string(),
            )),
        }
    }

    /// Validate a value against a list of accepted values
    pub fn validate_enum(field: &str, value: &str, allowed: &[&str]) -> ValidationResult<()> {
        let normalized = value.trim().to_lowercase();
        if allowed.contains(&normalized.as_str()) {
            Ok(())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Unsupported value".to_string(),
                format!("Use one of: {}", allowed.join(", ")),
            ))
        }
    }
}

/// Validate one parameter value against its definition
pub fn validate_parameter(param: &ConfigParam, value: &str) -> ValidationResult<()> {
    match param.param_type {
        ConfigType::Host => validators::validate_host(param.name, value),
        ConfigType::Port => validators::validate_port(param.name, value).map(|_| ()),
        ConfigType::UnsignedInteger => {
            validators::validate_unsigned(param.name, value, param.min_value, param.max_value)
                .map(|_| ())
        }
        ConfigType::Url => validators::validate_url(param.name, value),
        ConfigType::String => Ok(()),
        ConfigType::Enum(allowed) => validators::validate_enum(param.name, value, allowed),
    }
}

/// Validate the configuration provided by `lookup`
///
/// Unset or empty parameters fall back to their defaults and are not reported.
pub fn validate_with<F>(lookup: F) -> ValidationResults
where
    F: Fn(&str) -> Option<String>,
{
    let mut results = ValidationResults::new();

    for param in CONFIG_PARAMS {
        let value = match lookup(param.name).filter(|v| !v.trim().is_empty()) {
            Some(value) => value,
            None => continue,
        };

        if let Err(error) = validate_parameter(param, &value) {
            results.add(param.validation_level, error);
        }
    }

    // Default credentials only make sense as a pair
    let endpoint = lookup(env_vars::API_ENDPOINT).filter(|v| !v.trim().is_empty());
    let api_key = lookup(env_vars::API_KEY).filter(|v| !v.trim().is_empty());
    if endpoint.is_some() != api_key.is_some() {
        let (missing, present) = if endpoint.is_some() {
            (env_vars::API_KEY, env_vars::API_ENDPOINT)
        } else {
            (env_vars::API_ENDPOINT, env_vars::API_KEY)
        };
        results.add(
            ValidationLevel::Warning,
            ConfigValidationError {
                field: missing.to_string(),
                value: String::new(),
                error_type: ConfigErrorType::Incomplete,
                message: format!("{} is set but {} is not", present, missing),
                suggestion: Some(format!(
                    "Set {} or let every request send both x-api-endpoint and x-api-key",
                    missing
                )),
            },
        );
    }

    results
}

/// Validate the process environment and log a summary
pub fn validate_environment() -> ValidationResults {
    info!("Validating relay configuration...");
    let results = validate_with(|key| env::var(key).ok());
    results.print_summary();
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn validate(pairs: &[(&str, &str)]) -> ValidationResults {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        validate_with(|key| values.get(key).cloned())
    }

    #[test]
    fn test_empty_environment_is_valid() {
        let results = validate(&[]);
        assert!(results.is_valid);
        assert!(results.errors.is_empty());
        assert!(results.warnings.is_empty());
    }

    #[test]
    fn test_every_default_passes_its_own_validation() {
        for param in CONFIG_PARAMS {
            if let Some(default) = param.default_value {
                assert!(
                    validate_parameter(param, default).is_ok(),
                    "default of {} rejected",
                    param.name
                );
            }
        }
    }

    #[test]
    fn test_invalid_port_is_critical() {
        let results = validate(&[(env_vars::PORT, "99999")]);
        assert!(!results.is_valid);
        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].field, env_vars::PORT);
    }

    #[test]
    fn test_out_of_range_timeout_is_standard_error() {
        let results = validate(&[(env_vars::STATUS_TIMEOUT, "0")]);
        assert!(results.is_valid);
        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].error_type, ConfigErrorType::InvalidRange);
    }

    #[test]
    fn test_unknown_metrics_backend_is_warning() {
        let results = validate(&[(env_vars::METRICS_BACKEND, "statsd")]);
        assert!(results.is_valid);
        assert!(results.errors.is_empty());
        assert_eq!(results.warnings.len(), 1);
    }

    #[test]
    fn test_half_configured_credentials_warn() {
        let results = validate(&[(env_vars::API_ENDPOINT, "https://stt.example")]);
        assert_eq!(results.warnings.len(), 1);
        assert_eq!(results.warnings[0].field, env_vars::API_KEY);
        assert_eq!(results.warnings[0].error_type, ConfigErrorType::Incomplete);
    }

    #[test]
    fn test_endpoint_must_be_url() {
        let results = validate(&[
            (env_vars::API_ENDPOINT, "stt.example"),
            (env_vars::API_KEY, "k"),
        ]);
        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].error_type, ConfigErrorType::InvalidFormat);
    }

    #[test]
    fn test_host_accepts_names_and_addresses() {
        assert!(validators::validate_host("H", "0.0.0.0").is_ok());
        assert!(validators::validate_host("H", "::1").is_ok());
        assert!(validators::validate_host("H", "relay.internal").is_ok());
        assert!(validators::validate_host("H", "bad host").is_err());
    }
}
