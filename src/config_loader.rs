// Configuration loader for the transcription relay
//
// This module handles loading configuration from the TOML configuration file
// and environment variables with appropriate precedence.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};
use toml::Value;

const CONFIG_FILE_PATH: &str = "transcription_relay.conf";

/// Environment variable overriding the configuration file location
pub const CONFIG_FILE_ENV: &str = "TRANSCRIPTION_RELAY_CONFIG";

fn config_path() -> PathBuf {
    env::var(CONFIG_FILE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_PATH))
}

/// Parse a flat TOML document into key-value pairs
///
/// Arrays and tables are skipped with a warning.
pub fn parse_config(content: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let table: toml::Table = content.parse()?;
    let mut config_map = HashMap::new();

    for (key, value) in table {
        match value {
            Value::String(s) => {
                config_map.insert(key, s);
            }
            Value::Integer(i) => {
                config_map.insert(key, i.to_string());
            }
            Value::Float(f) => {
                config_map.insert(key, f.to_string());
            }
            Value::Boolean(b) => {
                config_map.insert(key, b.to_string());
            }
            _ => {
                warn!("Skipping unsupported TOML value type for key: {}", key);
            }
        }
    }

    Ok(config_map)
}

/// Loads configuration from TOML file and environment variables
///
/// Configuration precedence (highest to lowest):
/// 1. Environment variables
/// 2. Configuration file values
/// 3. Default values (not handled here - application defaults)
///
/// # Returns
///
/// Returns true if the config file was successfully loaded, false otherwise
pub fn load_config() -> bool {
    let config_path = config_path();

    if !config_path.exists() {
        debug!("Configuration file not found at: {}", config_path.display());
        return false;
    }

    let config_content = match fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read configuration file: {}", e);
            return false;
        }
    };

    let config_map = match parse_config(&config_content) {
        Ok(values) => values,
        Err(e) => {
            warn!("Failed to parse configuration file: {}", e);
            return false;
        }
    };

    // Set environment variables from config file if they don't already exist
    for (key, value) in config_map {
        if env::var(&key).is_err() {
            debug!("Setting env var from config file: {} = {}", key, value);
            env::set_var(key, value);
        } else {
            debug!("Env var already exists, skipping: {}", key);
        }
    }

    info!("Configuration loaded from {}", config_path.display());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_values_are_stringified() {
        let config = parse_config(
            r#"
API_ENDPOINT = "https://stt.example"
RELAY_PORT = 9090
PROGRESS_RETENTION_HOURS = 12
"#,
        )
        .unwrap();

        assert_eq!(config["API_ENDPOINT"], "https://stt.example");
        assert_eq!(config["RELAY_PORT"], "9090");
        assert_eq!(config["PROGRESS_RETENTION_HOURS"], "12");
    }

    #[test]
    fn test_nested_values_are_skipped() {
        let config = parse_config(
            r#"
METRICS_BACKEND = "none"
ALLOWED = ["a", "b"]

[section]
KEY = "value"
"#,
        )
        .unwrap();

        assert_eq!(config.len(), 1);
        assert_eq!(config["METRICS_BACKEND"], "none");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(parse_config("RELAY_PORT = ").is_err());
    }
}
