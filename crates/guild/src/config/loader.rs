use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that hold regardless of how the config was built.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.worker_count == 0 {
        return Err(invalid("worker_count must be at least 1"));
    }

    if config.queue_capacity == 0 {
        return Err(invalid("queue_capacity must be at least 1"));
    }

    if config.logging.filter.trim().is_empty() {
        return Err(invalid("logging.filter must not be empty"));
    }

    let stages = &config.stages;
    for (name, retry) in stages.retry_policies() {
        if retry.max_attempts == 0 {
            return Err(invalid(format!(
                "stages.{}.retry.max_attempts must be at least 1",
                name
            )));
        }
    }

    if stages.critique.accept_threshold > 10 {
        return Err(invalid("stages.critique.accept_threshold must be within 0..=10"));
    }

    if stages.trends.top_k == 0 {
        return Err(invalid("stages.trends.top_k must be at least 1"));
    }

    if stages.plan.top_n == 0 {
        return Err(invalid("stages.plan.top_n must be at least 1"));
    }

    let weights = [
        ("novelty_weight", stages.plan.novelty_weight),
        ("relevance_weight", stages.plan.relevance_weight),
    ];
    for (name, weight) in weights {
        if !(0.0..=1.0).contains(&weight) {
            return Err(invalid(format!(
                "stages.plan.{} must be within [0, 1], got {}",
                name, weight
            )));
        }
    }
    if stages.plan.novelty_weight + stages.plan.relevance_weight <= 0.0 {
        return Err(invalid("stages.plan weights must not both be zero"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
