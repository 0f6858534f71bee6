use std::path::PathBuf;
use thiserror::Error;

use crate::worker::job::JobStatus;

#[derive(Error, Debug)]
pub enum GuildError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Errors returned synchronously at the job interface boundary.
///
/// None of these ever touch a job's state: a rejected submission leaves
/// nothing in the registry, and lookups never create or modify jobs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid job input: {reason}")]
    InvalidInput { reason: String },

    #[error("Job not found: {id}")]
    NotFound { id: String },

    #[error("Job {id} has no result yet (status: {status})")]
    NotReady { id: String, status: JobStatus },

    #[error("Job queue is full")]
    QueueFull,

    #[error("Dispatcher is shut down")]
    ShutDown,
}

impl JobError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        JobError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn not_found(id: &str) -> Self {
        JobError::NotFound { id: id.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, GuildError>;
