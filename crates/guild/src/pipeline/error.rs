use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::StageKind;

/// What a stage handler reports back to the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Domain-level failure, e.g. the retrieval API returned nothing.
    #[error("{0}")]
    Failed(String),

    /// Retryable failure of a single external call. Only the stage-internal
    /// retry helper interprets this; the pipeline treats it like `Failed`.
    #[error("{0}")]
    Transient(String),

    /// The stage observed the job's cancellation signal.
    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        StageError::Transient(message.into())
    }
}

/// Terminal error of a job.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("stage {stage} failed: {cause}")]
    StageFailure { stage: StageKind, cause: String },

    #[error("cancelled at stage {stage}")]
    Cancelled { stage: StageKind },

    #[error("internal fault: {detail}")]
    InternalFault {
        stage: Option<StageKind>,
        detail: String,
    },
}

impl PipelineError {
    pub fn from_stage(stage: StageKind, err: StageError) -> Self {
        match err {
            StageError::Cancelled => PipelineError::Cancelled { stage },
            StageError::Failed(cause) | StageError::Transient(cause) => {
                PipelineError::StageFailure { stage, cause }
            }
        }
    }

    pub fn stage(&self) -> Option<StageKind> {
        match self {
            PipelineError::StageFailure { stage, .. } | PipelineError::Cancelled { stage } => {
                Some(*stage)
            }
            PipelineError::InternalFault { stage, .. } => *stage,
        }
    }

    /// Short reason used in the `stage <name> failed: <reason>` log line.
    pub fn reason(&self) -> String {
        match self {
            PipelineError::StageFailure { cause, .. } => cause.clone(),
            PipelineError::Cancelled { .. } => "cancelled".to_string(),
            PipelineError::InternalFault { detail, .. } => format!("internal fault: {}", detail),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}
