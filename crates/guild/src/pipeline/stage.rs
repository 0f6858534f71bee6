use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::broadcast::LogLevel;

use super::cancel::CancelToken;
use super::context::ResearchContext;
use super::error::StageError;
use super::progress::{ProgressEvent, ProgressReporter};

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Fetch,
    Summarize,
    Critique,
    AnalyzeTrends,
    Plan,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Fetch,
        StageKind::Summarize,
        StageKind::Critique,
        StageKind::AnalyzeTrends,
        StageKind::Plan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Fetch => "Fetch",
            StageKind::Summarize => "Summarize",
            StageKind::Critique => "Critique",
            StageKind::AnalyzeTrends => "AnalyzeTrends",
            StageKind::Plan => "Plan",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One pluggable unit of pipeline work.
///
/// Implementations get the accumulated context by reference and return a
/// complete replacement. Long-running handlers must call
/// [`StageScope::checkpoint`] at least once per externally observable
/// sub-step (per network call, per item of a batch).
pub trait StageHandler: Send + Sync {
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError>;
}

impl<F> StageHandler for F
where
    F: Fn(&ResearchContext, &StageScope<'_>) -> Result<ResearchContext, StageError> + Send + Sync,
{
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        self(ctx, scope)
    }
}

/// What a running stage may see of its job: the cancellation signal and the
/// job's log channel.
pub struct StageScope<'a> {
    stage: StageKind,
    cancel: &'a CancelToken,
    progress: &'a dyn ProgressReporter,
}

impl<'a> StageScope<'a> {
    pub fn new(stage: StageKind, cancel: &'a CancelToken, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            stage,
            cancel,
            progress,
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `Err(StageError::Cancelled)` once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), StageError> {
        if self.is_cancelled() {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.progress.report(ProgressEvent::Message {
            level,
            text: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }
}

/// The five handlers a pipeline is built from. Every field is required, so a
/// `Pipeline` can never be missing a stage.
#[derive(Clone)]
pub struct StageSet {
    pub fetch: Arc<dyn StageHandler>,
    pub summarize: Arc<dyn StageHandler>,
    pub critique: Arc<dyn StageHandler>,
    pub analyze_trends: Arc<dyn StageHandler>,
    pub plan: Arc<dyn StageHandler>,
}

impl StageSet {
    /// Returns a copy with the handler for `kind` replaced.
    pub fn replace(mut self, kind: StageKind, handler: Arc<dyn StageHandler>) -> Self {
        match kind {
            StageKind::Fetch => self.fetch = handler,
            StageKind::Summarize => self.summarize = handler,
            StageKind::Critique => self.critique = handler,
            StageKind::AnalyzeTrends => self.analyze_trends = handler,
            StageKind::Plan => self.plan = handler,
        }
        self
    }
}

pub struct Stage {
    kind: StageKind,
    handler: Arc<dyn StageHandler>,
}

impl Stage {
    pub fn new(kind: StageKind, handler: Arc<dyn StageHandler>) -> Self {
        Self { kind, handler }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        self.handler.execute(ctx, scope)
    }
}
