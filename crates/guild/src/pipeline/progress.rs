use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, LogChannel, LogLevel};
use crate::worker::job::{Job, JobStatus};

use super::stage::StageKind;

/// Events emitted by the pipeline while it drives a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted(StageKind),
    StageCompleted(StageKind),
    StageFailed { stage: StageKind, reason: String },
    /// Cancellation was observed between stages, before `next` started.
    Cancelled { next: StageKind },
    /// Free-form line from inside a stage.
    Message { level: LogLevel, text: String },
}

impl ProgressEvent {
    /// The log line this event turns into.
    pub fn to_log_line(&self) -> (LogLevel, String) {
        match self {
            ProgressEvent::StageStarted(stage) => {
                (LogLevel::Info, format!("stage {} started", stage))
            }
            ProgressEvent::StageCompleted(stage) => {
                (LogLevel::Info, format!("stage {} completed", stage))
            }
            ProgressEvent::StageFailed { stage, reason } => {
                (LogLevel::Error, format!("stage {} failed: {}", stage, reason))
            }
            ProgressEvent::Cancelled { next } => (
                LogLevel::Warn,
                format!("pipeline cancelled before stage {}", next),
            ),
            ProgressEvent::Message { level, text } => (*level, text.clone()),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

impl ProgressReporter for LogChannel {
    fn report(&self, event: ProgressEvent) {
        let (level, line) = event.to_log_line();
        self.append(level, line);
    }
}

/// Bridges pipeline events into a job: its log channel, its current stage,
/// and (optionally) the progress broadcaster.
pub struct JobProgress<'a> {
    job: &'a Job,
    broadcaster: Option<&'a JobProgressBroadcaster>,
}

impl<'a> JobProgress<'a> {
    pub fn new(job: &'a Job, broadcaster: Option<&'a JobProgressBroadcaster>) -> Self {
        Self { job, broadcaster }
    }

    fn broadcast(&self, stage: Option<StageKind>, message: &str) {
        if let Some(broadcaster) = self.broadcaster {
            broadcaster.send(JobProgressEvent::new(
                self.job.id(),
                JobStatus::Running,
                stage,
                message,
            ));
        }
    }
}

impl ProgressReporter for JobProgress<'_> {
    fn report(&self, event: ProgressEvent) {
        let (level, line) = event.to_log_line();
        match &event {
            ProgressEvent::StageStarted(stage) => {
                self.job.set_current_stage(*stage);
                self.broadcast(Some(*stage), &line);
            }
            ProgressEvent::StageCompleted(stage) | ProgressEvent::StageFailed { stage, .. } => {
                self.broadcast(Some(*stage), &line);
            }
            ProgressEvent::Cancelled { next } => {
                self.broadcast(Some(*next), &line);
            }
            ProgressEvent::Message { .. } => {}
        }
        self.job.logs().append(level, line);
    }
}
