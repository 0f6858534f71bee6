use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::{PipelineError, StageKind};
use crate::worker::job::JobStatus;

/// A status or stage transition of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    /// Same text as the matching log line.
    pub message: String,
    /// Set on the terminal event of a failed job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn new(
        job_id: &str,
        status: JobStatus,
        stage: Option<StageKind>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            stage,
            message: message.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: PipelineError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Fan-out of [`JobProgressEvent`]s to any number of subscribers.
///
/// Publishing never blocks. Slow subscribers lose the oldest events once
/// `capacity` is exceeded; the per-job [`LogChannel`](super::LogChannel) is
/// the lossless record.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns how many subscribers received the event; 0 when nobody listens.
    pub fn send(&self, event: JobProgressEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_receivers() {
        let broadcaster = JobProgressBroadcaster::new(4);
        let delivered =
            broadcaster.send(JobProgressEvent::new("job-1", JobStatus::Pending, None, "queued"));

        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_stage_event() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let delivered = broadcaster.send(JobProgressEvent::new(
            "job-1",
            JobStatus::Running,
            Some(StageKind::Summarize),
            "stage Summarize started",
        ));

        assert_eq!(delivered, 1);
        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.status, JobStatus::Running);
        assert_eq!(received.stage, Some(StageKind::Summarize));
        assert!(!received.is_terminal());
    }

    #[test]
    fn test_failed_event_json() {
        let event = JobProgressEvent::new("job-9", JobStatus::Failed, Some(StageKind::Fetch), "failed")
            .with_error(PipelineError::Cancelled {
                stage: StageKind::Fetch,
            });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "job-9");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "cancelled");
        assert!(event.is_terminal());

        let done = serde_json::to_value(JobProgressEvent::new("j", JobStatus::Done, None, "ok")).unwrap();
        assert!(done.get("stage").is_none());
        assert!(done.get("error").is_none());
    }
}
