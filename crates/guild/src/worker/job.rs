use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::LogChannel;
use crate::error::JobError;
use crate::pipeline::{CancelToken, PipelineError, ResearchContext, ResearchResult, StageKind};

pub const MAX_QUERY_LEN: usize = 512;
pub const MAX_RESULTS_LIMIT: u32 = 500;

const DEFAULT_DAYS: u32 = 2;
const DEFAULT_MAX_RESULTS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured query a job is submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    #[serde(alias = "topic")]
    pub query: String,
    /// Look-back window for paper retrieval.
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_days() -> u32 {
    DEFAULT_DAYS
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

impl JobInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            days: DEFAULT_DAYS,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Parses and validates a JSON payload such as `{"query": "..."}`.
    pub fn from_json(raw: &str) -> Result<Self, JobError> {
        let input: JobInput = serde_json::from_str(raw)
            .map_err(|e| JobError::invalid(format!("malformed input: {}", e)))?;
        input.validated()
    }

    /// Returns the input with its query trimmed, or `InvalidInput`.
    pub fn validated(mut self) -> Result<Self, JobError> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            return Err(JobError::invalid("query must not be empty"));
        }
        if trimmed.chars().count() > MAX_QUERY_LEN {
            return Err(JobError::invalid(format!(
                "query exceeds {} characters",
                MAX_QUERY_LEN
            )));
        }
        if self.days == 0 {
            return Err(JobError::invalid("days must be at least 1"));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(JobError::invalid(format!(
                "max_results must be between 1 and {}",
                MAX_RESULTS_LIMIT
            )));
        }
        self.query = trimmed.to_string();
        Ok(self)
    }
}

/// Terminal outcome of a job. Exactly one of result or error exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum JobOutcome {
    Done(ResearchResult),
    Failed(PipelineError),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Done(_) => JobStatus::Done,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&ResearchResult> {
        match self {
            JobOutcome::Done(result) => Some(result),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            JobOutcome::Done(_) => None,
            JobOutcome::Failed(err) => Some(err),
        }
    }
}

/// Point-in-time view of a job, as returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub query: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageKind>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    pub cancel_requested: bool,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    current_stage: Option<StageKind>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<JobOutcome>,
    /// Context as left by the last successful stage.
    context: Option<ResearchContext>,
}

/// One end-to-end pipeline run with its status, logs and outcome.
///
/// Jobs are shared as `Arc<Job>` between the registry, the queue and the
/// worker running them. Status only moves forward; the worker that won
/// [`Job::try_start`] is the only one allowed to call [`Job::finish`].
#[derive(Debug)]
pub struct Job {
    id: String,
    input: JobInput,
    created_at: DateTime<Utc>,
    state: RwLock<JobState>,
    logs: LogChannel,
    cancel: CancelToken,
}

impl Job {
    pub fn new(input: JobInput) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            logs: LogChannel::new(id.clone()),
            id,
            input,
            created_at: Utc::now(),
            state: RwLock::new(JobState {
                status: JobStatus::Pending,
                current_stage: None,
                started_at: None,
                finished_at: None,
                outcome: None,
                context: None,
            }),
            cancel: CancelToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &JobInput {
        &self.input
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn logs(&self) -> &LogChannel {
        &self.logs
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn status(&self) -> JobStatus {
        self.read_state().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn current_stage(&self) -> Option<StageKind> {
        self.read_state().current_stage
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.read_state();
        JobSnapshot {
            id: self.id.clone(),
            query: self.input.query.clone(),
            status: state.status,
            current_stage: state.current_stage,
            created_at: self.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            error: state.outcome.as_ref().and_then(|o| o.error().cloned()),
            cancel_requested: self.cancel.is_cancelled(),
        }
    }

    /// The terminal outcome, or `None` while the job is still active.
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.read_state().outcome.clone()
    }

    pub fn final_context(&self) -> Option<ResearchContext> {
        self.read_state().context.clone()
    }

    /// Requests cooperative cancellation. Returns `false` for a job that is
    /// already terminal or was already asked to cancel.
    pub fn request_cancel(&self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.cancel.cancel()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Claims the job for execution: `Pending -> Running`. Returns `false` if
    /// another caller already claimed it.
    pub(crate) fn try_start(&self) -> bool {
        let mut state = self.write_state();
        if state.status != JobStatus::Pending {
            return false;
        }
        state.status = JobStatus::Running;
        state.started_at = Some(Utc::now());
        true
    }

    pub(crate) fn set_current_stage(&self, stage: StageKind) {
        let mut state = self.write_state();
        if state.status == JobStatus::Running {
            state.current_stage = Some(stage);
        }
    }

    /// `Running -> Done | Failed`. Freezes the log channel afterwards.
    pub(crate) fn finish(&self, outcome: JobOutcome, context: Option<ResearchContext>) -> bool {
        {
            let mut state = self.write_state();
            if state.status != JobStatus::Running {
                log::warn!(
                    "Ignoring finish for job {} in status {}",
                    self.id,
                    state.status
                );
                return false;
            }
            state.status = outcome.status();
            state.finished_at = Some(Utc::now());
            state.outcome = Some(outcome);
            state.context = context;
        }
        self.logs.close();
        true
    }

    fn read_state(&self) -> RwLockReadGuard<'_, JobState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job state lock poisoned for {}, recovering", self.id);
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, JobState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job state lock poisoned for {}, recovering", self.id);
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done_outcome(job: &Job) -> JobOutcome {
        JobOutcome::Done(ResearchResult::from_context(&ResearchContext::new(
            job.input().clone(),
        )))
    }

    #[test]
    fn test_input_from_json_with_defaults() {
        let input = JobInput::from_json(r#"{"query": "  transformer efficiency  "}"#).unwrap();
        assert_eq!(input.query, "transformer efficiency");
        assert_eq!(input.days, 2);
        assert_eq!(input.max_results, 25);
    }

    #[test]
    fn test_input_accepts_topic_alias() {
        let input = JobInput::from_json(r#"{"topic": "protein folding", "days": 7}"#).unwrap();
        assert_eq!(input.query, "protein folding");
        assert_eq!(input.days, 7);
    }

    #[test]
    fn test_input_rejections() {
        let cases = [
            r#"{"query": "   "}"#,
            r#"{"query": ""}"#,
            r#"{"days": 3}"#,
            r#"{"query": "x", "days": 0}"#,
            r#"{"query": "x", "max_results": 0}"#,
            r#"{"query": "x", "max_results": 501}"#,
            "not json",
        ];
        for raw in cases {
            match JobInput::from_json(raw) {
                Err(JobError::InvalidInput { .. }) => {}
                other => panic!("expected InvalidInput for {}, got {:?}", raw, other),
            }
        }

        let long = "q".repeat(MAX_QUERY_LEN + 1);
        assert!(JobInput::new(long).validated().is_err());
        assert!(JobInput::new("q".repeat(MAX_QUERY_LEN)).validated().is_ok());
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(JobInput::new("q"));
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Pending);
        assert!(snap.started_at.is_none());
        assert!(snap.finished_at.is_none());
        assert!(job.outcome().is_none());
        assert_eq!(job.logs().job_id(), job.id());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Job::new(JobInput::new("q"));
        let b = Job::new(JobInput::new("q"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let job = Job::new(JobInput::new("q"));

        assert!(!job.finish(done_outcome(&job), None));
        assert_eq!(job.status(), JobStatus::Pending);

        assert!(job.try_start());
        assert!(!job.try_start());
        assert_eq!(job.status(), JobStatus::Running);
        assert!(job.snapshot().started_at.is_some());

        assert!(job.finish(done_outcome(&job), None));
        assert_eq!(job.status(), JobStatus::Done);
        assert!(job.snapshot().finished_at.is_some());

        let err = PipelineError::Cancelled {
            stage: StageKind::Plan,
        };
        assert!(!job.finish(JobOutcome::Failed(err), None));
        assert_eq!(job.status(), JobStatus::Done);
        assert!(!job.try_start());
    }

    #[test]
    fn test_finish_closes_logs() {
        let job = Job::new(JobInput::new("q"));
        job.try_start();
        job.logs().info("working");
        job.finish(done_outcome(&job), None);

        assert!(job.logs().is_closed());
        assert!(job.logs().info("late").is_none());
        assert_eq!(job.logs().len(), 1);
    }

    #[test]
    fn test_failed_snapshot_carries_error() {
        let job = Job::new(JobInput::new("q"));
        job.try_start();
        let err = PipelineError::StageFailure {
            stage: StageKind::Fetch,
            cause: "no papers".to_string(),
        };
        job.finish(JobOutcome::Failed(err.clone()), None);

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error, Some(err));
        assert!(job.outcome().unwrap().result().is_none());
    }

    #[test]
    fn test_cancel_is_noop_when_terminal() {
        let job = Job::new(JobInput::new("q"));
        assert!(job.request_cancel());
        assert!(!job.request_cancel());

        let done = Job::new(JobInput::new("q"));
        done.try_start();
        done.finish(done_outcome(&done), None);
        assert!(!done.request_cancel());
        assert!(!done.cancel_requested());
    }

    #[test]
    fn test_current_stage_only_while_running() {
        let job = Job::new(JobInput::new("q"));
        job.set_current_stage(StageKind::Fetch);
        assert_eq!(job.current_stage(), None);

        job.try_start();
        job.set_current_stage(StageKind::Critique);
        assert_eq!(job.current_stage(), Some(StageKind::Critique));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let job = Job::new(JobInput::new("q"));
        let json = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("startedAt").is_none());
        assert_eq!(json["cancelRequested"], false);
    }
}
