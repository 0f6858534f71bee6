//! Process-wide map from job id to job.
//!
//! The registry is the only structure mutated by more than one actor. It is
//! constructed explicitly and shared as `Arc<JobRegistry>`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::worker::job::{Job, JobSnapshot, JobStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.done + self.failed
    }

    pub fn active(&self) -> usize {
        self.pending + self.running
    }
}

/// What `purge_all` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Terminal jobs removed from the registry.
    pub purged: usize,
    /// Active jobs that were asked to cancel and stay registered until they
    /// finish.
    pub cancelled: usize,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<Job>) {
        let id = job.id().to_string();
        self.write_jobs().insert(id, job);
    }

    /// Looks a job up. Unknown and purged ids both yield `NotFound`.
    pub fn get(&self, id: &str) -> Result<Arc<Job>, JobError> {
        self.read_jobs()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::not_found(id))
    }

    /// Unconditional removal, used to roll back a submission that was never
    /// queued.
    pub(crate) fn remove(&self, id: &str) -> Option<Arc<Job>> {
        self.write_jobs().remove(id)
    }

    /// Snapshots of all jobs, newest first, optionally filtered by status.
    pub fn list(&self, filter: Option<JobStatus>) -> Vec<JobSnapshot> {
        let jobs: Vec<Arc<Job>> = self.read_jobs().values().cloned().collect();
        let mut snapshots: Vec<JobSnapshot> = jobs
            .iter()
            .map(|job| job.snapshot())
            .filter(|snap| filter.map_or(true, |status| snap.status == status))
            .collect();
        snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        snapshots
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = self.read_jobs();
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status() {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Removes one job.
    ///
    /// An active job is only released once cancellation was requested for
    /// it; until then it is reported as `NotFound` like an unknown id. Its
    /// worker keeps its own handle and finishes normally.
    pub fn purge(&self, id: &str) -> Result<(), JobError> {
        let mut jobs = self.write_jobs();
        let releasable = match jobs.get(id) {
            None => false,
            Some(job) => job.is_terminal() || job.cancel_requested(),
        };
        if !releasable {
            return Err(JobError::not_found(id));
        }
        jobs.remove(id);
        log::debug!("Purged job {}", id);
        Ok(())
    }

    /// Removes every terminal job and asks every active one to cancel.
    pub fn purge_all(&self) -> PurgeReport {
        let mut report = PurgeReport::default();
        let mut jobs = self.write_jobs();
        jobs.retain(|_, job| {
            if job.is_terminal() {
                report.purged += 1;
                false
            } else {
                if job.request_cancel() {
                    report.cancelled += 1;
                }
                true
            }
        });
        log::info!(
            "Purged {} finished jobs, cancelled {} active jobs",
            report.purged,
            report.cancelled
        );
        report
    }

    /// Jobs that are still `Pending` or `Running`.
    pub fn active_jobs(&self) -> Vec<Arc<Job>> {
        self.read_jobs()
            .values()
            .filter(|job| !job.is_terminal())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Job>>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Job>>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
