//! Test harness for isolated dispatcher runs.
//!
//! The `TestHarness` struct wires a complete environment:
//! - a job registry and a dispatcher over the given stage set
//! - a SQLite result store in a temporary directory
//! - a progress broadcaster for subscribers

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use guild::{
    Dispatcher, DispatcherConfig, JobInput, JobProgressBroadcaster, JobRegistry, JobSnapshot,
    Pipeline, ResultStore, SqliteResultStore, StageSet, WorkerServices,
};

/// Upper bound for any single wait in the integration tests.
pub const WAIT: Duration = Duration::from_secs(10);

pub struct TestHarness {
    // Declared first so workers are joined before the database goes away.
    pub dispatcher: Dispatcher,
    pub store: Arc<SqliteResultStore>,
    pub broadcaster: JobProgressBroadcaster,
    temp_dir: TempDir,
}

impl TestHarness {
    /// Two workers, room for sixteen queued jobs.
    pub fn new(stages: StageSet) -> Self {
        Self::with_workers(stages, 2, 16)
    }

    pub fn with_workers(stages: StageSet, worker_count: usize, queue_capacity: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(
            SqliteResultStore::open(&temp_dir.path().join("guild.db"))
                .expect("Failed to open result store"),
        );
        let broadcaster = JobProgressBroadcaster::new(256);

        let dispatcher = Dispatcher::with_services(
            DispatcherConfig::new(worker_count, queue_capacity),
            Arc::new(JobRegistry::new()),
            Arc::new(Pipeline::new(stages)),
            WorkerServices {
                store: Some(store.clone() as Arc<dyn ResultStore>),
                broadcaster: Some(broadcaster.clone()),
            },
        );

        Self {
            dispatcher,
            store,
            broadcaster,
            temp_dir,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("guild.db")
    }

    pub fn submit(&self, query: &str) -> String {
        self.dispatcher
            .submit(JobInput::new(query))
            .expect("Failed to submit job")
    }

    /// Waits for the job to finish and fails the test if it does not.
    pub fn wait_terminal(&self, id: &str) -> JobSnapshot {
        let snapshot = self
            .dispatcher
            .wait_for(id, WAIT)
            .expect("Job disappeared while waiting");
        assert!(
            snapshot.status.is_terminal(),
            "job {} still {} after {:?}",
            id,
            snapshot.status,
            WAIT
        );
        snapshot
    }

    /// Every log message of the job, in sequence order.
    pub fn messages(&self, id: &str) -> Vec<String> {
        self.dispatcher
            .logs(id, 0)
            .expect("Unknown job")
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    /// Number of log lines equal to `line`.
    pub fn count_lines(&self, id: &str, line: &str) -> usize {
        self.messages(id).iter().filter(|m| m.as_str() == line).count()
    }
}

/// Polls `condition` until it holds or `WAIT` elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
