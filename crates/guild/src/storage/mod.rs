//! Durable storage of terminal job outcomes.
//!
//! Done and Failed jobs are archived alike, so either can be read back after
//! purge. A missing or failing store never changes a job's status.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::db::{Database, DatabaseError};
use crate::worker::job::JobOutcome;

pub mod sqlite;

pub use sqlite::SqliteResultStore;

pub trait ResultStore: Send + Sync {
    /// Replaces any outcome previously saved for `job_id`.
    fn save(&self, job_id: &str, query: &str, outcome: &JobOutcome) -> Result<(), DatabaseError>;

    fn load(&self, job_id: &str) -> Result<Option<JobOutcome>, DatabaseError>;
}

/// The store described by `config.database_path`: SQLite when set,
/// in-memory otherwise.
pub fn open_store(config: &Config) -> Result<Arc<dyn ResultStore>, DatabaseError> {
    match &config.database_path {
        Some(path) => Ok(Arc::new(SqliteResultStore::new(Database::open(path)?))),
        None => Ok(Arc::new(MemoryResultStore::new())),
    }
}

/// Process-local store, mainly for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryResultStore {
    outcomes: RwLock<HashMap<String, JobOutcome>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outcomes.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn save(&self, job_id: &str, _query: &str, outcome: &JobOutcome) -> Result<(), DatabaseError> {
        let mut outcomes = self
            .outcomes
            .write()
            .map_err(|_| DatabaseError::LockPoisoned("memory result store"))?;
        outcomes.insert(job_id.to_string(), outcome.clone());
        Ok(())
    }

    fn load(&self, job_id: &str) -> Result<Option<JobOutcome>, DatabaseError> {
        let outcomes = self
            .outcomes
            .read()
            .map_err(|_| DatabaseError::LockPoisoned("memory result store"))?;
        Ok(outcomes.get(job_id).cloned())
    }
}
