use std::path::Path;

use crate::db::{result_repo, Database, DatabaseError};
use crate::worker::job::JobOutcome;

use super::ResultStore;

/// Stores terminal outcomes as JSON in the `results` table, with the
/// status in its own column.
#[derive(Clone)]
pub struct SqliteResultStore {
    db: Database,
}

impl SqliteResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Most recently saved outcomes, newest first, with their job ids.
    pub fn recent(&self, limit: u32) -> Result<Vec<(String, JobOutcome)>, DatabaseError> {
        result_repo::list_recent(&self.db, limit)?
            .into_iter()
            .map(|row| -> Result<(String, JobOutcome), DatabaseError> {
                let outcome = serde_json::from_str(&row.outcome_json)?;
                Ok((row.job_id, outcome))
            })
            .collect()
    }

    /// Archived jobs that ended `Failed`.
    pub fn failed_count(&self) -> Result<u32, DatabaseError> {
        result_repo::count_by_status(&self.db, "failed")
    }

    pub fn delete(&self, job_id: &str) -> Result<bool, DatabaseError> {
        result_repo::delete(&self.db, job_id)
    }
}

impl ResultStore for SqliteResultStore {
    fn save(&self, job_id: &str, query: &str, outcome: &JobOutcome) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(outcome)?;
        let status = outcome.status().as_str();
        result_repo::upsert(
            &self.db,
            &result_repo::ResultRow::new(job_id, query, status, json),
        )?;
        log::debug!("Saved {} outcome for job {}", status, job_id);
        Ok(())
    }

    fn load(&self, job_id: &str) -> Result<Option<JobOutcome>, DatabaseError> {
        match result_repo::get(&self.db, job_id)? {
            Some(row) => Ok(Some(serde_json::from_str(&row.outcome_json)?)),
            None => Ok(None),
        }
    }
}
