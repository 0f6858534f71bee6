//! Result repository: reads and writes of the `results` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw result row from the database.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub job_id: String,
    pub query: String,
    /// Terminal status, `done` or `failed`.
    pub status: String,
    pub outcome_json: String,
    pub created_at: String,
}

impl ResultRow {
    pub fn new(job_id: &str, query: &str, status: &str, outcome_json: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            query: query.to_string(),
            status: status.to_string(),
            outcome_json,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            query: row.get("query")?,
            status: row.get("status")?,
            outcome_json: row.get("outcome_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

const COLUMNS: &str = "job_id, query, status, outcome_json, created_at";

/// Inserts a result row, replacing any previous row for the same job.
pub fn upsert(db: &Database, row: &ResultRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO results (job_id, query, status, outcome_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(job_id) DO UPDATE SET
                query = excluded.query,
                status = excluded.status,
                outcome_json = excluded.outcome_json,
                created_at = excluded.created_at",
            params![row.job_id, row.query, row.status, row.outcome_json, row.created_at],
        )?;
        Ok(())
    })
}

pub fn get(db: &Database, job_id: &str) -> Result<Option<ResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM results WHERE job_id = ?1", COLUMNS),
                params![job_id],
                ResultRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Most recent results first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<ResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM results ORDER BY created_at DESC, job_id ASC LIMIT ?1",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], ResultRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn delete(db: &Database, job_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM results WHERE job_id = ?1", params![job_id])?;
        Ok(affected > 0)
    })
}

/// Rows per terminal status, e.g. how many archived jobs failed.
pub fn count_by_status(db: &Database, status: &str) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM results WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

pub fn count(db: &Database) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))?;
        Ok(count)
    })
}
