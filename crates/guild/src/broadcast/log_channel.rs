//! Per-job append-only log channel with a poll-based tail.
//!
//! Entries are numbered from 0 without gaps, so `seq + 1` of the last entry
//! a reader saw is always a valid resume point. The writer only holds the
//! write lock for the duration of a single push; readers clone entries out
//! under a read lock and never observe a partially written entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

pub struct LogChannel {
    job_id: String,
    entries: RwLock<Vec<LogEntry>>,
    closed: AtomicBool,
}

impl LogChannel {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            entries: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends an entry and returns its sequence number.
    ///
    /// Returns `None` once the channel has been closed; a terminal job's
    /// history is frozen.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> Option<u64> {
        let message = message.into();
        if self.is_closed() {
            log::warn!(
                "Dropping log line for closed job {}: {}",
                self.job_id,
                message
            );
            return None;
        }

        match level {
            LogLevel::Debug => tracing::debug!(job_id = %self.job_id, "{}", message),
            LogLevel::Info => tracing::info!(job_id = %self.job_id, "{}", message),
            LogLevel::Warn => tracing::warn!(job_id = %self.job_id, "{}", message),
            LogLevel::Error => tracing::error!(job_id = %self.job_id, "{}", message),
        }

        let mut entries = self.write_entries();
        let seq = entries.len() as u64;
        entries.push(LogEntry {
            seq,
            timestamp: Utc::now(),
            level,
            message,
        });
        Some(seq)
    }

    pub fn debug(&self, message: impl Into<String>) -> Option<u64> {
        self.append(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Option<u64> {
        self.append(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> Option<u64> {
        self.append(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Option<u64> {
        self.append(LogLevel::Error, message)
    }

    /// Returns every entry with `seq >= from_seq`, in order.
    ///
    /// An empty result on a closed channel means the reader has seen the
    /// whole history; on an open channel it means "poll again later".
    pub fn tail(&self, from_seq: u64) -> Vec<LogEntry> {
        let entries = self.read_entries();
        let start = usize::try_from(from_seq).unwrap_or(usize::MAX);
        entries.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Lazy variant of [`tail`](Self::tail): each step takes the read lock
    /// only long enough to clone one entry, so it also picks up entries
    /// appended while iterating.
    pub fn cursor(&self, from_seq: u64) -> LogCursor<'_> {
        LogCursor {
            channel: self,
            next_seq: from_seq,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.read_entries().last().map(|e| e.seq)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<LogEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Log channel lock for job {} was poisoned, recovering", self.job_id);
                poisoned.into_inner()
            }
        }
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<LogEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Log channel lock for job {} was poisoned, recovering", self.job_id);
                poisoned.into_inner()
            }
        }
    }
}

impl std::fmt::Debug for LogChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogChannel")
            .field("job_id", &self.job_id)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct LogCursor<'a> {
    channel: &'a LogChannel,
    next_seq: u64,
}

impl LogCursor<'_> {
    /// Sequence number the next call to `next` will try to read.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

impl Iterator for LogCursor<'_> {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        let index = usize::try_from(self.next_seq).ok()?;
        let entry = self.channel.read_entries().get(index).cloned()?;
        self.next_seq += 1;
        Some(entry)
    }
}
