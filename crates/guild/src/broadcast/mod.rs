//! Live views of running jobs.
//!
//! [`LogChannel`] is the per-job, poll-based log history; the
//! [`JobProgressBroadcaster`] pushes status and stage transitions to any
//! subscribers that want them without polling.

pub mod job_progress;
pub mod log_channel;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent};
pub use log_channel::{LogChannel, LogCursor, LogEntry, LogLevel};
