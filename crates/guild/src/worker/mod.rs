//! Job lifecycle: the job record, the registry that owns every job, and the
//! dispatcher that queues jobs onto worker threads.

pub mod job;
pub mod pool;
pub mod registry;

pub use job::{Job, JobInput, JobOutcome, JobSnapshot, JobStatus};
pub use pool::{Dispatcher, DispatcherConfig, WorkerServices};
pub use registry::{JobCounts, JobRegistry, PurgeReport};
