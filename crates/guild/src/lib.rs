//! Research-paper analysis job orchestrator.
//!
//! A [`Dispatcher`] accepts research queries, registers each as a [`Job`] in
//! the [`JobRegistry`] and runs it on a worker thread through the five-stage
//! [`Pipeline`] (Fetch, Summarize, Critique, AnalyzeTrends, Plan). Every job
//! carries a [`LogChannel`] that clients poll while it runs.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod stages;
pub mod storage;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent, LogChannel, LogEntry, LogLevel};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{ConfigError, GuildError, JobError, Result};
pub use pipeline::{
    CancelToken, Pipeline, PipelineError, ResearchContext, ResearchResult, StageError,
    StageHandler, StageKind, StageSet,
};
pub use stages::{standard_stages, Collaborators};
pub use storage::{open_store, MemoryResultStore, ResultStore, SqliteResultStore};
pub use worker::{
    Dispatcher, DispatcherConfig, Job, JobInput, JobOutcome, JobRegistry, JobSnapshot, JobStatus,
    WorkerServices,
};
