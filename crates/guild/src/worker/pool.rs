use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, LogEntry};
use crate::config::Config;
use crate::db::DatabaseError;
use crate::error::JobError;
use crate::pipeline::runner::panic_message;
use crate::pipeline::{JobProgress, Pipeline, PipelineError, ResearchContext};
use crate::storage::ResultStore;
use crate::worker::job::{Job, JobInput, JobOutcome, JobSnapshot, JobStatus};
use crate::worker::registry::{JobCounts, JobRegistry, PurgeReport};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    /// Jobs that may wait in `Pending` before `submit` reports `QueueFull`.
    pub queue_capacity: usize,
}

impl DispatcherConfig {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.worker_count, config.queue_capacity)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new(num_cpus::get(), 64)
    }
}

/// Optional collaborators shared by every worker.
#[derive(Clone, Default)]
pub struct WorkerServices {
    pub store: Option<Arc<dyn ResultStore>>,
    pub broadcaster: Option<JobProgressBroadcaster>,
}

impl WorkerServices {
    fn broadcast(&self, job: &Job, status: JobStatus, message: &str) {
        self.publish(|| JobProgressEvent::new(job.id(), status, job.current_stage(), message));
    }

    fn publish(&self, event: impl FnOnce() -> JobProgressEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(event());
        }
    }
}

/// Accepts jobs, registers them and runs them on a fixed pool of worker
/// threads fed by a bounded queue.
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    services: WorkerServices,
    job_sender: Option<Sender<Arc<Job>>>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, registry: Arc<JobRegistry>, pipeline: Arc<Pipeline>) -> Self {
        Self::with_services(config, registry, pipeline, WorkerServices::default())
    }

    pub fn with_services(
        config: DispatcherConfig,
        registry: Arc<JobRegistry>,
        pipeline: Arc<Pipeline>,
        services: WorkerServices,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<Arc<Job>>(config.queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let worker_pipeline = Arc::clone(&pipeline);
            let worker_services = services.clone();

            let handle = thread::Builder::new()
                .name(format!("guild-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, worker_pipeline, worker_services));

            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("Failed to spawn worker {}: {}", worker_id, e),
            }
        }

        info!(
            "Started {} workers (queue capacity {})",
            workers.len(),
            config.queue_capacity
        );

        Self {
            registry,
            services,
            job_sender: Some(job_sender),
            workers,
            shutdown,
        }
    }

    /// Validates `input`, registers a `Pending` job and queues it. Returns
    /// without waiting for the job to run.
    pub fn submit(&self, input: JobInput) -> Result<String, JobError> {
        if self.is_shutdown() {
            return Err(JobError::ShutDown);
        }
        let sender = self.job_sender.as_ref().ok_or(JobError::ShutDown)?;
        let input = input.validated()?;

        let job = Arc::new(Job::new(input));
        let id = job.id().to_string();
        job.logs().info(format!("job queued: {}", job.input().query));
        self.registry.insert(Arc::clone(&job));

        match sender.try_send(Arc::clone(&job)) {
            Ok(()) => {
                debug!("Queued job {}", id);
                self.services.broadcast(&job, JobStatus::Pending, "job queued");
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                self.registry.remove(&id);
                warn!("Rejected job {}: queue full", id);
                Err(JobError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.registry.remove(&id);
                Err(JobError::ShutDown)
            }
        }
    }

    /// Parses a JSON payload such as `{"query": "..."}` and submits it.
    pub fn submit_json(&self, raw: &str) -> Result<String, JobError> {
        self.submit(JobInput::from_json(raw)?)
    }

    pub fn status(&self, id: &str) -> Result<JobSnapshot, JobError> {
        Ok(self.registry.get(id)?.snapshot())
    }

    /// Log entries with `seq >= from_seq`. Empty once the job is terminal and
    /// the caller has seen everything.
    pub fn logs(&self, id: &str, from_seq: u64) -> Result<Vec<LogEntry>, JobError> {
        Ok(self.registry.get(id)?.logs().tail(from_seq))
    }

    pub fn result(&self, id: &str) -> Result<JobOutcome, JobError> {
        let job = self.registry.get(id)?;
        job.outcome().ok_or_else(|| JobError::NotReady {
            id: id.to_string(),
            status: job.status(),
        })
    }

    /// Requests cancellation. Returns `false` when the job was already
    /// terminal or already cancelled.
    pub fn cancel(&self, id: &str) -> Result<bool, JobError> {
        let job = self.registry.get(id)?;
        let requested = job.request_cancel();
        if requested {
            info!("Cancellation requested for job {}", id);
        }
        Ok(requested)
    }

    pub fn purge(&self, id: &str) -> Result<(), JobError> {
        self.registry.purge(id)
    }

    pub fn purge_all(&self) -> PurgeReport {
        self.registry.purge_all()
    }

    pub fn list(&self, filter: Option<JobStatus>) -> Vec<JobSnapshot> {
        self.registry.list(filter)
    }

    pub fn counts(&self) -> JobCounts {
        self.registry.counts()
    }

    /// Reads a terminal outcome, Done or Failed, from the configured store;
    /// works after purge.
    pub fn archived_result(&self, id: &str) -> Result<Option<JobOutcome>, DatabaseError> {
        match &self.services.store {
            Some(store) => store.load(id),
            None => Ok(None),
        }
    }

    /// Polls until the job is terminal or `timeout` elapses, then returns its
    /// latest snapshot.
    pub fn wait_for(&self, id: &str, timeout: Duration) -> Result<JobSnapshot, JobError> {
        let job = self.registry.get(id)?;
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = job.snapshot();
            if snapshot.status.is_terminal() || Instant::now() >= deadline {
                return Ok(snapshot);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Stops accepting new jobs. Already queued jobs still run.
    pub fn shutdown(&self) {
        info!("Shutting down dispatcher...");
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Drains the queue and joins every worker.
    pub fn wait(mut self) {
        self.shutdown();
        self.join_workers();
    }

    /// Like [`wait`](Self::wait), but first asks every active job to cancel.
    pub fn shutdown_now(mut self) {
        self.shutdown();
        let active = self.registry.active_jobs();
        for job in &active {
            job.request_cancel();
        }
        info!("Cancelled {} active jobs", active.len());
        self.join_workers();
    }

    fn join_workers(&mut self) {
        // Dropping the sender lets workers exit once the queue is empty.
        drop(self.job_sender.take());

        for (i, worker) in self.workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
            self.join_workers();
            info!("All workers have stopped");
        }
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Arc<Job>>,
    pipeline: Arc<Pipeline>,
    services: WorkerServices,
) {
    debug!("Worker {} started", worker_id);

    for job in job_receiver.iter() {
        // Contain anything that escapes the pipeline's own panic guard so one
        // job never takes the worker down.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| {
            execute_job(worker_id, &job, &pipeline, &services)
        })) {
            let detail = panic_message(payload.as_ref());
            error!("Worker {} caught a panic in job {}: {}", worker_id, job.id(), detail);
            finish_job(
                &job,
                JobOutcome::Failed(PipelineError::InternalFault {
                    stage: job.current_stage(),
                    detail,
                }),
                None,
                &services,
            );
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn execute_job(worker_id: usize, job: &Job, pipeline: &Pipeline, services: &WorkerServices) {
    if !job.try_start() {
        warn!(
            "Worker {} skipped job {} in status {}",
            worker_id,
            job.id(),
            job.status()
        );
        return;
    }

    debug!("Worker {} processing job {}", worker_id, job.id());
    job.logs().info(format!("job started on worker {}", worker_id));
    services.broadcast(job, JobStatus::Running, "job started");

    let progress = JobProgress::new(job, services.broadcaster.as_ref());
    let ctx = ResearchContext::new(job.input().clone());
    let run = pipeline.run(ctx, &progress, job.cancel_token());

    let outcome = match run.outcome {
        Ok(result) => JobOutcome::Done(result),
        Err(err) => JobOutcome::Failed(err),
    };

    finish_job(job, outcome, Some(run.context), services);
}

fn finish_job(
    job: &Job,
    outcome: JobOutcome,
    context: Option<ResearchContext>,
    services: &WorkerServices,
) {
    if job.status() != JobStatus::Running {
        return;
    }

    // Saved before `finish`: a terminal status implies an archived outcome.
    if let Some(store) = &services.store {
        if let Err(e) = store.save(job.id(), &job.input().query, &outcome) {
            warn!("Failed to persist outcome for job {}: {}", job.id(), e);
            job.logs().warn(format!("result not persisted: {}", e));
        }
    }

    let message = match &outcome {
        JobOutcome::Done(result) => format!(
            "job done: {} papers, {} trends, {} recommendations",
            result.papers.len(),
            result.trends.len(),
            result.recommendations.len()
        ),
        JobOutcome::Failed(err) => format!("job failed: {}", err.reason()),
    };
    let status = outcome.status();
    let error = outcome.error().cloned();

    match status {
        JobStatus::Failed => job.logs().error(message.as_str()),
        _ => job.logs().info(message.as_str()),
    };

    if job.finish(outcome, context) {
        info!("Job {} finished: {}", job.id(), status);
        services.publish(|| {
            let event = JobProgressEvent::new(job.id(), status, job.current_stage(), message);
            match error {
                Some(error) => event.with_error(error),
                None => event,
            }
        });
    }
}
