//! Asynchronous job coordination.
//!
//! Each submitted [`Query`] runs as a background task on a tokio runtime.
//! Jobs live in a registry behind a single mutex; each entry is a shared
//! handle whose outcome is written exactly once by the task that ran it, so
//! readers never observe a half-written result. Jobs stay in the registry
//! until [`JobCoordinator::release`] is called.

use crate::error::Error;
use crate::fetch::Fetch;
use crate::pipeline::{Pipeline, Query};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};
use tokio::{runtime::Handle, sync::Notify};

/// Identifier handed out by [`JobCoordinator::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    /// The id was never issued or has been released.
    Unknown,
}

impl JobStatus {
    /// The integer code used across the C boundary.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Running => 0,
            Self::Done => 1,
            Self::Failed => -1,
            Self::Unknown => -2,
        }
    }
}

#[derive(Default)]
struct Job {
    outcome: OnceLock<Result<Vec<u8>, String>>,
    finished: Notify,
}

impl Job {
    fn complete(&self, outcome: Result<Vec<u8>, String>) {
        if self.outcome.set(outcome).is_err() {
            tracing::warn!("job completed twice, keeping first outcome");
        }
        self.finished.notify_waiters();
    }

    fn status(&self) -> JobStatus {
        match self.outcome.get() {
            None => JobStatus::Running,
            Some(Ok(_)) => JobStatus::Done,
            Some(Err(_)) => JobStatus::Failed,
        }
    }

    fn result(&self) -> Option<&[u8]> {
        match self.outcome.get() {
            Some(Ok(buffer)) => Some(buffer),
            _ => None,
        }
    }
}

/// Runs queries in the background and holds their results until released.
pub struct JobCoordinator<F: Fetch + 'static> {
    pipeline: Arc<Pipeline<F>>,
    runtime: Handle,
    jobs: Mutex<HashMap<JobId, Arc<Job>>>,
    next_id: AtomicU32,
}

impl<F: Fetch + 'static> JobCoordinator<F> {
    /// Create a coordinator that spawns its jobs on `runtime`.
    #[must_use]
    pub fn new(pipeline: Pipeline<F>, runtime: Handle) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            runtime,
            jobs: Mutex::default(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Start a job for `query` and return its id immediately.
    pub fn submit(&self, query: Query) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Arc::new(Job::default());
        self.registry().insert(id, Arc::clone(&job));

        tracing::info!(
            job = %id,
            latitude = query.latitude,
            longitude = query.longitude,
            radius = query.radius,
            resolution = query.resolution,
            "job submitted"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let task = self
            .runtime
            .spawn(async move { pipeline.run(&query).await });

        // A second task observes the first so that a panic still completes the job.
        self.runtime.spawn(async move {
            let outcome = match task.await {
                Ok(Ok(buffer)) => Ok(buffer),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(Error::from(e).to_string()),
            };
            match &outcome {
                Ok(buffer) => tracing::info!(job = %id, bytes = buffer.len(), "job done"),
                Err(message) => tracing::warn!(job = %id, error = %message, "job failed"),
            }
            job.complete(outcome);
        });

        id
    }

    /// Current status of a job.
    #[must_use]
    pub fn poll(&self, id: JobId) -> JobStatus {
        self.with_job(id, |job| job.status()).unwrap_or(JobStatus::Unknown)
    }

    /// Size of a finished job's result in bytes, 0 for any other state.
    #[must_use]
    pub fn result_size(&self, id: JobId) -> usize {
        self.with_job(id, |job| job.result().map_or(0, <[u8]>::len))
            .unwrap_or(0)
    }

    /// Copy the start of a finished job's result into `dest`.
    ///
    /// Returns the number of bytes copied, `min(dest.len(), result_size)`.
    pub fn copy_result(&self, id: JobId, dest: &mut [u8]) -> usize {
        self.copy_result_at(id, 0, dest)
    }

    /// Copy a finished job's result from `offset` onwards into `dest`.
    pub fn copy_result_at(&self, id: JobId, offset: usize, dest: &mut [u8]) -> usize {
        self.with_job(id, |job| {
            let Some(source) = job.result().and_then(|r| r.get(offset..)) else {
                return 0;
            };
            let n = source.len().min(dest.len());
            dest[..n].copy_from_slice(&source[..n]);
            n
        })
        .unwrap_or(0)
    }

    /// Why a job failed, if it did.
    #[must_use]
    pub fn error_message(&self, id: JobId) -> Option<String> {
        self.with_job(id, |job| match job.outcome.get() {
            Some(Err(message)) => Some(message.clone()),
            _ => None,
        })
        .flatten()
    }

    /// Forget a job. Returns whether it existed.
    ///
    /// Releasing a running job discards its result when it finishes.
    pub fn release(&self, id: JobId) -> bool {
        let released = self.registry().remove(&id).is_some();
        if released {
            tracing::debug!(job = %id, "job released");
        }
        released
    }

    /// Wait until a job leaves the running state.
    pub async fn wait(&self, id: JobId) -> JobStatus {
        let Some(job) = self.with_job(id, Arc::clone) else {
            return JobStatus::Unknown;
        };
        loop {
            let finished = job.finished.notified();
            let status = job.status();
            if status != JobStatus::Running {
                return status;
            }
            finished.await;
        }
    }

    /// Number of jobs currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<JobId, Arc<Job>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a job while holding the registry lock.
    fn with_job<R>(&self, id: JobId, f: impl FnOnce(&Arc<Job>) -> R) -> Option<R> {
        self.registry().get(&id).map(f)
    }
}
