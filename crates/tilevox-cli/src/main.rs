//! Command-line voxelizer for streamed 3D tiles.
//!
//! Submits one query through the job coordinator, polls it to completion
//! and writes the encoded voxel records to a file.

mod launch_params;

use std::{collections::HashSet, fmt, process::ExitCode, time::Duration};

use tilevox::{HttpFetcher, JobCoordinator, JobStatus, MemoryCache, Pipeline, decode_voxels};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::launch_params::LaunchParams;

/// Interval between job status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reasons a run can fail.
#[derive(Debug)]
enum RunError {
    Setup(tilevox::Error),
    Job(String),
    Write {
        path: String,
        source: std::io::Error,
    },
    Output(tilevox_decode::DecodeError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Setup(e) => write!(f, "setup failed: {e}"),
            RunError::Job(message) => write!(f, "job failed: {message}"),
            RunError::Write { path, source } => write!(f, "writing {path} failed: {source}"),
            RunError::Output(e) => write!(f, "result is malformed: {e}"),
        }
    }
}

impl std::error::Error for RunError {}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(launch_params::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(params: LaunchParams) -> Result<(), RunError> {
    let cache = MemoryCache::with_max_size(params.cache_bytes);
    let fetcher = HttpFetcher::with_cache(cache.clone(), params.timeout).map_err(RunError::Setup)?;
    let pipeline = Pipeline::new(fetcher, params.config);
    let jobs = JobCoordinator::new(pipeline, tokio::runtime::Handle::current());

    let id = jobs.submit(params.query);
    let mut polls = 0u32;
    loop {
        match jobs.poll(id) {
            JobStatus::Running => {
                polls += 1;
                if polls % 40 == 0 {
                    tracing::info!(job = %id, "still running");
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            JobStatus::Done => break,
            JobStatus::Failed => {
                let message = jobs
                    .error_message(id)
                    .unwrap_or_else(|| "unknown error".to_owned());
                jobs.release(id);
                return Err(RunError::Job(message));
            }
            JobStatus::Unknown => return Err(RunError::Job(format!("job {id} vanished"))),
        }
    }

    let mut buffer = vec![0; jobs.result_size(id)];
    let copied = jobs.copy_result(id, &mut buffer);
    jobs.release(id);
    buffer.truncate(copied);

    let voxels = decode_voxels(&buffer).map_err(RunError::Output)?;
    let cells: HashSet<_> = voxels.iter().map(|v| (v.x, v.y, v.z)).collect();
    tracing::info!(
        voxels = voxels.len(),
        distinct_cells = cells.len(),
        bytes = buffer.len(),
        "voxelization finished"
    );
    tracing::debug!(
        entries = cache.len(),
        bytes = cache.size(),
        "payload cache at exit"
    );

    std::fs::write(&params.output, &buffer).map_err(|source| RunError::Write {
        path: params.output.clone(),
        source,
    })?;
    tracing::info!(path = %params.output, "wrote voxels");
    Ok(())
}
