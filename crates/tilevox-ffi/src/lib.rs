//! C ABI over the tilevox job coordinator.
//!
//! The first call lazily starts a multi-threaded tokio runtime and a job
//! coordinator that fetches over HTTP with an in-memory cache; both live for
//! the rest of the process. Job ids are positive; a negative id from
//! [`tilevox_submit`] means the library could not start.
//!
//! Status codes returned by [`tilevox_poll`]: `0` running, `1` done,
//! `-1` failed, `-2` unknown or released.

use std::{
    ffi::{CStr, c_char},
    sync::OnceLock,
};

use tilevox::{
    DEFAULT_TIMEOUT, HttpFetcher, JobCoordinator, JobId, JobStatus, MemoryCache, Pipeline,
    PipelineConfig, Query,
};
use tokio::runtime::Runtime;

/// Fetch cache budget shared by all jobs.
const CACHE_BYTES: usize = 256 << 20;

type Coordinator = JobCoordinator<HttpFetcher<MemoryCache>>;

static RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();
static COORDINATOR: OnceLock<Option<Coordinator>> = OnceLock::new();

fn runtime() -> Option<&'static Runtime> {
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("tilevox")
                .build()
                .inspect_err(|e| tracing::error!(error = %e, "failed to start runtime"))
                .ok()
        })
        .as_ref()
}

fn coordinator() -> Option<&'static Coordinator> {
    COORDINATOR
        .get_or_init(|| {
            let runtime = runtime()?;
            let fetcher =
                HttpFetcher::with_cache(MemoryCache::with_max_size(CACHE_BYTES), DEFAULT_TIMEOUT)
                    .inspect_err(|e| tracing::error!(error = %e, "failed to create fetcher"))
                    .ok()?;
            let pipeline = Pipeline::new(fetcher, PipelineConfig::default());
            Some(JobCoordinator::new(pipeline, runtime.handle().clone()))
        })
        .as_ref()
}

fn job_id(id: i32) -> Option<JobId> {
    u32::try_from(id).ok().map(JobId)
}

fn clamp_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// Start voxelizing the area within `radius` meters of a point.
///
/// `key` may be null, which submits without an API key. A non-positive
/// `resolution` produces a job that fails.
///
/// # Safety
///
/// `key` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tilevox_submit(
    latitude: f64,
    longitude: f64,
    radius: f64,
    resolution: i32,
    key: *const c_char,
) -> i32 {
    let key = if key.is_null() {
        String::new()
    } else {
        // SAFETY: the caller guarantees a valid NUL-terminated string.
        unsafe { CStr::from_ptr(key) }.to_string_lossy().into_owned()
    };
    let Some(jobs) = coordinator() else {
        return -1;
    };

    let resolution = u32::try_from(resolution).unwrap_or(0);
    let id = jobs.submit(Query::new(latitude, longitude, radius, resolution, key));
    match i32::try_from(id.0) {
        Ok(id) => id,
        Err(_) => {
            tracing::error!(job = %id, "job id space exhausted");
            jobs.release(id);
            -1
        }
    }
}

/// Status code of a job.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn tilevox_poll(id: i32) -> i32 {
    let status = match (job_id(id), COORDINATOR.get().and_then(Option::as_ref)) {
        (Some(id), Some(jobs)) => jobs.poll(id),
        _ => JobStatus::Unknown,
    };
    status.code()
}

/// Byte length of a finished job's result, 0 otherwise.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn tilevox_result_size(id: i32) -> i32 {
    match (job_id(id), COORDINATOR.get().and_then(Option::as_ref)) {
        (Some(id), Some(jobs)) => clamp_len(jobs.result_size(id)),
        _ => 0,
    }
}

/// Copy up to `max_len` bytes of a finished job's result into `dest`.
///
/// Returns the number of bytes copied.
///
/// # Safety
///
/// `dest` must be null or valid for writes of `max_len` bytes.
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tilevox_copy_result(id: i32, dest: *mut u8, max_len: i32) -> i32 {
    // SAFETY: forwarded from this function's contract.
    unsafe { tilevox_copy_result_at(id, 0, dest, max_len) }
}

/// Copy up to `max_len` bytes of a finished job's result, starting at
/// `offset`, into `dest`. Lets callers drain results larger than `i32::MAX`.
///
/// # Safety
///
/// `dest` must be null or valid for writes of `max_len` bytes.
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tilevox_copy_result_at(
    id: i32,
    offset: u64,
    dest: *mut u8,
    max_len: i32,
) -> i32 {
    let (Some(id), Some(jobs)) = (job_id(id), COORDINATOR.get().and_then(Option::as_ref)) else {
        return 0;
    };
    let (Ok(len), Ok(offset)) = (usize::try_from(max_len), usize::try_from(offset)) else {
        return 0;
    };
    if dest.is_null() || len == 0 {
        return 0;
    }
    // SAFETY: the caller guarantees `dest` is valid for `len` bytes.
    let dest = unsafe { std::slice::from_raw_parts_mut(dest, len) };
    clamp_len(jobs.copy_result_at(id, offset, dest))
}

/// Forget a job and free its result. Unknown ids are ignored.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn tilevox_release(id: i32) {
    if let (Some(id), Some(jobs)) = (job_id(id), COORDINATOR.get().and_then(Option::as_ref)) {
        jobs.release(id);
    }
}
