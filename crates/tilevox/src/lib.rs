//! Async traversal and voxelization of streamed 3D tiles.
//!
//! This crate walks a remote tileset hierarchy down to the mesh payloads
//! that intersect a query sphere, rasterizes each payload into colored
//! voxels with [`tilevox_decode`], and runs whole queries as background jobs
//! that callers poll.
//!
//! # Design principles
//!
//! - **Failures degrade, never abort**: unreachable tiles and undecodable
//!   payloads are logged and skipped
//! - **Pluggable transport**: everything network-facing goes through [`Fetch`]
//! - **Bounded traversal**: depth and node ceilings stop pathological trees
//!
//! # Example
//!
//! ```ignore
//! let fetcher = HttpFetcher::with_cache(MemoryCache::with_max_size(256 << 20), DEFAULT_TIMEOUT)?;
//! let pipeline = Pipeline::new(fetcher, PipelineConfig::default());
//! let jobs = JobCoordinator::new(pipeline, tokio::runtime::Handle::current());
//!
//! let id = jobs.submit(Query::new(51.5, -0.12, 200.0, 32, api_key));
//! jobs.wait(id).await;
//! let mut buffer = vec![0; jobs.result_size(id)];
//! jobs.copy_result(id, &mut buffer);
//! jobs.release(id);
//! ```

pub mod cache;
mod error;
pub mod fetch;
pub mod jobs;
pub mod pipeline;
pub mod resolver;
pub mod tileset;
pub mod urls;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Cache, MemoryCache, NoCache};
pub use error::{Error, Result};
pub use fetch::{DEFAULT_TIMEOUT, Fetch, FetchFuture, Fetched, HttpFetcher};
pub use jobs::{JobCoordinator, JobId, JobStatus};
pub use pipeline::{DEFAULT_ROOT_URL, Pipeline, PipelineConfig, Query};
pub use resolver::{LeafContent, Resolution, Resolver, TraversalContext, TraversalLimits};

// Re-export commonly used types from the decode crate.
pub use tilevox_decode::{GeoPoint, Sphere, UpAxis, Voxel, VoxelGrid, decode_voxels};
