//! The end-to-end voxelization pipeline.
//!
//! A [`Query`] becomes a sphere on the ellipsoid, the resolver selects the
//! mesh payloads inside it, and each payload is fetched, extracted and
//! rasterized in turn. Payload-level failures are logged and skipped; the
//! voxels of every payload that did succeed are concatenated in the wire
//! format. The one exception is geometry compression that cannot be decoded:
//! if it is the reason a run produced no voxels at all, the run fails with
//! that error instead of returning an empty buffer.

use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::resolver::{LeafContent, Resolver, TraversalLimits};
use crate::urls::tile_identifier;
use glam::{DMat4, DVec3};
use std::sync::Arc;
use tilevox_decode::{
    DecodeError, Sphere, UpAxis, VoxelGrid, extract_mesh, rasterize, to_cartesian,
};

/// Root tileset of the photorealistic 3D tiles service.
pub const DEFAULT_ROOT_URL: &str = "https://tile.googleapis.com/v1/3dtiles/root.json";

/// A voxelization request.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Radius of the query sphere in meters.
    pub radius: f64,
    /// Voxels along each payload's longest axis.
    pub resolution: u32,
    /// API key for the tile service.
    pub key: String,
}

impl Query {
    #[must_use]
    pub fn new(
        latitude: f64,
        longitude: f64,
        radius: f64,
        resolution: u32,
        key: impl Into<String>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            radius,
            resolution,
            key: key.into(),
        }
    }

    /// Reject queries that cannot produce a meaningful region or grid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: String| Err(Error::InvalidQuery { detail });
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return invalid(format!("latitude {} out of range", self.latitude));
        }
        if !self.longitude.is_finite() {
            return invalid(format!("longitude {} is not finite", self.longitude));
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return invalid(format!("radius {} must be finite and non-negative", self.radius));
        }
        if self.resolution == 0 {
            return invalid("resolution must be at least 1".to_owned());
        }
        Ok(())
    }

    /// Planet-centred position of the query point on the ellipsoid surface.
    #[must_use]
    pub fn origin(&self) -> DVec3 {
        to_cartesian(self.longitude, self.latitude, 0.0)
    }

    /// The query region.
    #[must_use]
    pub fn region(&self) -> Sphere {
        Sphere::new(self.origin(), self.radius)
    }
}

/// Pipeline settings shared by every query.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub root_url: String,
    pub limits: TraversalLimits,
    /// Up axis of the mesh payloads.
    pub up_axis: UpAxis,
    /// Collapse repeated cells within a payload, keeping the first.
    pub dedup: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root_url: DEFAULT_ROOT_URL.to_owned(),
            limits: TraversalLimits::default(),
            up_axis: UpAxis::default(),
            dedup: false,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_root_url(mut self, root_url: impl Into<String>) -> Self {
        self.root_url = root_url.into();
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_up_axis(mut self, up_axis: UpAxis) -> Self {
        self.up_axis = up_axis;
        self
    }

    #[must_use]
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }
}

/// What became of one leaf payload.
enum LeafOutcome {
    Voxelized(VoxelGrid),
    /// Unavailable or undecodable; already logged.
    Skipped,
    /// Uses a geometry compression extension that cannot be decoded.
    Unsupported(DecodeError),
}

/// Turns queries into encoded voxel buffers.
pub struct Pipeline<F: Fetch> {
    fetcher: Arc<F>,
    config: PipelineConfig,
}

impl<F: Fetch> Pipeline<F> {
    #[must_use]
    pub fn new(fetcher: F, config: PipelineConfig) -> Self {
        Self::with_shared_fetcher(Arc::new(fetcher), config)
    }

    #[must_use]
    pub fn with_shared_fetcher(fetcher: Arc<F>, config: PipelineConfig) -> Self {
        Self { fetcher, config }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a query to completion, returning the encoded voxels.
    ///
    /// Must be called within a tokio runtime: extraction and rasterization
    /// run on the blocking pool.
    pub async fn run(&self, query: &Query) -> Result<Vec<u8>> {
        query.validate()?;
        let origin = query.origin();

        let resolution = Resolver::new(self.fetcher.as_ref(), self.config.limits)
            .resolve_root(&self.config.root_url, query.region(), &query.key)
            .await;
        tracing::info!(
            leaves = resolution.leaves.len(),
            culled = resolution.stats.nodes_culled,
            truncated = resolution.stats.truncated,
            "resolved tile tree"
        );

        let mut buffer = Vec::new();
        let mut voxel_count = 0usize;
        let mut unsupported = None;
        for leaf in resolution.leaves {
            match self.voxelize_leaf(leaf, query.resolution, origin).await? {
                LeafOutcome::Voxelized(grid) => {
                    voxel_count += grid.voxels.len();
                    for voxel in &grid.voxels {
                        voxel.encode_into(&mut buffer);
                    }
                }
                LeafOutcome::Skipped => {}
                LeafOutcome::Unsupported(e) => {
                    unsupported.get_or_insert(e);
                }
            }
        }

        if voxel_count == 0
            && let Some(e) = unsupported
        {
            return Err(Error::Decode(e));
        }

        tracing::info!(voxels = voxel_count, bytes = buffer.len(), "voxelized");
        Ok(buffer)
    }

    /// Fetch, extract and rasterize one payload.
    async fn voxelize_leaf(
        &self,
        leaf: LeafContent,
        resolution: u32,
        origin: DVec3,
    ) -> Result<LeafOutcome> {
        let fetched = self.fetcher.fetch(&leaf.url).await;
        let id = tile_identifier(&leaf.url);
        if fetched.is_empty() {
            tracing::warn!(url = %id, "payload unavailable");
            return Ok(LeafOutcome::Skipped);
        }

        let transform = leaf.transform * self.config.up_axis.to_z_up();
        let dedup = self.config.dedup;
        let bytes = fetched.bytes;
        let grid = tokio::task::spawn_blocking(move || {
            voxelize_payload(&bytes, transform, resolution, origin, dedup)
        })
        .await?;

        match grid {
            Ok(grid) => {
                tracing::debug!(url = %id, voxels = grid.voxels.len(), "payload rasterized");
                Ok(LeafOutcome::Voxelized(grid))
            }
            Err(Error::Decode(e @ DecodeError::UnsupportedCompression { .. })) => {
                tracing::warn!(url = %id, error = %e, "payload skipped");
                Ok(LeafOutcome::Unsupported(e))
            }
            Err(e) => {
                tracing::warn!(url = %id, error = %e, "payload decode failed");
                Ok(LeafOutcome::Skipped)
            }
        }
    }
}

/// Extract and rasterize one mesh payload.
pub fn voxelize_payload(
    bytes: &[u8],
    transform: DMat4,
    resolution: u32,
    origin: DVec3,
    dedup: bool,
) -> Result<VoxelGrid> {
    let payload = extract_mesh(bytes, transform)?;
    let mut grid = rasterize(&payload, resolution, origin);
    if dedup {
        grid.dedup_first_write();
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MapFetcher, draco_square_glb, square_glb};
    use tilevox_decode::decode_voxels;
    use tilevox_decode::geodesy::SEMI_MAJOR_AXIS;

    const ROOT: &str = "https://tiles.test/root.json";

    fn square_fetcher() -> MapFetcher {
        MapFetcher::new()
            .with(
                ROOT,
                r#"{"root": {
                    "boundingVolume": {"box": [6378137.5, 0.5, 0.5, 1,0,0, 0,1,0, 0,0,1]},
                    "children": [{"content": {"uri": "tile.glb"}}]
                }}"#,
            )
            .with("https://tiles.test/tile.glb", square_glb([6_378_137.0, 0.0, 0.0]))
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_root_url(ROOT)
    }

    #[tokio::test]
    async fn test_white_square_end_to_end() {
        let pipeline = Pipeline::new(square_fetcher(), config());
        let buffer = pipeline.run(&Query::new(0.0, 0.0, 1000.0, 4, "k")).await.unwrap();

        let voxels = decode_voxels(&buffer).unwrap();
        assert!(!voxels.is_empty());
        assert!(voxels.iter().all(|v| v.color() == [255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_dedup_config() {
        let plain = Pipeline::new(square_fetcher(), config())
            .run(&Query::new(0.0, 0.0, 1000.0, 4, "k"))
            .await
            .unwrap();
        let deduped = Pipeline::new(square_fetcher(), config().with_dedup(true))
            .run(&Query::new(0.0, 0.0, 1000.0, 4, "k"))
            .await
            .unwrap();
        // The two triangles share a diagonal, so some cells repeat.
        assert!(deduped.len() < plain.len());
        let voxels = decode_voxels(&deduped).unwrap();
        let mut cells: Vec<_> = voxels.iter().map(|v| (v.x, v.y, v.z)).collect();
        cells.sort_unstable();
        cells.dedup();
        assert_eq!(cells.len(), voxels.len());
    }

    #[tokio::test]
    async fn test_far_query_is_empty() {
        let fetcher = Arc::new(square_fetcher());
        let pipeline = Pipeline::with_shared_fetcher(Arc::clone(&fetcher), config());
        let buffer = pipeline.run(&Query::new(45.0, 90.0, 1000.0, 4, "k")).await.unwrap();
        assert!(buffer.is_empty());
        assert!(fetcher.request_for("https://tiles.test/tile.glb").is_none());
    }

    #[tokio::test]
    async fn test_bad_payloads_are_skipped() {
        let fetcher = MapFetcher::new()
            .with(
                ROOT,
                r#"{"root": {"children": [
                    {"content": {"uri": "garbage.glb"}},
                    {"content": {"uri": "missing.glb"}},
                    {"content": {"uri": "tile.glb"}}
                ]}}"#,
            )
            .with("https://tiles.test/garbage.glb", "definitely not a mesh")
            .with("https://tiles.test/tile.glb", square_glb([6_378_137.0, 0.0, 0.0]));
        let buffer = Pipeline::new(fetcher, config())
            .run(&Query::new(0.0, 0.0, 1000.0, 4, "k"))
            .await
            .unwrap();
        assert!(!decode_voxels(&buffer).unwrap().is_empty());
    }

    fn draco_fetcher(with_plain_tile: bool) -> MapFetcher {
        let children = if with_plain_tile {
            r#"[{"content": {"uri": "draco.glb"}}, {"content": {"uri": "tile.glb"}}]"#
        } else {
            r#"[{"content": {"uri": "draco.glb"}}]"#
        };
        MapFetcher::new()
            .with(ROOT, format!(r#"{{"root": {{"children": {children}}}}}"#))
            .with("https://tiles.test/draco.glb", draco_square_glb([6_378_137.0, 0.0, 0.0]))
            .with("https://tiles.test/tile.glb", square_glb([6_378_137.0, 0.0, 0.0]))
    }

    #[tokio::test]
    async fn test_compressed_only_run_fails() {
        let result = Pipeline::new(draco_fetcher(false), config())
            .run(&Query::new(0.0, 0.0, 1000.0, 4, "k"))
            .await;
        match result {
            Err(Error::Decode(DecodeError::UnsupportedCompression { extension })) => {
                assert_eq!(extension, "KHR_draco_mesh_compression");
            }
            other => panic!("expected unsupported compression, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compressed_tile_skipped_when_others_voxelize() {
        let buffer = Pipeline::new(draco_fetcher(true), config())
            .run(&Query::new(0.0, 0.0, 1000.0, 4, "k"))
            .await
            .unwrap();
        assert!(!decode_voxels(&buffer).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_queries() {
        let pipeline = Pipeline::new(square_fetcher(), config());
        for query in [
            Query::new(0.0, 0.0, 1000.0, 0, "k"),
            Query::new(0.0, 0.0, -1.0, 4, "k"),
            Query::new(f64::NAN, 0.0, 1.0, 4, "k"),
            Query::new(91.0, 0.0, 1.0, 4, "k"),
            Query::new(0.0, f64::INFINITY, 1.0, 4, "k"),
        ] {
            assert!(matches!(
                pipeline.run(&query).await,
                Err(Error::InvalidQuery { .. })
            ));
        }
    }

    #[test]
    fn test_query_origin_on_equator() {
        let query = Query::new(0.0, 0.0, 10.0, 1, "");
        let origin = query.origin();
        assert!((origin - DVec3::new(SEMI_MAJOR_AXIS, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(query.region().radius, 10.0);
    }

    #[test]
    fn test_voxelize_payload_decode_error() {
        assert!(matches!(
            voxelize_payload(b"nope", DMat4::IDENTITY, 4, DVec3::ZERO, false),
            Err(Error::Decode(_))
        ));
    }
}
