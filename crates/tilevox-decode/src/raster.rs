//! Triangle-to-voxel rasterization.
//!
//! A payload is re-oriented so that its local "up" (away from the planet
//! centre) becomes +Y, then every triangle is stamped into every grid cell
//! its own bounding box overlaps. The cell test is deliberately coarse: it
//! over-approximates the triangle and never misses a cell it touches.
//!
//! Overlapping triangles emit duplicate cells. Their relative order follows
//! triangle order and carries no precedence; see [`VoxelGrid::dedup_first_write`].

use std::collections::HashSet;

use glam::{DQuat, DVec3, IVec3, UVec3};

use crate::bounds::Aabb;
use crate::mesh::{MeshPayload, Triangle};
use crate::voxel::Voxel;

/// Slack subtracted before rounding grid extents up, so an axis that spans
/// exactly `n` voxels is not widened to `n + 1` by floating-point noise.
const EXTENT_EPSILON: f64 = 1e-9;

/// Voxels for one payload, with the parameters needed to place them.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    pub voxels: Vec<Voxel>,
    /// Edge length of one voxel in meters.
    pub voxel_size: f64,
    /// Cell counts along each axis of the rotated frame.
    pub dims: UVec3,
    /// Minimum corner of the grid in the rotated, center-relative frame.
    pub min: DVec3,
    /// Planet-centred midpoint of the payload's bounding box.
    pub center: DVec3,
    /// Rotation taking the payload's local up to +Y.
    pub rotation: DQuat,
    /// `center - origin` for the origin the payload was rasterized against.
    pub origin_offset: DVec3,
}

impl VoxelGrid {
    fn empty(origin: DVec3) -> Self {
        Self {
            voxels: Vec::new(),
            voxel_size: 0.0,
            dims: UVec3::ZERO,
            min: DVec3::ZERO,
            center: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            origin_offset: -origin,
        }
    }

    /// Planet-centred position of a voxel's cell centre.
    #[must_use]
    pub fn world_position(&self, voxel: &Voxel) -> DVec3 {
        let cell = DVec3::new(f64::from(voxel.x), f64::from(voxel.y), f64::from(voxel.z));
        let local = self.min + (cell + 0.5) * self.voxel_size;
        self.center + self.rotation.inverse() * local
    }

    /// Drop repeated cells, keeping the first record emitted for each.
    pub fn dedup_first_write(&mut self) {
        let mut seen = HashSet::with_capacity(self.voxels.len());
        self.voxels.retain(|v| seen.insert((v.x, v.y, v.z)));
    }

    /// Cell containing a rotated-frame point, clamped to the grid.
    fn cell_index(&self, point: DVec3) -> IVec3 {
        let cell = ((point - self.min) / self.voxel_size).floor();
        cell.clamp(DVec3::ZERO, self.dims.as_dvec3() - 1.0).as_ivec3()
    }
}

/// Rasterize a payload at `resolution` voxels along its longest axis.
///
/// `origin` is only recorded (as [`VoxelGrid::origin_offset`]); voxel
/// coordinates are always indices into this payload's own grid, starting at
/// zero. Grids from different payloads therefore share one index space and
/// overlap when their voxels are concatenated. Place them with
/// [`VoxelGrid::world_position`] or `origin_offset` instead of by index.
#[must_use]
pub fn rasterize(payload: &MeshPayload, resolution: u32, origin: DVec3) -> VoxelGrid {
    let bounds = Aabb::from_points(payload.triangles.iter().flat_map(|t| t.positions));
    if bounds.is_empty() || resolution == 0 {
        return VoxelGrid::empty(origin);
    }

    let center = bounds.center();
    let rotation = up_rotation(center);
    let rotated: Vec<[DVec3; 3]> = payload
        .triangles
        .iter()
        .map(|t| t.positions.map(|p| rotation * (p - center)))
        .collect();

    let rotated_bounds = Aabb::from_points(rotated.iter().flatten().copied());
    let size = rotated_bounds.size();
    let voxel_size = size.max_element() / f64::from(resolution);
    if !voxel_size.is_finite() || voxel_size <= 0.0 {
        return VoxelGrid::empty(origin);
    }

    let dims = (size / voxel_size - EXTENT_EPSILON).ceil().max(DVec3::ONE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let dims = UVec3::new(dims.x as u32, dims.y as u32, dims.z as u32);

    let mut grid = VoxelGrid {
        voxels: Vec::new(),
        voxel_size,
        dims,
        min: rotated_bounds.min,
        center,
        rotation,
        origin_offset: center - origin,
    };

    for (triangle, positions) in payload.triangles.iter().zip(&rotated) {
        let color = triangle_color(payload, triangle);
        let cells = Aabb::from_points(*positions);
        let lo = grid.cell_index(cells.min);
        let hi = grid.cell_index(cells.max);

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    grid.voxels.push(Voxel::new(x, y, z, color));
                }
            }
        }
    }

    grid
}

/// Shortest-arc rotation taking `normalize(center)` to +Y.
///
/// The antiparallel case (a payload centred on the -Y axis) is a 180° turn
/// about an arbitrary perpendicular axis; a payload centred on the planet
/// origin has no defined up and is left unrotated.
fn up_rotation(center: DVec3) -> DQuat {
    let up = center.normalize_or_zero();
    if up == DVec3::ZERO {
        return DQuat::IDENTITY;
    }
    DQuat::from_rotation_arc(up, DVec3::Y)
}

/// One color per triangle: the base color factor, replaced by the texel
/// under the first vertex's UV when the material has a decodable texture.
/// Only RGB is taken from either source; voxels are always opaque.
fn triangle_color(payload: &MeshPayload, triangle: &Triangle) -> [u8; 4] {
    let material = payload.material(triangle.material);

    if let Some(index) = material.base_color_image
        && let Some(image) = payload.image(index)
        && let Some([r, g, b, _]) = image.sample(triangle.uvs[0].x, triangle.uvs[0].y)
    {
        return [r, g, b, u8::MAX];
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let [r, g, b, _] = material
        .base_color_factor
        .map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8);
    [r, g, b, u8::MAX]
}
