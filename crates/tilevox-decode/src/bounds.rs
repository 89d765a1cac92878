//! Bounding volumes and the sphere-based culling test.
//!
//! Tile bounding boxes are oriented (center plus three half-axis vectors).
//! Culling reduces them to a circumscribing sphere, which over-approximates
//! the box and therefore never rejects a tile that actually overlaps a query.

use glam::{DMat3, DMat4, DVec3};

/// A sphere in planet-centred coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: f64,
}

impl Sphere {
    #[must_use]
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Parse a `[cx, cy, cz, r]` bounding sphere.
    #[must_use]
    pub fn from_sphere_values(values: &[f64]) -> Option<Self> {
        match values {
            [x, y, z, r, ..] => Some(Self::new(DVec3::new(*x, *y, *z), *r)),
            _ => None,
        }
    }

    /// True iff the center distance is strictly less than the sum of radii.
    #[must_use]
    pub fn intersects(&self, other: &Sphere) -> bool {
        self.center.distance(other.center) < self.radius + other.radius
    }

    /// Apply an affine transform, growing the radius by the largest axis scale.
    #[must_use]
    pub fn transformed(&self, transform: &DMat4) -> Self {
        let scale = transform
            .x_axis
            .truncate()
            .length()
            .max(transform.y_axis.truncate().length())
            .max(transform.z_axis.truncate().length());
        Self {
            center: transform.transform_point3(self.center),
            radius: self.radius * scale,
        }
    }
}

/// True iff the two spheres overlap (see [`Sphere::intersects`]).
#[must_use]
pub fn intersects(a: &Sphere, b: &Sphere) -> bool {
    a.intersects(b)
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// An inverted box that any point expands.
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut aabb, p| {
            aabb.include(p);
            aabb
        })
    }

    pub fn include(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Sphere through the box corners: center at the midpoint, radius half the diagonal.
    #[must_use]
    pub fn circumscribed_sphere(&self) -> Sphere {
        Sphere::new(self.center(), 0.5 * self.size().length())
    }
}

/// A box with a center and three half-axis vectors (columns of `half_axes`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: DVec3,
    pub half_axes: DMat3,
}

impl OrientedBoundingBox {
    /// Parse a 12-float `[center, half_axis_x, half_axis_y, half_axis_z]` box.
    ///
    /// Returns `None` for arrays with fewer than 12 numbers.
    #[must_use]
    pub fn from_box_values(values: &[f64]) -> Option<Self> {
        if values.len() < 12 {
            return None;
        }
        Some(Self {
            center: DVec3::new(values[0], values[1], values[2]),
            half_axes: DMat3::from_cols(
                DVec3::new(values[3], values[4], values[5]),
                DVec3::new(values[6], values[7], values[8]),
                DVec3::new(values[9], values[10], values[11]),
            ),
        })
    }

    /// The eight corners, `center ± h1 ± h2 ± h3`.
    #[must_use]
    pub fn corners(&self) -> [DVec3; 8] {
        std::array::from_fn(|i| {
            let s1 = if i & 1 == 0 { -1.0 } else { 1.0 };
            let s2 = if i & 2 == 0 { -1.0 } else { 1.0 };
            let s3 = if i & 4 == 0 { -1.0 } else { 1.0 };
            self.center
                + self.half_axes.x_axis * s1
                + self.half_axes.y_axis * s2
                + self.half_axes.z_axis * s3
        })
    }

    #[must_use]
    pub fn transformed(&self, transform: &DMat4) -> Self {
        Self {
            center: transform.transform_point3(self.center),
            half_axes: DMat3::from_mat4(*transform) * self.half_axes,
        }
    }

    /// Conservative bounding sphere: the sphere around the corners' AABB.
    #[must_use]
    pub fn to_sphere(&self) -> Sphere {
        Aabb::from_points(self.corners()).circumscribed_sphere()
    }
}

/// Reduce a 12-float box array to its circumscribing sphere.
///
/// Returns `None` when the array is malformed; callers treat that like an
/// undeclared volume.
#[must_use]
pub fn obb_to_sphere(values: &[f64]) -> Option<Sphere> {
    OrientedBoundingBox::from_box_values(values).map(|obb| obb.to_sphere())
}
