//! Geometry and rasterization for turning streamed 3D tiles into voxels.
//!
//! This crate provides pure synchronous functions: geodesy, bounding-volume
//! culling, mesh payload extraction, texture sampling, triangle-to-voxel
//! rasterization and the voxel wire format. Nothing here performs I/O or
//! spawns threads - the library user controls parallelism.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **User-controlled parallelism**: Callers decide how to parallelize
//! - **Sound culling**: Bounding tests over-approximate, never under-approximate

pub mod bounds;
mod error;
pub mod geodesy;
pub mod indices;
pub mod mesh;
pub mod raster;
pub mod texture;
pub mod voxel;

pub use bounds::{Aabb, OrientedBoundingBox, Sphere, intersects, obb_to_sphere};
pub use error::{DecodeError, DecodeResult};
pub use geodesy::{GeoPoint, to_cartesian, to_geographic};
pub use mesh::{Material, MeshPayload, Triangle, UpAxis, extract_mesh};
pub use raster::{VoxelGrid, rasterize};
pub use texture::{Image, decode_image};
pub use voxel::{VOXEL_RECORD_SIZE, Voxel, decode_voxels, encode_voxels};
