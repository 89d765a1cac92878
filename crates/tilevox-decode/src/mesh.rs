//! Mesh payload extraction.
//!
//! Decodes a binary glTF container into a flat list of world-space
//! triangles plus the material and image tables they reference. The scene
//! graph is walked so every primitive is placed by its accumulated node
//! transform, composed with a caller-supplied root transform.

use glam::{DMat4, DVec2, DVec3};
use gltf::mesh::Mode;

use crate::error::{DecodeError, DecodeResult};
use crate::indices::{fan_to_triangles, strip_to_triangles};
use crate::texture::{Image, decode_image};

/// Scene graphs deeper than this are treated as cyclic and cut off.
const MAX_NODE_DEPTH: usize = 64;

/// Geometry compression extensions that cannot be decoded here.
const COMPRESSION_EXTENSIONS: [&str; 3] = [
    "KHR_draco_mesh_compression",
    "EXT_meshopt_compression",
    "KHR_meshopt_compression",
];

/// A triangle in world space with per-vertex texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub positions: [DVec3; 3],
    pub uvs: [DVec2; 3],
    /// Index into [`MeshPayload::materials`], if the primitive has a material.
    pub material: Option<usize>,
}

/// The surface description of a primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Linear RGBA multiplier, each component in `[0, 1]`.
    pub base_color_factor: [f32; 4],
    /// Index into [`MeshPayload::images`] of the base color texture.
    pub base_color_image: Option<usize>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            base_color_image: None,
        }
    }
}

/// Which axis a mesh container treats as "up".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    /// glTF convention; rotated +90° about X into the tileset's Z-up frame.
    #[default]
    Y,
    /// Already Z-up; no conversion.
    Z,
}

impl UpAxis {
    /// Transform from the container's frame to a Z-up frame.
    #[must_use]
    pub fn to_z_up(self) -> DMat4 {
        match self {
            Self::Y => DMat4::from_rotation_x(std::f64::consts::FRAC_PI_2),
            Self::Z => DMat4::IDENTITY,
        }
    }
}

/// Everything the rasterizer needs from one mesh payload.
#[derive(Debug, Clone, Default)]
pub struct MeshPayload {
    pub triangles: Vec<Triangle>,
    pub materials: Vec<Material>,
    /// Decoded images; `None` where an image could not be decoded.
    pub images: Vec<Option<Image>>,
}

impl MeshPayload {
    /// Material for a triangle, falling back to opaque white.
    #[must_use]
    pub fn material(&self, index: Option<usize>) -> Material {
        index
            .and_then(|i| self.materials.get(i))
            .copied()
            .unwrap_or_default()
    }

    /// Decoded image by index.
    #[must_use]
    pub fn image(&self, index: usize) -> Option<&Image> {
        self.images.get(index).and_then(Option::as_ref)
    }
}

/// Decode a binary glTF payload into world-space triangles.
///
/// `root_transform` is applied on top of each node's accumulated transform.
/// Primitives without readable positions, and non-triangle primitives, are
/// skipped. Missing texture coordinates become zero.
///
/// # Errors
///
/// Returns an error if the container cannot be parsed or its binary chunk is
/// shorter than the buffers it declares. A container that requires Draco or
/// meshopt geometry compression fails with
/// [`DecodeError::UnsupportedCompression`].
pub fn extract_mesh(data: &[u8], root_transform: DMat4) -> DecodeResult<MeshPayload> {
    let gltf = gltf::Gltf::from_slice(data).map_err(|e| {
        required_compression(data).map_or_else(
            || DecodeError::from(e),
            |extension| DecodeError::UnsupportedCompression { extension },
        )
    })?;
    let buffers = load_buffers(&gltf)?;
    let document = &gltf.document;

    let materials = document.materials().map(convert_material).collect();
    let images = document
        .images()
        .map(|image| load_image(&image, &buffers))
        .collect();

    let roots: Vec<gltf::Node<'_>> = match document
        .default_scene()
        .or_else(|| document.scenes().next())
    {
        Some(scene) => scene.nodes().collect(),
        None => root_nodes(document),
    };

    let mut triangles = Vec::new();
    let mut stack: Vec<_> = roots
        .into_iter()
        .map(|node| (node, root_transform, 0))
        .collect();

    while let Some((node, parent, depth)) = stack.pop() {
        if depth >= MAX_NODE_DEPTH {
            tracing::warn!(node = node.index(), "node hierarchy too deep, skipping");
            continue;
        }

        let world = parent * node_matrix(&node);

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                append_primitive(&primitive, &buffers, world, &mut triangles);
            }
        }

        stack.extend(node.children().map(|child| (child, world, depth + 1)));
    }

    Ok(MeshPayload {
        triangles,
        materials,
        images,
    })
}

/// The first compression extension the container lists as required, if any.
fn required_compression(data: &[u8]) -> Option<String> {
    let json = match gltf::Glb::from_slice(data) {
        Ok(glb) => glb.json,
        Err(_) => std::borrow::Cow::Borrowed(data),
    };
    let root = gltf::json::Root::from_slice(&json).ok()?;
    root.extensions_required
        .into_iter()
        .find(|name| COMPRESSION_EXTENSIONS.contains(&name.as_str()))
}

/// Nodes that no other node lists as a child.
fn root_nodes(document: &gltf::Document) -> Vec<gltf::Node<'_>> {
    let mut is_child = vec![false; document.nodes().len()];
    for node in document.nodes() {
        for child in node.children() {
            is_child[child.index()] = true;
        }
    }
    document
        .nodes()
        .filter(|node| !is_child[node.index()])
        .collect()
}

fn node_matrix(node: &gltf::Node<'_>) -> DMat4 {
    let columns = node.transform().matrix().map(|column| column.map(f64::from));
    DMat4::from_cols_array_2d(&columns)
}

fn load_buffers(gltf: &gltf::Gltf) -> DecodeResult<Vec<Vec<u8>>> {
    gltf.buffers()
        .map(|buffer| match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf.blob.as_deref().ok_or(DecodeError::InvalidFormat {
                    context: "gltf buffer",
                    detail: "binary chunk missing".to_string(),
                })?;
                if blob.len() < buffer.length() {
                    return Err(DecodeError::BufferTooSmall {
                        expected: buffer.length(),
                        actual: blob.len(),
                    });
                }
                Ok(blob.to_vec())
            }
            gltf::buffer::Source::Uri(uri) => {
                tracing::debug!(uri, "external buffer not supported, leaving empty");
                Ok(Vec::new())
            }
        })
        .collect()
}

fn load_image(image: &gltf::Image<'_>, buffers: &[Vec<u8>]) -> Option<Image> {
    let gltf::image::Source::View { view, .. } = image.source() else {
        tracing::debug!(image = image.index(), "external image not supported");
        return None;
    };

    let bytes = buffers
        .get(view.buffer().index())?
        .get(view.offset()..view.offset() + view.length())?;

    match decode_image(bytes) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(image = image.index(), "failed to decode image: {e}");
            None
        }
    }
}

fn convert_material(material: gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    Material {
        base_color_factor: pbr.base_color_factor(),
        base_color_image: pbr
            .base_color_texture()
            .map(|info| info.texture().source().index()),
    }
}

fn append_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[Vec<u8>],
    world: DMat4,
    triangles: &mut Vec<Triangle>,
) {
    let reader = primitive.reader(|buffer| {
        buffers
            .get(buffer.index())
            .filter(|data| !data.is_empty())
            .map(Vec::as_slice)
    });

    let Some(positions) = reader.read_positions() else {
        tracing::debug!("primitive has no readable positions, skipping");
        return;
    };
    let positions: Vec<DVec3> = positions
        .map(|p| world.transform_point3(DVec3::from_array(p.map(f64::from))))
        .collect();

    let uvs: Vec<DVec2> = reader
        .read_tex_coords(0)
        .map(|coords| {
            coords
                .into_f32()
                .map(|uv| DVec2::from_array(uv.map(f64::from)))
                .collect()
        })
        .unwrap_or_default();

    let vertex_count = u32::try_from(positions.len()).unwrap_or(u32::MAX);
    let indices: Vec<u32> = reader
        .read_indices()
        .map_or_else(|| (0..vertex_count).collect(), |i| i.into_u32().collect());

    let indices = match primitive.mode() {
        Mode::Triangles => indices,
        Mode::TriangleStrip => strip_to_triangles(&indices),
        Mode::TriangleFan => fan_to_triangles(&indices),
        other => {
            tracing::debug!(?other, "non-triangle primitive, skipping");
            return;
        }
    };

    let material = primitive.material().index();

    for corner in indices.chunks_exact(3) {
        let fetch = |i: u32| {
            let i = i as usize;
            positions
                .get(i)
                .map(|&p| (p, uvs.get(i).copied().unwrap_or(DVec2::ZERO)))
        };
        let (Some(a), Some(b), Some(c)) = (fetch(corner[0]), fetch(corner[1]), fetch(corner[2]))
        else {
            continue;
        };
        triangles.push(Triangle {
            positions: [a.0, b.0, c.0],
            uvs: [a.1, b.1, c.1],
            material,
        });
    }
}
