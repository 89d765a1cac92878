//! Tileset document model.
//!
//! Only the fields the resolver acts on are modelled; everything else in a
//! document (geometric error, refinement, extensions, asset metadata) is
//! ignored by serde. Children are parsed one at a time, so a malformed
//! child drops only itself and its own subtree.

use glam::DMat4;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tilevox_decode::{OrientedBoundingBox, Sphere};

/// A node of the tile hierarchy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileNode {
    /// Spatial extent of this node and all of its descendants.
    #[serde(default)]
    pub bounding_volume: Option<BoundingVolume>,
    /// Column-major 4x4 transform from this node's frame to its parent's.
    #[serde(default)]
    pub transform: Option<Vec<f64>>,
    /// Well-formed child nodes; malformed entries are skipped.
    #[serde(default, deserialize_with = "lenient_children")]
    pub children: Option<Vec<TileNode>>,
    /// Single content reference.
    #[serde(default)]
    pub content: Option<Content>,
    /// Multiple content references.
    #[serde(default)]
    pub contents: Option<Vec<Content>>,
}

fn lenient_children<'de, D>(deserializer: D) -> Result<Option<Vec<TileNode>>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::debug!(found = %other, "children is not an array, ignoring");
            return Ok(None);
        }
    };

    let children = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(child) => Some(child),
            Err(e) => {
                tracing::debug!(index, error = %e, "skipping malformed child");
                None
            }
        })
        .collect();
    Ok(Some(children))
}

/// The bounding volume forms a node may declare.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoundingVolume {
    /// Center followed by three half-axis vectors.
    #[serde(default, rename = "box")]
    pub obb: Option<Vec<f64>>,
    /// Center followed by radius.
    #[serde(default)]
    pub sphere: Option<Vec<f64>>,
    /// Geographic west, south, east, north, min height, max height.
    #[serde(default)]
    pub region: Option<Vec<f64>>,
}

/// A content reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default, alias = "url")]
    pub uri: Option<String>,
}

/// What a fetched document turned out to be.
#[derive(Debug, Clone)]
pub enum Document {
    /// A tileset with a root node and possibly its own session token.
    Tileset {
        session: Option<String>,
        root: TileNode,
    },
    /// A bare node.
    Node(TileNode),
    /// Valid but empty.
    Empty,
}

/// Parse a fetched structured document.
///
/// # Errors
///
/// Returns the underlying JSON error if the bytes are not a document the
/// resolver can use.
pub fn parse_document(bytes: &[u8]) -> Result<Document, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Object(mut map) => {
            if let Some(root) = map.remove("root") {
                let session = map
                    .get("session")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned);
                let root = serde_json::from_value(root)?;
                Ok(Document::Tileset { session, root })
            } else if map.is_empty() {
                Ok(Document::Empty)
            } else {
                Ok(Document::Node(serde_json::from_value(Value::Object(map))?))
            }
        }
        Value::Null => Ok(Document::Empty),
        Value::Array(items) if items.is_empty() => Ok(Document::Empty),
        // A non-empty value with no node fields yields no content.
        _ => Ok(Document::Node(TileNode::default())),
    }
}

impl TileNode {
    /// The node's own transform, if it declares a well-formed one.
    #[must_use]
    pub fn local_transform(&self) -> Option<DMat4> {
        let values = self.transform.as_deref()?;
        let cols: &[f64; 16] = values.try_into().ok()?;
        let matrix = DMat4::from_cols_array(cols);
        matrix.is_finite().then_some(matrix)
    }

    /// Every content URI attached to the node, primary reference first.
    pub fn content_uris(&self) -> impl Iterator<Item = &str> {
        self.content
            .iter()
            .chain(self.contents.iter().flatten())
            .filter_map(|c| c.uri.as_deref())
    }
}

impl BoundingVolume {
    /// A sphere enclosing the volume in the frame given by `transform`.
    ///
    /// Returns `None` for forms that are not culled (regions) or that are
    /// malformed, which keeps the node.
    #[must_use]
    pub fn bounding_sphere(&self, transform: &DMat4) -> Option<Sphere> {
        if let Some(values) = self.obb.as_deref()
            && let Some(obb) = OrientedBoundingBox::from_box_values(values)
        {
            return Some(obb.transformed(transform).to_sphere());
        }
        self.sphere
            .as_deref()
            .and_then(Sphere::from_sphere_values)
            .map(|sphere| sphere.transformed(transform))
    }
}
