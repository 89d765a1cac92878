//! Tile tree traversal.
//!
//! The resolver walks a tileset hierarchy with an explicit worklist, culling
//! each node's bounding volume against the query sphere and following
//! external content documents. Every work item carries its own
//! [`TraversalContext`].
//!
//! # Sessions
//!
//! A session token is scoped to the subtree it was found in. A token declared
//! by a document, or carried by a content URL, applies to that content and
//! everything reached through it. It is never written back to the parent
//! context, so a later sibling keeps the parent's token (or none) even if an
//! earlier sibling's URL brought its own. For example, with the children
//! `first.glb?session=S1` and `second.glb` under a root without a session,
//! `second.glb` is requested without a session.
//!
//! Precedence for a fetched document is: its own `session` field, then the
//! token in the URL it was fetched from, then the inherited one.

use crate::fetch::Fetch;
use crate::tileset::{Document, TileNode, parse_document};
use crate::urls::{self, ContentKind};
use glam::DMat4;
use std::collections::HashSet;
use std::sync::Arc;
use tilevox_decode::Sphere;

/// Default ceiling on hierarchy depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default ceiling on visited nodes per traversal.
pub const DEFAULT_MAX_NODES: usize = 100_000;

/// Ceilings that stop pathological or cyclic hierarchies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Nodes deeper than this are skipped, along with their subtrees.
    pub max_depth: usize,
    /// Traversal stops once this many nodes have been visited.
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl TraversalLimits {
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }
}

/// State inherited by a node from the document that contains it.
///
/// Contexts are immutable and shared by siblings; a node that needs a
/// different session or transform gets a new context for its own subtree.
#[derive(Debug, Clone)]
pub struct TraversalContext {
    /// The query region.
    pub region: Sphere,
    /// URL of the containing document; relative references resolve against it.
    pub base_url: String,
    /// Session token appended to constructed URLs, empty if none.
    pub session: String,
    /// API key appended to constructed URLs.
    pub key: Arc<str>,
    /// Accumulated tile transform from the node's frame to world space.
    pub transform: DMat4,
}

impl TraversalContext {
    fn for_document(&self, base_url: String, session: String) -> Self {
        Self {
            region: self.region,
            base_url,
            session,
            key: Arc::clone(&self.key),
            transform: self.transform,
        }
    }

    fn with_transform(&self, transform: DMat4) -> Self {
        Self {
            transform,
            ..self.clone()
        }
    }
}

/// A mesh payload selected by traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafContent {
    /// Fully qualified URL, credentials included.
    pub url: String,
    /// Tile transform to apply to the payload's geometry.
    pub transform: DMat4,
}

/// Counters reported at the end of a traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub nodes_culled: usize,
    pub documents_fetched: usize,
    /// Whether a depth or node ceiling cut the traversal short.
    pub truncated: bool,
}

/// The outcome of a traversal.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub leaves: Vec<LeafContent>,
    pub stats: TraversalStats,
}

enum WorkItem {
    Node {
        node: TileNode,
        context: Arc<TraversalContext>,
        depth: usize,
    },
    Document {
        url: String,
        context: Arc<TraversalContext>,
        depth: usize,
    },
}

/// Walks tileset hierarchies through a [`Fetch`] implementation.
pub struct Resolver<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    limits: TraversalLimits,
}

impl<'a, F: Fetch + ?Sized> Resolver<'a, F> {
    #[must_use]
    pub fn new(fetcher: &'a F, limits: TraversalLimits) -> Self {
        Self { fetcher, limits }
    }

    /// Fetch the root tileset at `root_url` and resolve it against `region`.
    ///
    /// A root document that cannot be fetched or parsed yields no leaves. A
    /// session token in the root document takes priority over one embedded
    /// in `root_url`.
    pub async fn resolve_root(&self, root_url: &str, region: Sphere, key: &str) -> Resolution {
        let url = urls::with_credentials(root_url, key, "");
        let fetched = self.fetcher.fetch(&url).await;
        if fetched.is_empty() {
            tracing::warn!(url = %urls::tile_identifier(&url), "root tileset unavailable");
            return Resolution::default();
        }

        let (root, session) = match parse_document(&fetched.bytes) {
            Ok(Document::Tileset { session, root }) => (root, session),
            Ok(Document::Node(node)) => (node, None),
            Ok(Document::Empty) => {
                tracing::warn!(url = %urls::tile_identifier(&url), "root tileset is empty");
                return Resolution::default();
            }
            Err(e) => {
                tracing::warn!(url = %urls::tile_identifier(&url), error = %e, "root tileset unparseable");
                return Resolution::default();
            }
        };
        let session = session
            .or_else(|| urls::session_of(&url).map(str::to_owned))
            .unwrap_or_default();

        let visited = HashSet::from([urls::tile_identifier(&url)]);
        let context = TraversalContext {
            region,
            base_url: url,
            session,
            key: Arc::from(key),
            transform: DMat4::IDENTITY,
        };
        let mut resolution = self.walk(root, context, visited).await;
        resolution.stats.documents_fetched += 1;
        resolution
    }

    /// Resolve the subtree under `node`.
    pub async fn resolve(&self, node: TileNode, context: TraversalContext) -> Resolution {
        self.walk(node, context, HashSet::new()).await
    }

    async fn walk(
        &self,
        node: TileNode,
        context: TraversalContext,
        mut visited_documents: HashSet<String>,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let mut stack = vec![WorkItem::Node {
            node,
            context: Arc::new(context),
            depth: 0,
        }];

        while let Some(item) = stack.pop() {
            match item {
                WorkItem::Node {
                    node,
                    context,
                    depth,
                } => {
                    if resolution.stats.nodes_visited >= self.limits.max_nodes {
                        tracing::warn!(
                            max_nodes = self.limits.max_nodes,
                            "node budget exhausted, stopping traversal"
                        );
                        resolution.stats.truncated = true;
                        break;
                    }
                    if depth > self.limits.max_depth {
                        tracing::warn!(depth, "depth ceiling reached, skipping subtree");
                        resolution.stats.truncated = true;
                        continue;
                    }
                    resolution.stats.nodes_visited += 1;
                    Self::visit_node(node, &context, depth, &mut stack, &mut resolution);
                }
                WorkItem::Document {
                    url,
                    context,
                    depth,
                } => {
                    if !visited_documents.insert(urls::tile_identifier(&url)) {
                        tracing::debug!(url = %urls::tile_identifier(&url), "document already visited");
                        continue;
                    }
                    self.visit_document(url, &context, depth, &mut stack, &mut resolution)
                        .await;
                }
            }
        }

        tracing::debug!(
            leaves = resolution.leaves.len(),
            visited = resolution.stats.nodes_visited,
            culled = resolution.stats.nodes_culled,
            documents = resolution.stats.documents_fetched,
            "traversal finished"
        );
        resolution
    }

    fn visit_node(
        mut node: TileNode,
        context: &Arc<TraversalContext>,
        depth: usize,
        stack: &mut Vec<WorkItem>,
        resolution: &mut Resolution,
    ) {
        let context = match node.local_transform() {
            Some(local) => Arc::new(context.with_transform(context.transform * local)),
            None => Arc::clone(context),
        };

        if let Some(volume) = &node.bounding_volume
            && let Some(bounds) = volume.bounding_sphere(&context.transform)
            && !context.region.intersects(&bounds)
        {
            tracing::trace!(center = ?bounds.center, radius = bounds.radius, "culled");
            resolution.stats.nodes_culled += 1;
            return;
        }

        if let Some(children) = node.children.take() {
            // Reversed so the first child is visited first.
            stack.extend(children.into_iter().rev().map(|child| WorkItem::Node {
                node: child,
                context: Arc::clone(&context),
                depth: depth + 1,
            }));
            return;
        }

        let mut documents = Vec::new();
        for uri in node.content_uris() {
            let resolved = urls::resolve_uri(&context.base_url, uri);
            let session = urls::session_of(&resolved).unwrap_or(context.session.as_str());
            let url = urls::with_credentials(&resolved, &context.key, session);

            match urls::classify(&url) {
                ContentKind::Mesh => {
                    tracing::debug!(url = %urls::tile_identifier(&url), "leaf");
                    resolution.leaves.push(LeafContent {
                        url,
                        transform: context.transform,
                    });
                }
                ContentKind::Document | ContentKind::Unknown => {
                    documents.push(WorkItem::Document {
                        url,
                        context: Arc::clone(&context),
                        depth: depth + 1,
                    });
                }
            }
        }
        stack.extend(documents.into_iter().rev());
    }

    async fn visit_document(
        &self,
        url: String,
        context: &TraversalContext,
        depth: usize,
        stack: &mut Vec<WorkItem>,
        resolution: &mut Resolution,
    ) {
        let fetched = self.fetcher.fetch(&url).await;
        if fetched.is_empty() {
            tracing::debug!(url = %urls::tile_identifier(&url), "document unavailable");
            return;
        }
        resolution.stats.documents_fetched += 1;

        let mesh_leaf = |resolution: &mut Resolution, url: String| {
            resolution.leaves.push(LeafContent {
                url,
                transform: context.transform,
            });
        };

        if fetched.is_declared_mesh() {
            mesh_leaf(resolution, url);
            return;
        }

        let (node, session) = match parse_document(&fetched.bytes) {
            Ok(Document::Tileset { session, root }) => (root, session),
            Ok(Document::Node(node)) => (node, None),
            Ok(Document::Empty) => {
                tracing::debug!(url = %urls::tile_identifier(&url), "empty document, treating as mesh");
                mesh_leaf(resolution, url);
                return;
            }
            Err(e) => {
                tracing::debug!(url = %urls::tile_identifier(&url), error = %e, "not a document, treating as mesh");
                mesh_leaf(resolution, url);
                return;
            }
        };

        // The document's own session wins over the one its URL carries.
        let session = session
            .or_else(|| urls::session_of(&url).map(str::to_owned))
            .unwrap_or_else(|| context.session.clone());
        stack.push(WorkItem::Node {
            node,
            context: Arc::new(context.for_document(url, session)),
            depth,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MapFetcher;
    use glam::DVec3;

    const ROOT: &str = "https://tiles.test/v1/root.json";

    fn region() -> Sphere {
        Sphere::new(DVec3::ZERO, 10.0)
    }

    fn resolve(fetcher: &MapFetcher, limits: TraversalLimits) -> Resolution {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(Resolver::new(fetcher, limits).resolve_root(ROOT, region(), "k"))
    }

    fn leaf_ids(resolution: &Resolution) -> Vec<String> {
        resolution
            .leaves
            .iter()
            .map(|l| urls::tile_identifier(&l.url))
            .collect()
    }

    #[test]
    fn test_collects_leaves_in_order() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {"children": [
                {"content": {"uri": "a.glb"}},
                {"contents": [{"uri": "b.glb"}, {"uri": "/other/c.glb"}]}
            ]}}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(
            leaf_ids(&resolution),
            [
                "https://tiles.test/v1/a.glb",
                "https://tiles.test/v1/b.glb",
                "https://tiles.test/other/c.glb",
            ]
        );
        assert!(resolution.leaves.iter().all(|l| l.url.contains("key=k")));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_culled_subtree_is_not_fetched() {
        let fetcher = MapFetcher::new()
            .with(
                ROOT,
                r#"{"root": {
                    "boundingVolume": {"box": [1000,0,0, 1,0,0, 0,1,0, 0,0,1]},
                    "children": [{"content": {"uri": "far.json"}}]
                }}"#,
            )
            .with("https://tiles.test/v1/far.json", r#"{"content": {"uri": "x.glb"}}"#);
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert!(resolution.leaves.is_empty());
        assert_eq!(resolution.stats.nodes_culled, 1);
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_node_with_children_ignores_content() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {
                "content": {"uri": "parent.glb"},
                "children": [{"content": {"uri": "child.glb"}}]
            }}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(leaf_ids(&resolution), ["https://tiles.test/v1/child.glb"]);
    }

    #[test]
    fn test_undeclared_and_region_volumes_are_kept() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {"children": [
                {"boundingVolume": {"region": [3, 1, 3.1, 1.1, 0, 10]}, "content": {"uri": "r.glb"}},
                {"boundingVolume": {"box": [1000, 0]}, "content": {"uri": "bad.glb"}},
                {"boundingVolume": {"sphere": [5, 0, 0, 1]}, "content": {"uri": "s.glb"}},
                {"boundingVolume": {"sphere": [50, 0, 0, 1]}, "content": {"uri": "gone.glb"}}
            ]}}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(
            leaf_ids(&resolution),
            [
                "https://tiles.test/v1/r.glb",
                "https://tiles.test/v1/bad.glb",
                "https://tiles.test/v1/s.glb",
            ]
        );
    }

    #[test]
    fn test_external_documents() {
        let fetcher = MapFetcher::new()
            .with(
                ROOT,
                r#"{"root": {"children": [
                    {"content": {"uri": "sub/tileset.json"}},
                    {"content": {"uri": "sub/node.json"}},
                    {"content": {"uri": "sub/empty.json"}},
                    {"content": {"uri": "sub/noext"}},
                    {"content": {"uri": "sub/missing.json"}}
                ]}}"#,
            )
            .with(
                "https://tiles.test/v1/sub/tileset.json",
                r#"{"root": {"content": {"uri": "deep/a.glb"}}}"#,
            )
            .with(
                "https://tiles.test/v1/sub/node.json",
                r#"{"content": {"uri": "b.glb"}}"#,
            )
            .with("https://tiles.test/v1/sub/empty.json", "{}")
            .with("https://tiles.test/v1/sub/noext", b"glTF\x02\0\0\0".to_vec());
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(
            leaf_ids(&resolution),
            [
                "https://tiles.test/v1/sub/deep/a.glb",
                "https://tiles.test/v1/sub/b.glb",
                "https://tiles.test/v1/sub/empty.json",
                "https://tiles.test/v1/sub/noext",
            ]
        );
        assert_eq!(resolution.stats.documents_fetched, 5);
    }

    #[test]
    fn test_declared_mesh_content_type_skips_parsing() {
        let fetcher = MapFetcher::new()
            .with(ROOT, r#"{"root": {"content": {"uri": "tile"}}}"#)
            .with_typed(
                "https://tiles.test/v1/tile",
                br#"{"content": {"uri": "never.glb"}}"#.to_vec(),
                "model/gltf-binary",
            );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(leaf_ids(&resolution), ["https://tiles.test/v1/tile"]);
    }

    #[test]
    fn test_root_session_propagates() {
        let fetcher = MapFetcher::new()
            .with(
                ROOT,
                r#"{"session": "root-s", "root": {"children": [
                    {"content": {"uri": "a.glb"}},
                    {"content": {"uri": "sub.json"}}
                ]}}"#,
            )
            .with(
                "https://tiles.test/v1/sub.json",
                r#"{"root": {"content": {"uri": "b.glb"}}}"#,
            );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(resolution.leaves.len(), 2);
        for leaf in &resolution.leaves {
            assert_eq!(urls::session_of(&leaf.url), Some("root-s"), "{}", leaf.url);
        }
        let sub = fetcher.request_for("https://tiles.test/v1/sub.json").unwrap();
        assert_eq!(urls::session_of(&sub), Some("root-s"));
    }

    #[test]
    fn test_url_session_scoped_to_subtree() {
        let fetcher = MapFetcher::new()
            .with(
                ROOT,
                r#"{"session": "root-s", "root": {"children": [
                    {"content": {"uri": "sub.json?session=sub-s"}},
                    {"content": {"uri": "sibling.glb"}}
                ]}}"#,
            )
            .with(
                "https://tiles.test/v1/sub.json",
                r#"{"root": {"children": [
                    {"content": {"uri": "inner.glb"}},
                    {"content": {"uri": "own.glb?session=own-s"}}
                ]}}"#,
            );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        let sessions: Vec<_> = resolution
            .leaves
            .iter()
            .map(|l| (urls::tile_identifier(&l.url), urls::session_of(&l.url).map(str::to_owned)))
            .collect();
        assert_eq!(
            sessions,
            [
                ("https://tiles.test/v1/inner.glb".to_owned(), Some("sub-s".to_owned())),
                ("https://tiles.test/v1/own.glb".to_owned(), Some("own-s".to_owned())),
                ("https://tiles.test/v1/sibling.glb".to_owned(), Some("root-s".to_owned())),
            ]
        );
    }

    #[test]
    fn test_url_session_does_not_reach_later_siblings() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {"children": [
                {"content": {"uri": "first.glb?session=S1"}},
                {"content": {"uri": "second.glb"}}
            ]}}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        let urls: Vec<_> = resolution.leaves.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://tiles.test/v1/first.glb?session=S1&key=k",
                "https://tiles.test/v1/second.glb?key=k",
            ]
        );
    }

    #[test]
    fn test_root_url_session_used_without_document_session() {
        let fetcher = MapFetcher::new().with(ROOT, r#"{"root": {"content": {"uri": "a.glb"}}}"#);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let resolution = runtime.block_on(
            Resolver::new(&fetcher, TraversalLimits::default()).resolve_root(
                &format!("{ROOT}?session=url-s"),
                region(),
                "k",
            ),
        );
        assert_eq!(urls::session_of(&resolution.leaves[0].url), Some("url-s"));
    }

    #[test]
    fn test_cycle_is_fetched_once() {
        let fetcher = MapFetcher::new()
            .with(ROOT, r#"{"root": {"content": {"uri": "loop.json"}}}"#)
            .with(
                "https://tiles.test/v1/loop.json",
                r#"{"root": {"children": [
                    {"content": {"uri": "loop.json"}},
                    {"content": {"uri": "a.glb"}}
                ]}}"#,
            );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(leaf_ids(&resolution), ["https://tiles.test/v1/a.glb"]);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn test_cycle_through_parent_segments_is_fetched_once() {
        let fetcher = MapFetcher::new()
            .with(ROOT, r#"{"root": {"content": {"uri": "sub/loop.json"}}}"#)
            .with(
                "https://tiles.test/v1/sub/loop.json",
                r#"{"root": {"children": [
                    {"content": {"uri": "../sub/./loop.json"}},
                    {"content": {"uri": "../root.json"}},
                    {"content": {"uri": "../a.glb"}}
                ]}}"#,
            );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(leaf_ids(&resolution), ["https://tiles.test/v1/a.glb"]);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn test_malformed_child_keeps_siblings() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {"children": [
                {"content": {"uri": "a.glb"}},
                {"boundingVolume": {"box": "wide"}, "content": {"uri": "bad.glb"}},
                {"content": {"uri": "b.glb"}}
            ]}}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(
            leaf_ids(&resolution),
            ["https://tiles.test/v1/a.glb", "https://tiles.test/v1/b.glb"]
        );
        assert_eq!(resolution.stats.documents_fetched, 1);
    }

    #[test]
    fn test_root_self_reference_not_refetched() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {"children": [
                {"content": {"uri": "root.json"}},
                {"content": {"uri": "a.glb"}}
            ]}}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        assert_eq!(leaf_ids(&resolution), ["https://tiles.test/v1/a.glb"]);
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_depth_and_node_limits() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {"children": [
                {"content": {"uri": "shallow.glb"}},
                {"children": [{"children": [{"content": {"uri": "deep.glb"}}]}]}
            ]}}"#,
        );
        let shallow = resolve(&fetcher, TraversalLimits::default().with_max_depth(2));
        assert_eq!(leaf_ids(&shallow), ["https://tiles.test/v1/shallow.glb"]);
        assert!(shallow.stats.truncated);

        let few = resolve(&fetcher, TraversalLimits::default().with_max_nodes(2));
        assert_eq!(leaf_ids(&few), ["https://tiles.test/v1/shallow.glb"]);
        assert_eq!(few.stats.nodes_visited, 2);
        assert!(few.stats.truncated);
    }

    #[test]
    fn test_transforms_accumulate() {
        let fetcher = MapFetcher::new().with(
            ROOT,
            r#"{"root": {
                "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 100,0,0,1],
                "boundingVolume": {"sphere": [-100, 0, 0, 1]},
                "children": [{
                    "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,5,0,1],
                    "content": {"uri": "a.glb"}
                }]
            }}"#,
        );
        let resolution = resolve(&fetcher, TraversalLimits::default());
        let leaf = &resolution.leaves[0];
        assert_eq!(
            leaf.transform.transform_point3(DVec3::ZERO),
            DVec3::new(100.0, 5.0, 0.0)
        );
    }

    #[test]
    fn test_unavailable_root_yields_nothing() {
        let resolution = resolve(&MapFetcher::new(), TraversalLimits::default());
        assert!(resolution.leaves.is_empty());

        let garbage = MapFetcher::new().with(ROOT, "not json");
        assert!(resolve(&garbage, TraversalLimits::default()).leaves.is_empty());
    }
}
