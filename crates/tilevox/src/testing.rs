//! Test doubles shared by the crate's unit tests.

use crate::fetch::{Fetch, FetchFuture, Fetched};
use crate::urls::tile_identifier;
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

/// Serves canned payloads keyed by tile identifier and records every URL
/// it was asked for, credentials included.
#[derive(Default)]
pub(crate) struct MapFetcher {
    responses: HashMap<String, Fetched>,
    requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.responses
            .insert(tile_identifier(url), Fetched::new(bytes.into(), None));
        self
    }

    pub(crate) fn with_typed(mut self, url: &str, bytes: Vec<u8>, content_type: &str) -> Self {
        self.responses.insert(
            tile_identifier(url),
            Fetched::new(bytes, Some(content_type.to_owned())),
        );
        self
    }

    /// Every URL fetched so far, in request order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The full URL requested for a tile identifier, if it was requested.
    pub(crate) fn request_for(&self, url: &str) -> Option<String> {
        let wanted = tile_identifier(url);
        self.requests()
            .into_iter()
            .find(|r| tile_identifier(r) == wanted)
    }
}

impl Fetch for MapFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_owned());
        let response = self
            .responses
            .get(&tile_identifier(url))
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { response })
    }
}

/// A GLB holding a white unit square in the glTF XY plane, placed by a
/// node translation.
pub(crate) fn square_glb(translation: [f32; 3]) -> Vec<u8> {
    square_glb_with_root(translation, "")
}

/// The same square, declaring that it requires Draco mesh compression.
pub(crate) fn draco_square_glb(translation: [f32; 3]) -> Vec<u8> {
    square_glb_with_root(
        translation,
        r#""extensionsUsed":["KHR_draco_mesh_compression"],"extensionsRequired":["KHR_draco_mesh_compression"],"#,
    )
}

fn square_glb_with_root(translation: [f32; 3], root_extra: &str) -> Vec<u8> {
    let positions: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

    let mut bin: Vec<u8> = positions
        .iter()
        .flatten()
        .flat_map(|f| f.to_le_bytes())
        .collect();
    let index_offset = bin.len();
    bin.extend(indices.iter().flat_map(|i| i.to_le_bytes()));
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let json = format!(
        r#"{{{root_extra}"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0,"translation":{translation:?}}}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1,"material":0}}]}}],"materials":[{{"pbrMetallicRoughness":{{"baseColorFactor":[1,1,1,1]}}}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":4,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},{{"bufferView":1,"componentType":5123,"count":6,"type":"SCALAR"}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":{index_offset}}},{{"buffer":0,"byteOffset":{index_offset},"byteLength":12}}],"buffers":[{{"byteLength":{}}}]}}"#,
        bin.len()
    );
    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&u32::try_from(total).unwrap().to_le_bytes());
    out.extend_from_slice(&u32::try_from(json.len()).unwrap().to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&u32::try_from(bin.len()).unwrap().to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}
