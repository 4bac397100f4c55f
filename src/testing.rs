//! Shared test fixtures: a scripted fetcher and a small flat world

use crate::core::types::{DVec2, DVec3, Result};
use crate::core::{Camera, CameraView};
use crate::map::MapOptions;
use crate::map::MapStatistics;
use crate::map::config::{
    BoundLayerConfig, CreditConfig, Extents2Config, Extents3Config, FreeLayerConfig, MapConfig, ReferenceFrame,
    SurfaceConfig,
};
use crate::math::{CoordinateConvertor, IdentityConvertor};
use crate::streaming::{
    BasicDecoder, Blacklist, FetchReply, FetchRequest, Fetcher, ResourceCache, ResourceLoader,
};
use crate::tile::{GeomExtents, MetaNode, MetaTile, TileId};
use crate::traverse::{Draws, Layer, TraverseContext, traverse_clearing, traverse_render};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&str) -> Option<FetchReply> + Send + Sync>;

/// Fetcher answering from a table, 404 for anything unknown
///
/// Explicit entries win over the fallback responder.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, FetchReply>>,
    requests: Mutex<HashMap<String, usize>>,
    fallback: Option<Responder>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: impl Fn(&str) -> Option<FetchReply> + Send + Sync + 'static) -> Self {
        Self {
            fallback: Some(Box::new(fallback)),
            ..Self::default()
        }
    }

    pub fn insert(&self, url: &str, reply: FetchReply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    /// `name` redirects through `name#1` .. `name#hops`, which answers `last`
    pub fn insert_redirect_chain(&self, name: &str, hops: u32, last: FetchReply) {
        let mut previous = name.to_string();
        for hop in 1..=hops {
            let next = format!("{}#{}", name, hop);
            self.insert(&previous, FetchReply::redirect(302, next.clone()));
            previous = next;
        }
        self.insert(&previous, last);
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest) -> FetchReply {
        *self.requests.lock().unwrap().entry(request.url.clone()).or_default() += 1;
        if let Some(reply) = self.replies.lock().unwrap().get(&request.url) {
            return reply.clone();
        }
        self.fallback
            .as_ref()
            .and_then(|f| f(&request.url))
            .unwrap_or_else(|| FetchReply::status(404))
    }
}

// -- Flat world ------------------------------------------------------------

/// Name the flat world configuration is served under
pub const FLAT_CONFIG_NAME: &str = "mapConfig.json";

const HALF_EXTENT: f64 = 1000.0;
const META_BINARY_ORDER: u32 = 3;

/// Numeric credit ids of the flat world
pub const TERRAIN_CREDIT: u16 = 2;
pub const ORTHO_CREDIT: u16 = 7;

const GEODATA_JSON: &str = r#"{"type": "FeatureCollection", "features": [{"type": "Feature"}]}"#;

const MESH_JSON: &str = r#"{"submeshes": [{"internalUv": true, "externalUv": true, "gpuMemory": 1000}]}"#;

/// Square 2 km world, identical SRS for nodes and physical space
pub fn flat_map_config() -> MapConfig {
    MapConfig {
        name: FLAT_CONFIG_NAME.into(),
        reference_frame: ReferenceFrame {
            node_srs: "flat".into(),
            physical_srs: "flat".into(),
            extents: Extents2Config {
                ll: [-HALF_EXTENT; 2],
                ur: [HALF_EXTENT; 2],
            },
            division_extents: Extents3Config {
                ll: [-HALF_EXTENT, -HALF_EXTENT, -100.0],
                ur: [HALF_EXTENT, HALF_EXTENT, 100.0],
            },
            meta_binary_order: META_BINARY_ORDER,
        },
        surfaces: vec![SurfaceConfig {
            id: "terrain".into(),
            meta_url: "terrain/{lod}-{x}-{y}.meta".into(),
            mesh_url: "terrain/{lod}-{x}-{y}.mesh".into(),
            texture_url: Some("terrain/{lod}-{x}-{y}-{sub}.jpg".into()),
            alien: false,
            bound_layers: vec!["ortho".into()],
            meta_availability: None,
        }],
        bound_layers: vec![BoundLayerConfig {
            id: "ortho".into(),
            num_id: 1,
            url: "ortho/{lod}-{x}-{y}.jpg".into(),
            mask_url: None,
            availability: None,
            transparent: false,
            watertight: true,
            alpha: 1.0,
            credits: vec!["ortho-provider".into()],
        }],
        free_layers: Vec::new(),
        credits: [
            ("terrain-provider", TERRAIN_CREDIT, "Terrain by Height Inc."),
            ("ortho-provider", ORTHO_CREDIT, "Imagery by Ortho Co."),
        ]
        .into_iter()
        .map(|(name, id, notice)| (name.to_string(), CreditConfig { id, notice: notice.into() }))
        .collect(),
    }
}

/// Free geodata layer sharing the terrain metadata
pub fn poi_layer_config() -> FreeLayerConfig {
    FreeLayerConfig {
        id: "poi".into(),
        meta_url: "terrain/{lod}-{x}-{y}.meta".into(),
        geodata_url: "poi/{lod}-{x}-{y}.geo".into(),
        meta_availability: None,
    }
}

fn tile_size(lod: u32) -> f64 {
    2.0 * HALF_EXTENT / f64::from(1u32 << lod)
}

/// Lower left corner of a flat world tile
pub fn tile_ll(tile: TileId) -> DVec2 {
    let size = tile_size(tile.lod);
    DVec2::new(-HALF_EXTENT + tile.x as f64 * size, HALF_EXTENT - (tile.y + 1) as f64 * size)
}

/// Upper right corner of a flat world tile
pub fn tile_ur(tile: TileId) -> DVec2 {
    tile_ll(tile) + DVec2::splat(tile_size(tile.lod))
}

fn flat_meta_tile(origin: TileId, max_lod: u32) -> MetaTile {
    let size = 1u32 << META_BINARY_ORDER;
    let side = 1u32 << origin.lod;
    let mut nodes = Vec::with_capacity((size * size) as usize);
    for dy in 0..size {
        for dx in 0..size {
            let (x, y) = (origin.x + dx, origin.y + dy);
            if x >= side || y >= side {
                nodes.push(MetaNode::default());
                continue;
            }
            nodes.push(MetaNode {
                geometry: true,
                child_flags: if origin.lod < max_lod { 0b1111 } else { 0 },
                apply_texel_size: true,
                texel_size: tile_size(origin.lod) / 256.0,
                geom_extents: GeomExtents {
                    z_min: 0.0,
                    z_max: 10.0,
                    surrogate: Some(5.0),
                },
                credits: vec![TERRAIN_CREDIT],
                ..MetaNode::default()
            });
        }
    }
    MetaTile {
        origin,
        binary_order: META_BINARY_ORDER,
        nodes,
    }
}

/// Synthesized content for the flat world's URL layout
fn flat_world_reply(url: &str, max_lod: u32) -> Option<FetchReply> {
    let (prefix, rest) = url.split_once('/')?;
    let (stem, ext) = rest.rsplit_once('.')?;
    let numbers: Vec<u32> = stem.split('-').map(|n| n.parse().ok()).collect::<Option<_>>()?;
    let [lod, x, y, ..] = numbers[..] else {
        return None;
    };
    if lod > max_lod || x >= 1 << lod || y >= 1 << lod {
        return None;
    }
    match (prefix, ext) {
        ("terrain", "meta") => {
            let tile = flat_meta_tile(TileId::new(lod, x, y), max_lod);
            let json = serde_json::to_vec(&tile).ok()?;
            Some(FetchReply::ok(json, "application/json"))
        }
        ("terrain", "mesh") => Some(FetchReply::ok(MESH_JSON, "application/json")),
        ("poi", "geo") => Some(FetchReply::ok(GEODATA_JSON, "application/geo+json")),
        ("terrain" | "ortho", "jpg") => Some(FetchReply::ok(vec![0x5a; 64], "image/jpeg")),
        _ => None,
    }
}

/// Fetcher serving the flat world down to `max_lod`, configuration included
pub fn flat_world_fetcher(max_lod: u32) -> Arc<MockFetcher> {
    let fetcher = MockFetcher::with_fallback(move |url| flat_world_reply(url, max_lod));
    let config = serde_json::to_vec(&flat_map_config()).unwrap();
    fetcher.insert(FLAT_CONFIG_NAME, FetchReply::ok(config, "application/json"));
    Arc::new(fetcher)
}

/// Options for deterministic tests: inline loading, no disk
pub fn test_options() -> MapOptions {
    MapOptions {
        worker_threads: 0,
        disable_disk_cache: true,
        keep_invalid_urls: false,
        ..MapOptions::default()
    }
}

pub fn view_from(eye: DVec3, options: &MapOptions) -> CameraView {
    CameraView::new(&Camera::look_at(eye, DVec3::ZERO, DVec3::Y), options.culling_offset_distance)
}

/// Cache, options and view for driving traversal by hand
pub struct TestRig {
    pub fetcher: Arc<MockFetcher>,
    pub cache: ResourceCache,
    pub options: MapOptions,
    pub config: MapConfig,
    pub draws: Draws,
    pub statistics: MapStatistics,
    pub view: CameraView,
    pub convertor: Arc<dyn CoordinateConvertor>,
}

impl TestRig {
    pub fn flat_world(max_lod: u32) -> Self {
        crate::core::logging::init_for_tests();
        let fetcher = flat_world_fetcher(max_lod);
        let options = test_options();
        let blacklist = Blacklist::in_memory(false);
        let loader = ResourceLoader::new(fetcher.clone(), None, blacklist.staging(), 0).unwrap();
        let cache = ResourceCache::new(options.cache_limits(), loader, Arc::new(BasicDecoder), blacklist);
        let view = view_from(DVec3::new(0.0, 0.0, 1.0e6), &options);
        Self {
            fetcher,
            cache,
            options,
            config: flat_map_config(),
            draws: Draws::default(),
            statistics: MapStatistics::default(),
            view,
            convertor: Arc::new(IdentityConvertor),
        }
    }

    /// Surface layer of the current configuration, with a fresh tree
    pub fn surface_layer(&self) -> Layer {
        Layer::from_config(&self.config).remove(0)
    }

    /// The poi geodata layer, with a fresh tree
    pub fn geodata_layer(&self) -> Layer {
        let mut config = self.config.clone();
        config.free_layers = vec![poi_layer_config()];
        Layer::from_config(&config).remove(1)
    }

    pub fn look_from(&mut self, eye: DVec3) {
        self.view = view_from(eye, &self.options);
    }

    /// Start a tick the way the map does
    pub fn tick(&mut self) {
        self.statistics.reset_frame();
        self.draws.clear();
        self.cache.set_limits(self.options.cache_limits());
        self.cache.begin_tick();
        self.cache.process();
    }

    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut TraverseContext<'_>) -> R) -> R {
        let mut ctx = TraverseContext {
            cache: &mut self.cache,
            options: &self.options,
            view: &self.view,
            convertor: &*self.convertor,
            reference_frame: &self.config.reference_frame,
            draws: &mut self.draws,
            statistics: &mut self.statistics,
        };
        f(&mut ctx)
    }

    /// One full frame over `layer`: tick, clearing, traversal
    pub fn frame(&mut self, layer: &mut Layer) -> Result<()> {
        self.tick();
        self.with_context(|ctx| {
            traverse_clearing(&mut layer.tree, ctx.tick(), ctx.options.traverse_clear_grace_ticks);
            traverse_render(ctx, layer)
        })
    }
}
