//! Map engine facade
//!
//! [`Map`] owns the resource cache, loader and traverse trees of one map
//! and runs them once per rendered frame:
//!
//! ```text
//! begin_tick -> process -> prerequisites -> clearing -> traversal -> sort
//! ```

pub mod config;
pub mod credits;
pub mod options;
pub mod statistics;

pub use config::MapConfig;
pub use credits::{Credit, MapCredits};
pub use options::{MapOptions, TraverseMode};
pub use statistics::{MAX_LODS, MapStatistics};

use crate::core::types::Result;
use crate::core::{Camera, CameraView, Error};
use crate::math::CoordinateConvertor;
use crate::streaming::{
    BLACKLIST_FILE_NAME, Blacklist, Decoder, DiskCache, Fetcher, Resource, ResourceCache, ResourceKind,
    ResourceLoader, Validity,
};
use crate::traverse::{Draws, Layer, TraverseContext, traverse_clearing, traverse_render};
use std::sync::Arc;

/// Streaming engine for one map
pub struct Map {
    options: MapOptions,
    cache: ResourceCache,
    convertor: Arc<dyn CoordinateConvertor>,
    config_path: Option<String>,
    config: Option<MapConfig>,
    /// Sticky reason the configuration cannot be used
    config_failure: Option<String>,
    layers: Vec<Layer>,
    draws: Draws,
    map_credits: MapCredits,
    /// Credits of the last tick
    credits: Vec<Credit>,
    statistics: MapStatistics,
}

impl Map {
    /// Create a map engine
    ///
    /// # Arguments
    /// * `options` - Engine options; storage and thread options only apply here
    /// * `fetcher` - Transport for every download
    /// * `decoder` - Turns downloaded bytes into payloads on the render thread
    /// * `convertor` - Converts node SRS points into the physical SRS
    ///
    /// # Errors
    /// Fails when the cache root cannot be resolved or the loader pool
    /// cannot be built
    pub fn new(
        options: MapOptions,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder>,
        convertor: Arc<dyn CoordinateConvertor>,
    ) -> Result<Self> {
        let needs_root = !options.disable_disk_cache || options.keep_invalid_urls;
        let root = if needs_root { Some(options.resolve_cache_path()?) } else { None };

        let disk_cache = match (&root, options.disable_disk_cache) {
            (Some(root), false) => Some(Arc::new(DiskCache::new(root.clone())?)),
            _ => None,
        };
        let blacklist = match (&root, options.keep_invalid_urls) {
            (Some(root), true) => Blacklist::load(root.join(BLACKLIST_FILE_NAME), options.persist_transient_failures),
            _ => Blacklist::in_memory(options.persist_transient_failures),
        };
        let loader = ResourceLoader::new(fetcher, disk_cache, blacklist.staging(), options.worker_threads)?;
        let cache = ResourceCache::new(options.cache_limits(), loader, decoder, blacklist);

        log::info!(
            "Map engine created ({} workers, disk cache {})",
            options.worker_threads,
            root.as_ref()
                .filter(|_| !options.disable_disk_cache)
                .map_or_else(|| "disabled".to_string(), |r| r.display().to_string())
        );

        Ok(Self {
            options,
            cache,
            convertor,
            config_path: None,
            config: None,
            config_failure: None,
            layers: Vec::new(),
            draws: Draws::default(),
            map_credits: MapCredits::default(),
            credits: Vec::new(),
            statistics: MapStatistics::default(),
        })
    }

    /// Point the engine at a map configuration, dropping the current one
    pub fn set_map_config_path(&mut self, path: impl Into<String>) {
        self.purge_map_config();
        let path = path.into();
        log::info!("Map configuration path set to {}", path);
        self.config_path = Some(path);
    }

    /// Forget the configuration so it is downloaded and parsed again
    pub fn purge_map_config(&mut self) {
        if let Some(path) = &self.config_path {
            self.cache.purge(path);
        }
        self.config = None;
        self.config_failure = None;
        self.layers.clear();
        self.draws.clear();
        self.map_credits = MapCredits::default();
        self.credits.clear();
    }

    /// Drop every traverse tree back to a bare root
    ///
    /// Cached resources stay, so the view rebuilds quickly.
    pub fn purge_view_cache(&mut self) {
        for layer in &mut self.layers {
            layer.tree.reset();
        }
        self.draws.clear();
        self.credits.clear();
        log::info!("View cache purged");
    }

    /// Replace the options
    ///
    /// Cache limits and traversal knobs apply from the next tick. Storage
    /// and worker options only take effect for a new engine.
    pub fn set_options(&mut self, options: MapOptions) {
        self.cache.set_limits(options.cache_limits());
        self.options = options;
    }

    /// Run one frame
    ///
    /// Nothing is traversed until the map configuration is ready, or when
    /// the camera has no viewport. The resulting draws are available from
    /// [`Map::draws`] until the next call.
    ///
    /// # Errors
    /// `Error::MapConfig` when the configuration failed to load (on every
    /// call until it is purged), `Error::Configuration` when it is invalid
    /// or the convertor breaks
    pub fn render_tick(&mut self, camera: &Camera) -> Result<()> {
        self.statistics.reset_frame();
        self.draws.clear();
        self.credits.clear();
        self.cache.begin_tick();
        self.cache.process();
        self.statistics.render_ticks += 1;

        let ready = self.check_prerequisites();
        let result = match ready {
            Ok(true) if camera.has_viewport() => self.traverse(camera),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        self.credits = self.map_credits.resolve(&self.draws.credits);

        self.statistics.resources = self.cache.statistics().clone();
        self.statistics.current_nodes = self.layers.iter().map(|l| l.tree.len() as u32).sum();
        log::trace!(
            "Tick {}: {} nodes traversed, {} rendered, {} resources",
            self.cache.tick(),
            self.statistics.nodes_traversed_total,
            self.statistics.nodes_rendered_total,
            self.statistics.resources.current_resources
        );
        result
    }

    fn check_prerequisites(&mut self) -> Result<bool> {
        if let Some(reason) = &self.config_failure {
            return Err(Error::MapConfig(reason.clone()));
        }
        if self.config.is_some() {
            return Ok(true);
        }
        let Some(path) = self.config_path.clone() else {
            return Ok(false);
        };

        let resource = self.cache.get(&path, ResourceKind::MapConfig);
        resource.update_priority(f64::INFINITY);
        match resource.validity() {
            Validity::Indeterminate => Ok(false),
            Validity::Invalid => {
                let reason = format!("'{}' ended in {:?}", path, resource.state());
                log::error!("Map configuration failed: {}", reason);
                self.config_failure = Some(reason.clone());
                Err(Error::MapConfig(reason))
            }
            Validity::Valid => {
                let config = resource
                    .payload()
                    .and_then(|p| p.as_map_config().cloned())
                    .ok_or_else(|| Error::MapConfig(format!("'{}' holds no map configuration", path)));
                let config = config.and_then(|c| c.validate().map(|()| c));
                let config = match config {
                    Ok(config) => config,
                    Err(e) => {
                        log::error!("Map configuration rejected: {}", e);
                        self.config_failure = Some(e.to_string());
                        return Err(e);
                    }
                };
                self.layers = Layer::from_config(&config);
                self.map_credits = MapCredits::from_config(&config);
                log::info!(
                    "Map configuration '{}' ready: {} surfaces, {} free layers, {} credits",
                    path,
                    config.surfaces.len(),
                    config.free_layers.len(),
                    self.map_credits.len()
                );
                self.config = Some(config);
                Ok(true)
            }
        }
    }

    fn traverse(&mut self, camera: &Camera) -> Result<()> {
        let Some(config) = &self.config else {
            return Ok(());
        };
        let view = CameraView::new(camera, self.options.culling_offset_distance);
        let tick = self.cache.tick();
        for layer in &mut self.layers {
            traverse_clearing(&mut layer.tree, tick, self.options.traverse_clear_grace_ticks);
            let mut ctx = TraverseContext {
                cache: &mut self.cache,
                options: &self.options,
                view: &view,
                convertor: self.convertor.as_ref(),
                reference_frame: &config.reference_frame,
                draws: &mut self.draws,
                statistics: &mut self.statistics,
            };
            traverse_render(&mut ctx, layer)?;
        }
        self.draws.sort_opaque_front_to_back(view.eye);
        Ok(())
    }

    /// Release every resource and traverse tree
    ///
    /// The configuration path is kept; the next tick starts from scratch.
    pub fn render_finalize(&mut self) {
        self.layers.clear();
        self.config = None;
        self.config_failure = None;
        self.draws.clear();
        self.map_credits = MapCredits::default();
        self.credits.clear();
        self.cache.clear();
    }

    /// Draws of the last tick
    pub fn draws(&self) -> &Draws {
        &self.draws
    }

    /// Credits of the data drawn in the last tick, most drawn first
    pub fn credits(&self) -> &[Credit] {
        &self.credits
    }

    pub fn statistics(&self) -> &MapStatistics {
        &self.statistics
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    /// Parsed configuration, once ready
    pub fn config(&self) -> Option<&MapConfig> {
        self.config.as_ref()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Look up a cached resource by name
    pub fn resource(&self, name: &str) -> Option<&Arc<Resource>> {
        self.cache.find(name)
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }
}
