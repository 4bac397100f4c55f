//! Runtime knobs of the streaming engine

use crate::core::types::Result;
use crate::streaming::{CacheLimits, DiskCache};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the traversal treats nodes whose children are still streaming
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraverseMode {
    /// Render the coarser node until all children can replace it
    #[default]
    Hierarchical,
    /// Render whatever is ready at the chosen level, holes included
    Flat,
}

/// Engine options
///
/// Every field has a default, so a JSON file only needs the values it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    // -- Resources ---------------------------------------------------------

    /// Combined RAM + GPU budget for cached resources, bytes
    pub max_resources_memory: usize,
    /// Downloads in flight at once
    pub max_concurrent_downloads: usize,
    /// Decodes on the render thread per tick
    pub max_resource_processes_per_tick: usize,
    /// Untouched ticks before a resource may be evicted
    pub resource_eviction_grace_ticks: u32,

    // -- Traversal ---------------------------------------------------------

    /// Metadata resolutions attempted per tick
    pub max_node_meta_updates_per_tick: usize,
    /// Draw task resolutions attempted per tick
    pub max_node_draws_updates_per_tick: usize,
    /// Screen pixels per texel below which a surface tile is fine enough
    pub target_pixel_ratio_surfaces: f64,
    /// Same for geodata tiles
    pub target_pixel_ratio_geodata: f64,
    /// Untouched ticks before a traverse subtree is pruned
    pub traverse_clear_grace_ticks: u32,
    pub traverse_mode: TraverseMode,
    /// Estimate coarseness from bounding disks instead of corners
    pub coarseness_disks: bool,
    /// Moves the culling frustum back along the view direction
    pub culling_offset_distance: f64,

    // -- Storage -----------------------------------------------------------

    /// Disk cache root, `$HOME/.cache/globestream` when unset
    pub cache_path: Option<PathBuf>,
    pub disable_disk_cache: bool,
    /// Persist the blacklist in the cache root
    pub keep_invalid_urls: bool,
    /// Also persist failures that might succeed on a later run
    pub persist_transient_failures: bool,
    /// Loader threads, 0 runs jobs inline on the render thread
    pub worker_threads: usize,

    // -- Debug -------------------------------------------------------------

    /// Emit an infographic marker at each rendered node's surrogate point
    pub debug_render_surrogates: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            max_resources_memory: 512 * 1024 * 1024,
            max_concurrent_downloads: 10,
            max_resource_processes_per_tick: 5,
            resource_eviction_grace_ticks: 100,
            max_node_meta_updates_per_tick: 10,
            max_node_draws_updates_per_tick: 10,
            target_pixel_ratio_surfaces: 1.2,
            target_pixel_ratio_geodata: 1.2,
            traverse_clear_grace_ticks: 5,
            traverse_mode: TraverseMode::Hierarchical,
            coarseness_disks: false,
            culling_offset_distance: 0.0,
            cache_path: None,
            disable_disk_cache: false,
            keep_invalid_urls: true,
            persist_transient_failures: false,
            worker_threads: 2,
            debug_render_surrogates: false,
        }
    }
}

impl MapOptions {
    /// Load options from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resource cache limits derived from these options
    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_concurrent_downloads: self.max_concurrent_downloads,
            max_resources_memory: self.max_resources_memory,
            eviction_grace_ticks: self.resource_eviction_grace_ticks,
            max_resource_processes_per_tick: self.max_resource_processes_per_tick,
        }
    }

    /// Disk cache root, falling back to the per-user default
    pub fn resolve_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => DiskCache::default_root(),
        }
    }

    /// Pixel ratio threshold for a layer
    pub fn target_pixel_ratio(&self, geodata: bool) -> f64 {
        if geodata {
            self.target_pixel_ratio_geodata
        } else {
            self.target_pixel_ratio_surfaces
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MapOptions::default();
        assert_eq!(options.max_concurrent_downloads, 10);
        assert_eq!(options.traverse_mode, TraverseMode::Hierarchical);
        assert_eq!(options.cache_limits().max_resources_memory, 512 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json() {
        let options: MapOptions =
            serde_json::from_str(r#"{"traverse_mode": "flat", "max_concurrent_downloads": 4}"#).unwrap();
        assert_eq!(options.traverse_mode, TraverseMode::Flat);
        assert_eq!(options.max_concurrent_downloads, 4);
        assert_eq!(options.resource_eviction_grace_ticks, 100);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        let mut options = MapOptions::default();
        options.cache_path = Some(dir.path().join("cache"));
        options.worker_threads = 0;
        std::fs::write(&path, options.to_json().unwrap()).unwrap();

        let loaded = MapOptions::load(&path).unwrap();
        assert_eq!(loaded, options);
        assert_eq!(loaded.resolve_cache_path().unwrap(), dir.path().join("cache"));
    }
}
