//! Traversal layers built from a map configuration

use super::node::TraverseTree;
use crate::map::config::{BoundLayerConfig, CreditConfig, FreeLayerConfig, MapConfig, SurfaceConfig};
use crate::streaming::AvailabilityTest;
use crate::tile::{NodeInfo, UrlTemplate};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Bound layer with parsed URL templates
#[derive(Clone, Debug)]
pub struct BoundLayerInfo {
    pub id: String,
    pub num_id: u32,
    pub url: UrlTemplate,
    pub mask_url: Option<UrlTemplate>,
    pub availability: Option<AvailabilityTest>,
    pub transparent: bool,
    pub watertight: bool,
    pub alpha: f32,
    /// Numeric ids of the layer's credits
    pub credits: Vec<u16>,
}

impl BoundLayerInfo {
    fn from_config(config: &BoundLayerConfig, credits: &BTreeMap<String, CreditConfig>) -> Self {
        Self {
            id: config.id.clone(),
            num_id: config.num_id,
            url: UrlTemplate::new(&config.url),
            mask_url: config.mask_url.as_ref().map(UrlTemplate::new),
            availability: config.availability.clone(),
            transparent: config.transparent,
            watertight: config.watertight,
            alpha: config.alpha,
            credits: config
                .credits
                .iter()
                .filter_map(|name| match credits.get(name) {
                    Some(credit) => Some(credit.id),
                    None => {
                        log::warn!("Bound layer '{}' names unknown credit '{}'", config.id, name);
                        None
                    }
                })
                .collect(),
        }
    }

    /// Fully hides everything below it
    pub fn is_opaque_cover(&self) -> bool {
        self.watertight && !self.transparent && self.alpha >= 1.0
    }
}

/// Surface with parsed URL templates
#[derive(Clone, Debug)]
pub struct SurfaceInfo {
    pub id: String,
    pub meta_url: UrlTemplate,
    /// Mesh aggregate, or geodata for geodata layers
    pub data_url: UrlTemplate,
    pub texture_url: Option<UrlTemplate>,
    pub alien: bool,
    /// Bottom to top
    pub bound_layers: Vec<Arc<BoundLayerInfo>>,
    pub meta_availability: Option<AvailabilityTest>,
}

/// What a layer's tiles contain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Surfaces,
    Geodata,
}

/// Surface stack plus the traverse tree walking it
#[derive(Debug)]
pub struct Layer {
    /// Empty for the main surface stack, the free layer id otherwise
    pub name: String,
    pub kind: LayerKind,
    pub surfaces: Vec<SurfaceInfo>,
    /// Bound layers by numeric id, for meshes naming their own layer
    pub bound_layers_by_num: HashMap<u32, Arc<BoundLayerInfo>>,
    pub tree: TraverseTree,
}

impl Layer {
    /// All layers of a configuration, the surface stack first
    pub fn from_config(config: &MapConfig) -> Vec<Layer> {
        let frame = &config.reference_frame;
        let root = NodeInfo::root(frame.root_extents(), Arc::from(frame.node_srs.as_str()));

        let bound: HashMap<&str, Arc<BoundLayerInfo>> = config
            .bound_layers
            .iter()
            .map(|b| (b.id.as_str(), Arc::new(BoundLayerInfo::from_config(b, &config.credits))))
            .collect();
        let bound_layers_by_num: HashMap<u32, Arc<BoundLayerInfo>> = bound
            .values()
            .filter(|b| b.num_id != 0)
            .map(|b| (b.num_id, Arc::clone(b)))
            .collect();

        let mut layers = Vec::new();
        if !config.surfaces.is_empty() {
            layers.push(Layer {
                name: String::new(),
                kind: LayerKind::Surfaces,
                surfaces: config.surfaces.iter().map(|s| surface_info(s, &bound)).collect(),
                bound_layers_by_num,
                tree: TraverseTree::new(root.clone()),
            });
        }
        for free in &config.free_layers {
            layers.push(Layer {
                name: free.id.clone(),
                kind: LayerKind::Geodata,
                surfaces: vec![geodata_surface(free)],
                bound_layers_by_num: HashMap::new(),
                tree: TraverseTree::new(root.clone()),
            });
        }
        layers
    }

    pub fn is_geodata(&self) -> bool {
        self.kind == LayerKind::Geodata
    }
}

fn surface_info(config: &SurfaceConfig, bound: &HashMap<&str, Arc<BoundLayerInfo>>) -> SurfaceInfo {
    SurfaceInfo {
        id: config.id.clone(),
        meta_url: UrlTemplate::new(&config.meta_url),
        data_url: UrlTemplate::new(&config.mesh_url),
        texture_url: config.texture_url.as_ref().map(UrlTemplate::new),
        alien: config.alien,
        bound_layers: config
            .bound_layers
            .iter()
            .filter_map(|id| bound.get(id.as_str()).cloned())
            .collect(),
        meta_availability: config.meta_availability.clone(),
    }
}

fn geodata_surface(config: &FreeLayerConfig) -> SurfaceInfo {
    SurfaceInfo {
        id: config.id.clone(),
        meta_url: UrlTemplate::new(&config.meta_url),
        data_url: UrlTemplate::new(&config.geodata_url),
        texture_url: None,
        alien: false,
        bound_layers: Vec::new(),
        meta_availability: config.meta_availability.clone(),
    }
}
