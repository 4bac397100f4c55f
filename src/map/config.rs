//! Map configuration: reference frame, surfaces and layers
//!
//! Loaded as a regular resource of kind `MapConfig`. Relative URLs in the
//! document are resolved against the configuration's own name.

use crate::core::Error;
use crate::core::types::{DVec2, DVec3, Result};
use crate::math::Aabb;
use crate::streaming::AvailabilityTest;
use crate::tile::{Extents2, resolve_relative};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Meta tiles larger than 2^16 per side are rejected
const MAX_META_BINARY_ORDER: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extents2Config {
    pub ll: [f64; 2],
    pub ur: [f64; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extents3Config {
    pub ll: [f64; 3],
    pub ur: [f64; 3],
}

/// Spatial division of the quadtree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceFrame {
    /// SRS of node extents and meta tile heights
    pub node_srs: String,
    /// SRS everything is rendered in
    pub physical_srs: String,
    /// Root node extents in the node SRS
    pub extents: Extents2Config,
    /// Physical box enclosing the whole body
    pub division_extents: Extents3Config,
    /// Meta tiles hold `2^meta_binary_order` tiles per side
    pub meta_binary_order: u32,
}

impl ReferenceFrame {
    pub fn root_extents(&self) -> Extents2 {
        Extents2::new(DVec2::from(self.extents.ll), DVec2::from(self.extents.ur))
    }

    pub fn division_aabb(&self) -> Aabb {
        Aabb::new(
            DVec3::from(self.division_extents.ll),
            DVec3::from(self.division_extents.ur),
        )
    }
}

/// One surface of the stack, top to bottom in declaration order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceConfig {
    pub id: String,
    pub meta_url: String,
    pub mesh_url: String,
    /// Internal texture, `{sub}` selects the submesh
    #[serde(default)]
    pub texture_url: Option<String>,
    #[serde(default)]
    pub alien: bool,
    /// Bound layer ids, bottom to top
    #[serde(default)]
    pub bound_layers: Vec<String>,
    /// Applied to meta tile downloads
    #[serde(default)]
    pub meta_availability: Option<AvailabilityTest>,
}

/// Texture layer draped over surfaces through external UVs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundLayerConfig {
    pub id: String,
    /// Id used by meshes that name their layer
    #[serde(default)]
    pub num_id: u32,
    pub url: String,
    #[serde(default)]
    pub mask_url: Option<String>,
    #[serde(default)]
    pub availability: Option<AvailabilityTest>,
    #[serde(default)]
    pub transparent: bool,
    /// Covers every pixel of every tile it has
    #[serde(default = "default_true")]
    pub watertight: bool,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Credit names shown while the layer is drawn
    #[serde(default)]
    pub credits: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_alpha() -> f32 {
    1.0
}

/// Free geodata layer with its own metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeLayerConfig {
    pub id: String,
    pub meta_url: String,
    pub geodata_url: String,
    #[serde(default)]
    pub meta_availability: Option<AvailabilityTest>,
}

/// Attribution shown for drawn data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditConfig {
    /// Numeric id used by meta nodes
    pub id: u16,
    #[serde(default)]
    pub notice: String,
}

/// Parsed map configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    /// Name the configuration was loaded from
    #[serde(skip)]
    pub name: String,
    pub reference_frame: ReferenceFrame,
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,
    #[serde(default)]
    pub bound_layers: Vec<BoundLayerConfig>,
    #[serde(default)]
    pub free_layers: Vec<FreeLayerConfig>,
    /// Credits by name
    #[serde(default)]
    pub credits: BTreeMap<String, CreditConfig>,
}

impl MapConfig {
    /// Parse a configuration downloaded from `name`
    ///
    /// Every URL template is resolved against `name`.
    pub fn from_json(content: &[u8], name: &str) -> std::result::Result<Self, serde_json::Error> {
        let mut config: MapConfig = serde_json::from_slice(content)?;
        config.name = name.to_string();
        config.resolve_urls();
        Ok(config)
    }

    fn resolve_urls(&mut self) {
        let base = self.name.clone();
        let resolve = |url: &mut String| *url = resolve_relative(url, &base);
        for surface in &mut self.surfaces {
            resolve(&mut surface.meta_url);
            resolve(&mut surface.mesh_url);
            if let Some(url) = &mut surface.texture_url {
                resolve(url);
            }
        }
        for layer in &mut self.bound_layers {
            resolve(&mut layer.url);
            if let Some(url) = &mut layer.mask_url {
                resolve(url);
            }
        }
        for layer in &mut self.free_layers {
            resolve(&mut layer.meta_url);
            resolve(&mut layer.geodata_url);
        }
    }

    pub fn bound_layer(&self, id: &str) -> Option<&BoundLayerConfig> {
        self.bound_layers.iter().find(|l| l.id == id)
    }

    /// Check the configuration describes a usable map
    ///
    /// # Errors
    /// `Error::Configuration` naming the first problem found
    pub fn validate(&self) -> Result<()> {
        let frame = &self.reference_frame;
        let invalid = |message: String| Err(Error::Configuration(message));

        if frame.node_srs.is_empty() || frame.physical_srs.is_empty() {
            return invalid("reference frame is missing an SRS".into());
        }
        let extents = frame.root_extents();
        if !(extents.ll.cmplt(extents.ur).all() && extents.ll.is_finite() && extents.ur.is_finite()) {
            return invalid(format!("invalid root extents {:?}", frame.extents));
        }
        let division = frame.division_aabb();
        if !(division.is_finite() && division.min.cmple(division.max).all()) {
            return invalid(format!("invalid division extents {:?}", frame.division_extents));
        }
        if frame.meta_binary_order > MAX_META_BINARY_ORDER {
            return invalid(format!("meta binary order {} too large", frame.meta_binary_order));
        }
        if self.surfaces.is_empty() && self.free_layers.is_empty() {
            return invalid("map has neither surfaces nor free layers".into());
        }

        let mut ids = HashSet::new();
        for surface in &self.surfaces {
            if !ids.insert(surface.id.as_str()) {
                return invalid(format!("duplicate surface '{}'", surface.id));
            }
            if let Some(missing) = surface.bound_layers.iter().find(|id| self.bound_layer(id).is_none()) {
                return invalid(format!("surface '{}' references unknown bound layer '{}'", surface.id, missing));
            }
        }

        let mut credit_ids = HashSet::new();
        for (name, credit) in &self.credits {
            if !credit_ids.insert(credit.id) {
                return invalid(format!("credit '{}' reuses id {}", name, credit.id));
            }
        }
        Ok(())
    }
}
