//! Draw tasks handed to the renderer
//!
//! Tasks hold shared references to the resources they draw, which keeps
//! those resources out of eviction for as long as a node holds the task.

use crate::core::types::{DMat4, DVec3, Vec4};
use crate::streaming::Resource;
use crate::tile::TileId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One textured submesh
#[derive(Clone, Debug)]
pub struct DrawSurfaceTask {
    pub mesh: Arc<Resource>,
    pub submesh: u32,
    pub texture_color: Option<Arc<Resource>>,
    pub texture_mask: Option<Arc<Resource>>,
    pub model: DMat4,
    pub color: Vec4,
    /// Texture is sampled with external (bound layer) UVs
    pub external_uv: bool,
    /// Untextured, shaded flat
    pub flat_shading: bool,
    /// Physical centre used for depth sorting
    pub center: DVec3,
}

impl DrawSurfaceTask {
    pub fn ready(&self) -> bool {
        self.mesh.is_ready()
            && self.texture_color.as_ref().is_none_or(|t| t.is_ready())
            && self.texture_mask.as_ref().is_none_or(|t| t.is_ready())
    }

    fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        std::iter::once(&self.mesh)
            .chain(self.texture_color.as_ref())
            .chain(self.texture_mask.as_ref())
    }
}

/// Geodata features of one tile
#[derive(Clone, Debug)]
pub struct DrawGeodataTask {
    pub geodata: Arc<Resource>,
    pub tile: TileId,
}

/// Debug marker
#[derive(Clone, Debug, PartialEq)]
pub struct DrawInfographicTask {
    pub model: DMat4,
    pub color: Vec4,
}

/// Resolved draw tasks stored on a traverse node
#[derive(Clone, Debug, Default)]
pub struct Renders {
    pub opaque: Vec<DrawSurfaceTask>,
    pub transparent: Vec<DrawSurfaceTask>,
    pub geodata: Vec<DrawGeodataTask>,
    /// Credits of the bound layers these tasks drape
    pub credits: Vec<u16>,
}

impl Renders {
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty() && self.geodata.is_empty()
    }

    pub fn ready(&self) -> bool {
        self.opaque.iter().all(DrawSurfaceTask::ready)
            && self.transparent.iter().all(DrawSurfaceTask::ready)
            && self.geodata.iter().all(|g| g.geodata.is_ready())
    }

    /// Every resource referenced by these tasks
    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.opaque
            .iter()
            .chain(&self.transparent)
            .flat_map(DrawSurfaceTask::resources)
            .chain(self.geodata.iter().map(|g| &g.geodata))
    }
}

/// How often a credit was drawn this frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CreditHit {
    pub count: u32,
    /// Deepest lod drawn with this credit
    pub max_lod: u32,
}

/// Credits of the rendered nodes, by numeric id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreditHits {
    hits: BTreeMap<u16, CreditHit>,
}

impl CreditHits {
    pub fn hit(&mut self, id: u16, lod: u32) {
        let hit = self.hits.entry(id).or_default();
        hit.count += 1;
        hit.max_lod = hit.max_lod.max(lod);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, CreditHit)> + '_ {
        self.hits.iter().map(|(id, hit)| (*id, *hit))
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }
}

/// Everything to draw in one frame
#[derive(Debug, Default)]
pub struct Draws {
    pub opaque: Vec<DrawSurfaceTask>,
    pub transparent: Vec<DrawSurfaceTask>,
    pub geodata: Vec<DrawGeodataTask>,
    pub infographics: Vec<DrawInfographicTask>,
    pub credits: CreditHits,
}

impl Draws {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.geodata.clear();
        self.infographics.clear();
        self.credits.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty()
            && self.transparent.is_empty()
            && self.geodata.is_empty()
            && self.infographics.is_empty()
    }

    /// Append a node's tasks
    pub fn extend(&mut self, renders: &Renders) {
        self.opaque.extend_from_slice(&renders.opaque);
        self.transparent.extend_from_slice(&renders.transparent);
        self.geodata.extend_from_slice(&renders.geodata);
    }

    /// Nearest opaque tasks first
    pub fn sort_opaque_front_to_back(&mut self, eye: DVec3) {
        self.opaque
            .sort_by(|a, b| a.center.distance_squared(eye).total_cmp(&b.center.distance_squared(eye)));
    }
}
