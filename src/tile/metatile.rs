//! Meta tile payload: per-tile metadata for a square block of tiles

use super::tile_id::TileId;
use serde::{Deserialize, Serialize};

/// Vertical range of a tile's geometry in the node SRS
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeomExtents {
    pub z_min: f64,
    pub z_max: f64,
    /// Representative height for a single-point distance estimate
    pub surrogate: Option<f64>,
}

impl Default for GeomExtents {
    fn default() -> Self {
        Self {
            z_min: f64::INFINITY,
            z_max: f64::NEG_INFINITY,
            surrogate: None,
        }
    }
}

impl GeomExtents {
    pub fn is_empty(&self) -> bool {
        !(self.z_min <= self.z_max)
    }
}

/// Tile extents normalized to the reference frame division extents
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedExtents {
    pub ll: [f64; 3],
    pub ur: [f64; 3],
}

impl NormalizedExtents {
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| !(self.ll[i] < self.ur[i]))
    }
}

/// Metadata of a single tile
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaNode {
    /// Tile has mesh data in this surface
    pub geometry: bool,
    /// Tile belongs to an alien (glued) surface
    pub alien: bool,
    /// Bit per child quadrant with data
    pub child_flags: u8,
    pub apply_texel_size: bool,
    pub apply_display_size: bool,
    /// World size of one texel
    pub texel_size: f64,
    /// Nominal display size in pixels
    pub display_size: u32,
    pub geom_extents: GeomExtents,
    pub extents: Option<NormalizedExtents>,
    /// Numeric credit ids of the data in this tile
    pub credits: Vec<u16>,
}

impl MetaNode {
    pub fn has_child(&self, index: usize) -> bool {
        index < 4 && self.child_flags & (1 << index) != 0
    }

    pub fn set_child(&mut self, index: usize, present: bool) {
        if present {
            self.child_flags |= 1 << index;
        } else {
            self.child_flags &= !(1 << index);
        }
    }
}

/// Block of `2^binary_order` x `2^binary_order` meta nodes at one lod
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTile {
    pub origin: TileId,
    pub binary_order: u32,
    /// Row-major, `y` outer
    pub nodes: Vec<MetaNode>,
}

impl MetaTile {
    /// Tiles per side, `None` when the order cannot describe a block
    pub fn side(&self) -> Option<usize> {
        1usize
            .checked_shl(self.binary_order)
            .filter(|side| side.checked_mul(*side).is_some())
    }

    /// Check the node count against the block shape
    pub fn check_shape(&self) -> Result<(), String> {
        let side = self
            .side()
            .ok_or_else(|| format!("binary order {} is too large", self.binary_order))?;
        if self.nodes.len() != side * side {
            return Err(format!("{} nodes in a {}x{} block", self.nodes.len(), side, side));
        }
        Ok(())
    }

    /// Node for `id`, `None` if it lies outside this block
    pub fn get(&self, id: TileId) -> Option<&MetaNode> {
        if id.lod != self.origin.lod || id.x < self.origin.x || id.y < self.origin.y {
            return None;
        }
        let side = self.side()?;
        let (dx, dy) = ((id.x - self.origin.x) as usize, (id.y - self.origin.y) as usize);
        if dx >= side || dy >= side {
            return None;
        }
        self.nodes.get(dy.checked_mul(side)?.checked_add(dx)?)
    }

    /// Approximate RAM footprint
    pub fn memory_cost(&self) -> usize {
        std::mem::size_of::<Self>() + self.nodes.len() * std::mem::size_of::<MetaNode>()
    }
}
