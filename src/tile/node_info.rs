//! Spatial placement of quadtree nodes

use crate::core::types::DVec2;
use super::tile_id::TileId;
use std::sync::Arc;

/// Rectangle in a node SRS
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extents2 {
    pub ll: DVec2,
    pub ur: DVec2,
}

impl Extents2 {
    pub fn new(ll: DVec2, ur: DVec2) -> Self {
        Self { ll, ur }
    }

    pub fn center(&self) -> DVec2 {
        (self.ll + self.ur) * 0.5
    }

    pub fn size(&self) -> DVec2 {
        self.ur - self.ll
    }

    /// Quadrant `index` of this rectangle, y index counted from the top
    pub fn quadrant(&self, index: usize) -> Extents2 {
        let mid = self.center();
        let (x0, x1) = if index & 1 == 0 { (self.ll.x, mid.x) } else { (mid.x, self.ur.x) };
        let (y0, y1) = if index & 2 == 0 { (mid.y, self.ur.y) } else { (self.ll.y, mid.y) };
        Extents2::new(DVec2::new(x0, y0), DVec2::new(x1, y1))
    }
}

/// Tile id plus its extents in the node SRS
#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: TileId,
    pub extents: Extents2,
    pub srs: Arc<str>,
}

impl NodeInfo {
    pub fn root(extents: Extents2, srs: Arc<str>) -> Self {
        Self {
            id: TileId::ROOT,
            extents,
            srs,
        }
    }

    pub fn child(&self, index: usize) -> NodeInfo {
        NodeInfo {
            id: self.id.child(index),
            extents: self.extents.quadrant(index),
            srs: Arc::clone(&self.srs),
        }
    }

    /// Depth in the tree
    pub fn lod(&self) -> u32 {
        self.id.lod
    }
}
