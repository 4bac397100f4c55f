//! Quadtree tile coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quadtree coordinate of a tile
///
/// Children of `(lod, x, y)` are `(lod + 1, 2x + {0,1}, 2y + {0,1})`.
/// `y` counts from the top edge of the reference frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub lod: u32,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub const ROOT: TileId = TileId { lod: 0, x: 0, y: 0 };

    pub fn new(lod: u32, x: u32, y: u32) -> Self {
        Self { lod, x, y }
    }

    /// Child in quadrant `index` (bit 0 = x, bit 1 = y)
    pub fn child(self, index: usize) -> TileId {
        TileId {
            lod: self.lod + 1,
            x: self.x * 2 + (index as u32 & 1),
            y: self.y * 2 + ((index as u32 >> 1) & 1),
        }
    }

    /// All four children in quadrant order
    pub fn children(self) -> [TileId; 4] {
        std::array::from_fn(|i| self.child(i))
    }

    pub fn parent(self) -> Option<TileId> {
        if self.lod == 0 {
            return None;
        }
        Some(TileId {
            lod: self.lod - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Quadrant of this tile within its parent
    pub fn child_index(self) -> usize {
        ((self.x % 2) + (self.y % 2) * 2) as usize
    }

    /// Origin of the `2^binary_order` square block containing this tile
    pub fn round_down(self, binary_order: u32) -> TileId {
        let order = binary_order.min(31);
        TileId {
            lod: self.lod,
            x: (self.x >> order) << order,
            y: (self.y >> order) << order,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.lod, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_and_parent() {
        let tile = TileId::new(5, 10, 11);
        for (i, child) in tile.children().iter().enumerate() {
            assert_eq!(child.lod, 6);
            assert_eq!(child.parent(), Some(tile));
            assert_eq!(child.child_index(), i);
        }
        assert_eq!(TileId::ROOT.parent(), None);
    }

    #[test]
    fn test_round_down() {
        assert_eq!(TileId::new(5, 10, 13).round_down(2), TileId::new(5, 8, 12));
        assert_eq!(TileId::new(5, 10, 13).round_down(0), TileId::new(5, 10, 13));
    }

    #[test]
    fn test_display() {
        assert_eq!(TileId::new(3, 1, 2).to_string(), "3-1-2");
    }
}
