//! Oriented bounding box in a local tangent frame

use crate::core::types::{DMat4, DVec3};
use super::aabb::Aabb;

/// Oriented bounding box
///
/// Stored as an axis-aligned box in a local frame plus the matrix taking
/// that frame back to world space. Culling multiplies `rot_inv` into the
/// view-projection and tests `local` against the resulting planes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obb {
    /// Local frame to world
    pub rot_inv: DMat4,
    /// Box in the local frame
    pub local: Aabb,
}

impl Obb {
    /// Fit a box around the 8 tile corners
    ///
    /// Corner index bits select x (1), y (2) and z (4) from the lower or
    /// upper bound, so `corners[4] - corners[0]` runs along the vertical
    /// edge and `corners[2] - corners[0]` along the tile's y edge.
    /// Returns `None` when those edges are degenerate or parallel.
    pub fn from_corners(corners: &[DVec3; 8]) -> Option<Self> {
        let center = corners.iter().fold(DVec3::ZERO, |acc, c| acc + *c) / 8.0;
        let f = (corners[4] - corners[0]).normalize_or_zero();
        let u = (corners[2] - corners[0]).normalize_or_zero();
        if f.cross(u).length_squared() < 1e-12 {
            return None;
        }

        let t = DMat4::look_at_rh(center, center + f, u);
        let local_points = corners.map(|c| t.transform_point3(c));
        let local = Aabb::from_points(&local_points)?;

        Some(Self {
            rot_inv: t.inverse(),
            local,
        })
    }

    /// World-space position of a local point
    pub fn to_world(&self, local: DVec3) -> DVec3 {
        self.rot_inv.transform_point3(local)
    }
}
