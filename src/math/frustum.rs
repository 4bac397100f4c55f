//! View frustum for culling

use crate::core::types::{DMat4, DVec3, DVec4};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from view-projection matrix
    ///
    /// Expects a GL style clip space (`-w <= z <= w`). Pass
    /// `view_proj * local_to_world` to get planes in a local frame.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let row0 = vp.row(0);
        let row1 = vp.row(1);
        let row2 = vp.row(2);
        let row3 = vp.row(3);

        Self {
            planes: [
                Self::normalize_plane(row3 + row2), // near
                Self::normalize_plane(row3 - row2), // far
                Self::normalize_plane(row3 + row0), // left
                Self::normalize_plane(row3 - row0), // right
                Self::normalize_plane(row3 - row1), // top
                Self::normalize_plane(row3 + row1), // bottom
            ],
        }
    }

    fn normalize_plane(plane: DVec4) -> Plane {
        let normal = plane.truncate();
        let len = normal.length();
        if len == 0.0 {
            return Plane::new(normal, plane.w);
        }
        Plane {
            normal: normal / len,
            distance: plane.w / len,
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Corner most aligned with the plane normal (p-vertex)
            let p = DVec3::new(
                if plane.normal.x > 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y > 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z > 0.0 { aabb.max.z } else { aabb.min.z },
            );

            // If p-vertex is outside, AABB is completely outside
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
