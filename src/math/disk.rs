//! Bounding disk approximation for curved tiles

use crate::core::types::{DVec2, DVec3};

/// Spherical cap slab bounding a tile on a body centred at the origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingDisk {
    /// Unit direction of the cap axis
    pub normal: DVec3,
    /// Minimum and maximum distance from the body centre
    pub heights: DVec2,
    /// Angle between the axis and the cap edge, radians
    pub half_angle: f64,
}

impl BoundingDisk {
    /// Bound the given corners, `None` if they sit at the origin
    pub fn from_corners(corners: &[DVec3; 8]) -> Option<Self> {
        let normal = corners
            .iter()
            .fold(DVec3::ZERO, |acc, c| acc + c.normalize_or_zero())
            .normalize_or_zero();
        if normal == DVec3::ZERO {
            return None;
        }

        let mut heights = DVec2::new(f64::INFINITY, f64::NEG_INFINITY);
        let mut half_angle: f64 = 0.0;
        for c in corners {
            let l = c.length();
            heights.x = heights.x.min(l);
            heights.y = heights.y.max(l);
            if l > 0.0 {
                let cos = normal.dot(*c / l).clamp(-1.0, 1.0);
                half_angle = half_angle.max(cos.acos());
            }
        }

        Some(Self { normal, heights, half_angle })
    }

    /// Distance from a point to the slab, 0 inside
    pub fn distance_to(&self, point: DVec3) -> f64 {
        let l = point.length();
        if l == 0.0 {
            return self.heights.x;
        }
        let angle = self.normal.dot(point / l).clamp(-1.0, 1.0).acos();
        let vertical = if l > self.heights.y {
            l - self.heights.y
        } else if l < self.heights.x {
            self.heights.x - l
        } else {
            0.0
        };
        let horizontal = (angle - self.half_angle).max(0.0) * l;
        (vertical * vertical + horizontal * horizontal).sqrt()
    }
}
