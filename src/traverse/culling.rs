//! Visibility, coarseness and priority of traverse nodes
//!
//! Pure functions of node metadata and the frame's view.

use super::node::NodeMeta;
use crate::core::CameraView;
use crate::core::types::{DVec3, DVec4};
use crate::math::Frustum;

/// Frustum test against the node's boxes
///
/// The AABB is tested first; when an OBB exists it is tested again in its
/// own frame, which rejects tiles the axis-aligned box still overlaps.
pub fn visibility_test(view: &CameraView, meta: &NodeMeta) -> bool {
    if !view.frustum.intersects_aabb(&meta.aabb) {
        return false;
    }
    if let Some(obb) = &meta.obb {
        let planes = Frustum::from_view_projection(&(view.view_proj_culling * obb.rot_inv));
        if !planes.intersects_aabb(&obb.local) {
            return false;
        }
    }
    true
}

fn project_y(view: &CameraView, point: DVec3) -> f64 {
    let clip = view.view_proj * DVec4::new(point.x, point.y, point.z, 1.0);
    clip.y / clip.w
}

/// Screen pixels covered by one texel of the node
///
/// Corner mode projects a texel-long segment, perpendicular to the view
/// direction, at each of the 8 corners and keeps the largest. Disk mode
/// scales the texel size by the eye's distance to the bounding disk.
pub fn coarseness_value(view: &CameraView, meta: &NodeMeta, use_disks: bool) -> f64 {
    if meta.texel_size == f64::INFINITY {
        return f64::INFINITY;
    }

    if use_disks {
        if let Some(disk) = &meta.disk {
            let distance = disk.distance_to(view.eye);
            if distance <= 0.0 {
                return f64::INFINITY;
            }
            return meta.texel_size * view.disk_nominal_distance / distance;
        }
    }

    let up = view.perpendicular_unit * meta.texel_size;
    let mut result: f64 = 0.0;
    for c in &meta.corners {
        let c1 = *c - up * 0.5;
        let c2 = c1 + up;
        let len = (project_y(view, c2) - project_y(view, c1)).abs();
        result = result.max(len);
    }
    result * view.window_height * 0.5
}

/// Fine enough to render as is
pub fn coarseness_test(view: &CameraView, meta: &NodeMeta, use_disks: bool, target_pixel_ratio: f64) -> bool {
    coarseness_value(view, meta, use_disks) < target_pixel_ratio
}

/// Scheduling priority of a node: larger and nearer first
pub fn compute_priority(view: &CameraView, meta: &NodeMeta) -> f64 {
    let size = meta.aabb.size().length();
    let distance = view.eye.distance(meta.aabb.center());
    size / (distance + 1.0)
}
