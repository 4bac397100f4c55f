//! Camera for view-dependent traversal

use crate::core::types::{DMat4, DVec3};
use crate::math::Frustum;

/// Camera with eye, target and projection parameters
///
/// All values are in the physical (world) coordinate system of the map.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Eye position
    pub eye: DVec3,
    /// Point the camera looks at
    pub target: DVec3,
    /// Up direction hint
    pub up: DVec3,
    /// Vertical field of view in radians
    pub fov_y: f64,
    /// Near clip plane
    pub near: f64,
    /// Far clip plane
    pub far: f64,
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
}

impl Camera {
    /// Create camera looking at a target
    pub fn look_at(eye: DVec3, target: DVec3, up: DVec3) -> Self {
        Self {
            eye,
            target,
            up,
            fov_y: 45.0_f64.to_radians(),
            near: 1.0,
            far: 1.0e10,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }

    /// Aspect ratio (width / height), 1 for an empty viewport
    pub fn aspect(&self) -> f64 {
        if self.viewport_height == 0 {
            return 1.0;
        }
        self.viewport_width as f64 / self.viewport_height as f64
    }

    /// Update viewport size (call on window resize)
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
    }

    /// Whether there is anything to render into
    pub fn has_viewport(&self) -> bool {
        self.viewport_width > 0 && self.viewport_height > 0
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Get projection matrix (camera to clip space, GL depth range)
    pub fn projection_matrix(&self) -> DMat4 {
        DMat4::perspective_rh_gl(self.fov_y, self.aspect(), self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> DMat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get normalized viewing direction
    pub fn forward(&self) -> DVec3 {
        (self.target - self.eye).normalize_or_zero()
    }
}

/// Per-frame values derived from a [`Camera`]
///
/// Built once at the start of traversal so every node visit in a frame
/// sees the same matrices.
#[derive(Clone, Debug)]
pub struct CameraView {
    pub eye: DVec3,
    pub forward: DVec3,
    /// View-projection used for coarseness projection
    pub view_proj: DMat4,
    /// View-projection used for culling (may be pulled back)
    pub view_proj_culling: DMat4,
    /// Culling planes extracted from `view_proj_culling`
    pub frustum: Frustum,
    /// Unit vector perpendicular to the view direction, in the up plane
    pub perpendicular_unit: DVec3,
    pub window_height: f64,
    /// Distance at which one world unit covers one pixel vertically
    pub disk_nominal_distance: f64,
}

impl CameraView {
    /// Derive per-frame view data
    ///
    /// # Arguments
    /// * `camera` - Camera for this frame
    /// * `culling_offset_distance` - Pulls the culling frustum back along
    ///   the view direction, so tiles just behind the eye survive culling
    pub fn new(camera: &Camera, culling_offset_distance: f64) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix();
        let view_proj = proj * view;
        let view_proj_culling = if culling_offset_distance != 0.0 {
            proj * DMat4::from_translation(DVec3::new(0.0, 0.0, -culling_offset_distance)) * view
        } else {
            view_proj
        };

        let forward = camera.forward();
        let perpendicular_unit = camera.up.cross(forward).cross(forward).normalize_or_zero();
        let window_height = camera.viewport_height as f64;

        Self {
            eye: camera.eye,
            forward,
            view_proj,
            view_proj_culling,
            frustum: Frustum::from_view_projection(&view_proj_culling),
            perpendicular_unit,
            window_height,
            disk_nominal_distance: window_height * proj.y_axis.y * 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::look_at(DVec3::new(0.0, 0.0, 100.0), DVec3::ZERO, DVec3::Y)
    }

    #[test]
    fn test_target_projects_to_center() {
        let camera = test_camera();
        let clip = camera.view_projection() * DVec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-9);
        assert!(ndc.y.abs() < 1e-9);
    }

    #[test]
    fn test_perpendicular_is_orthogonal_to_forward() {
        let view = CameraView::new(&test_camera(), 0.0);
        assert!(view.perpendicular_unit.dot(view.forward).abs() < 1e-12);
        assert!((view.perpendicular_unit.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_culling_offset_keeps_points_behind_eye() {
        let camera = test_camera();
        let behind = DVec3::new(0.0, 0.0, 110.0);
        let plain = CameraView::new(&camera, 0.0);
        let pulled = CameraView::new(&camera, 50.0);
        assert!(!plain.frustum.contains_point(behind));
        assert!(pulled.frustum.contains_point(behind));
    }

    #[test]
    fn test_empty_viewport() {
        let mut camera = test_camera();
        camera.set_viewport(0, 0);
        assert!(!camera.has_viewport());
        assert_eq!(camera.aspect(), 1.0);
    }
}
