//! Per-frame quadtree traversal
//!
//! Each layer owns a [`TraverseTree`]. Every tick the scheduler walks it in
//! priority order, resolves metadata and draw tasks for newly reached
//! nodes, and emits draws for the nodes chosen to render.

pub mod node;
pub mod layer;
pub mod draws;
pub mod culling;
pub mod meta;
pub mod resolve;
pub mod scheduler;

pub use node::{NodeId, NodeMeta, TraverseNode, TraverseTree};
pub use layer::{BoundLayerInfo, Layer, LayerKind, SurfaceInfo};
pub use draws::{CreditHit, CreditHits, DrawGeodataTask, DrawInfographicTask, DrawSurfaceTask, Draws, Renders};
pub use culling::{coarseness_test, coarseness_value, compute_priority, visibility_test};
pub use meta::determine_meta;
pub use resolve::determine_draws;
pub use scheduler::{traverse_clearing, traverse_render};

use crate::core::CameraView;
use crate::map::config::ReferenceFrame;
use crate::map::{MapOptions, MapStatistics};
use crate::math::CoordinateConvertor;
use crate::streaming::{AvailabilityTest, Resource, ResourceCache, ResourceKind};
use std::sync::Arc;

/// Everything a traversal borrows from the map for one tick
pub struct TraverseContext<'a> {
    pub cache: &'a mut ResourceCache,
    pub options: &'a MapOptions,
    pub view: &'a CameraView,
    pub convertor: &'a dyn CoordinateConvertor,
    pub reference_frame: &'a ReferenceFrame,
    pub draws: &'a mut Draws,
    pub statistics: &'a mut MapStatistics,
}

impl TraverseContext<'_> {
    pub fn tick(&self) -> u32 {
        self.cache.tick()
    }

    /// Get and touch a resource on behalf of a node
    pub(crate) fn request(
        &mut self,
        name: &str,
        kind: ResourceKind,
        priority: f64,
        availability: Option<&AvailabilityTest>,
    ) -> Arc<Resource> {
        let resource = self.cache.get(name, kind);
        resource.update_priority(priority);
        if let Some(test) = availability {
            resource.set_availability(test);
        }
        resource
    }
}
