//! Draw task resolution for traverse nodes

use super::TraverseContext;
use super::draws::{DrawGeodataTask, DrawSurfaceTask, Renders};
use super::layer::{BoundLayerInfo, Layer, LayerKind, SurfaceInfo};
use super::node::NodeId;
use crate::core::types::{DVec3, Vec4};
use crate::streaming::{AvailabilityTest, Resource, ResourceKind, Validity};
use crate::tile::{TileId, UrlVars};
use std::collections::HashMap;
use std::sync::Arc;

enum Resolution {
    /// Some resource is still loading
    Pending,
    /// The surface has nothing here after all
    Absent,
    Ready(Renders),
}

/// Resolve a node's draw tasks
///
/// A node without a surface resolves to no tasks. A mesh that failed to
/// load clears the node's surface, so the tile is treated as empty.
///
/// # Returns
/// `true` once the node's tasks are resolved
pub fn determine_draws(ctx: &mut TraverseContext<'_>, layer: &mut Layer, id: NodeId) -> bool {
    let Some(node) = layer.tree.get(id) else {
        return false;
    };
    if node.determined {
        return true;
    }
    let Some(meta) = node.meta.as_ref() else {
        return false;
    };
    let Some(surface_index) = meta.surface else {
        if let Some(node) = layer.tree.get_mut(id) {
            node.determined = true;
        }
        return true;
    };
    if ctx.statistics.draws_updates as usize >= ctx.options.max_node_draws_updates_per_tick {
        return false;
    }
    ctx.statistics.draws_updates += 1;

    let tile = node.info.id;
    let priority = node.priority;
    let center = meta.center();
    let surface = &layer.surfaces[surface_index];
    let resolution = match layer.kind {
        LayerKind::Geodata => resolve_geodata(ctx, surface, tile, priority),
        LayerKind::Surfaces => {
            resolve_surface(ctx, surface, &layer.bound_layers_by_num, tile, priority, center)
        }
    };

    let Some(node) = layer.tree.get_mut(id) else {
        return false;
    };
    match resolution {
        Resolution::Pending => false,
        Resolution::Absent => {
            log::debug!("Tile {} has no usable data", tile);
            if let Some(meta) = node.meta.as_mut() {
                meta.surface = None;
            }
            node.renders = Renders::default();
            node.determined = true;
            true
        }
        Resolution::Ready(renders) => {
            node.renders = renders;
            node.determined = true;
            true
        }
    }
}

fn resolve_geodata(ctx: &mut TraverseContext<'_>, surface: &SurfaceInfo, tile: TileId, priority: f64) -> Resolution {
    let name = surface.data_url.expand(&UrlVars::new(tile));
    let geodata = ctx.request(&name, ResourceKind::Geodata, priority, None);
    match geodata.validity() {
        Validity::Indeterminate => Resolution::Pending,
        Validity::Invalid => Resolution::Absent,
        Validity::Valid => match geodata.payload() {
            None => Resolution::Pending,
            Some(payload) if payload.as_geodata().is_none() => Resolution::Absent,
            Some(_) => Resolution::Ready(Renders {
                geodata: vec![DrawGeodataTask { geodata, tile }],
                ..Default::default()
            }),
        },
    }
}

/// Keep only the layers from the topmost opaque cover up
///
/// Layers are ordered bottom to top; anything under a watertight, opaque
/// layer can never be seen.
pub(crate) fn visible_bound_layers<T>(mut layers: Vec<(Arc<BoundLayerInfo>, T)>) -> Vec<(Arc<BoundLayerInfo>, T)> {
    if let Some(top_cover) = layers.iter().rposition(|(layer, _)| layer.is_opaque_cover()) {
        layers.drain(..top_cover);
    }
    layers
}

/// Request a texture, `None` unless it is usable now
fn texture(
    ctx: &mut TraverseContext<'_>,
    name: &str,
    priority: f64,
    availability: Option<&AvailabilityTest>,
    pending: &mut bool,
) -> Option<Arc<Resource>> {
    let resource = ctx.request(name, ResourceKind::Texture, priority, availability);
    match resource.validity() {
        Validity::Indeterminate => {
            *pending = true;
            None
        }
        Validity::Invalid => None,
        Validity::Valid => Some(resource),
    }
}

fn resolve_surface(
    ctx: &mut TraverseContext<'_>,
    surface: &SurfaceInfo,
    bound_layers_by_num: &HashMap<u32, Arc<BoundLayerInfo>>,
    tile: TileId,
    priority: f64,
    center: DVec3,
) -> Resolution {
    let vars = UrlVars::new(tile);
    let mesh = ctx.request(&surface.data_url.expand(&vars), ResourceKind::MeshAggregate, priority, None);
    match mesh.validity() {
        Validity::Indeterminate => return Resolution::Pending,
        Validity::Invalid => return Resolution::Absent,
        Validity::Valid => {}
    }
    let Some(payload) = mesh.payload() else {
        return Resolution::Pending;
    };
    let Some(aggregate) = payload.as_mesh_aggregate() else {
        return Resolution::Absent;
    };

    let mut renders = Renders::default();
    let mut pending = false;
    for (index, part) in aggregate.submeshes.iter().enumerate() {
        let sub = index as u32;
        let vars = vars.with_sub(sub);
        let base = DrawSurfaceTask {
            mesh: Arc::clone(&mesh),
            submesh: sub,
            texture_color: None,
            texture_mask: None,
            model: part.model(),
            color: Vec4::ONE,
            external_uv: false,
            flat_shading: false,
            center,
        };
        let mut opaque = Vec::new();
        let mut covered = false;

        if part.external_uv {
            let candidates: Vec<Arc<BoundLayerInfo>> = if surface.bound_layers.is_empty() {
                bound_layers_by_num.get(&part.texture_layer).cloned().into_iter().collect()
            } else {
                surface.bound_layers.clone()
            };
            let mut loaded = Vec::new();
            for layer in candidates {
                let name = layer.url.expand(&vars);
                if let Some(color) = texture(ctx, &name, priority, layer.availability.as_ref(), &mut pending) {
                    loaded.push((layer, color));
                }
            }

            for (layer, color) in visible_bound_layers(loaded) {
                covered |= layer.is_opaque_cover();
                for credit in &layer.credits {
                    if !renders.credits.contains(credit) {
                        renders.credits.push(*credit);
                    }
                }
                let mask = match (&layer.mask_url, layer.watertight) {
                    (Some(url), false) => texture(ctx, &url.expand(&vars), priority, None, &mut pending),
                    _ => None,
                };
                let task = DrawSurfaceTask {
                    texture_color: Some(color),
                    texture_mask: mask,
                    color: Vec4::new(1.0, 1.0, 1.0, layer.alpha),
                    external_uv: true,
                    ..base.clone()
                };
                if layer.transparent || layer.alpha < 1.0 {
                    renders.transparent.push(task);
                } else {
                    opaque.push(task);
                }
            }
        }

        if part.internal_uv && !covered {
            if let Some(url) = &surface.texture_url {
                if let Some(color) = texture(ctx, &url.expand(&vars), priority, None, &mut pending) {
                    opaque.insert(0, DrawSurfaceTask {
                        texture_color: Some(color),
                        ..base.clone()
                    });
                }
            }
        }

        if opaque.is_empty() {
            opaque.push(DrawSurfaceTask {
                flat_shading: true,
                ..base
            });
        }
        renders.opaque.extend(opaque);
    }

    if pending {
        Resolution::Pending
    } else {
        Resolution::Ready(renders)
    }
}
