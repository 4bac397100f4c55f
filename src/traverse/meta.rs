//! Metadata resolution for traverse nodes

use super::layer::Layer;
use super::node::{NodeId, NodeMeta};
use super::TraverseContext;
use crate::core::Error;
use crate::core::types::{DVec3, Result};
use crate::math::{Aabb, BoundingDisk, Obb};
use crate::streaming::{ResourceKind, Validity};
use crate::tile::{MetaNode, NodeInfo, UrlVars};

/// Nodes this deep get an oriented box
const OBB_MIN_LOD: u32 = 5;
/// Nodes this shallow use the whole division box
const DIVISION_AABB_MAX_LOD: u32 = 2;

/// Resolve a node's metadata from the meta tiles of every surface
///
/// Surfaces the parent reported as absent in this quadrant are not asked.
/// Surfaces whose meta tile failed count as absent.
///
/// # Returns
/// `Ok(true)` once the node has metadata, `Ok(false)` while meta tiles are
/// still loading or this tick's resolution budget is spent
///
/// # Errors
/// `Error::Configuration` when the convertor fails or produces
/// non-finite corners
pub fn determine_meta(ctx: &mut TraverseContext<'_>, layer: &mut Layer, id: NodeId) -> Result<bool> {
    let Some(node) = layer.tree.get(id) else {
        return Ok(false);
    };
    if node.meta.is_some() {
        return Ok(true);
    }
    if ctx.statistics.meta_updates as usize >= ctx.options.max_node_meta_updates_per_tick {
        return Ok(false);
    }
    ctx.statistics.meta_updates += 1;

    let tile = node.info.id;
    let priority = node.priority;
    let parent_flags = node
        .parent
        .and_then(|p| layer.tree.get(p))
        .and_then(|p| p.meta.as_ref())
        .map(|m| m.surface_child_flags.clone());
    let quadrant = 1u8 << tile.child_index();

    let vars = UrlVars::new(tile.round_down(ctx.reference_frame.meta_binary_order));
    let mut nodes: Vec<Option<MetaNode>> = vec![None; layer.surfaces.len()];
    let mut pending = false;
    for (i, surface) in layer.surfaces.iter().enumerate() {
        let candidate = parent_flags
            .as_ref()
            .is_none_or(|flags| flags.get(i).is_some_and(|f| f & quadrant != 0));
        if !candidate {
            continue;
        }

        let resource = ctx.request(
            &surface.meta_url.expand(&vars),
            ResourceKind::MetaTile,
            priority,
            surface.meta_availability.as_ref(),
        );
        match resource.validity() {
            Validity::Indeterminate => pending = true,
            Validity::Invalid => {}
            Validity::Valid => {
                nodes[i] = resource
                    .payload()
                    .and_then(|p| p.as_meta_tile().and_then(|t| t.get(tile).cloned()));
            }
        }
    }
    if pending {
        return Ok(false);
    }

    let surface = nodes.iter().enumerate().position(|(i, n)| {
        n.as_ref().is_some_and(|n| n.geometry && n.alien == layer.surfaces[i].alien)
    });
    let reference = surface
        .and_then(|i| nodes[i].as_ref())
        .or_else(|| nodes.iter().flatten().next());

    let info = node.info.clone();
    let mut meta = build_meta(ctx, &info, reference)?;
    meta.surface = surface;
    meta.credits = surface
        .and_then(|i| nodes[i].as_ref())
        .map(|n| n.credits.clone())
        .unwrap_or_default();
    meta.child_flags = nodes.iter().flatten().fold(0, |acc, n| acc | (n.child_flags & 0x0f));
    meta.surface_child_flags = nodes.iter().map(|n| n.as_ref().map_or(0, |n| n.child_flags)).collect();

    let child_flags = meta.child_flags;
    if let Some(node) = layer.tree.get_mut(id) {
        node.meta = Some(meta);
    }
    for index in 0..4 {
        if child_flags & (1 << index) != 0 {
            layer.tree.add_child(id, index);
        }
    }
    log::trace!("Resolved meta of {} (children {:04b})", tile, child_flags);
    Ok(true)
}

fn build_meta(ctx: &TraverseContext<'_>, info: &NodeInfo, reference: Option<&MetaNode>) -> Result<NodeMeta> {
    let frame = ctx.reference_frame;
    let division = frame.division_aabb();
    let geom = reference.map(|n| n.geom_extents).filter(|g| !g.is_empty());
    let normalized = reference.and_then(|n| n.extents).filter(|e| !e.is_empty());

    let mut corners = [DVec3::ZERO; 8];
    match (geom, normalized) {
        (None, Some(norm)) => {
            for (i, corner) in corners.iter_mut().enumerate() {
                let t = DVec3::new(
                    if i & 1 != 0 { norm.ur[0] } else { norm.ll[0] },
                    if i & 2 != 0 { norm.ur[1] } else { norm.ll[1] },
                    if i & 4 != 0 { norm.ur[2] } else { norm.ll[2] },
                );
                *corner = division.min + t * division.size();
            }
        }
        _ => {
            let (z_min, z_max) = geom.map_or((0.0, 0.0), |g| (g.z_min, g.z_max));
            let (ll, ur) = (info.extents.ll, info.extents.ur);
            for (i, corner) in corners.iter_mut().enumerate() {
                let p = DVec3::new(
                    if i & 1 != 0 { ur.x } else { ll.x },
                    if i & 2 != 0 { ur.y } else { ll.y },
                    if i & 4 != 0 { z_max } else { z_min },
                );
                *corner = ctx.convertor.convert(p, &info.srs, &frame.physical_srs)?;
            }
        }
    }
    if corners.iter().any(|c| !c.is_finite()) {
        return Err(Error::Configuration(format!(
            "non-finite corners for tile {} converting '{}' to '{}'",
            info.id, info.srs, frame.physical_srs
        )));
    }

    let tight = Aabb::from_points(&corners).unwrap_or(division);
    let lod = info.id.lod;
    let aabb = if lod <= DIVISION_AABB_MAX_LOD { division } else { tight };
    let obb = if lod >= OBB_MIN_LOD { Obb::from_corners(&corners) } else { None };
    let disk = if ctx.options.coarseness_disks { BoundingDisk::from_corners(&corners) } else { None };

    let surrogate = match reference.and_then(|n| n.geom_extents.surrogate) {
        Some(z) => {
            let c = info.extents.center();
            Some(ctx.convertor.convert(DVec3::new(c.x, c.y, z), &info.srs, &frame.physical_srs)?)
        }
        None => None,
    };

    let texel_size = match reference {
        Some(n) if n.apply_texel_size && n.texel_size > 0.0 => n.texel_size,
        Some(n) if n.apply_display_size && n.display_size > 0 => {
            tight.size().max_element() / n.display_size as f64
        }
        _ => f64::INFINITY,
    };

    Ok(NodeMeta {
        corners,
        aabb,
        obb,
        disk,
        surrogate: surrogate.filter(|s| s.is_finite()),
        texel_size: if texel_size.is_nan() { f64::INFINITY } else { texel_size },
        extents: info.extents,
        child_flags: 0,
        surface_child_flags: Vec::new(),
        surface: None,
        credits: Vec::new(),
    })
}
