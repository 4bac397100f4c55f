//! Priority-ordered traversal and subtree clearing

use super::culling::{coarseness_test, compute_priority, visibility_test};
use super::draws::DrawInfographicTask;
use super::layer::Layer;
use super::meta::determine_meta;
use super::node::{NodeId, TraverseTree};
use super::resolve::determine_draws;
use super::TraverseContext;
use crate::core::types::{DMat4, DVec3, Result, Vec4};
use crate::map::TraverseMode;
use crate::math::Aabb;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Subtrees below this lod are checked for clearing in rotation
const CLEARING_ROTATION_LOD: u32 = 3;
const CLEARING_ROTATION_PERIOD: u32 = 64;

/// Scale of surrogate markers relative to the node size
const SURROGATE_MARKER_SCALE: f64 = 0.03;

/// Node waiting to be visited this tick
#[derive(Clone, Copy, Debug)]
struct TraverseQueueItem {
    node: NodeId,
    priority: f64,
    /// Resolve and touch, but never emit draws
    load_only: bool,
}

impl Eq for TraverseQueueItem {}

impl PartialEq for TraverseQueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for TraverseQueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on priority, ties broken by node for a stable order
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for TraverseQueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type TraverseQueue = BinaryHeap<TraverseQueueItem>;

/// Walk a layer's tree for one frame and emit its draws
///
/// Nodes are visited highest priority first, so the per-tick resolution
/// budgets go to the most important tiles.
///
/// # Errors
/// Propagates metadata errors (broken coordinate conversion)
pub fn traverse_render(ctx: &mut TraverseContext<'_>, layer: &mut Layer) -> Result<()> {
    let Some(root) = layer.tree.root() else {
        return Ok(());
    };
    let mut queue = TraverseQueue::new();
    queue.push(TraverseQueueItem {
        node: root,
        priority: f64::INFINITY,
        load_only: false,
    });

    let mode = ctx.options.traverse_mode;
    while let Some(item) = queue.pop() {
        match mode {
            TraverseMode::Hierarchical => visit_hierarchical(ctx, layer, item, &mut queue)?,
            TraverseMode::Flat => visit_flat(ctx, layer, item, &mut queue)?,
        }
    }
    Ok(())
}

/// Work shared by all modes
///
/// # Returns
/// `true` when the node has metadata and draw resolution has been tried
fn visit_common(ctx: &mut TraverseContext<'_>, layer: &mut Layer, id: NodeId) -> Result<bool> {
    let tick = ctx.tick();
    let Some(node) = layer.tree.get_mut(id) else {
        return Ok(false);
    };
    node.last_access_tick = tick;
    let lod = node.lod();
    ctx.statistics.node_traversed(lod);

    touch_draws(ctx, &layer.tree, id);
    if !determine_meta(ctx, layer, id)? {
        return Ok(false);
    }
    determine_draws(ctx, layer, id);
    Ok(true)
}

/// Keep a node's resources alive and loading at its priority
fn touch_draws(ctx: &mut TraverseContext<'_>, tree: &TraverseTree, id: NodeId) {
    let Some(node) = tree.get(id) else {
        return;
    };
    for resource in node.renders.resources() {
        ctx.cache.touch(resource);
        resource.update_priority(node.priority);
    }
}

/// Visibility and coarseness of a node with metadata
fn classify(ctx: &TraverseContext<'_>, layer: &Layer, id: NodeId) -> Option<(bool, bool)> {
    let meta = layer.tree.get(id)?.meta.as_ref()?;
    let target = ctx.options.target_pixel_ratio(layer.is_geodata());
    let visible = visibility_test(ctx.view, meta);
    let fine = visible && coarseness_test(ctx.view, meta, ctx.options.coarseness_disks, target);
    Some((visible, fine))
}

fn visit_hierarchical(
    ctx: &mut TraverseContext<'_>,
    layer: &mut Layer,
    item: TraverseQueueItem,
    queue: &mut TraverseQueue,
) -> Result<()> {
    if !visit_common(ctx, layer, item.node)? {
        return Ok(());
    }
    let Some((visible, fine)) = classify(ctx, layer, item.node) else {
        return Ok(());
    };
    if !visible {
        return Ok(());
    }
    let Some(node) = layer.tree.get(item.node) else {
        return Ok(());
    };
    if fine || node.children.is_empty() {
        if !item.load_only {
            render_node(ctx, layer, item.node);
        }
        return Ok(());
    }

    // Children replace this node only once every visible one can draw
    let children_ready = node.children.iter().all(|&child| {
        let Some(child) = layer.tree.get(child) else {
            return true;
        };
        let Some(meta) = child.meta.as_ref() else {
            return false;
        };
        !visibility_test(ctx.view, meta) || meta.surface.is_none() || child.renders_ready()
    });
    if !children_ready && !item.load_only {
        render_node(ctx, layer, item.node);
    }
    push_children(ctx, layer, item.node, item.load_only || !children_ready, queue);
    Ok(())
}

fn visit_flat(
    ctx: &mut TraverseContext<'_>,
    layer: &mut Layer,
    item: TraverseQueueItem,
    queue: &mut TraverseQueue,
) -> Result<()> {
    if !visit_common(ctx, layer, item.node)? {
        return Ok(());
    }
    let Some((visible, fine)) = classify(ctx, layer, item.node) else {
        return Ok(());
    };
    if !visible {
        return Ok(());
    }
    let leaf = layer.tree.get(item.node).is_none_or(|n| n.children.is_empty());
    if fine || leaf {
        render_node(ctx, layer, item.node);
        return Ok(());
    }
    push_children(ctx, layer, item.node, false, queue);
    Ok(())
}

fn push_children(
    ctx: &TraverseContext<'_>,
    layer: &mut Layer,
    id: NodeId,
    load_only: bool,
    queue: &mut TraverseQueue,
) {
    let Some(node) = layer.tree.get(id) else {
        return;
    };
    let parent_priority = node.priority;
    let children = node.children.clone();
    for child in children {
        let Some(node) = layer.tree.get_mut(child) else {
            continue;
        };
        let priority = node
            .meta
            .as_ref()
            .map_or(parent_priority, |meta| compute_priority(ctx.view, meta));
        node.priority = priority;
        queue.push(TraverseQueueItem {
            node: child,
            priority,
            load_only,
        });
    }
}

/// Emit a node's draw tasks if all of them can be drawn
fn render_node(ctx: &mut TraverseContext<'_>, layer: &mut Layer, id: NodeId) {
    let tick = ctx.tick();
    let Some(node) = layer.tree.get_mut(id) else {
        return;
    };
    node.last_render_tick = tick;
    if !node.renders_ready() || node.renders.is_empty() {
        return;
    }
    let lod = node.lod();
    ctx.statistics.node_rendered(lod);
    ctx.draws.extend(&node.renders);
    let meta_credits = node.meta.iter().flat_map(|m| &m.credits);
    for credit in meta_credits.chain(&node.renders.credits) {
        ctx.draws.credits.hit(*credit, lod);
    }

    if !ctx.options.debug_render_surrogates {
        return;
    }
    let Some(meta) = node.meta.as_ref() else {
        return;
    };
    if let Some(surrogate) = meta.surrogate {
        let size = Aabb::from_points(&meta.corners).map_or(0.0, |b| b.size().length());
        let model = DMat4::from_translation(surrogate)
            * DMat4::from_scale(DVec3::splat(size * SURROGATE_MARKER_SCALE));
        ctx.draws.infographics.push(DrawInfographicTask {
            model,
            color: Vec4::new(1.0, 0.0, 1.0, 1.0),
        });
    }
}

/// Drop subtrees nobody visited within the grace period
///
/// Deep subtrees are only examined once every 64 ticks, staggered by the
/// position of their lod-3 ancestor.
pub fn traverse_clearing(tree: &mut TraverseTree, tick: u32, grace_ticks: u32) {
    let Some(root) = tree.root() else {
        return;
    };
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        let tile = node.info.id;
        if tile.lod == CLEARING_ROTATION_LOD
            && (tile.y.wrapping_mul(8).wrapping_add(tile.x)) % CLEARING_ROTATION_PERIOD
                != tick % CLEARING_ROTATION_PERIOD
        {
            continue;
        }
        if node.last_access_tick.saturating_add(grace_ticks) < tick {
            log::trace!("Clearing subtree of {}", tile);
            tree.clear_node(id);
            continue;
        }
        stack.extend(node.children.iter().copied());
    }
}
