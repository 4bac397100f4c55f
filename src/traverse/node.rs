//! Persistent quadtree of visited nodes
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A node
//! owns its children: removing a node removes its whole subtree and frees
//! the slots for reuse.

use super::draws::Renders;
use crate::core::types::DVec3;
use crate::math::{Aabb, BoundingDisk, Obb};
use crate::tile::{Extents2, NodeInfo};

/// Index of a node in a [`TraverseTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// View-independent data resolved from meta tiles
#[derive(Clone, Debug, PartialEq)]
pub struct NodeMeta {
    /// Physical corners, index bits select x (1), y (2) and height (4)
    pub corners: [DVec3; 8],
    pub aabb: Aabb,
    /// Tighter box for deep nodes
    pub obb: Option<Obb>,
    pub disk: Option<BoundingDisk>,
    pub surrogate: Option<DVec3>,
    /// World size of one texel, infinite when unknown
    pub texel_size: f64,
    /// Extents in the node SRS
    pub extents: Extents2,
    /// Union of child availability over all surfaces
    pub child_flags: u8,
    /// Child availability per surface of the layer
    pub surface_child_flags: Vec<u8>,
    /// Topmost surface with geometry here
    pub surface: Option<usize>,
    /// Credits of the topmost surface's tile
    pub credits: Vec<u16>,
}

impl NodeMeta {
    pub fn has_child(&self, index: usize) -> bool {
        index < 4 && self.child_flags & (1 << index) != 0
    }

    /// Mean of the corners
    pub fn center(&self) -> DVec3 {
        self.corners.iter().fold(DVec3::ZERO, |acc, c| acc + *c) / 8.0
    }

    pub fn is_finite(&self) -> bool {
        self.corners.iter().all(|c| c.is_finite()) && self.aabb.is_finite()
    }
}

/// One visited quadtree cell
#[derive(Debug)]
pub struct TraverseNode {
    pub info: NodeInfo,
    pub parent: Option<NodeId>,
    pub priority: f64,
    pub last_access_tick: u32,
    pub last_render_tick: u32,
    /// `None` until metadata resolves
    pub meta: Option<NodeMeta>,
    pub renders: Renders,
    /// Draw tasks are resolved (possibly to nothing)
    pub determined: bool,
    /// Only children known to have data
    pub children: Vec<NodeId>,
}

impl TraverseNode {
    pub fn new(info: NodeInfo, parent: Option<NodeId>, priority: f64) -> Self {
        Self {
            info,
            parent,
            priority,
            last_access_tick: 0,
            last_render_tick: 0,
            meta: None,
            renders: Renders::default(),
            determined: false,
            children: Vec::new(),
        }
    }

    pub fn lod(&self) -> u32 {
        self.info.id.lod
    }

    /// Draws are resolved and every resource they use is ready
    pub fn renders_ready(&self) -> bool {
        self.determined && self.renders.ready()
    }
}

/// Arena of traverse nodes with a single root
#[derive(Debug, Default)]
pub struct TraverseTree {
    slots: Vec<Option<TraverseNode>>,
    free: Vec<u32>,
    root: Option<NodeId>,
}

impl TraverseTree {
    pub fn new(root: NodeInfo) -> Self {
        let mut tree = Self::default();
        let id = tree.insert(TraverseNode::new(root, None, f64::INFINITY));
        tree.root = Some(id);
        tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&TraverseNode> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TraverseNode> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, node: TraverseNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() as u32 - 1)
            }
        }
    }

    /// Create a child of `parent` in quadrant `index`
    pub fn add_child(&mut self, parent: NodeId, index: usize) -> Option<NodeId> {
        let (info, priority) = {
            let p = self.get(parent)?;
            (p.info.child(index), p.priority)
        };
        let id = self.insert(TraverseNode::new(info, Some(parent), priority));
        self.get_mut(parent)?.children.push(id);
        Some(id)
    }

    /// Drop a node's children, metadata and draws, keeping the node itself
    pub fn clear_node(&mut self, id: NodeId) {
        let Some(node) = self.get_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        node.meta = None;
        node.renders = Renders::default();
        node.determined = false;
        for child in children {
            self.remove_subtree(child);
        }
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.slots.get_mut(current.index()).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(current.0);
            }
        }
    }

    /// Reset to a bare root
    pub fn reset(&mut self) {
        if let Some(root) = self.root {
            self.clear_node(root);
        }
    }

    /// Live nodes in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TraverseNode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (NodeId(i as u32), node)))
    }
}
