//! Per-tick and cumulative engine statistics

use crate::core::types::Result;
use crate::streaming::CacheStatistics;
use serde::{Deserialize, Serialize};

/// Deeper levels share the last slot
pub const MAX_LODS: usize = 22;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStatistics {
    pub render_ticks: u32,
    #[serde(flatten)]
    pub resources: CacheStatistics,
    /// Nodes in all traverse trees
    pub current_nodes: u32,

    // Reset every tick
    pub meta_updates: u32,
    pub draws_updates: u32,
    pub nodes_traversed_total: u32,
    pub nodes_rendered_total: u32,
    pub nodes_traversed_per_lod: [u32; MAX_LODS],
    pub nodes_rendered_per_lod: [u32; MAX_LODS],
}

impl MapStatistics {
    /// Clear the per-tick counters
    pub fn reset_frame(&mut self) {
        self.meta_updates = 0;
        self.draws_updates = 0;
        self.nodes_traversed_total = 0;
        self.nodes_rendered_total = 0;
        self.nodes_traversed_per_lod = [0; MAX_LODS];
        self.nodes_rendered_per_lod = [0; MAX_LODS];
    }

    fn lod_slot(lod: u32) -> usize {
        (lod as usize).min(MAX_LODS - 1)
    }

    pub fn node_traversed(&mut self, lod: u32) {
        self.nodes_traversed_total += 1;
        self.nodes_traversed_per_lod[Self::lod_slot(lod)] += 1;
    }

    pub fn node_rendered(&mut self, lod: u32) {
        self.nodes_rendered_total += 1;
        self.nodes_rendered_per_lod[Self::lod_slot(lod)] += 1;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_lods_share_last_slot() {
        let mut stats = MapStatistics::default();
        stats.node_rendered(3);
        stats.node_rendered(40);
        assert_eq!(stats.nodes_rendered_per_lod[3], 1);
        assert_eq!(stats.nodes_rendered_per_lod[MAX_LODS - 1], 1);
        assert_eq!(stats.nodes_rendered_total, 2);
    }

    #[test]
    fn test_reset_keeps_cumulative_counters() {
        let mut stats = MapStatistics::default();
        stats.render_ticks = 7;
        stats.resources.resources_created = 3;
        stats.node_traversed(0);
        stats.meta_updates = 2;
        stats.reset_frame();
        assert_eq!(stats.render_ticks, 7);
        assert_eq!(stats.resources.resources_created, 3);
        assert_eq!(stats.nodes_traversed_total, 0);
        assert_eq!(stats.meta_updates, 0);
    }

    #[test]
    fn test_json_is_flat() {
        let mut stats = MapStatistics::default();
        stats.resources.resources_downloaded = 5;
        let value: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(value["resourcesDownloaded"], 5);
        assert_eq!(value["nodesRenderedPerLod"].as_array().unwrap().len(), MAX_LODS);
    }
}
