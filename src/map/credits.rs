//! Attribution for the data drawn in a frame

use super::config::MapConfig;
use crate::traverse::CreditHits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Credit of one frame, with how much of it was drawn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credit {
    pub id: u16,
    pub name: String,
    pub notice: String,
    /// Rendered nodes carrying this credit
    pub hits: u32,
    pub max_lod: u32,
}

/// Credits declared by a map configuration, by numeric id
#[derive(Clone, Debug, Default)]
pub struct MapCredits {
    by_id: HashMap<u16, (String, String)>,
}

impl MapCredits {
    pub fn from_config(config: &MapConfig) -> Self {
        let by_id = config
            .credits
            .iter()
            .map(|(name, credit)| (credit.id, (name.clone(), credit.notice.clone())))
            .collect();
        Self { by_id }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Credits of a frame, most drawn first
    ///
    /// Ids the configuration does not declare are left out.
    pub fn resolve(&self, hits: &CreditHits) -> Vec<Credit> {
        let mut credits: Vec<Credit> = hits
            .iter()
            .filter_map(|(id, hit)| {
                let Some((name, notice)) = self.by_id.get(&id) else {
                    log::trace!("Drawn credit {} is not declared", id);
                    return None;
                };
                Some(Credit {
                    id,
                    name: name.clone(),
                    notice: notice.clone(),
                    hits: hit.count,
                    max_lod: hit.max_lod,
                })
            })
            .collect();
        credits.sort_by(|a, b| b.hits.cmp(&a.hits).then(a.id.cmp(&b.id)));
        credits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, ORTHO_CREDIT, TERRAIN_CREDIT};

    #[test]
    fn test_resolve_orders_by_hits() {
        let credits = MapCredits::from_config(&testing::flat_map_config());
        assert_eq!(credits.len(), 2);

        let mut hits = CreditHits::default();
        hits.hit(TERRAIN_CREDIT, 1);
        hits.hit(ORTHO_CREDIT, 2);
        hits.hit(ORTHO_CREDIT, 1);
        let resolved = credits.resolve(&hits);
        let names: Vec<&str> = resolved.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ortho-provider", "terrain-provider"]);
        assert_eq!(resolved[0].hits, 2);
        assert_eq!(resolved[0].max_lod, 2);
        assert_eq!(resolved[1].notice, "Terrain by Height Inc.");
    }

    #[test]
    fn test_ties_order_by_id() {
        let credits = MapCredits::from_config(&testing::flat_map_config());
        let mut hits = CreditHits::default();
        hits.hit(ORTHO_CREDIT, 0);
        hits.hit(TERRAIN_CREDIT, 0);
        let ids: Vec<u16> = credits.resolve(&hits).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![TERRAIN_CREDIT, ORTHO_CREDIT]);
    }

    #[test]
    fn test_undeclared_ids_are_dropped() {
        let credits = MapCredits::default();
        assert!(credits.is_empty());
        let mut hits = CreditHits::default();
        hits.hit(99, 4);
        assert!(credits.resolve(&hits).is_empty());
    }
}
