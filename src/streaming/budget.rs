//! Memory budget management for streaming
//!
//! Tracks RAM and GPU memory held by cached resources against one combined
//! budget and plans which resources to release when over it.

use super::resource::ResourceState;

/// Memory budget manager
///
/// Recomputed from scratch by the cache every tick, then consulted to
/// plan eviction.
#[derive(Clone, Debug)]
pub struct MemoryBudget {
    /// Maximum combined RAM + GPU memory (bytes)
    budget_bytes: usize,
    /// Currently used RAM (bytes)
    ram_used_bytes: usize,
    /// Currently used GPU memory (bytes)
    gpu_used_bytes: usize,
}

/// Resource eligible for eviction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub name: String,
    pub last_access_tick: u32,
    /// Combined RAM + GPU bytes
    pub cost: usize,
    /// Already marked in an earlier pass
    pub finalizing: bool,
}

/// What to do with one candidate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvictionStep {
    /// First encounter: mark `Finalizing`, freeing happens next pass
    Finalize(String),
    /// Second encounter: remove from the cache
    Erase(String),
}

/// Whether a resource may be considered for eviction at all
///
/// # Arguments
/// * `last_access_tick` - Tick the resource was last touched
/// * `tick` - Current tick
/// * `grace_ticks` - Resources touched within this many ticks are kept
/// * `externally_referenced` - Something besides the cache holds it
/// * `state` - Current lifecycle state
pub fn is_eviction_candidate(
    last_access_tick: u32,
    tick: u32,
    grace_ticks: u32,
    externally_referenced: bool,
    state: ResourceState,
) -> bool {
    last_access_tick.saturating_add(grace_ticks) < tick
        && !externally_referenced
        && state != ResourceState::Downloading
}

impl MemoryBudget {
    /// Create a new memory budget
    ///
    /// # Arguments
    /// * `budget_bytes` - Maximum combined RAM + GPU memory in bytes
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            ram_used_bytes: 0,
            gpu_used_bytes: 0,
        }
    }

    /// Create a new memory budget from megabytes
    pub fn from_megabytes(budget_mb: usize) -> Self {
        Self::new(budget_mb.saturating_mul(1024 * 1024))
    }

    // --- Tracking methods ---

    /// Add RAM usage
    pub fn add_ram(&mut self, bytes: usize) {
        self.ram_used_bytes = self.ram_used_bytes.saturating_add(bytes);
    }

    /// Add GPU memory usage
    pub fn add_gpu(&mut self, bytes: usize) {
        self.gpu_used_bytes = self.gpu_used_bytes.saturating_add(bytes);
    }

    /// Forget all tracked usage
    pub fn reset(&mut self) {
        self.ram_used_bytes = 0;
        self.gpu_used_bytes = 0;
    }

    pub fn set_budget(&mut self, budget_bytes: usize) {
        self.budget_bytes = budget_bytes;
    }

    // --- Query methods ---

    pub fn budget(&self) -> usize {
        self.budget_bytes
    }

    pub fn ram_used(&self) -> usize {
        self.ram_used_bytes
    }

    pub fn gpu_used(&self) -> usize {
        self.gpu_used_bytes
    }

    /// Combined usage in bytes
    pub fn used(&self) -> usize {
        self.ram_used_bytes.saturating_add(self.gpu_used_bytes)
    }

    /// Get available memory in bytes
    pub fn available(&self) -> usize {
        self.budget_bytes.saturating_sub(self.used())
    }

    /// Get memory pressure (0.0 to 1.0+)
    ///
    /// Values above 1.0 indicate over-budget.
    pub fn pressure(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 0.0;
        }
        self.used() as f64 / self.budget_bytes as f64
    }

    // --- Decision methods ---

    pub fn is_over(&self) -> bool {
        self.used() > self.budget_bytes
    }

    /// Plan eviction steps until usage is back under budget
    ///
    /// Candidates are visited oldest first, and among equally old ones the
    /// most expensive first. Each visited candidate counts as freed, even
    /// when it is only marked this pass.
    ///
    /// # Returns
    /// Steps in visiting order; empty when under budget
    pub fn plan_eviction(&self, mut candidates: Vec<EvictionCandidate>) -> Vec<EvictionStep> {
        if !self.is_over() {
            return Vec::new();
        }

        candidates.sort_by(|a, b| {
            a.last_access_tick
                .cmp(&b.last_access_tick)
                .then(b.cost.cmp(&a.cost))
        });

        let mut used = self.used();
        let mut steps = Vec::new();
        for candidate in candidates {
            if used <= self.budget_bytes {
                break;
            }
            used = used.saturating_sub(candidate.cost);
            steps.push(if candidate.finalizing {
                EvictionStep::Erase(candidate.name)
            } else {
                EvictionStep::Finalize(candidate.name)
            });
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, last_access_tick: u32, cost: usize) -> EvictionCandidate {
        EvictionCandidate {
            name: name.to_string(),
            last_access_tick,
            cost,
            finalizing: false,
        }
    }

    fn over_budget(used: usize, budget: usize) -> MemoryBudget {
        let mut b = MemoryBudget::new(budget);
        b.add_ram(used / 2);
        b.add_gpu(used - used / 2);
        b
    }

    #[test]
    fn test_budget_new() {
        let budget = MemoryBudget::from_megabytes(512);
        assert_eq!(budget.used(), 0);
        assert_eq!(budget.available(), 512 * 1024 * 1024);
        assert!(!budget.is_over());
        assert_eq!(budget.pressure(), 0.0);
    }

    #[test]
    fn test_pressure() {
        let mut budget = MemoryBudget::new(200);
        budget.add_ram(100);
        assert_eq!(budget.pressure(), 0.5);
        budget.add_gpu(200);
        assert!(budget.pressure() > 1.0);
        assert!(budget.is_over());
        assert_eq!(MemoryBudget::new(0).pressure(), 0.0);
    }

    #[test]
    fn test_budget_saturating_ops() {
        let mut budget = MemoryBudget::new(100);
        budget.add_ram(usize::MAX);
        budget.add_gpu(100);
        assert_eq!(budget.used(), usize::MAX);
        assert_eq!(budget.available(), 0);
        budget.reset();
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_under_budget_plans_nothing() {
        let budget = over_budget(50, 100);
        assert!(budget.plan_eviction(vec![candidate("a", 0, 50)]).is_empty());
    }

    #[test]
    fn test_frees_enough_to_get_under_budget() {
        let budget = over_budget(1000, 600);
        let steps = budget.plan_eviction(vec![
            candidate("a", 1, 100),
            candidate("b", 2, 300),
            candidate("c", 3, 200),
            candidate("d", 4, 500),
        ]);
        // a + b = 400 brings usage to exactly the budget
        assert_eq!(steps, vec![
            EvictionStep::Finalize("a".into()),
            EvictionStep::Finalize("b".into()),
        ]);
    }

    #[test]
    fn test_oldest_first_then_biggest() {
        let budget = over_budget(1000, 999);
        let steps = budget.plan_eviction(vec![
            candidate("small", 5, 10),
            candidate("big", 5, 90),
            candidate("newer", 6, 1000),
        ]);
        assert_eq!(steps, vec![EvictionStep::Finalize("big".into())]);
    }

    #[test]
    fn test_exhausts_candidates() {
        let budget = over_budget(1000, 10);
        let steps = budget.plan_eviction(vec![candidate("a", 0, 5), candidate("b", 0, 5)]);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_second_encounter_erases() {
        let budget = over_budget(200, 100);
        let mut marked = candidate("a", 0, 150);
        marked.finalizing = true;
        let steps = budget.plan_eviction(vec![marked]);
        assert_eq!(steps, vec![EvictionStep::Erase("a".into())]);
    }

    #[test]
    fn test_candidate_filter() {
        use ResourceState::*;
        // Touched inside the grace window
        assert!(!is_eviction_candidate(95, 100, 10, false, Ready));
        assert!(!is_eviction_candidate(90, 100, 10, false, Ready));
        assert!(is_eviction_candidate(89, 100, 10, false, Ready));
        // Held by a node or draw task
        assert!(!is_eviction_candidate(0, 100, 10, true, Ready));
        // Worker owns it
        assert!(!is_eviction_candidate(0, 100, 10, false, Downloading));
        assert!(is_eviction_candidate(0, 100, 10, false, ErrorDownload));
    }
}
