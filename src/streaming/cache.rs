//! Resource cache: name to resource map, request queues and eviction
//!
//! The cache lives on the render thread. Traversal touches resources by
//! name; touched resources that still need work go into a "next" queue,
//! which is swapped in at the start of the following tick and serviced in
//! priority order. Workers never see the map, only [`LoadJob`]s.

use super::blacklist::Blacklist;
use super::budget::{EvictionCandidate, EvictionStep, MemoryBudget, is_eviction_candidate};
use super::decode::Decoder;
use super::loader::{LoadJob, LoadResult, ResourceLoader};
use super::resource::{Resource, ResourceKind, ResourceState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Knobs bounding the cache's work and footprint
#[derive(Clone, Debug, PartialEq)]
pub struct CacheLimits {
    pub max_concurrent_downloads: usize,
    /// Combined RAM + GPU budget in bytes
    pub max_resources_memory: usize,
    /// Resources touched within this many ticks are never evicted
    pub eviction_grace_ticks: u32,
    /// Decodes per tick
    pub max_resource_processes_per_tick: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 10,
            max_resources_memory: 512 * 1024 * 1024,
            eviction_grace_ticks: 100,
            max_resource_processes_per_tick: 5,
        }
    }
}

/// Resource counters, cumulative unless prefixed `current_`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub resources_created: u32,
    pub resources_downloaded: u32,
    pub resources_disk_loaded: u32,
    pub resources_decoded: u32,
    pub resources_failed: u32,
    /// Skipped because the name is blacklisted
    pub resources_ignored: u32,
    pub resources_released: u32,
    pub current_resources: u32,
    pub current_downloads: u32,
    pub current_ram_mem_use: u64,
    pub current_gpu_mem_use: u64,
}

/// Cache of named resources
pub struct ResourceCache {
    resources: HashMap<String, Arc<Resource>>,
    /// Built during traversal
    prepare_next: Vec<Arc<Resource>>,
    /// Serviced this tick
    prepare_current: Vec<Arc<Resource>>,
    loader: ResourceLoader,
    decoder: Arc<dyn Decoder>,
    blacklist: Blacklist,
    budget: MemoryBudget,
    limits: CacheLimits,
    tick: u32,
    stats: CacheStatistics,
}

impl ResourceCache {
    pub fn new(
        limits: CacheLimits,
        loader: ResourceLoader,
        decoder: Arc<dyn Decoder>,
        blacklist: Blacklist,
    ) -> Self {
        Self {
            resources: HashMap::new(),
            prepare_next: Vec::new(),
            prepare_current: Vec::new(),
            loader,
            decoder,
            blacklist,
            budget: MemoryBudget::new(limits.max_resources_memory),
            limits,
            tick: 0,
            stats: CacheStatistics::default(),
        }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    pub fn set_limits(&mut self, limits: CacheLimits) {
        self.budget.set_budget(limits.max_resources_memory);
        self.limits = limits;
    }

    pub fn statistics(&self) -> &CacheStatistics {
        &self.stats
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Look up a resource without touching it
    pub fn find(&self, name: &str) -> Option<&Arc<Resource>> {
        self.resources.get(name)
    }

    /// Get (creating if needed) and touch a resource
    ///
    /// The name is the identity: asking again with a different kind returns
    /// the existing resource.
    pub fn get(&mut self, name: &str, kind: ResourceKind) -> Arc<Resource> {
        let resource = match self.resources.get(name) {
            Some(existing) => Arc::clone(existing),
            None => {
                let created = Arc::new(Resource::new(name, kind));
                self.resources.insert(name.to_string(), Arc::clone(&created));
                self.stats.resources_created += 1;
                log::trace!("Created {} {}", kind, name);
                created
            }
        };
        self.touch(&resource);
        resource
    }

    /// Mark a resource as used this tick
    ///
    /// Resurrects `Finalizing` resources and queues anything that still
    /// needs a download or decode.
    pub fn touch(&mut self, resource: &Arc<Resource>) {
        resource.touch(self.tick);
        match resource.state() {
            ResourceState::Finalizing => {
                log::debug!("Resurrecting {}", resource.name());
                resource.set_state(ResourceState::Initializing);
                self.enqueue(resource);
            }
            ResourceState::Initializing | ResourceState::Downloaded => self.enqueue(resource),
            _ => {}
        }
    }

    fn enqueue(&mut self, resource: &Arc<Resource>) {
        if resource.mark_queued(self.tick) {
            self.prepare_next.push(Arc::clone(resource));
        }
    }

    /// Start a tick: swap queues, take in worker results, evict
    pub fn begin_tick(&mut self) {
        self.tick += 1;
        self.prepare_current = std::mem::take(&mut self.prepare_next);

        let blacklisted = self.blacklist.merge_staging();
        if blacklisted > 0 {
            log::debug!("Blacklisted {} more names", blacklisted);
        }

        for result in self.loader.poll_results() {
            self.apply_result(result);
        }

        self.evict();
        self.stats.current_resources = self.resources.len() as u32;
        self.stats.current_downloads = self.loader.pending_count() as u32;
    }

    fn apply_result(&mut self, result: LoadResult) {
        match result {
            LoadResult::Loaded { name, content, from_disk } => {
                if from_disk {
                    self.stats.resources_disk_loaded += 1;
                } else {
                    self.stats.resources_downloaded += 1;
                }
                let Some(resource) = self.resources.get(&name).cloned() else {
                    return;
                };
                if resource.state() != ResourceState::Downloading {
                    return;
                }
                resource.set_content(content);
                resource.set_state(ResourceState::Downloaded);
                self.prepare_current.push(resource);
            }
            LoadResult::Failed { name, failure } => {
                self.stats.resources_failed += 1;
                if let Some(resource) = self.resources.get(&name) {
                    if resource.state() == ResourceState::Downloading {
                        log::debug!("{} failed: {}", name, failure);
                        resource.set_state(ResourceState::ErrorDownload);
                    }
                }
            }
        }
    }

    /// Service this tick's queue in priority order
    ///
    /// Dispatches downloads while under the concurrency limit and decodes
    /// downloaded content up to the per-tick limit. Anything skipped stays
    /// in its state and is queued again the next time it is touched.
    pub fn process(&mut self) {
        let mut queue = std::mem::take(&mut self.prepare_current);
        queue.sort_by(|a, b| b.priority().total_cmp(&a.priority()));

        let mut processed = 0;
        for resource in queue {
            match resource.state() {
                ResourceState::Initializing => {
                    if self.blacklist.contains(resource.name()) {
                        log::debug!("Skipping blacklisted {}", resource.name());
                        resource.set_state(ResourceState::ErrorLoad);
                        self.stats.resources_ignored += 1;
                        continue;
                    }
                    if self.loader.pending_count() >= self.limits.max_concurrent_downloads {
                        continue;
                    }
                    resource.set_state(ResourceState::Downloading);
                    self.loader.submit(LoadJob {
                        name: resource.name().to_string(),
                        kind: resource.kind(),
                        availability: resource.availability(),
                    });
                }
                ResourceState::Downloaded => {
                    if processed >= self.limits.max_resource_processes_per_tick {
                        continue;
                    }
                    processed += 1;
                    self.decode(&resource);
                }
                _ => {}
            }
        }

        self.stats.current_downloads = self.loader.pending_count() as u32;
    }

    fn decode(&mut self, resource: &Resource) {
        let content = resource.take_content();
        let decoded = self
            .decoder
            .decode(resource.kind(), resource.name(), &content)
            .and_then(|payload| {
                if payload.kind() == resource.kind() {
                    Ok(payload)
                } else {
                    Err(super::decode::DecodeError::Unsupported(resource.kind()))
                }
            });
        match decoded {
            Ok(payload) => {
                resource.set_payload(payload);
                resource.set_state(ResourceState::Ready);
                self.stats.resources_decoded += 1;
            }
            Err(e) => {
                log::warn!("Failed to decode {}: {}", resource.name(), e);
                resource.clear_content();
                resource.set_state(ResourceState::ErrorLoad);
                self.stats.resources_failed += 1;
            }
        }
    }

    /// Two-phase eviction under memory pressure
    fn evict(&mut self) {
        self.budget.reset();
        for resource in self.resources.values() {
            self.budget.add_ram(resource.ram_cost());
            self.budget.add_gpu(resource.gpu_cost());
        }
        self.stats.current_ram_mem_use = self.budget.ram_used() as u64;
        self.stats.current_gpu_mem_use = self.budget.gpu_used() as u64;
        if !self.budget.is_over() {
            return;
        }

        let candidates: Vec<EvictionCandidate> = self
            .resources
            .values()
            .filter(|r| {
                is_eviction_candidate(
                    r.last_access_tick(),
                    self.tick,
                    self.limits.eviction_grace_ticks,
                    Arc::strong_count(r) > 1,
                    r.state(),
                )
            })
            .map(|r| EvictionCandidate {
                name: r.name().to_string(),
                last_access_tick: r.last_access_tick(),
                cost: r.memory_cost(),
                finalizing: r.state() == ResourceState::Finalizing,
            })
            .collect();

        let steps = self.budget.plan_eviction(candidates);
        if !steps.is_empty() {
            log::debug!(
                "Memory {} / {} bytes (pressure {:.2}), {} eviction steps",
                self.budget.used(),
                self.budget.budget(),
                self.budget.pressure(),
                steps.len()
            );
        }

        for step in steps {
            match step {
                EvictionStep::Finalize(name) => {
                    let Some(resource) = self.resources.get(&name) else {
                        continue;
                    };
                    match resource.state() {
                        ResourceState::Ready
                        | ResourceState::ErrorDownload
                        | ResourceState::ErrorLoad => resource.set_state(ResourceState::Finalizing),
                        // Never became usable, nothing to keep around for
                        ResourceState::Initializing | ResourceState::Downloaded => self.release(&name),
                        _ => {}
                    }
                }
                EvictionStep::Erase(name) => self.release(&name),
            }
        }
    }

    fn release(&mut self, name: &str) {
        if self.resources.remove(name).is_some() {
            log::debug!("Released {}", name);
            self.stats.resources_released += 1;
        }
    }

    /// Drop every resource and queued request
    ///
    /// Results of downloads still in flight are discarded when they arrive.
    pub fn clear(&mut self) {
        let released = self.resources.len() as u32;
        self.resources.clear();
        self.prepare_next.clear();
        self.prepare_current.clear();
        self.stats.resources_released += released;
        self.stats.current_resources = 0;
        log::info!("Released all {} resources", released);
    }

    /// Forget one resource so the next `get` starts over
    ///
    /// Holders of the old `Arc` keep it alive, but the cache no longer
    /// tracks it and a late worker result for it is discarded.
    pub fn purge(&mut self, name: &str) -> bool {
        let Some(resource) = self.resources.remove(name) else {
            return false;
        };
        self.prepare_next.retain(|r| !Arc::ptr_eq(r, &resource));
        self.prepare_current.retain(|r| !Arc::ptr_eq(r, &resource));
        self.stats.resources_released += 1;
        self.stats.current_resources = self.resources.len() as u32;
        log::debug!("Purged {}", name);
        true
    }

    /// Iterate over all cached resources
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::decode::BasicDecoder;
    use crate::streaming::fetch::{AvailabilityTest, FetchReply};
    use crate::testing::MockFetcher;
    use std::collections::BTreeSet;

    fn test_cache(fetcher: &Arc<MockFetcher>, limits: CacheLimits) -> ResourceCache {
        let blacklist = Blacklist::in_memory(false);
        let loader = ResourceLoader::new(fetcher.clone(), None, blacklist.staging(), 0).unwrap();
        ResourceCache::new(limits, loader, Arc::new(BasicDecoder), blacklist)
    }

    fn run_tick(cache: &mut ResourceCache) {
        cache.begin_tick();
        cache.process();
    }

    fn count(cache: &ResourceCache, state: ResourceState) -> usize {
        cache.iter().filter(|r| r.state() == state).count()
    }

    #[test]
    fn test_lifecycle_to_ready() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("t.jpg", FetchReply::ok(vec![7u8; 32], "image/jpeg"));
        let mut cache = test_cache(&fetcher, CacheLimits::default());

        let t = cache.get("t.jpg", ResourceKind::Texture);
        assert_eq!(t.state(), ResourceState::Initializing);

        run_tick(&mut cache);
        assert_eq!(t.state(), ResourceState::Downloading);
        cache.touch(&t);

        run_tick(&mut cache);
        assert_eq!(t.state(), ResourceState::Ready);
        assert_eq!(t.payload().unwrap().as_texture().unwrap().encoded.len(), 32);
        assert_eq!(cache.statistics().resources_downloaded, 1);
        assert_eq!(cache.statistics().resources_decoded, 1);
    }

    #[test]
    fn test_observed_states_follow_transition_graph() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("ok.jpg", FetchReply::ok(vec![1u8; 8], "image/jpeg"));
        fetcher.insert("bad.json", FetchReply::ok("{oops", "application/json"));
        let mut cache = test_cache(&fetcher, CacheLimits {
            max_resources_memory: 0,
            eviction_grace_ticks: 1,
            ..Default::default()
        });

        let names = [
            ("ok.jpg", ResourceKind::Texture),
            ("bad.json", ResourceKind::MetaTile),
            ("missing", ResourceKind::Texture),
        ];
        let mut last: HashMap<&str, ResourceState> = HashMap::new();
        for tick in 0..30 {
            // Keep touching for a while, then let eviction take over
            for (name, kind) in names {
                if tick < 6 || (tick > 12 && tick < 15) {
                    cache.get(name, kind);
                }
            }
            run_tick(&mut cache);
            for (name, _) in names {
                let Some(resource) = cache.find(name) else {
                    last.remove(name);
                    continue;
                };
                let state = resource.state();
                if let Some(previous) = last.insert(name, state) {
                    assert!(previous.can_reach(state), "{}: {:?} -> {:?}", name, previous, state);
                }
            }
        }
    }

    #[test]
    fn test_download_gate() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let name = format!("tile-{}.jpg", i);
            fetcher.insert(&name, FetchReply::ok(vec![1u8; 4], "image/jpeg"));
        }
        let mut cache = test_cache(&fetcher, CacheLimits {
            max_concurrent_downloads: 10,
            ..Default::default()
        });
        for i in 0..20 {
            handles.push(cache.get(&format!("tile-{}.jpg", i), ResourceKind::Texture));
        }

        run_tick(&mut cache);
        assert_eq!(count(&cache, ResourceState::Downloading), 10);
        assert_eq!(count(&cache, ResourceState::Initializing), 10);

        // Slots free up as results come back
        for _ in 0..10 {
            for h in &handles {
                cache.touch(h);
            }
            run_tick(&mut cache);
            assert!(count(&cache, ResourceState::Downloading) <= 10);
        }
        assert_eq!(count(&cache, ResourceState::Ready), 20);
    }

    #[test]
    fn test_blacklisted_name_is_not_requested() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut blacklist = Blacklist::in_memory(false);
        blacklist.staging().report("known-missing", true);
        blacklist.merge_staging();
        let loader = ResourceLoader::new(fetcher.clone(), None, blacklist.staging(), 0).unwrap();
        let mut cache = ResourceCache::new(CacheLimits::default(), loader, Arc::new(BasicDecoder), blacklist);

        let r = cache.get("known-missing", ResourceKind::Texture);
        run_tick(&mut cache);
        assert_eq!(r.state(), ResourceState::ErrorLoad);
        assert_eq!(cache.statistics().resources_ignored, 1);
        assert_eq!(fetcher.request_count("known-missing"), 0);
    }

    #[test]
    fn test_failed_download_is_blacklisted() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut cache = test_cache(&fetcher, CacheLimits::default());
        let r = cache.get("nope", ResourceKind::Texture);
        run_tick(&mut cache);
        run_tick(&mut cache);
        assert_eq!(r.state(), ResourceState::ErrorDownload);
        assert!(cache.blacklist().contains("nope"));
    }

    #[test]
    fn test_redirect_limit() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert_redirect_chain("five", 5, FetchReply::ok(vec![1u8; 4], "image/jpeg"));
        fetcher.insert_redirect_chain("six", 6, FetchReply::ok(vec![1u8; 4], "image/jpeg"));
        let mut cache = test_cache(&fetcher, CacheLimits::default());

        let five = cache.get("five", ResourceKind::Texture);
        let six = cache.get("six", ResourceKind::Texture);
        run_tick(&mut cache);
        cache.touch(&five);
        run_tick(&mut cache);
        assert_eq!(five.state(), ResourceState::Ready);
        assert_eq!(six.state(), ResourceState::ErrorDownload);
    }

    #[test]
    fn test_availability_rejection() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("5-10-10.meta", FetchReply::status(404));
        let mut cache = test_cache(&fetcher, CacheLimits::default());

        let meta = cache.get("5-10-10.meta", ResourceKind::MetaTile);
        meta.set_availability(&AvailabilityTest::NegativeCode { codes: BTreeSet::from([404]) });
        run_tick(&mut cache);
        run_tick(&mut cache);
        assert_eq!(meta.state(), ResourceState::ErrorDownload);
        assert!(cache.blacklist().is_persistent("5-10-10.meta"));
    }

    #[test]
    fn test_decode_failure_is_error_load() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("broken.meta", FetchReply::ok("not json", "application/json"));
        let mut cache = test_cache(&fetcher, CacheLimits::default());

        let meta = cache.get("broken.meta", ResourceKind::MetaTile);
        run_tick(&mut cache);
        cache.touch(&meta);
        run_tick(&mut cache);
        assert_eq!(meta.state(), ResourceState::ErrorLoad);
        assert_eq!(meta.ram_cost(), 0);
    }

    #[test]
    fn test_malformed_meta_tile_is_error_load() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert(
            "20-0-0.meta",
            FetchReply::ok(
                r#"{"origin": {"lod": 20, "x": 0, "y": 0}, "binaryOrder": 20, "nodes": [{}]}"#,
                "application/json",
            ),
        );
        let mut cache = test_cache(&fetcher, CacheLimits::default());

        let meta = cache.get("20-0-0.meta", ResourceKind::MetaTile);
        run_tick(&mut cache);
        cache.touch(&meta);
        run_tick(&mut cache);
        assert_eq!(meta.state(), ResourceState::ErrorLoad);
        assert!(meta.state().is_error());
        assert!(meta.payload().is_none());
        assert_eq!(cache.statistics().resources_failed, 1);
    }

    #[test]
    fn test_decode_limit_per_tick() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut handles = Vec::new();
        let mut cache = test_cache(&fetcher, CacheLimits {
            max_resource_processes_per_tick: 2,
            ..Default::default()
        });
        for i in 0..5 {
            let name = format!("t{}", i);
            fetcher.insert(&name, FetchReply::ok(vec![1u8; 4], "image/jpeg"));
            handles.push(cache.get(&name, ResourceKind::Texture));
        }
        run_tick(&mut cache);
        for h in &handles {
            cache.touch(h);
        }
        run_tick(&mut cache);
        assert_eq!(count(&cache, ResourceState::Ready), 2);
        assert_eq!(count(&cache, ResourceState::Downloaded), 3);
    }

    fn load_ready(cache: &mut ResourceCache, name: &str) {
        let r = cache.get(name, ResourceKind::Texture);
        run_tick(cache);
        cache.touch(&r);
        run_tick(cache);
        assert_eq!(r.state(), ResourceState::Ready);
    }

    fn pressured_cache(fetcher: &Arc<MockFetcher>) -> ResourceCache {
        fetcher.insert("a", FetchReply::ok(vec![1u8; 100], "image/jpeg"));
        fetcher.insert("b", FetchReply::ok(vec![1u8; 100], "image/jpeg"));
        test_cache(fetcher, CacheLimits {
            max_resources_memory: 1,
            eviction_grace_ticks: 2,
            ..Default::default()
        })
    }

    #[test]
    fn test_untouched_resource_is_finalized_then_erased() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut cache = pressured_cache(&fetcher);
        load_ready(&mut cache, "a");

        let mut seen_finalizing = false;
        for _ in 0..10 {
            run_tick(&mut cache);
            match cache.find("a") {
                Some(r) if r.state() == ResourceState::Finalizing => {
                    assert!(!seen_finalizing, "erase must follow the mark");
                    seen_finalizing = true;
                }
                Some(_) => {}
                None => break,
            }
        }
        assert!(seen_finalizing);
        assert!(cache.find("a").is_none());
        assert_eq!(cache.statistics().resources_released, 1);
    }

    #[test]
    fn test_touched_finalizing_resource_is_resurrected() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut cache = pressured_cache(&fetcher);
        load_ready(&mut cache, "a");

        let mut marked = None;
        for _ in 0..10 {
            run_tick(&mut cache);
            if let Some(r) = cache.find("a").filter(|r| r.state() == ResourceState::Finalizing) {
                marked = Some(Arc::clone(r));
                break;
            }
        }
        let a = marked.expect("resource should be marked under pressure");
        cache.touch(&a);
        assert_eq!(a.state(), ResourceState::Initializing);
        drop(a);

        run_tick(&mut cache);
        let a = cache.find("a").expect("resurrected resource must not be erased");
        assert_eq!(a.state(), ResourceState::Downloading);
    }

    #[test]
    fn test_resources_in_grace_window_survive() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut cache = pressured_cache(&fetcher);
        load_ready(&mut cache, "a");
        load_ready(&mut cache, "b");

        for _ in 0..20 {
            let a = cache.find("a").cloned().unwrap();
            cache.touch(&a);
            drop(a);
            run_tick(&mut cache);
        }
        assert_eq!(cache.find("a").unwrap().state(), ResourceState::Ready);
        assert!(cache.find("b").is_none());
    }

    #[test]
    fn test_referenced_resource_survives() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut cache = pressured_cache(&fetcher);
        load_ready(&mut cache, "a");
        let held = cache.find("a").cloned().unwrap();
        for _ in 0..20 {
            run_tick(&mut cache);
        }
        assert_eq!(held.state(), ResourceState::Ready);
        assert!(cache.find("a").is_some());
    }

    #[test]
    fn test_clear_discards_late_results() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("a", FetchReply::ok(vec![1u8; 4], "image/jpeg"));
        let mut cache = test_cache(&fetcher, CacheLimits::default());
        cache.get("a", ResourceKind::Texture);
        run_tick(&mut cache);
        cache.clear();
        run_tick(&mut cache);
        assert!(cache.is_empty());
        assert_eq!(cache.statistics().current_downloads, 0);
    }
}
