//! Background resource loading on a worker pool
//!
//! Jobs run on a rayon pool and block on disk or network I/O. Each job
//! reports exactly one [`LoadResult`] over an unbounded channel that the
//! render thread drains once per tick, so completion never re-enters
//! traversal state.

use super::blacklist::BlacklistStaging;
use super::disk_io::DiskCache;
use super::fetch::{AvailabilityTest, Fetcher, ResourceFailure, fetch_with_redirects};
use super::resource::ResourceKind;
use crate::core::types::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Work item handed to a worker
#[derive(Debug, Clone)]
pub struct LoadJob {
    pub name: String,
    pub kind: ResourceKind,
    pub availability: Option<Arc<AvailabilityTest>>,
}

/// Result of a load job
#[derive(Debug)]
pub enum LoadResult {
    /// Content is available, from the disk cache or the network
    Loaded {
        name: String,
        content: Vec<u8>,
        from_disk: bool,
    },
    /// Download failed, the name was reported to the blacklist
    Failed {
        name: String,
        failure: ResourceFailure,
    },
}

impl LoadResult {
    pub fn name(&self) -> &str {
        match self {
            LoadResult::Loaded { name, .. } | LoadResult::Failed { name, .. } => name,
        }
    }
}

/// State shared with worker jobs
struct LoaderShared {
    fetcher: Arc<dyn Fetcher>,
    disk_cache: Option<Arc<DiskCache>>,
    staging: BlacklistStaging,
}

impl LoaderShared {
    /// Disk cache first, then the network with write-back
    fn run(&self, job: LoadJob) -> LoadResult {
        let use_disk = job.kind.uses_disk_cache();
        if let Some(cache) = self.disk_cache.as_ref().filter(|_| use_disk) {
            if cache.exists(&job.name) {
                match cache.read(&job.name) {
                    Ok(content) => {
                        return LoadResult::Loaded {
                            name: job.name,
                            content,
                            from_disk: true,
                        };
                    }
                    Err(e) => log::warn!("Disk cache entry for {} unreadable: {}", job.name, e),
                }
            }
        }

        match fetch_with_redirects(self.fetcher.as_ref(), &job.name, job.kind, job.availability.as_deref()) {
            Ok(reply) => {
                if let Some(cache) = self.disk_cache.as_ref().filter(|_| use_disk) {
                    if let Err(e) = cache.write(&job.name, &reply.content) {
                        log::warn!("Failed to cache {}: {}", job.name, e);
                    }
                }
                LoadResult::Loaded {
                    name: job.name,
                    content: reply.content,
                    from_disk: false,
                }
            }
            Err(failure) => {
                log::warn!("Failed to download {}: {}", job.name, failure);
                self.staging.report(&job.name, failure.is_permanent());
                LoadResult::Failed {
                    name: job.name,
                    failure,
                }
            }
        }
    }
}

/// Concurrent resource loader
pub struct ResourceLoader {
    /// `None` runs jobs inline on the caller's thread
    pool: Option<rayon::ThreadPool>,
    shared: Arc<LoaderShared>,
    result_tx: mpsc::UnboundedSender<LoadResult>,
    result_rx: mpsc::UnboundedReceiver<LoadResult>,
    /// Names currently being loaded
    pending: HashSet<String>,
}

impl ResourceLoader {
    /// Create a new loader
    ///
    /// # Arguments
    /// * `fetcher` - Transport used for downloads
    /// * `disk_cache` - Optional cache consulted before and filled after downloads
    /// * `staging` - Blacklist staging set that failures are reported to
    /// * `worker_threads` - Pool size; 0 runs every job inline during `submit`
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        disk_cache: Option<Arc<DiskCache>>,
        staging: BlacklistStaging,
        worker_threads: usize,
    ) -> Result<Self> {
        let pool = if worker_threads > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(worker_threads)
                    .thread_name(|i| format!("globestream-loader-{}", i))
                    .build()?,
            )
        } else {
            None
        };
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        Ok(Self {
            pool,
            shared: Arc::new(LoaderShared {
                fetcher,
                disk_cache,
                staging,
            }),
            result_tx,
            result_rx,
            pending: HashSet::new(),
        })
    }

    /// Queue a job
    ///
    /// Returns `false` if a job for the same name is already pending.
    pub fn submit(&mut self, job: LoadJob) -> bool {
        if !self.pending.insert(job.name.clone()) {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        let tx = self.result_tx.clone();
        match &self.pool {
            Some(pool) => pool.spawn(move || {
                // Receiver gone means the loader was dropped; nothing to report to
                let _ = tx.send(shared.run(job));
            }),
            None => {
                let _ = tx.send(shared.run(job));
            }
        }
        true
    }

    /// Poll for completed load results (non-blocking)
    ///
    /// Returns all currently available results.
    pub fn poll_results(&mut self) -> Vec<LoadResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.pending.remove(result.name());
            results.push(result);
        }
        results
    }

    /// Number of jobs submitted and not yet polled
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn disk_cache(&self) -> Option<&Arc<DiskCache>> {
        self.shared.disk_cache.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::fetch::FetchReply;
    use crate::testing::MockFetcher;
    use std::time::{Duration, Instant};

    fn job(name: &str) -> LoadJob {
        LoadJob {
            name: name.to_string(),
            kind: ResourceKind::Texture,
            availability: None,
        }
    }

    #[test]
    fn test_inline_load() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("a", FetchReply::ok("abc", "image/png"));
        let mut loader = ResourceLoader::new(fetcher, None, BlacklistStaging::default(), 0).unwrap();

        assert!(loader.submit(job("a")));
        assert!(!loader.submit(job("a")));
        assert_eq!(loader.pending_count(), 1);

        let results = loader.poll_results();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], LoadResult::Loaded { content, from_disk: false, .. } if content == b"abc"));
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn test_failure_reported_to_staging() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut blacklist = crate::streaming::Blacklist::in_memory(false);
        let mut loader = ResourceLoader::new(fetcher, None, blacklist.staging(), 0).unwrap();

        loader.submit(job("missing"));
        let results = loader.poll_results();
        assert!(matches!(&results[0], LoadResult::Failed { failure: ResourceFailure::Transport { code: 404 }, .. }));
        blacklist.merge_staging();
        assert!(blacklist.is_persistent("missing"));
    }

    #[test]
    fn test_disk_cache_hit_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskCache::new(dir.path()).unwrap());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("https://host/t.png", FetchReply::ok("net", "image/png"));
        let mut loader =
            ResourceLoader::new(fetcher.clone(), Some(disk.clone()), BlacklistStaging::default(), 0).unwrap();

        loader.submit(job("https://host/t.png"));
        loader.poll_results();
        assert!(disk.exists("https://host/t.png"));

        loader.submit(job("https://host/t.png"));
        let results = loader.poll_results();
        assert!(matches!(&results[0], LoadResult::Loaded { from_disk: true, .. }));
        assert_eq!(fetcher.request_count("https://host/t.png"), 1);
    }

    #[test]
    fn test_map_config_bypasses_disk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskCache::new(dir.path()).unwrap());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.insert("cfg.json", FetchReply::ok("{}", "application/json"));
        let mut loader =
            ResourceLoader::new(fetcher, Some(disk.clone()), BlacklistStaging::default(), 0).unwrap();

        loader.submit(LoadJob {
            name: "cfg.json".into(),
            kind: ResourceKind::MapConfig,
            availability: None,
        });
        loader.poll_results();
        assert!(!disk.exists("cfg.json"));
    }

    #[test]
    fn test_pooled_load() {
        let fetcher = Arc::new(MockFetcher::new());
        for i in 0..8 {
            fetcher.insert(&format!("t{}", i), FetchReply::ok(vec![i as u8], "image/png"));
        }
        let mut loader = ResourceLoader::new(fetcher, None, BlacklistStaging::default(), 2).unwrap();
        for i in 0..8 {
            loader.submit(job(&format!("t{}", i)));
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut received = 0;
        while received < 8 && Instant::now() < deadline {
            received += loader.poll_results().len();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(received, 8);
        assert_eq!(loader.pending_count(), 0);
    }
}
