//! Names of resources known to fail, so traversal stops asking for them
//!
//! Workers report failures into a shared staging set. The render thread
//! merges staging into the authoritative sets once per tick, which keeps
//! lock traffic to one acquisition per tick on the render side.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// File name of the persisted blacklist inside the cache root
pub const BLACKLIST_FILE_NAME: &str = "invalid_urls.txt";

/// Worker-side handle for reporting failed names
#[derive(Clone, Debug, Default)]
pub struct BlacklistStaging {
    /// name -> permanent failure
    inner: Arc<Mutex<HashMap<String, bool>>>,
}

impl BlacklistStaging {
    pub fn report(&self, name: &str, permanent: bool) {
        let mut staged = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *staged.entry(name.to_string()).or_insert(false) |= permanent;
    }

    fn drain(&self) -> Vec<(String, bool)> {
        let mut staged = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        staged.drain().collect()
    }
}

/// Authoritative blacklist owned by the render thread
///
/// Permanent failures (availability rejections, 4xx statuses) are written
/// to disk on drop; transient ones only last for this session unless
/// `persist_transient` is set.
#[derive(Debug)]
pub struct Blacklist {
    persistent: HashSet<String>,
    session: HashSet<String>,
    staging: BlacklistStaging,
    file: Option<PathBuf>,
    persist_transient: bool,
    dirty: bool,
}

impl Blacklist {
    /// Blacklist that is never written to disk
    pub fn in_memory(persist_transient: bool) -> Self {
        Self {
            persistent: HashSet::new(),
            session: HashSet::new(),
            staging: BlacklistStaging::default(),
            file: None,
            persist_transient,
            dirty: false,
        }
    }

    /// Load the blacklist from `file`; it is saved back on drop
    ///
    /// A missing or unreadable file starts an empty list.
    pub fn load(file: PathBuf, persist_transient: bool) -> Self {
        let mut blacklist = Self::in_memory(persist_transient);
        match std::fs::read_to_string(&file) {
            Ok(text) => {
                blacklist.persistent = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                log::info!("Loaded {} blacklisted names from {}", blacklist.persistent.len(), file.display());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to read blacklist {}: {}", file.display(), e),
        }
        blacklist.file = Some(file);
        blacklist
    }

    /// Handle for workers
    pub fn staging(&self) -> BlacklistStaging {
        self.staging.clone()
    }

    /// Move staged reports into the authoritative sets
    ///
    /// # Returns
    /// Number of newly blacklisted names
    pub fn merge_staging(&mut self) -> usize {
        let mut added = 0;
        for (name, permanent) in self.staging.drain() {
            if permanent || self.persist_transient {
                self.session.remove(&name);
                if self.persistent.insert(name) {
                    self.dirty = true;
                    added += 1;
                }
            } else if !self.persistent.contains(&name) && self.session.insert(name) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.persistent.contains(name) || self.session.contains(name)
    }

    pub fn is_persistent(&self, name: &str) -> bool {
        self.persistent.contains(name)
    }

    pub fn len(&self) -> usize {
        self.persistent.len() + self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write persistent names to the backing file, one per line
    pub fn save(&self) -> io::Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let mut names: Vec<&str> = self.persistent.iter().map(String::as_str).collect();
        names.sort_unstable();
        let mut text = names.join("\n");
        text.push('\n');
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(file, text)
    }
}

impl Drop for Blacklist {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Err(e) = self.save() {
            log::warn!("Failed to save blacklist: {}", e);
        }
    }
}
