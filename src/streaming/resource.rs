//! Cached resources and their lifecycle state machine
//!
//! A [`Resource`] is shared between the cache, traverse nodes and draw
//! tasks through `Arc`. Only one thread owns the state field at a time:
//! the render thread while a resource is initializing or being decoded, a
//! worker while it is downloading. Transitions are the hand-off points, so
//! plain atomics are enough for the scalar fields.

use super::fetch::AvailabilityTest;
use super::payload::Payload;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// What a resource decodes into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    MapConfig,
    MetaTile,
    MeshAggregate,
    Texture,
    Geodata,
}

impl ResourceKind {
    /// Map configurations are always fetched fresh
    pub fn uses_disk_cache(self) -> bool {
        !matches!(self, ResourceKind::MapConfig)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::MapConfig => "map config",
            ResourceKind::MetaTile => "meta tile",
            ResourceKind::MeshAggregate => "mesh aggregate",
            ResourceKind::Texture => "texture",
            ResourceKind::Geodata => "geodata",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a resource
///
/// ```text
/// Initializing -> Downloading -> Downloaded -> Ready
/// Initializing -> ErrorLoad                     (blacklisted)
/// Downloading  -> ErrorDownload                 (transport / availability)
/// Downloaded   -> ErrorLoad                     (decode failed)
/// Ready | ErrorDownload | ErrorLoad -> Finalizing
/// Finalizing   -> Initializing                  (touched again)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResourceState {
    Initializing = 0,
    Downloading = 1,
    Downloaded = 2,
    Ready = 3,
    ErrorDownload = 4,
    ErrorLoad = 5,
    Finalizing = 6,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ResourceState::Initializing,
            1 => ResourceState::Downloading,
            2 => ResourceState::Downloaded,
            3 => ResourceState::Ready,
            4 => ResourceState::ErrorDownload,
            5 => ResourceState::ErrorLoad,
            _ => ResourceState::Finalizing,
        }
    }

    /// States reachable in a single transition
    pub fn successors(self) -> &'static [ResourceState] {
        use ResourceState::*;
        match self {
            // Disk cache hits pass through Downloading too, the read
            // happens on a worker
            Initializing => &[Downloading, ErrorLoad],
            Downloading => &[Downloaded, ErrorDownload],
            Downloaded => &[Ready, ErrorLoad],
            Ready | ErrorDownload | ErrorLoad => &[Finalizing],
            Finalizing => &[Initializing],
        }
    }

    pub fn can_transition_to(self, next: ResourceState) -> bool {
        self.successors().contains(&next)
    }

    /// Whether `to` can be observed after `self` through any number of
    /// legal transitions (including none)
    pub fn can_reach(self, to: ResourceState) -> bool {
        let mut seen = [false; 7];
        let mut stack = vec![self];
        while let Some(state) = stack.pop() {
            if state == to {
                return true;
            }
            if std::mem::replace(&mut seen[state as usize], true) {
                continue;
            }
            stack.extend_from_slice(state.successors());
        }
        false
    }

    pub fn is_error(self) -> bool {
        matches!(self, ResourceState::ErrorDownload | ResourceState::ErrorLoad)
    }
}

/// Tri-state answer to "can I use this resource now"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validity {
    /// Ready to use
    Valid,
    /// Failed for good, treat as absent
    Invalid,
    /// Still on its way
    Indeterminate,
}

/// A named, reference counted, lazily loaded resource
pub struct Resource {
    name: String,
    kind: ResourceKind,
    state: AtomicU8,
    last_access_tick: AtomicU32,
    queued_tick: AtomicU32,
    /// f64 bits
    priority: AtomicU64,
    ram_cost: AtomicUsize,
    gpu_cost: AtomicUsize,
    availability: ArcSwapOption<AvailabilityTest>,
    /// Raw bytes between download and decode
    content: Mutex<Vec<u8>>,
    payload: ArcSwapOption<Payload>,
}

impl Resource {
    pub(crate) fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: AtomicU8::new(ResourceState::Initializing as u8),
            last_access_tick: AtomicU32::new(0),
            queued_tick: AtomicU32::new(u32::MAX),
            priority: AtomicU64::new(0f64.to_bits()),
            ram_cost: AtomicUsize::new(0),
            gpu_cost: AtomicUsize::new(0),
            availability: ArcSwapOption::empty(),
            content: Mutex::new(Vec::new()),
            payload: ArcSwapOption::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn validity(&self) -> Validity {
        match self.state() {
            ResourceState::Ready => Validity::Valid,
            state if state.is_error() => Validity::Invalid,
            _ => Validity::Indeterminate,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    pub fn last_access_tick(&self) -> u32 {
        self.last_access_tick.load(Ordering::Relaxed)
    }

    pub fn priority(&self) -> f64 {
        f64::from_bits(self.priority.load(Ordering::Relaxed))
    }

    /// Raise the priority for this tick; the highest request wins
    pub fn update_priority(&self, priority: f64) {
        if priority > self.priority() {
            self.priority.store(priority.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn ram_cost(&self) -> usize {
        self.ram_cost.load(Ordering::Relaxed)
    }

    pub fn gpu_cost(&self) -> usize {
        self.gpu_cost.load(Ordering::Relaxed)
    }

    /// Combined RAM and GPU footprint
    pub fn memory_cost(&self) -> usize {
        self.ram_cost().saturating_add(self.gpu_cost())
    }

    /// Decoded payload, present once the resource was ready at least once
    pub fn payload(&self) -> Option<Arc<Payload>> {
        self.payload.load_full()
    }

    pub fn availability(&self) -> Option<Arc<AvailabilityTest>> {
        self.availability.load_full()
    }

    /// Attach an availability test used by the next download
    pub fn set_availability(&self, test: &AvailabilityTest) {
        let current = self.availability.load();
        if current.as_deref() != Some(test) {
            self.availability.store(Some(Arc::new(test.clone())));
        }
    }

    pub(crate) fn set_state(&self, next: ResourceState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {:?} -> {:?} for {}",
            current,
            next,
            self.name
        );
        log::trace!("{} {:?} -> {:?}", self.name, current, next);
        self.state.store(next as u8, Ordering::Release);
    }

    pub(crate) fn touch(&self, tick: u32) {
        if self.last_access_tick() != tick {
            self.priority.store(0f64.to_bits(), Ordering::Relaxed);
            self.last_access_tick.store(tick, Ordering::Relaxed);
        }
    }

    /// Returns true the first time it is called for `tick`
    pub(crate) fn mark_queued(&self, tick: u32) -> bool {
        self.queued_tick.swap(tick, Ordering::Relaxed) != tick
    }

    pub(crate) fn set_content(&self, content: Vec<u8>) {
        self.ram_cost.store(content.len(), Ordering::Relaxed);
        *self.content.lock().unwrap_or_else(PoisonError::into_inner) = content;
    }

    pub(crate) fn take_content(&self) -> Vec<u8> {
        std::mem::take(&mut *self.content.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn set_payload(&self, payload: Payload) {
        self.ram_cost.store(payload.ram_cost(), Ordering::Relaxed);
        self.gpu_cost.store(payload.gpu_cost(), Ordering::Relaxed);
        self.payload.store(Some(Arc::new(payload)));
    }

    /// Drop raw content after a failed decode
    pub(crate) fn clear_content(&self) {
        self.take_content();
        self.ram_cost.store(0, Ordering::Relaxed);
        self.gpu_cost.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("last_access_tick", &self.last_access_tick())
            .field("priority", &self.priority())
            .field("ram_cost", &self.ram_cost())
            .field("gpu_cost", &self.gpu_cost())
            .finish()
    }
}
