//! Resource streaming: download, decode, cache and evict

pub mod resource;
pub mod payload;
pub mod fetch;
pub mod disk_io;
pub mod blacklist;
pub mod decode;
pub mod loader;
pub mod budget;
pub mod cache;

pub use resource::{Resource, ResourceKind, ResourceState, Validity};
pub use payload::{GeodataTile, MeshAggregate, MeshPart, Payload, TextureData};
pub use fetch::{
    AvailabilityTest, FetchReply, FetchRequest, Fetcher, LocalFetcher, ResourceFailure,
    MAX_REDIRECTS, fetch_with_redirects,
};
pub use disk_io::{DiskCache, sanitize_name};
pub use blacklist::{BLACKLIST_FILE_NAME, Blacklist, BlacklistStaging};
pub use decode::{BasicDecoder, DecodeError, Decoder};
pub use loader::{LoadJob, LoadResult, ResourceLoader};
pub use budget::{EvictionCandidate, EvictionStep, MemoryBudget, is_eviction_candidate};
pub use cache::{CacheLimits, CacheStatistics, ResourceCache};
