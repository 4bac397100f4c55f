//! Quadtree tile addressing and metadata formats

pub mod tile_id;
pub mod node_info;
pub mod url;
pub mod metatile;

pub use tile_id::TileId;
pub use node_info::{Extents2, NodeInfo};
pub use url::{UrlTemplate, UrlVars, resolve_relative};
pub use metatile::{GeomExtents, MetaNode, MetaTile, NormalizedExtents};
