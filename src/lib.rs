//! Globestream - quadtree tile streaming engine for virtual globes
//!
//! The engine decides, once per rendered frame, which tiles of a
//! hierarchical map to draw, streams their resources in the background and
//! evicts what is no longer needed. Rendering, networking and projection
//! math are supplied by the application through the [`streaming::Fetcher`],
//! [`streaming::Decoder`] and [`math::CoordinateConvertor`] seams.

pub mod core;
pub mod math;
pub mod tile;
pub mod streaming;
pub mod traverse;
pub mod map;

#[cfg(test)]
mod testing;

pub use map::{Map, MapConfig, MapOptions, MapStatistics};
