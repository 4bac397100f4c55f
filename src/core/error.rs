//! Error types for the streaming engine

use thiserror::Error;

/// Main error type for the engine
///
/// Only failures that stop the whole map surface here. Per-resource
/// download and decode failures stay inside the resource cache and are
/// reported through resource states instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Map config failure: {0}")]
    MapConfig(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
