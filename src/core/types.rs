//! Core type aliases and re-exports
//!
//! World-space math runs in f64: planetary coordinates lose too much
//! precision in f32. Render-facing values (UV matrices, colors) stay f32.

pub use glam::{
    DVec2, DVec3, DVec4,
    DMat4,
    Mat3, Vec4,
};

/// Standard Result type for the engine
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
