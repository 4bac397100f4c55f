//! Mathematical utilities and data structures

pub mod aabb;
pub mod frustum;
pub mod obb;
pub mod disk;
pub mod convert;

pub use aabb::Aabb;
pub use frustum::{Plane, Frustum};
pub use obb::Obb;
pub use disk::BoundingDisk;
pub use convert::{CoordinateConvertor, IdentityConvertor, SphericalConvertor};
