//! Coordinate reference system conversion seam
//!
//! The engine never does projection math itself. It hands points and SRS
//! names to a [`CoordinateConvertor`] supplied by the application.

use crate::core::types::{DVec3, Result};
use crate::core::Error;

/// Converts points between named spatial reference systems
pub trait CoordinateConvertor: Send + Sync {
    /// Convert `point` from `from_srs` into `to_srs`
    fn convert(&self, point: DVec3, from_srs: &str, to_srs: &str) -> Result<DVec3>;
}

/// Treats every SRS as the same flat space
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityConvertor;

impl CoordinateConvertor for IdentityConvertor {
    fn convert(&self, point: DVec3, _from_srs: &str, _to_srs: &str) -> Result<DVec3> {
        Ok(point)
    }
}

/// Geographic (longitude, latitude in degrees, height) to geocentric
/// cartesian on a sphere
#[derive(Clone, Debug)]
pub struct SphericalConvertor {
    pub radius: f64,
    /// Name of the geographic SRS
    pub geographic_srs: String,
    /// Name of the geocentric (physical) SRS
    pub geocentric_srs: String,
}

impl SphericalConvertor {
    pub fn new(radius: f64, geographic_srs: impl Into<String>, geocentric_srs: impl Into<String>) -> Self {
        Self {
            radius,
            geographic_srs: geographic_srs.into(),
            geocentric_srs: geocentric_srs.into(),
        }
    }

    fn to_geocentric(&self, p: DVec3) -> DVec3 {
        let lon = p.x.to_radians();
        let lat = p.y.to_radians();
        let r = self.radius + p.z;
        DVec3::new(r * lat.cos() * lon.cos(), r * lat.cos() * lon.sin(), r * lat.sin())
    }

    fn to_geographic(&self, p: DVec3) -> DVec3 {
        let r = p.length();
        let lat = if r > 0.0 { (p.z / r).clamp(-1.0, 1.0).asin() } else { 0.0 };
        DVec3::new(p.y.atan2(p.x).to_degrees(), lat.to_degrees(), r - self.radius)
    }
}

impl CoordinateConvertor for SphericalConvertor {
    fn convert(&self, point: DVec3, from_srs: &str, to_srs: &str) -> Result<DVec3> {
        if from_srs == to_srs {
            return Ok(point);
        }
        if from_srs == self.geographic_srs && to_srs == self.geocentric_srs {
            return Ok(self.to_geocentric(point));
        }
        if from_srs == self.geocentric_srs && to_srs == self.geographic_srs {
            return Ok(self.to_geographic(point));
        }
        Err(Error::Configuration(format!(
            "no conversion from '{}' to '{}'",
            from_srs, to_srs
        )))
    }
}
