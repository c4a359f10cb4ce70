//! Point types and related functionality

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// A 3x3 matrix with double precision entries
pub type Matrix3d = Matrix3<f64>;

/// A surface sample feeding an MLS surface.
///
/// The radius is the local point spacing. It scales the support of the
/// sample's weight function and is zero until estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub position: Point3d,
    pub normal: Option<Vector3d>,
    pub radius: f64,
}

impl SamplePoint {
    /// Create a sample without normal or radius
    pub fn new(position: Point3d) -> Self {
        Self {
            position,
            normal: None,
            radius: 0.0,
        }
    }

    /// Create an oriented sample. The normal is stored normalized.
    pub fn with_normal(position: Point3d, normal: Vector3d) -> Self {
        Self {
            position,
            normal: Some(normal.try_normalize(f64::EPSILON).unwrap_or(normal)),
            radius: 0.0,
        }
    }

    /// Set the local spacing
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn has_normal(&self) -> bool {
        self.normal.is_some()
    }
}

impl Default for SamplePoint {
    fn default() -> Self {
        Self::new(Point3d::origin())
    }
}

impl From<Point3d> for SamplePoint {
    fn from(position: Point3d) -> Self {
        Self::new(position)
    }
}

impl From<SamplePoint> for Point3d {
    fn from(sample: SamplePoint) -> Self {
        sample.position
    }
}
