//! Implicit surface capability shared by every surface model
//!
//! A surface is the zero level set of a scalar field that is negative inside
//! and positive outside. Fields are only defined near their samples; outside
//! that support the field methods return `None`.

use mlsurf_core::{Matrix3d, Point3d, Vector3d};

/// Gradients shorter than this are treated as degenerate
pub const GRADIENT_EPSILON: f64 = 1e-8;

/// Finite difference step for Hessians, relative to the surface length scale
const HESSIAN_STEP: f64 = 1e-4;

/// Scalar field whose zero level set is a surface
pub trait ImplicitSurface: Sync {
    /// Field value and gradient at `p`, `None` outside the field's support
    fn potential_and_gradient(&self, p: &Point3d) -> Option<(f64, Vector3d)>;

    /// Characteristic sample spacing of the surface.
    ///
    /// Scales convergence thresholds and finite difference steps so that they
    /// do not depend on the absolute size of the data.
    fn length_scale(&self) -> f64;

    fn evaluate(&self, p: &Point3d) -> Option<f64> {
        self.potential_and_gradient(p).map(|(value, _)| value)
    }

    fn gradient(&self, p: &Point3d) -> Option<Vector3d> {
        self.potential_and_gradient(p).map(|(_, gradient)| gradient)
    }

    /// Unit normal at `p`, `None` where the gradient is degenerate
    fn normal(&self, p: &Point3d) -> Option<Vector3d> {
        self.gradient(p)
            .and_then(|g| g.try_normalize(GRADIENT_EPSILON))
    }

    /// Symmetric Hessian at `p`, from central differences of the gradient
    fn hessian(&self, p: &Point3d) -> Option<Matrix3d> {
        let h = HESSIAN_STEP * self.length_scale();
        let mut hessian = Matrix3d::zeros();
        for axis in 0..3 {
            let mut offset = Vector3d::zeros();
            offset[axis] = h;
            let forward = self.gradient(&(p + offset))?;
            let backward = self.gradient(&(p - offset))?;
            hessian.set_column(axis, &((forward - backward) / (2.0 * h)));
        }
        Some((hessian + hessian.transpose()) * 0.5)
    }
}

/// Exact signed distance field of a sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticSphere {
    pub center: Point3d,
    pub radius: f64,
    /// Length scale reported to solvers
    pub spacing: f64,
}

impl AnalyticSphere {
    pub fn new(center: Point3d, radius: f64) -> Self {
        Self {
            center,
            radius,
            spacing: radius * 0.01,
        }
    }

    /// Axis aligned bounds of the sphere, grown by `margin` on every side
    pub fn bounds(&self, margin: f64) -> (Point3d, Point3d) {
        let extent = Vector3d::repeat(self.radius + margin);
        (self.center - extent, self.center + extent)
    }
}

impl ImplicitSurface for AnalyticSphere {
    fn potential_and_gradient(&self, p: &Point3d) -> Option<(f64, Vector3d)> {
        let offset = p - self.center;
        let distance = offset.norm();
        let gradient = if distance > 0.0 {
            offset / distance
        } else {
            Vector3d::zeros()
        };
        Some((distance - self.radius, gradient))
    }

    fn length_scale(&self) -> f64 {
        self.spacing
    }
}
