//! Differential geometry of implicit surfaces
//!
//! The shape operator of the level set through a point is the Hessian of the
//! field restricted to the tangent plane and divided by the gradient norm.
//! Its eigenpairs are the principal curvatures and directions.

use crate::implicit::{ImplicitSurface, GRADIENT_EPSILON};
use mlsurf_core::{Error, Matrix3d, Point3d, PrincipalCurvature, Result, Vector3d};
use serde::{Deserialize, Serialize};

/// Scalar picked from a [`CurvatureSample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurvatureKind {
    #[default]
    Mean,
    Gauss,
    K1,
    K2,
    /// Reciprocal radius of the fitted algebraic sphere; APSS only
    ApproxMean,
}

impl CurvatureKind {
    /// Whether the value comes from the full Weingarten map
    pub fn uses_weingarten_map(&self) -> bool {
        !matches!(self, CurvatureKind::ApproxMean)
    }
}

/// Curvature of the level set through a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvatureSample {
    pub mean: f64,
    pub gauss: f64,
    /// Largest principal curvature
    pub k1: f64,
    pub k2: f64,
    pub dir1: Vector3d,
    pub dir2: Vector3d,
    /// False when the gradient was too small to define a tangent plane
    pub valid: bool,
}

impl CurvatureSample {
    pub fn invalid() -> Self {
        Self {
            mean: 0.0,
            gauss: 0.0,
            k1: 0.0,
            k2: 0.0,
            dir1: Vector3d::zeros(),
            dir2: Vector3d::zeros(),
            valid: false,
        }
    }

    /// Requested scalar; `None` for invalid samples and for [`CurvatureKind::ApproxMean`]
    pub fn value(&self, kind: CurvatureKind) -> Option<f64> {
        if !self.valid {
            return None;
        }
        match kind {
            CurvatureKind::Mean => Some(self.mean),
            CurvatureKind::Gauss => Some(self.gauss),
            CurvatureKind::K1 => Some(self.k1),
            CurvatureKind::K2 => Some(self.k2),
            CurvatureKind::ApproxMean => None,
        }
    }

    pub fn principal(&self) -> Option<PrincipalCurvature> {
        self.valid.then(|| PrincipalCurvature {
            k1: self.k1,
            k2: self.k2,
            dir1: self.dir1,
            dir2: self.dir2,
        })
    }
}

/// Weingarten map evaluation with a configurable gradient threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialEvaluator {
    epsilon: f64,
}

impl Default for DifferentialEvaluator {
    fn default() -> Self {
        Self {
            epsilon: GRADIENT_EPSILON,
        }
    }
}

impl DifferentialEvaluator {
    pub fn new(epsilon: f64) -> Result<Self> {
        if !(epsilon.is_finite() && epsilon >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "gradient epsilon must be non-negative, got {}",
                epsilon
            )));
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Curvature from a gradient and Hessian.
    ///
    /// Returns an invalid sample for degenerate gradients and
    /// [`Error::NumericFault`] when the inputs produce non-finite curvature.
    pub fn evaluate(&self, gradient: &Vector3d, hessian: &Matrix3d) -> Result<CurvatureSample> {
        let norm = gradient.norm();
        if !(norm > self.epsilon) {
            return Ok(CurvatureSample::invalid());
        }

        let n = gradient / norm;
        let (t1, t2) = tangent_basis(&n);

        // Shape operator in the (t1, t2) basis
        let a = t1.dot(&(hessian * t1)) / norm;
        let b = t1.dot(&(hessian * t2)) / norm;
        let c = t2.dot(&(hessian * t2)) / norm;

        let half_sum = 0.5 * (a + c);
        let half_diff = 0.5 * (a - c);
        let root = half_diff.hypot(b);
        let k1 = half_sum + root;
        let k2 = half_sum - root;

        let theta = 0.5 * (2.0 * b).atan2(a - c);
        let (sin, cos) = theta.sin_cos();
        let dir1 = t1 * cos + t2 * sin;
        let dir2 = t2 * cos - t1 * sin;

        let sample = CurvatureSample {
            mean: 0.5 * (k1 + k2),
            gauss: k1 * k2,
            k1,
            k2,
            dir1,
            dir2,
            valid: true,
        };

        let finite = [sample.mean, sample.gauss, k1, k2]
            .iter()
            .chain(dir1.iter())
            .chain(dir2.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::NumericFault(format!(
                "non-finite curvature from gradient {:?}",
                gradient.as_slice()
            )));
        }
        Ok(sample)
    }

    /// Curvature of `surface` at `p`; invalid outside the support of the field
    pub fn evaluate_at<S: ImplicitSurface + ?Sized>(&self, surface: &S, p: &Point3d) -> Result<CurvatureSample> {
        let (Some(gradient), Some(hessian)) = (surface.gradient(p), surface.hessian(p)) else {
            return Ok(CurvatureSample::invalid());
        };
        self.evaluate(&gradient, &hessian)
    }
}

/// Orthonormal tangent vectors completing `n` into a right handed frame
fn tangent_basis(n: &Vector3d) -> (Vector3d, Vector3d) {
    let abs = n.abs();
    let axis = if abs.x <= abs.y && abs.x <= abs.z {
        Vector3d::x()
    } else if abs.y <= abs.z {
        Vector3d::y()
    } else {
        Vector3d::z()
    };
    let t1 = (axis - n * n.dot(&axis)).normalize();
    let t2 = n.cross(&t1);
    (t1, t2)
}

/// Values at the `low` and `high` fractions of the sorted finite values
pub fn percentile_range(values: &[f64], low: f64, high: f64) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let last = (sorted.len() - 1) as f64;
    let at = |fraction: f64| sorted[(fraction.clamp(0.0, 1.0) * last).round() as usize];
    Some((at(low), at(high)))
}

/// Red, yellow, green, cyan, blue ramp over `[min, max]`
pub fn quality_color(value: f64, min: f64, max: f64) -> [u8; 3] {
    const RAMP: [[f64; 3]; 5] = [
        [255.0, 0.0, 0.0],
        [255.0, 255.0, 0.0],
        [0.0, 255.0, 0.0],
        [0.0, 255.0, 255.0],
        [0.0, 0.0, 255.0],
    ];

    let t = if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let scaled = t * (RAMP.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(RAMP.len() - 2);
    let s = scaled - lower as f64;

    let mut color = [0u8; 3];
    for (channel, out) in color.iter_mut().enumerate() {
        let v = RAMP[lower][channel] * (1.0 - s) + RAMP[lower + 1][channel] * s;
        *out = v.round().clamp(0.0, 255.0) as u8;
    }
    color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implicit::AnalyticSphere;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_curvature() {
        let sphere = AnalyticSphere::new(Point3d::new(0.5, 0.0, -1.0), 2.0);
        let p = sphere.center + Vector3d::new(1.0, 1.0, 1.0).normalize() * 2.0;
        let sample = DifferentialEvaluator::default().evaluate_at(&sphere, &p).unwrap();

        assert!(sample.valid);
        assert_relative_eq!(sample.k1, 0.5, epsilon = 1e-4);
        assert_relative_eq!(sample.k2, 0.5, epsilon = 1e-4);
        assert_relative_eq!(sample.mean, 0.5, epsilon = 1e-4);
        assert_relative_eq!(sample.gauss, 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_cylinder_principal_directions() {
        // f = sqrt(x² + y²) - r at (r, 0, 0): gradient x, Hessian diag(0, 1/r, 0)
        let r = 4.0;
        let gradient = Vector3d::x();
        let hessian = Matrix3d::from_diagonal(&Vector3d::new(0.0, 1.0 / r, 0.0));
        let sample = DifferentialEvaluator::default().evaluate(&gradient, &hessian).unwrap();

        assert_relative_eq!(sample.k1, 0.25);
        assert_relative_eq!(sample.k2, 0.0);
        assert_relative_eq!(sample.gauss, 0.0);
        assert_relative_eq!(sample.dir1.dot(&Vector3d::y()).abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sample.dir2.dot(&Vector3d::z()).abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sample.dir1.dot(&gradient), 0.0, epsilon = 1e-12);
        assert_relative_eq!(sample.dir1.dot(&sample.dir2), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_gradient_is_invalid() {
        let evaluator = DifferentialEvaluator::default();
        let sample = evaluator.evaluate(&Vector3d::new(1e-10, 0.0, 0.0), &Matrix3d::identity()).unwrap();
        assert!(!sample.valid);
        assert_eq!(sample.value(CurvatureKind::Mean), None);
        assert!(sample.principal().is_none());
    }

    #[test]
    fn test_non_finite_hessian_is_a_fault() {
        let mut hessian = Matrix3d::identity();
        hessian[(1, 2)] = f64::NAN;
        let result = DifferentialEvaluator::default().evaluate(&Vector3d::z(), &hessian);
        assert!(matches!(result, Err(Error::NumericFault(_))));
    }

    #[test]
    fn test_sample_value_selection() {
        let sample = CurvatureSample {
            mean: 1.5,
            gauss: 2.0,
            k1: 2.0,
            k2: 1.0,
            dir1: Vector3d::x(),
            dir2: Vector3d::y(),
            valid: true,
        };
        assert_eq!(sample.value(CurvatureKind::Mean), Some(1.5));
        assert_eq!(sample.value(CurvatureKind::Gauss), Some(2.0));
        assert_eq!(sample.value(CurvatureKind::K1), Some(2.0));
        assert_eq!(sample.value(CurvatureKind::K2), Some(1.0));
        assert_eq!(sample.value(CurvatureKind::ApproxMean), None);
        assert!(!CurvatureKind::ApproxMean.uses_weingarten_map());
    }

    #[test]
    fn test_color_ramp_and_percentiles() {
        assert_eq!(quality_color(0.0, 0.0, 1.0), [255, 0, 0]);
        assert_eq!(quality_color(0.5, 0.0, 1.0), [0, 255, 0]);
        assert_eq!(quality_color(1.0, 0.0, 1.0), [0, 0, 255]);
        assert_eq!(quality_color(7.0, 0.0, 1.0), [0, 0, 255]);

        let values: Vec<f64> = (0..=100).map(|i| i as f64).chain([f64::NAN]).collect();
        assert_eq!(percentile_range(&values, 0.01, 0.99), Some((1.0, 99.0)));
        assert_eq!(percentile_range(&[], 0.01, 0.99), None);
    }
}
