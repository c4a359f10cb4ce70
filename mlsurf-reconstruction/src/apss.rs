//! Algebraic point set surfaces (APSS)
//!
//! Around every evaluation point `x` an algebraic sphere
//! `s(y) = u0 + u1·(y - x) + u4 |y - x|²` is fitted to the weighted positions
//! and normals of the neighborhood. The field value at `x` is `u0`.
//!
//! The spherical parameter scales the quadratic term: 0 restricts the fit to
//! planes, 1 fits full spheres. Plane fits also happen whenever the
//! neighborhood has no spread to fit a sphere to.

use crate::implicit::{ImplicitSurface, GRADIENT_EPSILON};
use crate::moving_least_squares::{MlsConfig, SampleSet, WeightedNeighbor};
use crate::projection::ProjectionSolver;
use mlsurf_core::{Error, Matrix3d, Point3d, PointCloud, Result, SamplePoint, Vector3d};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_SPHERICAL_PARAMETER: f64 = 1.0;

/// Quadratic coefficients below this magnitude describe a plane
const PLANE_EPSILON: f64 = 1e-7;

/// Relative spread of the neighborhood below which no sphere is fitted
const SPREAD_EPSILON: f64 = 1e-12;

/// How output normals are derived from an APSS fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientHint {
    /// Exact derivative of the MLS field, weight derivatives included
    #[default]
    Accurate,
    /// Gradient of the fitted sphere at the evaluation point
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApssConfig {
    pub spherical_parameter: f64,
    pub gradient_hint: GradientHint,
}

impl Default for ApssConfig {
    fn default() -> Self {
        Self {
            spherical_parameter: DEFAULT_SPHERICAL_PARAMETER,
            gradient_hint: GradientHint::Accurate,
        }
    }
}

impl ApssConfig {
    /// Any finite spherical parameter is accepted; values outside [0, 1] may fit unstably
    pub fn validate(&self) -> Result<()> {
        if !self.spherical_parameter.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "spherical parameter must be finite, got {}",
                self.spherical_parameter
            )));
        }
        Ok(())
    }
}

/// Algebraic sphere `u0 + u1·(y - origin) + u4 |y - origin|²`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgebraicSphere {
    pub origin: Point3d,
    pub constant: f64,
    pub linear: Vector3d,
    pub quadratic: f64,
}

impl AlgebraicSphere {
    pub fn value(&self, y: &Point3d) -> f64 {
        let d = y - self.origin;
        self.constant + self.linear.dot(&d) + self.quadratic * d.norm_squared()
    }

    pub fn gradient(&self, y: &Point3d) -> Vector3d {
        self.linear + (y - self.origin) * (2.0 * self.quadratic)
    }

    pub fn is_plane(&self) -> bool {
        self.quadratic.abs() <= PLANE_EPSILON
    }

    pub fn center(&self) -> Option<Point3d> {
        if self.is_plane() {
            return None;
        }
        Some(self.origin + self.linear * (-0.5 / self.quadratic))
    }

    /// Radius of the zero set, `None` for planes and imaginary spheres
    pub fn radius(&self) -> Option<f64> {
        if self.is_plane() {
            return None;
        }
        let local_center = self.linear * (-0.5 / self.quadratic);
        let r2 = local_center.norm_squared() - self.constant / self.quadratic;
        (r2 > 0.0).then(|| r2.sqrt())
    }

    /// Reciprocal of the signed radius, positive for spheres whose field grows outwards
    pub fn mean_curvature(&self) -> f64 {
        match self.radius() {
            Some(radius) => self.quadratic.signum() / radius,
            None => 0.0,
        }
    }
}

/// APSS surface over an immutable set of samples
pub struct ApssSurface {
    samples: SampleSet,
    config: MlsConfig,
    apss: ApssConfig,
    solver: ProjectionSolver,
}

impl ApssSurface {
    pub fn new(cloud: &PointCloud<SamplePoint>, config: &MlsConfig, apss: ApssConfig) -> Result<Self> {
        config.validate()?;
        apss.validate()?;
        let samples = SampleSet::new(cloud, config.filter_scale)?;
        if !cloud.has_normals() {
            warn!(
                "APSS fit over {} points without normals on every point; those points only constrain positions",
                cloud.len()
            );
        }

        Ok(Self {
            samples,
            solver: ProjectionSolver::from_config(config)?,
            config: config.clone(),
            apss,
        })
    }

    pub fn config(&self) -> &MlsConfig {
        &self.config
    }

    pub fn apss_config(&self) -> &ApssConfig {
        &self.apss
    }

    pub fn solver(&self) -> &ProjectionSolver {
        &self.solver
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn bounds(&self) -> (Point3d, Point3d) {
        self.samples.bounds()
    }

    /// Sphere fitted at `x`, `None` outside the support of every sample
    pub fn fit(&self, x: &Point3d) -> Option<AlgebraicSphere> {
        let neighbors = self.samples.neighborhood(x, false);
        self.fit_neighborhood(x, &neighbors).map(|(sphere, _)| sphere)
    }

    /// Mean curvature of the sphere fitted at `p`; planes give 0
    pub fn approx_mean_curvature(&self, p: &Point3d) -> Option<f64> {
        self.fit(p).map(|sphere| sphere.mean_curvature())
    }

    fn fit_neighborhood(
        &self,
        x: &Point3d,
        neighbors: &[WeightedNeighbor],
    ) -> Option<(AlgebraicSphere, FitMoments)> {
        let mut m = FitMoments::default();
        for nb in neighbors {
            let q = -nb.offset;
            let n = self.samples.normals[nb.index];
            m.w += nb.weight;
            m.p += q * nb.weight;
            m.n += n * nb.weight;
            m.pn += q.dot(&n) * nb.weight;
            m.pp += q.norm_squared() * nb.weight;
        }
        if m.w <= 0.0 {
            return None;
        }

        let beta = self.apss.spherical_parameter;
        let inv_w = 1.0 / m.w;
        m.num = m.pn - inv_w * m.p.dot(&m.n);
        m.den = m.pp - inv_w * m.p.norm_squared();
        m.spherical = beta != 0.0 && m.den > SPREAD_EPSILON * m.pp;

        let u4 = if m.spherical {
            0.5 * beta * m.num / m.den
        } else {
            0.0
        };
        let u1 = (m.n - m.p * (2.0 * u4)) * inv_w;
        let u0 = -(u1.dot(&m.p) + u4 * m.pp) * inv_w;

        Some((
            AlgebraicSphere {
                origin: *x,
                constant: u0,
                linear: u1,
                quadratic: u4,
            },
            m,
        ))
    }

    /// Gradient of `u0` with the fit frame held at `x`; the weights are the only
    /// quantities that move with the evaluation point.
    fn constant_gradient(
        &self,
        neighbors: &[WeightedNeighbor],
        sphere: &AlgebraicSphere,
        m: &FitMoments,
    ) -> Vector3d {
        let mut dw = Vector3d::zeros();
        let mut dp = Matrix3d::zeros();
        let mut dn = Matrix3d::zeros();
        let mut dpn = Vector3d::zeros();
        let mut dpp = Vector3d::zeros();
        for nb in neighbors {
            let q = -nb.offset;
            let n = self.samples.normals[nb.index];
            let g = nb.weight_gradient;
            dw += g;
            dp += q * g.transpose();
            dn += n * g.transpose();
            dpn += g * q.dot(&n);
            dpp += g * q.norm_squared();
        }

        let inv_w = 1.0 / m.w;
        let d_inv_w = -dw * (inv_w * inv_w);
        let (u1, u4) = (sphere.linear, sphere.quadratic);

        let d_u4 = if m.spherical {
            let d_num = dpn
                - d_inv_w * m.p.dot(&m.n)
                - (dp.transpose() * m.n + dn.transpose() * m.p) * inv_w;
            let d_den = dpp - d_inv_w * m.p.norm_squared() - dp.transpose() * m.p * (2.0 * inv_w);
            (d_num * m.den - d_den * m.num) * (0.5 * self.apss.spherical_parameter / (m.den * m.den))
        } else {
            Vector3d::zeros()
        };

        let j_u1 = (dn - m.p * d_u4.transpose() * 2.0 - dp * (2.0 * u4)) * inv_w
            + (m.n - m.p * (2.0 * u4)) * d_inv_w.transpose();

        -d_inv_w * (u1.dot(&m.p) + u4 * m.pp)
            - (j_u1.transpose() * m.p + dp.transpose() * u1 + d_u4 * m.pp + dpp * u4) * inv_w
    }
}

/// Weighted moments of a neighborhood in the frame of the evaluation point
#[derive(Debug, Default)]
struct FitMoments {
    w: f64,
    p: Vector3d,
    n: Vector3d,
    pn: f64,
    pp: f64,
    num: f64,
    den: f64,
    spherical: bool,
}

impl ImplicitSurface for ApssSurface {
    fn potential_and_gradient(&self, p: &Point3d) -> Option<(f64, Vector3d)> {
        let neighbors = self.samples.neighborhood(p, true);
        let (sphere, moments) = self.fit_neighborhood(p, &neighbors)?;
        let gradient = self.constant_gradient(&neighbors, &sphere, &moments) + sphere.linear;
        Some((sphere.constant, gradient))
    }

    fn length_scale(&self) -> f64 {
        self.samples.average_spacing()
    }

    fn evaluate(&self, p: &Point3d) -> Option<f64> {
        self.fit(p).map(|sphere| sphere.constant)
    }

    fn normal(&self, p: &Point3d) -> Option<Vector3d> {
        let gradient = match self.apss.gradient_hint {
            GradientHint::Accurate => self.gradient(p)?,
            GradientHint::Approximate => self.fit(p)?.linear,
        };
        gradient.try_normalize(GRADIENT_EPSILON)
    }
}
