//! Robust implicit moving least squares (RIMLS)
//!
//! The field at `x` is the weighted average of the signed distances from `x`
//! to the tangent planes of the neighboring samples. After a first fit the
//! weights are refined with a Gaussian on the difference between each
//! sample normal and the current gradient, so that samples across a sharp
//! feature stop pulling the surface towards them.

use crate::implicit::ImplicitSurface;
use crate::moving_least_squares::{MlsConfig, SampleSet};
use crate::projection::ProjectionSolver;
use mlsurf_core::{Error, Point3d, PointCloud, Result, SamplePoint, Vector3d};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIGMA_N: f64 = 0.75;
pub const DEFAULT_MAX_REFITTING_ITERS: usize = 3;
pub const DEFAULT_MIN_REFITTING_ITERS: usize = 1;
pub const DEFAULT_REFITTING_THRESHOLD: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RimlsConfig {
    /// Width of the normal agreement kernel
    pub sigma_n: f64,
    /// Fits per evaluation; 0 and 1 both give plain implicit MLS
    pub max_refitting_iters: usize,
    pub min_refitting_iters: usize,
    /// Squared gradient change below which refitting stops early
    pub refitting_threshold: f64,
}

impl Default for RimlsConfig {
    fn default() -> Self {
        Self {
            sigma_n: DEFAULT_SIGMA_N,
            max_refitting_iters: DEFAULT_MAX_REFITTING_ITERS,
            min_refitting_iters: DEFAULT_MIN_REFITTING_ITERS,
            refitting_threshold: DEFAULT_REFITTING_THRESHOLD,
        }
    }
}

impl RimlsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma_n.is_finite() && self.sigma_n > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "sigma_n must be positive, got {}",
                self.sigma_n
            )));
        }
        if !(self.refitting_threshold.is_finite() && self.refitting_threshold >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "refitting threshold must be non-negative, got {}",
                self.refitting_threshold
            )));
        }
        Ok(())
    }
}

/// RIMLS surface over an immutable set of oriented samples
pub struct RimlsSurface {
    samples: SampleSet,
    config: MlsConfig,
    rimls: RimlsConfig,
    solver: ProjectionSolver,
}

impl RimlsSurface {
    /// Every sample must carry a normal
    pub fn new(cloud: &PointCloud<SamplePoint>, config: &MlsConfig, rimls: RimlsConfig) -> Result<Self> {
        config.validate()?;
        rimls.validate()?;
        let samples = SampleSet::new(cloud, config.filter_scale)?;
        if let Some(idx) = cloud.iter().position(|p| !p.has_normal()) {
            return Err(Error::InvalidArgument(format!(
                "RIMLS requires a normal on every point; point {} has none",
                idx
            )));
        }

        Ok(Self {
            samples,
            solver: ProjectionSolver::from_config(config)?,
            config: config.clone(),
            rimls,
        })
    }

    pub fn config(&self) -> &MlsConfig {
        &self.config
    }

    pub fn rimls_config(&self) -> &RimlsConfig {
        &self.rimls
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
}

impl ImplicitSurface for RimlsSurface {
    fn potential_and_gradient(&self, p: &Point3d) -> Option<(f64, Vector3d)> {
        let neighbors = self.samples.neighborhood(p, true);
        if neighbors.is_empty() {
            return None;
        }

        let inv_sigma2 = 1.0 / (self.rimls.sigma_n * self.rimls.sigma_n);
        let max_iters = self.rimls.max_refitting_iters.max(1);
        let mut potential = 0.0;
        let mut gradient = Vector3d::zeros();
        let mut iteration = 0;

        loop {
            let previous = gradient;
            let mut sum_w = 0.0;
            let mut sum_wf = 0.0;
            let mut sum_gw = Vector3d::zeros();
            let mut sum_gwf = Vector3d::zeros();
            let mut sum_wn = Vector3d::zeros();

            for nb in &neighbors {
                let normal = self.samples.normals[nb.index];
                let f = nb.offset.dot(&normal);
                let refit = if iteration > 0 {
                    (-(normal - previous).norm_squared() * inv_sigma2).exp()
                } else {
                    1.0
                };
                let w = nb.weight * refit;
                let gw = nb.weight_gradient * refit;

                sum_w += w;
                sum_wf += w * f;
                sum_gw += gw;
                sum_gwf += gw * f;
                sum_wn += normal * w;
            }

            if sum_w <= 0.0 {
                if iteration == 0 {
                    return None;
                }
                break;
            }

            potential = sum_wf / sum_w;
            gradient = (sum_gwf - sum_gw * potential + sum_wn) / sum_w;
            iteration += 1;

            if iteration >= max_iters
                || (iteration >= self.rimls.min_refitting_iters
                    && (gradient - previous).norm_squared() <= self.rimls.refitting_threshold)
            {
                break;
            }
        }

        Some((potential, gradient))
    }

    fn length_scale(&self) -> f64 {
        self.samples.average_spacing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moving_least_squares::tests::sphere_cloud;
    use approx::assert_relative_eq;

    fn plane_with_crease(half: usize, spacing: f64) -> PointCloud<SamplePoint> {
        // Two half planes meeting at a right angle along the y axis
        let mut cloud = PointCloud::new();
        for i in 0..half {
            for j in 0..(2 * half) {
                let a = (i as f64 + 0.5) * spacing;
                let y = (j as f64 - half as f64 + 0.37) * spacing;
                cloud.push(
                    SamplePoint::with_normal(Point3d::new(-a, y, 0.0), Vector3d::z())
                        .with_radius(spacing),
                );
                cloud.push(
                    SamplePoint::with_normal(Point3d::new(0.0, y, -a), -Vector3d::x())
                        .with_radius(spacing),
                );
            }
        }
        cloud
    }

    #[test]
    fn test_field_on_a_plane() {
        let cloud = plane_with_crease(12, 0.1);
        let surface =
            RimlsSurface::new(&cloud, &MlsConfig::default(), RimlsConfig::default()).unwrap();

        // Far from the crease only the horizontal half plane contributes
        let (value, gradient) = surface
            .potential_and_gradient(&Point3d::new(-0.6, 0.05, 0.04))
            .unwrap();
        assert_relative_eq!(value, 0.04, epsilon = 1e-9);
        assert_relative_eq!(gradient, Vector3d::z(), epsilon = 1e-9);
    }

    #[test]
    fn test_refitting_sharpens_creases() {
        let cloud = plane_with_crease(12, 0.1);
        let x = Point3d::new(-0.05, 0.02, 0.01);

        let plain = RimlsSurface::new(
            &cloud,
            &MlsConfig::default(),
            RimlsConfig {
                max_refitting_iters: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let robust = RimlsSurface::new(
            &cloud,
            &MlsConfig::default(),
            RimlsConfig {
                max_refitting_iters: 10,
                min_refitting_iters: 10,
                sigma_n: 0.5,
                ..Default::default()
            },
        )
        .unwrap();

        // Closer to the horizontal half plane; refitting should favour its normal
        let plain_normal = plain.normal(&x).unwrap();
        let robust_normal = robust.normal(&x).unwrap();
        assert!(robust_normal.z > plain_normal.z);
    }

    #[test]
    fn test_sphere_field_sign() {
        let cloud = sphere_cloud(600, 1.0, Point3d::origin());
        let surface =
            RimlsSurface::new(&cloud, &MlsConfig::default(), RimlsConfig::default()).unwrap();

        assert!(surface.evaluate(&Point3d::new(0.0, 0.0, 1.05)).unwrap() > 0.0);
        assert!(surface.evaluate(&Point3d::new(0.0, 0.0, 0.95)).unwrap() < 0.0);
        assert!(surface.evaluate(&Point3d::origin()).is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(RimlsConfig::default().validate().is_ok());
        let bad = RimlsConfig {
            sigma_n: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidArgument(_))));
    }
}
