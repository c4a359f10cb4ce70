//! Moving Least Squares (MLS) surfaces defined by oriented point sets
//!
//! Every sample `i` carries the compactly supported weight
//! `w_i(x) = (1 - |x - p_i|² / h_i²)^4` with `h_i = filter_scale * radius_i`.
//! The surface variants fit a local implicit function to the weighted
//! neighborhood of each evaluation point:
//!
//! - [`ApssSurface`]: algebraic sphere fit (APSS)
//! - [`RimlsSurface`]: robust implicit MLS with normal re-weighting (RIMLS)
//!
//! [`SurfaceModel`] selects one of them once at construction.

use crate::apss::{ApssConfig, ApssSurface};
use crate::implicit::ImplicitSurface;
use crate::parallel::parallel_bounding_box;
use crate::projection::{ProjectionResult, ProjectionSolver};
use crate::rimls::{RimlsConfig, RimlsSurface};
use mlsurf_algorithms::KdTree;
use mlsurf_core::{
    Drawable, Error, NearestNeighborSearch, Point3d, PointCloud, Result,
    SamplePoint, Vector3d,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FILTER_SCALE: f64 = 2.0;
pub const DEFAULT_PROJECTION_ACCURACY: f64 = 1e-4;
pub const DEFAULT_MAX_PROJECTION_ITERS: usize = 15;

/// Settings shared by every MLS variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlsConfig {
    /// Weight support as a multiple of the local point spacing
    pub filter_scale: f64,
    /// Projection stops when a step is shorter than this fraction of the spacing
    pub projection_accuracy: f64,
    pub max_projection_iters: usize,
}

impl Default for MlsConfig {
    fn default() -> Self {
        Self {
            filter_scale: DEFAULT_FILTER_SCALE,
            projection_accuracy: DEFAULT_PROJECTION_ACCURACY,
            max_projection_iters: DEFAULT_MAX_PROJECTION_ITERS,
        }
    }
}

impl MlsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.filter_scale.is_finite() && self.filter_scale > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "filter scale must be positive, got {}",
                self.filter_scale
            )));
        }
        if !(self.projection_accuracy.is_finite() && self.projection_accuracy > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "projection accuracy must be positive, got {}",
                self.projection_accuracy
            )));
        }
        if self.max_projection_iters == 0 {
            return Err(Error::InvalidArgument(
                "max projection iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fit used by a [`SurfaceModel`], with its specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MlsVariant {
    Apss(ApssConfig),
    Rimls(RimlsConfig),
}

impl Default for MlsVariant {
    fn default() -> Self {
        MlsVariant::Apss(ApssConfig::default())
    }
}

/// A sample inside the support of an evaluation point
#[derive(Debug, Clone, Copy)]
pub(crate) struct WeightedNeighbor {
    pub index: usize,
    /// `x - p_i`
    pub offset: Vector3d,
    pub weight: f64,
    /// Gradient of the weight with respect to `x` (zero unless requested)
    pub weight_gradient: Vector3d,
}

/// Samples of an MLS surface with their weight supports, indexed for ball queries
pub(crate) struct SampleSet {
    pub positions: Vec<Point3d>,
    /// Unit normals, zero for samples without one
    pub normals: Vec<Vector3d>,
    support2: Vec<f64>,
    max_support: f64,
    average_spacing: f64,
    bounds: (Point3d, Point3d),
    tree: KdTree,
}

impl SampleSet {
    pub fn new(cloud: &PointCloud<SamplePoint>, filter_scale: f64) -> Result<Self> {
        if cloud.is_empty() {
            return Err(Error::InvalidArgument("point set is empty".to_string()));
        }

        if let Some((idx, point)) = cloud
            .iter()
            .enumerate()
            .find(|(_, p)| !(p.radius.is_finite() && p.radius >= 0.0))
        {
            return Err(Error::InvalidArgument(format!(
                "point {} has invalid radius {}",
                idx, point.radius
            )));
        }

        let positions = cloud.positions();
        let tree = KdTree::new(&positions)?;
        let bounds = parallel_bounding_box(&positions)
            .ok_or_else(|| Error::InvalidArgument("sample cloud is empty".to_string()))?;

        let normals: Vec<Vector3d> = cloud
            .iter()
            .map(|p| {
                p.normal
                    .and_then(|n| n.try_normalize(f64::MIN_POSITIVE))
                    .unwrap_or_else(Vector3d::zeros)
            })
            .collect();

        let support2: Vec<f64> = cloud
            .iter()
            .map(|p| (filter_scale * p.radius).powi(2))
            .collect();
        let max_support = cloud
            .iter()
            .map(|p| filter_scale * p.radius)
            .fold(0.0, f64::max);
        if max_support <= 0.0 {
            return Err(Error::InvalidArgument(
                "point radii are not set; estimate the point spacing first".to_string(),
            ));
        }

        Ok(Self {
            bounds,
            positions,
            normals,
            support2,
            max_support,
            average_spacing: cloud.average_radius(),
            tree,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn average_spacing(&self) -> f64 {
        self.average_spacing
    }

    pub fn bounds(&self) -> (Point3d, Point3d) {
        self.bounds
    }

    /// Samples whose support contains `x`
    pub fn neighborhood(&self, x: &Point3d, with_gradients: bool) -> Vec<WeightedNeighbor> {
        self.tree
            .find_radius_neighbors(x, self.max_support)
            .into_iter()
            .filter_map(|(index, _)| {
                let offset = x - self.positions[index];
                let h2 = self.support2[index];
                let d2 = offset.norm_squared();
                if d2 >= h2 {
                    return None;
                }

                let s = 1.0 - d2 / h2;
                let s3 = s * s * s;
                let weight_gradient = if with_gradients {
                    offset * (-8.0 * s3 / h2)
                } else {
                    Vector3d::zeros()
                };
                Some(WeightedNeighbor {
                    index,
                    offset,
                    weight: s3 * s,
                    weight_gradient,
                })
            })
            .collect()
    }
}

/// An MLS surface of either variant, chosen once at construction
pub enum SurfaceModel {
    Apss(ApssSurface),
    Rimls(RimlsSurface),
}

impl SurfaceModel {
    /// Build the surface of `cloud`. Every sample needs a radius; RIMLS also needs normals.
    pub fn new(
        cloud: &PointCloud<SamplePoint>,
        config: &MlsConfig,
        variant: &MlsVariant,
    ) -> Result<Self> {
        Ok(match variant {
            MlsVariant::Apss(apss) => SurfaceModel::Apss(ApssSurface::new(cloud, config, apss.clone())?),
            MlsVariant::Rimls(rimls) => {
                SurfaceModel::Rimls(RimlsSurface::new(cloud, config, rimls.clone())?)
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SurfaceModel::Apss(_) => "APSS",
            SurfaceModel::Rimls(_) => "RIMLS",
        }
    }

    pub fn config(&self) -> &MlsConfig {
        match self {
            SurfaceModel::Apss(surface) => surface.config(),
            SurfaceModel::Rimls(surface) => surface.config(),
        }
    }

    pub fn solver(&self) -> &ProjectionSolver {
        match self {
            SurfaceModel::Apss(surface) => surface.solver(),
            SurfaceModel::Rimls(surface) => surface.solver(),
        }
    }

    pub fn sample_count(&self) -> usize {
        match self {
            SurfaceModel::Apss(surface) => surface.sample_count(),
            SurfaceModel::Rimls(surface) => surface.sample_count(),
        }
    }

    /// Project `p` onto the surface with the model's own iteration settings
    pub fn project(&self, p: &Point3d, want_normal: bool) -> ProjectionResult {
        self.solver().project(self, p, want_normal)
    }

    /// Reciprocal signed radius of the fitted sphere; only APSS provides it
    pub fn approx_mean_curvature(&self, p: &Point3d) -> Option<f64> {
        match self {
            SurfaceModel::Apss(surface) => surface.approx_mean_curvature(p),
            SurfaceModel::Rimls(_) => None,
        }
    }
}

impl ImplicitSurface for SurfaceModel {
    fn potential_and_gradient(&self, p: &Point3d) -> Option<(f64, Vector3d)> {
        match self {
            SurfaceModel::Apss(surface) => surface.potential_and_gradient(p),
            SurfaceModel::Rimls(surface) => surface.potential_and_gradient(p),
        }
    }

    fn length_scale(&self) -> f64 {
        match self {
            SurfaceModel::Apss(surface) => surface.length_scale(),
            SurfaceModel::Rimls(surface) => surface.length_scale(),
        }
    }

    fn evaluate(&self, p: &Point3d) -> Option<f64> {
        match self {
            SurfaceModel::Apss(surface) => surface.evaluate(p),
            SurfaceModel::Rimls(surface) => surface.evaluate(p),
        }
    }

    fn normal(&self, p: &Point3d) -> Option<Vector3d> {
        match self {
            SurfaceModel::Apss(surface) => surface.normal(p),
            SurfaceModel::Rimls(surface) => surface.normal(p),
        }
    }
}

impl Drawable for SurfaceModel {
    fn bounding_box(&self) -> (Point3d, Point3d) {
        match self {
            SurfaceModel::Apss(surface) => surface.bounds(),
            SurfaceModel::Rimls(surface) => surface.bounds(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mlsurf_algorithms::{estimate_radii, DEFAULT_SPACING_NEIGHBORS};
    use std::f64::consts::PI;

    /// Fibonacci sampling of a sphere with outward normals and estimated radii
    pub(crate) fn sphere_cloud(count: usize, radius: f64, center: Point3d) -> PointCloud<SamplePoint> {
        let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
        let mut cloud: PointCloud<SamplePoint> = (0..count)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
                let r = (1.0 - z * z).sqrt();
                let theta = golden_angle * i as f64;
                let direction = Vector3d::new(r * theta.cos(), r * theta.sin(), z);
                SamplePoint::with_normal(center + direction * radius, direction)
            })
            .collect();
        estimate_radii(&mut cloud, DEFAULT_SPACING_NEIGHBORS).unwrap();
        cloud
    }

    #[test]
    fn test_config_validation() {
        assert!(MlsConfig::default().validate().is_ok());

        let bad_scale = MlsConfig {
            filter_scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_scale.validate(), Err(Error::InvalidArgument(_))));

        let bad_iters = MlsConfig {
            max_projection_iters: 0,
            ..Default::default()
        };
        assert!(matches!(bad_iters.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_weight_kernel() {
        let cloud: PointCloud<SamplePoint> = vec![
            SamplePoint::with_normal(Point3d::origin(), Vector3d::z()).with_radius(0.5),
        ]
        .into_iter()
        .collect();
        let samples = SampleSet::new(&cloud, 2.0).unwrap();

        // Full weight on the sample, nothing at the support boundary
        let at_center = samples.neighborhood(&Point3d::origin(), true);
        assert_relative_eq!(at_center[0].weight, 1.0);
        assert!(samples.neighborhood(&Point3d::new(1.0, 0.0, 0.0), true).is_empty());

        // Analytic weight gradient against central differences
        let x = Point3d::new(0.3, -0.2, 0.1);
        let nb = samples.neighborhood(&x, true)[0];
        let h = 1e-6;
        for axis in 0..3 {
            let mut offset = Vector3d::zeros();
            offset[axis] = h;
            let forward = samples.neighborhood(&(x + offset), false)[0].weight;
            let backward = samples.neighborhood(&(x - offset), false)[0].weight;
            assert_relative_eq!(nb.weight_gradient[axis], (forward - backward) / (2.0 * h), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sample_set_validation() {
        let empty = PointCloud::<SamplePoint>::new();
        assert!(matches!(SampleSet::new(&empty, 2.0), Err(Error::InvalidArgument(_))));

        let no_radii: PointCloud<SamplePoint> =
            vec![SamplePoint::new(Point3d::origin())].into_iter().collect();
        assert!(matches!(SampleSet::new(&no_radii, 2.0), Err(Error::InvalidArgument(_))));

        let negative: PointCloud<SamplePoint> =
            vec![SamplePoint::new(Point3d::origin()).with_radius(-1.0)].into_iter().collect();
        assert!(matches!(SampleSet::new(&negative, 2.0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_model_dispatch() {
        let cloud = sphere_cloud(400, 1.0, Point3d::origin());
        let config = MlsConfig::default();

        let apss = SurfaceModel::new(&cloud, &config, &MlsVariant::default()).unwrap();
        let rimls =
            SurfaceModel::new(&cloud, &config, &MlsVariant::Rimls(RimlsConfig::default())).unwrap();
        assert_eq!(apss.name(), "APSS");
        assert_eq!(rimls.name(), "RIMLS");
        assert_eq!(apss.sample_count(), 400);

        let p = Point3d::new(0.0, 0.0, 1.0);
        assert!(apss.approx_mean_curvature(&p).is_some());
        assert!(rimls.approx_mean_curvature(&p).is_none());

        // Far away from every sample the field is undefined
        let far = Point3d::new(10.0, 0.0, 0.0);
        assert!(apss.evaluate(&far).is_none());
        assert!(rimls.evaluate(&far).is_none());

        let (min, max) = apss.bounding_box();
        assert!(min.z < -0.99 && max.z > 0.99);
    }

    #[test]
    fn test_rimls_requires_normals() {
        let mut cloud = sphere_cloud(100, 1.0, Point3d::origin());
        cloud[7].normal = None;
        let result = SurfaceModel::new(
            &cloud,
            &MlsConfig::default(),
            &MlsVariant::Rimls(RimlsConfig::default()),
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
