//! Per-point spacing (radius) estimation from local neighbor density
//!
//! The radius of a point is `2 * d_k / sqrt(k)`, where `d_k` is the distance to
//! its k-th nearest neighbor. On a uniformly sampled surface the disc of radius
//! `d_k` holds about `k` samples, so this tracks the local sample spacing while
//! staying insensitive to a single close neighbor.

use crate::nearest_neighbor::KdTree;
use mlsurf_core::{Error, NearestNeighborSearch, Point3d, PointCloud, Result, SamplePoint};
use rayon::prelude::*;
use tracing::debug;

/// Neighbor count used when the caller does not choose one
pub const DEFAULT_SPACING_NEIGHBORS: usize = 16;

/// Estimate the local spacing of every point from its `k` nearest neighbors.
///
/// # Arguments
/// * `points` - Positions to analyse
/// * `k` - Number of neighbors (not counting the point itself)
///
/// # Returns
/// * `Result<Vec<f64>>` - One radius per input point
pub fn estimate_point_spacing(points: &[Point3d], k: usize) -> Result<Vec<f64>> {
    if k == 0 {
        return Err(Error::InvalidArgument(
            "spacing estimation needs at least one neighbor".to_string(),
        ));
    }
    if points.len() < k + 1 {
        return Err(Error::InvalidArgument(format!(
            "spacing estimation with k = {} needs at least {} points, got {}",
            k,
            k + 1,
            points.len()
        )));
    }

    let tree = KdTree::new(points)?;
    let scale = 2.0 / (k as f64).sqrt();

    // The query point itself comes back among the k + 1 results
    let radii: Vec<f64> = points
        .par_iter()
        .map(|p| {
            let neighbors = tree.find_k_nearest(p, k + 1);
            let farthest = neighbors.last().map_or(0.0, |&(_, d)| d);
            scale * farthest
        })
        .collect();

    if tracing::enabled!(tracing::Level::DEBUG) {
        let mean = radii.iter().sum::<f64>() / radii.len() as f64;
        let (min, max) = radii
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| (lo.min(r), hi.max(r)));
        debug!(points = points.len(), k, mean, min, max, "estimated point spacing");
    }

    Ok(radii)
}

/// Estimate and store the radius of every sample of a cloud
pub fn estimate_radii(cloud: &mut PointCloud<SamplePoint>, k: usize) -> Result<()> {
    let radii = estimate_point_spacing(&cloud.positions(), k)?;
    for (point, radius) in cloud.iter_mut().zip(radii) {
        point.radius = radius;
    }
    Ok(())
}
