//! Nearest neighbor search implementations

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use mlsurf_core::{Error, NearestNeighborSearch, Point3d, Result};

/// KD-Tree for nearest neighbor search, backed by `kiddo`.
///
/// The tree is built once from a slice and balanced on construction, so any
/// number of points may share a coordinate (planar or axis aligned input).
pub struct KdTree {
    tree: Option<ImmutableKdTree<f64, 3>>,
    len: usize,
}

impl KdTree {
    /// Build a tree over `points`; item ids are the slice indices.
    ///
    /// Fails on non-finite coordinates.
    pub fn new(points: &[Point3d]) -> Result<Self> {
        if let Some(idx) = points
            .iter()
            .position(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(Error::InvalidArgument(format!(
                "point {} has non-finite coordinates",
                idx
            )));
        }

        let entries: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        let tree = (!entries.is_empty()).then(|| ImmutableKdTree::new_from_slice(&entries));

        Ok(Self {
            tree,
            len: points.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl NearestNeighborSearch for KdTree {
    fn find_k_nearest(&self, query: &Point3d, k: usize) -> Vec<(usize, f64)> {
        let Some(tree) = self.tree.as_ref().filter(|_| k > 0) else {
            return Vec::new();
        };

        tree.nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], std::num::NonZeroUsize::new(k.min(self.len)).expect("k > 0 and tree non-empty"))
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(usize, f64)> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }

        tree.within_unsorted::<SquaredEuclidean>(&[query.x, query.y, query.z], radius * radius)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .collect()
    }
}

/// Simple brute force nearest neighbor search for small datasets
pub struct BruteForceSearch {
    points: Vec<Point3d>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3d]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3d, k: usize) -> Vec<(usize, f64)> {
        let mut distances: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| (idx, (point - query).norm()))
            .collect();

        // Sort by distance and take k nearest
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        distances.truncate(k);
        distances
    }

    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(usize, f64)> {
        let radius_squared = radius * radius;
        self.points
            .iter()
            .enumerate()
            .filter_map(|(idx, point)| {
                let distance_squared = (point - query).norm_squared();
                (distance_squared <= radius_squared).then(|| (idx, distance_squared.sqrt()))
            })
            .collect()
    }
}
