//! Core traits for mlsurf

use crate::{mesh::*, point::*, point_cloud::*};

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point, closest first
    fn find_k_nearest(&self, query: &Point3d, k: usize) -> Vec<(usize, f64)>;

    /// Find all neighbors within a given radius (unordered)
    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(usize, f64)>;
}

/// Trait for objects occupying a region of space
pub trait Drawable {
    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3d, Point3d);

    /// Get the center point of the object
    fn center(&self) -> Point3d {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }
}

/// Axis aligned bounds of a set of positions; the origin twice when empty
pub fn bounding_box_of<'a, I>(positions: I) -> (Point3d, Point3d)
where
    I: IntoIterator<Item = &'a Point3d>,
{
    let mut iter = positions.into_iter();
    let Some(first) = iter.next() else {
        return (Point3d::origin(), Point3d::origin());
    };

    let mut min = *first;
    let mut max = *first;
    for p in iter {
        min = min.inf(p);
        max = max.sup(p);
    }
    (min, max)
}

impl Drawable for PointCloud<SamplePoint> {
    fn bounding_box(&self) -> (Point3d, Point3d) {
        bounding_box_of(self.points.iter().map(|p| &p.position))
    }
}

impl Drawable for TriangleMesh {
    fn bounding_box(&self) -> (Point3d, Point3d) {
        bounding_box_of(&self.vertices)
    }
}
