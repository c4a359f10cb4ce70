//! Point cloud data structures and functionality

use crate::mesh::TriangleMesh;
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A generic point cloud container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A cloud of surface samples, the input of every MLS surface
pub type SampleCloud = PointCloud<SamplePoint>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
        }
    }

    /// Create a new point cloud with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Get a mutable iterator over the points
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.points.iter_mut()
    }

    /// Clear all points from the cloud
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Reserve capacity for additional points
    pub fn reserve(&mut self, additional: usize) {
        self.points.reserve(additional);
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IndexMut<usize> for PointCloud<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut PointCloud<T> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter_mut()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

impl PointCloud<SamplePoint> {
    /// Build samples from the vertices of a mesh, carrying its normals and radii if present
    pub fn from_mesh(mesh: &TriangleMesh) -> Self {
        mesh.vertices
            .iter()
            .enumerate()
            .map(|(i, position)| SamplePoint {
                position: *position,
                normal: mesh.normals.as_ref().and_then(|normals| normals.get(i)).copied(),
                radius: mesh
                    .radii
                    .as_ref()
                    .and_then(|radii| radii.get(i))
                    .copied()
                    .unwrap_or(0.0),
            })
            .collect()
    }

    /// Positions of all samples
    pub fn positions(&self) -> Vec<Point3d> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Whether every sample carries a normal
    pub fn has_normals(&self) -> bool {
        self.points.iter().all(|p| p.normal.is_some())
    }

    /// Whether every sample carries a positive radius
    pub fn has_radii(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.radius > 0.0)
    }

    /// Mean radius over all samples, zero for an empty cloud
    pub fn average_radius(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.radius).sum::<f64>() / self.points.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_cloud_basics() {
        let mut cloud = SampleCloud::new();
        assert!(cloud.is_empty());
        cloud.push(SamplePoint::new(Point3d::new(0.0, 0.0, 0.0)).with_radius(1.0));
        cloud.push(SamplePoint::new(Point3d::new(1.0, 0.0, 0.0)).with_radius(3.0));
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud[1].position.x, 1.0);
        assert!(cloud.has_radii());
        assert!(!cloud.has_normals());
        assert_eq!(cloud.average_radius(), 2.0);
    }

    #[test]
    fn test_from_mesh_carries_attributes() {
        let mut mesh = TriangleMesh::from_points(vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ]);
        mesh.set_normals(vec![Vector3d::z(), Vector3d::z()]);
        mesh.set_radii(vec![0.25, 0.5]);

        let cloud = SampleCloud::from_mesh(&mesh);
        assert_eq!(cloud.len(), 2);
        assert!(cloud.has_normals());
        assert_eq!(cloud[1].radius, 0.5);
        assert_eq!(cloud.positions()[1], Point3d::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_from_mesh_without_radii() {
        let mesh = TriangleMesh::from_points(vec![Point3d::origin()]);
        let cloud = SampleCloud::from_mesh(&mesh);
        assert!(!cloud.has_radii());
        assert!(cloud[0].normal.is_none());
    }
}
