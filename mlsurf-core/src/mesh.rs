//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Principal curvatures and directions attached to a vertex
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PrincipalCurvature {
    pub k1: f64,
    pub k2: f64,
    pub dir1: Vector3d,
    pub dir2: Vector3d,
}

/// A triangle mesh with vertices, faces and optional per-vertex attribute slots.
///
/// A mesh without faces doubles as a point set. Every `Some` attribute vector
/// holds exactly one entry per vertex (or per face for `face_selection`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3d>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3d>>,
    pub colors: Option<Vec<[u8; 3]>>,
    /// Local point spacing per vertex
    pub radii: Option<Vec<f64>>,
    pub vertex_selection: Option<Vec<bool>>,
    pub face_selection: Option<Vec<bool>>,
    /// Free scalar slot, written by curvature colorization
    pub quality: Option<Vec<f64>>,
    pub principal_curvatures: Option<Vec<PrincipalCurvature>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::from_vertices_and_faces(Vec::new(), Vec::new())
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3d>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
            radii: None,
            vertex_selection: None,
            face_selection: None,
            quality: None,
            principal_curvatures: None,
        }
    }

    /// Create a point set (a mesh without faces)
    pub fn from_points(vertices: Vec<Point3d>) -> Self {
        Self::from_vertices_and_faces(vertices, Vec::new())
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh has no vertices
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn has_faces(&self) -> bool {
        !self.faces.is_empty()
    }

    /// Check that every attribute slot matches the vertex (or face) count and
    /// that faces only reference existing vertices.
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len();
        let vertex_slots = [
            ("normal", self.normals.as_ref().map(Vec::len)),
            ("color", self.colors.as_ref().map(Vec::len)),
            ("radius", self.radii.as_ref().map(Vec::len)),
            ("vertex selection", self.vertex_selection.as_ref().map(Vec::len)),
            ("quality", self.quality.as_ref().map(Vec::len)),
            ("principal curvature", self.principal_curvatures.as_ref().map(Vec::len)),
        ];
        for (name, len) in vertex_slots {
            if let Some(len) = len.filter(|&len| len != vertex_count) {
                return Err(Error::InvalidArgument(format!(
                    "{} slot has {} entries for {} vertices",
                    name, len, vertex_count
                )));
            }
        }
        if let Some(len) = self
            .face_selection
            .as_ref()
            .map(Vec::len)
            .filter(|&len| len != self.faces.len())
        {
            return Err(Error::InvalidArgument(format!(
                "face selection has {} entries for {} faces",
                len,
                self.faces.len()
            )));
        }
        if let Some((face, &v)) = self
            .faces
            .iter()
            .enumerate()
            .find_map(|(f, face)| face.iter().find(|&&v| v >= vertex_count).map(|v| (f, v)))
        {
            return Err(Error::InvalidArgument(format!(
                "face {} references vertex {} of {}",
                face, v, vertex_count
            )));
        }
        Ok(())
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3d) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Calculate unit face normals from vertex positions.
    ///
    /// Degenerate (zero area) faces get a zero normal.
    pub fn calculate_face_normals(&self) -> Vec<Vector3d> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1
                    .cross(&edge2)
                    .try_normalize(f64::MIN_POSITIVE)
                    .unwrap_or_else(Vector3d::zeros)
            })
            .collect()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3d>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Set per-vertex radii
    pub fn set_radii(&mut self, radii: Vec<f64>) {
        if radii.len() == self.vertices.len() {
            self.radii = Some(radii);
        }
    }

    /// Set per-vertex quality
    pub fn set_quality(&mut self, quality: Vec<f64>) {
        if quality.len() == self.vertices.len() {
            self.quality = Some(quality);
        }
    }

    /// Set the face selection
    pub fn set_face_selection(&mut self, selection: Vec<bool>) {
        if selection.len() == self.faces.len() {
            self.face_selection = Some(selection);
        }
    }

    pub fn is_vertex_selected(&self, index: usize) -> bool {
        self.vertex_selection
            .as_ref()
            .is_some_and(|selection| selection.get(index) == Some(&true))
    }

    pub fn is_face_selected(&self, index: usize) -> bool {
        self.face_selection
            .as_ref()
            .is_some_and(|selection| selection.get(index) == Some(&true))
    }

    /// Whether at least one face is selected
    pub fn has_selected_faces(&self) -> bool {
        self.face_selection
            .as_ref()
            .is_some_and(|selection| selection.iter().any(|&s| s))
    }

    /// Number of selected vertices
    pub fn selected_vertex_count(&self) -> usize {
        self.vertex_selection
            .as_ref()
            .map_or(0, |selection| selection.iter().filter(|&&s| s).count())
    }

    /// Derive the vertex selection from the face selection.
    ///
    /// A vertex is selected iff it belongs to at least one face and every face
    /// it belongs to is selected. Returns the number of selected vertices.
    pub fn select_vertices_from_faces_strict(&mut self) -> usize {
        let mut touched = vec![false; self.vertices.len()];
        let mut selected = vec![true; self.vertices.len()];
        for (face_idx, face) in self.faces.iter().enumerate() {
            let face_selected = self.is_face_selected(face_idx);
            for &v in face {
                touched[v] = true;
                if !face_selected {
                    selected[v] = false;
                }
            }
        }
        let selection: Vec<bool> = touched
            .iter()
            .zip(&selected)
            .map(|(&t, &s)| t && s)
            .collect();
        let count = selection.iter().filter(|&&s| s).count();
        self.vertex_selection = Some(selection);
        count
    }

    /// Number of faces incident to every undirected edge, keyed by (min, max) vertex index
    pub fn edge_face_counts(&self) -> HashMap<(usize, usize), usize> {
        let mut counts = HashMap::with_capacity(self.faces.len() * 3 / 2);
        for face in &self.faces {
            for i in 0..3 {
                *counts.entry(edge_key(face[i], face[(i + 1) % 3])).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Number of edges used by exactly one face
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_face_counts().values().filter(|&&c| c == 1).count()
    }

    /// V - E + F over the whole vertex array
    pub fn euler_characteristic(&self) -> i64 {
        self.vertices.len() as i64 - self.edge_face_counts().len() as i64 + self.faces.len() as i64
    }

    /// Delete the faces flagged in `remove`. Returns the number of deleted faces.
    pub fn remove_faces(&mut self, remove: &[bool]) -> usize {
        if remove.len() != self.faces.len() {
            return 0;
        }
        let keep: Vec<bool> = remove.iter().map(|&r| !r).collect();
        let before = self.faces.len();
        retain_by_mask(&mut self.faces, &keep);
        if let Some(selection) = self.face_selection.as_mut() {
            retain_by_mask(selection, &keep);
        }
        before - self.faces.len()
    }

    /// Delete vertices not referenced by any face, compacting every per-vertex
    /// attribute and remapping the faces. Returns the number of deleted vertices.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut referenced = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                referenced[v] = true;
            }
        }

        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut next = 0;
        for (old, &keep) in referenced.iter().enumerate() {
            if keep {
                remap[old] = next;
                next += 1;
            }
        }
        let removed = self.vertices.len() - next;
        if removed == 0 {
            return 0;
        }

        retain_by_mask(&mut self.vertices, &referenced);
        if let Some(normals) = self.normals.as_mut() {
            retain_by_mask(normals, &referenced);
        }
        if let Some(colors) = self.colors.as_mut() {
            retain_by_mask(colors, &referenced);
        }
        if let Some(radii) = self.radii.as_mut() {
            retain_by_mask(radii, &referenced);
        }
        if let Some(selection) = self.vertex_selection.as_mut() {
            retain_by_mask(selection, &referenced);
        }
        if let Some(quality) = self.quality.as_mut() {
            retain_by_mask(quality, &referenced);
        }
        if let Some(curvatures) = self.principal_curvatures.as_mut() {
            retain_by_mask(curvatures, &referenced);
        }
        for face in &mut self.faces {
            for v in face.iter_mut() {
                *v = remap[*v];
            }
        }
        removed
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Undirected edge key with the smaller vertex index first
pub fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn retain_by_mask<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    values.retain(|_| flags.next().copied().unwrap_or(false));
}
