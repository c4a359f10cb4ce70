//! Crease-aware Loop subdivision
//!
//! Each pass splits the edges whose adjacent faces are nearly coplanar and
//! leaves edges across sharper creases untouched. New edge vertices follow the
//! Loop odd rule; old vertices whose incident edges were all split follow the
//! even rule. Faces are split 1-to-2, 1-to-3 or 1-to-4 depending on how many
//! of their edges were split, so the mesh stays conforming.

use crate::parallel::parallel_map;
use itertools::Itertools;
use mlsurf_core::{edge_key, Error, Point3d, Result, TriangleMesh, Vector3d};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

pub const DEFAULT_CREASE_ANGLE_DEGREES: f64 = 2.0;

/// Accepts an edge when the angle between its face normals is below a threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeAnglePredicate {
    th_cos: f64,
}

impl EdgeAnglePredicate {
    pub fn from_degrees(angle: f64) -> Self {
        Self::from_cosine(angle.to_radians().cos())
    }

    pub fn from_cosine(th_cos: f64) -> Self {
        Self { th_cos }
    }

    pub fn threshold_cosine(&self) -> f64 {
        self.th_cos
    }

    /// Zero normals (degenerate faces) are never accepted
    pub fn accepts(&self, n0: &Vector3d, n1: &Vector3d) -> bool {
        if n0.norm_squared() == 0.0 || n1.norm_squared() == 0.0 {
            return false;
        }
        n0.dot(n1) > self.th_cos
    }
}

impl Default for EdgeAnglePredicate {
    fn default() -> Self {
        Self::from_degrees(DEFAULT_CREASE_ANGLE_DEGREES)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefinementStats {
    pub split_edges: usize,
    pub new_vertices: usize,
    pub new_faces: usize,
}

/// First two incident faces of an edge and the total incidence count
#[derive(Debug, Clone, Copy)]
struct EdgeFaces {
    faces: [usize; 2],
    count: usize,
}

#[derive(Debug, Clone)]
pub struct AdaptiveRefiner {
    predicate: EdgeAnglePredicate,
    max_subdivisions: usize,
    selection_only: bool,
}

impl AdaptiveRefiner {
    pub fn new(max_subdivisions: usize, crease_angle_degrees: f64) -> Result<Self> {
        if !crease_angle_degrees.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "crease angle must be finite, got {}",
                crease_angle_degrees
            )));
        }
        Ok(Self {
            predicate: EdgeAnglePredicate::from_degrees(crease_angle_degrees),
            max_subdivisions,
            selection_only: false,
        })
    }

    /// Only refine edges whose faces are all selected
    pub fn with_selection_only(mut self, selection_only: bool) -> Self {
        self.selection_only = selection_only;
        self
    }

    pub fn predicate(&self) -> &EdgeAnglePredicate {
        &self.predicate
    }

    pub fn max_subdivisions(&self) -> usize {
        self.max_subdivisions
    }

    /// Run `max_subdivisions + 1` passes, calling `per_pass` after each one.
    ///
    /// Pass 0 only calls `per_pass`; later passes subdivide first.
    pub fn run<F>(&self, mesh: &mut TriangleMesh, mut per_pass: F) -> Result<Vec<RefinementStats>>
    where
        F: FnMut(&mut TriangleMesh, usize) -> Result<()>,
    {
        let mut history = Vec::with_capacity(self.max_subdivisions);
        for pass in 0..=self.max_subdivisions {
            if pass > 0 {
                let stats = self.refine_pass(mesh)?;
                debug!(
                    "Refinement pass {}: {} edges split, {} vertices and {} faces added",
                    pass, stats.split_edges, stats.new_vertices, stats.new_faces
                );
                history.push(stats);
            }
            per_pass(mesh, pass)?;
        }
        Ok(history)
    }

    /// One subdivision pass
    pub fn refine_pass(&self, mesh: &mut TriangleMesh) -> Result<RefinementStats> {
        if mesh.faces.is_empty() {
            return Ok(RefinementStats::default());
        }
        if let Some(&bad) = mesh.faces.iter().flatten().find(|&&v| v >= mesh.vertices.len()) {
            return Err(Error::InvalidArgument(format!(
                "face references vertex {} of {}",
                bad,
                mesh.vertices.len()
            )));
        }
        if self.selection_only {
            mesh.select_vertices_from_faces_strict();
        }

        let face_normals = mesh.calculate_face_normals();
        let edges = edge_adjacency(&mesh.faces);

        let eligible = parallel_map(&edges, |(_, info)| {
            if info.count > 2 {
                return false;
            }
            if self.selection_only
                && !info.faces[..info.count].iter().all(|&f| mesh.is_face_selected(f))
            {
                return false;
            }
            let n0 = &face_normals[info.faces[0]];
            let n1 = if info.count == 2 { &face_normals[info.faces[1]] } else { n0 };
            self.predicate.accepts(n0, n1)
        });

        let old_count = mesh.vertices.len();
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut odd_positions = Vec::new();
        let mut split_per_vertex = vec![0usize; old_count];
        for ((key, info), _) in edges.iter().zip(&eligible).filter(|(_, eligible)| **eligible) {
            let (a, b) = *key;
            split_per_vertex[a] += 1;
            split_per_vertex[b] += 1;
            midpoints.insert(*key, old_count + odd_positions.len());
            odd_positions.push(odd_vertex(mesh, *key, info));
        }

        let split_edges = odd_positions.len();
        if split_edges == 0 {
            return Ok(RefinementStats::default());
        }

        let mut positions = even_positions(mesh, &edges, &split_per_vertex);
        positions.extend(odd_positions);

        let mut faces = Vec::with_capacity(mesh.faces.len() * 4);
        let mut face_selection = mesh.face_selection.as_ref().map(|_| Vec::with_capacity(mesh.faces.len() * 4));
        for (face_idx, face) in mesh.faces.iter().enumerate() {
            let before = faces.len();
            split_face(face, &midpoints, &positions, &mut faces);
            if let Some(selection) = face_selection.as_mut() {
                let selected = mesh.is_face_selected(face_idx);
                selection.extend(std::iter::repeat(selected).take(faces.len() - before));
            }
        }

        let new_faces = faces.len() - mesh.faces.len();
        extend_vertex_attributes(mesh, &midpoints);
        mesh.vertices = positions;
        mesh.faces = faces;
        mesh.face_selection = face_selection;
        if mesh.face_selection.is_some() {
            mesh.select_vertices_from_faces_strict();
        }

        Ok(RefinementStats {
            split_edges,
            new_vertices: split_edges,
            new_faces,
        })
    }
}

/// Undirected edges with their incident faces, sorted by key
fn edge_adjacency(faces: &[[usize; 3]]) -> Vec<((usize, usize), EdgeFaces)> {
    let mut adjacency: HashMap<(usize, usize), EdgeFaces> = HashMap::with_capacity(faces.len() * 3 / 2);
    for (face_idx, face) in faces.iter().enumerate() {
        for i in 0..3 {
            let info = adjacency
                .entry(edge_key(face[i], face[(i + 1) % 3]))
                .or_insert(EdgeFaces { faces: [face_idx; 2], count: 0 });
            if info.count < 2 {
                info.faces[info.count] = face_idx;
            }
            info.count += 1;
        }
    }
    adjacency.into_iter().sorted_unstable_by_key(|(key, _)| *key).collect()
}

fn opposite_vertex(face: &[usize; 3], (a, b): (usize, usize)) -> usize {
    face.iter().copied().find(|&v| v != a && v != b).unwrap_or(a)
}

/// Loop odd rule; boundary edges get their midpoint
fn odd_vertex(mesh: &TriangleMesh, key: (usize, usize), info: &EdgeFaces) -> Point3d {
    let a = mesh.vertices[key.0].coords;
    let b = mesh.vertices[key.1].coords;
    if info.count != 2 {
        return Point3d::from((a + b) * 0.5);
    }
    let c = mesh.vertices[opposite_vertex(&mesh.faces[info.faces[0]], key)].coords;
    let d = mesh.vertices[opposite_vertex(&mesh.faces[info.faces[1]], key)].coords;
    Point3d::from((a + b) * 0.375 + (c + d) * 0.125)
}

/// Loop even rule for vertices whose incident edges were all split; others stay put
fn even_positions(
    mesh: &TriangleMesh,
    edges: &[((usize, usize), EdgeFaces)],
    split_per_vertex: &[usize],
) -> Vec<Point3d> {
    let count = mesh.vertices.len();
    let mut ring: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut boundary: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut non_manifold = vec![false; count];
    for &((a, b), info) in edges {
        ring[a].push(b);
        ring[b].push(a);
        match info.count {
            1 => {
                boundary[a].push(b);
                boundary[b].push(a);
            }
            2 => {}
            _ => {
                non_manifold[a] = true;
                non_manifold[b] = true;
            }
        }
    }

    (0..count)
        .map(|v| {
            let old = mesh.vertices[v];
            let valence = ring[v].len();
            if valence == 0 || split_per_vertex[v] != valence || non_manifold[v] {
                return old;
            }

            if !boundary[v].is_empty() {
                if boundary[v].len() != 2 {
                    return old;
                }
                let b0 = mesh.vertices[boundary[v][0]].coords;
                let b1 = mesh.vertices[boundary[v][1]].coords;
                return Point3d::from(old.coords * 0.75 + (b0 + b1) * 0.125);
            }

            let n = valence as f64;
            let inner = 0.375 + 0.25 * (2.0 * PI / n).cos();
            let beta = (0.625 - inner * inner) / n;
            let sum = ring[v]
                .iter()
                .fold(Vector3d::zeros(), |acc, &u| acc + mesh.vertices[u].coords);
            Point3d::from(old.coords * (1.0 - n * beta) + sum * beta)
        })
        .collect()
}

/// Append the children of `face`, preserving its orientation
fn split_face(
    face: &[usize; 3],
    midpoints: &HashMap<(usize, usize), usize>,
    positions: &[Point3d],
    out: &mut Vec<[usize; 3]>,
) {
    let mids: [Option<usize>; 3] =
        std::array::from_fn(|i| midpoints.get(&edge_key(face[i], face[(i + 1) % 3])).copied());
    let split: Vec<usize> = (0..3).filter(|&i| mids[i].is_some()).collect();

    // Rotate so that the first split edge is e0 and, with two splits, the unsplit one is e2
    let rotation = match split.as_slice() {
        [] => {
            out.push(*face);
            return;
        }
        [s] => *s,
        [s0, s1] => match (*s0, *s1) {
            (0, 1) => 0,
            (1, 2) => 1,
            _ => 2,
        },
        _ => 0,
    };
    let v: [usize; 3] = std::array::from_fn(|k| face[(rotation + k) % 3]);
    let m: [Option<usize>; 3] = std::array::from_fn(|k| mids[(rotation + k) % 3]);

    match m {
        [Some(m0), None, None] => {
            out.push([v[0], m0, v[2]]);
            out.push([m0, v[1], v[2]]);
        }
        [Some(m0), Some(m1), None] => {
            out.push([m0, v[1], m1]);
            let diagonal_v0 = (positions[v[0]] - positions[m1]).norm_squared();
            let diagonal_m0 = (positions[m0] - positions[v[2]]).norm_squared();
            if diagonal_v0 <= diagonal_m0 {
                out.push([v[0], m0, m1]);
                out.push([v[0], m1, v[2]]);
            } else {
                out.push([v[0], m0, v[2]]);
                out.push([m0, m1, v[2]]);
            }
        }
        [Some(m0), Some(m1), Some(m2)] => {
            out.push([v[0], m0, m2]);
            out.push([m0, v[1], m1]);
            out.push([m2, m1, v[2]]);
            out.push([m0, m1, m2]);
        }
        _ => out.push(*face),
    }
}

/// Interpolate per-vertex slots onto the new edge vertices; derived slots are dropped
fn extend_vertex_attributes(mesh: &mut TriangleMesh, midpoints: &HashMap<(usize, usize), usize>) {
    let mut ordered: Vec<((usize, usize), usize)> = midpoints.iter().map(|(&k, &v)| (k, v)).collect();
    ordered.sort_unstable_by_key(|&(_, index)| index);

    if let Some(normals) = mesh.normals.as_mut() {
        for &((a, b), _) in &ordered {
            let n = (normals[a] + normals[b])
                .try_normalize(f64::MIN_POSITIVE)
                .unwrap_or(normals[a]);
            normals.push(n);
        }
    }
    if let Some(colors) = mesh.colors.as_mut() {
        for &((a, b), _) in &ordered {
            let (ca, cb) = (colors[a], colors[b]);
            colors.push(std::array::from_fn(|c| ((ca[c] as u16 + cb[c] as u16) / 2) as u8));
        }
    }
    if let Some(radii) = mesh.radii.as_mut() {
        for &((a, b), _) in &ordered {
            let r = 0.5 * (radii[a] + radii[b]);
            radii.push(r);
        }
    }
    if let Some(selection) = mesh.vertex_selection.as_mut() {
        selection.resize(selection.len() + ordered.len(), false);
    }
    mesh.quality = None;
    mesh.principal_curvatures = None;
}
