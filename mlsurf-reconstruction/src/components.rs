//! Edge-connected face components and small component cleanup

use mlsurf_core::{edge_key, TriangleMesh};
use std::collections::HashMap;
use tracing::debug;

/// Faces reachable from each other through shared edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceComponent {
    pub faces: Vec<usize>,
    /// Whether any edge of the component is used by a single face
    pub has_boundary: bool,
}

impl FaceComponent {
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentCleanupStats {
    pub components: usize,
    pub removed_components: usize,
    pub removed_faces: usize,
    pub removed_vertices: usize,
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], i: usize, j: usize) {
    let pi = find(parent, i);
    let pj = find(parent, j);
    if pi != pj {
        parent[pi.max(pj)] = pi.min(pj);
    }
}

/// Components of `mesh`, largest first
pub fn face_components(mesh: &TriangleMesh) -> Vec<FaceComponent> {
    let mut parent: Vec<usize> = (0..mesh.faces.len()).collect();
    let mut first_face: HashMap<(usize, usize), usize> = HashMap::with_capacity(mesh.faces.len() * 3 / 2);
    let mut edge_use: HashMap<(usize, usize), usize> = HashMap::with_capacity(mesh.faces.len() * 3 / 2);

    for (face_idx, face) in mesh.faces.iter().enumerate() {
        for i in 0..3 {
            let key = edge_key(face[i], face[(i + 1) % 3]);
            *edge_use.entry(key).or_insert(0) += 1;
            match first_face.get(&key) {
                Some(&other) => union(&mut parent, face_idx, other),
                None => {
                    first_face.insert(key, face_idx);
                }
            }
        }
    }

    let mut by_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<FaceComponent> = Vec::new();
    for face_idx in 0..mesh.faces.len() {
        let root = find(&mut parent, face_idx);
        let slot = *by_root.entry(root).or_insert_with(|| {
            components.push(FaceComponent {
                faces: Vec::new(),
                has_boundary: false,
            });
            components.len() - 1
        });
        components[slot].faces.push(face_idx);
    }

    for (key, uses) in edge_use {
        if uses == 1 {
            let root = find(&mut parent, first_face[&key]);
            components[by_root[&root]].has_boundary = true;
        }
    }

    components.sort_by(|a, b| b.faces.len().cmp(&a.faces.len()).then(a.faces[0].cmp(&b.faces[0])));
    components
}

/// Per-face flags for faces in components smaller than `ratio` times the largest
fn small_component_mask(mesh: &TriangleMesh, ratio: f64, non_closed_only: bool) -> (Vec<bool>, usize, usize) {
    let components = face_components(mesh);
    let mut mask = vec![false; mesh.faces.len()];
    let Some(largest) = components.first().map(FaceComponent::face_count) else {
        return (mask, 0, 0);
    };

    let threshold = ratio * largest as f64;
    let mut flagged = 0;
    for component in &components {
        if (component.face_count() as f64) < threshold && (!non_closed_only || component.has_boundary) {
            flagged += 1;
            for &f in &component.faces {
                mask[f] = true;
            }
        }
    }
    (mask, components.len(), flagged)
}

/// Select the faces of small components, replacing the current face selection.
/// Returns the number of selected components.
pub fn select_small_components(mesh: &mut TriangleMesh, ratio: f64, non_closed_only: bool) -> usize {
    let (mask, _, flagged) = small_component_mask(mesh, ratio, non_closed_only);
    mesh.face_selection = Some(mask);
    flagged
}

/// Delete components smaller than `ratio` times the largest one, with their
/// then unreferenced vertices
pub fn remove_small_components(mesh: &mut TriangleMesh, ratio: f64) -> ComponentCleanupStats {
    let (mask, components, removed_components) = small_component_mask(mesh, ratio, false);
    if removed_components == 0 {
        return ComponentCleanupStats {
            components,
            ..Default::default()
        };
    }

    let removed_faces = mesh.remove_faces(&mask);
    let removed_vertices = mesh.remove_unreferenced_vertices();
    debug!(
        "Removed {} of {} components ({} faces, {} vertices)",
        removed_components, components, removed_faces, removed_vertices
    );

    ComponentCleanupStats {
        components,
        removed_components,
        removed_faces,
        removed_vertices,
    }
}
