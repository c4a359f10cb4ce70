//! Integration tests for mlsurf-reconstruction
//!
//! These tests run the surface models, the projection solver, the curvature
//! evaluator, the refiner and the extractor together on sampled spheres.

use approx::assert_relative_eq;
use mlsurf_algorithms::{estimate_radii, DEFAULT_SPACING_NEIGHBORS};
use mlsurf_core::{Error, Point3d, SampleCloud, SamplePoint, TriangleMesh, Vector3d};
use mlsurf_reconstruction::*;
use std::f64::consts::PI;

const RADIUS: f64 = 1.0;

/// Fibonacci sampling of a sphere with outward unit normals
fn sphere_samples(count: usize, radius: f64) -> Vec<(Point3d, Vector3d)> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    (0..count)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let r = (1.0 - z * z).sqrt();
            let theta = golden_angle * i as f64;
            let direction = Vector3d::new(r * theta.cos(), r * theta.sin(), z);
            (Point3d::from(direction * radius), direction)
        })
        .collect()
}

fn sphere_cloud(count: usize) -> SampleCloud {
    let mut cloud: SampleCloud = sphere_samples(count, RADIUS)
        .into_iter()
        .map(|(p, n)| SamplePoint::with_normal(p, n))
        .collect();
    estimate_radii(&mut cloud, DEFAULT_SPACING_NEIGHBORS).unwrap();
    cloud
}

/// Point set mesh (no faces) carrying normals but no radii
fn sphere_point_mesh(count: usize) -> TriangleMesh {
    let samples = sphere_samples(count, RADIUS);
    let mut mesh = TriangleMesh::from_points(samples.iter().map(|(p, _)| *p).collect());
    mesh.set_normals(samples.iter().map(|(_, n)| *n).collect());
    mesh
}

/// Closed triangulated sphere of radius `radius` around the origin
fn sphere_mesh(radius: f64, resolution: usize) -> TriangleMesh {
    let sphere = AnalyticSphere::new(Point3d::origin(), radius);
    let extractor = IsoSurfaceExtractor::new(IsoSurfaceConfig {
        resolution,
        ..Default::default()
    })
    .unwrap();
    extractor
        .extract(&sphere, sphere.bounds(0.3 * radius), &ProjectionSolver::default(), &NoProgress)
        .unwrap()
}

fn test_points() -> Vec<Point3d> {
    vec![
        Point3d::new(0.0, 0.0, 1.08),
        Point3d::new(0.61, -0.52, 0.55),
        Point3d::new(-0.7, 0.1, -0.69),
        Point3d::new(0.05, -0.93, 0.2),
    ]
}

#[test]
fn test_apss_projection_on_sphere() {
    let model = SurfaceModel::new(&sphere_cloud(1500), &MlsConfig::default(), &MlsVariant::default()).unwrap();

    for p in test_points() {
        let result = model.project(&p, true);
        assert!(result.converged(), "projection of {:?} ended with {:?}", p, result.status);
        assert_relative_eq!(result.position.coords.norm(), RADIUS, epsilon = 1e-5);

        let normal = result.normal.unwrap();
        assert_relative_eq!(normal, result.position.coords / RADIUS, epsilon = 1e-4);
    }
}

#[test]
fn test_rimls_projection_on_sphere() {
    let variant = MlsVariant::Rimls(RimlsConfig::default());
    let model = SurfaceModel::new(&sphere_cloud(1500), &MlsConfig::default(), &variant).unwrap();

    for p in test_points() {
        let result = model.project(&p, false);
        assert!(result.converged());
        assert!((result.position.coords.norm() - RADIUS).abs() < 0.02 * RADIUS);
    }
}

#[test]
fn test_projection_idempotence() {
    let model = SurfaceModel::new(&sphere_cloud(1000), &MlsConfig::default(), &MlsVariant::default()).unwrap();
    let accuracy = model.config().projection_accuracy * model.length_scale();

    for p in test_points() {
        let first = model.project(&p, false);
        let second = model.project(&first.position, false);
        assert!((second.position - first.position).norm() < accuracy);
    }
}

#[test]
fn test_single_iteration_and_out_of_support() {
    let model = SurfaceModel::new(&sphere_cloud(500), &MlsConfig::default(), &MlsVariant::default()).unwrap();

    let result = project(&model, &Point3d::new(0.3, 0.2, 1.1), 1, 1e-12).unwrap();
    assert_eq!(result.iterations, 1);
    assert!(!result.converged());

    let far = model.project(&Point3d::new(0.0, 0.0, 5.0), false);
    assert_eq!(far.status, ProjectionStatus::OutOfSupport);
    assert!(!far.converged());
}

#[test]
fn test_sphere_curvature() {
    let model = SurfaceModel::new(&sphere_cloud(1500), &MlsConfig::default(), &MlsVariant::default()).unwrap();
    let evaluator = DifferentialEvaluator::default();

    for p in test_points() {
        let on_surface = model.project(&p, false).position;
        let sample = evaluator.evaluate_at(&model, &on_surface).unwrap();
        assert!(sample.valid);
        assert_relative_eq!(sample.k1, 1.0 / RADIUS, epsilon = 1e-3);
        assert_relative_eq!(sample.k2, 1.0 / RADIUS, epsilon = 1e-3);
        assert_relative_eq!(sample.mean, 1.0 / RADIUS, epsilon = 1e-3);
        assert_relative_eq!(sample.gauss, 1.0 / (RADIUS * RADIUS), epsilon = 2e-3);
        assert_relative_eq!(sample.dir1.dot(&on_surface.coords), 0.0, epsilon = 1e-6);

        let approx = model.approx_mean_curvature(&on_surface).unwrap();
        assert_relative_eq!(approx, 1.0 / RADIUS, epsilon = 1e-6);
    }
}

#[test]
fn test_marching_cubes_on_mls_sphere() {
    let config = MlsConfig {
        filter_scale: 4.0,
        ..Default::default()
    };
    let model = SurfaceModel::new(&sphere_cloud(2000), &config, &MlsVariant::default()).unwrap();
    let extractor = IsoSurfaceExtractor::new(IsoSurfaceConfig {
        resolution: 30,
        ..Default::default()
    })
    .unwrap();

    let bounds = (Point3d::new(-1.3, -1.3, -1.3), Point3d::new(1.3, 1.3, 1.3));
    let mesh = extractor.extract(&model, bounds, model.solver(), &NoProgress).unwrap();

    assert_eq!(mesh.boundary_edge_count(), 0);
    assert_eq!(mesh.euler_characteristic(), 2);
    for vertex in &mesh.vertices {
        assert_relative_eq!(vertex.coords.norm(), RADIUS, epsilon = 1e-4);
    }
}

/// Union of a large and a small sphere
struct TwoSpheres {
    large: AnalyticSphere,
    small: AnalyticSphere,
}

impl ImplicitSurface for TwoSpheres {
    fn potential_and_gradient(&self, p: &Point3d) -> Option<(f64, Vector3d)> {
        let a = self.large.potential_and_gradient(p)?;
        let b = self.small.potential_and_gradient(p)?;
        Some(if a.0 <= b.0 { a } else { b })
    }

    fn length_scale(&self) -> f64 {
        self.small.length_scale()
    }
}

#[test]
fn test_extractor_removes_small_fragments() {
    let field = TwoSpheres {
        large: AnalyticSphere::new(Point3d::new(-0.2, 0.0, 0.0), 0.8),
        small: AnalyticSphere::new(Point3d::new(0.85, 0.8, 0.8), 0.15),
    };
    let bounds = (Point3d::new(-1.2, -1.2, -1.2), Point3d::new(1.2, 1.2, 1.2));

    let keep_all = IsoSurfaceExtractor::new(IsoSurfaceConfig {
        resolution: 40,
        small_component_ratio: 0.0,
        ..Default::default()
    })
    .unwrap();
    let mesh = keep_all.extract(&field, bounds, &ProjectionSolver::default(), &NoProgress).unwrap();
    assert_eq!(face_components(&mesh).len(), 2);

    let cleaned = IsoSurfaceExtractor::new(IsoSurfaceConfig {
        resolution: 40,
        ..Default::default()
    })
    .unwrap();
    let (mesh, stats) = cleaned
        .extract_with_stats(&field, bounds, &ProjectionSolver::default(), &NoProgress)
        .unwrap();
    assert_eq!(face_components(&mesh).len(), 1);
    assert_eq!(stats.removed_components, 1);
    assert!(stats.removed_faces > 0);
    assert_eq!(mesh.euler_characteristic(), 2);
    assert!(mesh.vertices.iter().all(|v| (v - field.large.center).norm() < 0.81));
}

#[test]
fn test_mls_projection_of_a_mesh() {
    let mut control = sphere_point_mesh(1500);
    let mut target = sphere_mesh(1.05, 12);
    let faces_before = target.face_count();
    let vertices_before = target.vertex_count();

    let report = mls_projection(&mut control, &mut target, MlsKind::Apss, &FilterParameters::default(), &NoProgress).unwrap();

    assert!(report.radius_estimated);
    assert_eq!(control.radii.as_ref().map(Vec::len), Some(1500));
    assert_eq!(report.processed_vertices, vertices_before);
    assert_eq!(report.non_converged, 0);
    assert_eq!(target.face_count(), faces_before);
    assert_eq!(target.vertex_count(), vertices_before);
    for (vertex, normal) in target.vertices.iter().zip(target.normals.as_ref().unwrap()) {
        assert_relative_eq!(vertex.coords.norm(), RADIUS, epsilon = 1e-4);
        assert_relative_eq!(*normal, vertex.coords / RADIUS, epsilon = 1e-3);
    }
}

#[test]
fn test_mls_projection_with_subdivision() {
    let mut control = sphere_point_mesh(1500);
    let mut target = sphere_mesh(1.05, 10);
    let faces_before = target.face_count();

    let params = FilterParameters {
        max_subdivisions: 1,
        crease_angle_degrees: 179.0,
        ..Default::default()
    };
    let report = mls_projection(&mut control, &mut target, MlsKind::Rimls, &params, &NoProgress).unwrap();

    assert!(target.face_count() > 3 * faces_before);
    assert_eq!(target.boundary_edge_count(), 0);
    assert_eq!(report.processed_vertices, target.vertex_count());
    assert_eq!(target.euler_characteristic(), 2);
    for vertex in &target.vertices {
        assert!((vertex.coords.norm() - RADIUS).abs() < 0.02);
    }
}

#[test]
fn test_crease_threshold_blocks_refinement() {
    // Adjacent face normals of a tetrahedron are 109 degrees apart
    let mut mesh = TriangleMesh::from_vertices_and_faces(
        vec![
            Point3d::new(1.0, 1.0, 1.0),
            Point3d::new(1.0, -1.0, -1.0),
            Point3d::new(-1.0, 1.0, -1.0),
            Point3d::new(-1.0, -1.0, 1.0),
        ],
        vec![[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]],
    );
    let refiner = AdaptiveRefiner::new(3, 60.0).unwrap();
    let history = refiner.run(&mut mesh, |_, _| Ok(())).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|stats| stats.split_edges == 0));
    assert_eq!(mesh.face_count(), 4);
    assert_eq!(mesh.vertex_count(), 4);

    let refiner = AdaptiveRefiner::new(2, 179.0).unwrap();
    let mut counts = Vec::new();
    refiner
        .run(&mut mesh, |m, _| {
            counts.push((m.vertex_count(), m.face_count()));
            Ok(())
        })
        .unwrap();
    assert!(counts.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
    assert_eq!(counts.last(), Some(&(34, 64)));
}

#[test]
fn test_self_projection_selection_only() {
    let mut mesh = sphere_mesh(1.0, 10);
    // Select the faces in the upper half
    let selection: Vec<bool> = mesh
        .faces
        .iter()
        .map(|f| f.iter().all(|&v| mesh.vertices[v].z > 0.0))
        .collect();
    mesh.set_face_selection(selection);
    let original = mesh.vertices.clone();

    let params = FilterParameters {
        max_subdivisions: 1,
        crease_angle_degrees: 60.0,
        ..Default::default()
    };
    let report = mls_self_projection(&mut mesh, MlsKind::Apss, &params, &NoProgress).unwrap();

    // Only strictly selected vertices moved, and refinement stayed inside the selection
    for (v, before) in original.iter().enumerate() {
        if before.z <= 0.0 {
            assert_eq!(mesh.vertices[v], *before);
        }
    }
    assert!(report.processed_vertices > 0);
    assert!(report.processed_vertices < mesh.vertex_count());
    assert_eq!(mesh.boundary_edge_count(), 0);
}

#[test]
fn test_self_projection_stores_radii_and_cleans_the_mesh() {
    let mut mesh = sphere_mesh(1.0, 10);
    assert!(mesh.radii.is_none());
    let vertex_count = mesh.vertex_count();
    mesh.add_vertex(Point3d::new(3.0, 3.0, 3.0));

    let report = mls_self_projection(&mut mesh, MlsKind::Apss, &FilterParameters::default(), &NoProgress).unwrap();

    assert!(report.radius_estimated);
    assert_eq!(report.removed_unreferenced_vertices, 1);
    assert_eq!(mesh.vertex_count(), vertex_count);
    assert!(mesh.radii.is_some());
    assert_eq!(mesh.radii.as_ref().map(Vec::len), Some(vertex_count));

    // A second run reuses the stored radii
    let report = mls_self_projection(&mut mesh, MlsKind::Apss, &FilterParameters::default(), &NoProgress).unwrap();
    assert!(!report.radius_estimated);
    assert_eq!(report.removed_unreferenced_vertices, 0);
}

#[test]
fn test_cancelled_projection_leaves_meshes_untouched() {
    let mut control = sphere_point_mesh(800);
    let mut target = sphere_mesh(1.05, 10);
    let snapshot = target.clone();

    let cancel = |_: u8, _: &str| false;
    let result = mls_projection(&mut control, &mut target, MlsKind::Apss, &FilterParameters::default(), &cancel);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(target.vertices, snapshot.vertices);
    assert_eq!(target.faces, snapshot.faces);
    assert_eq!(target.normals, snapshot.normals);
    assert!(control.radii.is_none());
}

#[test]
fn test_filters_reject_inconsistent_meshes() {
    let mut short_normals = sphere_mesh(1.0, 8);
    short_normals.normals = Some(vec![Vector3d::z(); 3]);
    let snapshot = short_normals.clone();
    assert!(matches!(
        mls_self_projection(&mut short_normals, MlsKind::Apss, &FilterParameters::default(), &NoProgress),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(short_normals.vertices, snapshot.vertices);
    assert_eq!(short_normals.radii, None);

    let mut dangling_face = sphere_mesh(1.0, 8);
    let vertex_count = dangling_face.vertex_count();
    dangling_face.add_face([0, 1, vertex_count + 4]);
    assert!(matches!(
        colorize_curvature(&mut dangling_face, MlsKind::Apss, &FilterParameters::default(), &NoProgress),
        Err(Error::InvalidArgument(_))
    ));
    assert!(dangling_face.quality.is_none());

    let mut control = sphere_point_mesh(500);
    let mut short_selection = sphere_mesh(1.05, 8);
    short_selection.vertex_selection = Some(vec![true; 2]);
    assert!(matches!(
        mls_projection(&mut control, &mut short_selection, MlsKind::Apss, &FilterParameters::default(), &NoProgress),
        Err(Error::InvalidArgument(_))
    ));
    assert!(control.radii.is_none());
}

#[test]
fn test_mls_projection_onto_flat_grid() {
    let points: Vec<Point3d> = (0..1600)
        .map(|i| Point3d::new((i % 40) as f64 * 0.05, (i / 40) as f64 * 0.05, 0.0))
        .collect();
    let start = [
        Point3d::new(0.5, 0.5, 0.03),
        Point3d::new(1.23, 0.71, -0.02),
        Point3d::new(0.9, 1.4, 0.01),
    ];

    for kind in [MlsKind::Apss, MlsKind::Rimls] {
        let mut control = TriangleMesh::from_points(points.clone());
        control.set_normals(vec![Vector3d::z(); points.len()]);
        let mut target = TriangleMesh::from_points(start.to_vec());
        let report = mls_projection(&mut control, &mut target, kind, &FilterParameters::default(), &NoProgress).unwrap();

        assert_eq!(report.non_converged, 0);
        for (after, before) in target.vertices.iter().zip(&start) {
            assert_relative_eq!(after.z, 0.0, epsilon = 1e-6);
            assert_relative_eq!(after.x, before.x, epsilon = 1e-6);
            assert_relative_eq!(after.y, before.y, epsilon = 1e-6);
        }
    }
}

/// Samples of a 90 degree edge along the y axis: the top face `z = 0, x <= 0`
/// and the side face `x = 0, z < 0`
fn crease_point_mesh(spacing: f64) -> TriangleMesh {
    let steps = (1.0 / spacing).round() as i64;
    let mut points = Vec::new();
    let mut normals = Vec::new();
    for j in -steps..=steps {
        let y = j as f64 * spacing;
        for i in 0..=steps {
            points.push(Point3d::new(-(i as f64) * spacing, y, 0.0));
            normals.push(Vector3d::z());
        }
        for i in 1..=steps {
            points.push(Point3d::new(0.0, y, -(i as f64) * spacing));
            normals.push(Vector3d::x());
        }
    }
    let mut mesh = TriangleMesh::from_points(points);
    mesh.set_normals(normals);
    mesh
}

/// Distance from `p` to the two faces of [`crease_point_mesh`]
fn distance_to_crease_faces(p: &Point3d) -> f64 {
    let corner = (p.x * p.x + p.z * p.z).sqrt();
    let to_top = if p.x <= 0.0 { p.z.abs() } else { corner };
    let to_side = if p.z <= 0.0 { p.x.abs() } else { corner };
    to_top.min(to_side)
}

#[test]
fn test_rimls_keeps_sharp_edges_sharper_than_apss() {
    let start: Vec<Point3d> = [-0.3, 0.0, 0.3]
        .iter()
        .flat_map(|&y| {
            [(0.03, 0.03), (0.05, 0.02), (0.02, 0.05), (0.01, 0.01)]
                .map(|(x, z)| Point3d::new(x, y, z))
        })
        .collect();

    let mut errors = Vec::new();
    for kind in [MlsKind::Apss, MlsKind::Rimls] {
        let mut control = crease_point_mesh(0.05);
        let mut target = TriangleMesh::from_points(start.clone());
        let report = mls_projection(&mut control, &mut target, kind, &FilterParameters::default(), &NoProgress).unwrap();
        assert_eq!(report.processed_vertices, start.len());

        let error = target.vertices.iter().map(distance_to_crease_faces).sum::<f64>() / start.len() as f64;
        errors.push(error);
    }
    let (apss, rimls) = (errors[0], errors[1]);
    assert!(rimls < apss, "RIMLS edge error {} is not below APSS error {}", rimls, apss);
}

/// Mean absolute error of the RIMLS mean curvature over a sampled unit sphere
fn rimls_mean_curvature_error(count: usize) -> f64 {
    let mut mesh = sphere_point_mesh(count);
    colorize_curvature(&mut mesh, MlsKind::Rimls, &FilterParameters::default(), &NoProgress).unwrap();
    let quality = mesh.quality.as_ref().unwrap();
    quality.iter().map(|q| (q - 1.0 / RADIUS).abs()).sum::<f64>() / quality.len() as f64
}

#[test]
fn test_curvature_error_shrinks_with_density() {
    let sparse = rimls_mean_curvature_error(400);
    let dense = rimls_mean_curvature_error(3200);
    assert!(dense < sparse, "error at 3200 samples {} is not below error at 400 samples {}", dense, sparse);
}

#[test]
fn test_colorize_curvature() {
    let mut mesh = sphere_point_mesh(1500);
    for (kind, curvature) in [
        (MlsKind::Apss, CurvatureKind::Mean),
        (MlsKind::Apss, CurvatureKind::ApproxMean),
        (MlsKind::Apss, CurvatureKind::Gauss),
    ] {
        let params = FilterParameters {
            curvature_type: curvature,
            ..Default::default()
        };
        let report = colorize_curvature(&mut mesh, kind, &params, &NoProgress).unwrap();
        assert_eq!(report.processed_vertices, 1500);
        assert_eq!(report.invalid_curvature, 0);

        let quality = mesh.quality.as_ref().unwrap();
        assert!(quality.iter().all(|&q| (q - 1.0).abs() < 2e-3));
        assert_eq!(mesh.colors.as_ref().map(Vec::len), Some(1500));
    }
    assert!(mesh.principal_curvatures.is_some());

    let params = FilterParameters::default();
    let report = colorize_curvature(&mut mesh, MlsKind::Rimls, &params, &NoProgress).unwrap();
    assert_eq!(report.invalid_curvature, 0);
    let quality = mesh.quality.as_ref().unwrap();
    let mean = quality.iter().sum::<f64>() / quality.len() as f64;
    assert!((mean - 1.0).abs() < 0.05);
    assert!(quality.iter().all(|&q| (q - 1.0).abs() < 0.25));
}

#[test]
fn test_colorize_curvature_on_selected_vertices() {
    let mut mesh = sphere_point_mesh(1500);
    let selection: Vec<bool> = mesh.vertices.iter().map(|v| v.z > 0.5).collect();
    let selected = selection.iter().filter(|&&s| s).count();
    mesh.vertex_selection = Some(selection.clone());
    mesh.quality = Some(vec![-7.0; 1500]);

    let report = colorize_curvature(&mut mesh, MlsKind::Apss, &FilterParameters::default(), &NoProgress).unwrap();

    assert_eq!(report.processed_vertices, selected);
    let quality = mesh.quality.as_ref().unwrap();
    for (&q, &is_selected) in quality.iter().zip(&selection) {
        if is_selected {
            assert!((q - 1.0).abs() < 2e-3);
        } else {
            assert_eq!(q, -7.0);
        }
    }
    assert_eq!(mesh.colors.as_ref().map(Vec::len), Some(1500));

    // Explicitly disabling the selection evaluates every vertex
    let params = FilterParameters {
        selection_only: Some(false),
        ..Default::default()
    };
    let report = colorize_curvature(&mut mesh, MlsKind::Apss, &params, &NoProgress).unwrap();
    assert_eq!(report.processed_vertices, 1500);
    assert!(mesh.quality.as_ref().unwrap().iter().all(|&q| (q - 1.0).abs() < 2e-3));
}

#[test]
fn test_mls_marching_cubes_filter() {
    let mut points = sphere_point_mesh(2000);
    let params = FilterParameters {
        filter_scale: 4.0,
        resolution: 30,
        ..Default::default()
    };
    let (mesh, report) = mls_marching_cubes(&mut points, MlsKind::Apss, &params, &NoProgress).unwrap();

    assert!(report.radius_estimated);
    assert_eq!(points.radii.as_ref().map(Vec::len), Some(2000));
    assert_eq!(report.processed_vertices, mesh.vertex_count());
    assert_eq!(mesh.euler_characteristic(), 2);
    assert_eq!(mesh.boundary_edge_count(), 0);
}

#[test]
fn test_invalid_inputs() {
    let empty = SampleCloud::new();
    assert!(matches!(
        SurfaceModel::new(&empty, &MlsConfig::default(), &MlsVariant::default()),
        Err(Error::InvalidArgument(_))
    ));

    let without_normals: SampleCloud = sphere_samples(100, 1.0)
        .into_iter()
        .map(|(p, _)| SamplePoint::new(p).with_radius(0.1))
        .collect();
    assert!(matches!(
        SurfaceModel::new(&without_normals, &MlsConfig::default(), &MlsVariant::Rimls(RimlsConfig::default())),
        Err(Error::InvalidArgument(_))
    ));
    // APSS accepts unoriented samples
    assert!(SurfaceModel::new(&without_normals, &MlsConfig::default(), &MlsVariant::default()).is_ok());

    let zero_iters = MlsConfig {
        max_projection_iters: 0,
        ..Default::default()
    };
    assert!(matches!(
        SurfaceModel::new(&sphere_cloud(100), &zero_iters, &MlsVariant::default()),
        Err(Error::InvalidArgument(_))
    ));
}
