//! MLS filters over meshes and point sets
//!
//! Host facing workflows built on the surface models: radius estimation,
//! projection of a mesh onto the MLS surface of a control point set,
//! curvature colorization, marching cubes and small component selection.
//! Parameters come from a key/value map deserialized into
//! [`FilterParameters`].

use crate::apss::{ApssConfig, GradientHint};
use crate::components::select_small_components;
use crate::curvature::{percentile_range, quality_color, CurvatureKind, DifferentialEvaluator};
use crate::marching_cubes::{IsoSurfaceConfig, IsoSurfaceExtractor};
use crate::moving_least_squares::{MlsConfig, MlsVariant, SurfaceModel};
use crate::parallel::parallel_try_map_indexed;
use crate::progress::{ProgressCallback, ProgressTracker, Stage, PROGRESS_BATCH};
use crate::refinement::AdaptiveRefiner;
use crate::rimls::RimlsConfig;
use mlsurf_algorithms::{estimate_point_spacing, DEFAULT_SPACING_NEIGHBORS};
use mlsurf_core::{ensure_finite, Drawable, Error, PrincipalCurvature, Result, SampleCloud, TriangleMesh, Vector3d};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Fraction of the values below the low end of the colour ramp
const COLOR_RAMP_PERCENTILE: f64 = 0.01;

/// Which MLS fit a filter uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MlsKind {
    #[default]
    Apss,
    Rimls,
}

/// Filter parameters as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FilterParameters {
    pub filter_scale: f64,
    pub projection_accuracy: f64,
    pub max_projection_iters: usize,
    pub spherical_parameter: f64,
    pub accurate_normal: bool,
    pub sigma_n: f64,
    pub max_refitting_iters: usize,
    pub max_subdivisions: usize,
    #[serde(rename = "ThAngleInDegree")]
    pub crease_angle_degrees: f64,
    /// Unset means "when the mesh has a selection": selected faces for
    /// projection, selected vertices for curvature
    pub selection_only: Option<bool>,
    pub curvature_type: CurvatureKind,
    pub resolution: usize,
    #[serde(rename = "NbFaceRatio")]
    pub small_component_ratio: f64,
    pub non_closed_only: bool,
    #[serde(rename = "NbNeighbors")]
    pub spacing_neighbors: usize,
}

impl Default for FilterParameters {
    fn default() -> Self {
        let mls = MlsConfig::default();
        let apss = ApssConfig::default();
        let rimls = RimlsConfig::default();
        let iso = IsoSurfaceConfig::default();
        Self {
            filter_scale: mls.filter_scale,
            projection_accuracy: mls.projection_accuracy,
            max_projection_iters: mls.max_projection_iters,
            spherical_parameter: apss.spherical_parameter,
            accurate_normal: apss.gradient_hint == GradientHint::Accurate,
            sigma_n: rimls.sigma_n,
            max_refitting_iters: rimls.max_refitting_iters,
            max_subdivisions: 0,
            crease_angle_degrees: crate::refinement::DEFAULT_CREASE_ANGLE_DEGREES,
            selection_only: None,
            curvature_type: CurvatureKind::Mean,
            resolution: iso.resolution,
            small_component_ratio: iso.small_component_ratio,
            non_closed_only: false,
            spacing_neighbors: DEFAULT_SPACING_NEIGHBORS,
        }
    }
}

impl FilterParameters {
    pub fn mls_config(&self) -> MlsConfig {
        MlsConfig {
            filter_scale: self.filter_scale,
            projection_accuracy: self.projection_accuracy,
            max_projection_iters: self.max_projection_iters,
        }
    }

    pub fn apss_config(&self) -> ApssConfig {
        ApssConfig {
            spherical_parameter: self.spherical_parameter,
            gradient_hint: if self.accurate_normal {
                GradientHint::Accurate
            } else {
                GradientHint::Approximate
            },
        }
    }

    pub fn rimls_config(&self) -> RimlsConfig {
        RimlsConfig {
            sigma_n: self.sigma_n,
            max_refitting_iters: self.max_refitting_iters,
            ..Default::default()
        }
    }

    pub fn variant(&self, kind: MlsKind) -> MlsVariant {
        match kind {
            MlsKind::Apss => MlsVariant::Apss(self.apss_config()),
            MlsKind::Rimls => MlsVariant::Rimls(self.rimls_config()),
        }
    }

    pub fn iso_surface_config(&self) -> IsoSurfaceConfig {
        IsoSurfaceConfig {
            resolution: self.resolution,
            small_component_ratio: self.small_component_ratio,
            ..Default::default()
        }
    }
}

/// What a filter did, for the host's log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Radii were missing and estimated with the default neighbor count
    pub radius_estimated: bool,
    pub removed_unreferenced_vertices: usize,
    pub processed_vertices: usize,
    pub non_converged: usize,
    pub invalid_curvature: usize,
    pub removed_faces: usize,
}

/// Estimate a radius for every vertex from its `NbNeighbors` nearest neighbors
pub fn estimate_radius_from_density(mesh: &mut TriangleMesh, params: &FilterParameters) -> Result<()> {
    mesh.validate()?;
    let radii = estimate_point_spacing(&mesh.vertices, params.spacing_neighbors)?;
    mesh.set_radii(radii);
    Ok(())
}

/// Clean `mesh` and turn it into the samples of its MLS surface.
///
/// Vertices no face references are removed from `mesh` when it has faces,
/// since their normals are undefined. Missing radii are estimated and stored
/// in the mesh radius slot.
pub fn prepare_control_points(mesh: &mut TriangleMesh, report: &mut FilterReport) -> Result<SampleCloud> {
    mesh.validate()?;
    if mesh.has_faces() {
        report.removed_unreferenced_vertices = mesh.remove_unreferenced_vertices();
        if report.removed_unreferenced_vertices > 0 {
            info!(
                "Pre-MLS cleaning: removed {} unreferenced vertices",
                report.removed_unreferenced_vertices
            );
        }
    }

    if mesh.is_empty() {
        return Err(Error::InvalidArgument("control point set is empty".to_string()));
    }

    if mesh.radii.is_none() {
        mesh.set_radii(estimate_point_spacing(&mesh.vertices, DEFAULT_SPACING_NEIGHBORS)?);
        report.radius_estimated = true;
        warn!(
            "Mesh has no per vertex radius; estimated from {} neighbors",
            DEFAULT_SPACING_NEIGHBORS
        );
    }
    Ok(SampleCloud::from_mesh(mesh))
}

/// Project `target` onto the MLS surface of `control`.
///
/// Cleaning and estimated radii are written back to `control`. Neither mesh
/// changes when the filter fails.
pub fn mls_projection(
    control: &mut TriangleMesh,
    target: &mut TriangleMesh,
    kind: MlsKind,
    params: &FilterParameters,
    progress: &dyn ProgressCallback,
) -> Result<FilterReport> {
    target.validate()?;
    let mut report = FilterReport::default();
    let mut control_work = control.clone();
    let cloud = prepare_control_points(&mut control_work, &mut report)?;
    let model = SurfaceModel::new(&cloud, &params.mls_config(), &params.variant(kind))?;
    project_mesh(&model, target, params, progress, &mut report)?;
    *control = control_work;
    Ok(report)
}

/// Project `mesh` onto the MLS surface of its own vertices
pub fn mls_self_projection(
    mesh: &mut TriangleMesh,
    kind: MlsKind,
    params: &FilterParameters,
    progress: &dyn ProgressCallback,
) -> Result<FilterReport> {
    let mut report = FilterReport::default();
    let mut work = mesh.clone();
    let cloud = prepare_control_points(&mut work, &mut report)?;
    let model = SurfaceModel::new(&cloud, &params.mls_config(), &params.variant(kind))?;
    project_mesh(&model, &mut work, params, progress, &mut report)?;
    *mesh = work;
    Ok(report)
}

/// Refine and project a copy of `target`, replacing it only on success
fn project_mesh(
    model: &SurfaceModel,
    target: &mut TriangleMesh,
    params: &FilterParameters,
    progress: &dyn ProgressCallback,
    report: &mut FilterReport,
) -> Result<()> {
    let tracker = ProgressTracker::new(progress);
    let selection_only = params
        .selection_only
        .unwrap_or_else(|| target.has_selected_faces());

    let mut work = target.clone();
    if selection_only {
        work.select_vertices_from_faces_strict();
    }

    let refiner = AdaptiveRefiner::new(params.max_subdivisions, params.crease_angle_degrees)?
        .with_selection_only(selection_only);
    let passes = params.max_subdivisions + 1;
    refiner.run(&mut work, |mesh, pass| {
        let start = (pass * 100 / passes) as u8;
        let end = ((pass + 1) * 100 / passes) as u8;
        let stage = tracker.stage(format!("MLS projection (pass {}/{})", pass + 1, passes), start, end, mesh.vertex_count());
        let (processed, non_converged) = project_vertices(model, mesh, selection_only, &stage)?;
        report.processed_vertices = processed;
        report.non_converged += non_converged;
        Ok(())
    })?;

    info!(
        "{} projection: {} vertices, {} did not converge",
        model.name(),
        report.processed_vertices,
        report.non_converged
    );
    *target = work;
    Ok(())
}

/// Project the (selected) vertices of `mesh`, writing positions and normals.
/// Returns the processed and non-converged counts.
fn project_vertices(
    model: &SurfaceModel,
    mesh: &mut TriangleMesh,
    selection_only: bool,
    stage: &Stage<'_, '_>,
) -> Result<(usize, usize)> {
    stage.begin()?;
    let indices = vertices_to_process(mesh, selection_only);

    let results = parallel_try_map_indexed(&indices, |n, &v| {
        if n % PROGRESS_BATCH == 0 {
            stage.advance(PROGRESS_BATCH.min(indices.len() - n))?;
        }
        let result = model.project(&mesh.vertices[v], true);
        ensure_finite(result.position.coords.as_slice(), &format!("projection of vertex {}", v))?;
        Ok(result)
    })?;
    stage.finish()?;

    let vertex_count = mesh.vertex_count();
    let normals = mesh
        .normals
        .get_or_insert_with(|| vec![Vector3d::zeros(); vertex_count]);
    let mut non_converged = 0;
    for (&v, result) in indices.iter().zip(&results) {
        if !result.converged() {
            non_converged += 1;
        }
        if let Some(normal) = result.normal {
            normals[v] = normal;
        }
    }
    for (&v, result) in indices.iter().zip(results) {
        mesh.vertices[v] = result.position;
    }
    Ok((indices.len(), non_converged))
}

fn vertices_to_process(mesh: &TriangleMesh, selection_only: bool) -> Vec<usize> {
    (0..mesh.vertex_count())
        .filter(|&v| !selection_only || mesh.is_vertex_selected(v))
        .collect()
}

/// Colour the vertices of `mesh` by the curvature of its own MLS surface.
///
/// Writes the quality slot and, for curvatures from the Weingarten map, the
/// principal curvatures and directions. With `SelectionOnly` (by default when
/// vertices are selected) only selected vertices are evaluated; the others
/// keep their quality and principal curvatures. The colour ramp spans the
/// evaluated values and is applied to every vertex.
pub fn colorize_curvature(
    mesh: &mut TriangleMesh,
    kind: MlsKind,
    params: &FilterParameters,
    progress: &dyn ProgressCallback,
) -> Result<FilterReport> {
    let curvature = params.curvature_type;
    if curvature == CurvatureKind::ApproxMean && kind != MlsKind::Apss {
        return Err(Error::InvalidArgument(
            "approximate mean curvature is only available for APSS".to_string(),
        ));
    }

    let mut report = FilterReport::default();
    let mut work = mesh.clone();
    let cloud = prepare_control_points(&mut work, &mut report)?;
    let variant = match kind {
        MlsKind::Apss => MlsVariant::Apss(ApssConfig {
            gradient_hint: GradientHint::Accurate,
            ..params.apss_config()
        }),
        MlsKind::Rimls => MlsVariant::Rimls(params.rimls_config()),
    };
    let model = SurfaceModel::new(&cloud, &params.mls_config(), &variant)?;
    let evaluator = DifferentialEvaluator::default();

    let selection_only = params
        .selection_only
        .unwrap_or_else(|| work.selected_vertex_count() > 0);
    let indices = vertices_to_process(&work, selection_only);

    let tracker = ProgressTracker::new(progress);
    let stage = tracker.stage("Computing curvature", 0, 95, indices.len());
    stage.begin()?;
    let samples = parallel_try_map_indexed(&indices, |n, &v| {
        if n % PROGRESS_BATCH == 0 {
            stage.advance(PROGRESS_BATCH.min(indices.len() - n))?;
        }
        let projected = model.project(&work.vertices[v], false).position;
        if curvature == CurvatureKind::ApproxMean {
            return Ok((model.approx_mean_curvature(&projected), None));
        }
        let sample = evaluator.evaluate_at(&model, &projected)?;
        Ok((sample.value(curvature), sample.principal()))
    })?;
    stage.finish()?;

    let values: Vec<f64> = samples.iter().filter_map(|(value, _)| *value).collect();
    report.processed_vertices = samples.len();
    report.invalid_curvature = samples.len() - values.len();
    let (low, high) = percentile_range(&values, COLOR_RAMP_PERCENTILE, 1.0 - COLOR_RAMP_PERCENTILE)
        .unwrap_or((0.0, 0.0));

    let vertex_count = work.vertex_count();
    let mut quality = work.quality.take().unwrap_or_else(|| vec![0.0; vertex_count]);
    for (&v, (value, _)) in indices.iter().zip(&samples) {
        quality[v] = value.unwrap_or(0.0);
    }
    if curvature.uses_weingarten_map() {
        let principal = work
            .principal_curvatures
            .get_or_insert_with(|| vec![PrincipalCurvature::default(); vertex_count]);
        for (&v, (_, sample)) in indices.iter().zip(&samples) {
            principal[v] = sample.unwrap_or_default();
        }
    }
    work.set_colors(quality.iter().map(|&q| quality_color(q, low, high)).collect());
    work.set_quality(quality);
    tracker.report(100, "Done")?;

    if report.invalid_curvature > 0 {
        warn!(
            "Curvature undefined at {} of {} vertices",
            report.invalid_curvature, report.processed_vertices
        );
    }
    info!(
        "{} curvature ({:?}) ranges over [{:.6}, {:.6}] between the 1st and 99th percentile",
        model.name(),
        curvature,
        low,
        high
    );
    *mesh = work;
    Ok(report)
}

/// Polygonize the MLS surface of `points` into a new mesh.
///
/// Cleaning and estimated radii are written back to `points`.
pub fn mls_marching_cubes(
    points: &mut TriangleMesh,
    kind: MlsKind,
    params: &FilterParameters,
    progress: &dyn ProgressCallback,
) -> Result<(TriangleMesh, FilterReport)> {
    let mut report = FilterReport::default();
    let mut work = points.clone();
    let cloud = prepare_control_points(&mut work, &mut report)?;
    let model = SurfaceModel::new(&cloud, &params.mls_config(), &params.variant(kind))?;

    let config = params.iso_surface_config();
    let extractor = IsoSurfaceExtractor::new(config.clone())?;
    let (min, max) = model.bounding_box();
    let padding = Vector3d::repeat((max - min).norm() * config.padding_ratio);

    let (mesh, stats) =
        extractor.extract_with_stats(&model, (min - padding, max + padding), model.solver(), progress)?;
    report.processed_vertices = stats.vertices;
    report.non_converged = stats.non_converged;
    report.removed_faces = stats.removed_faces;
    *points = work;
    Ok((mesh, report))
}

/// Select the faces of components smaller than `NbFaceRatio` times the largest.
/// Returns the number of selected components.
pub fn select_small_disconnected_components(mesh: &mut TriangleMesh, params: &FilterParameters) -> Result<usize> {
    mesh.validate()?;
    if !(params.small_component_ratio.is_finite() && params.small_component_ratio >= 0.0) {
        return Err(Error::InvalidArgument(format!(
            "small component ratio must be non-negative, got {}",
            params.small_component_ratio
        )));
    }
    Ok(select_small_components(
        mesh,
        params.small_component_ratio,
        params.non_closed_only,
    ))
}
