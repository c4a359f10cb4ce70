//! Projection of points onto implicit surfaces
//!
//! Newton-like iteration along the field gradient:
//! `x <- x - f(x) ∇f(x) / |∇f(x)|²`, stopped once a step is shorter than
//! `accuracy * length_scale` or the iteration budget is spent.

use crate::implicit::{ImplicitSurface, GRADIENT_EPSILON};
use crate::moving_least_squares::{MlsConfig, DEFAULT_MAX_PROJECTION_ITERS, DEFAULT_PROJECTION_ACCURACY};
use mlsurf_core::{Error, Point3d, Result, Vector3d};

/// How a projection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStatus {
    Converged,
    /// Iteration budget exhausted before the step size fell below the threshold
    MaxIterations,
    /// The gradient vanished or the field stopped being finite
    DegenerateGradient,
    /// The iterate left the support of the samples
    OutOfSupport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionResult {
    /// Last iterate; the start point when no step was taken
    pub position: Point3d,
    /// Surface normal at `position`, when requested and defined
    pub normal: Option<Vector3d>,
    pub status: ProjectionStatus,
    pub iterations: usize,
}

impl ProjectionResult {
    pub fn converged(&self) -> bool {
        self.status == ProjectionStatus::Converged
    }
}

/// Iterative projector with a fixed iteration budget and relative accuracy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionSolver {
    max_iters: usize,
    accuracy: f64,
}

impl Default for ProjectionSolver {
    fn default() -> Self {
        Self {
            max_iters: DEFAULT_MAX_PROJECTION_ITERS,
            accuracy: DEFAULT_PROJECTION_ACCURACY,
        }
    }
}

impl ProjectionSolver {
    pub fn new(max_iters: usize, accuracy: f64) -> Result<Self> {
        if max_iters == 0 {
            return Err(Error::InvalidArgument(
                "max projection iterations must be at least 1".to_string(),
            ));
        }
        if !(accuracy.is_finite() && accuracy > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "projection accuracy must be positive, got {}",
                accuracy
            )));
        }
        Ok(Self { max_iters, accuracy })
    }

    pub fn from_config(config: &MlsConfig) -> Result<Self> {
        Self::new(config.max_projection_iters, config.projection_accuracy)
    }

    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Project `start` onto the zero set of `surface`.
    ///
    /// Never fails: a projection that cannot proceed reports why in its status
    /// and keeps the last valid iterate.
    pub fn project<S: ImplicitSurface + ?Sized>(
        &self,
        surface: &S,
        start: &Point3d,
        want_normal: bool,
    ) -> ProjectionResult {
        let threshold = self.accuracy * surface.length_scale();
        let mut position = *start;
        let mut iterations = 0;
        let mut status = ProjectionStatus::MaxIterations;

        while iterations < self.max_iters {
            let Some((value, gradient)) = surface.potential_and_gradient(&position) else {
                status = ProjectionStatus::OutOfSupport;
                break;
            };

            let g2 = gradient.norm_squared();
            if !value.is_finite() || !g2.is_finite() || g2 <= GRADIENT_EPSILON * GRADIENT_EPSILON {
                status = ProjectionStatus::DegenerateGradient;
                break;
            }

            let step = gradient * (-value / g2);
            position += step;
            iterations += 1;

            if step.norm() < threshold {
                status = ProjectionStatus::Converged;
                break;
            }
        }

        let normal = if want_normal {
            surface.normal(&position)
        } else {
            None
        };

        ProjectionResult {
            position,
            normal,
            status,
            iterations,
        }
    }
}

/// Project `p0` with an ad hoc iteration budget and accuracy
pub fn project<S: ImplicitSurface + ?Sized>(
    surface: &S,
    p0: &Point3d,
    max_iters: usize,
    accuracy: f64,
) -> Result<ProjectionResult> {
    Ok(ProjectionSolver::new(max_iters, accuracy)?.project(surface, p0, true))
}
