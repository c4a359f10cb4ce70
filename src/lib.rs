//! # mlsurf
//!
//! Moving least squares (MLS) implicit surfaces for point clouds.
//!
//! This is the umbrella crate that provides convenient access to all mlsurf
//! functionality. You can use this crate to get everything in one place, or use
//! the individual crates for more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Surface samples, point clouds, triangle meshes and the error type
//! - **Algorithms**: Nearest neighbor search and point spacing estimation
//! - **Reconstruction**: APSS and RIMLS surfaces, projection, curvature,
//!   adaptive refinement and marching cubes extraction
//!
//! ## Quick Start
//!
//! ```rust
//! use mlsurf::prelude::*;
//!
//! // Oriented samples of a unit sphere
//! let count = 500;
//! let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
//! let mut cloud: SampleCloud = (0..count)
//!     .map(|i| {
//!         let z = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
//!         let r = (1.0 - z * z).sqrt();
//!         let theta = golden_angle * i as f64;
//!         let n = Vector3d::new(r * theta.cos(), r * theta.sin(), z);
//!         SamplePoint::with_normal(Point3d::from(n), n)
//!     })
//!     .collect();
//! estimate_radii(&mut cloud, DEFAULT_SPACING_NEIGHBORS)?;
//!
//! // Fit an APSS surface and project a point onto it
//! let surface = SurfaceModel::new(&cloud, &MlsConfig::default(), &MlsVariant::default())?;
//! let result = surface.project(&Point3d::new(0.0, 0.0, 1.1), true);
//! assert!(result.converged());
//! assert!((result.position.z - 1.0).abs() < 1e-3);
//! # Ok::<(), mlsurf::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms and reconstruction
//! - `algorithms`: Neighbor search and spacing estimation
//! - `reconstruction`: MLS surfaces and the mesh filters built on them
//! - `all`: Enables all features

// Re-export core functionality
pub use mlsurf_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use mlsurf_algorithms as algorithms;

#[cfg(feature = "reconstruction")]
pub use mlsurf_reconstruction as reconstruction;

/// Convenient imports for common use cases
pub mod prelude {
    pub use mlsurf_core::*;

    #[cfg(feature = "algorithms")]
    pub use mlsurf_algorithms::*;

    #[cfg(feature = "reconstruction")]
    pub use mlsurf_reconstruction::*;
}
