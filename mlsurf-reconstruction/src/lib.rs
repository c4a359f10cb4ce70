//! # mlsurf Reconstruction
//!
//! Moving least squares (MLS) implicit surfaces for oriented point clouds.
//!
//! This crate fits algebraic point set surfaces (APSS) and robust implicit MLS
//! (RIMLS) surfaces, projects points onto them, evaluates their curvature,
//! refines meshes before projection and polygonizes the surfaces with a
//! marching cubes walker.

pub mod parallel;
pub mod progress;
pub mod implicit;
pub mod moving_least_squares;
pub mod apss;
pub mod rimls;
pub mod projection;
pub mod curvature;
pub mod refinement;
pub mod components;
pub mod marching_cubes;
pub mod pipeline;

// Re-export commonly used items
pub use progress::*;
pub use implicit::*;
pub use moving_least_squares::*;
pub use apss::*;
pub use rimls::*;
pub use projection::*;
pub use curvature::*;
pub use refinement::*;
pub use components::*;
pub use marching_cubes::*;
pub use pipeline::*;
