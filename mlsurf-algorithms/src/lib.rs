//! # mlsurf Algorithms
//!
//! Point cloud algorithms feeding the MLS surface engine.
//!
//! This crate provides k-d tree backed neighbor queries and the estimation of
//! per-point spacing (radius) from local neighbor density.

pub mod nearest_neighbor;
pub mod spacing;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use spacing::*;
