//! Core data structures and traits for mlsurf
//! 
//! This crate provides the fundamental types shared by the MLS surface engine:
//! oriented surface samples, point clouds, triangle meshes with per-vertex
//! attribute slots, spatial search traits and the common error type.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3};

// Type aliases for easier imports
pub type Point = Point3d;
pub type Mesh = TriangleMesh;
