//! Math utilities and types
//!
//! Provides the matrix and vector types the renderer exchanges with the
//! application layer, plus conversions into GPU column-major layout.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Column-major array form of a matrix, matching GLSL `mat4` layout
pub fn to_column_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}
