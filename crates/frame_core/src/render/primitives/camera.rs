//! # 3D Camera
//!
//! Perspective camera producing the view-projection matrix uploaded each
//! frame.
//!
//! # Coordinate System
//! View space is right-handed with -Y as up, which lines up world +Y with
//! Vulkan's downward NDC Y axis without a separate flip matrix.

use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::api::CameraUniformData;

/// Perspective camera looking from `eye` towards `target`
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub eye: Point3,
    /// Point the camera looks at
    pub target: Point3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Distance to near clipping plane
    pub near: f32,
    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera
    ///
    /// # Arguments
    /// * `eye` - Camera position in world space
    /// * `target` - Point to look at
    /// * `fov_y_degrees` - Vertical field of view in degrees
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(eye: Point3, target: Point3, fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            eye,
            target,
            fov_y: fov_y_degrees.to_radians(),
            near,
            far,
        }
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, eye: Point3) {
        self.eye = eye;
        log::trace!("Camera position updated to: {:?}", eye);
    }

    /// Point the camera at a new target
    pub fn set_target(&mut self, target: Point3) {
        self.target = target;
        log::trace!("Camera target updated to: {:?}", target);
    }

    /// World-to-view transformation
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(&self.eye, &self.target, &Self::up())
    }

    /// Perspective projection for a viewport of the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::new_perspective(aspect, self.fov_y, self.near, self.far)
    }

    /// Combined projection * view
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Uniform data for one frame
    pub fn uniform_data(&self, aspect: f32, time: f32) -> CameraUniformData {
        CameraUniformData::new(self.view_projection(aspect), time)
    }

    fn up() -> Vec3 {
        Vec3::new(0.0, -1.0, 0.0)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(
            Point3::new(0.0, 2.0, 6.0),
            Point3::origin(),
            60.0,
            0.1,
            100.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_view_moves_eye_to_origin() {
        let camera = Camera::perspective(Point3::new(1.0, 2.0, 3.0), Point3::origin(), 45.0, 0.1, 10.0);
        let eye = camera.view_matrix() * Vector4::new(1.0, 2.0, 3.0, 1.0);

        assert_relative_eq!(eye.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(eye.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(eye.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_target_lies_in_front_of_camera() {
        let camera = Camera::perspective(Point3::new(0.0, 0.0, 5.0), Point3::origin(), 60.0, 0.1, 100.0);
        let target = camera.view_matrix() * Vector4::new(0.0, 0.0, 0.0, 1.0);

        // Right-handed view space looks down -Z
        assert_relative_eq!(target.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_world_up_maps_to_negative_view_y() {
        let camera = Camera::perspective(Point3::new(0.0, 0.0, 5.0), Point3::origin(), 60.0, 0.1, 100.0);
        let above = camera.view_matrix() * Vector4::new(0.0, 1.0, 0.0, 1.0);

        assert!(above.y < 0.0);
    }

    #[test]
    fn test_uniform_data_combines_matrices() {
        let camera = Camera::default();
        let data = camera.uniform_data(16.0 / 9.0, 1.25);

        assert_relative_eq!(data.view_projection, camera.view_projection(16.0 / 9.0));
        assert_relative_eq!(data.time, 1.25);
        assert_relative_eq!(camera.fov_y, 60.0_f32.to_radians());
    }
}
