//! UBO (Uniform Buffer Object) management
//!
//! Writes the per-frame camera block into the selected frame set's uniform
//! buffer. The layout must match the shader's binding byte for byte:
//! a column-major `mat4` followed by a `float` time, 68 bytes in total.

use crate::foundation::math::to_column_array;
use crate::render::api::{BufferAllocator, CameraUniformData};
use crate::render::RenderResult;

use super::resource_manager::FrameResourceSet;

/// Camera uniform block as the shader sees it
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraUbo {
    /// View-projection matrix, column-major (64 bytes)
    pub view_projection: [[f32; 4]; 4],
    /// Time in seconds (4 bytes)
    pub time: f32,
}

unsafe impl bytemuck::Pod for CameraUbo {}
unsafe impl bytemuck::Zeroable for CameraUbo {}

impl CameraUbo {
    /// Size of the uniform block in bytes
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

impl From<&CameraUniformData> for CameraUbo {
    fn from(data: &CameraUniformData) -> Self {
        Self {
            view_projection: to_column_array(&data.view_projection),
            time: data.time,
        }
    }
}

/// Uploads camera data into frame uniform buffers
///
/// Callers must have waited for the frame set's previous submission; the
/// manager does not synchronize on its own.
#[derive(Debug, Default)]
pub struct UniformUploadManager {
    uploads: u64,
}

impl UniformUploadManager {
    /// Create an upload manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `data` into `frame`'s uniform buffer
    pub fn upload<A>(
        &mut self,
        allocator: &mut A,
        frame: &FrameResourceSet,
        data: &CameraUniformData,
    ) -> RenderResult<()>
    where
        A: BufferAllocator + ?Sized,
    {
        let ubo = CameraUbo::from(data);
        allocator.write_buffer(frame.uniform_buffer(), 0, bytemuck::bytes_of(&ubo))?;
        self.uploads += 1;

        log::trace!(
            "Uploaded camera UBO to frame set {} (time {:.3})",
            frame.image_index(),
            data.time
        );
        Ok(())
    }

    /// Number of uploads performed
    pub const fn upload_count(&self) -> u64 {
        self.uploads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use approx::assert_relative_eq;

    #[test]
    fn test_camera_ubo_layout() {
        assert_eq!(CameraUbo::SIZE, 68);
        assert_eq!(std::mem::align_of::<CameraUbo>(), 4);
    }

    #[test]
    fn test_camera_ubo_bytes_match_shader_layout() {
        let view_projection = Mat4::new_translation(&Vec3::new(4.0, 5.0, 6.0));
        let ubo = CameraUbo::from(&CameraUniformData::new(view_projection, 2.5));
        let bytes = bytemuck::bytes_of(&ubo);

        assert_eq!(bytes.len(), 68);

        let floats: &[f32] = bytemuck::cast_slice(bytes);
        // Column 3 carries the translation in column-major order
        assert_relative_eq!(floats[12], 4.0);
        assert_relative_eq!(floats[13], 5.0);
        assert_relative_eq!(floats[14], 6.0);
        assert_relative_eq!(floats[15], 1.0);
        assert_relative_eq!(floats[16], 2.5);
    }
}
