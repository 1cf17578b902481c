//! Frame rendering data structures
//!
//! What the application hands the renderer each frame, and what it gets
//! back.

use std::fmt;

use ash::vk;

use crate::foundation::math::Mat4;
use crate::render::resources::{MaterialId, PipelineId};
use crate::render::RenderError;

/// Index of one of the swapchain's images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapchainImageIndex(pub u32);

impl SwapchainImageIndex {
    /// Index usable for slice access
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SwapchainImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Vertex and index buffers of an externally owned mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    /// Vertex buffer bound at binding 0
    pub vertex_buffer: vk::Buffer,
    /// Index buffer
    pub index_buffer: vk::Buffer,
    /// Number of indices to draw
    pub index_count: u32,
    /// First index within the index buffer
    pub first_index: u32,
    /// Index width
    pub index_type: vk::IndexType,
}

impl MeshBuffers {
    /// Mesh drawn from the start of a 16-bit index buffer
    pub const fn new(vertex_buffer: vk::Buffer, index_buffer: vk::Buffer, index_count: u32) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            index_count,
            first_index: 0,
            index_type: vk::IndexType::UINT16,
        }
    }

    /// Use 32-bit indices
    #[must_use]
    pub const fn with_u32_indices(mut self) -> Self {
        self.index_type = vk::IndexType::UINT32;
        self
    }

    /// Draw a sub-range of the index buffer
    #[must_use]
    pub const fn with_index_range(mut self, first_index: u32, index_count: u32) -> Self {
        self.first_index = first_index;
        self.index_count = index_count;
        self
    }
}

/// One object to draw this frame
///
/// Owned by the scene; the renderer only borrows it while building and
/// recording the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableObject {
    /// Geometry to draw
    pub mesh: MeshBuffers,
    /// Pipeline used to draw it
    pub pipeline: PipelineId,
    /// Material descriptor resources
    pub material: MaterialId,
    /// Model matrix, delivered as a push constant
    pub transform: Mat4,
}

impl RenderableObject {
    /// Create an object with an identity transform
    pub fn new(mesh: MeshBuffers, pipeline: PipelineId, material: MaterialId) -> Self {
        Self {
            mesh,
            pipeline,
            material,
            transform: Mat4::identity(),
        }
    }

    /// Set the model matrix
    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// Per-frame camera data written to the frame's uniform buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraUniformData {
    /// Combined view-projection matrix
    pub view_projection: Mat4,
    /// Application time in seconds
    pub time: f32,
}

impl CameraUniformData {
    /// Create camera data for one frame
    pub const fn new(view_projection: Mat4, time: f32) -> Self {
        Self {
            view_projection,
            time,
        }
    }
}

/// State changes and draws issued while recording a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    /// Pipeline bind commands
    pub pipeline_binds: usize,
    /// Descriptor set bind commands
    pub descriptor_binds: usize,
    /// Vertex/index buffer bind commands
    pub mesh_binds: usize,
    /// Indexed draw commands
    pub draws: usize,
}

/// Summary of a presented frame
#[derive(Debug)]
pub struct FrameReport {
    /// Image the frame rendered into
    pub image_index: SwapchainImageIndex,
    /// Recording statistics
    pub stats: RecordStats,
    /// Objects excluded from the frame, one `InvalidObjectReference` each
    pub rejected: Vec<RenderError>,
}

/// Outcome of one frame cycle
///
/// Objects rejected while building the batch plan travel with every outcome
/// reached after the build; see [`FrameResult::rejected`].
#[derive(Debug)]
pub enum FrameResult {
    /// The frame was submitted and presented
    Ok(FrameReport),
    /// The swapchain must be recreated before the next frame
    NeedsRecreation {
        /// Objects excluded from the frame, if its plan was built
        rejected: Vec<RenderError>,
    },
    /// Acquisition or the wait for the frame set timed out; nothing was submitted
    Skipped(RenderError),
    /// Recording failed; nothing was submitted
    RecordingFailed {
        /// The failing recording step
        error: RenderError,
        /// Objects excluded from the plan that was being recorded
        rejected: Vec<RenderError>,
    },
}

impl FrameResult {
    /// Whether the frame reached the display
    pub const fn is_presented(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Whether the swapchain must be recreated before the next frame
    pub const fn needs_recreation(&self) -> bool {
        matches!(self, Self::NeedsRecreation { .. })
    }

    /// Report of a presented frame
    pub const fn report(&self) -> Option<&FrameReport> {
        match self {
            Self::Ok(report) => Some(report),
            _ => None,
        }
    }

    /// Objects excluded from this frame, one `InvalidObjectReference` each
    pub fn rejected(&self) -> &[RenderError] {
        match self {
            Self::Ok(report) => report.rejected.as_slice(),
            Self::NeedsRecreation { rejected } | Self::RecordingFailed { rejected, .. } => rejected.as_slice(),
            Self::Skipped(_) => &[],
        }
    }

    /// The condition that kept the frame from the display, if any
    ///
    /// A stale swapchain comes back as [`RenderError::SwapchainStale`].
    pub fn into_error(self) -> Option<RenderError> {
        match self {
            Self::Ok(_) => None,
            Self::NeedsRecreation { .. } => Some(RenderError::SwapchainStale),
            Self::Skipped(error) | Self::RecordingFailed { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ObjectReference;

    fn rejected_material(object_index: usize) -> RenderError {
        RenderError::InvalidObjectReference {
            object_index,
            reference: ObjectReference::Material(MaterialId::default()),
        }
    }

    #[test]
    fn test_stale_swapchain_converts_to_error() {
        let result = FrameResult::NeedsRecreation { rejected: Vec::new() };
        assert!(result.needs_recreation());
        assert!(matches!(result.into_error(), Some(RenderError::SwapchainStale)));
    }

    #[test]
    fn test_rejections_reachable_from_every_outcome() {
        let failed = FrameResult::RecordingFailed {
            error: RenderError::recording("end failed"),
            rejected: vec![rejected_material(2)],
        };
        assert_eq!(failed.rejected().len(), 1);
        assert!(matches!(failed.into_error(), Some(RenderError::RecordingFailure { .. })));

        let stale = FrameResult::NeedsRecreation {
            rejected: vec![rejected_material(0), rejected_material(3)],
        };
        assert_eq!(stale.rejected().len(), 2);

        let skipped = FrameResult::Skipped(RenderError::AcquireTimeout {
            waited: std::time::Duration::from_millis(1),
        });
        assert!(skipped.rejected().is_empty());
    }

    #[test]
    fn test_presented_frame_has_no_error() {
        let result = FrameResult::Ok(FrameReport {
            image_index: SwapchainImageIndex(1),
            stats: RecordStats::default(),
            rejected: vec![rejected_material(0)],
        });
        assert!(result.is_presented());
        assert_eq!(result.rejected().len(), 1);
        assert!(result.into_error().is_none());
    }
}
