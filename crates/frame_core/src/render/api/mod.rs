//! Public rendering API
//!
//! Data exchanged with the application each frame and the interfaces of
//! the external collaborators (allocator, swapchain, catalogs, device).

pub mod frame_data;
pub mod interfaces;

// Re-export commonly used types
pub use frame_data::{
    CameraUniformData, FrameReport, FrameResult, MeshBuffers, RecordStats, RenderableObject,
    SwapchainImageIndex,
};
pub use interfaces::{
    AcquireOutcome, BufferAllocator, CommandEncoder, FenceStatus, GpuDevice, MaterialCatalog,
    MaterialResources, MemoryVisibility, PipelineCatalog, PipelineHandle, PresentOutcome,
    RenderTarget, Submission, Swapchain,
};
