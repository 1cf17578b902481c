//! Collaborator interfaces
//!
//! The frame core never talks to a window, a memory allocator or a shader
//! compiler directly. It consumes the traits below; [`crate::backends`]
//! provides a Vulkan implementation and a simulated one for tests.

use std::time::Duration;

use ash::vk;
use serde::{Deserialize, Serialize};

use super::frame_data::{MeshBuffers, SwapchainImageIndex};
use crate::render::resources::{MaterialId, PipelineId};
use crate::render::RenderResult;

/// Memory placement requested from the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryVisibility {
    /// CPU-writable memory the GPU reads directly
    HostVisible,
    /// GPU memory, written through a staging copy
    DeviceLocal,
}

/// Buffer memory provider
pub trait BufferAllocator {
    /// Allocate a buffer of `size` bytes
    fn allocate_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        visibility: MemoryVisibility,
    ) -> RenderResult<vk::Buffer>;

    /// Write `data` at `offset`, mapping or staging as the memory requires
    fn write_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()>;

    /// Release a buffer
    fn free(&mut self, buffer: vk::Buffer);
}

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready once `ready` is signaled
    Acquired {
        /// Image to render into
        index: SwapchainImageIndex,
        /// Semaphore the submission must wait on
        ready: vk::Semaphore,
    },
    /// The swapchain must be recreated
    Stale,
    /// No image became available within the timeout
    Timeout,
}

/// Result of a presentation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for display
    Presented,
    /// The swapchain must be recreated
    Stale,
}

/// Render pass and framebuffer for one swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    /// Render pass compatible with every catalog pipeline
    pub render_pass: vk::RenderPass,
    /// Framebuffer wrapping the swapchain image
    pub framebuffer: vk::Framebuffer,
    /// Image size
    pub extent: vk::Extent2D,
}

/// Presentable image source
pub trait Swapchain {
    /// Number of images, fixed for the lifetime of this swapchain
    fn image_count(&self) -> usize;

    /// Acquire the next image to render into
    fn acquire_next_image(&mut self, timeout: Duration) -> RenderResult<AcquireOutcome>;

    /// Render target for an image
    fn render_target(&self, index: SwapchainImageIndex) -> RenderTarget;

    /// Queue an image for display once `wait` is signaled
    fn present(
        &mut self,
        index: SwapchainImageIndex,
        wait: vk::Semaphore,
    ) -> RenderResult<PresentOutcome>;

    /// Give back an acquired image that will not be rendered
    ///
    /// Consumes the acquire semaphore `ready` and returns the image to the
    /// presentation engine. Every acquired image is either presented or
    /// released; otherwise the swapchain runs out of images.
    fn release_image(
        &mut self,
        index: SwapchainImageIndex,
        ready: vk::Semaphore,
    ) -> RenderResult<PresentOutcome>;

    /// `ready` was waited on by a submission that signals `fence`
    ///
    /// The semaphore may be reused for another acquire once `fence` is
    /// signaled.
    fn acquire_consumed(&mut self, _ready: vk::Semaphore, _fence: vk::Fence) {}
}

/// A compiled pipeline resolved from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineHandle {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Layout: set 0 is camera + material, push constant range holds the model matrix
    pub layout: vk::PipelineLayout,
    /// Stages reading the push constant block
    pub push_constant_stages: vk::ShaderStageFlags,
}

/// Descriptor resources of a material
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialResources {
    /// Sets bound after the camera set; empty for untextured materials
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

/// Catalog of compiled pipelines
pub trait PipelineCatalog {
    /// Resolve a pipeline identifier
    fn lookup(&self, id: PipelineId) -> Option<PipelineHandle>;
}

/// Catalog of material descriptor resources
pub trait MaterialCatalog {
    /// Resolve a material identifier
    fn lookup(&self, id: MaterialId) -> Option<&MaterialResources>;
}

/// State of a fence after a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// All work guarded by the fence has completed
    Signaled,
    /// The timeout elapsed first
    TimedOut,
}

/// One command buffer submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Recorded command buffer
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore to wait on before color output
    pub wait: vk::Semaphore,
    /// Semaphore signaled when rendering finishes
    pub signal: vk::Semaphore,
    /// Fence signaled when the GPU is done with the submission
    pub fence: vk::Fence,
}

/// Resource and synchronization half of the graphics device
pub trait GpuDevice {
    /// Allocate a descriptor set whose binding 0 is `range` bytes of `uniform_buffer`
    fn create_descriptor_set(
        &mut self,
        uniform_buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> RenderResult<vk::DescriptorSet>;

    /// Return a descriptor set to its pool
    fn free_descriptor_set(&mut self, set: vk::DescriptorSet);

    /// Allocate a primary command buffer
    fn allocate_command_buffer(&mut self) -> RenderResult<vk::CommandBuffer>;

    /// Return a command buffer to its pool
    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer);

    /// Create a fence, optionally already signaled
    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence>;

    /// Destroy a fence
    fn destroy_fence(&mut self, fence: vk::Fence);

    /// Create a binary semaphore
    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore>;

    /// Destroy a semaphore
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    /// Block until `fence` is signaled or `timeout` elapses
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout: Duration) -> RenderResult<FenceStatus>;

    /// Return a fence to the unsignaled state
    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;

    /// Queue recorded work
    fn submit(&mut self, submission: &Submission) -> RenderResult<()>;

    /// Block until the device has no outstanding work
    fn wait_idle(&mut self) -> RenderResult<()>;
}

/// Recording half of the graphics device
///
/// Mirrors the command-buffer entry points; only the begin and end calls can
/// fail, as in the underlying API.
pub trait CommandEncoder {
    /// Reset and begin a command buffer for one-time submission
    fn begin_commands(&mut self, command_buffer: vk::CommandBuffer) -> RenderResult<()>;

    /// Begin the render pass with a cleared target and full-extent viewport/scissor
    fn begin_render_pass(
        &mut self,
        command_buffer: vk::CommandBuffer,
        target: &RenderTarget,
        clear_color: [f32; 4],
    );

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);

    /// Bind descriptor sets starting at `first_set`
    fn bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );

    /// Write push constant bytes at offset 0
    fn push_constants(
        &mut self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    );

    /// Bind a mesh's vertex and index buffers
    fn bind_mesh(&mut self, command_buffer: vk::CommandBuffer, mesh: &MeshBuffers);

    /// Issue an indexed draw of one instance
    fn draw_indexed(&mut self, command_buffer: vk::CommandBuffer, index_count: u32, first_index: u32);

    /// End the render pass
    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer);

    /// Finish recording
    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> RenderResult<()>;
}
