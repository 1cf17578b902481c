//! Frame renderer
//!
//! Owns the device, allocator and swapchain together with the pipeline and
//! material catalogs, and drives the frame cycle over them.

use crate::config::RendererConfig;
use crate::render::api::{
    BufferAllocator, CameraUniformData, CommandEncoder, FrameResult, GpuDevice, RenderableObject,
    Swapchain, SwapchainImageIndex,
};
use crate::render::frame::{FrameContext, FrameCycleController, FrameState};
use crate::render::primitives::Camera;
use crate::render::resources::{MaterialRegistry, PipelineRegistry};
use crate::render::RenderResult;

/// Single-pass forward renderer
///
/// `D` provides synchronization and command recording, `A` the buffer
/// memory and `S` the presentable images. Frames fail softly: per-frame
/// problems come back as [`FrameResult`] values and the renderer stays
/// usable.
pub struct FrameRenderer<D, A, S>
where
    D: GpuDevice + CommandEncoder,
    A: BufferAllocator,
    S: Swapchain,
{
    config: RendererConfig,
    controller: FrameCycleController,
    pipelines: PipelineRegistry,
    materials: MaterialRegistry,
    device: D,
    allocator: A,
    swapchain: S,
}

impl<D, A, S> FrameRenderer<D, A, S>
where
    D: GpuDevice + CommandEncoder,
    A: BufferAllocator,
    S: Swapchain,
{
    /// Validate `config` and create one frame resource set per swapchain image
    pub fn initialize(config: RendererConfig, mut device: D, mut allocator: A, swapchain: S) -> RenderResult<Self> {
        config.validate()?;
        log::info!(
            "Initializing frame renderer: {} swapchain image(s), {}-byte uniform buffers in {:?} memory",
            swapchain.image_count(),
            config.uniform_buffer_size,
            config.uniform_memory
        );

        let mut controller = FrameCycleController::new(&config);
        controller.create_resources(&mut device, &mut allocator, swapchain.image_count())?;

        Ok(Self {
            config,
            controller,
            pipelines: PipelineRegistry::new(),
            materials: MaterialRegistry::new(),
            device,
            allocator,
            swapchain,
        })
    }

    /// Render one frame of `objects` as seen through `camera`
    pub fn run_frame(&mut self, camera: &CameraUniformData, objects: &[RenderableObject]) -> RenderResult<FrameResult> {
        let ctx = FrameContext {
            device: &mut self.device,
            allocator: &mut self.allocator,
            swapchain: &mut self.swapchain,
            pipelines: &self.pipelines,
            materials: &self.materials,
        };
        self.controller.run_frame(ctx, camera, objects)
    }

    /// Render one frame using a [`Camera`], deriving the aspect ratio from the
    /// swapchain extent
    pub fn run_frame_with_camera(
        &mut self,
        camera: &Camera,
        time: f32,
        objects: &[RenderableObject],
    ) -> RenderResult<FrameResult> {
        let data = camera.uniform_data(self.aspect_ratio(), time);
        self.run_frame(&data, objects)
    }

    /// Replace the swapchain and rebuild every frame resource set
    ///
    /// Waits for all in-flight work first. On allocation failure the renderer
    /// keeps refusing frames until a later recreation succeeds.
    pub fn recreate_swapchain(&mut self, swapchain: S) -> RenderResult<()> {
        log::info!(
            "Recreating swapchain: {} -> {} image(s)",
            self.swapchain.image_count(),
            swapchain.image_count()
        );
        self.controller
            .destroy_resources(&mut self.device, &mut self.allocator)?;
        self.swapchain = swapchain;
        self.controller
            .create_resources(&mut self.device, &mut self.allocator, self.swapchain.image_count())
    }

    /// Wait for the GPU, release every frame resource and hand back the
    /// collaborators
    pub fn shutdown(mut self) -> RenderResult<(D, A, S)> {
        log::info!(
            "Shutting down frame renderer after {} presented frame(s)",
            self.controller.frames_presented()
        );
        self.controller
            .destroy_resources(&mut self.device, &mut self.allocator)?;
        Ok((self.device, self.allocator, self.swapchain))
    }

    fn aspect_ratio(&self) -> f32 {
        let images = self.swapchain.image_count();
        if images == 0 {
            return 1.0;
        }
        let extent = self.swapchain.render_target(SwapchainImageIndex(0)).extent;
        if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    /// Pipeline catalog
    pub const fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    /// Mutable pipeline catalog
    pub fn pipelines_mut(&mut self) -> &mut PipelineRegistry {
        &mut self.pipelines
    }

    /// Material catalog
    pub const fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// Mutable material catalog
    pub fn materials_mut(&mut self) -> &mut MaterialRegistry {
        &mut self.materials
    }

    /// Current frame state
    pub const fn state(&self) -> FrameState {
        self.controller.state()
    }

    /// Frame cycle counters and resources
    pub const fn controller(&self) -> &FrameCycleController {
        &self.controller
    }

    /// Active configuration
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Device
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Allocator
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Swapchain
    pub const fn swapchain(&self) -> &S {
        &self.swapchain
    }
}
