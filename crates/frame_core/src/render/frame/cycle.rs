//! Frame cycle controller
//!
//! Drives one frame through acquire, wait, upload, record, submit and
//! present. Each stage either advances the [`FrameState`] or ends the
//! frame with a [`FrameResult`]; nothing after a failed stage runs.

use std::fmt;
use std::time::Duration;

use ash::vk;

use crate::config::RendererConfig;
use crate::render::api::{
    AcquireOutcome, BufferAllocator, CameraUniformData, CommandEncoder, FrameReport, FrameResult,
    GpuDevice, MaterialCatalog, MemoryVisibility, PipelineCatalog, PresentOutcome,
    RenderableObject, Swapchain, SwapchainImageIndex,
};
use crate::render::batching::{BatchBuild, RenderBatchBuilder};
use crate::render::{RenderError, RenderResult};

use super::command_recorder::CommandRecorder;
use super::resource_manager::FrameResources;
use super::sync_manager::SyncManager;
use super::ubo_manager::UniformUploadManager;

/// Where the controller is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Ready to start a frame
    Idle,
    /// An image was acquired; its frame set is being waited on
    ImageAcquired,
    /// Camera data is in the frame set's uniform buffer
    Uploaded,
    /// The command buffer is fully recorded
    Recorded,
    /// Work has been queued on the GPU
    Submitted,
    /// The image was queued for display
    Presented,
    /// The swapchain is stale; frames are refused until recreation
    NeedsRecreation,
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ImageAcquired => "image acquired",
            Self::Uploaded => "uploaded",
            Self::Recorded => "recorded",
            Self::Submitted => "submitted",
            Self::Presented => "presented",
            Self::NeedsRecreation => "needs recreation",
        };
        f.write_str(name)
    }
}

/// Collaborators borrowed for one frame
pub struct FrameContext<'c, D: ?Sized, A: ?Sized, S: ?Sized, P: ?Sized, M: ?Sized> {
    /// Device used for synchronization and recording
    pub device: &'c mut D,
    /// Allocator owning the uniform buffers
    pub allocator: &'c mut A,
    /// Image source
    pub swapchain: &'c mut S,
    /// Pipeline lookups
    pub pipelines: &'c P,
    /// Material lookups
    pub materials: &'c M,
}

/// Runs frames against one swapchain generation at a time
#[derive(Debug)]
pub struct FrameCycleController {
    resources: Option<FrameResources>,
    state: FrameState,
    generation: u64,
    acquire_timeout: Duration,
    uniform_size: u64,
    uniform_memory: MemoryVisibility,
    uploader: UniformUploadManager,
    builder: RenderBatchBuilder,
    recorder: CommandRecorder,
    sync: SyncManager,
    frames_presented: u64,
    frames_skipped: u64,
}

impl FrameCycleController {
    /// Create a controller without frame resources
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            resources: None,
            state: FrameState::NeedsRecreation,
            generation: 0,
            acquire_timeout: config.acquire_timeout(),
            uniform_size: config.uniform_buffer_size,
            uniform_memory: config.uniform_memory,
            uploader: UniformUploadManager::new(),
            builder: RenderBatchBuilder::new(),
            recorder: CommandRecorder::new(config.clear_color),
            sync: SyncManager::new(config.fence_timeout()),
            frames_presented: 0,
            frames_skipped: 0,
        }
    }

    /// Create the frame resource sets for a new swapchain generation
    ///
    /// Live sets from an earlier generation are waited on and destroyed first.
    pub fn create_resources<D, A>(&mut self, device: &mut D, allocator: &mut A, image_count: usize) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        if self.resources.is_some() {
            log::warn!("Replacing live frame resources of generation {}", self.generation);
            self.destroy_resources(device, allocator)?;
        }

        self.generation += 1;
        let resources = FrameResources::create(
            image_count,
            self.uniform_size,
            self.uniform_memory,
            self.generation,
            device,
            allocator,
        )?;

        log::info!(
            "Frame resources ready: {} image(s), generation {}",
            resources.len(),
            self.generation
        );
        self.resources = Some(resources);
        self.state = FrameState::Idle;
        Ok(())
    }

    /// Wait for all in-flight work, then release every frame resource set
    pub fn destroy_resources<D, A>(&mut self, device: &mut D, allocator: &mut A) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        if let Some(mut resources) = self.resources.take() {
            if let Err(e) = self.sync.wait_all(device, &mut resources) {
                self.resources = Some(resources);
                return Err(e);
            }
            resources.destroy(device, allocator);
        }
        self.state = FrameState::NeedsRecreation;
        Ok(())
    }

    /// Run one frame
    ///
    /// Per-frame conditions come back as the matching [`FrameResult`];
    /// `Err` is reserved for device and allocator failures.
    pub fn run_frame<D, A, S, P, M>(
        &mut self,
        ctx: FrameContext<'_, D, A, S, P, M>,
        camera: &CameraUniformData,
        objects: &[RenderableObject],
    ) -> RenderResult<FrameResult>
    where
        D: GpuDevice + CommandEncoder + ?Sized,
        A: BufferAllocator + ?Sized,
        S: Swapchain + ?Sized,
        P: PipelineCatalog + ?Sized,
        M: MaterialCatalog + ?Sized,
    {
        let Some(resources) = self.resources.as_mut() else {
            return Ok(needs_recreation());
        };
        if self.state == FrameState::NeedsRecreation {
            return Ok(needs_recreation());
        }
        self.state = FrameState::Idle;

        let (image_index, image_ready) = match ctx.swapchain.acquire_next_image(self.acquire_timeout)? {
            AcquireOutcome::Acquired { index, ready } => (index, ready),
            AcquireOutcome::Stale => {
                log::info!("Swapchain stale on acquire");
                self.state = FrameState::NeedsRecreation;
                return Ok(needs_recreation());
            }
            AcquireOutcome::Timeout => {
                log::warn!("No swapchain image within {:?}, skipping frame", self.acquire_timeout);
                self.frames_skipped += 1;
                return Ok(FrameResult::Skipped(RenderError::AcquireTimeout {
                    waited: self.acquire_timeout,
                }));
            }
        };
        enter(&mut self.state, FrameState::ImageAcquired);

        let Some(set) = resources.get_mut(image_index) else {
            log::warn!(
                "Swapchain returned image {} but only {} frame set(s) exist",
                image_index,
                resources.len()
            );
            release_unrendered(ctx.swapchain, image_index, image_ready)?;
            self.state = FrameState::NeedsRecreation;
            return Ok(needs_recreation());
        };

        match self.sync.wait_until_reusable(ctx.device, set) {
            Ok(()) => {}
            Err(e @ RenderError::UploadWaitTimeout { .. }) => {
                self.frames_skipped += 1;
                self.state = release_unrendered(ctx.swapchain, image_index, image_ready)?;
                return Ok(FrameResult::Skipped(e));
            }
            Err(e) => return Err(e),
        }

        self.uploader.upload(ctx.allocator, set, camera)?;
        enter(&mut self.state, FrameState::Uploaded);

        let BatchBuild { plan, rejected } = self.builder.build(objects, ctx.pipelines, ctx.materials);
        let target = ctx.swapchain.render_target(image_index);

        let stats = match self.recorder.record(
            ctx.device,
            set.command_buffer(),
            &target,
            &plan,
            set.descriptor_set(),
        ) {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("Frame {} not submitted: {}", image_index, e);
                self.frames_skipped += 1;
                self.state = release_unrendered(ctx.swapchain, image_index, image_ready)?;
                return Ok(FrameResult::RecordingFailed { error: e, rejected });
            }
        };
        enter(&mut self.state, FrameState::Recorded);

        self.sync.submit(ctx.device, set, image_ready)?;
        ctx.swapchain.acquire_consumed(image_ready, set.in_flight_fence());
        enter(&mut self.state, FrameState::Submitted);

        match ctx.swapchain.present(image_index, set.render_finished())? {
            PresentOutcome::Presented => {
                enter(&mut self.state, FrameState::Presented);
                self.frames_presented += 1;
                self.state = FrameState::Idle;
                Ok(FrameResult::Ok(FrameReport {
                    image_index,
                    stats,
                    rejected,
                }))
            }
            PresentOutcome::Stale => {
                log::info!("Swapchain stale on present");
                self.state = FrameState::NeedsRecreation;
                Ok(FrameResult::NeedsRecreation { rejected })
            }
        }
    }

    /// Current state
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Frame resources of the current generation, if any
    pub const fn resources(&self) -> Option<&FrameResources> {
        self.resources.as_ref()
    }

    /// Swapchain generations created so far
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Frames that reached the display
    pub const fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Frames dropped by a timeout or recording failure
    pub const fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Submissions made so far
    pub const fn frames_submitted(&self) -> u64 {
        self.sync.frames_submitted()
    }
}

fn enter(state: &mut FrameState, next: FrameState) {
    log::trace!("Frame state: {} -> {}", state, next);
    *state = next;
}

const fn needs_recreation() -> FrameResult {
    FrameResult::NeedsRecreation { rejected: Vec::new() }
}

/// Hand an acquired image back unrendered, returning the state to resume in
fn release_unrendered<S>(swapchain: &mut S, index: SwapchainImageIndex, ready: vk::Semaphore) -> RenderResult<FrameState>
where
    S: Swapchain + ?Sized,
{
    log::debug!("Releasing unrendered image {}", index);
    match swapchain.release_image(index, ready)? {
        PresentOutcome::Presented => Ok(FrameState::Idle),
        PresentOutcome::Stale => {
            log::info!("Swapchain stale while releasing image {}", index);
            Ok(FrameState::NeedsRecreation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::{ScriptedSwapchain, SimulatedGpu};
    use crate::foundation::math::Mat4;
    use crate::render::resources::{MaterialRegistry, PipelineRegistry};

    struct Harness {
        gpu: SimulatedGpu,
        allocator: SimulatedGpu,
        swapchain: ScriptedSwapchain,
        pipelines: PipelineRegistry,
        materials: MaterialRegistry,
        controller: FrameCycleController,
    }

    impl Harness {
        fn new(images: usize) -> Self {
            let mut gpu = SimulatedGpu::new(2);
            let mut allocator = gpu.clone();
            let mut controller = FrameCycleController::new(&RendererConfig::default());
            controller.create_resources(&mut gpu, &mut allocator, images).unwrap();
            Self {
                gpu,
                allocator,
                swapchain: ScriptedSwapchain::new(images),
                pipelines: PipelineRegistry::new(),
                materials: MaterialRegistry::new(),
                controller,
            }
        }

        fn frame(&mut self) -> FrameResult {
            let ctx = FrameContext {
                device: &mut self.gpu,
                allocator: &mut self.allocator,
                swapchain: &mut self.swapchain,
                pipelines: &self.pipelines,
                materials: &self.materials,
            };
            let camera = CameraUniformData::new(Mat4::identity(), 0.5);
            self.controller.run_frame(ctx, &camera, &[]).unwrap()
        }
    }

    #[test]
    fn test_new_controller_needs_resources() {
        let controller = FrameCycleController::new(&RendererConfig::default());
        assert_eq!(controller.state(), FrameState::NeedsRecreation);
        assert!(controller.resources().is_none());
    }

    #[test]
    fn test_empty_frame_is_presented() {
        let mut h = Harness::new(3);

        let result = h.frame();
        let report = result.report().unwrap();
        assert_eq!(report.stats.draws, 0);
        assert_eq!(h.controller.state(), FrameState::Idle);
        assert_eq!(h.controller.frames_presented(), 1);
        assert_eq!(h.swapchain.presented().len(), 1);
    }

    #[test]
    fn test_stale_present_blocks_until_recreation() {
        let mut h = Harness::new(2);
        h.swapchain.script_present_stale();

        assert!(matches!(h.frame(), FrameResult::NeedsRecreation { .. }));
        assert_eq!(h.controller.state(), FrameState::NeedsRecreation);

        let acquires = h.swapchain.acquire_calls();
        assert!(matches!(h.frame(), FrameResult::NeedsRecreation { .. }));
        assert_eq!(h.swapchain.acquire_calls(), acquires);

        h.controller.destroy_resources(&mut h.gpu, &mut h.allocator).unwrap();
        h.controller.create_resources(&mut h.gpu, &mut h.allocator, 2).unwrap();
        assert_eq!(h.controller.generation(), 2);
        assert!(h.frame().is_presented());
    }

    #[test]
    fn test_acquire_timeout_skips_frame() {
        let mut h = Harness::new(2);
        h.swapchain.script_acquire_timeout();

        let result = h.frame();
        assert!(matches!(result, FrameResult::Skipped(RenderError::AcquireTimeout { .. })));
        assert_eq!(h.controller.frames_skipped(), 1);
        assert_eq!(h.controller.frames_submitted(), 0);
        assert_eq!(h.controller.state(), FrameState::Idle);

        assert!(h.frame().is_presented());
    }

    #[test]
    fn test_out_of_range_image_requests_recreation() {
        let mut h = Harness::new(2);
        h.swapchain.script_acquire_index(5);

        assert!(matches!(h.frame(), FrameResult::NeedsRecreation { .. }));
        assert_eq!(h.gpu.submission_count(), 0);
        assert_eq!(h.swapchain.released(), vec![SwapchainImageIndex(5)]);
        assert_eq!(h.swapchain.held_images(), 0);
    }

    #[test]
    fn test_submitted_frame_consumes_acquire_semaphore() {
        let mut h = Harness::new(2);

        assert!(h.frame().is_presented());
        assert_eq!(h.swapchain.unconsumed_acquires(), 0);
        assert_eq!(h.swapchain.held_images(), 0);
        assert!(h.swapchain.released().is_empty());
    }

    #[test]
    fn test_stale_release_blocks_until_recreation() {
        let mut h = Harness::new(1);
        h.gpu.set_hung(true);
        assert!(h.frame().is_presented());

        h.swapchain.script_present_stale();
        assert!(matches!(h.frame(), FrameResult::Skipped(RenderError::UploadWaitTimeout { .. })));
        assert_eq!(h.controller.state(), FrameState::NeedsRecreation);
        assert_eq!(h.swapchain.held_images(), 0);

        let acquires = h.swapchain.acquire_calls();
        assert!(h.frame().needs_recreation());
        assert_eq!(h.swapchain.acquire_calls(), acquires);
    }
}
