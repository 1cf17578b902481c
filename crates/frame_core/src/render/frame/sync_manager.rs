//! Synchronization management
//!
//! Owns the fence protocol of the frame cycle: a set may only be reused
//! once its previous submission has retired, and its fence is reset just
//! before the next submission rather than after the wait.

use std::time::Duration;

use ash::vk;

use crate::render::api::{FenceStatus, GpuDevice, Submission};
use crate::render::{RenderError, RenderResult};

use super::resource_manager::{FrameResourceSet, FrameResources};

/// Manages fence waits and submissions for frame resource sets
#[derive(Debug)]
pub struct SyncManager {
    fence_timeout: Duration,
    frames_submitted: u64,
    waits_timed_out: u64,
}

impl SyncManager {
    /// Create a manager that waits at most `fence_timeout` per set
    pub const fn new(fence_timeout: Duration) -> Self {
        Self {
            fence_timeout,
            frames_submitted: 0,
            waits_timed_out: 0,
        }
    }

    /// Wait until the GPU is done with `set`'s previous submission
    pub fn wait_until_reusable<D>(&mut self, device: &mut D, set: &mut FrameResourceSet) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        // Only wait if this set has actually been submitted
        if !set.is_in_flight() {
            return Ok(());
        }

        match device.wait_for_fence(set.in_flight_fence(), self.fence_timeout)? {
            FenceStatus::Signaled => {
                set.mark_retired();
                Ok(())
            }
            FenceStatus::TimedOut => {
                self.waits_timed_out += 1;
                log::warn!(
                    "Frame set {} still in flight after {:?}",
                    set.image_index(),
                    self.fence_timeout
                );
                Err(RenderError::UploadWaitTimeout {
                    image_index: set.image_index().0,
                    waited: self.fence_timeout,
                })
            }
        }
    }

    /// Submit `set`'s recorded command buffer
    ///
    /// The submission waits on `image_ready` and signals the set's
    /// render-finished semaphore and in-flight fence.
    pub fn submit<D>(&mut self, device: &mut D, set: &mut FrameResourceSet, image_ready: vk::Semaphore) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        // Reset just before submission so a failed frame never leaves an
        // unsignaled fence behind
        device.reset_fence(set.in_flight_fence())?;
        device.submit(&Submission {
            command_buffer: set.command_buffer(),
            wait: image_ready,
            signal: set.render_finished(),
            fence: set.in_flight_fence(),
        })?;

        set.mark_submitted();
        self.frames_submitted += 1;
        Ok(())
    }

    /// Wait for every in-flight set to retire
    ///
    /// Falls back to a device-wide idle wait if a fence times out, so the
    /// caller may always destroy the sets afterwards.
    pub fn wait_all<D>(&mut self, device: &mut D, resources: &mut FrameResources) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        let mut timed_out = false;
        for set in resources.iter_mut() {
            match self.wait_until_reusable(device, set) {
                Ok(()) => {}
                Err(RenderError::UploadWaitTimeout { .. }) => timed_out = true,
                Err(e) => return Err(e),
            }
        }

        if timed_out {
            log::warn!("Falling back to a device idle wait");
            device.wait_idle()?;
            for set in resources.iter_mut() {
                set.mark_retired();
            }
        }
        Ok(())
    }

    /// Submissions made so far
    pub const fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Fence waits that hit the timeout
    pub const fn waits_timed_out(&self) -> u64 {
        self.waits_timed_out
    }

    /// Per-set fence timeout
    pub const fn fence_timeout(&self) -> Duration {
        self.fence_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::SimulatedGpu;
    use crate::render::api::{MemoryVisibility, SwapchainImageIndex};
    use ash::vk::Handle;

    fn setup(latency: u64) -> (SimulatedGpu, FrameResources) {
        let mut gpu = SimulatedGpu::new(latency);
        let mut allocator = gpu.clone();
        let resources =
            FrameResources::create(2, 68, MemoryVisibility::HostVisible, 1, &mut gpu, &mut allocator)
                .unwrap();
        (gpu, resources)
    }

    fn record_empty(gpu: &mut SimulatedGpu, command_buffer: vk::CommandBuffer) {
        use crate::render::api::CommandEncoder;
        gpu.begin_commands(command_buffer).unwrap();
        gpu.end_commands(command_buffer).unwrap();
    }

    #[test]
    fn test_fresh_set_does_not_wait() {
        let (mut gpu, mut resources) = setup(3);
        let mut sync = SyncManager::new(Duration::from_millis(10));
        let set = resources.get_mut(SwapchainImageIndex(0)).unwrap();

        sync.wait_until_reusable(&mut gpu, set).unwrap();
        assert_eq!(gpu.now(), 0);
    }

    #[test]
    fn test_wait_blocks_until_submission_retires() {
        let (mut gpu, mut resources) = setup(3);
        let mut sync = SyncManager::new(Duration::from_millis(10));
        let set = resources.get_mut(SwapchainImageIndex(0)).unwrap();

        record_empty(&mut gpu, set.command_buffer());
        sync.submit(&mut gpu, set, vk::Semaphore::from_raw(0xdead)).unwrap();
        assert!(set.is_in_flight());
        assert_eq!(sync.frames_submitted(), 1);

        sync.wait_until_reusable(&mut gpu, set).unwrap();
        assert!(!set.is_in_flight());
        assert!(gpu.now() >= 3);
    }

    #[test]
    fn test_hung_submission_times_out() {
        let (mut gpu, mut resources) = setup(3);
        gpu.set_hung(true);
        let mut sync = SyncManager::new(Duration::from_millis(10));
        let set = resources.get_mut(SwapchainImageIndex(1)).unwrap();

        record_empty(&mut gpu, set.command_buffer());
        sync.submit(&mut gpu, set, vk::Semaphore::from_raw(0xdead)).unwrap();

        let result = sync.wait_until_reusable(&mut gpu, set);
        assert!(matches!(
            result,
            Err(RenderError::UploadWaitTimeout { image_index: 1, .. })
        ));
        assert!(set.is_in_flight());
        assert_eq!(sync.waits_timed_out(), 1);
    }

    #[test]
    fn test_wait_all_falls_back_to_idle() {
        let (mut gpu, mut resources) = setup(3);
        gpu.set_hung(true);
        let mut sync = SyncManager::new(Duration::from_millis(10));

        for set in resources.iter_mut() {
            record_empty(&mut gpu, set.command_buffer());
            sync.submit(&mut gpu, set, vk::Semaphore::from_raw(0xdead)).unwrap();
        }

        sync.wait_all(&mut gpu, &mut resources).unwrap();
        assert!(resources.iter().all(|s| !s.is_in_flight()));
        assert_eq!(gpu.pending_submissions(), 0);
    }
}
