//! Vulkan swapchain adapter
//!
//! Wraps a `VkSwapchainKHR` and its framebuffers, both created by the
//! application, and maps acquire/present results onto the frame cycle's
//! outcomes.
//!
//! Acquire semaphores come from a pool. A semaphore goes back to the idle
//! list only once the fence of the submission that waited on it signals;
//! until the frame cycle reports that submission, it stays outstanding.

use std::time::Duration;

use ash::extensions::khr;
use ash::{vk, Device};

use crate::render::api::{AcquireOutcome, PresentOutcome, RenderTarget, Swapchain, SwapchainImageIndex};
use crate::render::RenderResult;

/// An acquire semaphore waited on by a submission guarded by `fence`
#[derive(Debug, Clone, Copy)]
struct ConsumedSemaphore {
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    // Release submissions create their own fence
    owned_fence: bool,
}

/// [`Swapchain`] over `VK_KHR_swapchain`
pub struct VulkanSwapchain {
    device: Device,
    loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    present_queue: vk::Queue,
    targets: Vec<RenderTarget>,
    idle_semaphores: Vec<vk::Semaphore>,
    outstanding: Vec<vk::Semaphore>,
    consumed: Vec<ConsumedSemaphore>,
    // Signaled by the empty batch that releases an unrendered image
    release_semaphores: Vec<vk::Semaphore>,
}

impl VulkanSwapchain {
    /// Wrap an existing swapchain; `targets` holds one entry per image
    pub fn new(
        device: Device,
        loader: khr::Swapchain,
        swapchain: vk::SwapchainKHR,
        present_queue: vk::Queue,
        targets: Vec<RenderTarget>,
    ) -> RenderResult<Self> {
        let info = vk::SemaphoreCreateInfo::default();
        let mut release_semaphores = Vec::with_capacity(targets.len());
        for _ in 0..targets.len() {
            match unsafe { device.create_semaphore(&info, None) } {
                Ok(semaphore) => release_semaphores.push(semaphore),
                Err(e) => {
                    for semaphore in release_semaphores {
                        unsafe { device.destroy_semaphore(semaphore, None) };
                    }
                    return Err(e.into());
                }
            }
        }

        log::debug!("Wrapped swapchain with {} image(s)", targets.len());
        Ok(Self {
            device,
            loader,
            swapchain,
            present_queue,
            targets,
            idle_semaphores: Vec::new(),
            outstanding: Vec::new(),
            consumed: Vec::new(),
            release_semaphores,
        })
    }

    /// Wrapped swapchain handle, for use as `old_swapchain` on recreation
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Return semaphores whose consuming submission has finished to the idle list
    fn recycle(&mut self) {
        let mut i = 0;
        while i < self.consumed.len() {
            let entry = self.consumed[i];
            match unsafe { self.device.get_fence_status(entry.fence) } {
                Ok(true) => {
                    self.consumed.swap_remove(i);
                    if entry.owned_fence {
                        unsafe { self.device.destroy_fence(entry.fence, None) };
                    }
                    self.idle_semaphores.push(entry.semaphore);
                }
                Ok(false) => i += 1,
                Err(e) => {
                    log::warn!("Fence status query failed: {}", e);
                    i += 1;
                }
            }
        }
    }

    fn take_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        self.recycle();
        if let Some(semaphore) = self.idle_semaphores.pop() {
            return Ok(semaphore);
        }
        let info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&info, None) }?;
        log::trace!(
            "Acquire semaphore pool grew to {}",
            self.outstanding.len() + self.consumed.len() + 1
        );
        Ok(semaphore)
    }

    fn mark_consumed(&mut self, semaphore: vk::Semaphore, fence: vk::Fence, owned_fence: bool) {
        match self.outstanding.iter().position(|&s| s == semaphore) {
            Some(position) => {
                self.outstanding.swap_remove(position);
                self.consumed.push(ConsumedSemaphore {
                    semaphore,
                    fence,
                    owned_fence,
                });
            }
            None => log::warn!("Semaphore {:?} was not handed out by this swapchain", semaphore),
        }
    }
}

impl Swapchain for VulkanSwapchain {
    fn image_count(&self) -> usize {
        self.targets.len()
    }

    fn acquire_next_image(&mut self, timeout: Duration) -> RenderResult<AcquireOutcome> {
        let semaphore = self.take_semaphore()?;
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        };
        match result {
            // Suboptimal images are still rendered; present reports staleness
            Ok((index, _suboptimal)) => {
                self.outstanding.push(semaphore);
                Ok(AcquireOutcome::Acquired {
                    index: SwapchainImageIndex(index),
                    ready: semaphore,
                })
            }
            Err(e) => {
                // Nothing was signaled, so the semaphore is reusable at once
                self.idle_semaphores.push(semaphore);
                match e {
                    vk::Result::ERROR_OUT_OF_DATE_KHR => {
                        log::warn!("Swapchain out of date during acquire_next_image");
                        Ok(AcquireOutcome::Stale)
                    }
                    vk::Result::TIMEOUT | vk::Result::NOT_READY => Ok(AcquireOutcome::Timeout),
                    e => Err(e.into()),
                }
            }
        }
    }

    fn render_target(&self, index: SwapchainImageIndex) -> RenderTarget {
        self.targets[index.as_usize()]
    }

    fn present(&mut self, index: SwapchainImageIndex, wait: vk::Semaphore) -> RenderResult<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [index.0];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => {
                log::info!("Swapchain suboptimal during queue_present");
                Ok(PresentOutcome::Stale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date during queue_present");
                Ok(PresentOutcome::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release_image(&mut self, index: SwapchainImageIndex, ready: vk::Semaphore) -> RenderResult<PresentOutcome> {
        let Some(&release) = self.release_semaphores.get(index.as_usize()) else {
            log::warn!("Cannot release image {} of a {}-image swapchain", index, self.targets.len());
            return Ok(PresentOutcome::Stale);
        };

        // An empty batch consumes the acquire semaphore and hands the image
        // to the present below
        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }?;
        let wait_semaphores = [ready];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let signal_semaphores = [release];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        if let Err(e) = unsafe {
            self.device
                .queue_submit(self.present_queue, &[submit_info.build()], fence)
        } {
            unsafe { self.device.destroy_fence(fence, None) };
            return Err(e.into());
        }
        self.mark_consumed(ready, fence, true);

        log::debug!("Releasing unrendered image {}", index);
        self.present(index, release)
    }

    fn acquire_consumed(&mut self, ready: vk::Semaphore, fence: vk::Fence) {
        self.mark_consumed(ready, fence, false);
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.queue_wait_idle(self.present_queue);
            for entry in self.consumed.drain(..) {
                if entry.owned_fence {
                    self.device.destroy_fence(entry.fence, None);
                }
                self.device.destroy_semaphore(entry.semaphore, None);
            }
            let semaphores = self
                .idle_semaphores
                .drain(..)
                .chain(self.outstanding.drain(..))
                .chain(self.release_semaphores.drain(..));
            for semaphore in semaphores {
                self.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}
