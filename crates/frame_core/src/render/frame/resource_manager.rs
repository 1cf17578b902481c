//! Frame resource management
//!
//! One [`FrameResourceSet`] per swapchain image: a uniform buffer, the
//! descriptor set pointing at it, a command buffer, the fence guarding the
//! set's last submission and the semaphore presentation waits on. Sets are
//! created together and destroyed together whenever the swapchain changes.

use ash::vk;

use crate::render::api::{BufferAllocator, GpuDevice, MemoryVisibility, SwapchainImageIndex};
use crate::render::{RenderError, RenderResult};

/// Resources owned by one swapchain image
#[derive(Debug)]
pub struct FrameResourceSet {
    image_index: SwapchainImageIndex,
    uniform_buffer: vk::Buffer,
    uniform_size: vk::DeviceSize,
    descriptor_set: vk::DescriptorSet,
    command_buffer: vk::CommandBuffer,
    in_flight: vk::Fence,
    render_finished: vk::Semaphore,
    in_flight_submission: bool,
}

impl FrameResourceSet {
    fn create<D, A>(
        image_index: SwapchainImageIndex,
        uniform_size: vk::DeviceSize,
        visibility: MemoryVisibility,
        device: &mut D,
        allocator: &mut A,
    ) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        let uniform_buffer = allocator
            .allocate_buffer(
                uniform_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                visibility,
            )
            .map_err(|e| as_allocation_failure(image_index, "uniform buffer", e))?;

        let mut set = Self {
            image_index,
            uniform_buffer,
            uniform_size,
            descriptor_set: vk::DescriptorSet::null(),
            command_buffer: vk::CommandBuffer::null(),
            in_flight: vk::Fence::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_submission: false,
        };

        if let Err(e) = set.create_device_objects(device) {
            set.release(device, allocator);
            return Err(e);
        }
        Ok(set)
    }

    fn create_device_objects<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> RenderResult<()> {
        let index = self.image_index;
        self.descriptor_set = device
            .create_descriptor_set(self.uniform_buffer, self.uniform_size)
            .map_err(|e| as_allocation_failure(index, "descriptor set", e))?;
        self.command_buffer = device
            .allocate_command_buffer()
            .map_err(|e| as_allocation_failure(index, "command buffer", e))?;
        // Signaled so the first wait on a fresh set returns immediately
        self.in_flight = device
            .create_fence(true)
            .map_err(|e| as_allocation_failure(index, "fence", e))?;
        self.render_finished = device
            .create_semaphore()
            .map_err(|e| as_allocation_failure(index, "semaphore", e))?;
        Ok(())
    }

    fn release<D, A>(&mut self, device: &mut D, allocator: &mut A)
    where
        D: GpuDevice + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        if self.render_finished != vk::Semaphore::null() {
            device.destroy_semaphore(self.render_finished);
            self.render_finished = vk::Semaphore::null();
        }
        if self.in_flight != vk::Fence::null() {
            device.destroy_fence(self.in_flight);
            self.in_flight = vk::Fence::null();
        }
        if self.command_buffer != vk::CommandBuffer::null() {
            device.free_command_buffer(self.command_buffer);
            self.command_buffer = vk::CommandBuffer::null();
        }
        if self.descriptor_set != vk::DescriptorSet::null() {
            device.free_descriptor_set(self.descriptor_set);
            self.descriptor_set = vk::DescriptorSet::null();
        }
        if self.uniform_buffer != vk::Buffer::null() {
            allocator.free(self.uniform_buffer);
            self.uniform_buffer = vk::Buffer::null();
        }
    }

    /// Swapchain image this set belongs to
    pub const fn image_index(&self) -> SwapchainImageIndex {
        self.image_index
    }

    /// Uniform buffer holding the camera block
    pub const fn uniform_buffer(&self) -> vk::Buffer {
        self.uniform_buffer
    }

    /// Size of the uniform buffer in bytes
    pub const fn uniform_size(&self) -> vk::DeviceSize {
        self.uniform_size
    }

    /// Descriptor set whose binding 0 is the uniform buffer
    pub const fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Command buffer recorded each time this image is drawn
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Fence signaled when the last submission from this set retires
    pub const fn in_flight_fence(&self) -> vk::Fence {
        self.in_flight
    }

    /// Semaphore signaled when rendering into this image finishes
    pub const fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    /// Whether a submission from this set has not been observed to retire
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight_submission
    }

    pub(super) fn mark_submitted(&mut self) {
        self.in_flight_submission = true;
    }

    pub(super) fn mark_retired(&mut self) {
        self.in_flight_submission = false;
    }
}

fn as_allocation_failure(index: SwapchainImageIndex, what: &str, error: RenderError) -> RenderError {
    match error {
        RenderError::AllocationFailure { reason } => {
            RenderError::allocation(format!("{what} for frame set {index}: {reason}"))
        }
        other => RenderError::allocation(format!("{what} for frame set {index}: {other}")),
    }
}

/// Every frame resource set of one swapchain generation
#[derive(Debug)]
pub struct FrameResources {
    sets: Vec<FrameResourceSet>,
    generation: u64,
}

impl FrameResources {
    /// Create one set per swapchain image
    ///
    /// Either every set is created or none is: on failure the sets built so
    /// far are released and `AllocationFailure` is returned.
    pub fn create<D, A>(
        image_count: usize,
        uniform_size: vk::DeviceSize,
        visibility: MemoryVisibility,
        generation: u64,
        device: &mut D,
        allocator: &mut A,
    ) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        if image_count == 0 {
            return Err(RenderError::allocation("swapchain reported zero images"));
        }
        let count = u32::try_from(image_count)
            .map_err(|_| RenderError::allocation(format!("{image_count} swapchain images")))?;

        log::debug!(
            "Creating {} frame resource set(s) for swapchain generation {}",
            count,
            generation
        );

        let mut sets = Vec::with_capacity(image_count);
        for index in 0..count {
            match FrameResourceSet::create(
                SwapchainImageIndex(index),
                uniform_size,
                visibility,
                device,
                allocator,
            ) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    log::error!("Frame resource creation failed: {}", e);
                    for mut set in sets {
                        set.release(device, allocator);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self { sets, generation })
    }

    /// Release every set
    ///
    /// The caller must have confirmed that no set is still in flight.
    pub fn destroy<D, A>(mut self, device: &mut D, allocator: &mut A)
    where
        D: GpuDevice + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        if let Some(busy) = self.sets.iter().find(|s| s.is_in_flight()) {
            log::error!(
                "Destroying frame set {} while its submission may still be executing",
                busy.image_index()
            );
        }
        log::debug!(
            "Destroying {} frame resource set(s) of generation {}",
            self.sets.len(),
            self.generation
        );
        for set in &mut self.sets {
            set.release(device, allocator);
        }
    }

    /// Set for a swapchain image
    pub fn get(&self, index: SwapchainImageIndex) -> Option<&FrameResourceSet> {
        self.sets.get(index.as_usize())
    }

    /// Mutable set for a swapchain image
    pub fn get_mut(&mut self, index: SwapchainImageIndex) -> Option<&mut FrameResourceSet> {
        self.sets.get_mut(index.as_usize())
    }

    /// Iterate over the sets in image order
    pub fn iter(&self) -> impl Iterator<Item = &FrameResourceSet> {
        self.sets.iter()
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FrameResourceSet> {
        self.sets.iter_mut()
    }

    /// Number of sets, equal to the swapchain image count
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether there are no sets
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Swapchain generation these sets were created for
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::SimulatedGpu;
    use std::collections::HashSet;

    #[test]
    fn test_one_set_per_image_with_distinct_resources() {
        let mut gpu = SimulatedGpu::new(1);
        let mut allocator = gpu.clone();

        let resources =
            FrameResources::create(3, 68, MemoryVisibility::HostVisible, 1, &mut gpu, &mut allocator)
                .unwrap();

        assert_eq!(resources.len(), 3);
        let buffers: HashSet<_> = resources.iter().map(FrameResourceSet::uniform_buffer).collect();
        let sets: HashSet<_> = resources.iter().map(FrameResourceSet::descriptor_set).collect();
        let commands: HashSet<_> = resources.iter().map(FrameResourceSet::command_buffer).collect();
        assert_eq!(buffers.len(), 3);
        assert_eq!(sets.len(), 3);
        assert_eq!(commands.len(), 3);

        for (i, set) in resources.iter().enumerate() {
            assert_eq!(set.image_index().as_usize(), i);
            assert_eq!(gpu.descriptor_buffer(set.descriptor_set()), Some(set.uniform_buffer()));
            assert!(!set.is_in_flight());
        }
    }

    #[test]
    fn test_zero_images_rejected() {
        let mut gpu = SimulatedGpu::new(1);
        let mut allocator = gpu.clone();

        let result =
            FrameResources::create(0, 68, MemoryVisibility::HostVisible, 1, &mut gpu, &mut allocator);
        assert!(matches!(result, Err(RenderError::AllocationFailure { .. })));
    }

    #[test]
    fn test_partial_failure_releases_everything() {
        let mut gpu = SimulatedGpu::new(1);
        let mut allocator = gpu.clone();
        gpu.fail_allocations_after(2);

        let result =
            FrameResources::create(3, 68, MemoryVisibility::HostVisible, 1, &mut gpu, &mut allocator);

        assert!(matches!(result, Err(RenderError::AllocationFailure { .. })));
        assert_eq!(gpu.live_objects().total(), 0);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut gpu = SimulatedGpu::new(1);
        let mut allocator = gpu.clone();

        let resources =
            FrameResources::create(2, 128, MemoryVisibility::DeviceLocal, 4, &mut gpu, &mut allocator)
                .unwrap();
        assert_eq!(resources.generation(), 4);
        assert_eq!(gpu.live_objects().buffers, 2);

        resources.destroy(&mut gpu, &mut allocator);
        assert_eq!(gpu.live_objects().total(), 0);
    }
}
