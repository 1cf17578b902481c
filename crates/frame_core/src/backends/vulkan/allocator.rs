//! Buffer allocation on raw device memory
//!
//! One memory allocation per buffer. Host-visible buffers are written by
//! mapping; device-local buffers through a temporary staging buffer and a
//! blocking transfer.

use std::collections::HashMap;

use ash::{vk, Device};

use super::allocation_error;
use crate::render::api::{BufferAllocator, MemoryVisibility};
use crate::render::{RenderError, RenderResult};

struct Allocation {
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    visibility: MemoryVisibility,
}

/// Dedicated-allocation [`BufferAllocator`]
pub struct VulkanBufferAllocator {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    transfer_queue: vk::Queue,
    transfer_pool: vk::CommandPool,
    allocations: HashMap<vk::Buffer, Allocation>,
}

impl VulkanBufferAllocator {
    /// Create an allocator
    ///
    /// `memory_properties` comes from
    /// `Instance::get_physical_device_memory_properties`; staging copies run
    /// on `transfer_queue`, which must belong to `queue_family_index`.
    pub fn new(
        device: Device,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        transfer_queue: vk::Queue,
        queue_family_index: u32,
    ) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        let transfer_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        Ok(Self {
            device,
            memory_properties,
            transfer_queue,
            transfer_pool,
            allocations: HashMap::new(),
        })
    }

    fn find_memory_type(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> Option<u32> {
        let count = self.memory_properties.memory_type_count as usize;
        self.memory_properties.memory_types[..count]
            .iter()
            .enumerate()
            .find(|(i, memory_type)| {
                type_bits & (1u32 << *i) != 0 && memory_type.property_flags.contains(properties)
            })
            .and_then(|(i, _)| u32::try_from(i).ok())
    }

    fn create_raw(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RenderResult<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| allocation_error("buffer", e))?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let Some(memory_type_index) = self.find_memory_type(requirements.memory_type_bits, properties) else {
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(RenderError::allocation(format!(
                "no memory type with {properties:?}"
            )));
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { self.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(allocation_error("buffer memory", e));
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(e.into());
        }
        Ok((buffer, memory))
    }

    fn write_mapped(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()> {
        unsafe {
            let ptr = self.device.map_memory(
                memory,
                offset,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn write_staged(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()> {
        let size = data.len() as vk::DeviceSize;
        let (staging, staging_memory) = self.create_raw(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let result = self
            .write_mapped(staging_memory, 0, data)
            .and_then(|()| self.copy_buffer(staging, buffer, offset, size));

        unsafe {
            self.device.destroy_buffer(staging, None);
            self.device.free_memory(staging_memory, None);
        }
        result
    }

    fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, dst_offset: vk::DeviceSize, size: vk::DeviceSize) -> RenderResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.transfer_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };

        let result = (|| -> RenderResult<()> {
            let command_buffer = command_buffers[0];
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset,
                size,
            };
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

            unsafe {
                self.device.begin_command_buffer(command_buffer, &begin_info)?;
                self.device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
                self.device.end_command_buffer(command_buffer)?;
                self.device
                    .queue_submit(self.transfer_queue, &[submit_info.build()], vk::Fence::null())?;
                self.device.queue_wait_idle(self.transfer_queue)?;
            }
            Ok(())
        })();

        unsafe { self.device.free_command_buffers(self.transfer_pool, &command_buffers) };
        result
    }
}

impl BufferAllocator for VulkanBufferAllocator {
    fn allocate_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        visibility: MemoryVisibility,
    ) -> RenderResult<vk::Buffer> {
        let (usage, properties) = match visibility {
            MemoryVisibility::HostVisible => (
                usage,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
            MemoryVisibility::DeviceLocal => (
                usage | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ),
        };
        let (buffer, memory) = self.create_raw(size, usage, properties)?;

        log::trace!("Allocated {}-byte {:?} buffer {:?}", size, visibility, buffer);
        self.allocations.insert(
            buffer,
            Allocation {
                memory,
                size,
                visibility,
            },
        );
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()> {
        let allocation = self
            .allocations
            .get(&buffer)
            .ok_or(RenderError::Device(vk::Result::ERROR_UNKNOWN))?;
        if offset + data.len() as vk::DeviceSize > allocation.size {
            return Err(RenderError::Device(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }

        match allocation.visibility {
            MemoryVisibility::HostVisible => self.write_mapped(allocation.memory, offset, data),
            MemoryVisibility::DeviceLocal => self.write_staged(buffer, offset, data),
        }
    }

    fn free(&mut self, buffer: vk::Buffer) {
        if let Some(allocation) = self.allocations.remove(&buffer) {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(allocation.memory, None);
            }
        }
    }
}

impl Drop for VulkanBufferAllocator {
    fn drop(&mut self) {
        if !self.allocations.is_empty() {
            log::warn!("Releasing {} buffer(s) still allocated", self.allocations.len());
        }
        unsafe {
            let _ = self.device.device_wait_idle();
            for (buffer, allocation) in self.allocations.drain() {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(allocation.memory, None);
            }
            self.device.destroy_command_pool(self.transfer_pool, None);
        }
    }
}
