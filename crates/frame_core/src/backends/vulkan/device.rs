//! Vulkan device adapter
//!
//! Implements [`GpuDevice`] and [`CommandEncoder`] on an `ash::Device`
//! created by the application. Owns the command pool, the descriptor pool
//! for the per-image camera sets and the camera set layout; pipelines used
//! with the renderer must be created against [`VulkanDevice::camera_set_layout`]
//! at set 0 and enable dynamic viewport and scissor state.

use std::time::Duration;

use ash::{vk, Device};

use super::allocation_error;
use crate::render::api::{
    CommandEncoder, FenceStatus, GpuDevice, MeshBuffers, RenderTarget, Submission,
};
use crate::render::{RenderError, RenderResult};

/// Graphics queue, pools and camera layout on an existing logical device
pub struct VulkanDevice {
    device: Device,
    graphics_queue: vk::Queue,
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    camera_set_layout: vk::DescriptorSetLayout,
}

impl VulkanDevice {
    /// Create pools sized for up to `max_frame_sets` swapchain images
    pub fn new(
        device: Device,
        graphics_queue: vk::Queue,
        queue_family_index: u32,
        max_frame_sets: u32,
    ) -> RenderResult<Self> {
        log::debug!("Creating VulkanDevice for up to {} frame sets...", max_frame_sets);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_frame_sets,
        }];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_frame_sets)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = match unsafe { device.create_descriptor_pool(&descriptor_pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(e.into());
            }
        };

        // Set 0, binding 0: camera UBO
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .build()];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let camera_set_layout = match unsafe { device.create_descriptor_set_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(descriptor_pool, None);
                    device.destroy_command_pool(command_pool, None);
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            device,
            graphics_queue,
            command_pool,
            descriptor_pool,
            camera_set_layout,
        })
    }

    /// Layout of the per-image camera set
    pub fn camera_set_layout(&self) -> vk::DescriptorSetLayout {
        self.camera_set_layout
    }

    /// Underlying logical device
    pub fn raw(&self) -> &Device {
        &self.device
    }
}

impl GpuDevice for VulkanDevice {
    fn create_descriptor_set(
        &mut self,
        uniform_buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> RenderResult<vk::DescriptorSet> {
        let layouts = [self.camera_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| allocation_error("descriptor set", e))?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::allocation("descriptor pool returned no set"))?;

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: uniform_buffer,
            offset: 0,
            range,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };

        Ok(set)
    }

    fn free_descriptor_set(&mut self, set: vk::DescriptorSet) {
        if let Err(e) = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &[set]) } {
            log::error!("Failed to free descriptor set: {:?}", e);
        }
    }

    fn allocate_command_buffer(&mut self) -> RenderResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| allocation_error("command buffer", e))?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::allocation("command pool returned no buffer"))
    }

    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        Ok(unsafe { self.device.create_fence(&info, None)? })
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&info, None)? })
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout: Duration) -> RenderResult<FenceStatus> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
            Err(e) => Err(e.into()),
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        Ok(())
    }

    fn submit(&mut self, submission: &Submission) -> RenderResult<()> {
        let wait_semaphores = [submission.wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info.build()], submission.fence)?;
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl CommandEncoder for VulkanDevice {
    fn begin_commands(&mut self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(command_buffer, &begin_info)?;
        }
        Ok(())
    }

    fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, target: &RenderTarget, clear_color: [f32; 4]) {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(command_buffer, 0, &[render_area]);
        }
    }

    fn bind_pipeline(&mut self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    fn push_constants(
        &mut self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(command_buffer, layout, stages, 0, data);
        }
    }

    fn bind_mesh(&mut self, command_buffer: vk::CommandBuffer, mesh: &MeshBuffers) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[mesh.vertex_buffer], &[0]);
            self.device
                .cmd_bind_index_buffer(command_buffer, mesh.index_buffer, 0, mesh.index_type);
        }
    }

    fn draw_indexed(&mut self, command_buffer: vk::CommandBuffer, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(command_buffer, index_count, 1, first_index, 0, 0);
        }
    }

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer)? };
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            // Pools may only be destroyed once nothing allocated from them is executing
            let _ = self.device.device_wait_idle();

            self.device
                .destroy_descriptor_set_layout(self.camera_set_layout, None);
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
