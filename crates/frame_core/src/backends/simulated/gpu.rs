//! Simulated GPU
//!
//! Implements [`GpuDevice`], [`CommandEncoder`] and [`BufferAllocator`] on a
//! logical clock. Every submission completes `gpu_latency` ticks after it is
//! queued; fence waits advance the clock (one tick per millisecond of
//! timeout). While a submission is pending, writing a buffer it reads or
//! re-recording its command buffer is logged as a [`Hazard`].
//!
//! Clones share the same device, so one clone can serve as the device,
//! another as the allocator, and a third stays with the test for inspection.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use ash::vk::{self, Handle};

use crate::render::api::{
    BufferAllocator, CommandEncoder, FenceStatus, GpuDevice, MemoryVisibility, MeshBuffers,
    PipelineHandle, RenderTarget, Submission,
};
use crate::render::{RenderError, RenderResult};

/// A command captured from a command buffer
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Render pass begin with its clear color
    BeginRenderPass {
        /// Target the pass renders into
        target: RenderTarget,
        /// Color attachment clear value
        clear_color: [f32; 4],
    },
    /// Pipeline bind
    BindPipeline(vk::Pipeline),
    /// Descriptor set bind
    BindDescriptorSets {
        /// First set number
        first_set: u32,
        /// Bound sets in order
        sets: Vec<vk::DescriptorSet>,
    },
    /// Push constant update
    PushConstants {
        /// Stages the block is visible to
        stages: vk::ShaderStageFlags,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// Vertex and index buffer bind
    BindMesh(MeshBuffers),
    /// Indexed draw
    DrawIndexed {
        /// Indices drawn
        index_count: u32,
        /// First index
        first_index: u32,
    },
    /// Render pass end
    EndRenderPass,
}

/// Synchronization mistake observed by the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    /// CPU wrote a buffer a pending submission reads
    BufferWriteInFlight {
        /// Written buffer
        buffer: vk::Buffer,
        /// Clock at the write
        at_tick: u64,
        /// When the reading submission completes
        busy_until: u64,
    },
    /// A command buffer was reset while a pending submission executes it
    CommandBufferResetInFlight {
        /// Reset command buffer
        command_buffer: vk::CommandBuffer,
        /// Clock at the reset
        at_tick: u64,
    },
    /// A command buffer that was not fully recorded was submitted
    IncompleteSubmission {
        /// Submitted command buffer
        command_buffer: vk::CommandBuffer,
    },
    /// A signaled fence was handed to a submission
    FenceNotReset {
        /// Offending fence
        fence: vk::Fence,
    },
    /// An object was released while pending work still used it
    ReleasedInFlight {
        /// Raw handle of the released object
        raw_handle: u64,
    },
}

/// Notable device activity, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuEvent {
    /// CPU write into a buffer
    BufferWrite {
        /// Written buffer
        buffer: vk::Buffer,
        /// Clock at the write
        tick: u64,
    },
    /// Work queued
    Submit {
        /// Submitted command buffer
        command_buffer: vk::CommandBuffer,
        /// Fence signaled on completion
        fence: vk::Fence,
        /// Clock at submission
        tick: u64,
        /// Clock at completion
        completes_at: u64,
    },
    /// Bounded fence wait
    FenceWait {
        /// Waited fence
        fence: vk::Fence,
        /// Clock when the wait returned
        tick: u64,
        /// Outcome
        status: FenceStatus,
    },
}

/// Count of live device objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveObjects {
    /// Buffers
    pub buffers: usize,
    /// Descriptor sets
    pub descriptor_sets: usize,
    /// Command buffers
    pub command_buffers: usize,
    /// Fences
    pub fences: usize,
    /// Semaphores
    pub semaphores: usize,
}

impl LiveObjects {
    /// All objects together
    pub const fn total(&self) -> usize {
        self.buffers + self.descriptor_sets + self.command_buffers + self.fences + self.semaphores
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug)]
struct SimCommandBuffer {
    state: RecordingState,
    commands: Vec<RecordedCommand>,
}

#[derive(Debug)]
struct SimBuffer {
    data: Vec<u8>,
    visibility: MemoryVisibility,
}

#[derive(Debug)]
struct SimSubmission {
    command_buffer: vk::CommandBuffer,
    completes_at: u64,
    reads: Vec<vk::Buffer>,
}

#[derive(Debug)]
struct SimState {
    next_handle: u64,
    now: u64,
    gpu_latency: u64,
    hung: bool,
    buffers: HashMap<vk::Buffer, SimBuffer>,
    descriptor_sets: HashMap<vk::DescriptorSet, vk::Buffer>,
    command_buffers: HashMap<vk::CommandBuffer, SimCommandBuffer>,
    // Tick at which each fence is (or becomes) signaled; None while unsignaled
    // with nothing pending
    fences: HashMap<vk::Fence, Option<u64>>,
    semaphores: HashSet<vk::Semaphore>,
    submissions: Vec<SimSubmission>,
    submission_count: usize,
    events: Vec<GpuEvent>,
    hazards: Vec<Hazard>,
    allocation_budget: Option<usize>,
    fail_next_end: bool,
}

impl SimState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn pending(&self) -> impl Iterator<Item = &SimSubmission> {
        let now = self.now;
        self.submissions.iter().filter(move |s| s.completes_at > now)
    }

    fn retire(&mut self) {
        let now = self.now;
        self.submissions.retain(|s| s.completes_at > now);
    }

    fn busy_until(&self, buffer: vk::Buffer) -> Option<u64> {
        self.pending()
            .filter(|s| s.reads.contains(&buffer))
            .map(|s| s.completes_at)
            .max()
    }

    fn command_buffer_in_flight(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.pending().any(|s| s.command_buffer == command_buffer)
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, command: RecordedCommand) {
        if let Some(cb) = self.command_buffers.get_mut(&command_buffer) {
            if cb.state == RecordingState::Recording {
                cb.commands.push(command);
            }
        }
    }

    fn buffers_read_by(&self, command_buffer: vk::CommandBuffer) -> Vec<vk::Buffer> {
        let Some(cb) = self.command_buffers.get(&command_buffer) else {
            return Vec::new();
        };
        let mut reads = Vec::new();
        for command in &cb.commands {
            match command {
                RecordedCommand::BindDescriptorSets { sets, .. } => {
                    reads.extend(sets.iter().filter_map(|set| self.descriptor_sets.get(set).copied()));
                }
                RecordedCommand::BindMesh(mesh) => {
                    reads.push(mesh.vertex_buffer);
                    reads.push(mesh.index_buffer);
                }
                _ => {}
            }
        }
        reads.sort_by_key(|b| b.as_raw());
        reads.dedup();
        reads
    }
}

/// Simulated graphics device with a logical completion clock
#[derive(Debug, Clone)]
pub struct SimulatedGpu {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedGpu {
    /// Device whose submissions complete `gpu_latency` ticks after queueing
    pub fn new(gpu_latency: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                next_handle: 0x1000,
                now: 0,
                gpu_latency,
                hung: false,
                buffers: HashMap::new(),
                descriptor_sets: HashMap::new(),
                command_buffers: HashMap::new(),
                fences: HashMap::new(),
                semaphores: HashSet::new(),
                submissions: Vec::new(),
                submission_count: 0,
                events: Vec::new(),
                hazards: Vec::new(),
                allocation_budget: None,
                fail_next_end: false,
            })),
        }
    }

    fn state(&self) -> Ref<'_, SimState> {
        self.state.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, SimState> {
        self.state.borrow_mut()
    }

    /// Current clock
    pub fn now(&self) -> u64 {
        self.state().now
    }

    /// Let time pass on the CPU side
    pub fn advance(&self, ticks: u64) {
        let mut state = self.state_mut();
        state.now = state.now.saturating_add(ticks);
    }

    /// Change the latency of future submissions
    pub fn set_gpu_latency(&self, ticks: u64) {
        self.state_mut().gpu_latency = ticks;
    }

    /// Make future submissions never complete on their own
    pub fn set_hung(&self, hung: bool) {
        self.state_mut().hung = hung;
    }

    /// Let the next `count` buffer allocations succeed, then fail
    pub fn fail_allocations_after(&self, count: usize) {
        self.state_mut().allocation_budget = Some(count);
    }

    /// Lift any allocation limit
    pub fn clear_allocation_failures(&self) {
        self.state_mut().allocation_budget = None;
    }

    /// Make the next `end_commands` call fail
    pub fn fail_next_end_commands(&self) {
        self.state_mut().fail_next_end = true;
    }

    /// Hazards observed so far
    pub fn hazards(&self) -> Vec<Hazard> {
        self.state().hazards.clone()
    }

    /// Events observed so far
    pub fn events(&self) -> Vec<GpuEvent> {
        self.state().events.clone()
    }

    /// Commands captured by the last recording of `command_buffer`
    pub fn recorded_commands(&self, command_buffer: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state()
            .command_buffers
            .get(&command_buffer)
            .map(|cb| cb.commands.clone())
            .unwrap_or_default()
    }

    /// Whether `command_buffer` was fully recorded
    pub fn is_executable(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.state()
            .command_buffers
            .get(&command_buffer)
            .is_some_and(|cb| cb.state == RecordingState::Executable)
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer).map(|b| b.data.clone())
    }

    /// Memory placement a buffer was allocated with
    pub fn buffer_visibility(&self, buffer: vk::Buffer) -> Option<MemoryVisibility> {
        self.state().buffers.get(&buffer).map(|b| b.visibility)
    }

    /// Uniform buffer a descriptor set points at
    pub fn descriptor_buffer(&self, set: vk::DescriptorSet) -> Option<vk::Buffer> {
        self.state().descriptor_sets.get(&set).copied()
    }

    /// Submissions made so far
    pub fn submission_count(&self) -> usize {
        self.state().submission_count
    }

    /// Submissions that have not completed yet
    pub fn pending_submissions(&self) -> usize {
        self.state().pending().count()
    }

    /// Live device objects
    pub fn live_objects(&self) -> LiveObjects {
        let state = self.state();
        LiveObjects {
            buffers: state.buffers.len(),
            descriptor_sets: state.descriptor_sets.len(),
            command_buffers: state.command_buffers.len(),
            fences: state.fences.len(),
            semaphores: state.semaphores.len(),
        }
    }

    /// Handles for a pipeline compiled elsewhere
    pub fn create_pipeline(&self, push_constant_stages: vk::ShaderStageFlags) -> PipelineHandle {
        let mut state = self.state_mut();
        PipelineHandle {
            pipeline: vk::Pipeline::from_raw(state.mint()),
            layout: vk::PipelineLayout::from_raw(state.mint()),
            push_constant_stages,
        }
    }

    /// A material descriptor set allocated elsewhere
    pub fn create_material_set(&self) -> vk::DescriptorSet {
        vk::DescriptorSet::from_raw(self.state_mut().mint())
    }

    /// Device-local vertex and 16-bit index buffers for a mesh
    pub fn create_mesh(&mut self, vertex_count: u32, index_count: u32) -> RenderResult<MeshBuffers> {
        let vertex_buffer = self.allocate_buffer(
            u64::from(vertex_count) * 32,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryVisibility::DeviceLocal,
        )?;
        let index_buffer = self.allocate_buffer(
            u64::from(index_count) * 2,
            vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryVisibility::DeviceLocal,
        )?;
        Ok(MeshBuffers::new(vertex_buffer, index_buffer, index_count))
    }
}

fn timeout_ticks(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl BufferAllocator for SimulatedGpu {
    fn allocate_buffer(
        &mut self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
        visibility: MemoryVisibility,
    ) -> RenderResult<vk::Buffer> {
        let mut state = self.state_mut();
        let budget = state.allocation_budget;
        match budget {
            Some(0) => {
                return Err(RenderError::allocation(format!(
                    "simulated device out of memory ({size} bytes requested)"
                )))
            }
            Some(n) => state.allocation_budget = Some(n - 1),
            None => {}
        }
        let len = usize::try_from(size)
            .ok()
            .filter(|&len| len > 0)
            .ok_or_else(|| RenderError::allocation(format!("invalid buffer size {size}")))?;

        let buffer = vk::Buffer::from_raw(state.mint());
        state.buffers.insert(
            buffer,
            SimBuffer {
                data: vec![0; len],
                visibility,
            },
        );
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()> {
        let mut state = self.state_mut();
        state.retire();

        let now = state.now;
        if let Some(busy_until) = state.busy_until(buffer) {
            log::error!("Buffer {:?} written while in use until tick {}", buffer, busy_until);
            state.hazards.push(Hazard::BufferWriteInFlight {
                buffer,
                at_tick: now,
                busy_until,
            });
        }

        let target = state
            .buffers
            .get_mut(&buffer)
            .ok_or(RenderError::Device(vk::Result::ERROR_UNKNOWN))?;
        let start = usize::try_from(offset).map_err(|_| vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let end = start + data.len();
        if end > target.data.len() {
            return Err(RenderError::Device(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        target.data[start..end].copy_from_slice(data);

        state.events.push(GpuEvent::BufferWrite { buffer, tick: now });
        Ok(())
    }

    fn free(&mut self, buffer: vk::Buffer) {
        let mut state = self.state_mut();
        state.retire();
        if state.busy_until(buffer).is_some() {
            state.hazards.push(Hazard::ReleasedInFlight {
                raw_handle: buffer.as_raw(),
            });
        }
        state.buffers.remove(&buffer);
    }
}

impl GpuDevice for SimulatedGpu {
    fn create_descriptor_set(&mut self, uniform_buffer: vk::Buffer, range: vk::DeviceSize) -> RenderResult<vk::DescriptorSet> {
        let mut state = self.state_mut();
        let size = state
            .buffers
            .get(&uniform_buffer)
            .map(|b| b.data.len() as u64)
            .ok_or_else(|| RenderError::allocation("descriptor set for unknown buffer"))?;
        if range > size {
            return Err(RenderError::allocation(format!(
                "descriptor range {range} exceeds buffer size {size}"
            )));
        }
        let set = vk::DescriptorSet::from_raw(state.mint());
        state.descriptor_sets.insert(set, uniform_buffer);
        Ok(set)
    }

    fn free_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.state_mut().descriptor_sets.remove(&set);
    }

    fn allocate_command_buffer(&mut self) -> RenderResult<vk::CommandBuffer> {
        let mut state = self.state_mut();
        let command_buffer = vk::CommandBuffer::from_raw(state.mint());
        state.command_buffers.insert(
            command_buffer,
            SimCommandBuffer {
                state: RecordingState::Initial,
                commands: Vec::new(),
            },
        );
        Ok(command_buffer)
    }

    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        let mut state = self.state_mut();
        state.retire();
        if state.command_buffer_in_flight(command_buffer) {
            state.hazards.push(Hazard::ReleasedInFlight {
                raw_handle: command_buffer.as_raw(),
            });
        }
        state.command_buffers.remove(&command_buffer);
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let mut state = self.state_mut();
        let fence = vk::Fence::from_raw(state.mint());
        let now = state.now;
        state.fences.insert(fence, signaled.then_some(now));
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        let mut state = self.state_mut();
        let now = state.now;
        if matches!(state.fences.get(&fence), Some(Some(at)) if *at > now) {
            state.hazards.push(Hazard::ReleasedInFlight {
                raw_handle: fence.as_raw(),
            });
        }
        state.fences.remove(&fence);
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        let mut state = self.state_mut();
        let semaphore = vk::Semaphore::from_raw(state.mint());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.state_mut().semaphores.remove(&semaphore);
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout: Duration) -> RenderResult<FenceStatus> {
        let mut state = self.state_mut();
        let signaled_at = *state
            .fences
            .get(&fence)
            .ok_or(RenderError::Device(vk::Result::ERROR_UNKNOWN))?;
        let ticks = timeout_ticks(timeout);
        let now = state.now;

        let status = match signaled_at {
            Some(at) if at <= now => FenceStatus::Signaled,
            Some(at) if at - now <= ticks => {
                state.now = at;
                FenceStatus::Signaled
            }
            _ => {
                state.now = now.saturating_add(ticks);
                FenceStatus::TimedOut
            }
        };

        let tick = state.now;
        state.events.push(GpuEvent::FenceWait { fence, tick, status });
        state.retire();
        Ok(status)
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let mut state = self.state_mut();
        let entry = state
            .fences
            .get_mut(&fence)
            .ok_or(RenderError::Device(vk::Result::ERROR_UNKNOWN))?;
        *entry = None;
        Ok(())
    }

    fn submit(&mut self, submission: &Submission) -> RenderResult<()> {
        let mut state = self.state_mut();
        state.retire();

        let command_buffer = submission.command_buffer;
        let executable = state
            .command_buffers
            .get(&command_buffer)
            .is_some_and(|cb| cb.state == RecordingState::Executable);
        if !executable {
            state.hazards.push(Hazard::IncompleteSubmission { command_buffer });
        }

        let fence_state = state.fences.get(&submission.fence).copied();
        match fence_state {
            None => return Err(RenderError::Device(vk::Result::ERROR_UNKNOWN)),
            Some(Some(_)) => state.hazards.push(Hazard::FenceNotReset {
                fence: submission.fence,
            }),
            Some(None) => {}
        }

        let tick = state.now;
        let completes_at = if state.hung {
            u64::MAX
        } else {
            tick.saturating_add(state.gpu_latency)
        };
        let reads = state.buffers_read_by(command_buffer);

        state.fences.insert(submission.fence, Some(completes_at));
        state.submissions.push(SimSubmission {
            command_buffer,
            completes_at,
            reads,
        });
        state.submission_count += 1;
        state.events.push(GpuEvent::Submit {
            command_buffer,
            fence: submission.fence,
            tick,
            completes_at,
        });
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        let mut state = self.state_mut();
        let now = state.now;
        let finish = state
            .submissions
            .iter()
            .map(|s| s.completes_at)
            .filter(|&at| at != u64::MAX)
            .fold(now, u64::max);

        // A hung queue is drained as if the device had recovered
        state.now = finish;
        for signaled_at in state.fences.values_mut() {
            if let Some(at) = signaled_at {
                *at = (*at).min(finish);
            }
        }
        state.submissions.clear();
        Ok(())
    }
}

impl CommandEncoder for SimulatedGpu {
    fn begin_commands(&mut self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        let mut state = self.state_mut();
        state.retire();
        if state.command_buffer_in_flight(command_buffer) {
            let at_tick = state.now;
            state.hazards.push(Hazard::CommandBufferResetInFlight {
                command_buffer,
                at_tick,
            });
        }
        let cb = state
            .command_buffers
            .get_mut(&command_buffer)
            .ok_or(RenderError::Device(vk::Result::ERROR_UNKNOWN))?;
        cb.state = RecordingState::Recording;
        cb.commands.clear();
        Ok(())
    }

    fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, target: &RenderTarget, clear_color: [f32; 4]) {
        self.state_mut().record(
            command_buffer,
            RecordedCommand::BeginRenderPass {
                target: *target,
                clear_color,
            },
        );
    }

    fn bind_pipeline(&mut self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state_mut()
            .record(command_buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.state_mut().record(
            command_buffer,
            RecordedCommand::BindDescriptorSets {
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    fn push_constants(
        &mut self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.state_mut().record(
            command_buffer,
            RecordedCommand::PushConstants {
                stages,
                data: data.to_vec(),
            },
        );
    }

    fn bind_mesh(&mut self, command_buffer: vk::CommandBuffer, mesh: &MeshBuffers) {
        self.state_mut()
            .record(command_buffer, RecordedCommand::BindMesh(*mesh));
    }

    fn draw_indexed(&mut self, command_buffer: vk::CommandBuffer, index_count: u32, first_index: u32) {
        self.state_mut().record(
            command_buffer,
            RecordedCommand::DrawIndexed {
                index_count,
                first_index,
            },
        );
    }

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        self.state_mut()
            .record(command_buffer, RecordedCommand::EndRenderPass);
    }

    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        let mut state = self.state_mut();
        if state.fail_next_end {
            state.fail_next_end = false;
            return Err(RenderError::Device(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let cb = state
            .command_buffers
            .get_mut(&command_buffer)
            .ok_or(RenderError::Device(vk::Result::ERROR_UNKNOWN))?;
        if cb.state != RecordingState::Recording {
            return Err(RenderError::recording("end without begin"));
        }
        cb.state = RecordingState::Executable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit_reading(gpu: &mut SimulatedGpu, buffer: vk::Buffer) -> (vk::CommandBuffer, vk::Fence) {
        let set = gpu.create_descriptor_set(buffer, 16).unwrap();
        let command_buffer = gpu.allocate_command_buffer().unwrap();
        let fence = gpu.create_fence(false).unwrap();

        gpu.begin_commands(command_buffer).unwrap();
        gpu.bind_descriptor_sets(command_buffer, vk::PipelineLayout::null(), 0, &[set]);
        gpu.end_commands(command_buffer).unwrap();
        gpu.submit(&Submission {
            command_buffer,
            wait: vk::Semaphore::null(),
            signal: vk::Semaphore::null(),
            fence,
        })
        .unwrap();
        (command_buffer, fence)
    }

    #[test]
    fn test_write_while_pending_is_a_hazard() {
        let mut gpu = SimulatedGpu::new(4);
        let buffer = gpu
            .allocate_buffer(16, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryVisibility::HostVisible)
            .unwrap();
        submit_reading(&mut gpu, buffer);

        gpu.write_buffer(buffer, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            gpu.hazards(),
            vec![Hazard::BufferWriteInFlight {
                buffer,
                at_tick: 0,
                busy_until: 4,
            }]
        );
    }

    #[test]
    fn test_write_after_fence_wait_is_clean() {
        let mut gpu = SimulatedGpu::new(4);
        let buffer = gpu
            .allocate_buffer(16, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryVisibility::HostVisible)
            .unwrap();
        let (_, fence) = submit_reading(&mut gpu, buffer);

        let status = gpu.wait_for_fence(fence, Duration::from_millis(10)).unwrap();
        assert_eq!(status, FenceStatus::Signaled);
        assert_eq!(gpu.now(), 4);

        gpu.write_buffer(buffer, 4, &[9, 9]).unwrap();
        assert!(gpu.hazards().is_empty());
        assert_eq!(&gpu.buffer_contents(buffer).unwrap()[4..6], &[9, 9]);
    }

    #[test]
    fn test_short_wait_times_out() {
        let mut gpu = SimulatedGpu::new(50);
        let buffer = gpu
            .allocate_buffer(16, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryVisibility::HostVisible)
            .unwrap();
        let (_, fence) = submit_reading(&mut gpu, buffer);

        let status = gpu.wait_for_fence(fence, Duration::from_millis(10)).unwrap();
        assert_eq!(status, FenceStatus::TimedOut);
        assert_eq!(gpu.now(), 10);
    }

    #[test]
    fn test_unreset_fence_and_unfinished_buffer_are_hazards() {
        let mut gpu = SimulatedGpu::new(1);
        let command_buffer = gpu.allocate_command_buffer().unwrap();
        let fence = gpu.create_fence(true).unwrap();
        gpu.begin_commands(command_buffer).unwrap();

        gpu.submit(&Submission {
            command_buffer,
            wait: vk::Semaphore::null(),
            signal: vk::Semaphore::null(),
            fence,
        })
        .unwrap();

        let hazards = gpu.hazards();
        assert!(hazards.contains(&Hazard::IncompleteSubmission { command_buffer }));
        assert!(hazards.contains(&Hazard::FenceNotReset { fence }));
    }

    #[test]
    fn test_allocation_budget() {
        let mut gpu = SimulatedGpu::new(1);
        gpu.fail_allocations_after(1);

        let usage = vk::BufferUsageFlags::UNIFORM_BUFFER;
        assert!(gpu.allocate_buffer(8, usage, MemoryVisibility::HostVisible).is_ok());
        assert!(matches!(
            gpu.allocate_buffer(8, usage, MemoryVisibility::HostVisible),
            Err(RenderError::AllocationFailure { .. })
        ));

        gpu.clear_allocation_failures();
        assert!(gpu.allocate_buffer(8, usage, MemoryVisibility::DeviceLocal).is_ok());
    }
}
