//! Command recording
//!
//! Walks a [`RenderBatchPlan`] and records it into a frame set's command
//! buffer: one pipeline bind per pipeline group, one descriptor bind per
//! material group, then a push constant block and an indexed draw per
//! object.

use ash::vk;

use crate::foundation::math::{to_column_array, Mat4};
use crate::render::api::{CommandEncoder, MeshBuffers, RecordStats, RenderTarget};
use crate::render::batching::RenderBatchPlan;
use crate::render::{RenderError, RenderResult};

/// Push constants structure for per-draw data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectPushConstants {
    /// Model transformation, column-major (64 bytes)
    pub model_matrix: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for ObjectPushConstants {}
unsafe impl bytemuck::Zeroable for ObjectPushConstants {}

impl ObjectPushConstants {
    /// Size of the push constant block in bytes
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Push constants for an object's transform
    pub fn new(model: &Mat4) -> Self {
        Self {
            model_matrix: to_column_array(model),
        }
    }
}

/// Records batch plans into command buffers
#[derive(Debug)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
    bound_sets: Vec<vk::DescriptorSet>,
}

impl CommandRecorder {
    /// Create a recorder clearing the target to `clear_color`
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            clear_color,
            bound_sets: Vec::new(),
        }
    }

    /// Record a complete frame
    ///
    /// `camera_set` is bound at set 0 ahead of each material's own sets. On
    /// error the command buffer is left partially recorded and must not be
    /// submitted.
    pub fn record<E>(
        &mut self,
        encoder: &mut E,
        command_buffer: vk::CommandBuffer,
        target: &RenderTarget,
        plan: &RenderBatchPlan<'_>,
        camera_set: vk::DescriptorSet,
    ) -> RenderResult<RecordStats>
    where
        E: CommandEncoder + ?Sized,
    {
        if let Some(group) = plan
            .pipeline_groups()
            .iter()
            .find(|g| g.handle.push_constant_stages.is_empty())
        {
            return Err(RenderError::recording(format!(
                "pipeline {:?} declares no push constant stages",
                group.pipeline_id
            )));
        }

        encoder
            .begin_commands(command_buffer)
            .map_err(|e| recording_step("begin", e))?;
        encoder.begin_render_pass(command_buffer, target, self.clear_color);

        let mut stats = RecordStats::default();
        let mut bound_mesh: Option<MeshBuffers> = None;

        for group in plan.pipeline_groups() {
            let layout = group.handle.layout;
            let stages = group.handle.push_constant_stages;

            encoder.bind_pipeline(command_buffer, group.handle.pipeline);
            stats.pipeline_binds += 1;

            for material in &group.material_groups {
                self.bound_sets.clear();
                self.bound_sets.push(camera_set);
                self.bound_sets
                    .extend_from_slice(&material.resources.descriptor_sets);

                encoder.bind_descriptor_sets(command_buffer, layout, 0, &self.bound_sets);
                stats.descriptor_binds += 1;

                for planned in &material.objects {
                    let object = planned.object;
                    let constants = ObjectPushConstants::new(&object.transform);
                    encoder.push_constants(command_buffer, layout, stages, bytemuck::bytes_of(&constants));

                    if bound_mesh != Some(object.mesh) {
                        encoder.bind_mesh(command_buffer, &object.mesh);
                        bound_mesh = Some(object.mesh);
                        stats.mesh_binds += 1;
                    }

                    encoder.draw_indexed(command_buffer, object.mesh.index_count, object.mesh.first_index);
                    stats.draws += 1;
                }
            }
        }

        encoder.end_render_pass(command_buffer);
        encoder
            .end_commands(command_buffer)
            .map_err(|e| recording_step("end", e))?;

        log::trace!(
            "Recorded {} draw(s): {} pipeline bind(s), {} descriptor bind(s), {} mesh bind(s)",
            stats.draws,
            stats.pipeline_binds,
            stats.descriptor_binds,
            stats.mesh_binds
        );
        Ok(stats)
    }

    /// Clear color used for the render pass
    pub const fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }
}

fn recording_step(step: &str, error: RenderError) -> RenderError {
    match error {
        RenderError::RecordingFailure { .. } => error,
        other => RenderError::recording(format!("{step} failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::{RecordedCommand, SimulatedGpu};
    use crate::foundation::math::Vec3;
    use crate::render::api::{GpuDevice, MaterialResources, PipelineHandle, RenderableObject};
    use crate::render::batching::RenderBatchBuilder;
    use crate::render::resources::{DrawType, MaterialRegistry, PipelineRegistry};
    use ash::vk::Handle;

    fn target() -> RenderTarget {
        RenderTarget {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
        }
    }

    fn handle(raw: u64, stages: vk::ShaderStageFlags) -> PipelineHandle {
        PipelineHandle {
            pipeline: vk::Pipeline::from_raw(raw),
            layout: vk::PipelineLayout::from_raw(raw + 100),
            push_constant_stages: stages,
        }
    }

    #[test]
    fn test_push_constant_block_size() {
        assert_eq!(ObjectPushConstants::SIZE, 64);
        let constants = ObjectPushConstants::new(&Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(constants.model_matrix[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_records_plan_in_order() {
        let mut gpu = SimulatedGpu::new(1);
        let mut pipelines = PipelineRegistry::new();
        let mut materials = MaterialRegistry::new();
        let pipeline = pipelines.register("solid", handle(7, vk::ShaderStageFlags::VERTEX), DrawType::Triangles);
        let textured = materials.register(
            "textured",
            MaterialResources {
                descriptor_sets: vec![vk::DescriptorSet::from_raw(50)],
            },
        );

        let mesh = MeshBuffers::new(vk::Buffer::from_raw(10), vk::Buffer::from_raw(11), 6);
        let objects = [
            RenderableObject::new(mesh, pipeline, textured),
            RenderableObject::new(mesh, pipeline, textured)
                .with_transform(Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0))),
        ];

        let mut builder = RenderBatchBuilder::new();
        let build = builder.build(&objects, &pipelines, &materials);

        let command_buffer = gpu.allocate_command_buffer().unwrap();
        let camera_set = vk::DescriptorSet::from_raw(40);
        let mut recorder = CommandRecorder::new([0.0, 0.0, 0.0, 1.0]);
        let stats = recorder
            .record(&mut gpu, command_buffer, &target(), &build.plan, camera_set)
            .unwrap();

        assert_eq!(
            stats,
            RecordStats {
                pipeline_binds: 1,
                descriptor_binds: 1,
                mesh_binds: 1,
                draws: 2,
            }
        );

        let commands = gpu.recorded_commands(command_buffer);
        assert!(matches!(commands[0], RecordedCommand::BeginRenderPass { .. }));
        assert_eq!(commands[1], RecordedCommand::BindPipeline(vk::Pipeline::from_raw(7)));
        assert_eq!(
            commands[2],
            RecordedCommand::BindDescriptorSets {
                first_set: 0,
                sets: vec![camera_set, vk::DescriptorSet::from_raw(50)],
            }
        );
        assert!(matches!(commands[3], RecordedCommand::PushConstants { ref data, .. } if data.len() == 64));
        assert_eq!(commands[4], RecordedCommand::BindMesh(mesh));
        assert_eq!(
            commands[5],
            RecordedCommand::DrawIndexed {
                index_count: 6,
                first_index: 0,
            }
        );
        assert!(matches!(commands[6], RecordedCommand::PushConstants { .. }));
        assert!(matches!(commands[7], RecordedCommand::DrawIndexed { .. }));
        assert_eq!(commands[8], RecordedCommand::EndRenderPass);
        assert_eq!(commands.len(), 9);
    }

    #[test]
    fn test_missing_push_constant_stages_fails_before_recording() {
        let mut gpu = SimulatedGpu::new(1);
        let mut pipelines = PipelineRegistry::new();
        let mut materials = MaterialRegistry::new();
        let pipeline = pipelines.register("broken", handle(3, vk::ShaderStageFlags::empty()), DrawType::Points);
        let material = materials.register("plain", MaterialResources::default());
        let mesh = MeshBuffers::new(vk::Buffer::from_raw(10), vk::Buffer::from_raw(11), 3);
        let objects = [RenderableObject::new(mesh, pipeline, material)];

        let mut builder = RenderBatchBuilder::new();
        let build = builder.build(&objects, &pipelines, &materials);

        let command_buffer = gpu.allocate_command_buffer().unwrap();
        let mut recorder = CommandRecorder::new([0.0; 4]);
        let result = recorder.record(&mut gpu, command_buffer, &target(), &build.plan, vk::DescriptorSet::null());

        assert!(matches!(result, Err(RenderError::RecordingFailure { .. })));
        assert!(gpu.recorded_commands(command_buffer).is_empty());
    }

    #[test]
    fn test_end_failure_is_a_recording_failure() {
        let mut gpu = SimulatedGpu::new(1);
        let plan = RenderBatchPlan::default();
        let command_buffer = gpu.allocate_command_buffer().unwrap();
        gpu.fail_next_end_commands();

        let mut recorder = CommandRecorder::new([0.0; 4]);
        let result = recorder.record(&mut gpu, command_buffer, &target(), &plan, vk::DescriptorSet::null());

        assert!(matches!(result, Err(RenderError::RecordingFailure { .. })));
        assert!(!gpu.is_executable(command_buffer));
    }
}
